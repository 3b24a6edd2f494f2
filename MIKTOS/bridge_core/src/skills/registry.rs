use std::{collections::HashSet, sync::Arc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{
    builtin::{catalogue, BridgeOperationSkill},
    RegistryError, SkillCategory, SkillHandler, SkillSpec, SkillStatsSnapshot, StatsBook,
};
use crate::{
    intent::IntentKind,
    parameter::{ParameterKind, ParsedParameter},
};

const MAX_SUGGESTIONS: usize = 10;

/// Schema plus handler.
pub struct RegisteredSkill {
    /// Declared schema.
    pub spec: SkillSpec,
    /// Executable body.
    pub handler: Arc<dyn SkillHandler>,
}

#[derive(Debug, Clone)]
struct Route {
    skill: String,
    when_any: Vec<String>,
}

/// Catalogue entry as shown to operators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillDescription {
    /// Skill name.
    pub name: String,
    /// Functional area.
    pub category: SkillCategory,
    /// One-line description.
    pub description: String,
    /// Relative cost.
    pub complexity: f32,
    /// Declared parameter names; required ones are suffixed with `*`.
    pub parameters: Vec<String>,
    /// Rolling statistics.
    pub stats: SkillStatsSnapshot,
}

/// Skill catalogue and intent routing table.
///
/// Populated once at startup and then shared read-only; statistics are the
/// only state mutated afterwards.
#[derive(Default)]
pub struct SkillRegistry {
    skills: IndexMap<String, Arc<RegisteredSkill>>,
    routes: IndexMap<IntentKind, Vec<Route>>,
    stats: StatsBook,
}

impl SkillRegistry {
    /// Empty registry keeping `window` statistics samples per skill.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            skills: IndexMap::new(),
            routes: IndexMap::new(),
            stats: StatsBook::new(window),
        }
    }

    /// Registry seeded with the host-operation catalogue and routes for
    /// every intent kind.
    #[must_use]
    pub fn production_default() -> Self {
        Self::production_with_window(StatsBook::default().window())
    }

    /// Same as [`SkillRegistry::production_default`] with a custom window.
    #[must_use]
    pub fn production_with_window(window: usize) -> Self {
        let mut registry = Self::new(window);
        for spec in catalogue() {
            let handler = Arc::new(BridgeOperationSkill::new(spec.name.clone()));
            if let Err(err) = registry.register(spec, handler) {
                tracing::error!(error = %err, "default skill rejected");
            }
        }
        let routes: &[(IntentKind, &str, &[&str])] = &[
            (IntentKind::CreateObject, "create_primitive", &[]),
            (IntentKind::CreateObject, "apply_material", &["material", "color"]),
            (IntentKind::CreateObject, "apply_subdivision", &["subdivisions"]),
            (IntentKind::ApplyMaterial, "apply_material", &[]),
            (IntentKind::Transform, "transform_object", &[]),
            (IntentKind::Subdivide, "apply_subdivision", &[]),
            (IntentKind::SetLighting, "setup_lighting", &[]),
            (IntentKind::Animate, "animate_object", &[]),
            (IntentKind::Duplicate, "duplicate_object", &[]),
            (IntentKind::Select, "select_objects", &[]),
            (IntentKind::DeleteObject, "delete_objects", &[]),
            (IntentKind::QueryScene, "scene_status", &[]),
        ];
        for (kind, skill, when_any) in routes {
            if let Err(err) = registry.route_when(*kind, skill, when_any) {
                tracing::error!(error = %err, "default route rejected");
            }
        }
        registry
    }

    /// Registers a skill after checking its schema.
    pub fn register(
        &mut self,
        spec: SkillSpec,
        handler: Arc<dyn SkillHandler>,
    ) -> Result<(), RegistryError> {
        validate_schema(&spec)?;
        if self.skills.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        self.skills
            .insert(spec.name.clone(), Arc::new(RegisteredSkill { spec, handler }));
        Ok(())
    }

    /// Appends `skill` to the chain run for `kind`.
    pub fn route(&mut self, kind: IntentKind, skill: &str) -> Result<(), RegistryError> {
        self.route_when(kind, skill, &[])
    }

    /// Appends `skill` to the chain for `kind`, run only when the intent
    /// carries at least one of `when_any`. An empty list always runs.
    pub fn route_when(
        &mut self,
        kind: IntentKind,
        skill: &str,
        when_any: &[&str],
    ) -> Result<(), RegistryError> {
        if !self.skills.contains_key(skill) {
            return Err(RegistryError::UnknownSkill(skill.to_string()));
        }
        self.routes.entry(kind).or_default().push(Route {
            skill: skill.to_string(),
            when_any: when_any.iter().map(|name| (*name).to_string()).collect(),
        });
        Ok(())
    }

    /// Skill called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredSkill>> {
        self.skills.get(name).cloned()
    }

    /// Registered skill count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Ordered skill chain for an intent with `parameters`.
    pub fn plan(
        &self,
        kind: IntentKind,
        parameters: &[ParsedParameter],
    ) -> Result<Vec<Arc<RegisteredSkill>>, RegistryError> {
        let routes = self
            .routes
            .get(&kind)
            .ok_or_else(|| RegistryError::NoSkill(kind.label().to_string()))?;
        let present: HashSet<&str> = parameters.iter().map(|param| param.name.as_str()).collect();
        let chain: Vec<Arc<RegisteredSkill>> = routes
            .iter()
            .filter(|route| {
                route.when_any.is_empty()
                    || route.when_any.iter().any(|name| present.contains(name.as_str()))
            })
            .filter_map(|route| self.skills.get(&route.skill).cloned())
            .collect();
        if chain.is_empty() {
            return Err(RegistryError::NoSkill(kind.label().to_string()));
        }
        Ok(chain)
    }

    /// Rolling statistics.
    #[must_use]
    pub const fn stats(&self) -> &StatsBook {
        &self.stats
    }

    /// Skill names whose name, category or description contains `query`.
    #[must_use]
    pub fn suggest(&self, query: &str) -> Vec<String> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        self.skills
            .values()
            .filter(|skill| {
                let spec = &skill.spec;
                spec.name.to_lowercase().contains(&query)
                    || spec.category.label().contains(&query)
                    || spec.description.to_lowercase().contains(&query)
            })
            .map(|skill| skill.spec.name.clone())
            .take(MAX_SUGGESTIONS)
            .collect()
    }

    /// Catalogue with statistics, in registration order.
    #[must_use]
    pub fn describe(&self) -> Vec<SkillDescription> {
        self.skills
            .values()
            .map(|skill| {
                let spec = &skill.spec;
                SkillDescription {
                    name: spec.name.clone(),
                    category: spec.category,
                    description: spec.description.clone(),
                    complexity: spec.complexity,
                    parameters: spec
                        .parameters
                        .iter()
                        .map(|param| {
                            if param.required {
                                format!("{}*", param.name)
                            } else {
                                param.name.clone()
                            }
                        })
                        .collect(),
                    stats: self.stats.snapshot(&spec.name),
                }
            })
            .collect()
    }
}

fn validate_schema(spec: &SkillSpec) -> Result<(), RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidSchema {
        skill: spec.name.clone(),
        reason,
    };
    if spec.name.trim().is_empty() {
        return Err(invalid("name is empty".into()));
    }
    if !(0.0..=1.0).contains(&spec.complexity) {
        return Err(invalid(format!("complexity {} outside [0, 1]", spec.complexity)));
    }
    if spec.timeout.is_some_and(|timeout| timeout.is_zero()) {
        return Err(invalid("timeout must be positive".into()));
    }
    let mut seen = HashSet::new();
    for param in &spec.parameters {
        if param.name.trim().is_empty() {
            return Err(invalid("parameter name is empty".into()));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(invalid(format!("parameter '{}' declared twice", param.name)));
        }
        if param.kind == ParameterKind::Unknown {
            return Err(invalid(format!("parameter '{}' has no kind", param.name)));
        }
        if let Some(default) = &param.default {
            if param.coerce(default).is_none() {
                return Err(invalid(format!(
                    "default of '{}' is not a {}",
                    param.name,
                    param.kind.label()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parameter::ParameterValue,
        skills::{BridgeOperationSkill, SkillParam},
    };

    fn handler() -> Arc<dyn SkillHandler> {
        Arc::new(BridgeOperationSkill::new("scene_status"))
    }

    #[test]
    fn default_catalogue_routes_every_intent() {
        let registry = SkillRegistry::production_default();
        assert_eq!(registry.len(), 10);
        for kind in IntentKind::ALL {
            let params = [ParsedParameter::text("target", "Cube", 0.9)];
            assert!(registry.plan(kind, &params).is_ok(), "{kind:?} has no route");
        }
    }

    #[test]
    fn creation_chain_grows_with_parameters() {
        let registry = SkillRegistry::production_default();
        let names = |params: &[ParsedParameter]| -> Vec<String> {
            registry
                .plan(IntentKind::CreateObject, params)
                .unwrap()
                .iter()
                .map(|skill| skill.spec.name.clone())
                .collect()
        };
        assert_eq!(names(&[]), vec!["create_primitive"]);
        assert_eq!(
            names(&[
                ParsedParameter::enumerated("material", "metallic", &["metallic"], 0.9),
                ParsedParameter::numeric("subdivisions", 2.0, 0.9),
            ]),
            vec!["create_primitive", "apply_material", "apply_subdivision"]
        );
    }

    #[test]
    fn invalid_schemas_are_refused() {
        let mut registry = SkillRegistry::default();
        let twice = SkillSpec::new("twice", SkillCategory::Scene, "bad")
            .param(SkillParam::optional("a", ParameterKind::Numeric))
            .param(SkillParam::optional("a", ParameterKind::String));
        assert!(matches!(
            registry.register(twice, handler()),
            Err(RegistryError::InvalidSchema { .. })
        ));

        let bad_default = SkillSpec::new("bad_default", SkillCategory::Scene, "bad").param(
            SkillParam::optional("count", ParameterKind::Numeric)
                .with_default(ParameterValue::Text("many".into())),
        );
        assert!(registry.register(bad_default, handler()).is_err());

        let ok = SkillSpec::new("ok", SkillCategory::Scene, "fine");
        registry.register(ok.clone(), handler()).unwrap();
        assert_eq!(
            registry.register(ok, handler()),
            Err(RegistryError::Duplicate("ok".into()))
        );
        assert_eq!(
            registry.route(IntentKind::Select, "missing"),
            Err(RegistryError::UnknownSkill("missing".into()))
        );
        assert!(matches!(
            registry.plan(IntentKind::Select, &[]),
            Err(RegistryError::NoSkill(_))
        ));
    }

    #[test]
    fn suggestions_match_name_category_and_description() {
        let registry = SkillRegistry::production_default();
        assert!(registry.suggest("light").contains(&"setup_lighting".to_string()));
        assert!(registry.suggest("PBR").contains(&"apply_material".to_string()));
        assert_eq!(registry.suggest("scene").len(), 3);
        assert!(registry.suggest("  ").is_empty());
    }

    #[test]
    fn describe_marks_required_parameters() {
        let registry = SkillRegistry::production_default();
        let material = registry
            .describe()
            .into_iter()
            .find(|entry| entry.name == "apply_material")
            .unwrap();
        assert_eq!(material.parameters[0], "target*");
        assert!((material.stats.success_rate - 1.0).abs() < f64::EPSILON);
    }
}
