use async_trait::async_trait;

use super::{SkillCategory, SkillError, SkillHandler, SkillParam, SkillSpec};
use crate::{
    bridge::{BridgeAdapter, BridgeParams, BridgeResponse},
    parameter::{ParameterKind, ParameterValue},
};

/// Skill forwarding its parameters to one host operation.
#[derive(Debug, Clone)]
pub struct BridgeOperationSkill {
    operation: String,
}

impl BridgeOperationSkill {
    /// Forwards to `operation`.
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Host operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

#[async_trait]
impl SkillHandler for BridgeOperationSkill {
    async fn invoke(
        &self,
        params: &BridgeParams,
        bridge: &dyn BridgeAdapter,
    ) -> Result<BridgeResponse, SkillError> {
        Ok(bridge.execute(&self.operation, params).await?)
    }
}

fn target() -> SkillParam {
    SkillParam::required("target", ParameterKind::String)
}

fn numeric(name: &str) -> SkillParam {
    SkillParam::optional(name, ParameterKind::Numeric)
}

fn vector(name: &str) -> SkillParam {
    SkillParam::optional(name, ParameterKind::Vector)
}

/// Schemas of the default catalogue. Skill names equal host operation names.
#[must_use]
pub fn catalogue() -> Vec<SkillSpec> {
    vec![
        SkillSpec::new(
            "create_primitive",
            SkillCategory::Modeling,
            "Create cubes, spheres, cylinders, planes, cones, tori and monkeys",
        )
        .complexity(0.2)
        .param(
            SkillParam::optional("shape", ParameterKind::Enum)
                .with_default(ParameterValue::Text("cube".into())),
        )
        .param(vector("size"))
        .param(vector("location"))
        .param(numeric("count").with_default(ParameterValue::Number(1.0)))
        .param(SkillParam::optional("name", ParameterKind::String))
        .param(numeric("scale"))
        .param(numeric("rotation")),
        SkillSpec::new(
            "apply_material",
            SkillCategory::Materials,
            "Apply a PBR material or colour to an object",
        )
        .complexity(0.3)
        .param(target())
        .param(SkillParam::optional("material", ParameterKind::Enum))
        .param(vector("color"))
        .param(numeric("roughness"))
        .param(numeric("metallic"))
        .param(numeric("strength"))
        .param(numeric("texture_resolution")),
        SkillSpec::new(
            "apply_subdivision",
            SkillCategory::Modeling,
            "Add a subdivision surface modifier",
        )
        .complexity(0.4)
        .param(target())
        .param(numeric("subdivisions").with_default(ParameterValue::Number(1.0))),
        SkillSpec::new(
            "transform_object",
            SkillCategory::Modeling,
            "Move, rotate or scale an object",
        )
        .complexity(0.1)
        .param(target())
        .param(SkillParam::optional("operation", ParameterKind::Enum))
        .param(vector("location"))
        .param(numeric("rotation"))
        .param(numeric("scale")),
        SkillSpec::new(
            "setup_lighting",
            SkillCategory::Lighting,
            "Build a lighting rig: three point, studio, HDRI, sun or single lights",
        )
        .complexity(0.4)
        .param(
            SkillParam::optional("lighting_type", ParameterKind::Enum)
                .with_default(ParameterValue::Text("three_point".into())),
        )
        .param(numeric("intensity"))
        .param(vector("color"))
        .param(vector("location")),
        SkillSpec::new(
            "animate_object",
            SkillCategory::Animation,
            "Insert keyframes for rotation, movement, scaling or bouncing",
        )
        .complexity(0.5)
        .param(target())
        .param(SkillParam::optional("animation_type", ParameterKind::Enum))
        .param(numeric("frame_start"))
        .param(numeric("frame_end"))
        .param(numeric("frame_count")),
        SkillSpec::new(
            "duplicate_object",
            SkillCategory::Modeling,
            "Duplicate an object one or more times",
        )
        .complexity(0.2)
        .param(target())
        .param(numeric("count").with_default(ParameterValue::Number(1.0)))
        .param(vector("location")),
        SkillSpec::new("select_objects", SkillCategory::Scene, "Select objects by name or all")
            .complexity(0.1)
            .param(SkillParam::optional("target", ParameterKind::String))
            .param(SkillParam::optional("all", ParameterKind::Boolean)),
        SkillSpec::new("delete_objects", SkillCategory::Scene, "Delete objects by name or all")
            .complexity(0.1)
            .param(SkillParam::optional("target", ParameterKind::String))
            .param(SkillParam::optional("all", ParameterKind::Boolean)),
        SkillSpec::new("scene_status", SkillCategory::Scene, "Report the objects in the scene")
            .complexity(0.1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::LoopbackBridge;

    #[tokio::test]
    async fn forwards_to_the_named_operation() {
        let bridge = LoopbackBridge::new();
        let skill = BridgeOperationSkill::new("scene_status");
        skill.invoke(&BridgeParams::new(), &bridge).await.unwrap();
        assert_eq!(bridge.operations(), vec!["scene_status"]);
    }

    #[test]
    fn catalogue_names_are_unique() {
        let specs = catalogue();
        let mut names: Vec<&str> = specs.iter().map(|spec| spec.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), specs.len());
    }
}
