use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};

use super::{rules::objects_added, Review, RuleFlow, Violation, ViolationRule};
use crate::{
    config::{SafetyConfig, ValidationLevel},
    context::SessionContext,
    intent::Intent,
    parameter::ParameterValue,
};

const PER_OBJECT_COST: f64 = 0.002;
const SUBDIVISION_SCALE: f64 = 16_384.0;
const TEXTURE_SCALE: f64 = 8192.0;
const MIN_TEXTURE: u32 = 512;

/// Heuristic cost of executing an intent.
///
/// `score = objects * (0.002 + 4^level / 16384) + (texture / 8192)^2`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResourceImpact {
    /// Combined score; `1.0` is the default budget.
    pub score: f64,
    /// Objects affected.
    pub objects: usize,
    /// Subdivision level.
    pub subdivision_level: u32,
    /// Texture edge length in pixels.
    pub texture_resolution: u32,
}

impl ResourceImpact {
    /// Scores raw inputs.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    pub fn score(objects: usize, subdivision_level: u32, texture_resolution: u32) -> Self {
        let level = subdivision_level.min(16);
        let geometry = objects as f64 * (PER_OBJECT_COST + 4_f64.powi(level as i32) / SUBDIVISION_SCALE);
        let texture = (f64::from(texture_resolution) / TEXTURE_SCALE).powi(2);
        Self {
            score: geometry + texture,
            objects,
            subdivision_level,
            texture_resolution,
        }
    }

    /// Scores the parameters currently under review.
    #[must_use]
    pub fn estimate(
        intent: &Intent,
        context: &SessionContext,
        review: &Review,
    ) -> Self {
        let (level, texture) = heavy_parameters(review);
        Self::score(affected_objects(intent, context, review), level, texture)
    }
}

fn affected_objects(intent: &Intent, context: &SessionContext, review: &Review) -> usize {
    let added = objects_added(intent, review);
    if added > 0 {
        added
    } else if review.flag("all") {
        context.scene_objects.len().max(1)
    } else {
        1
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn heavy_parameters(review: &Review) -> (u32, u32) {
    let level = review
        .number("subdivisions")
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(0, |v| v.round() as u32);
    let texture = review
        .number("texture_resolution")
        .filter(|v| v.is_finite() && *v > 0.0)
        .map_or(0, |v| v.round() as u32);
    (level, texture)
}

/// Rule 6: scale down heavy parameters or reject when over budget.
///
/// Subdivision levels are lowered first, then textures halved (not below
/// 512 px). Scores above the hard limit, strict mode, or budgets that cannot
/// be met by scaling reject the command.
pub fn enforce_budget(
    intent: &Intent,
    context: &SessionContext,
    config: &SafetyConfig,
    review: &mut Review,
) -> RuleFlow {
    let objects = affected_objects(intent, context, review);
    let (mut level, mut texture) = heavy_parameters(review);
    let initial = ResourceImpact::score(objects, level, texture);
    if initial.score <= config.resource_budget {
        return ControlFlow::Continue(());
    }
    let over = format!(
        "estimated resource impact {:.2} exceeds the budget {:.2}",
        initial.score, config.resource_budget
    );
    if config.validation_level == ValidationLevel::Strict
        || initial.score > config.resource_hard_limit
    {
        return ControlFlow::Break(Violation::blocking(ViolationRule::ResourceBudget, over));
    }

    let has_level = review.number("subdivisions").is_some();
    let has_texture = review.number("texture_resolution").is_some();
    let mut current = initial;
    while current.score > config.resource_budget {
        if has_level && level > 0 {
            level -= 1;
        } else if has_texture && texture > MIN_TEXTURE {
            texture = (texture / 2).max(MIN_TEXTURE);
        } else {
            return ControlFlow::Break(Violation::blocking(
                ViolationRule::ResourceBudget,
                format!("{over} and cannot be reduced further"),
            ));
        }
        current = ResourceImpact::score(objects, level, texture);
    }

    if has_level && level != initial.subdivision_level {
        review.correct(
            "subdivisions",
            ParameterValue::Number(f64::from(level)),
            Violation::warning(
                ViolationRule::ResourceBudget,
                format!("{over}; subdivision level lowered to {level}"),
            )
            .on("subdivisions"),
        );
    }
    if has_texture && texture != initial.texture_resolution {
        review.correct(
            "texture_resolution",
            ParameterValue::Number(f64::from(texture)),
            Violation::warning(
                ViolationRule::ResourceBudget,
                format!("{over}; texture resolution lowered to {texture}"),
            )
            .on("texture_resolution"),
        );
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intent::IntentKind,
        parameter::ParsedParameter,
        safety::{SafetyManager, VerdictStatus},
    };

    fn create(count: f64, level: f64) -> Intent {
        Intent::new(IntentKind::CreateObject, 0.9, "create cubes")
            .with_parameter(ParsedParameter::enumerated("shape", "cube", &["cube"], 0.9))
            .with_parameter(ParsedParameter::numeric("count", count, 0.9))
            .with_parameter(ParsedParameter::numeric("subdivisions", level, 0.9))
    }

    #[test]
    fn cheap_operations_stay_under_budget() {
        let impact = ResourceImpact::score(1, 2, 1024);
        assert!(impact.score < 0.1);
        let ctx = SessionContext::new("s", 10);
        let verdict = SafetyManager::new(&SafetyConfig::default()).validate(&create(2.0, 2.0), &ctx);
        assert_eq!(verdict.status, VerdictStatus::Approved);
        assert!(verdict.resource_impact.score < 1.0);
    }

    #[test]
    fn heavy_subdivision_is_scaled_down() {
        let ctx = SessionContext::new("s", 10);
        let verdict =
            SafetyManager::new(&SafetyConfig::default()).validate(&create(10.0, 6.0), &ctx);
        assert_eq!(verdict.status, VerdictStatus::AutoCorrected);
        let level = verdict
            .corrected_parameters
            .unwrap()
            .into_iter()
            .find(|p| p.name == "subdivisions")
            .unwrap();
        assert_eq!(level.value, ParameterValue::Number(5.0));
        assert!(verdict.resource_impact.score <= 1.0);
        assert!(verdict
            .violations
            .iter()
            .any(|v| v.rule == ViolationRule::ResourceBudget));
    }

    #[test]
    fn far_over_budget_is_rejected() {
        let ctx = SessionContext::new("s", 10);
        let verdict =
            SafetyManager::new(&SafetyConfig::default()).validate(&create(40.0, 6.0), &ctx);
        assert_eq!(verdict.status, VerdictStatus::Rejected);
        assert_eq!(verdict.blocking_violation().unwrap().code(), "RESOURCE_BUDGET");
    }
}
