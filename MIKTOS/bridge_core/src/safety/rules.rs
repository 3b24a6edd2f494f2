use std::ops::ControlFlow;

use super::{Review, RuleFlow, Violation, ViolationRule};
use crate::{
    config::{SafetyConfig, ValidationLevel},
    context::SessionContext,
    intent::Intent,
    parameter::ParameterValue,
};

/// Rejects intents whose label or text matches a blacklisted operation.
pub fn blacklist(intent: &Intent, config: &SafetyConfig) -> RuleFlow {
    let text = intent.raw_text.to_lowercase();
    let hit = config.blacklisted_operations.iter().find(|entry| {
        let entry = entry.trim();
        !entry.is_empty()
            && (entry.eq_ignore_ascii_case(intent.kind.label())
                || text.contains(&entry.to_lowercase()))
    });
    match hit {
        Some(entry) => ControlFlow::Break(Violation::blocking(
            ViolationRule::Blacklisted,
            format!("operation '{entry}' is blacklisted"),
        )),
        None => ControlFlow::Continue(()),
    }
}

/// Rejects intents expanding to more skill operations than allowed.
pub fn operation_limit(intent: &Intent, config: &SafetyConfig) -> RuleFlow {
    let planned = intent.planned_operations();
    if planned > config.max_operations_per_command {
        return ControlFlow::Break(Violation::blocking(
            ViolationRule::OperationLimit,
            format!(
                "command expands to {planned} operations; the limit is {}",
                config.max_operations_per_command
            ),
        ));
    }
    ControlFlow::Continue(())
}

/// Objects a creating intent would add. Counts beyond `usize` saturate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn objects_added(intent: &Intent, review: &Review) -> usize {
    if !intent.kind.creates_objects() {
        return 0;
    }
    review
        .number("count")
        .filter(|count| count.is_finite() && *count >= 1.0)
        .map_or(1, |count| count.round() as usize)
}

/// Rule 2: the projected scene size must stay under the ceiling.
pub fn object_count(
    intent: &Intent,
    context: &SessionContext,
    config: &SafetyConfig,
    review: &Review,
) -> RuleFlow {
    let added = objects_added(intent, review);
    if added == 0 {
        return ControlFlow::Continue(());
    }
    let projected = context.scene_objects.len().saturating_add(added);
    if projected > config.max_scene_objects {
        return ControlFlow::Break(
            Violation::blocking(
                ViolationRule::CountLimit,
                format!(
                    "scene would hold {projected} objects; the limit is {}",
                    config.max_scene_objects
                ),
            )
            .on("count"),
        );
    }
    ControlFlow::Continue(())
}

/// Rule 3: subdivision levels are capped; clamped unless strict.
pub fn complexity(config: &SafetyConfig, review: &mut Review) -> RuleFlow {
    let Some(level) = review.number("subdivisions") else {
        return ControlFlow::Continue(());
    };
    let cap = f64::from(config.max_subdivision_level);
    if (0.0..=cap).contains(&level) {
        return ControlFlow::Continue(());
    }
    let detail = format!("subdivision level {level} is outside [0, {cap}]");
    if config.validation_level == ValidationLevel::Strict {
        return ControlFlow::Break(
            Violation::blocking(ViolationRule::ComplexityLimit, detail).on("subdivisions"),
        );
    }
    let clamped = level.clamp(0.0, cap);
    review.correct(
        "subdivisions",
        ParameterValue::Number(clamped),
        Violation::warning(
            ViolationRule::ComplexityLimit,
            format!("{detail}; clamped to {clamped}"),
        )
        .on("subdivisions"),
    );
    ControlFlow::Continue(())
}

/// Rule 4: frame ranges must be positive and within the maximum span.
pub fn frame_range(config: &SafetyConfig, review: &mut Review) -> RuleFlow {
    let start = review.number("frame_start");
    let end = review.number("frame_end");
    let count = review.number("frame_count");
    if start.is_none() && end.is_none() && count.is_none() {
        return ControlFlow::Continue(());
    }
    let max_span = f64::from(config.max_frame_span);
    let strict = config.validation_level == ValidationLevel::Strict;

    if let Some(count) = count {
        if count <= 0.0 {
            return ControlFlow::Break(
                Violation::blocking(
                    ViolationRule::FrameRange,
                    format!("frame count {count} must be positive"),
                )
                .on("frame_count"),
            );
        }
        if count > max_span {
            let detail = format!("frame count {count} exceeds the maximum span {max_span}");
            if strict {
                return ControlFlow::Break(
                    Violation::blocking(ViolationRule::FrameRange, detail).on("frame_count"),
                );
            }
            review.correct(
                "frame_count",
                ParameterValue::Number(max_span),
                Violation::warning(ViolationRule::FrameRange, format!("{detail}; clamped"))
                    .on("frame_count"),
            );
        }
    }

    match (start, end) {
        (Some(start), _) if start < 0.0 => ControlFlow::Break(
            Violation::blocking(
                ViolationRule::FrameRange,
                format!("start frame {start} must not be negative"),
            )
            .on("frame_start"),
        ),
        (Some(start), Some(end)) if end <= start => ControlFlow::Break(
            Violation::blocking(
                ViolationRule::FrameRange,
                format!("frame range {start}..{end} is empty or inverted"),
            )
            .on("frame_end"),
        ),
        (Some(start), Some(end)) if end - start > max_span => {
            let detail = format!(
                "frame range {start}..{end} spans more than {max_span} frames"
            );
            if strict {
                return ControlFlow::Break(
                    Violation::blocking(ViolationRule::FrameRange, detail).on("frame_end"),
                );
            }
            review.correct(
                "frame_end",
                ParameterValue::Number(start + max_span),
                Violation::warning(ViolationRule::FrameRange, format!("{detail}; shortened"))
                    .on("frame_end"),
            );
            ControlFlow::Continue(())
        }
        (None, Some(end)) if end <= 0.0 => ControlFlow::Break(
            Violation::blocking(
                ViolationRule::FrameRange,
                format!("end frame {end} must be positive"),
            )
            .on("frame_end"),
        ),
        _ => ControlFlow::Continue(()),
    }
}

/// Rule 5: destructive intents need explicit confirmation.
pub fn destructive(intent: &Intent, config: &SafetyConfig) -> RuleFlow {
    if intent.is_destructive()
        && config.destructive_operations_require_confirmation
        && !intent.confirmed
    {
        return ControlFlow::Break(Violation::blocking(
            ViolationRule::ConfirmationRequired,
            format!(
                "{} is destructive; repeat the command with 'confirm' to proceed",
                intent.name()
            ),
        ));
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ParameterLimit, intent::IntentKind, parameter::ParsedParameter,
        safety::SafetyManager,
    };
    use crate::safety::VerdictStatus;

    fn ctx_with(objects: usize) -> SessionContext {
        SessionContext::new("s", 10).with_scene_objects((0..objects).map(|idx| format!("Obj.{idx:03}")))
    }

    #[test]
    fn count_limit_rejects_projected_overflow() {
        let config = SafetyConfig {
            max_scene_objects: 5,
            ..SafetyConfig::default()
        };
        let intent = Intent::new(IntentKind::CreateObject, 0.9, "add three cubes")
            .with_parameter(ParsedParameter::numeric("count", 3.0, 0.9));
        let verdict = SafetyManager::new(&config).validate(&intent, &ctx_with(3));
        assert_eq!(verdict.status, VerdictStatus::Rejected);
        assert_eq!(verdict.violations[0].code(), "COUNT_LIMIT");
        let verdict = SafetyManager::new(&config).validate(&intent, &ctx_with(2));
        assert_eq!(verdict.status, VerdictStatus::Approved);
    }

    #[test]
    fn huge_count_without_a_count_limit_is_rejected() {
        let config = SafetyConfig {
            parameter_limits: [("size".to_string(), ParameterLimit::new(0.1, 100.0))]
                .into_iter()
                .collect(),
            ..SafetyConfig::default()
        };
        let intent = Intent::new(IntentKind::CreateObject, 0.9, "add many cubes")
            .with_parameter(ParsedParameter::numeric("count", 1e20, 0.9));
        let verdict = SafetyManager::new(&config).validate(&intent, &ctx_with(1));
        assert_eq!(verdict.status, VerdictStatus::Rejected);
        assert_eq!(verdict.violations[0].code(), "COUNT_LIMIT");
    }

    #[test]
    fn subdivisions_are_clamped_unless_strict() {
        let intent = Intent::new(IntentKind::Subdivide, 0.9, "subdivide it 9 times")
            .with_parameter(ParsedParameter::numeric("subdivisions", 9.0, 0.9));
        let verdict = SafetyManager::new(&SafetyConfig::default()).validate(&intent, &ctx_with(1));
        assert_eq!(verdict.status, VerdictStatus::AutoCorrected);
        assert!(verdict
            .violations
            .iter()
            .any(|v| v.rule == ViolationRule::ComplexityLimit));
        let corrected = verdict.corrected_parameters.unwrap();
        assert_eq!(corrected[0].value, ParameterValue::Number(6.0));

        let strict = SafetyConfig::default().with_level(ValidationLevel::Strict);
        let verdict = SafetyManager::new(&strict).validate(&intent, &ctx_with(1));
        assert_eq!(verdict.status, VerdictStatus::Rejected);
        assert_eq!(verdict.violations[0].code(), "COMPLEXITY_LIMIT");
    }

    #[test]
    fn frame_ranges_are_checked() {
        let safety = SafetyManager::new(&SafetyConfig::default());
        let inverted = Intent::new(IntentKind::Animate, 0.9, "animate from frame 50 to 10")
            .with_parameter(ParsedParameter::numeric("frame_start", 50.0, 0.9))
            .with_parameter(ParsedParameter::numeric("frame_end", 10.0, 0.9));
        assert_eq!(
            safety.validate(&inverted, &ctx_with(1)).violations[0].code(),
            "FRAME_RANGE"
        );

        let long = Intent::new(IntentKind::Animate, 0.9, "animate from frame 1 to 20001")
            .with_parameter(ParsedParameter::numeric("frame_start", 1.0, 0.9))
            .with_parameter(ParsedParameter::numeric("frame_end", 20_001.0, 0.9));
        let verdict = safety.validate(&long, &ctx_with(1));
        assert_eq!(verdict.status, VerdictStatus::AutoCorrected);
        let end = verdict
            .corrected_parameters
            .unwrap()
            .into_iter()
            .find(|p| p.name == "frame_end")
            .unwrap();
        assert_eq!(end.value, ParameterValue::Number(10_001.0));

        let zero = Intent::new(IntentKind::Animate, 0.9, "animate for 0 frames")
            .with_parameter(ParsedParameter::numeric("frame_count", 0.0, 0.9));
        assert_eq!(safety.validate(&zero, &ctx_with(1)).status, VerdictStatus::Rejected);
    }

    #[test]
    fn confirmation_can_be_disabled() {
        let config = SafetyConfig {
            destructive_operations_require_confirmation: false,
            ..SafetyConfig::default()
        };
        let intent = Intent::new(IntentKind::DeleteObject, 0.9, "delete it");
        assert!(destructive(&intent, &config).is_continue());
    }
}
