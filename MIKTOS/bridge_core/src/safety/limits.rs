use std::ops::ControlFlow;

use super::{Review, RuleFlow, Violation, ViolationRule};
use crate::{
    config::{ParameterLimit, SafetyConfig, ValidationLevel},
    parameter::{ParameterKind, ParameterValue, ParsedParameter},
};

enum Check {
    Ok,
    Advisory(Violation),
    OutOfRange(ParameterValue, String),
    Blocked(Violation),
}

/// Rule 1: type resolution plus range and vocabulary checks.
///
/// Parameters whose kind cannot be resolved are rejected. Out-of-range values
/// are clamped or rejected according to the validation level; `high` allows
/// a single clamp per command.
pub fn check_parameters(config: &SafetyConfig, review: &mut Review) -> RuleFlow {
    let mut clamps = 0_usize;
    for idx in 0..review.params.len() {
        let param = review.params[idx].clone();
        match check(&param, config.parameter_limits.get(&param.name)) {
            Check::Ok => {}
            Check::Advisory(warning) => review.warn(warning),
            Check::Blocked(violation) => return ControlFlow::Break(violation),
            Check::OutOfRange(clamped, detail) => {
                let allowed = match config.validation_level {
                    ValidationLevel::Low | ValidationLevel::Normal => true,
                    ValidationLevel::High => clamps == 0,
                    ValidationLevel::Strict => false,
                };
                if !allowed {
                    let message = if config.validation_level == ValidationLevel::High {
                        format!("{detail}; only one parameter may be corrected at level high")
                    } else {
                        detail
                    };
                    return ControlFlow::Break(
                        Violation::blocking(ViolationRule::Range, message).on(&param.name),
                    );
                }
                clamps += 1;
                let warning = Violation::warning(
                    ViolationRule::Range,
                    format!("{detail}; clamped to {clamped}"),
                )
                .on(&param.name);
                review.correct(&param.name, clamped, warning);
            }
        }
    }
    ControlFlow::Continue(())
}

fn check(param: &ParsedParameter, limit: Option<&ParameterLimit>) -> Check {
    let name = param.name.as_str();
    match param.resolved_kind() {
        ParameterKind::Unknown => Check::Blocked(
            Violation::blocking(
                ViolationRule::UnknownType,
                format!("parameter '{name}' has no recognisable type"),
            )
            .on(name),
        ),
        ParameterKind::Numeric => {
            let Some(value) = param.as_f64() else {
                return Check::Ok;
            };
            check_scalar(name, value, limit)
        }
        ParameterKind::Vector => {
            let values = param.value.as_vector().unwrap_or_default();
            if values.iter().any(|value| !value.is_finite()) {
                return Check::Blocked(
                    Violation::blocking(
                        ViolationRule::Range,
                        format!("parameter '{name}' contains a non-finite component"),
                    )
                    .on(name),
                );
            }
            let Some(limit) = limit else {
                return Check::Ok;
            };
            if values.iter().all(|value| limit.contains(*value)) {
                return Check::Ok;
            }
            let clamped: Vec<f64> = values.iter().map(|value| limit.clamp(*value)).collect();
            Check::OutOfRange(
                ParameterValue::Vector(clamped),
                format!(
                    "parameter '{name}' has components outside [{}, {}]",
                    limit.min, limit.max
                ),
            )
        }
        ParameterKind::Enum => {
            let value = param.as_text().unwrap_or_default();
            if param.allowed.is_empty() || param.allowed.iter().any(|choice| choice == value) {
                Check::Ok
            } else {
                Check::Blocked(
                    Violation::blocking(
                        ViolationRule::Range,
                        format!(
                            "'{value}' is not a valid {name}; expected one of {}",
                            param.allowed.join(", ")
                        ),
                    )
                    .on(name),
                )
            }
        }
        ParameterKind::String | ParameterKind::Boolean => Check::Ok,
    }
}

fn check_scalar(name: &str, value: f64, limit: Option<&ParameterLimit>) -> Check {
    if !value.is_finite() {
        return Check::Blocked(
            Violation::blocking(
                ViolationRule::Range,
                format!("parameter '{name}' is not a finite number"),
            )
            .on(name),
        );
    }
    let Some(limit) = limit else {
        return Check::Ok;
    };
    if !limit.contains(value) {
        return Check::OutOfRange(
            ParameterValue::Number(limit.clamp(value)),
            format!(
                "parameter '{name}' = {value} is outside [{}, {}]",
                limit.min, limit.max
            ),
        );
    }
    match limit.warning_threshold {
        Some(threshold) if value > threshold => Check::Advisory(
            Violation::warning(
                ViolationRule::Range,
                format!("parameter '{name}' = {value} is above the advisory level {threshold}"),
            )
            .on(name),
        ),
        _ => Check::Ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::Severity;

    fn review(params: Vec<ParsedParameter>) -> Review {
        Review::new(&params)
    }

    #[test]
    fn advisory_threshold_warns_without_correction() {
        let config = SafetyConfig::default();
        let mut review = review(vec![ParsedParameter::numeric("count", 60.0, 0.9)]);
        assert!(check_parameters(&config, &mut review).is_continue());
        assert!(!review.corrected);
        assert_eq!(review.violations.len(), 1);
        assert_eq!(review.violations[0].severity, Severity::Warning);
    }

    #[test]
    fn vectors_are_clamped_per_component() {
        let config = SafetyConfig::default();
        let mut review = review(vec![ParsedParameter::vector("size", vec![2.0, 500.0, 0.0], 0.9)]);
        assert!(check_parameters(&config, &mut review).is_continue());
        assert!(review.corrected);
        assert_eq!(
            review.params[0].value,
            ParameterValue::Vector(vec![2.0, 100.0, 0.1])
        );
    }

    #[test]
    fn non_finite_values_are_rejected_at_every_level() {
        let config = SafetyConfig::default().with_level(ValidationLevel::Low);
        let mut review = review(vec![ParsedParameter::numeric("scale", f64::NAN, 0.9)]);
        match check_parameters(&config, &mut review) {
            ControlFlow::Break(violation) => assert_eq!(violation.rule, ViolationRule::Range),
            ControlFlow::Continue(()) => panic!("NaN accepted"),
        }
    }

    #[test]
    fn enum_outside_vocabulary_is_rejected() {
        let config = SafetyConfig::default();
        let mut bad = ParsedParameter::enumerated("shape", "cube", &["cube", "sphere"], 0.9);
        bad.value = ParameterValue::Text("dodecahedron".into());
        let mut review = review(vec![bad]);
        assert!(check_parameters(&config, &mut review).is_break());
    }
}
