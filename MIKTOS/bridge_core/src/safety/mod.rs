//! Safety validation between parsing and execution.
//!
//! Rules run in a fixed order: blacklist, operation limit, parameter ranges,
//! object count, complexity, frame range, destructive confirmation, resource
//! budget. A blocking violation stops the chain; auto-corrections are
//! carried forward so later rules see the corrected values. Validation is
//! pure: the same intent and context always produce the same verdict.

use std::{
    fmt,
    ops::ControlFlow,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::SafetyConfig,
    context::SessionContext,
    intent::Intent,
    parameter::{ParameterValue, ParsedParameter},
};

/// Resource-impact scoring.
pub mod impact;
/// Per-parameter range and type checks.
pub mod limits;
/// Scene-level rules.
pub mod rules;

pub use impact::ResourceImpact;

/// Overall outcome of validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    /// Run as parsed.
    Approved,
    /// Run with corrected parameters.
    AutoCorrected,
    /// Do not run.
    Rejected,
}

impl VerdictStatus {
    /// Returns a short label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::AutoCorrected => "AUTO_CORRECTED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// How serious a violation is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; execution continues.
    Warning,
    /// Stops the command.
    Blocking,
}

/// Rule that produced a violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationRule {
    /// Operation is blacklisted.
    Blacklisted,
    /// Intent expands to too many operations.
    OperationLimit,
    /// Value outside its permitted range.
    Range,
    /// Parameter type could not be determined.
    UnknownType,
    /// Scene would hold too many objects.
    CountLimit,
    /// Subdivision level above the cap.
    ComplexityLimit,
    /// Invalid or oversized frame range.
    FrameRange,
    /// Destructive intent lacks confirmation.
    ConfirmationRequired,
    /// Estimated cost above budget.
    ResourceBudget,
}

impl ViolationRule {
    /// Machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Blacklisted => "BLACKLISTED",
            Self::OperationLimit => "OPERATION_LIMIT",
            Self::Range => "RANGE",
            Self::UnknownType => "UNKNOWN_TYPE",
            Self::CountLimit => "COUNT_LIMIT",
            Self::ComplexityLimit => "COMPLEXITY_LIMIT",
            Self::FrameRange => "FRAME_RANGE",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::ResourceBudget => "RESOURCE_BUDGET",
        }
    }
}

impl fmt::Display for ViolationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One finding of the safety manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    /// Rule that fired.
    pub rule: ViolationRule,
    /// Explanation for the user.
    pub message: String,
    /// Whether the command was stopped.
    pub severity: Severity,
    /// Parameter concerned, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl Violation {
    /// Blocking violation.
    #[must_use]
    pub fn blocking(rule: ViolationRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
            severity: Severity::Blocking,
            parameter: None,
        }
    }

    /// Warning violation.
    #[must_use]
    pub fn warning(rule: ViolationRule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
            severity: Severity::Warning,
            parameter: None,
        }
    }

    /// Names the parameter concerned.
    #[must_use]
    pub fn on(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    /// Machine-readable code of the rule.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.rule.code()
    }
}

/// Outcome of validating one intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyVerdict {
    /// Overall status.
    pub status: VerdictStatus,
    /// Full corrected parameter set; present only when auto-corrected.
    pub corrected_parameters: Option<Vec<ParsedParameter>>,
    /// Findings in the order the rules produced them.
    pub violations: Vec<Violation>,
    /// Heuristic cost of the parameters that would run.
    pub resource_impact: ResourceImpact,
}

impl SafetyVerdict {
    /// Whether the command may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.status != VerdictStatus::Rejected
    }

    /// Parameters to execute: corrected ones when present.
    #[must_use]
    pub fn effective_parameters<'a>(&'a self, intent: &'a Intent) -> &'a [ParsedParameter] {
        self.corrected_parameters
            .as_deref()
            .unwrap_or(&intent.parameters)
    }

    /// First blocking violation.
    #[must_use]
    pub fn blocking_violation(&self) -> Option<&Violation> {
        self.violations
            .iter()
            .find(|violation| violation.severity == Severity::Blocking)
    }
}

/// Parameters under review plus the findings so far.
#[derive(Debug, Clone)]
pub struct Review {
    /// Current (possibly corrected) parameters.
    pub params: Vec<ParsedParameter>,
    /// Whether any parameter was changed.
    pub corrected: bool,
    /// Findings so far.
    pub violations: Vec<Violation>,
}

impl Review {
    fn new(params: &[ParsedParameter]) -> Self {
        Self {
            params: params.to_vec(),
            corrected: false,
            violations: Vec::new(),
        }
    }

    /// Numeric value of `name` in the current parameters.
    #[must_use]
    pub fn number(&self, name: &str) -> Option<f64> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .and_then(ParsedParameter::as_f64)
    }

    /// Whether a flag parameter is set.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.params
            .iter()
            .find(|param| param.name == name)
            .and_then(|param| param.value.as_flag())
            .unwrap_or(false)
    }

    /// Replaces the value of `name`, recording the correction and a warning.
    pub fn correct(&mut self, name: &str, value: ParameterValue, warning: Violation) {
        if let Some(slot) = self.params.iter_mut().find(|param| param.name == name) {
            *slot = slot.with_value(value);
            self.corrected = true;
        }
        self.violations.push(warning);
    }

    /// Records a warning.
    pub fn warn(&mut self, warning: Violation) {
        self.violations.push(warning);
    }
}

/// Result of a single rule.
pub type RuleFlow = ControlFlow<Violation>;

/// Validates intents against the configured limits.
#[derive(Debug)]
pub struct SafetyManager {
    config: SafetyConfig,
    validations: AtomicU64,
}

impl SafetyManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            config: config.clone(),
            validations: AtomicU64::new(0),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Number of validations performed.
    #[must_use]
    pub fn validation_count(&self) -> u64 {
        self.validations.load(Ordering::Relaxed)
    }

    /// Validates `intent` against the session state.
    #[must_use]
    pub fn validate(&self, intent: &Intent, context: &SessionContext) -> SafetyVerdict {
        self.validations.fetch_add(1, Ordering::Relaxed);
        let mut review = Review::new(&intent.parameters);
        let flow = self.run_rules(intent, context, &mut review);
        let resource_impact = ResourceImpact::estimate(intent, context, &review);

        if let ControlFlow::Break(violation) = flow {
            review.violations.push(violation);
            return SafetyVerdict {
                status: VerdictStatus::Rejected,
                corrected_parameters: None,
                violations: review.violations,
                resource_impact,
            };
        }
        if review.corrected {
            SafetyVerdict {
                status: VerdictStatus::AutoCorrected,
                corrected_parameters: Some(review.params),
                violations: review.violations,
                resource_impact,
            }
        } else {
            SafetyVerdict {
                status: VerdictStatus::Approved,
                corrected_parameters: None,
                violations: review.violations,
                resource_impact,
            }
        }
    }

    fn run_rules(&self, intent: &Intent, context: &SessionContext, review: &mut Review) -> RuleFlow {
        rules::blacklist(intent, &self.config)?;
        rules::operation_limit(intent, &self.config)?;
        limits::check_parameters(&self.config, review)?;
        rules::object_count(intent, context, &self.config, review)?;
        rules::complexity(&self.config, review)?;
        rules::frame_range(&self.config, review)?;
        rules::destructive(intent, &self.config)?;
        impact::enforce_budget(intent, context, &self.config, review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{ParameterLimit, ValidationLevel},
        intent::IntentKind,
    };

    fn manager(level: ValidationLevel) -> SafetyManager {
        let config = SafetyConfig::default()
            .with_level(level)
            .with_limit("scale", ParameterLimit::new(1.0, 10.0));
        SafetyManager::new(&config)
    }

    fn scale_intent(value: f64) -> Intent {
        Intent::new(IntentKind::Transform, 0.9, "scale it")
            .with_parameter(ParsedParameter::text("target", "Cube", 0.9))
            .with_parameter(ParsedParameter::numeric("scale", value, 0.9))
    }

    fn ctx() -> SessionContext {
        SessionContext::new("s", 10).with_last_object("Cube")
    }

    #[test]
    fn in_range_value_is_approved_without_corrections() {
        let verdict = manager(ValidationLevel::Normal).validate(&scale_intent(5.0), &ctx());
        assert_eq!(verdict.status, VerdictStatus::Approved);
        assert!(verdict.corrected_parameters.is_none());
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn out_of_range_value_is_clamped_under_normal() {
        let verdict = manager(ValidationLevel::Normal).validate(&scale_intent(50.0), &ctx());
        assert_eq!(verdict.status, VerdictStatus::AutoCorrected);
        let corrected = verdict.corrected_parameters.as_ref().unwrap();
        let scale = corrected.iter().find(|p| p.name == "scale").unwrap();
        assert_eq!(scale.value, ParameterValue::Number(10.0));
        assert_eq!(corrected.len(), 2);
        assert_eq!(verdict.violations[0].rule, ViolationRule::Range);
        assert_eq!(verdict.violations[0].severity, Severity::Warning);
    }

    #[test]
    fn out_of_range_value_is_rejected_under_strict() {
        let verdict = manager(ValidationLevel::Strict).validate(&scale_intent(50.0), &ctx());
        assert_eq!(verdict.status, VerdictStatus::Rejected);
        assert!(verdict.corrected_parameters.is_none());
        assert_eq!(verdict.blocking_violation().unwrap().code(), "RANGE");
    }

    #[test]
    fn malformed_parameter_is_rejected_as_unknown_type() {
        let malformed: ParsedParameter =
            serde_json::from_str(r#"{"name":"size","value":null,"confidence":0.9}"#).unwrap();
        let intent = Intent::new(IntentKind::CreateObject, 0.9, "create a cube")
            .with_parameter(malformed);
        for level in [ValidationLevel::Low, ValidationLevel::Strict] {
            let verdict = manager(level).validate(&intent, &ctx());
            assert_eq!(verdict.status, VerdictStatus::Rejected);
            assert_eq!(verdict.violations.last().unwrap().code(), "UNKNOWN_TYPE");
        }
        let missing_value: ParsedParameter =
            serde_json::from_str(r#"{"name":"size"}"#).unwrap();
        let intent = Intent::new(IntentKind::CreateObject, 0.9, "create").with_parameter(missing_value);
        let verdict = manager(ValidationLevel::Normal).validate(&intent, &ctx());
        assert_eq!(verdict.violations.last().unwrap().code(), "UNKNOWN_TYPE");
    }

    #[test]
    fn destructive_intent_needs_confirmation_at_every_level() {
        let intent = Intent::new(IntentKind::DeleteObject, 0.9, "delete it")
            .with_parameter(ParsedParameter::text("target", "Cube", 0.9));
        for level in [
            ValidationLevel::Low,
            ValidationLevel::Normal,
            ValidationLevel::High,
            ValidationLevel::Strict,
        ] {
            let verdict = manager(level).validate(&intent, &ctx());
            assert_eq!(verdict.status, VerdictStatus::Rejected);
            assert_eq!(
                verdict.blocking_violation().unwrap().rule,
                ViolationRule::ConfirmationRequired
            );
        }
        let verdict =
            manager(ValidationLevel::Strict).validate(&intent.clone().confirmed(), &ctx());
        assert_eq!(verdict.status, VerdictStatus::Approved);
    }

    #[test]
    fn validation_is_idempotent() {
        let safety = manager(ValidationLevel::Normal);
        let intent = scale_intent(50.0)
            .with_parameter(ParsedParameter::numeric("rotation", 720.0, 0.9));
        let context = ctx();
        let first = safety.validate(&intent, &context);
        let second = safety.validate(&intent, &context);
        assert_eq!(first, second);
        assert_eq!(safety.validation_count(), 2);
    }

    #[test]
    fn high_level_clamps_one_parameter_only() {
        let safety = manager(ValidationLevel::High);
        let one = safety.validate(&scale_intent(50.0), &ctx());
        assert_eq!(one.status, VerdictStatus::AutoCorrected);
        let two = safety.validate(
            &scale_intent(50.0).with_parameter(ParsedParameter::numeric("rotation", 720.0, 0.9)),
            &ctx(),
        );
        assert_eq!(two.status, VerdictStatus::Rejected);
        assert_eq!(two.blocking_violation().unwrap().parameter.as_deref(), Some("rotation"));
    }

    #[test]
    fn blacklist_and_operation_limit_run_first() {
        let config = SafetyConfig {
            blacklisted_operations: vec!["SET_LIGHTING".into()],
            max_operations_per_command: 2,
            ..SafetyConfig::default()
        };
        let safety = SafetyManager::new(&config);
        let lighting = Intent::new(IntentKind::SetLighting, 0.9, "add studio lights");
        assert_eq!(
            safety.validate(&lighting, &ctx()).violations[0].code(),
            "BLACKLISTED"
        );
        let chain = Intent::new(IntentKind::CreateObject, 0.9, "create a red cube level 2")
            .with_parameter(ParsedParameter::enumerated("shape", "cube", &["cube"], 0.9))
            .with_parameter(ParsedParameter::vector("color", vec![1.0, 0.0, 0.0, 1.0], 0.9))
            .with_parameter(ParsedParameter::numeric("subdivisions", 2.0, 0.9));
        assert_eq!(
            safety.validate(&chain, &ctx()).violations[0].code(),
            "OPERATION_LIMIT"
        );
    }
}
