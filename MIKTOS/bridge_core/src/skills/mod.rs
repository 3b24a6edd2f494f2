//! Skill schemas, registry and dispatcher.
//!
//! A skill is a named, schema-typed unit of host work. The registry maps
//! intents to ordered skill chains; the dispatcher checks parameters against
//! each skill's schema, executes the chain through a [`BridgeAdapter`] and
//! folds the outcome into a [`SkillResult`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    bridge::{BridgeAdapter, BridgeError, BridgeParams, BridgeResponse},
    parameter::{ParameterKind, ParameterValue},
};

/// Host-operation skills seeded into the default catalogue.
pub mod builtin;
/// Chain execution with timeout, retry and rollback.
pub mod dispatcher;
/// Skill catalogue and intent routing.
pub mod registry;
/// Rolling per-skill statistics.
pub mod stats;

pub use builtin::BridgeOperationSkill;
pub use dispatcher::SkillDispatcher;
pub use registry::{RegisteredSkill, SkillDescription, SkillRegistry};
pub use stats::{SkillStatsSnapshot, StatsBook};

/// Machine-readable failure attached to an unsuccessful [`SkillResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Stable code such as `TIMEOUT` or `BRIDGE_REJECTED`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorDetail {
    /// Creates a detail.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outcome of one dispatched intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillResult {
    /// Whether every step succeeded.
    pub success: bool,
    /// Summary.
    pub message: String,
    /// Objects touched, in the order the host reported them.
    pub object_names_affected: Vec<String>,
    /// Objects that now exist because of this dispatch.
    #[serde(default)]
    pub objects_created: Vec<String>,
    /// Objects that no longer exist because of this dispatch.
    #[serde(default)]
    pub objects_removed: Vec<String>,
    /// Wall-clock seconds spent dispatching.
    pub execution_time: f64,
    /// Present only when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    /// Skills executed, in order.
    #[serde(default)]
    pub skills_used: Vec<String>,
    /// Objects created by earlier steps were removed after a failure.
    #[serde(default)]
    pub rolled_back: bool,
}

impl SkillResult {
    /// Successful result with a message.
    #[must_use]
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            object_names_affected: Vec::new(),
            objects_created: Vec::new(),
            objects_removed: Vec::new(),
            execution_time: 0.0,
            error_detail: None,
            skills_used: Vec::new(),
            rolled_back: false,
        }
    }

    /// Failed result. A missing detail is recorded as a generic `SKILL` failure.
    #[must_use]
    pub fn failed(message: impl Into<String>, detail: Option<ErrorDetail>) -> Self {
        let message = message.into();
        let detail = detail.unwrap_or_else(|| ErrorDetail::new("SKILL", message.clone()));
        Self {
            success: false,
            error_detail: Some(detail),
            ..Self::succeeded(message)
        }
    }

    /// Error code of a failed result.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error_detail.as_ref().map(|detail| detail.code.as_str())
    }
}

/// Functional area of a skill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkillCategory {
    /// Geometry creation and editing.
    Modeling,
    /// Shading.
    Materials,
    /// Light rigs.
    Lighting,
    /// Keyframes.
    Animation,
    /// Selection, deletion and queries.
    Scene,
}

impl SkillCategory {
    /// Returns a short label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Modeling => "modeling",
            Self::Materials => "materials",
            Self::Lighting => "lighting",
            Self::Animation => "animation",
            Self::Scene => "scene",
        }
    }
}

/// One declared skill parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillParam {
    /// Parameter name.
    pub name: String,
    /// Accepted kind.
    pub kind: ParameterKind,
    /// Must be supplied by the intent or a default.
    pub required: bool,
    /// Value used when the intent omits the parameter.
    pub default: Option<ParameterValue>,
}

impl SkillParam {
    /// Mandatory parameter.
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    /// Optional parameter.
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Sets a default.
    #[must_use]
    pub fn with_default(mut self, value: ParameterValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Converts `value` to this parameter's kind when compatible.
    ///
    /// Enumerations and strings are interchangeable and a scalar fills a
    /// three-component vector.
    #[must_use]
    pub fn coerce(&self, value: &ParameterValue) -> Option<ParameterValue> {
        match self.kind {
            ParameterKind::Numeric => value.as_f64().map(ParameterValue::Number),
            ParameterKind::String | ParameterKind::Enum => {
                value.as_text().map(|text| ParameterValue::Text(text.to_string()))
            }
            ParameterKind::Boolean => value.as_flag().map(ParameterValue::Flag),
            ParameterKind::Vector => value
                .as_vector()
                .or_else(|| value.as_f64().map(|scalar| vec![scalar; 3]))
                .map(ParameterValue::Vector),
            ParameterKind::Unknown => None,
        }
    }
}

/// Registration record: name, category and parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillSpec {
    /// Unique skill name.
    pub name: String,
    /// Functional area.
    pub category: SkillCategory,
    /// One-line description.
    pub description: String,
    /// Relative cost in `[0, 1]`.
    pub complexity: f32,
    /// Declared parameters.
    pub parameters: Vec<SkillParam>,
    /// Overrides the dispatcher's default timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl SkillSpec {
    /// Creates a spec without parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, category: SkillCategory, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category,
            description: description.into(),
            complexity: 0.5,
            parameters: Vec::new(),
            timeout: None,
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, param: SkillParam) -> Self {
        self.parameters.push(param);
        self
    }

    /// Sets the complexity.
    #[must_use]
    pub const fn complexity(mut self, complexity: f32) -> Self {
        self.complexity = complexity;
        self
    }

    /// Sets a per-skill timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Declared parameter called `name`.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&SkillParam> {
        self.parameters.iter().find(|param| param.name == name)
    }
}

/// Failure raised by a skill handler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SkillError {
    /// Host boundary failure.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// Skill logic refused the parameters.
    #[error("skill failed: {0}")]
    Logic(String),
}

impl SkillError {
    /// Only connection-level bridge failures are retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Bridge(err) => err.is_transient(),
            Self::Logic(_) => false,
        }
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Bridge(err) => err.code(),
            Self::Logic(_) => "SKILL",
        }
    }
}

/// Invalid registrations and routing gaps.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A skill with this name exists.
    #[error("skill '{0}' is already registered")]
    Duplicate(String),
    /// Schema rejected at registration.
    #[error("invalid schema for skill '{skill}': {reason}")]
    InvalidSchema {
        /// Skill name.
        skill: String,
        /// What is wrong.
        reason: String,
    },
    /// Route names an unregistered skill.
    #[error("skill '{0}' is not registered")]
    UnknownSkill(String),
    /// No skill handles this intent.
    #[error("no skill is routed for {0}")]
    NoSkill(String),
}

impl RegistryError {
    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Duplicate(_) => "DUPLICATE_SKILL",
            Self::InvalidSchema { .. } => "INVALID_SCHEMA",
            Self::UnknownSkill(_) | Self::NoSkill(_) => "NO_SKILL",
        }
    }
}

/// Executable body of a skill.
#[async_trait]
pub trait SkillHandler: Send + Sync {
    /// Runs the skill with schema-checked parameters.
    async fn invoke(
        &self,
        params: &BridgeParams,
        bridge: &dyn BridgeAdapter,
    ) -> Result<BridgeResponse, SkillError>;
}
