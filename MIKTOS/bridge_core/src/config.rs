use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Longest accepted per-skill timeout, one day.
pub const MAX_SKILL_TIMEOUT_SECS: f64 = 86_400.0;

/// Strictness applied to out-of-range parameters.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Always clamp.
    Low,
    /// Clamp, warn on advisory thresholds.
    #[default]
    Normal,
    /// Clamp at most one parameter per command, reject beyond that.
    High,
    /// Reject every out-of-range value.
    Strict,
}

impl ValidationLevel {
    /// Returns a short label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Strict => "strict",
        }
    }
}

/// Behaviour when a command arrives while the session is executing another.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Wait in FIFO order.
    #[default]
    Queue,
    /// Answer immediately with `BUSY`.
    Reject,
}

/// Permitted range of one named parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ParameterLimit {
    /// Lowest accepted value.
    pub min: f64,
    /// Highest accepted value.
    pub max: f64,
    /// Advisory level above which a warning is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<f64>,
}

impl ParameterLimit {
    /// Range without a warning threshold.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            warning_threshold: None,
        }
    }

    /// Attaches a warning threshold.
    #[must_use]
    pub const fn warn_above(mut self, threshold: f64) -> Self {
        self.warning_threshold = Some(threshold);
        self
    }

    /// Whether `value` lies in `[min, max]`.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Nearest permitted value.
    #[must_use]
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Parser settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParserConfig {
    /// Minimum confidence for an intent to be dispatched.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Longest accepted command, in characters.
    #[serde(default = "default_max_command_length")]
    pub max_command_length: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_command_length: default_max_command_length(),
        }
    }
}

/// Safety manager settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SafetyConfig {
    /// Strictness for range violations.
    #[serde(default)]
    pub validation_level: ValidationLevel,
    /// Most skill operations one command may expand to.
    #[serde(default = "default_max_operations")]
    pub max_operations_per_command: usize,
    /// Ceiling on the projected scene object count.
    #[serde(default = "default_max_scene_objects")]
    pub max_scene_objects: usize,
    /// Highest subdivision level.
    #[serde(default = "default_max_subdivision_level")]
    pub max_subdivision_level: u32,
    /// Longest animation span, in frames.
    #[serde(default = "default_max_frame_span")]
    pub max_frame_span: u32,
    /// Require confirmation for destructive intents.
    #[serde(default = "default_true")]
    pub destructive_operations_require_confirmation: bool,
    /// Resource score above which heavy parameters are scaled down.
    #[serde(default = "default_resource_budget")]
    pub resource_budget: f64,
    /// Resource score above which the command is rejected outright.
    #[serde(default = "default_resource_hard_limit")]
    pub resource_hard_limit: f64,
    /// Intent labels or phrases that are never executed.
    #[serde(default)]
    pub blacklisted_operations: Vec<String>,
    /// Range table keyed by parameter name. Entries read from a file are
    /// merged over the built-in table.
    #[serde(
        default = "default_parameter_limits",
        deserialize_with = "merge_parameter_limits"
    )]
    pub parameter_limits: IndexMap<String, ParameterLimit>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            validation_level: ValidationLevel::default(),
            max_operations_per_command: default_max_operations(),
            max_scene_objects: default_max_scene_objects(),
            max_subdivision_level: default_max_subdivision_level(),
            max_frame_span: default_max_frame_span(),
            destructive_operations_require_confirmation: true,
            resource_budget: default_resource_budget(),
            resource_hard_limit: default_resource_hard_limit(),
            blacklisted_operations: Vec::new(),
            parameter_limits: default_parameter_limits(),
        }
    }
}

impl SafetyConfig {
    /// Returns a copy using the given validation level.
    #[must_use]
    pub fn with_level(mut self, level: ValidationLevel) -> Self {
        self.validation_level = level;
        self
    }

    /// Returns a copy with `name` limited to `limit`.
    #[must_use]
    pub fn with_limit(mut self, name: impl Into<String>, limit: ParameterLimit) -> Self {
        self.parameter_limits.insert(name.into(), limit);
        self
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Default per-skill timeout.
    #[serde(default = "default_skill_timeout_secs")]
    pub skill_timeout_secs: f64,
    /// Queue or reject concurrent commands on one session.
    #[serde(default)]
    pub busy_policy: BusyPolicy,
    /// Most commands waiting on one session.
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    /// Retries for transient bridge failures.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Initial retry backoff.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Serialise host calls across every session.
    #[serde(default = "default_true")]
    pub serialize_host: bool,
    /// Samples kept per skill for rolling statistics.
    #[serde(default = "default_stats_window")]
    pub stats_window: usize,
}

impl DispatchConfig {
    /// Default per-skill timeout as a `Duration`, clamped to `MAX_SKILL_TIMEOUT_SECS`.
    #[must_use]
    pub fn skill_timeout(&self) -> Duration {
        let secs = self.skill_timeout_secs.min(MAX_SKILL_TIMEOUT_SECS);
        Duration::try_from_secs_f64(secs)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_skill_timeout_secs()))
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            skill_timeout_secs: default_skill_timeout_secs(),
            busy_policy: BusyPolicy::default(),
            max_queue_depth: default_max_queue_depth(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            serialize_host: true,
            stats_window: default_stats_window(),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Entries retained in `command_history`.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
        }
    }
}

/// Telemetry destinations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// JSON-lines log file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// JSON-lines event file.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Parser settings.
    #[serde(default)]
    pub parser: ParserConfig,
    /// Safety settings.
    #[serde(default)]
    pub safety: SafetyConfig,
    /// Dispatcher settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl BridgeConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parses and validates TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no component can run with.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.parser.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("parser.confidence_threshold must be within [0, 1], got {threshold}");
        }
        if self.parser.max_command_length == 0 {
            bail!("parser.max_command_length must be positive");
        }
        if self.session.history_capacity == 0 {
            bail!("session.history_capacity must be positive");
        }
        let timeout = self.dispatch.skill_timeout_secs;
        if timeout.is_nan() || timeout <= 0.0 || timeout > MAX_SKILL_TIMEOUT_SECS {
            bail!(
                "dispatch.skill_timeout_secs must be within (0, {MAX_SKILL_TIMEOUT_SECS}], got {timeout}"
            );
        }
        if self.dispatch.stats_window == 0 {
            bail!("dispatch.stats_window must be positive");
        }
        if self.safety.max_operations_per_command == 0 {
            bail!("safety.max_operations_per_command must be positive");
        }
        if !(self.safety.resource_budget > 0.0
            && self.safety.resource_hard_limit >= self.safety.resource_budget)
        {
            bail!("safety.resource_hard_limit must be at least safety.resource_budget (> 0)");
        }
        for (name, limit) in &self.safety.parameter_limits {
            if !limit.min.is_finite() || !limit.max.is_finite() || limit.min > limit.max {
                bail!(
                    "safety.parameter_limits.{name} has an invalid range [{}, {}]",
                    limit.min,
                    limit.max
                );
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_confidence_threshold() -> f32 {
    0.6
}

fn default_max_command_length() -> usize {
    1000
}

fn default_max_operations() -> usize {
    10
}

fn default_max_scene_objects() -> usize {
    1000
}

fn default_max_subdivision_level() -> u32 {
    6
}

fn default_max_frame_span() -> u32 {
    10_000
}

fn default_resource_budget() -> f64 {
    1.0
}

fn default_resource_hard_limit() -> f64 {
    4.0
}

fn default_skill_timeout_secs() -> f64 {
    30.0
}

fn default_max_queue_depth() -> usize {
    16
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_stats_window() -> usize {
    50
}

fn default_history_capacity() -> usize {
    100
}

fn default_parameter_limits() -> IndexMap<String, ParameterLimit> {
    [
        ("scale", ParameterLimit::new(0.001, 1000.0).warn_above(100.0)),
        ("rotation", ParameterLimit::new(-360.0, 360.0).warn_above(180.0)),
        ("count", ParameterLimit::new(1.0, 100.0).warn_above(50.0)),
        ("size", ParameterLimit::new(0.1, 100.0)),
        ("intensity", ParameterLimit::new(0.0, 10_000.0).warn_above(5000.0)),
        ("roughness", ParameterLimit::new(0.0, 1.0)),
        ("metallic", ParameterLimit::new(0.0, 1.0)),
        ("strength", ParameterLimit::new(0.0, 10.0)),
        ("extrude_distance", ParameterLimit::new(0.0, 1000.0).warn_above(100.0)),
        ("bevel_offset", ParameterLimit::new(0.0, 10.0).warn_above(5.0)),
        ("particle_count", ParameterLimit::new(1.0, 100_000.0).warn_above(10_000.0)),
    ]
    .into_iter()
    .map(|(name, limit)| (name.to_string(), limit))
    .collect()
}

fn merge_parameter_limits<'de, D>(
    deserializer: D,
) -> Result<IndexMap<String, ParameterLimit>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let overrides = IndexMap::<String, ParameterLimit>::deserialize(deserializer)?;
    let mut limits = default_parameter_limits();
    limits.extend(overrides);
    Ok(limits)
}
