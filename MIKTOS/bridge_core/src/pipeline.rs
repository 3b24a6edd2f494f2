//! End-to-end command handling: parse, validate, dispatch, remember.

use std::{sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_event_bus::{EventPublisher, FileEventPublisher};
use shared_logging::LogLevel;
use tokio::sync::Mutex;

use crate::{
    bridge::{BridgeAdapter, LoopbackBridge},
    config::BridgeConfig,
    context::SessionSnapshot,
    error::PipelineError,
    intent::{Intent, IntentKind},
    parser::{CommandParser, ParseOutcome},
    safety::{SafetyManager, SafetyVerdict, VerdictStatus, Violation},
    session::SessionStore,
    skills::{SkillDescription, SkillDispatcher, SkillRegistry, SkillResult},
    telemetry::PipelineTelemetry,
};

/// How a command ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Dispatched and succeeded.
    Executed,
    /// Dispatched and failed.
    Failed,
    /// Refused by the safety manager.
    Rejected,
    /// Parser needs a clearer command.
    Clarification,
    /// Another command is in flight on the session.
    Busy,
}

impl ResponseStatus {
    /// Returns a short label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Clarification => "clarification",
            Self::Busy => "busy",
        }
    }
}

/// Result of one submitted command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResponse {
    /// Session the command ran in.
    pub session_id: String,
    /// Whether the command executed successfully.
    pub success: bool,
    /// Outcome class.
    pub status: ResponseStatus,
    /// Machine-readable code for anything but success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable summary.
    pub message: String,
    /// Recognised operation, when parsing got that far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentKind>,
    /// Safety findings, warnings included.
    pub violations: Vec<Violation>,
    /// Objects the command touched.
    pub object_names_affected: Vec<String>,
    /// Seconds from submission to response.
    pub execution_time: f64,
    /// Example commands offered with a clarification request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl CommandResponse {
    fn new(session_id: &str, status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            success: status == ResponseStatus::Executed,
            status,
            code: None,
            message: message.into(),
            intent: None,
            violations: Vec::new(),
            object_names_affected: Vec::new(),
            execution_time: 0.0,
            suggestions: Vec::new(),
        }
    }

    fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn finished(mut self, started: Instant) -> Self {
        self.execution_time = started.elapsed().as_secs_f64();
        self
    }
}

/// Builder for [`CommandPipeline`].
pub struct CommandPipelineBuilder {
    config: BridgeConfig,
    bridge: Option<Arc<dyn BridgeAdapter>>,
    registry: Option<Arc<SkillRegistry>>,
    telemetry: Option<PipelineTelemetry>,
    host_lock: Option<Arc<Mutex<()>>>,
}

impl CommandPipelineBuilder {
    /// Starts from `config`.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            bridge: None,
            registry: None,
            telemetry: None,
            host_lock: None,
        }
    }

    /// Host adapter; defaults to a [`LoopbackBridge`].
    #[must_use]
    pub fn bridge(mut self, bridge: Arc<dyn BridgeAdapter>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// Skill catalogue; defaults to [`SkillRegistry::production_default`].
    #[must_use]
    pub fn registry(mut self, registry: Arc<SkillRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Telemetry handle; defaults to the sinks named in the configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Host lock shared with other pipelines driving the same host.
    #[must_use]
    pub fn host_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.host_lock = Some(lock);
        self
    }

    /// Validates the configuration and assembles the pipeline.
    pub fn build(self) -> Result<CommandPipeline, PipelineError> {
        let config = self.config;
        config
            .validate()
            .map_err(|err| PipelineError::Config(err.to_string()))?;
        let telemetry = match self.telemetry {
            Some(telemetry) => Some(telemetry),
            None => telemetry_from_config(&config)?,
        };
        let bridge = self
            .bridge
            .unwrap_or_else(|| Arc::new(LoopbackBridge::new()) as Arc<dyn BridgeAdapter>);
        let registry = self.registry.unwrap_or_else(|| {
            Arc::new(SkillRegistry::production_with_window(
                config.dispatch.stats_window,
            ))
        });
        let mut dispatcher = SkillDispatcher::new(registry, bridge, &config.dispatch);
        if let Some(lock) = self.host_lock {
            dispatcher = dispatcher.with_host_lock(lock);
        }
        Ok(CommandPipeline {
            parser: CommandParser::new(&config.parser),
            safety: SafetyManager::new(&config.safety),
            sessions: SessionStore::new(&config.session, &config.dispatch),
            dispatcher,
            telemetry,
        })
    }
}

fn rejected(session_id: &str, intent: &Intent, verdict: SafetyVerdict) -> CommandResponse {
    let blocking = verdict.blocking_violation();
    let code = blocking.map_or("REJECTED", Violation::code);
    let message = blocking.map_or_else(
        || "command rejected".to_string(),
        |violation| violation.message.clone(),
    );
    let mut response =
        CommandResponse::new(session_id, ResponseStatus::Rejected, message).with_code(code);
    response.intent = Some(intent.kind);
    response.violations = verdict.violations;
    response
}

fn telemetry_from_config(config: &BridgeConfig) -> Result<Option<PipelineTelemetry>, PipelineError> {
    let settings = &config.telemetry;
    if settings.log_path.is_none() && settings.event_log.is_none() {
        return Ok(None);
    }
    let mut builder = PipelineTelemetry::builder("miktos.pipeline");
    if let Some(path) = &settings.log_path {
        builder = builder.log_path(path);
    }
    if let Some(path) = &settings.event_log {
        let publisher = FileEventPublisher::new(path)
            .map_err(|err| PipelineError::Config(format!("event log: {err:#}")))?;
        builder = builder.event_publisher(Arc::new(publisher) as Arc<dyn EventPublisher>);
    }
    builder
        .build()
        .map(Some)
        .map_err(|err| PipelineError::Config(format!("telemetry: {err:#}")))
}

/// Session-aware command pipeline.
///
/// Each command is parsed against its session's context, validated, and,
/// when allowed, dispatched. Context updates from one command are visible to
/// the next command on the same session.
pub struct CommandPipeline {
    parser: CommandParser,
    safety: SafetyManager,
    dispatcher: SkillDispatcher,
    sessions: SessionStore,
    telemetry: Option<PipelineTelemetry>,
}

impl CommandPipeline {
    /// Returns a builder.
    #[must_use]
    pub fn builder(config: BridgeConfig) -> CommandPipelineBuilder {
        CommandPipelineBuilder::new(config)
    }

    /// Parser in use.
    #[must_use]
    pub const fn parser(&self) -> &CommandParser {
        &self.parser
    }

    /// Safety manager in use.
    #[must_use]
    pub const fn safety(&self) -> &SafetyManager {
        &self.safety
    }

    /// Dispatcher in use.
    #[must_use]
    pub const fn dispatcher(&self) -> &SkillDispatcher {
        &self.dispatcher
    }

    /// Session store.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Opens `id`; returns `false` when it was already open.
    pub fn open_session(&self, id: impl Into<String>) -> bool {
        self.sessions.open_session(id)
    }

    /// Closes `id`, returning its final state.
    pub fn close_session(&self, id: &str) -> Option<SessionSnapshot> {
        self.sessions.close_session(id)
    }

    /// Current state of `id`.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        self.sessions.snapshot(id)
    }

    /// Completion suggestions for a partial command.
    #[must_use]
    pub fn suggest(&self, partial: &str) -> Vec<String> {
        self.parser.suggest(partial)
    }

    /// Skill catalogue with statistics.
    #[must_use]
    pub fn skills(&self) -> Vec<SkillDescription> {
        self.dispatcher.registry().describe()
    }

    /// Runs `text` on session `session_id`.
    pub async fn submit(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<CommandResponse, PipelineError> {
        self.run(session_id, text, false).await
    }

    /// Runs `text` with destructive effects confirmed.
    pub async fn submit_confirmed(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<CommandResponse, PipelineError> {
        self.run(session_id, text, true).await
    }

    async fn run(
        &self,
        session_id: &str,
        text: &str,
        confirmed: bool,
    ) -> Result<CommandResponse, PipelineError> {
        let started = Instant::now();
        self.record(
            LogLevel::Info,
            "pipeline.command.received",
            json!({ "session_id": session_id, "text": text, "confirmed": confirmed }),
        )
        .await;

        let guard = match self.sessions.acquire(session_id).await {
            Ok(guard) => guard,
            Err(err @ PipelineError::Busy { .. }) => {
                self.record(
                    LogLevel::Warn,
                    "pipeline.session.busy",
                    json!({ "session_id": session_id, "error": err.to_string() }),
                )
                .await;
                return Ok(CommandResponse::new(session_id, ResponseStatus::Busy, err.to_string())
                    .with_code(err.code())
                    .finished(started));
            }
            Err(err) => return Err(err),
        };

        let parsed = {
            let context = guard.context();
            match self.parser.parse(text, &context) {
                ParseOutcome::Unresolved { failure, candidate } => Err((failure, candidate)),
                ParseOutcome::Resolved(mut intent) => {
                    intent.confirmed |= confirmed;
                    let verdict = self.safety.validate(&intent, &context);
                    Ok((intent, verdict))
                }
            }
        };
        let (intent, verdict) = match parsed {
            Ok(validated) => validated,
            Err((failure, candidate)) => {
                self.record(
                    LogLevel::Info,
                    "pipeline.parse.unresolved",
                    json!({
                        "session_id": session_id,
                        "code": failure.code(),
                        "candidate": candidate.as_ref().map(|intent| intent.kind.label()),
                    }),
                )
                .await;
                let mut response =
                    CommandResponse::new(session_id, ResponseStatus::Clarification, failure.message())
                        .with_code(failure.code());
                response.intent = candidate.map(|intent| intent.kind);
                response.suggestions = self.parser.suggest(text);
                return Ok(response.finished(started));
            }
        };
        self.record(
            LogLevel::Info,
            "pipeline.safety.verdict",
            json!({
                "session_id": session_id,
                "intent": intent.kind.label(),
                "status": verdict.status.label(),
                "violations": verdict.violations.iter().map(Violation::code).collect::<Vec<_>>(),
                "resource_impact": verdict.resource_impact.score,
            }),
        )
        .await;

        if verdict.status == VerdictStatus::Rejected {
            return Ok(rejected(session_id, &intent, verdict).finished(started));
        }

        let parameters = verdict.effective_parameters(&intent).to_vec();
        let result = self.dispatcher.dispatch(&intent, &parameters).await;
        guard
            .context()
            .update_after_dispatch(&intent, &parameters, &result);
        Ok(self
            .dispatched(session_id, &intent, result, verdict.violations)
            .await
            .finished(started))
    }

    async fn dispatched(
        &self,
        session_id: &str,
        intent: &Intent,
        result: SkillResult,
        violations: Vec<Violation>,
    ) -> CommandResponse {
        let status = if result.success {
            ResponseStatus::Executed
        } else {
            ResponseStatus::Failed
        };
        let (level, key) = if result.success {
            (LogLevel::Info, "pipeline.dispatch.completed")
        } else {
            (LogLevel::Error, "pipeline.dispatch.failed")
        };
        self.record(
            level,
            key,
            json!({
                "session_id": session_id,
                "intent": intent.kind.label(),
                "skills": result.skills_used,
                "objects": result.object_names_affected,
                "code": result.error_code(),
                "rolled_back": result.rolled_back,
                "execution_time": result.execution_time,
            }),
        )
        .await;

        let mut response = CommandResponse::new(session_id, status, result.message.clone());
        if let Some(code) = result.error_code() {
            response = response.with_code(code);
        }
        response.intent = Some(intent.kind);
        response.violations = violations;
        response.object_names_affected = result.object_names_affected;
        response
    }

    async fn record(&self, level: LogLevel, key: &str, metadata: Value) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(level, key, metadata.clone());
            let _ = telemetry.event(key, metadata).await;
        }
    }
}
