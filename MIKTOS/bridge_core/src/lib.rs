#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Miktos command bridge: turns natural-language commands into validated,
//! session-aware operations on a 3D host.

/// Host adapters: the socket bridge and the in-process loopback.
pub mod bridge;

/// Layered configuration for every pipeline component.
pub mod config;

/// Per-session conversational state and reference resolution.
pub mod context;

/// Pipeline-level errors.
pub mod error;

/// Intent vocabulary and the structured intent record.
pub mod intent;

/// Typed parameter values shared by parser, safety, and skills.
pub mod parameter;

/// Rule-based command parser.
pub mod parser;

/// Parse, validate, dispatch facade.
pub mod pipeline;

/// Safety rules, range limits, and resource estimation.
pub mod safety;

/// Session store with a single in-flight command per session.
pub mod session;

/// Skill registry, built-in catalogue, and dispatcher.
pub mod skills;

/// Structured log and event emission.
pub mod telemetry;

/// Prelude exports for embedding the bridge.
pub mod prelude {
    pub use crate::bridge::{
        BridgeAdapter, BridgeError, BridgeParams, BridgeResponse, LoopbackBridge, TcpBridge,
    };
    pub use crate::config::{
        BridgeConfig, BusyPolicy, DispatchConfig, ParserConfig, SafetyConfig, ValidationLevel,
    };
    pub use crate::context::{SessionContext, SessionSnapshot};
    pub use crate::error::PipelineError;
    pub use crate::intent::{Intent, IntentKind};
    pub use crate::parameter::{ParameterKind, ParameterValue, ParsedParameter};
    pub use crate::parser::{CommandParser, ParseFailure, ParseOutcome};
    pub use crate::pipeline::{
        CommandPipeline, CommandPipelineBuilder, CommandResponse, ResponseStatus,
    };
    pub use crate::safety::{SafetyManager, SafetyVerdict, VerdictStatus, Violation};
    pub use crate::session::SessionStore;
    pub use crate::skills::{
        SkillDispatcher, SkillError, SkillHandler, SkillRegistry, SkillResult, SkillSpec,
    };
    pub use crate::telemetry::{PipelineTelemetry, PipelineTelemetryBuilder};
}
