use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use indexmap::IndexSet;
use rand::Rng;
use serde_json::Value;
use tokio::{sync::Mutex, time::timeout};

use super::{ErrorDetail, RegisteredSkill, SkillError, SkillRegistry, SkillResult, SkillSpec};
use crate::{
    bridge::{BridgeAdapter, BridgeParams, BridgeResponse},
    config::DispatchConfig,
    intent::Intent,
    parameter::{ParameterValue, ParsedParameter},
};

const MAX_BACKOFF_MS: u64 = 5_000;

enum StepFailure {
    Schema(String),
    Timeout(Duration),
    Skill(SkillError),
}

impl StepFailure {
    fn detail(&self, skill: &str) -> ErrorDetail {
        match self {
            Self::Schema(reason) => {
                ErrorDetail::new("SCHEMA_MISMATCH", format!("{skill}: {reason}"))
            }
            Self::Timeout(limit) => ErrorDetail::new(
                "TIMEOUT",
                format!("{skill} exceeded {:.1}s; re-query host state", limit.as_secs_f64()),
            ),
            Self::Skill(err) => ErrorDetail::new(err.code(), format!("{skill}: {err}")),
        }
    }
}

#[derive(Default)]
struct ChainOutcome {
    messages: Vec<String>,
    affected: IndexSet<String>,
    created: IndexSet<String>,
    removed: IndexSet<String>,
    skills_used: Vec<String>,
}

/// Executes approved intents as skill chains against a bridge.
///
/// Every step is schema-checked, bounded by a timeout and retried on
/// transient bridge failures. When a later step fails, objects created by
/// earlier steps are deleted again unless the failure was a timeout, in
/// which case host state is unknown.
pub struct SkillDispatcher {
    registry: Arc<SkillRegistry>,
    bridge: Arc<dyn BridgeAdapter>,
    config: DispatchConfig,
    host_lock: Option<Arc<Mutex<()>>>,
    dispatches: AtomicU64,
}

impl SkillDispatcher {
    /// Creates a dispatcher. With `serialize_host` every call through this
    /// dispatcher holds one host-wide lock.
    #[must_use]
    pub fn new(
        registry: Arc<SkillRegistry>,
        bridge: Arc<dyn BridgeAdapter>,
        config: &DispatchConfig,
    ) -> Self {
        let host_lock = config.serialize_host.then(|| Arc::new(Mutex::new(())));
        Self {
            registry,
            bridge,
            config: config.clone(),
            host_lock,
            dispatches: AtomicU64::new(0),
        }
    }

    /// Shares a host lock with other dispatchers talking to the same host.
    #[must_use]
    pub fn with_host_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.host_lock = Some(lock);
        self
    }

    /// Registry in use.
    #[must_use]
    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    /// Bridge in use.
    #[must_use]
    pub fn bridge(&self) -> &Arc<dyn BridgeAdapter> {
        &self.bridge
    }

    /// Intents dispatched so far.
    #[must_use]
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::SeqCst)
    }

    /// Runs the skill chain for `intent` with the post-validation
    /// `parameters`. Never fails; problems are reported in the result.
    pub async fn dispatch(&self, intent: &Intent, parameters: &[ParsedParameter]) -> SkillResult {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let chain = match self.registry.plan(intent.kind, parameters) {
            Ok(chain) => chain,
            Err(err) => {
                let mut result = SkillResult::failed(
                    err.to_string(),
                    Some(ErrorDetail::new(err.code(), err.to_string())),
                );
                result.execution_time = started.elapsed().as_secs_f64();
                return result;
            }
        };

        let _host = match &self.host_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let mut outcome = ChainOutcome::default();
        let mut chain_targets: Vec<String> = Vec::new();
        for skill in chain {
            let name = skill.spec.name.clone();
            outcome.skills_used.push(name.clone());
            let targets: Vec<Option<&str>> =
                if chain_targets.is_empty() || skill.spec.parameter("target").is_none() {
                    vec![None]
                } else {
                    chain_targets.iter().map(|target| Some(target.as_str())).collect()
                };
            let mut created_here = Vec::new();
            for target in targets {
                let step_started = Instant::now();
                let step = match bind(&skill.spec, parameters, target) {
                    Ok(params) => self.run_step(&skill, &params).await,
                    Err(reason) => Err(StepFailure::Schema(reason)),
                };
                self.registry
                    .stats()
                    .record(&name, step.is_ok(), step_started.elapsed());
                match step {
                    Ok(response) => {
                        created_here.extend(response.objects_created.iter().cloned());
                        outcome.absorb(response);
                    }
                    Err(failure) => return self.abandon(&name, failure, outcome, started).await,
                }
            }
            if chain_targets.is_empty() {
                chain_targets = created_here;
            }
        }

        let mut result = SkillResult::succeeded(outcome.messages.join("; "));
        result.object_names_affected = outcome.affected.into_iter().collect();
        result.objects_created = outcome.created.into_iter().collect();
        result.objects_removed = outcome.removed.into_iter().collect();
        result.skills_used = outcome.skills_used;
        result.execution_time = started.elapsed().as_secs_f64();
        result
    }

    async fn abandon(
        &self,
        skill: &str,
        failure: StepFailure,
        outcome: ChainOutcome,
        started: Instant,
    ) -> SkillResult {
        let rolled_back = if matches!(failure, StepFailure::Timeout(_)) {
            false
        } else {
            self.roll_back(&outcome.created).await
        };
        let detail = failure.detail(skill);
        let mut result = SkillResult::failed(detail.message.clone(), Some(detail));
        result.skills_used = outcome.skills_used;
        result.rolled_back = rolled_back;
        if !rolled_back {
            result.object_names_affected = outcome.affected.into_iter().collect();
        }
        result.execution_time = started.elapsed().as_secs_f64();
        result
    }

    async fn run_step(
        &self,
        skill: &RegisteredSkill,
        params: &BridgeParams,
    ) -> Result<BridgeResponse, StepFailure> {
        let limit = skill
            .spec
            .timeout
            .unwrap_or_else(|| self.config.skill_timeout());
        match timeout(limit, self.attempt(skill, params)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(StepFailure::Skill(err)),
            Err(_) => {
                tracing::warn!(
                    skill = %skill.spec.name,
                    timeout_secs = limit.as_secs_f64(),
                    "skill timed out"
                );
                Err(StepFailure::Timeout(limit))
            }
        }
    }

    async fn attempt(
        &self,
        skill: &RegisteredSkill,
        params: &BridgeParams,
    ) -> Result<BridgeResponse, SkillError> {
        let mut retries = 0_u32;
        loop {
            match skill.handler.invoke(params, self.bridge.as_ref()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && retries < self.config.retry_attempts => {
                    retries += 1;
                    let backoff = self.backoff(retries);
                    tracing::warn!(
                        skill = %skill.spec.name,
                        retries,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient bridge failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        let initial = self.config.retry_backoff_ms;
        let base = initial
            .saturating_mul(2_u64.saturating_pow(retry.saturating_sub(1)))
            .min(MAX_BACKOFF_MS);
        let jitter = if initial > 1 {
            rand::thread_rng().gen_range(0..=initial / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }

    async fn roll_back(&self, created: &IndexSet<String>) -> bool {
        if created.is_empty() {
            return false;
        }
        let mut params = BridgeParams::new();
        params.insert(
            "targets".into(),
            ParameterValue::Raw(Value::Array(
                created.iter().cloned().map(Value::String).collect(),
            )),
        );
        match self.bridge.execute("delete_objects", &params).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, objects = created.len(), "rollback failed");
                false
            }
        }
    }
}

impl ChainOutcome {
    fn absorb(&mut self, response: BridgeResponse) {
        if !response.message.is_empty() {
            self.messages.push(response.message);
        }
        for name in &response.objects_removed {
            self.created.shift_remove(name);
        }
        self.affected.extend(response.objects_created.iter().cloned());
        self.affected.extend(response.objects_affected);
        self.created.extend(response.objects_created);
        self.removed.extend(response.objects_removed);
    }
}

/// Builds the bridge parameters for one step from the intent parameters.
///
/// Undeclared parameters are dropped, declared ones coerced to the schema
/// kind, missing ones filled from defaults. An object created by an earlier
/// step replaces the intent's target.
fn bind(
    spec: &SkillSpec,
    parameters: &[ParsedParameter],
    chain_target: Option<&str>,
) -> Result<BridgeParams, String> {
    let mut params = BridgeParams::new();
    for declared in &spec.parameters {
        let supplied = if declared.name == "target" {
            chain_target
                .map(|target| ParameterValue::Text(target.to_string()))
                .or_else(|| find(parameters, &declared.name))
        } else {
            find(parameters, &declared.name)
        };
        match supplied.or_else(|| declared.default.clone()) {
            Some(value) => {
                let coerced = declared.coerce(&value).ok_or_else(|| {
                    format!(
                        "parameter '{}' = {value} is not a {}",
                        declared.name,
                        declared.kind.label()
                    )
                })?;
                params.insert(declared.name.clone(), coerced);
            }
            None if declared.required => {
                return Err(format!("missing required parameter '{}'", declared.name));
            }
            None => {}
        }
    }
    Ok(params)
}

fn find(parameters: &[ParsedParameter], name: &str) -> Option<ParameterValue> {
    parameters
        .iter()
        .find(|param| param.name == name)
        .map(|param| param.value.clone())
}
