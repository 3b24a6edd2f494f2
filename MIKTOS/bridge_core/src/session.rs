use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use indexmap::IndexMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::{
    config::{BusyPolicy, DispatchConfig, SessionConfig},
    context::{SessionContext, SessionSnapshot},
    error::PipelineError,
};

struct SessionSlot {
    context: Mutex<SessionContext>,
    gate: Arc<Semaphore>,
    waiting: AtomicUsize,
}

struct Waiting<'a>(&'a AtomicUsize);

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive right to run one command on a session.
///
/// Dropping the guard lets the next queued command in.
pub struct SessionGuard {
    slot: Arc<SessionSlot>,
    _permit: OwnedSemaphorePermit,
}

impl SessionGuard {
    /// Locks the session context. Do not hold the lock across an `.await`.
    pub fn context(&self) -> MutexGuard<'_, SessionContext> {
        self.slot.context.lock()
    }
}

/// Owns one [`SessionContext`] per session id and admits at most one
/// in-flight command per session.
///
/// Waiting commands are admitted in arrival order. With
/// [`BusyPolicy::Reject`], or once `max_queue_depth` commands are waiting,
/// further commands are refused as busy.
pub struct SessionStore {
    sessions: RwLock<IndexMap<String, Arc<SessionSlot>>>,
    history_capacity: usize,
    busy_policy: BusyPolicy,
    max_queue_depth: usize,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(session: &SessionConfig, dispatch: &DispatchConfig) -> Self {
        Self {
            sessions: RwLock::new(IndexMap::new()),
            history_capacity: session.history_capacity,
            busy_policy: dispatch.busy_policy,
            max_queue_depth: dispatch.max_queue_depth,
        }
    }

    /// Opens `id`; returns `false` when it was already open.
    pub fn open_session(&self, id: impl Into<String>) -> bool {
        let id = id.into();
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&id) {
            return false;
        }
        let slot = SessionSlot {
            context: Mutex::new(SessionContext::new(id.clone(), self.history_capacity)),
            gate: Arc::new(Semaphore::new(1)),
            waiting: AtomicUsize::new(0),
        };
        sessions.insert(id, Arc::new(slot));
        true
    }

    /// Opens a session under a fresh id.
    pub fn open_anonymous(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.open_session(id.clone());
        id
    }

    /// Closes `id`, returning its final state. Queued commands are refused.
    pub fn close_session(&self, id: &str) -> Option<SessionSnapshot> {
        let slot = self.sessions.write().shift_remove(id)?;
        slot.gate.close();
        let snapshot = slot.context.lock().snapshot();
        Some(snapshot)
    }

    /// Current state of `id`.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        let slot = self.sessions.read().get(id).cloned()?;
        let snapshot = slot.context.lock().snapshot();
        Some(snapshot)
    }

    /// Whether `id` is open.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Commands currently waiting on `id`.
    #[must_use]
    pub fn waiting(&self, id: &str) -> usize {
        self.sessions
            .read()
            .get(id)
            .map_or(0, |slot| slot.waiting.load(Ordering::SeqCst))
    }

    /// Waits for, or refuses, the in-flight slot of `id`.
    pub async fn acquire(&self, id: &str) -> Result<SessionGuard, PipelineError> {
        let slot = self
            .sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownSession(id.to_string()))?;
        let busy = |waiting: usize| PipelineError::Busy {
            session: id.to_string(),
            waiting,
        };

        if let Ok(permit) = Arc::clone(&slot.gate).try_acquire_owned() {
            return Ok(SessionGuard {
                slot,
                _permit: permit,
            });
        }
        if self.busy_policy == BusyPolicy::Reject {
            return Err(busy(slot.waiting.load(Ordering::SeqCst)));
        }

        let queued = slot.waiting.fetch_add(1, Ordering::SeqCst);
        let marker = Waiting(&slot.waiting);
        if queued >= self.max_queue_depth {
            drop(marker);
            return Err(busy(queued));
        }
        let permit = Arc::clone(&slot.gate)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::UnknownSession(id.to_string()))?;
        drop(marker);
        Ok(SessionGuard {
            slot,
            _permit: permit,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn store(policy: BusyPolicy, depth: usize) -> SessionStore {
        let dispatch = DispatchConfig {
            busy_policy: policy,
            max_queue_depth: depth,
            ..DispatchConfig::default()
        };
        SessionStore::new(&SessionConfig::default(), &dispatch)
    }

    #[tokio::test]
    async fn unknown_sessions_are_errors() {
        let sessions = store(BusyPolicy::Queue, 4);
        assert!(matches!(
            sessions.acquire("nope").await,
            Err(PipelineError::UnknownSession(_))
        ));
        assert!(sessions.open_session("a"));
        assert!(!sessions.open_session("a"));
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn reject_policy_reports_busy() {
        let sessions = store(BusyPolicy::Reject, 4);
        sessions.open_session("a");
        let held = sessions.acquire("a").await.unwrap();
        assert_eq!(sessions.acquire("a").await.err().map(|e| e.code()), Some("BUSY"));
        drop(held);
        assert!(sessions.acquire("a").await.is_ok());
    }

    #[tokio::test]
    async fn queued_commands_run_in_arrival_order() {
        let sessions = Arc::new(store(BusyPolicy::Queue, 8));
        sessions.open_session("a");
        let held = sessions.acquire("a").await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for idx in 0..4 {
            let task_sessions = Arc::clone(&sessions);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let guard = task_sessions.acquire("a").await.unwrap();
                order.lock().push(idx);
                guard.context().bind(format!("v{idx}"), crate::parameter::ParameterValue::Number(0.0));
            }));
            while sessions.waiting("a") <= idx {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
        drop(held);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
        assert_eq!(sessions.snapshot("a").unwrap().variable_bindings.len(), 4);
    }

    #[tokio::test]
    async fn queue_depth_is_bounded() {
        let sessions = Arc::new(store(BusyPolicy::Queue, 1));
        sessions.open_session("a");
        let held = sessions.acquire("a").await.unwrap();
        let waiter = {
            let sessions = Arc::clone(&sessions);
            tokio::spawn(async move { sessions.acquire("a").await.is_ok() })
        };
        while sessions.waiting("a") == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(matches!(
            sessions.acquire("a").await,
            Err(PipelineError::Busy { waiting: 1, .. })
        ));
        drop(held);
        assert!(waiter.await.unwrap());
        assert_eq!(sessions.waiting("a"), 0);
    }

    #[tokio::test]
    async fn closing_wakes_waiters_and_returns_state() {
        let sessions = Arc::new(store(BusyPolicy::Queue, 4));
        sessions.open_session("a");
        let held = sessions.acquire("a").await.unwrap();
        let waiter = {
            let sessions = Arc::clone(&sessions);
            tokio::spawn(async move { sessions.acquire("a").await.is_err() })
        };
        while sessions.waiting("a") == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let snapshot = sessions.close_session("a").unwrap();
        assert_eq!(snapshot.session_id, "a");
        assert!(waiter.await.unwrap());
        drop(held);
        assert!(sessions.snapshot("a").is_none());
    }
}
