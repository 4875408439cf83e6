//! Session Store (C7): a concurrent `id -> Session` mapping with a capacity
//! cap and the temp-id/real-id rekey step.
//!
//! Grounded in the teacher's `AnyAgent` registry pattern (a `Mutex`-guarded
//! map keyed by session id, looked up by the websocket bridge), generalized
//! to hold one `Arc<Mutex<Session>>` per entry so the Session Manager can
//! clone a handle out and release the store lock before doing any
//! longer-running work under the session's own guard.

use crate::session::{Session, SessionId, SessionStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("capacity exceeded: {active} active sessions >= max_sessions {max}")]
    CapacityExceeded { active: usize, max: usize },
    #[error("no session with id {0}")]
    NotFound(String),
}

pub type SharedSession = Arc<AsyncMutex<Session>>;

struct Inner {
    sessions: HashMap<SessionId, SharedSession>,
    /// Insertion order, oldest first. Drives the approval-lookup fallback
    /// ("most recently inserted session still on a temp id").
    order: Vec<SessionId>,
}

pub struct SessionStore {
    inner: Mutex<Inner>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                order: Vec::new(),
            }),
            max_sessions,
        }
    }

    fn count_active_locked(inner: &Inner) -> usize {
        inner
            .sessions
            .values()
            .filter(|s| {
                s.try_lock()
                    .map(|s| s.process.is_some())
                    .unwrap_or(false)
            })
            .count()
    }

    pub fn count_active(&self) -> usize {
        Self::count_active_locked(&self.inner.lock().unwrap())
    }

    /// Insert a freshly created session, rejecting if doing so would exceed
    /// `max_sessions` active (live-process) sessions. A terminal session
    /// never counts against capacity, so this only actually gates fresh
    /// `start`/resume spawns.
    pub fn insert(&self, id: SessionId, session: Session) -> Result<SharedSession, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if session.process.is_some() {
            let active = Self::count_active_locked(&inner);
            if active >= self.max_sessions {
                return Err(StoreError::CapacityExceeded {
                    active,
                    max: self.max_sessions,
                });
            }
        }
        let shared = Arc::new(AsyncMutex::new(session));
        inner.order.push(id.clone());
        inner.sessions.insert(id, shared.clone());
        Ok(shared)
    }

    pub fn get(&self, id: &SessionId) -> Option<SharedSession> {
        self.inner.lock().unwrap().sessions.get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<SharedSession> {
        let mut inner = self.inner.lock().unwrap();
        inner.order.retain(|existing| existing != id);
        inner.sessions.remove(id)
    }

    /// Atomically move a session from `old_id` to `new_id`. After this call
    /// the session is reachable only under `new_id` — the old id is dropped
    /// from both the map and the insertion order, never left dangling.
    pub fn rekey(&self, old_id: &SessionId, new_id: SessionId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let shared = inner
            .sessions
            .remove(old_id)
            .ok_or_else(|| StoreError::NotFound(old_id.to_string()))?;
        for slot in inner.order.iter_mut() {
            if slot == old_id {
                *slot = new_id.clone();
            }
        }
        inner.sessions.insert(new_id, shared);
        Ok(())
    }

    pub fn for_each(&self, mut f: impl FnMut(&SessionId, &SharedSession)) {
        let inner = self.inner.lock().unwrap();
        for id in &inner.order {
            if let Some(session) = inner.sessions.get(id) {
                f(id, session);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().sessions.len()
    }

    /// Claude's permission-prompt tool posts this literal value as `sessionId`
    /// when it fires before Claude has told us its own session id — i.e.
    /// before our `Init` event has rekeyed the store from temp to real. It is
    /// never a valid real session id, so it's safe to use as the marker for
    /// "approval arrived too early to be labelled."
    pub const UNINITIALIZED_SESSION_LABEL: &str = "";

    /// Resolve an approval request's session label: exact match; else, if
    /// the label is the "not yet initialized" sentinel, the most recently
    /// inserted session still on a temp id (covers the race where the
    /// approval fires before the agent's `Init` event); else the most
    /// recently created session in `ACTIVE`/`AWAITING_INPUT` (covers a label
    /// naming some other, stale or unrelated, session).
    pub async fn resolve_approval_target(&self, label: &str) -> Option<(SessionId, SharedSession)> {
        let exact_id = SessionId::real(label.to_string());
        if let Some(shared) = self.get(&exact_id) {
            return Some((exact_id, shared));
        }

        let candidates: Vec<(SessionId, SharedSession)> = {
            let inner = self.inner.lock().unwrap();
            inner
                .order
                .iter()
                .rev()
                .filter_map(|id| inner.sessions.get(id).map(|s| (id.clone(), s.clone())))
                .collect()
        };

        if label == Self::UNINITIALIZED_SESSION_LABEL {
            for (id, shared) in &candidates {
                if id.is_temp() {
                    return Some((id.clone(), shared.clone()));
                }
            }
        }

        for (id, shared) in &candidates {
            let status = shared.lock().await.status;
            if matches!(status, SessionStatus::Active | SessionStatus::AwaitingInput) {
                return Some((id.clone(), shared.clone()));
            }
        }

        None
    }
}
