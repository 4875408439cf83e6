//! Question Registry (C4): tracks pending operator questions, arms a
//! timeout per question, and guarantees exactly-once resolution — either by
//! the operator's `respond` call or by the timeout's auto-deny.
//!
//! Mirrors the teacher's `request_with_timeout` pattern (a `oneshot` sender
//! stashed per in-flight request, raced against a timeout) but generalized:
//! resolution here is driven by the operator's `answer` tool call rather
//! than an inbound websocket frame, and the timeout path calls back into a
//! caller-supplied default rather than simply erroring out.
//!
//! Generic over the resolved value `T` rather than hardcoding `Answer`,
//! since `respond` resolves a question with every answer in the operator's
//! batch, not just one.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no pending question with id {0}")]
    NotFound(String),
    #[error("question {0} was already answered or timed out")]
    AlreadyResolved(String),
}

struct Entry<T> {
    tx: oneshot::Sender<T>,
    timer: CancellationToken,
}

/// Registry of in-flight questions. One entry exists from the moment a
/// question is raised until it is answered, timed out, or cancelled.
pub struct QuestionRegistry<T> {
    pending: Mutex<HashMap<String, Entry<T>>>,
}

impl<T> Default for QuestionRegistry<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Send + 'static> QuestionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as pending, arming a timer of `timeout`. If `answer` or
    /// `cancel` has not claimed the entry by then, `on_timeout` is invoked to
    /// produce a default value, which resolves the returned receiver.
    ///
    /// `on_timeout` runs on a background task; it must not block.
    pub fn register<F>(
        self: &std::sync::Arc<Self>,
        id: String,
        timeout: Duration,
        on_timeout: F,
    ) -> oneshot::Receiver<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let timer = CancellationToken::new();

        self.pending.lock().unwrap().insert(
            id.clone(),
            Entry {
                tx,
                timer: timer.clone(),
            },
        );

        let registry = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(entry) = registry.pending.lock().unwrap().remove(&id) {
                        let _ = entry.tx.send(on_timeout());
                    }
                }
            }
        });

        rx
    }

    /// Resolve a pending question with the operator's answer, cancelling its
    /// timer. A second call (or a call after the timeout already fired)
    /// fails.
    pub fn answer(&self, id: &str, value: T) -> Result<(), RegistryError> {
        let entry = self
            .pending
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        entry.timer.cancel();
        entry
            .tx
            .send(value)
            .map_err(|_| RegistryError::AlreadyResolved(id.to_string()))
    }

    /// Drop a pending question without resolving it: its timer is cancelled
    /// and the waiting receiver observes a closed channel (used when a
    /// session is torn down with a question outstanding).
    pub fn cancel(&self, id: &str) {
        if let Some(entry) = self.pending.lock().unwrap().remove(id) {
            entry.timer.cancel();
        }
    }

    /// Cancel every armed timer and forget every id (supervisor shutdown).
    pub fn cleanup(&self) {
        let mut pending = self.pending.lock().unwrap();
        for (_, entry) in pending.drain() {
            entry.timer.cancel();
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().unwrap().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
