//! Shared state for the session supervisor's HTTP adapter: a single
//! `SessionManager` handle, cloned into every request.

use session_core::SessionManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}
