//! Process-wide settings bound once at startup from the environment.
//!
//! Configuration loading is named out of scope for the core itself, but the
//! ambient pattern this repo otherwise follows — typed config read from the
//! environment at the entry point, not threaded as loose args — still
//! applies, so `EnvConfig` lives here rather than as bare function
//! parameters to `SessionManager::new`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Path or bare name used to invoke the agent CLI when a family doesn't
    /// override it (e.g. `claude`, `codex`).
    pub cli_path: String,
    pub approval_timeout: Duration,
    pub max_sessions: usize,
    pub event_buffer_size: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            cli_path: "<agent-command>".to_string(),
            approval_timeout: Duration::from_millis(300_000),
            max_sessions: 10,
            event_buffer_size: 500,
        }
    }
}

impl EnvConfig {
    /// Read overrides from the environment, falling back to defaults for
    /// anything unset or unparseable (logged, not fatal).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cli_path: std::env::var("SESSION_SUPERVISOR_CLI_PATH")
                .unwrap_or(defaults.cli_path),
            approval_timeout: std::env::var("SESSION_SUPERVISOR_APPROVAL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.approval_timeout),
            max_sessions: std::env::var("SESSION_SUPERVISOR_MAX_SESSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_sessions),
            event_buffer_size: std::env::var("SESSION_SUPERVISOR_EVENT_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.event_buffer_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EnvConfig::default();
        assert_eq!(cfg.approval_timeout, Duration::from_millis(300_000));
        assert_eq!(cfg.max_sessions, 10);
        assert_eq!(cfg.event_buffer_size, 500);
    }
}
