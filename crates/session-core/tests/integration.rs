//! Integration tests for session-core.
//!
//! Scenarios that need a real agent CLI on `PATH` are gated behind feature
//! flags, mirroring how the rest of this crate treats real-binary
//! dependencies:
//! - `test-claude`: requires `claude` on PATH
//! - `test-codex`: requires `codex` on PATH
//!
//! Run with: `cargo test --features test-claude` (or `test-codex`).

use session_core::config::EnvConfig;
use session_core::error::SupervisorError;
use session_core::manager::SessionManager;

fn config() -> EnvConfig {
    EnvConfig {
        max_sessions: 4,
        ..EnvConfig::default()
    }
}

#[tokio::test]
async fn status_on_unknown_session_errors() {
    let manager = SessionManager::new(config());
    let err = manager.status("does-not-exist", None).await.unwrap_err();
    assert!(matches!(err, SupervisorError::UnknownSession(_)));
}

#[tokio::test]
async fn interrupt_on_unknown_session_errors() {
    let manager = SessionManager::new(config());
    let err = manager.interrupt("does-not-exist").await.unwrap_err();
    assert!(matches!(err, SupervisorError::UnknownSession(_)));
}

#[tokio::test]
async fn respond_on_unknown_session_errors() {
    let manager = SessionManager::new(config());
    let err = manager
        .respond("does-not-exist", "q1", vec!["allow".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::UnknownSession(_)));
}

#[tokio::test]
async fn start_rejects_a_working_directory_that_does_not_exist() {
    use session_core::session::{AgentKind, ApprovalPolicy, SpawnParams};
    use std::path::PathBuf;

    let manager = SessionManager::new(config());
    let params = SpawnParams {
        agent: AgentKind::Claude,
        prompt: "hello".to_string(),
        working_directory: PathBuf::from("/definitely/not/a/real/directory"),
        model: None,
        approval_policy: ApprovalPolicy::Default,
        allowed_tools: vec![],
        disallowed_tools: vec![],
        max_turns: None,
        max_budget: None,
        system_prompt: None,
        images: vec![],
        skip_git_check: true,
        bypass_approvals: true,
    };

    let err = manager.start(params).await.unwrap_err();
    assert!(matches!(err, SupervisorError::InvalidWorkingDirectory(_)));
}

#[tokio::test]
async fn list_is_empty_for_a_fresh_manager() {
    let manager = SessionManager::new(config());
    let entries = manager.list(None, None).await;
    assert!(entries.is_empty());
}

#[cfg(feature = "test-claude")]
mod claude_cli {
    use super::config;
    use session_core::manager::SessionManager;
    use session_core::session::{AgentKind, ApprovalPolicy, SpawnParams};
    use std::time::Duration;

    #[tokio::test]
    async fn start_say_and_status_round_trip_against_the_real_cli() {
        let manager = SessionManager::new(config());
        let params = SpawnParams {
            agent: AgentKind::Claude,
            prompt: "reply with the single word: pong".to_string(),
            working_directory: std::env::current_dir().unwrap(),
            model: None,
            approval_policy: ApprovalPolicy::BypassPermissions,
            allowed_tools: vec![],
            disallowed_tools: vec![],
            max_turns: Some(1),
            max_budget: None,
            system_prompt: None,
            images: vec![],
            skip_git_check: true,
            bypass_approvals: true,
        };

        let started = manager.start(params).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let status = manager.status(&started.session_id, None).await.unwrap();
        assert_eq!(status.session_id, started.session_id);
    }
}

#[cfg(feature = "test-codex")]
mod codex_cli {
    use super::config;
    use session_core::manager::SessionManager;
    use session_core::session::{AgentKind, ApprovalPolicy, SpawnParams};
    use std::time::Duration;

    #[tokio::test]
    async fn start_reaches_done_against_the_real_cli() {
        let manager = SessionManager::new(config());
        let params = SpawnParams {
            agent: AgentKind::Codex,
            prompt: "reply with the single word: pong".to_string(),
            working_directory: std::env::current_dir().unwrap(),
            model: None,
            approval_policy: ApprovalPolicy::BypassPermissions,
            allowed_tools: vec![],
            disallowed_tools: vec![],
            max_turns: None,
            max_budget: None,
            system_prompt: None,
            images: vec![],
            skip_git_check: true,
            bypass_approvals: true,
        };

        let started = manager.start(params).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let status = manager.status(&started.session_id, None).await.unwrap();
        assert_eq!(status.session_id, started.session_id);
    }
}
