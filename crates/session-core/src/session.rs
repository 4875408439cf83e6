//! Session data model: the central entity the rest of the core mutates.

use crate::classifier::{QuestionKind, SubQuestion};
use crate::history::RingHistory;
use crate::process::ProcessActorHandle;
use crate::event::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Which agent CLI family a session's process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Claude,
    Codex,
}

impl Default for AgentKind {
    /// Multi-family support defaults to the primary family when a `start`
    /// request omits a selector entirely.
    fn default() -> Self {
        AgentKind::Claude
    }
}

/// A small closed set of permission postures, named `approval_policy` in the
/// tool surface and `permission_mode` by some agent families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPolicy {
    Default,
    Plan,
    AcceptEdits,
    BypassPermissions,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        ApprovalPolicy::Default
    }
}

/// Identifier for a session. Before the agent reports its real id, sessions
/// are addressed by a locally generated temp id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh temp id, distinguishable from a real agent-assigned id.
    pub fn new_temp() -> Self {
        Self(format!("temp-{}", Uuid::new_v4()))
    }

    pub fn is_temp(&self) -> bool {
        self.0.starts_with("temp-")
    }

    pub fn real(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    AwaitingInput,
    Done,
    Error,
    Interrupted,
}

/// `working_directory` is optional on `start`; when omitted the agent runs
/// in the supervisor process's own current directory.
fn default_working_directory() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// The full bundle of agent parameters, stored verbatim for faithful resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnParams {
    #[serde(default)]
    pub agent: AgentKind,
    pub prompt: String,
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub approval_policy: ApprovalPolicy,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub max_budget: Option<f64>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub skip_git_check: bool,
    #[serde(default)]
    pub bypass_approvals: bool,
}

/// Token/cost/turn accounting surfaced by `status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub turn_count: u32,
}

/// Status of a single tool invocation observed in the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolUseStatus {
    Running,
    Completed,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseRecord {
    pub id: String,
    pub name: String,
    pub status: ToolUseStatus,
}

/// One follow-up to the operator about a mid-turn approval request.
///
/// Carries no resolver: the resolver lives in the `QuestionRegistry` (C4),
/// keyed by the same `id`. Splitting it this way lets `Session` stay plain
/// data, safe to snapshot for `status` without exposing the internal
/// one-shot plumbing — `status` never includes the internal resolver or the
/// raw tool input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingQuestionView {
    pub id: String,
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub sub_questions: Vec<SubQuestion>,
    /// Retained for answer translation; never serialized out through `status`.
    #[serde(skip)]
    pub original_input: serde_json::Value,
}

/// The central entity. All mutations go through a single per-session mutex
/// held by the caller (`SessionManager`).
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub process: Option<ProcessActorHandle>,
    pub created_at: DateTime<Utc>,
    pub working_directory: PathBuf,
    pub spawn_params: SpawnParams,
    pub history: RingHistory<Event>,
    pub pending_question: Option<PendingQuestionView>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub metrics: Metrics,
    pub tool_uses: Vec<ToolUseRecord>,
}

impl Session {
    pub fn new(id: SessionId, params: SpawnParams, history_capacity: usize) -> Self {
        Self {
            working_directory: params.working_directory.clone(),
            id,
            status: SessionStatus::Active,
            process: None,
            created_at: Utc::now(),
            spawn_params: params,
            history: RingHistory::new(history_capacity),
            pending_question: None,
            result: None,
            error: None,
            metrics: Metrics::default(),
            tool_uses: Vec::new(),
        }
    }

    /// Terminal statuses never carry a process.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Done | SessionStatus::Error | SessionStatus::Interrupted
        )
    }
}
