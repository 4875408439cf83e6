//! Per-agent-family plugins: each family supplies an argv-building
//! `SpawnPolicy` and a line-parsing `EventFamily`, mirroring the teacher's
//! `AnyAgent` trait — one implementation per concrete agent CLI, so adding a
//! family needs no change to the core state machine.

pub mod claude;
pub mod codex;

use crate::event::EventFamily;
use crate::session::{AgentKind, SpawnParams};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

/// Which approval side-channel mechanism a family's spawned process uses:
/// a loopback HTTP callback bridge, or stderr/stdin pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalChannel {
    CallbackBridge,
    InlineIo,
}

/// Where a family's on-disk session transcript index lives: a single
/// append-only JSONL file, or a date-partitioned directory tree.
#[derive(Debug, Clone)]
pub enum IndexLocation {
    JsonlFile(PathBuf),
    PartitionedTree(PathBuf),
}

/// Builds the argv/env for a fresh spawn or a resume, and supplies the
/// matching `EventFamily` decoder. One implementation per `AgentKind`.
pub trait SpawnPolicy: Send + Sync {
    /// `bridge_addr` is `Some` only when this policy's `approval_channel` is
    /// `CallbackBridge` and the supervisor's loopback listener is up.
    fn build_command(
        &self,
        params: &SpawnParams,
        resume_id: Option<&str>,
        bridge_addr: Option<SocketAddr>,
    ) -> Command;

    fn event_family(&self) -> Arc<dyn EventFamily>;

    fn approval_channel(&self) -> ApprovalChannel;

    /// Whether a live process accepts follow-up turns over stdin, or is
    /// strictly one-process-per-turn — such families always take the resume
    /// path on the next `say`.
    fn supports_live_stdin(&self) -> bool;

    /// Where `list` should read this family's externally-owned session
    /// index from.
    fn index_location(&self) -> IndexLocation;
}

pub fn for_kind(kind: AgentKind) -> Arc<dyn SpawnPolicy> {
    match kind {
        AgentKind::Claude => Arc::new(claude::ClaudePolicy),
        AgentKind::Codex => Arc::new(codex::CodexPolicy),
    }
}
