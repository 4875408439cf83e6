//! Process Supervisor (C6): owns one live agent `Child` exclusively inside a
//! dedicated task, so that a blocking `wait()` never contends with other
//! session operations.
//!
//! Grounded in the teacher's `claude_agent.rs`/`agent.rs` spawn-and-pipe
//! shape, generalized behind `families::SpawnPolicy` and restructured as an
//! actor (command channel in, exit report out) rather than an owned struct
//! the caller must poll directly — the caller here is a `tokio::sync::Mutex`
//! guarded `Session`, which must never itself block on child I/O.

use crate::event::{decode_stream, Event};
use crate::families::SpawnPolicy;
use crate::session::SpawnParams;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

/// Grace period between SIGINT and escalation to SIGKILL.
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum ProcessCommand {
    /// Write a line to the process's stdin (a `say`/follow-up turn).
    Say(String),
    /// Deliver SIGINT; escalate to SIGKILL if the process outlives the grace period.
    Interrupt,
    /// Deliver SIGKILL immediately.
    Kill,
}

/// How an agent process's life ended. `handle_exit` reads `signal`/`code`
/// directly rather than a pre-digested boolean, since exit handling is
/// itself a three-way match on the raw OS status: `signal == SIGINT` beats
/// `code == 0` beats everything else.
#[derive(Debug, Clone, Copy)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitReport {
    pub fn was_sigint(&self) -> bool {
        self.signal == Some(nix::sys::signal::Signal::SIGINT as i32)
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Lightweight, cloneable handle to a running process actor. Safe to store
/// inside a `Session` guarded by the session's own lock, since sending a
/// command never blocks on the child itself.
#[derive(Debug, Clone)]
pub struct ProcessActorHandle {
    cmd_tx: mpsc::Sender<ProcessCommand>,
    pub pid: Option<u32>,
}

impl ProcessActorHandle {
    pub async fn say(&self, line: String) -> Result<(), std::io::Error> {
        self.cmd_tx
            .send(ProcessCommand::Say(line))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "process actor gone"))
    }

    pub async fn interrupt(&self) -> Result<(), std::io::Error> {
        self.cmd_tx
            .send(ProcessCommand::Interrupt)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "process actor gone"))
    }

    pub async fn kill(&self) -> Result<(), std::io::Error> {
        self.cmd_tx
            .send(ProcessCommand::Kill)
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "process actor gone"))
    }
}

/// Spawn an agent process under `policy` and hand back a command handle, an
/// event receiver fed by C1's decoder, a stderr line receiver (used by
/// `ApprovalChannel::InlineIo` families to detect approval prompts), and a
/// one-shot that resolves once the process exits (by itself or by
/// supervisor action).
///
/// `bridge_addr` is forwarded to `SpawnPolicy::build_command` untouched; it
/// is only meaningful for `ApprovalChannel::CallbackBridge` families.
///
/// A spawn-time failure (missing executable, permission denied) is reported
/// synchronously rather than folded into the exit report.
pub fn spawn(
    policy: Arc<dyn SpawnPolicy>,
    params: &SpawnParams,
    resume_id: Option<&str>,
    bridge_addr: Option<SocketAddr>,
    history_buffer: usize,
) -> Result<
    (
        ProcessActorHandle,
        mpsc::Receiver<Event>,
        mpsc::Receiver<String>,
        oneshot::Receiver<ExitReport>,
    ),
    std::io::Error,
> {
    let mut cmd = policy.build_command(params, resume_id, bridge_addr);
    let mut child = cmd.spawn()?;

    let pid = child.id();
    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take();
    let stdin = child.stdin.take();

    let event_rx = decode_stream(stdout, policy.event_family(), history_buffer);
    let (stderr_tx, stderr_rx) = mpsc::channel(history_buffer.max(8));
    if let Some(stderr) = stderr {
        tokio::spawn(drain_stderr(stderr, stderr_tx));
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let (exit_tx, exit_rx) = oneshot::channel();

    tokio::spawn(run_actor(child, stdin, cmd_rx, exit_tx));

    Ok((ProcessActorHandle { cmd_tx, pid }, event_rx, stderr_rx, exit_rx))
}

/// Every non-blank stderr line is logged and forwarded; forwarding never
/// blocks the child (a full channel just drops the line, matching the
/// spec's "stray stderr does not fail an operation" failure semantics).
async fn drain_stderr(stderr: tokio::process::ChildStderr, tx: mpsc::Sender<String>) {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        tracing::debug!(target: "agent_stderr", "{}", line);
        let _ = tx.try_send(line);
    }
}

async fn run_actor(
    mut child: Child,
    mut stdin: Option<tokio::process::ChildStdin>,
    mut cmd_rx: mpsc::Receiver<ProcessCommand>,
    exit_tx: oneshot::Sender<ExitReport>,
) {
    let pid = child.id();

    loop {
        tokio::select! {
            status = child.wait() => {
                let report = exit_report_from_status(status);
                let _ = exit_tx.send(report);
                return;
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ProcessCommand::Say(line)) => {
                        if let Some(stdin) = stdin.as_mut() {
                            if let Err(err) = write_line(stdin, &line).await {
                                tracing::warn!("failed writing to agent stdin: {}", err);
                            }
                        }
                    }
                    Some(ProcessCommand::Interrupt) => {
                        send_signal(pid, nix::sys::signal::Signal::SIGINT);
                        if let Some(report) = wait_or_kill(&mut child, pid).await {
                            let _ = exit_tx.send(report);
                            return;
                        }
                        // else: still alive somehow; loop back and keep waiting.
                    }
                    Some(ProcessCommand::Kill) => {
                        let _ = child.kill().await;
                        let _ = exit_tx.send(ExitReport {
                            code: None,
                            signal: Some(nix::sys::signal::Signal::SIGKILL as i32),
                        });
                        return;
                    }
                    None => {
                        // Handle dropped: nobody will ever command this process again.
                        // Keep waiting on the child; it still owns its own lifetime.
                    }
                }
            }
        }
    }
}

fn exit_report_from_status(status: std::io::Result<std::process::ExitStatus>) -> ExitReport {
    use std::os::unix::process::ExitStatusExt;
    match status {
        Ok(status) => ExitReport {
            code: status.code(),
            signal: status.signal(),
        },
        Err(err) => {
            tracing::error!("error waiting on child process: {}", err);
            ExitReport { code: None, signal: None }
        }
    }
}

/// Wait up to `INTERRUPT_GRACE` for the child to exit on its own after
/// SIGINT, returning its real exit report; escalate to SIGKILL and return
/// a synthetic report otherwise.
async fn wait_or_kill(child: &mut Child, pid: Option<u32>) -> Option<ExitReport> {
    match tokio::time::timeout(INTERRUPT_GRACE, child.wait()).await {
        Ok(status) => Some(exit_report_from_status(status)),
        Err(_) => {
            tracing::warn!(?pid, "process did not exit within grace period after SIGINT, sending SIGKILL");
            let _ = child.kill().await;
            Some(ExitReport {
                code: None,
                signal: Some(nix::sys::signal::Signal::SIGKILL as i32),
            })
        }
    }
}

fn send_signal(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    let Some(pid) = pid else { return };
    let Ok(pid) = i32::try_from(pid) else { return };
    if let Err(err) = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), signal) {
        tracing::warn!(pid, ?signal, "failed to deliver signal: {}", err);
    }
}

async fn write_line(stdin: &mut tokio::process::ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{AgentKind, ApprovalPolicy, SpawnParams};
    use std::path::PathBuf;

    fn echo_params() -> SpawnParams {
        SpawnParams {
            agent: AgentKind::Claude,
            prompt: "hi".to_string(),
            working_directory: PathBuf::from("."),
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
        }
    }

    struct ShPolicy;
    impl SpawnPolicy for ShPolicy {
        fn build_command(
            &self,
            _params: &SpawnParams,
            _resume_id: Option<&str>,
            _bridge_addr: Option<SocketAddr>,
        ) -> tokio::process::Command {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c")
                .arg("echo '{\"type\":\"unknown\"}'; sleep 30")
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .stdin(std::process::Stdio::piped());
            cmd
        }
        fn event_family(&self) -> Arc<dyn crate::event::EventFamily> {
            crate::families::codex::CodexPolicy.event_family()
        }
        fn approval_channel(&self) -> crate::families::ApprovalChannel {
            crate::families::ApprovalChannel::InlineIo
        }
        fn supports_live_stdin(&self) -> bool {
            false
        }
        fn index_location(&self) -> crate::families::IndexLocation {
            crate::families::IndexLocation::JsonlFile(PathBuf::from("/dev/null"))
        }
    }

    #[tokio::test]
    async fn interrupt_escalates_to_kill_if_process_ignores_sigint() {
        // `sh` ignores SIGINT from a non-interactive pipe by default in some
        // shells; rather than depend on that here, we just verify the actor
        // reports an exit (one way or another) promptly after `interrupt`.
        let params = echo_params();
        let (handle, mut rx, _stderr_rx, exit_rx) =
            spawn(Arc::new(ShPolicy), &params, None, None, 8).unwrap();
        let _ = rx.recv().await;
        handle.interrupt().await.unwrap();
        let report = tokio::time::timeout(Duration::from_secs(7), exit_rx)
            .await
            .expect("actor should report exit within grace + margin")
            .unwrap();
        assert!(!report.is_success() || report.signal.is_some());
    }
}
