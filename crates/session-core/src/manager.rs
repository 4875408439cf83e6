//! Session Manager (C8): composes C1-C7 into the six tool operations, owns
//! the per-session supervision task, and is the only thing that ever
//! mutates a `Session`. All mutation happens under the session's own lock so
//! concurrent operations on the same session serialize correctly.

use crate::answer::{self, Answer};
use crate::classifier::{self, ClassifiedQuestion, QuestionKind};
use crate::config::EnvConfig;
use crate::error::SupervisorError;
use crate::event::{ApprovalRequest, Event, ResultStatus, StreamEvent};
use crate::families::{self, ApprovalChannel, IndexLocation, SpawnPolicy};
use crate::index;
use crate::process::{self, ExitReport};
use crate::registry::QuestionRegistry;
use crate::session::{
    Metrics, PendingQuestionView, Session, SessionId, SessionStatus, SpawnParams, ToolUseRecord,
    ToolUseStatus,
};
use crate::store::{SessionStore, SharedSession};
use regex::Regex;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Optional overrides `say` may layer onto a session's stored `SpawnParams`.
#[derive(Debug, Clone, Default)]
pub struct SayOverrides {
    pub images: Vec<String>,
    pub approval_policy: Option<crate::session::ApprovalPolicy>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpResult {
    pub session_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingQuestionSummary {
    pub id: String,
    pub kind: QuestionKind,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolUseView {
    pub id: String,
    pub name: String,
    pub status: ToolUseStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recent_output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<PendingQuestionSummary>,
    pub tool_use_events: Vec<ToolUseView>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub session_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub project: Option<String>,
    pub display: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
}

/// `SessionManager` (C8). Cheap to clone (holds only `Arc`s); tool-operation
/// handlers take `&Arc<Self>` so the per-session supervision task can hold
/// its own clone without a lifetime tied to the caller's request.
pub struct SessionManager {
    store: Arc<SessionStore>,
    registry: Arc<QuestionRegistry<Vec<Answer>>>,
    config: EnvConfig,
    bridge_addr: OnceLock<SocketAddr>,
}

impl SessionManager {
    pub fn new(config: EnvConfig) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(SessionStore::new(config.max_sessions)),
            registry: Arc::new(QuestionRegistry::new()),
            config,
            bridge_addr: OnceLock::new(),
        })
    }

    /// Bind the loopback approval-callback bridge's address once the HTTP
    /// listener is up. Idempotent; later calls are ignored.
    pub fn set_bridge_addr(&self, addr: SocketAddr) {
        let _ = self.bridge_addr.set(addr);
    }

    fn bridge_addr(&self) -> Option<SocketAddr> {
        self.bridge_addr.get().copied()
    }

    // ---- start -----------------------------------------------------------

    pub async fn start(self: &Arc<Self>, params: SpawnParams) -> Result<OpResult, SupervisorError> {
        if !params.working_directory.is_dir() {
            return Err(SupervisorError::InvalidWorkingDirectory(
                params.working_directory.display().to_string(),
            ));
        }

        let active = self.store.count_active();
        if active >= self.config.max_sessions {
            return Err(SupervisorError::CapacityExceeded {
                active,
                max: self.config.max_sessions,
            });
        }

        let temp_id = SessionId::new_temp();
        let policy = families::for_kind(params.agent);
        let (handle, event_rx, stderr_rx, exit_rx) = process::spawn(
            policy.clone(),
            &params,
            None,
            self.bridge_addr(),
            self.config.event_buffer_size,
        )?;

        let mut session = Session::new(temp_id.clone(), params, self.config.event_buffer_size);
        session.process = Some(handle);
        let shared = self.store.insert(temp_id.clone(), session)?;

        self.spawn_supervision_task(shared.clone(), policy, event_rx, stderr_rx, exit_rx);

        let id = self.await_real_id(&shared).await;
        let status = shared.lock().await.status;
        Ok(OpResult { session_id: id.0, status })
    }

    /// Poll for up to 10s (50ms interval) for a temp id to rekey to a real
    /// one. The id inside `shared` changes but the `Arc` itself does not, so
    /// polling the same handle is sufficient.
    async fn await_real_id(&self, shared: &SharedSession) -> SessionId {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let id = shared.lock().await.id.clone();
            if !id.is_temp() || Instant::now() >= deadline {
                return id;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    // ---- say ---------------------------------------------------------------

    pub async fn say(
        self: &Arc<Self>,
        session_id: &str,
        message: String,
        overrides: SayOverrides,
    ) -> Result<OpResult, SupervisorError> {
        let id = SessionId::real(session_id.to_string());
        let shared = match self.store.get(&id) {
            Some(shared) => shared,
            None => self.placeholder_for_say(&id, &message, &overrides)?,
        };

        let (process, status, supports_live_stdin) = {
            let session = shared.lock().await;
            let policy = families::for_kind(session.spawn_params.agent);
            (session.process.clone(), session.status, policy.supports_live_stdin())
        };

        let wants_new_process = overrides.approval_policy.is_some();

        if let Some(process) = &process {
            if status == SessionStatus::Active && !wants_new_process {
                if !supports_live_stdin {
                    return Err(SupervisorError::Busy(session_id.to_string()));
                }
                let line = serde_json::json!({"role": "user", "content": message}).to_string();
                process.say(line).await.map_err(SupervisorError::Spawn)?;
                return Ok(OpResult { session_id: id.0, status: SessionStatus::Active });
            }

            if wants_new_process && status == SessionStatus::Active {
                self.interrupt_and_wait(&shared, process).await?;
            }
        }

        self.resume(&id, &shared, message, overrides).await
    }

    /// `say` on an id the store has never seen creates a DONE placeholder so
    /// the resume path below takes over. This adopts whatever id the caller
    /// names without checking it against a real on-disk session.
    fn placeholder_for_say(
        &self,
        id: &SessionId,
        message: &str,
        overrides: &SayOverrides,
    ) -> Result<SharedSession, SupervisorError> {
        let mut params = SpawnParams {
            agent: crate::session::AgentKind::Claude,
            prompt: message.to_string(),
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            model: None,
            approval_policy: overrides.approval_policy.unwrap_or_default(),
            allowed_tools: vec![],
            disallowed_tools: vec![],
            max_turns: None,
            max_budget: None,
            system_prompt: None,
            images: overrides.images.clone(),
            skip_git_check: false,
            bypass_approvals: false,
        };
        params.prompt = message.to_string();
        let mut session = Session::new(id.clone(), params, self.config.event_buffer_size);
        session.status = SessionStatus::Done;
        Ok(self.store.insert(id.clone(), session)?)
    }

    /// SIGINT the live process and wait up to 5s for it to exit before the
    /// caller resumes with changed params.
    async fn interrupt_and_wait(
        &self,
        shared: &SharedSession,
        process: &process::ProcessActorHandle,
    ) -> Result<(), SupervisorError> {
        process.interrupt().await.map_err(SupervisorError::Spawn)?;
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if shared.lock().await.process.is_none() || Instant::now() >= deadline {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn resume(
        self: &Arc<Self>,
        id: &SessionId,
        shared: &SharedSession,
        message: String,
        overrides: SayOverrides,
    ) -> Result<OpResult, SupervisorError> {
        let active = self.store.count_active();
        if active >= self.config.max_sessions {
            return Err(SupervisorError::CapacityExceeded {
                active,
                max: self.config.max_sessions,
            });
        }

        let mut params = shared.lock().await.spawn_params.clone();
        params.prompt = message;
        if !overrides.images.is_empty() {
            params.images = overrides.images;
        }
        if let Some(policy) = overrides.approval_policy {
            params.approval_policy = policy;
        }

        let policy = families::for_kind(params.agent);
        let resume_id = if id.is_temp() { None } else { Some(id.0.as_str()) };
        let (handle, event_rx, stderr_rx, exit_rx) = process::spawn(
            policy.clone(),
            &params,
            resume_id,
            self.bridge_addr(),
            self.config.event_buffer_size,
        )?;

        {
            let mut session = shared.lock().await;
            session.process = Some(handle);
            session.status = SessionStatus::Active;
            session.spawn_params = params;
            session.result = None;
            session.error = None;
        }

        self.spawn_supervision_task(shared.clone(), policy, event_rx, stderr_rx, exit_rx);
        Ok(OpResult { session_id: id.0.clone(), status: SessionStatus::Active })
    }

    // ---- status --------------------------------------------------------

    pub async fn status(
        &self,
        session_id: &str,
        output_lines: Option<usize>,
    ) -> Result<StatusView, SupervisorError> {
        let id = SessionId::real(session_id.to_string());
        let shared = self
            .store
            .get(&id)
            .ok_or_else(|| SupervisorError::UnknownSession(session_id.to_string()))?;
        let session = shared.lock().await;

        let n = output_lines.unwrap_or(50);
        let recent_output = session.history.extract(
            |event| match event {
                Event::Stream(StreamEvent::TextDelta { text }) => Some(text.clone()),
                _ => None,
            },
            n,
        );

        let pending_question = session.pending_question.as_ref().map(|pq| {
            let questions = if pq.sub_questions.is_empty() {
                vec![QuestionView {
                    question: pq.prompt.clone(),
                    options: pq.options.clone(),
                }]
            } else {
                pq.sub_questions
                    .iter()
                    .map(|sq| QuestionView {
                        question: sq.question.clone(),
                        options: sq.options.clone(),
                    })
                    .collect()
            };
            PendingQuestionSummary {
                id: pq.id.clone(),
                kind: pq.kind,
                questions,
            }
        });

        let tool_use_events = session
            .tool_uses
            .iter()
            .map(|t| ToolUseView {
                id: t.id.clone(),
                name: t.name.clone(),
                status: t.status,
            })
            .collect();

        Ok(StatusView {
            session_id: session.id.0.clone(),
            status: session.status,
            result: session.result.clone(),
            error: session.error.clone(),
            recent_output,
            pending_question,
            tool_use_events,
            metrics: session.metrics.clone(),
        })
    }

    // ---- respond ---------------------------------------------------------

    pub async fn respond(
        &self,
        session_id: &str,
        question_id: &str,
        answers: Vec<String>,
    ) -> Result<OpResult, SupervisorError> {
        let id = SessionId::real(session_id.to_string());
        let shared = self
            .store
            .get(&id)
            .ok_or_else(|| SupervisorError::UnknownSession(session_id.to_string()))?;

        // Clear the pending question and return to ACTIVE here, synchronously,
        // rather than waiting for whichever task is parked on the registry's
        // oneshot to wake up and do it (that task only runs the translated
        // answer back to the agent; it must not be the thing this call's
        // returned status depends on).
        let status = {
            let mut session = shared.lock().await;
            let pending = session
                .pending_question
                .as_ref()
                .ok_or_else(|| SupervisorError::NoPendingQuestion(session_id.to_string()))?;
            if pending.id != question_id {
                return Err(SupervisorError::IdMismatch {
                    session: session_id.to_string(),
                    outstanding: pending.id.clone(),
                    given: question_id.to_string(),
                });
            }
            session.pending_question = None;
            if !session.is_terminal() {
                session.status = SessionStatus::Active;
            }
            session.status
        };

        let parsed: Vec<Answer> = if answers.is_empty() {
            vec![answer::parse("")]
        } else {
            answers.iter().map(|a| answer::parse(a)).collect()
        };
        self.registry.answer(question_id, parsed)?;

        Ok(OpResult { session_id: id.0, status })
    }

    // ---- interrupt -------------------------------------------------------

    pub async fn interrupt(&self, session_id: &str) -> Result<OpResult, SupervisorError> {
        let id = SessionId::real(session_id.to_string());
        let shared = self
            .store
            .get(&id)
            .ok_or_else(|| SupervisorError::UnknownSession(session_id.to_string()))?;

        let process = shared.lock().await.process.clone();
        let process = process.ok_or_else(|| SupervisorError::NoActiveProcess(session_id.to_string()))?;
        process.interrupt().await.map_err(SupervisorError::Spawn)?;

        let mut session = shared.lock().await;
        session.status = SessionStatus::Interrupted;
        Ok(OpResult {
            session_id: id.0,
            status: SessionStatus::Interrupted,
        })
    }

    // ---- list --------------------------------------------------------------

    pub async fn list(&self, filter_dir: Option<&std::path::Path>, limit: Option<usize>) -> Vec<ListEntry> {
        let mut entries = std::collections::HashMap::<String, ListEntry>::new();

        let mut live = Vec::new();
        self.store.for_each(|id, shared| live.push((id.clone(), shared.clone())));
        for (id, shared) in live {
            if id.is_temp() {
                continue;
            }
            let session = shared.lock().await;
            let project = session.working_directory.to_str().map(String::from);
            if let Some(filter) = filter_dir {
                if session.working_directory != filter {
                    continue;
                }
            }
            entries.insert(
                id.0.clone(),
                ListEntry {
                    session_id: id.0,
                    timestamp: session.created_at,
                    project,
                    display: None,
                    is_active: !session.is_terminal(),
                    status: Some(session.status),
                },
            );
        }

        for kind in [crate::session::AgentKind::Claude, crate::session::AgentKind::Codex] {
            let policy = families::for_kind(kind);
            let on_disk = match policy.index_location() {
                IndexLocation::JsonlFile(path) => index::read_jsonl_file(&path).await,
                IndexLocation::PartitionedTree(root) => index::read_partitioned_tree(&root).await,
            };
            for row in on_disk {
                if let Some(filter) = filter_dir {
                    let matches = row
                        .project
                        .as_deref()
                        .map(|p| std::path::Path::new(p) == filter)
                        .unwrap_or(false);
                    if !matches {
                        continue;
                    }
                }
                entries.entry(row.session_id.clone()).or_insert(ListEntry {
                    session_id: row.session_id,
                    timestamp: row.timestamp,
                    project: row.project,
                    display: row.display,
                    is_active: false,
                    status: None,
                });
            }
        }

        let mut out: Vec<ListEntry> = entries.into_values().collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out.truncate(limit.unwrap_or(50));
        out
    }

    // ---- supervision task -------------------------------------------------

    fn spawn_supervision_task(
        self: &Arc<Self>,
        shared: SharedSession,
        policy: Arc<dyn SpawnPolicy>,
        mut event_rx: mpsc::Receiver<Event>,
        mut stderr_rx: mpsc::Receiver<String>,
        exit_rx: oneshot::Receiver<ExitReport>,
    ) {
        let manager = self.clone();
        let channel = policy.approval_channel();
        tokio::spawn(async move {
            let mut exit_rx = exit_rx;
            let mut events_open = true;
            let mut stderr_open = channel == ApprovalChannel::InlineIo;

            loop {
                // Drain everything already buffered before considering exit,
                // so a `Result` event is always handled before the process
                // exit that follows it.
                loop {
                    match event_rx.try_recv() {
                        Ok(event) => manager.handle_event(&shared, event).await,
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            events_open = false;
                            break;
                        }
                    }
                }

                tokio::select! {
                    event = event_rx.recv(), if events_open => {
                        match event {
                            Some(event) => manager.handle_event(&shared, event).await,
                            None => events_open = false,
                        }
                    }
                    line = stderr_rx.recv(), if stderr_open => {
                        match line {
                            Some(line) => manager.maybe_handle_inline_approval(&shared, &line).await,
                            None => stderr_open = false,
                        }
                    }
                    exit = &mut exit_rx => {
                        let report = exit.unwrap_or(ExitReport { code: None, signal: None });
                        manager.handle_exit(&shared, report).await;
                        break;
                    }
                }
            }
        });
    }

    /// Applies one decoded event to the session's status and bookkeeping,
    /// then appends it to the ring history.
    async fn handle_event(self: &Arc<Self>, shared: &SharedSession, event: Event) {
        let mut session = shared.lock().await;
        match &event {
            Event::Init { session_id, .. } => {
                if session.id.is_temp() {
                    let new_id = SessionId::real(session_id.clone());
                    match self.store.rekey(&session.id, new_id.clone()) {
                        Ok(()) => {
                            tracing::info!(old = %session.id, new = %new_id, "session id assigned by agent");
                            session.id = new_id;
                        }
                        Err(err) => tracing::warn!("failed to rekey session id: {}", err),
                    }
                }
            }
            Event::Stream(StreamEvent::ToolUseStart { id, name, .. }) => {
                session.tool_uses.push(ToolUseRecord {
                    id: id.clone(),
                    name: name.clone(),
                    status: ToolUseStatus::Running,
                });
            }
            Event::Stream(StreamEvent::ToolUseStop { id }) => {
                if let Some(record) = session
                    .tool_uses
                    .iter_mut()
                    .rev()
                    .find(|r| r.id == *id && r.status == ToolUseStatus::Running)
                {
                    record.status = ToolUseStatus::Completed;
                }
            }
            Event::Result(result) => {
                session.metrics.turn_count += 1;
                if let Some(metrics) = &result.metrics {
                    if metrics.cost_usd.is_some() {
                        session.metrics.cost_usd = metrics.cost_usd;
                    }
                    if metrics.input_tokens.is_some() {
                        session.metrics.input_tokens = metrics.input_tokens;
                    }
                    if metrics.output_tokens.is_some() {
                        session.metrics.output_tokens = metrics.output_tokens;
                    }
                }
                match result.status {
                    ResultStatus::Success => {
                        session.status = SessionStatus::Done;
                        session.result = result.text.clone();
                    }
                    ResultStatus::Interrupted => {
                        session.status = SessionStatus::Interrupted;
                    }
                    ResultStatus::Error => {
                        session.status = SessionStatus::Error;
                        session.error = Some(
                            result
                                .error_text
                                .clone()
                                .unwrap_or_else(|| "agent reported an error".to_string()),
                        );
                    }
                }
            }
            Event::Stream(_) | Event::Unknown { .. } => {}
        }
        session.history.append(event);
    }

    /// A `Result` event already fixes the terminal status by the time the
    /// process exits; this handler never overrides a status set that way.
    async fn handle_exit(self: &Arc<Self>, shared: &SharedSession, report: ExitReport) {
        let mut session = shared.lock().await;
        if !session.is_terminal() {
            session.status = if report.was_sigint() {
                SessionStatus::Interrupted
            } else if report.is_success() {
                SessionStatus::Done
            } else {
                session.error = Some(format!("process exited with code {:?}", report.code));
                SessionStatus::Error
            };
        }
        session.process = None;
        if let Some(pending) = session.pending_question.take() {
            self.registry.cancel(&pending.id);
        }
    }

    // ---- approval handling -------------------------------------------------

    /// Classify and register an approval request, mark the session
    /// `AWAITING_INPUT`, and return the pieces the two side-channels need to
    /// await resolution and translate the eventual answer.
    async fn register_approval(
        self: &Arc<Self>,
        shared: &SharedSession,
        request: ApprovalRequest,
    ) -> (String, ClassifiedQuestion, serde_json::Value, oneshot::Receiver<Vec<Answer>>) {
        let classified = classifier::classify(&request);
        let question_id = uuid::Uuid::new_v4().to_string();
        let original_input = request.tool_input.clone();

        let rx = self.registry.register(
            question_id.clone(),
            self.config.approval_timeout,
            || vec![answer::parse("deny: approval timed out waiting for operator")],
        );

        {
            let mut session = shared.lock().await;
            session.pending_question = Some(PendingQuestionView {
                id: question_id.clone(),
                kind: classified.kind,
                prompt: classified.prompt.clone(),
                options: classified.options.clone(),
                sub_questions: classified.sub_questions.clone(),
                original_input: original_input.clone(),
            });
            session.status = SessionStatus::AwaitingInput;
        }

        (question_id, classified, original_input, rx)
    }

    /// After an answer is obtained — by `respond` or by the registry's
    /// timeout default — clear the pending question and return to ACTIVE,
    /// unless the session has since gone terminal on its own.
    async fn finish_approval(&self, shared: &SharedSession, question_id: &str) {
        let mut session = shared.lock().await;
        if session.pending_question.as_ref().map(|q| q.id.as_str()) == Some(question_id) {
            session.pending_question = None;
            if !session.is_terminal() {
                session.status = SessionStatus::Active;
            }
        }
    }

    /// Entry point for `ApprovalChannel::CallbackBridge` families: the
    /// approval bridge HTTP handler calls this and returns its result
    /// verbatim as the response body.
    pub async fn handle_bridge_approval(
        self: &Arc<Self>,
        session_label: &str,
        tool_name: String,
        tool_input: serde_json::Value,
    ) -> Result<serde_json::Value, SupervisorError> {
        let (_, shared) = self
            .store
            .resolve_approval_target(session_label)
            .await
            .ok_or_else(|| SupervisorError::UnknownSession(session_label.to_string()))?;

        let request = ApprovalRequest {
            tool_name: Some(tool_name),
            tool_input,
            prompt_text: None,
        };
        let (question_id, classified, original_input, rx) = self.register_approval(&shared, request).await;
        let answers = rx
            .await
            .unwrap_or_else(|_| vec![answer::parse("deny: approval channel closed")]);
        self.finish_approval(&shared, &question_id).await;
        Ok(classifier::translate(classified.kind, &original_input, &answers))
    }

    /// Entry point for `ApprovalChannel::InlineIo` families: a stderr line
    /// that looks like an approval prompt registers a question and, once
    /// resolved, writes a short token to the process's stdin.
    async fn maybe_handle_inline_approval(self: &Arc<Self>, shared: &SharedSession, line: &str) {
        if !looks_like_approval_prompt(line) {
            return;
        }
        if shared.lock().await.pending_question.is_some() {
            return;
        }

        let request = ApprovalRequest {
            tool_name: None,
            tool_input: serde_json::Value::Null,
            prompt_text: Some(line.to_string()),
        };
        let (question_id, classified, original_input, rx) = self.register_approval(shared, request).await;

        let manager = self.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let answers = rx
                .await
                .unwrap_or_else(|_| vec![answer::parse("deny: approval channel closed")]);
            manager.finish_approval(&shared, &question_id).await;
            let translated = classifier::translate(classified.kind, &original_input, &answers);
            let approved = translated
                .get("approved")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let process = shared.lock().await.process.clone();
            if let Some(process) = process {
                let token = if approved { "y" } else { "n" };
                if let Err(err) = process.say(token.to_string()).await {
                    tracing::warn!("failed to deliver inline approval token: {}", err);
                }
            }
        });
    }
}

fn looks_like_approval_prompt(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)(allow|approve|apply|permit)\w*.*\?\s*$").unwrap());
    re.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::{ApprovalChannel, IndexLocation};
    use crate::session::{AgentKind, ApprovalPolicy};
    use std::path::PathBuf;

    fn config() -> EnvConfig {
        EnvConfig {
            cli_path: "sh".to_string(),
            approval_timeout: Duration::from_millis(300),
            max_sessions: 10,
            event_buffer_size: 64,
        }
    }

    fn params(script: &str) -> SpawnParams {
        SpawnParams {
            agent: AgentKind::Codex,
            prompt: script.to_string(),
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

    /// A `sh`-backed fake policy, mirroring `process.rs`'s own test fixture:
    /// `params.prompt` is executed directly as a shell script, so tests
    /// control stdout/exit behavior without any real agent CLI installed.
    struct ShPolicy;
    impl SpawnPolicy for ShPolicy {
        fn build_command(
            &self,
            params: &SpawnParams,
            _resume_id: Option<&str>,
            _bridge_addr: Option<SocketAddr>,
        ) -> tokio::process::Command {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c")
                .arg(&params.prompt)
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .stdin(std::process::Stdio::piped());
            cmd
        }
        fn event_family(&self) -> Arc<dyn crate::event::EventFamily> {
            crate::families::codex::CodexPolicy.event_family()
        }
        fn approval_channel(&self) -> ApprovalChannel {
            ApprovalChannel::InlineIo
        }
        fn supports_live_stdin(&self) -> bool {
            false
        }
        fn index_location(&self) -> IndexLocation {
            IndexLocation::JsonlFile(PathBuf::from("/dev/null"))
        }
    }

    /// Bypasses the `start` op's policy dispatch (it only knows Claude/Codex)
    /// by driving the store/supervision wiring directly with `ShPolicy`.
    async fn start_sh(manager: &Arc<SessionManager>, script: &str) -> SharedSession {
        let p = params(script);
        let policy: Arc<dyn SpawnPolicy> = Arc::new(ShPolicy);
        let (handle, event_rx, stderr_rx, exit_rx) =
            process::spawn(policy.clone(), &p, None, None, 64).unwrap();
        let id = SessionId::new_temp();
        let mut session = Session::new(id.clone(), p, 64);
        session.process = Some(handle);
        let shared = manager.store.insert(id, session).unwrap();
        manager.spawn_supervision_task(shared.clone(), policy, event_rx, stderr_rx, exit_rx);
        shared
    }

    #[tokio::test]
    async fn session_reaches_done_on_successful_exit() {
        let manager = SessionManager::new(config());
        let shared = start_sh(
            &manager,
            r#"echo '{"type":"thread.started","thread_id":"abc-1"}'; echo '{"type":"turn.completed","usage":{"input_tokens":1,"output_tokens":1}}'"#,
        )
        .await;

        let id = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let id = shared.lock().await.id.clone();
                if !id.is_temp() {
                    return id;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(id.0, "abc-1");

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if shared.lock().await.status == SessionStatus::Done {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("session should settle to DONE");
    }

    #[tokio::test]
    async fn interrupt_on_unknown_session_errors() {
        let manager = SessionManager::new(config());
        let err = manager.interrupt("does-not-exist").await.unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownSession(_)));
    }

    #[tokio::test]
    async fn respond_without_pending_question_errors() {
        let manager = SessionManager::new(config());
        let shared = start_sh(&manager, "sleep 5").await;
        let id = shared.lock().await.id.clone();
        let err = manager
            .respond(&id.0, "nonexistent-question", vec!["allow".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NoPendingQuestion(_)));
    }

    #[tokio::test]
    async fn status_reports_unknown_session() {
        let manager = SessionManager::new(config());
        let err = manager.status("does-not-exist", None).await.unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownSession(_)));
    }

    #[test]
    fn approval_prompt_regex_matches_common_phrasing() {
        assert!(looks_like_approval_prompt("Allow this command?"));
        assert!(looks_like_approval_prompt("apply patch to src/main.rs?"));
        assert!(!looks_like_approval_prompt("just some regular output"));
    }

    #[tokio::test]
    async fn start_errors_when_capacity_exceeded() {
        let manager = SessionManager::new(EnvConfig {
            max_sessions: 0,
            ..config()
        });
        let err = manager.start(params("echo hi")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::CapacityExceeded { .. }));
    }

    #[tokio::test]
    async fn interrupt_sets_status_to_interrupted_for_a_live_session() {
        let manager = SessionManager::new(config());
        let shared = start_sh(&manager, "sleep 5").await;
        let id = shared.lock().await.id.clone();

        manager.interrupt(&id.0).await.unwrap();
        assert_eq!(shared.lock().await.status, SessionStatus::Interrupted);
    }

    #[tokio::test]
    async fn respond_resolves_a_pending_inline_approval() {
        let manager = SessionManager::new(config());
        let shared = start_sh(&manager, ">&2 echo 'Allow this command?'; sleep 2").await;
        let id = shared.lock().await.id.clone();

        let question_id = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(pending) = shared.lock().await.pending_question.clone() {
                    return pending.id;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("stderr prompt should register a pending question");

        let result = manager
            .respond(&id.0, &question_id, vec!["allow".to_string()])
            .await
            .unwrap();
        assert_eq!(result.status, SessionStatus::Active);

        // respond() clears the pending question synchronously, before the
        // spawned task that delivers the answer back to the process ever runs.
        assert!(shared.lock().await.pending_question.is_none());
    }
}
