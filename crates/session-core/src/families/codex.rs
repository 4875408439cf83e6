//! Codex CLI family: argv construction and `--json` JSONL decoding.
//!
//! The wire shape (`thread.started`, `item.completed`, `turn.completed`) is
//! grounded directly in the teacher's `events.rs` (`CodexEvent`), just
//! remapped onto the shared `Event`/`StreamEvent` sum types instead of a
//! Codex-only enum.

use super::{ApprovalChannel, SpawnPolicy};
use crate::event::{Event, EventFamily, EventMetrics, ResultEvent, ResultStatus, StreamEvent};
use crate::session::SpawnParams;
use serde_json::Value;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

pub struct CodexPolicy;

impl SpawnPolicy for CodexPolicy {
    fn build_command(
        &self,
        params: &SpawnParams,
        resume_id: Option<&str>,
        _bridge_addr: Option<SocketAddr>,
    ) -> Command {
        let mut cmd = Command::new("codex");
        cmd.arg("exec")
            .arg("--json")
            .arg("-C")
            .arg(&params.working_directory);

        if params.bypass_approvals {
            cmd.arg("--dangerously-bypass-approvals-and-sandbox");
        }
        if let Some(model) = &params.model {
            cmd.arg("-m").arg(model);
        }
        if let Some(budget) = params.max_budget {
            cmd.arg("--max-budget-usd").arg(budget.to_string());
        }

        if let Some(id) = resume_id {
            cmd.arg("resume").arg(id);
        }
        cmd.arg(&params.prompt);

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped());
        cmd
    }

    fn event_family(&self) -> Arc<dyn EventFamily> {
        Arc::new(CodexEventFamily)
    }

    fn approval_channel(&self) -> ApprovalChannel {
        ApprovalChannel::InlineIo
    }

    fn supports_live_stdin(&self) -> bool {
        false
    }

    fn index_location(&self) -> super::IndexLocation {
        // Codex partitions session transcripts under a YYYY/MM/DD tree.
        let home = std::env::var_os("HOME")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|| std::path::PathBuf::from("."));
        super::IndexLocation::PartitionedTree(home.join(".codex").join("sessions"))
    }
}

struct CodexEventFamily;

impl EventFamily for CodexEventFamily {
    fn parse_line(&self, line: &str) -> Result<Vec<Event>, serde_json::Error> {
        let raw: Value = serde_json::from_str(line)?;
        let kind = raw.get("type").and_then(Value::as_str).unwrap_or("");

        let events = match kind {
            "thread.started" => vec![Event::Init {
                session_id: raw
                    .get("thread_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                timestamp: chrono::Utc::now(),
            }],
            "item.completed" => item_event(&raw).into_iter().collect(),
            "turn.completed" => vec![Event::Result(ResultEvent {
                status: ResultStatus::Success,
                text: None,
                error_text: None,
                metrics: raw.get("usage").map(|usage| EventMetrics {
                    cost_usd: None,
                    input_tokens: usage.get("input_tokens").and_then(Value::as_u64),
                    output_tokens: usage.get("output_tokens").and_then(Value::as_u64),
                }),
            })],
            "turn.started" | "prompt.sent" | "background_event" => {
                vec![Event::Unknown { raw }]
            }
            _ => vec![Event::Unknown { raw }],
        };
        Ok(events)
    }
}

fn item_event(raw: &Value) -> Option<Event> {
    let item = raw.get("item")?;
    let item_type = item.get("type").and_then(Value::as_str)?;
    match item_type {
        "agent_message" | "reasoning" => Some(Event::Stream(StreamEvent::TextDelta {
            text: item.get("text").and_then(Value::as_str)?.to_string(),
        })),
        "tool_call" => Some(Event::Stream(StreamEvent::ToolUseStart {
            id: item.get("call_id").and_then(Value::as_str)?.to_string(),
            name: item.get("name").and_then(Value::as_str)?.to_string(),
            input: item
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or(Value::Null),
        })),
        "tool_output" => Some(Event::Stream(StreamEvent::ToolUseStop {
            id: item.get("call_id").and_then(Value::as_str)?.to_string(),
        })),
        _ => Some(Event::Stream(StreamEvent::Other { raw: item.clone() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thread_started() {
        let line = r#"{"type":"thread.started","thread_id":"019b8211-cfdc-7b42-aba2-f10cf3236c70"}"#;
        let events = CodexEventFamily.parse_line(line).unwrap();
        match &events[0] {
            Event::Init { session_id, .. } => assert_eq!(session_id, "019b8211-cfdc-7b42-aba2-f10cf3236c70"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_tool_call_item() {
        let line = r#"{"type":"item.completed","item":{"id":"item_0","type":"tool_call","call_id":"c1","name":"shell","arguments":"{\"command\":\"ls\"}"}}"#;
        let events = CodexEventFamily.parse_line(line).unwrap();
        match &events[0] {
            Event::Stream(StreamEvent::ToolUseStart { id, name, .. }) => {
                assert_eq!(id, "c1");
                assert_eq!(name, "shell");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_turn_completed_as_result() {
        let line = r#"{"type":"turn.completed","usage":{"input_tokens":4079,"output_tokens":7}}"#;
        let events = CodexEventFamily.parse_line(line).unwrap();
        match &events[0] {
            Event::Result(result) => {
                assert_eq!(result.status, ResultStatus::Success);
                assert_eq!(result.metrics.as_ref().unwrap().output_tokens, Some(7));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
