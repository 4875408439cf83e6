//! Claude Code CLI family: argv construction and `stream-json` decoding.
//!
//! Grounded in the teacher's `claude_agent.rs` invocation shape
//! (`--print --verbose --output-format stream-json`), generalized to cover
//! the full parameter surface (approval policy, tool allow/deny lists,
//! budgets, system prompt, images).

use super::{ApprovalChannel, SpawnPolicy};
use crate::event::{Event, EventFamily, ResultEvent, ResultStatus, StreamEvent};
use crate::session::{ApprovalPolicy, SpawnParams};
use serde_json::Value;
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

pub struct ClaudePolicy;

impl SpawnPolicy for ClaudePolicy {
    fn build_command(
        &self,
        params: &SpawnParams,
        resume_id: Option<&str>,
        bridge_addr: Option<SocketAddr>,
    ) -> Command {
        let mut cmd = Command::new("claude");
        cmd.arg("--print")
            .arg("--verbose")
            .arg("--output-format")
            .arg("stream-json")
            .current_dir(&params.working_directory);

        if params.bypass_approvals || params.approval_policy == ApprovalPolicy::BypassPermissions {
            cmd.arg("--dangerously-skip-permissions");
        } else {
            cmd.arg("--permission-mode").arg(match params.approval_policy {
                ApprovalPolicy::Plan => "plan",
                ApprovalPolicy::AcceptEdits => "acceptEdits",
                ApprovalPolicy::Default | ApprovalPolicy::BypassPermissions => "default",
            });
            // The callback bridge wiring is only meaningful when approvals
            // are not bypassed.
            if let Some(addr) = bridge_addr {
                cmd.arg("--permission-prompt-tool-url")
                    .arg(format!("http://{}/permission", addr));
            }
        }

        if let Some(model) = &params.model {
            cmd.arg("--model").arg(model);
        }
        if !params.allowed_tools.is_empty() {
            cmd.arg("--allowedTools").arg(params.allowed_tools.join(","));
        }
        if !params.disallowed_tools.is_empty() {
            cmd.arg("--disallowedTools").arg(params.disallowed_tools.join(","));
        }
        if let Some(max_turns) = params.max_turns {
            cmd.arg("--max-turns").arg(max_turns.to_string());
        }
        if let Some(system_prompt) = &params.system_prompt {
            cmd.arg("--append-system-prompt").arg(system_prompt);
        }
        for image in &params.images {
            cmd.arg("--image").arg(image);
        }
        if let Some(id) = resume_id {
            cmd.arg("--resume").arg(id);
        }

        cmd.arg(&params.prompt);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::piped());
        cmd
    }

    fn event_family(&self) -> Arc<dyn EventFamily> {
        Arc::new(ClaudeEventFamily)
    }

    fn approval_channel(&self) -> ApprovalChannel {
        ApprovalChannel::CallbackBridge
    }

    fn supports_live_stdin(&self) -> bool {
        true
    }

    fn index_location(&self) -> super::IndexLocation {
        // Claude Code keeps a single append-only JSONL transcript index
        // under the user's home directory.
        let home = dirs_home();
        super::IndexLocation::JsonlFile(home.join(".claude").join("history.jsonl"))
    }
}

fn dirs_home() -> std::path::PathBuf {
    std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}

struct ClaudeEventFamily;

impl EventFamily for ClaudeEventFamily {
    fn parse_line(&self, line: &str) -> Result<Vec<Event>, serde_json::Error> {
        let raw: Value = serde_json::from_str(line)?;
        let kind = raw.get("type").and_then(Value::as_str).unwrap_or("");

        let events = match kind {
            "system" if raw.get("subtype").and_then(Value::as_str) == Some("init") => {
                let session_id = raw
                    .get("session_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                vec![Event::Init {
                    session_id,
                    timestamp: chrono::Utc::now(),
                }]
            }
            "assistant" | "user" => content_blocks(&raw)
                .into_iter()
                .map(Event::Stream)
                .collect(),
            "result" => vec![Event::Result(parse_result(&raw))],
            _ => vec![Event::Unknown { raw }],
        };
        Ok(events)
    }
}

/// Claude's `stream-json` assistant/user messages carry an array of content
/// blocks under `message.content`; each block becomes one `StreamEvent`.
fn content_blocks(raw: &Value) -> Vec<StreamEvent> {
    let blocks = raw
        .pointer("/message/content")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    blocks
        .into_iter()
        .filter_map(|block| {
            let block_type = block.get("type").and_then(Value::as_str)?;
            match block_type {
                "text" => Some(StreamEvent::TextDelta {
                    text: block.get("text").and_then(Value::as_str)?.to_string(),
                }),
                "tool_use" => Some(StreamEvent::ToolUseStart {
                    id: block.get("id").and_then(Value::as_str)?.to_string(),
                    name: block.get("name").and_then(Value::as_str)?.to_string(),
                    input: block.get("input").cloned().unwrap_or(Value::Null),
                }),
                "tool_result" => Some(StreamEvent::ToolUseStop {
                    id: block.get("tool_use_id").and_then(Value::as_str)?.to_string(),
                }),
                _ => Some(StreamEvent::Other { raw: block }),
            }
        })
        .collect()
}

fn parse_result(raw: &Value) -> ResultEvent {
    let subtype = raw.get("subtype").and_then(Value::as_str).unwrap_or("");
    let status = match subtype {
        "success" => ResultStatus::Success,
        "error_during_execution" | "error_max_turns" => ResultStatus::Error,
        _ => ResultStatus::Error,
    };
    ResultEvent {
        status,
        text: raw.get("result").and_then(Value::as_str).map(String::from),
        error_text: raw.get("error").and_then(Value::as_str).map(String::from),
        metrics: raw.get("usage").map(|usage| crate::event::EventMetrics {
            cost_usd: raw.get("total_cost_usd").and_then(Value::as_f64),
            input_tokens: usage.get("input_tokens").and_then(Value::as_u64),
            output_tokens: usage.get("output_tokens").and_then(Value::as_u64),
        }),
    }
}
