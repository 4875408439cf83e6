//! Event Decoder (C1): turns a byte stream into a lazy sequence of typed
//! events, tolerating malformed lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// A parsed event from an agent CLI's JSONL stream. Abstract over the
/// agent-specific wire shape; each `EventFamily` maps its own tags onto this
/// sum type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// First event of a fresh spawn; carries the agent-assigned real id.
    Init {
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A chunk of agent output.
    Stream(StreamEvent),
    /// Indicates the current turn ended.
    Result(ResultEvent),
    /// Anything with an unrecognized discriminator. Never dropped.
    Unknown { raw: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stream_kind", rename_all = "snake_case")]
pub enum StreamEvent {
    TextDelta { text: String },
    ToolUseStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolUseStop { id: String },
    Other { raw: serde_json::Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
    Interrupted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEvent {
    pub status: ResultStatus,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error_text: Option<String>,
    #[serde(default)]
    pub metrics: Option<EventMetrics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetrics {
    #[serde(default)]
    pub cost_usd: Option<f64>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

/// An approval request surfaced out-of-band from the event stream (either a
/// structured callback, or a stderr-detected inline prompt). Not itself an
/// `Event` — it is routed straight to `SessionManager::handle_approval`.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool_name: Option<String>,
    pub tool_input: serde_json::Value,
    pub prompt_text: Option<String>,
}

/// Per-agent-family line parser. Implementations live under `families/`.
///
/// One input line may yield zero, one, or several `Event`s (a single Claude
/// `stream-json` line can carry both a text delta and a tool-use start).
pub trait EventFamily: Send + Sync {
    fn parse_line(&self, line: &str) -> Result<Vec<Event>, serde_json::Error>;
}

/// Spawn a background task that reads lines from `reader`, decodes them via
/// `family`, and forwards parsed events over the returned channel.
///
/// Malformed JSON is logged and skipped — it never closes the channel.
/// Only a lower-level I/O error (or clean EOF) ends the sequence.
pub fn decode_stream<R>(reader: R, family: Arc<dyn EventFamily>, buffer: usize) -> mpsc::Receiver<Event>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer);

    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match family.parse_line(&line) {
                        Ok(events) => {
                            for event in events {
                                if tx.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(err) => {
                            tracing::warn!("malformed event line, skipping: {}", err);
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::error!("event stream read error, terminating: {}", err);
                    break;
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoFamily;
    impl EventFamily for EchoFamily {
        fn parse_line(&self, line: &str) -> Result<Vec<Event>, serde_json::Error> {
            if line == "bad" {
                // Force a parse error the same way a real family would.
                return serde_json::from_str::<serde_json::Value>("{not json");
            }
            Ok(vec![Event::Unknown {
                raw: serde_json::json!({"line": line}),
            }])
        }
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_not_fatal() {
        let input = b"bad\n{\"ok\":true}\n".to_vec();
        let mut rx = decode_stream(std::io::Cursor::new(input), Arc::new(EchoFamily), 8);
        let first = rx.recv().await.unwrap();
        match first {
            Event::Unknown { raw } => assert_eq!(raw["line"], "{\"ok\":true}"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let input = b"\n\n{\"ok\":true}\n\n".to_vec();
        let mut rx = decode_stream(std::io::Cursor::new(input), Arc::new(EchoFamily), 8);
        let first = rx.recv().await.unwrap();
        assert!(matches!(first, Event::Unknown { .. }));
        assert!(rx.recv().await.is_none());
    }
}
