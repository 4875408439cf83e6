//! Approval Classifier (C5): maps an agent's approval request to one of a
//! small closed set of question kinds, synthesizes an operator-facing
//! prompt, and translates the operator's eventual answer back into the
//! shape the agent's approval side-channel expects.

use crate::event::ApprovalRequest;
use crate::answer::Answer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of question kinds. `CommandApproval` and `PatchApproval` only
/// arise for an agent family whose approval side-channel has no tool name,
/// just free-form prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    ToolApproval,
    PlanApproval,
    Question,
    CommandApproval,
    PatchApproval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuestion {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClassifiedQuestion {
    pub kind: QuestionKind,
    pub prompt: String,
    pub options: Vec<String>,
    pub sub_questions: Vec<SubQuestion>,
}

/// Known-key list the tool-input summarizer draws from, in preference order.
const SUMMARY_KEYS: &[&str] = &["command", "file_path", "path", "pattern", "query", "url", "content"];
const SUMMARY_MAX_LEN: usize = 100;

/// Keywords that tip a free-form prompt towards `PatchApproval` rather than
/// `CommandApproval`.
const PATCH_KEYWORDS: &[&str] = &["patch", "apply", "modify", "delete", "create", "write"];

pub fn classify(request: &ApprovalRequest) -> ClassifiedQuestion {
    match request.tool_name.as_deref() {
        Some("ExitPlanMode") => ClassifiedQuestion {
            kind: QuestionKind::PlanApproval,
            prompt: plan_prompt(&request.tool_input),
            options: vec!["approve".to_string(), "reject".to_string()],
            sub_questions: Vec::new(),
        },
        Some("AskUserQuestion") => {
            let sub_questions = parse_sub_questions(&request.tool_input);
            ClassifiedQuestion {
                kind: QuestionKind::Question,
                prompt: "The agent has a question.".to_string(),
                options: Vec::new(),
                sub_questions,
            }
        }
        Some(tool_name) => ClassifiedQuestion {
            kind: QuestionKind::ToolApproval,
            prompt: tool_prompt(tool_name, &request.tool_input),
            options: vec!["allow".to_string(), "deny".to_string()],
            sub_questions: Vec::new(),
        },
        None => {
            let prompt_text = request.prompt_text.clone().unwrap_or_default();
            let kind = if contains_patch_keyword(&prompt_text) {
                QuestionKind::PatchApproval
            } else {
                QuestionKind::CommandApproval
            };
            ClassifiedQuestion {
                kind,
                prompt: prompt_text,
                options: vec!["approve".to_string(), "deny".to_string()],
                sub_questions: Vec::new(),
            }
        }
    }
}

fn tool_prompt(tool_name: &str, input: &Value) -> String {
    match summarize_input(input) {
        Some(summary) => format!("{}: {}", tool_name, summary),
        None => tool_name.to_string(),
    }
}

fn summarize_input(input: &Value) -> Option<String> {
    let obj = input.as_object()?;
    for key in SUMMARY_KEYS {
        if let Some(value) = obj.get(*key).and_then(Value::as_str) {
            return Some(truncate(value, SUMMARY_MAX_LEN));
        }
    }
    None
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

fn plan_prompt(input: &Value) -> String {
    input
        .get("plan")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| serde_json::to_string_pretty(input).unwrap_or_default())
}

fn parse_sub_questions(input: &Value) -> Vec<SubQuestion> {
    input
        .get("questions")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let question = item.get("question")?.as_str()?.to_string();
                    let options = item
                        .get("options")
                        .and_then(Value::as_array)
                        .map(|opts| {
                            opts.iter()
                                .filter_map(|o| o.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(SubQuestion { question, options })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn contains_patch_keyword(prompt: &str) -> bool {
    let lower = prompt.to_lowercase();
    PATCH_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Translate the operator's answer(s) into the response shape the agent's
/// approval side-channel expects. `answers` is the `answers[]` parameter of
/// the `respond` tool operation; for all kinds but `Question` only the
/// first is meaningful.
pub fn translate(kind: QuestionKind, original_input: &Value, answers: &[Answer]) -> Value {
    let first = answers.first();
    match kind {
        QuestionKind::ToolApproval => match first {
            Some(a) if a.decision == "allow" => serde_json::json!({"behavior": "allow"}),
            other => serde_json::json!({
                "behavior": "deny",
                "message": other.and_then(|a| a.reason.clone()),
            }),
        },
        QuestionKind::PlanApproval => match first {
            Some(a) if a.decision == "approve" => serde_json::json!({
                "behavior": "allow",
                "updatedInput": original_input,
            }),
            other => serde_json::json!({
                "behavior": "deny",
                "message": other.and_then(|a| a.reason.clone()),
            }),
        },
        QuestionKind::Question => {
            let mut updated = original_input
                .as_object()
                .cloned()
                .unwrap_or_else(Map::new);
            let answer_values: Vec<Value> = answers
                .iter()
                .map(|a| Value::String(a.decision.clone()))
                .collect();
            updated.insert("answers".to_string(), Value::Array(answer_values));
            serde_json::json!({
                "behavior": "allow",
                "updatedInput": Value::Object(updated),
            })
        }
        QuestionKind::CommandApproval | QuestionKind::PatchApproval => match first {
            Some(a) if matches!(a.decision.as_str(), "approve" | "allow" | "yes") => {
                serde_json::json!({"approved": true, "reason": a.reason})
            }
            other => serde_json::json!({
                "approved": false,
                "reason": other.and_then(|a| a.reason.clone()),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::parse;

    fn req(tool_name: Option<&str>, input: Value) -> ApprovalRequest {
        ApprovalRequest {
            tool_name: tool_name.map(str::to_string),
            tool_input: input,
            prompt_text: None,
        }
    }

    #[test]
    fn unrecognized_tool_is_tool_approval() {
        let r = req(Some("Bash"), serde_json::json!({"command": "ls -la"}));
        let q = classify(&r);
        assert_eq!(q.kind, QuestionKind::ToolApproval);
        assert_eq!(q.options, vec!["allow", "deny"]);
        assert!(q.prompt.contains("Bash"));
        assert!(q.prompt.contains("ls -la"));
    }

    #[test]
    fn exit_plan_mode_is_plan_approval() {
        let r = req(
            Some("ExitPlanMode"),
            serde_json::json!({"plan": "1. Refactor auth\n2. Add tests"}),
        );
        let q = classify(&r);
        assert_eq!(q.kind, QuestionKind::PlanApproval);
        assert_eq!(q.options, vec!["approve", "reject"]);
        assert!(q.prompt.contains("Refactor auth"));
    }

    #[test]
    fn ask_user_question_carries_sub_questions() {
        let r = req(
            Some("AskUserQuestion"),
            serde_json::json!({"questions": [
                {"question": "Which?", "options": ["OAuth2", "SAML"]},
                {"question": "Tests?", "options": ["Yes", "No"]},
            ]}),
        );
        let q = classify(&r);
        assert_eq!(q.kind, QuestionKind::Question);
        assert_eq!(q.sub_questions.len(), 2);
        assert_eq!(q.sub_questions[0].question, "Which?");
    }

    #[test]
    fn long_content_is_truncated() {
        let long = "x".repeat(250);
        let r = req(Some("Write"), serde_json::json!({"content": long}));
        let q = classify(&r);
        assert!(q.prompt.len() < 250);
        assert!(q.prompt.ends_with("..."));
    }

    #[test]
    fn translate_tool_approval_allow() {
        let v = translate(QuestionKind::ToolApproval, &Value::Null, &[parse("allow")]);
        assert_eq!(v, serde_json::json!({"behavior": "allow"}));
    }

    #[test]
    fn translate_tool_approval_deny_with_reason() {
        let v = translate(
            QuestionKind::ToolApproval,
            &Value::Null,
            &[parse("deny: too risky")],
        );
        assert_eq!(v["behavior"], "deny");
        assert_eq!(v["message"], "too risky");
    }

    #[test]
    fn translate_plan_rejection_carries_reason_as_message() {
        let v = translate(
            QuestionKind::PlanApproval,
            &serde_json::json!({"plan": "..."}),
            &[parse("reject: also cover the auth module")],
        );
        assert_eq!(v["behavior"], "deny");
        assert_eq!(v["message"], "also cover the auth module");
    }

    #[test]
    fn translate_question_merges_answers_into_original_input() {
        let original = serde_json::json!({"questions": [{"question": "Which?"}]});
        let v = translate(
            QuestionKind::Question,
            &original,
            &[parse("OAuth2"), parse("Yes")],
        );
        assert_eq!(v["behavior"], "allow");
        assert_eq!(v["updatedInput"]["answers"], serde_json::json!(["OAuth2", "Yes"]));
        assert_eq!(v["updatedInput"]["questions"][0]["question"], "Which?");
    }

    #[test]
    fn translate_command_approval_yes_variants() {
        for decision in ["approve", "allow", "yes"] {
            let v = translate(QuestionKind::CommandApproval, &Value::Null, &[parse(decision)]);
            assert_eq!(v["approved"], true);
        }
        let v = translate(QuestionKind::CommandApproval, &Value::Null, &[parse("no")]);
        assert_eq!(v["approved"], false);
    }
}
