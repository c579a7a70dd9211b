//! External judge tier
//!
//! The judge only sees matches the path check could not decide. Its reply is
//! free text that should contain a JSON object; anything else becomes a
//! [`JudgeOutcome::JudgeFailure`] rather than a guess.

use crate::config::JudgeSettings;
use crate::oracle::path::{SideEvidence, VerdictInput};
use crate::types::{Confidence, Slot};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const JUDGE_SYSTEM_PROMPT: &str = "You are an impartial judge for an AI agent competition. \
You will be shown the task description and evidence from both agents (path, move count, final \
location and, when available, a final screenshot). You must decide who completed the task \
better, or declare a draw.

Respond with ONLY valid JSON matching this schema:
{
  \"winner\": \"agent1\" | \"agent2\" | \"draw\",
  \"reasoning\": \"<1-3 sentences explaining the decision>\",
  \"confidence\": \"high\" | \"medium\"
}

Rules:
- Neither agent reached the target; judge who got meaningfully closer.
- Use the screenshot evidence when present, then path and final location.
- Fewer moves for the same progress is better.
- Declare a draw only if both agents made equivalent progress.
- Never pick a winner based solely on who claimed victory first.";

/// Parsed reply of the external judge
#[derive(Debug, Clone, PartialEq)]
pub enum JudgeOutcome {
    Decisive {
        winner: Slot,
        reasoning: String,
        confidence: Confidence,
    },
    Draw {
        reasoning: String,
        confidence: Confidence,
    },
    /// Reply could not be used; carries a description of why
    JudgeFailure { reasoning: String },
}

/// Trait for external judges
#[async_trait]
pub trait Judge: Send + Sync {
    /// Send the case and return the judge's raw text reply
    async fn judge(&self, input: &VerdictInput) -> Result<String>;
}

/// Render the textual case for one side
fn describe_side(label: &str, side: &SideEvidence) -> String {
    format!(
        "{}: {}\n- Moves: {}\n- Path: {}\n- Final location: {}",
        label,
        side.name,
        side.move_count,
        side.path_summary(),
        side.last_location.as_deref().unwrap_or("unknown")
    )
}

/// Render the full case sent to the judge
pub fn build_case(input: &VerdictInput) -> String {
    format!(
        "Task: {}\nTarget: {}\n\n{}\n\n{}\n\nWho completed the task better?",
        input.task_description,
        input.target,
        describe_side("Agent 1", &input.side_a),
        describe_side("Agent 2", &input.side_b)
    )
}

#[derive(Debug, Deserialize)]
struct RawJudgeVerdict {
    winner: String,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Pull the structured verdict out of a free-text reply.
///
/// Accepts bare JSON, JSON wrapped in prose, and fenced code blocks.
pub fn parse_judge_response(raw: &str) -> JudgeOutcome {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return JudgeOutcome::JudgeFailure {
            reasoning: "Judge reply contained no JSON object".to_string(),
        };
    };
    if end < start {
        return JudgeOutcome::JudgeFailure {
            reasoning: "Judge reply contained no JSON object".to_string(),
        };
    }

    let parsed: RawJudgeVerdict = match serde_json::from_str(&raw[start..=end]) {
        Ok(parsed) => parsed,
        Err(e) => {
            return JudgeOutcome::JudgeFailure {
                reasoning: format!("Judge reply was not a valid verdict: {}", e),
            }
        }
    };

    let reasoning = parsed
        .reasoning
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "No reasoning provided.".to_string());
    let confidence = match parsed.confidence.as_deref().map(str::trim) {
        Some(c) if c.eq_ignore_ascii_case("high") => Confidence::High,
        _ => Confidence::Medium,
    };

    match parsed.winner.trim().to_ascii_lowercase().as_str() {
        "agent1" => JudgeOutcome::Decisive {
            winner: Slot::A,
            reasoning,
            confidence,
        },
        "agent2" => JudgeOutcome::Decisive {
            winner: Slot::B,
            reasoning,
            confidence,
        },
        "draw" => JudgeOutcome::Draw {
            reasoning,
            confidence,
        },
        other => JudgeOutcome::JudgeFailure {
            reasoning: format!("Judge named an unknown winner '{}'", other),
        },
    }
}

/// Judge backed by the Anthropic messages API
#[derive(Clone)]
pub struct AnthropicJudge {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicJudge {
    /// Build a judge from settings; `None` when no API key is configured
    pub fn from_settings(http: reqwest::Client, settings: &JudgeSettings) -> Option<Self> {
        let api_key = settings
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())?;

        Some(Self {
            http,
            api_url: settings.api_url.clone(),
            api_key,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_seconds),
        })
    }

    fn screenshot_block(side: &SideEvidence) -> ContentBlock {
        let data = side
            .latest_image
            .as_deref()
            .map(|image| match image.split_once("base64,") {
                Some((_, data)) => data,
                None => image,
            })
            .filter(|data| !data.is_empty());

        match data {
            Some(data) => ContentBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: "image/jpeg",
                    data: data.to_string(),
                },
            },
            None => ContentBlock::Text {
                text: "(no screenshot available)".to_string(),
            },
        }
    }

    fn build_content(input: &VerdictInput) -> Vec<ContentBlock> {
        vec![
            ContentBlock::Text {
                text: format!(
                    "Task: {}\nTarget: {}\n\n{}\n- Final screenshot:",
                    input.task_description,
                    input.target,
                    describe_side("Agent 1", &input.side_a)
                ),
            },
            Self::screenshot_block(&input.side_a),
            ContentBlock::Text {
                text: format!(
                    "\n{}\n- Final screenshot:",
                    describe_side("Agent 2", &input.side_b)
                ),
            },
            Self::screenshot_block(&input.side_b),
            ContentBlock::Text {
                text: "\nWho completed the task better?".to_string(),
            },
        ]
    }
}

#[async_trait]
impl Judge for AnthropicJudge {
    async fn judge(&self, input: &VerdictInput) -> Result<String> {
        let req = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: JUDGE_SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: Self::build_content(input),
            }],
        };

        let resp = self
            .http
            .post(&self.api_url)
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .context("judge request")?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let snippet: String = body.chars().take(800).collect();
            return Err(anyhow!("judge {}: {}", status.as_u16(), snippet));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body).context("judge json parse")?;
        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| anyhow!("judge reply had no text block"))
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: &'static str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bare_json() {
        let outcome = parse_judge_response(
            r#"{"winner": "agent2", "reasoning": "Closer to the target.", "confidence": "high"}"#,
        );
        assert_eq!(
            outcome,
            JudgeOutcome::Decisive {
                winner: Slot::B,
                reasoning: "Closer to the target.".to_string(),
                confidence: Confidence::High,
            }
        );
    }

    #[test]
    fn parse_fenced_json_with_prose() {
        let raw = "Here is my verdict:\n```json\n{\"winner\": \"draw\", \"reasoning\": \"Even.\"}\n```\nThanks.";
        assert_eq!(
            parse_judge_response(raw),
            JudgeOutcome::Draw {
                reasoning: "Even.".to_string(),
                confidence: Confidence::Medium,
            }
        );
    }

    #[test]
    fn parse_missing_reasoning_gets_placeholder() {
        match parse_judge_response(r#"{"winner":"agent1"}"#) {
            JudgeOutcome::Decisive { reasoning, .. } => {
                assert_eq!(reasoning, "No reasoning provided.")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn parse_failures_are_tagged() {
        assert!(matches!(
            parse_judge_response("I think agent one did better"),
            JudgeOutcome::JudgeFailure { .. }
        ));
        assert!(matches!(
            parse_judge_response(r#"{"winner": "agent3"}"#),
            JudgeOutcome::JudgeFailure { .. }
        ));
        assert!(matches!(
            parse_judge_response("} backwards {"),
            JudgeOutcome::JudgeFailure { .. }
        ));
        assert!(matches!(
            parse_judge_response(r#"{"reasoning": "no winner field"}"#),
            JudgeOutcome::JudgeFailure { .. }
        ));
    }

    #[test]
    fn missing_api_key_disables_judge() {
        let settings = JudgeSettings::default();
        assert!(AnthropicJudge::from_settings(reqwest::Client::new(), &settings).is_none());

        let settings = JudgeSettings {
            api_key: Some("  ".to_string()),
            ..JudgeSettings::default()
        };
        assert!(AnthropicJudge::from_settings(reqwest::Client::new(), &settings).is_none());
    }

    #[test]
    fn case_mentions_both_sides() {
        let input = VerdictInput {
            task_description: "Navigate from Music to Jazz".to_string(),
            target: "Jazz".to_string(),
            side_a: SideEvidence {
                name: "alpha".to_string(),
                path: vec!["/wiki/Music".to_string(), "/wiki/Blues".to_string()],
                move_count: 1,
                ..Default::default()
            },
            side_b: SideEvidence {
                name: "beta".to_string(),
                move_count: 0,
                ..Default::default()
            },
        };

        let case = build_case(&input);
        assert!(case.contains("Agent 1: alpha"));
        assert!(case.contains("Music -> Blues"));
        assert!(case.contains("Agent 2: beta"));
        assert!(case.contains("(no moves recorded)"));
    }

    #[test]
    fn screenshot_strips_data_url_prefix() {
        let side = SideEvidence {
            latest_image: Some("data:image/jpeg;base64,QUJD".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(AnthropicJudge::screenshot_block(&side)).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["source"]["type"], "base64");
        assert_eq!(json["source"]["data"], "QUJD");
    }
}
