use crate::error::{LlmError, Result};
use crate::types::PromptTurn;
use serde::{Deserialize, Serialize};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, temperature: f32, max_output_tokens: u32) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            max_output_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one non-streaming `generateContent` call and return the candidate text.
    #[tracing::instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn generate(&self, system: &str, turns: &[PromptTurn]) -> Result<String> {
        let req = GeminiRequest::new(system, turns, self.temperature, self.max_output_tokens);
        let url = format!(
            "{GEMINI_API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let response = self.http.post(&url).json(&req).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Http(format!(
                "gemini generateContent status={status} body={body}"
            )));
        }

        let parsed: GeminiResponse = serde_json::from_str(&body)?;
        extract_text(&parsed)
    }
}

fn extract_text(resp: &GeminiResponse) -> Result<String> {
    let text: String = resp
        .candidates
        .iter()
        .flat_map(|c| c.content.parts.iter())
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyReply);
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiSystemInstruction,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

impl GeminiRequest {
    fn new(system: &str, turns: &[PromptTurn], temperature: f32, max_output_tokens: u32) -> Self {
        let contents = turns
            .iter()
            .map(|t| GeminiContent {
                role: t.role.as_str(),
                parts: vec![GeminiPart {
                    text: Some(t.text.clone()),
                }],
            })
            .collect();
        Self {
            contents,
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart {
                    text: Some(system.to_string()),
                }],
            },
            generation_config: GeminiGenerationConfig {
                temperature,
                max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptTurn, Role};

    #[test]
    fn request_body_carries_system_instruction_and_turns() {
        let turns = vec![
            PromptTurn::user("viewer1: hello"),
            PromptTurn {
                role: Role::Model,
                text: "hi!".to_string(),
            },
        ];
        let req = GeminiRequest::new("be brief", &turns, 0.8, 256);
        let v = serde_json::to_value(&req).expect("serialize request");

        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][0]["parts"][0]["text"], "viewer1: hello");
        assert_eq!(v["contents"][1]["role"], "model");
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn extract_text_joins_parts_and_trims() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"  hello "},{"text":"there  "}]}}]}"#,
        )
        .expect("parse response");
        assert_eq!(extract_text(&resp).expect("text"), "hello there");
    }

    #[test]
    fn whitespace_only_response_is_empty_reply() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"   \n"}]}}]}"#,
        )
        .expect("parse response");
        assert!(matches!(extract_text(&resp), Err(LlmError::EmptyReply)));
    }

    #[test]
    fn missing_candidates_is_empty_reply() {
        let resp: GeminiResponse = serde_json::from_str(r#"{}"#).expect("parse response");
        assert!(matches!(extract_text(&resp), Err(LlmError::EmptyReply)));
    }
}
