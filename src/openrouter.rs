// OpenRouter-backed generation client

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

use crate::llm_client::{GenerationClient, GenerationRequest};
use crate::settings::Settings;
use crate::types::{ChatMessage, RoleType};

const HISTORY_LINE_LIMIT: usize = 24;
const HISTORY_CHAR_LIMIT: usize = 6000;

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_temperature: f64,
}

impl OpenRouterClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(OpenRouterClient {
            client,
            api_key: settings.openrouter_api_key.clone(),
            base_url: settings.openrouter_base_url.trim_end_matches('/').to_string(),
            model_temperature: settings.model_temperature,
        })
    }

    async fn post_chat(&self, payload: &Value) -> Result<(reqwest::StatusCode, String)> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .context("OpenRouter request failed")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read OpenRouter response body")?;
        Ok((status, body))
    }
}

#[async_trait::async_trait]
impl GenerationClient for OpenRouterClient {
    async fn generate_reply(&self, request: &GenerationRequest) -> Result<String> {
        if self.api_key.is_empty() {
            bail!("OPENROUTER_API_KEY is not set.");
        }

        let messages = json!([
            {"role": "system", "content": build_system_prompt(request)},
            {"role": "user", "content": render_history(&request.history, request.priority_message.as_ref())},
        ]);
        let payload = json!({
            "model": request.model,
            "temperature": self.model_temperature,
            "messages": messages,
        });

        let (mut status, mut body) = self.post_chat(&payload).await?;
        if !status.is_success() {
            let detail = extract_error_detail(status, &body);
            if should_retry_without_temperature(status, &detail) {
                // Some models reject sampling parameters outright.
                let retry_payload = json!({
                    "model": request.model,
                    "messages": messages,
                });
                let (retry_status, retry_body) = self.post_chat(&retry_payload).await?;
                if !retry_status.is_success() {
                    let retry_detail = extract_error_detail(retry_status, &retry_body);
                    bail!(
                        "OpenRouter API error ({}) for model '{}': {}",
                        retry_status.as_u16(),
                        request.model,
                        retry_detail
                    );
                }
                status = retry_status;
                body = retry_body;
            } else {
                bail!(
                    "OpenRouter API error ({}) for model '{}': {}",
                    status.as_u16(),
                    request.model,
                    detail
                );
            }
        }
        debug_assert!(status.is_success());

        let data: Value = serde_json::from_str(&body)
            .with_context(|| format!("OpenRouter returned malformed JSON for model '{}'", request.model))?;
        let reply = extract_reply(&data)
            .with_context(|| format!("OpenRouter response has no usable content for model '{}'", request.model))?;
        if reply.is_empty() {
            bail!("Model returned empty response.");
        }
        Ok(reply)
    }
}

fn build_system_prompt(request: &GenerationRequest) -> String {
    let instruction = match request.global_instruction.trim() {
        "" => "none",
        other => other,
    };
    let role_line = match request.role_type {
        RoleType::Facilitator => "facilitator".to_string(),
        RoleType::Character => "character".to_string(),
    };
    format!(
        "You are a participant in a multi-LLM round-table conversation.\n\n\
         Conversation background:\n\
         - Subject: {subject}\n\
         - Format: {mode}; {stance}.\n\
         - Current act: {act} — {goal}\n\n\
         Room-wide instruction:\n{instruction}\n\n\
         Your assignment:\n\
         - Name: {name}\n\
         - Role: {role}\n\
         {persona}\n",
        subject = request.subject,
        mode = request.conversation_mode.label(),
        stance = request.conversation_mode.stance(),
        act = request.act_name,
        goal = request.act_goal,
        instruction = instruction,
        name = request.display_name,
        role = role_line,
        persona = request.persona_prompt,
    )
}

fn render_history(history: &[ChatMessage], priority_message: Option<&ChatMessage>) -> String {
    let mut lines: Vec<String> = history
        .iter()
        .map(|message| format!("{}: {}", message.speaker_id, message.content))
        .collect();
    if let Some(priority) = priority_message {
        lines.push(format!("user (priority): {}", priority.content));
    }
    if lines.is_empty() {
        return "The conversation has not started yet. Open the discussion.".to_string();
    }
    let start = lines.len().saturating_sub(HISTORY_LINE_LIMIT);
    let rendered = lines[start..].join("\n");
    if rendered.chars().count() <= HISTORY_CHAR_LIMIT {
        return rendered;
    }
    let tail: String = rendered
        .chars()
        .skip(rendered.chars().count() - HISTORY_CHAR_LIMIT)
        .collect();
    format!("(history truncated, showing the tail only)\n{tail}")
}

fn extract_reply(data: &Value) -> Option<String> {
    let content = data
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;
    let reply = match content {
        Value::String(text) => text.trim().to_string(),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .filter(|text| !text.is_empty())
                .collect();
            texts.join(" ").trim().to_string()
        }
        _ => return None,
    };
    Some(reply)
}

fn extract_error_detail(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(data) = serde_json::from_str::<Value>(body) {
        if let Some(error) = data.get("error") {
            let message = error.get("message").and_then(Value::as_str);
            let code = error.get("code").and_then(Value::as_str);
            match (code, message) {
                (Some(code), Some(message)) if !code.is_empty() && !message.is_empty() => {
                    return format!("{code}: {message}");
                }
                (_, Some(message)) if !message.is_empty() => return message.to_string(),
                _ => {}
            }
        }
        if let Some(message) = data.get("message").and_then(Value::as_str) {
            if !message.is_empty() {
                return message.to_string();
            }
        }
    }
    let text = body.trim();
    if text.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        text.to_string()
    }
}

fn should_retry_without_temperature(status: reqwest::StatusCode, detail: &str) -> bool {
    let lowered = detail.to_lowercase();
    status == reqwest::StatusCode::BAD_REQUEST
        && (lowered.contains("temperature")
            || lowered.contains("unsupported value")
            || lowered.contains("unsupported parameter")
            || lowered.contains("sampling"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;
    use reqwest::StatusCode;

    fn message(speaker: &str, content: &str) -> ChatMessage {
        ChatMessage::new(MessageRole::Agent, speaker, content)
    }

    #[test]
    fn render_history_lists_speakers_and_priority_last() {
        let history = vec![message("alpha", "first point"), message("beta", "second point")];
        let priority = ChatMessage::new(MessageRole::User, "user", "answer this now");
        let rendered = render_history(&history, Some(&priority));
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "alpha: first point");
        assert_eq!(lines[2], "user (priority): answer this now");
    }

    #[test]
    fn render_history_handles_empty_conversation() {
        let rendered = render_history(&[], None);
        assert!(rendered.contains("Open the discussion"));
    }

    #[test]
    fn render_history_truncates_very_long_transcripts() {
        let long = "x".repeat(1000);
        let history: Vec<ChatMessage> = (0..10).map(|_| message("speaker", &long)).collect();
        let rendered = render_history(&history, None);
        assert!(rendered.starts_with("(history truncated"));
        assert!(rendered.chars().count() <= HISTORY_CHAR_LIMIT + 50);
    }

    #[test]
    fn error_detail_prefers_structured_error_body() {
        let body = r#"{"error": {"code": "rate_limited", "message": "slow down"}}"#;
        assert_eq!(
            extract_error_detail(StatusCode::TOO_MANY_REQUESTS, body),
            "rate_limited: slow down"
        );
        assert_eq!(
            extract_error_detail(StatusCode::BAD_GATEWAY, "upstream died"),
            "upstream died"
        );
        assert_eq!(extract_error_detail(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn temperature_rejection_triggers_retry_only_on_400() {
        assert!(should_retry_without_temperature(
            StatusCode::BAD_REQUEST,
            "unsupported parameter: temperature"
        ));
        assert!(!should_retry_without_temperature(
            StatusCode::INTERNAL_SERVER_ERROR,
            "temperature"
        ));
        assert!(!should_retry_without_temperature(StatusCode::BAD_REQUEST, "bad prompt"));
    }

    #[test]
    fn reply_extraction_supports_string_and_parts_content() {
        let string_body = serde_json::json!({
            "choices": [{"message": {"content": "  hello there  "}}]
        });
        assert_eq!(extract_reply(&string_body).unwrap(), "hello there");

        let parts_body = serde_json::json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "hello"},
                {"type": "text", "text": "world"},
            ]}}]
        });
        assert_eq!(extract_reply(&parts_body).unwrap(), "hello world");

        let empty = serde_json::json!({"choices": []});
        assert!(extract_reply(&empty).is_none());
    }
}
