//! One conversational turn: hand the user message and the tool proxy to the
//! model, let it call tools in any order, collect the final text.

use crate::error::ToolError;
use crate::formulas::AnalystRules;
use crate::llm_protocol::{tool_definitions, ChatCompletionResponse, ChatMessage};
use crate::proxy::ToolProxy;
use anyhow::{anyhow, Context};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::time::Duration;

pub const MISSING_KEY_MESSAGE: &str = "Please provide an OpenAI API Key to proceed.";
pub const ITERATION_LIMIT_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub referer: String,
    pub app_title: String,
    pub max_turns: usize,
    /// Bound on each model call; the upstream API imposes none.
    pub request_timeout: Duration,
}

impl AgentConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "x-ai/grok-4.1-fast:free".into(),
            base_url: "https://openrouter.ai/api/v1".into(),
            referer: "http://localhost:3000".into(),
            app_title: "Datachat".into(),
            max_turns: 12,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// The model is an opaque decision process: zero or more tool calls, then a
/// final answer. This never hard-fails a chat turn — reasoning and parsing
/// problems become a best-effort diagnostic string. The one exception is a
/// dead tool session, which is terminal for the request.
#[tracing::instrument(skip_all, fields(plotting = plotting_enabled))]
pub async fn run_turn(
    proxy: &ToolProxy,
    message: &str,
    cfg: &AgentConfig,
    plotting_enabled: bool,
) -> Result<String, ToolError> {
    if cfg.api_key.trim().is_empty() {
        return Ok(MISSING_KEY_MESSAGE.to_string());
    }
    match drive(proxy, message, cfg, plotting_enabled).await {
        Ok(text) => Ok(text),
        Err(TurnError::Session(e)) => Err(e),
        Err(TurnError::Reasoning(e)) => {
            tracing::warn!(error = %e, "reasoning failure; returning diagnostic text");
            Ok(format!("Error executing query: {e}"))
        }
    }
}

enum TurnError {
    Session(ToolError),
    Reasoning(anyhow::Error),
}

impl From<anyhow::Error> for TurnError {
    fn from(e: anyhow::Error) -> Self {
        TurnError::Reasoning(e)
    }
}

async fn drive(
    proxy: &ToolProxy,
    message: &str,
    cfg: &AgentConfig,
    plotting_enabled: bool,
) -> Result<String, TurnError> {
    let client = reqwest::Client::builder()
        .timeout(cfg.request_timeout)
        .build()
        .context("building HTTP client")?;
    let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
    let rules = AnalystRules::v1();
    let tools = tool_definitions(plotting_enabled);

    let mut messages = vec![
        ChatMessage::system(rules.render_prompt(plotting_enabled)),
        ChatMessage::user(message),
    ];

    for turn in 0..cfg.max_turns {
        let body = json!({
            "model": cfg.model,
            "temperature": 0,
            "messages": messages,
            "tools": tools,
            "tool_choice": "auto",
        });
        let resp = client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", cfg.api_key))
            .header("HTTP-Referer", &cfg.referer)
            .header("X-Title", &cfg.app_title)
            .json(&body)
            .send()
            .await
            .context("model request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("model API error {status}: {text}").into());
        }
        let completion: ChatCompletionResponse =
            resp.json().await.context("decoding model response")?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("model returned no choices"))?
            .message;

        let calls = reply.tool_calls.clone().unwrap_or_default();
        if calls.is_empty() {
            let content = reply
                .content
                .ok_or_else(|| anyhow!("model returned neither text nor tool calls"))?;
            tracing::debug!(turns_used = turn + 1, "turn finished");
            return Ok(content);
        }

        messages.push(reply);
        for call in calls {
            let outcome = proxy
                .dispatch(&call.function.name, &call.function.arguments)
                .await;
            let text = match outcome {
                Ok(text) => text,
                Err(e @ ToolError::SessionUnavailable(_)) => {
                    return Err(TurnError::Session(e));
                }
                // Tool-level failures go back to the model so it can
                // rephrase (rejected SQL, bad arguments, storage down).
                Err(e) => format!("Error: {e}"),
            };
            tracing::debug!(tool = %call.function.name, "tool call completed");
            messages.push(ChatMessage::tool(&call.id, text));
        }
    }
    Ok(ITERATION_LIMIT_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_service_constants() {
        let cfg = AgentConfig::new("sk-test");
        assert_eq!(cfg.model, "x-ai/grok-4.1-fast:free");
        assert_eq!(cfg.base_url, "https://openrouter.ai/api/v1");
        assert!(cfg.max_turns >= 1);
        assert!(cfg.request_timeout >= Duration::from_secs(1));
    }
}
