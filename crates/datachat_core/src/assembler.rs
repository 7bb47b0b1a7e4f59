//! Post-processing of the model's final text: pull out at most one fenced
//! JSON chart payload and strip it from the displayed answer.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// First fenced block (optional `json` tag) wrapping a single JSON object,
/// matched non-greedily.
static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced-json regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledReply {
    pub text: String,
    /// Canonical JSON re-serialization of the embedded chart object.
    pub chart: Option<String>,
}

/// Only the first fenced block is considered; if it is not strict JSON the
/// text is returned untouched (malformed block included) with no payload.
pub fn assemble(raw: &str) -> AssembledReply {
    if let Some(caps) = FENCED_JSON.captures(raw) {
        let block = &caps[1];
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            if value.is_object() {
                let span = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
                let mut text = String::with_capacity(raw.len());
                text.push_str(&raw[..span.start]);
                text.push_str(&raw[span.end..]);
                let chart = serde_json::to_string(&value).ok();
                return AssembledReply {
                    text: text.trim().to_string(),
                    chart,
                };
            }
        }
    }
    AssembledReply {
        text: raw.to_string(),
        chart: None,
    }
}
