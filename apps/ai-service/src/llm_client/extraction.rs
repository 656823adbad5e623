//! Recovery of the JSON payload from model output.
//!
//! Structured outputs should make this a plain parse, but some models wrap
//! the object in reasoning tags, markdown fences or prose. Order:
//! 1. strip `<think>` / `<thinking>` blocks, keeping their text as reasoning
//! 2. strip markdown code fences
//! 3. parse directly
//! 4. fall back to the smallest flat `{...}` holding all required fields

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm_client::schema::REQUIRED_FIELDS;

const REASONING_TAGS: [(&str, &str); 2] = [("<think>", "</think>"), ("<thinking>", "</thinking>")];

/// A `{...}` span with no nested braces.
static FLAT_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{[^{}]*\}").ok());

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Odpowiedź LLM jest pusta")]
    Empty,

    #[error("Odpowiedź nie jest prawidłowym JSON: {0}")]
    NoJson(String),
}

/// A recovered JSON object plus whatever reasoning preceded it.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub reasoning: Option<String>,
    /// Compact JSON text of `object`.
    pub json: String,
    pub object: Map<String, Value>,
}

pub fn extract_json(raw: &str) -> Result<Extracted, ExtractionError> {
    if raw.trim().is_empty() {
        return Err(ExtractionError::Empty);
    }

    let (reasoning, rest) = split_reasoning(raw);
    let body = strip_json_fences(rest);

    let object = match parse_object(body) {
        Some(object) => object,
        None => find_embedded_object(body)
            .ok_or_else(|| ExtractionError::NoJson(preview(body)))?,
    };

    Ok(Extracted {
        reasoning,
        json: Value::Object(object.clone()).to_string(),
        object,
    })
}

/// Splits off the first reasoning block. Text before the opening tag is
/// discarded along with the block.
pub fn split_reasoning(text: &str) -> (Option<String>, &str) {
    for (open, close) in REASONING_TAGS {
        if let (Some(start), Some(end)) = (text.find(open), text.find(close)) {
            let inner_start = start + open.len();
            if end >= inner_start {
                let reasoning = text[inner_start..end].trim();
                let rest = text[end + close.len()..].trim();
                let reasoning = (!reasoning.is_empty()).then(|| reasoning.to_string());
                return (reasoning, rest);
            }
        }
    }
    (None, text.trim())
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => {
            let stripped = stripped.trim_start();
            stripped
                .strip_suffix("```")
                .map(str::trim)
                .unwrap_or(stripped)
        }
        None => text,
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Smallest flat object that mentions every required field and parses.
fn find_embedded_object(text: &str) -> Option<Map<String, Value>> {
    let flat_object = FLAT_OBJECT.as_ref()?;

    let mut candidates: Vec<&str> = flat_object
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|candidate| {
            REQUIRED_FIELDS
                .iter()
                .all(|field| candidate.contains(&format!("\"{field}\"")))
        })
        .collect();
    candidates.sort_by_key(|candidate| candidate.len());

    candidates.into_iter().find_map(parse_object)
}

fn preview(text: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 120;
    let mut preview: String = text.chars().take(MAX_PREVIEW_CHARS).collect();
    if text.chars().count() > MAX_PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}
