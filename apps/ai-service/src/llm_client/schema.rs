//! Strict JSON schema sent with every generation request.

use serde_json::{json, Value};

/// Fields the model must return, in prompt order.
pub const REQUIRED_FIELDS: [&str; 3] = ["modules", "curriculum_refs", "objectives"];

pub const SCHEMA_NAME: &str = "educational_metadata";

/// `response_format` payload for OpenRouter structured outputs.
pub fn response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": SCHEMA_NAME,
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "modules": string_array(
                        "List of educational module names in Polish (uppercase)", 1, 3),
                    "curriculum_refs": string_array(
                        "List of curriculum reference codes (e.g., '4.15', '3.4')", 1, 7),
                    "objectives": string_array(
                        "List of learning objectives in Polish", 1, 5),
                },
                "required": REQUIRED_FIELDS,
                "additionalProperties": false
            }
        }
    })
}

fn string_array(description: &str, min_items: u32, max_items: u32) -> Value {
    json!({
        "type": "array",
        "description": description,
        "items": { "type": "string" },
        "minItems": min_items,
        "maxItems": max_items
    })
}
