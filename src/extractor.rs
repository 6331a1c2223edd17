//! Problem-context extraction from intercepted API responses.
//!
//! The host page fetches problem detail as JSON (`{"data": {...}}`); the
//! watcher hands the raw response text here. Extraction is a pure transform:
//! the caller persists the result. Absent fields fall back to explicit
//! placeholders so nothing downstream has to branch on field presence;
//! only text that is not valid JSON is an error.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::models::{ProblemContext, Sample};

pub const NO_DESCRIPTION: &str = "No Description";
pub const NO_CONSTRAINTS: &str = "No Constraints";
pub const NO_INPUT_FORMAT: &str = "No Input Format";
pub const NO_OUTPUT_FORMAT: &str = "No Output Format";
pub const NO_EDITORIAL: &str = "No Editorial Solution";
pub const UNTITLED: &str = "Untitled";

/// Parse a raw intercepted response body into a [`ProblemContext`].
///
/// Returns an error only when `raw` is not valid JSON; every recognized
/// field defaults otherwise. The freshly extracted record never carries
/// `user_code`; recovering that is the context store's concern.
pub fn parse_context(raw: &str) -> Result<ProblemContext> {
    let value: Value =
        serde_json::from_str(raw).context("intercepted response is not valid JSON")?;

    let data = value.get("data").unwrap_or(&Value::Null);

    Ok(ProblemContext {
        id: data.get("id").and_then(Value::as_u64).unwrap_or(0),
        title: string_or(data.get("title"), UNTITLED),
        description: string_or(data.get("body"), NO_DESCRIPTION),
        constraints: string_or(data.get("constraints"), NO_CONSTRAINTS),
        input_format: string_or(data.get("input_format"), NO_INPUT_FORMAT),
        output_format: string_or(data.get("output_format"), NO_OUTPUT_FORMAT),
        hints: parse_hints(data.get("hints")),
        samples: parse_samples(data.get("samples")),
        supported_languages: parse_languages(data.get("languages")),
        editorial_solution: parse_editorial(data.get("editorial_code")),
        user_code: None,
    })
}

fn string_or(value: Option<&Value>, fallback: &str) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

/// The site ships hints as an object (`hint1`, `hint2`, `solution_approach`);
/// empty slots are dropped, order is preserved.
fn parse_hints(value: Option<&Value>) -> Vec<String> {
    let Some(hints) = value else {
        return Vec::new();
    };

    ["hint1", "hint2", "solution_approach"]
        .iter()
        .filter_map(|key| hints.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_samples(value: Option<&Value>) -> Vec<Sample> {
    let Some(samples) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    samples
        .iter()
        .map(|s| Sample {
            input: string_or(s.get("input"), ""),
            output: string_or(s.get("output"), ""),
        })
        .collect()
}

fn parse_languages(value: Option<&Value>) -> Vec<String> {
    let Some(languages) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    languages
        .iter()
        .filter_map(|lang| match lang {
            Value::String(s) => Some(s.clone()),
            // Some payloads wrap each language in an object.
            Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

fn parse_editorial(value: Option<&Value>) -> String {
    value
        .and_then(|editorial| editorial.get("code"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| NO_EDITORIAL.to_string())
}
