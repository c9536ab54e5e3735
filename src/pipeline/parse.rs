//! Model answer → [`ParsedProfile`].
//!
//! The only hard failures are an answer that is not JSON and an answer whose
//! top-level value is not an object. Everything inside the object is read
//! leniently (see [`crate::output::lenient`]).

use crate::error::ParseError;
use crate::output::ParsedProfile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Stateless parser for model answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultParser;

impl ResultParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse `raw` into a profile, defaulting every missing or mistyped field.
    pub fn parse(&self, raw: &str) -> Result<ParsedProfile, ParseError> {
        let body = strip_code_fence(raw);
        let value: Value = serde_json::from_str(body).map_err(ParseError::InvalidJson)?;

        if !value.is_object() {
            return Err(ParseError::NotAnObject {
                found: json_type(&value),
            });
        }

        // Field-level leniency means this only fails on pathological input.
        let profile: ParsedProfile =
            serde_json::from_value(value).map_err(ParseError::InvalidJson)?;
        debug!(
            "Parsed profile: {} skills, {} experiences, {} education entries",
            profile.skills.len(),
            profile.experiences.len(),
            profile.education.len()
        );
        Ok(profile)
    }
}

/// Remove one outer ```` ```json ```` fence, if present.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
