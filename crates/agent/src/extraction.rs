use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use thiserror::Error;
use tracing::debug;

use procura_core::{ExtractedFields, FieldSpec};

use crate::llm::{LlmClient, LlmError};

const SYSTEM_PROMPT: &str = "You are a procurement assistant reading a supplier's reply to a \
purchase inquiry. Extract only the requested fields from the reply. Respond with a single JSON \
object whose keys are exactly the requested field keys. Copy the supplier's own wording for each \
value. Omit any field the reply does not answer. Output nothing besides the JSON object.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("extraction backend failed: {0}")]
    Backend(#[from] LlmError),

    #[error("extraction output was not a JSON object: {0}")]
    MalformedOutput(String),
}

/// Reads free-text supplier replies into key/value pairs. Implementations
/// never decide what counts as progress; merging is the record's job.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(
        &self,
        raw_text: &str,
        expected: &[&FieldSpec],
    ) -> Result<ExtractedFields, ExtractionError>;
}

pub struct LlmFieldExtractor<C> {
    client: C,
}

impl<C> LlmFieldExtractor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> FieldExtractor for LlmFieldExtractor<C>
where
    C: LlmClient,
{
    async fn extract(
        &self,
        raw_text: &str,
        expected: &[&FieldSpec],
    ) -> Result<ExtractedFields, ExtractionError> {
        let prompt = build_prompt(raw_text, expected);
        let completion = self.client.complete(SYSTEM_PROMPT, &prompt).await?;
        parse_object(&completion)
    }
}

fn build_prompt(raw_text: &str, expected: &[&FieldSpec]) -> String {
    let mut prompt = String::from("Requested fields:\n");
    for spec in expected {
        let _ = writeln!(prompt, "- {} ({})", spec.name.as_str(), spec.label);
    }
    let _ = write!(prompt, "\nSupplier reply:\n{raw_text}");
    prompt
}

fn parse_object(raw: &str) -> Result<ExtractedFields, ExtractionError> {
    let cleaned = strip_code_fence(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|error| ExtractionError::MalformedOutput(error.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ExtractionError::MalformedOutput("expected a top-level object".into()))?;

    let mut fields = ExtractedFields::new();
    for (key, value) in object {
        match value {
            Value::String(text) => fields.insert(key, text),
            Value::Number(number) => fields.insert(key, number.to_string()),
            Value::Bool(flag) => fields.insert(key, flag.to_string()),
            // Null means the model had nothing for this key.
            Value::Null => {}
            other => {
                debug!(key, kind = json_kind(other), "skipping non-scalar extraction value");
            }
        }
    }
    Ok(fields)
}

/// Models keep wrapping JSON in markdown fences despite the prompt.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
