//! Provider-agnostic text extraction from one parsed upstream JSON chunk.
//!
//! Upstreams disagree on chunk shape, so this is an ordered list of shape
//! extractors over an untyped [`Value`] rather than a shared schema. Within
//! one shape, alternatives follow "first present and non-null" semantics: a
//! present-but-empty field stops that shape instead of falling through to
//! its next alternative.

use serde_json::Value;

type ShapeFn = fn(&Value) -> Option<String>;

const SHAPES: [ShapeFn; 5] = [
    choices_delta,
    content_block_delta,
    bare_text,
    candidate_parts,
    generation,
];

/// Extract the incremental text carried by `chunk`, or `""` if no shape matches.
#[must_use]
pub fn pick_text(chunk: &Value) -> String {
    SHAPES
        .iter()
        .find_map(|shape| shape(chunk).filter(|text| !text.is_empty()))
        .unwrap_or_default()
}

/// First of `candidates` that is present and not `null`.
#[inline]
fn first_present<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Option<&'a Value> {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.is_null())
}

#[inline]
fn as_text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_owned)
}

/// `choices[0].delta.content` / `.message.content` / `.text` (OpenAI, Mistral).
fn choices_delta(chunk: &Value) -> Option<String> {
    let choice = chunk.get("choices")?.get(0)?;
    as_text(first_present([
        choice.get("delta").and_then(|d| d.get("content")),
        choice.get("message").and_then(|m| m.get("content")),
        choice.get("text"),
    ]))
}

/// `delta.text` / `content_block.text` (Anthropic content block events).
fn content_block_delta(chunk: &Value) -> Option<String> {
    as_text(first_present([
        chunk.get("delta").and_then(|d| d.get("text")),
        chunk.get("content_block").and_then(|b| b.get("text")),
    ]))
}

/// Bare `text` (Cohere text-generation events).
fn bare_text(chunk: &Value) -> Option<String> {
    as_text(chunk.get("text"))
}

/// `candidates[0].content.parts[].text`, concatenated in order (Gemini).
fn candidate_parts(chunk: &Value) -> Option<String> {
    let parts = chunk
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect(),
    )
}

/// `generation` / `output_text` (Bedrock Meta models).
fn generation(chunk: &Value) -> Option<String> {
    as_text(first_present([chunk.get("generation"), chunk.get("output_text")]))
}
