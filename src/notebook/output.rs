//! Normalization of raw cell outputs.
//!
//! Execution engines emit outputs as loosely-typed JSON records
//! (`stream`, `display_data`, `execute_result`, `error`, and whatever newer
//! kernels invent). Callers only ever see two shapes: text or a PNG image.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::join_fragments;

/// MIME type of the only image payload that is forwarded.
pub const PNG_MIME_TYPE: &str = "image/png";

const TEXT_MIME_TYPE: &str = "text/plain";

/// One normalized output of a code cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Output {
    /// Plain text: streams, text results, serialized errors and fallbacks.
    Text { text: String },
    /// Base64-encoded raster image.
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl Output {
    /// Creates a text output.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a PNG image output from a base64 payload.
    #[must_use]
    pub fn png(data: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: PNG_MIME_TYPE.to_string(),
        }
    }

    /// Returns the text payload, if this is a text output.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }

    /// Normalizes one raw output record.
    ///
    /// Total over its input: unknown or malformed records become a text
    /// output holding the record's JSON form.
    #[must_use]
    pub fn from_raw(record: &Value) -> Self {
        let Some(fields) = record.as_object() else {
            return Self::text(record.to_string());
        };

        match fields.get("output_type").and_then(Value::as_str) {
            Some("display_data" | "execute_result") => Self::from_mime_bundle(fields.get("data")),
            Some("stream") => Self::text(
                fields
                    .get("text")
                    .and_then(join_fragments)
                    .unwrap_or_default(),
            ),
            Some("error") => Self::from_error(fields),
            _ => Self::text(record.to_string()),
        }
    }

    fn from_mime_bundle(data: Option<&Value>) -> Self {
        let empty = Map::new();
        let bundle = data.and_then(Value::as_object).unwrap_or(&empty);

        if let Some(png) = bundle.get(PNG_MIME_TYPE).and_then(join_fragments) {
            return Self::png(png);
        }
        if let Some(text) = bundle.get(TEXT_MIME_TYPE).and_then(join_fragments) {
            return Self::text(text);
        }

        match data {
            Some(value) => Self::text(value.to_string()),
            None => Self::text("{}"),
        }
    }

    // Errors travel as a JSON record so the agent can inspect name, value and traceback.
    fn from_error(fields: &Map<String, Value>) -> Self {
        let payload = json!({
            "ename": fields.get("ename").cloned().unwrap_or_else(|| json!("")),
            "evalue": fields.get("evalue").cloned().unwrap_or_else(|| json!("")),
            "traceback": fields.get("traceback").cloned().unwrap_or_else(|| json!([])),
        });
        Self::text(payload.to_string())
    }
}
