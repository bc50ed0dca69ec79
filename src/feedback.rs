//! Feedback request/response data model
//!
//! A `FeedbackRequest` is built fresh for every tool call. The UI process
//! answers with a JSON object that is normalized into a `FeedbackResponse`:
//! every field is always present afterwards, missing keys take their
//! defaults.
//!
//! Result file format (all keys optional):
//! ```json
//! {"interactive_feedback": "Looks good", "images": ["iVBORw0..."], "end_session": false}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{FeedbackError, Result};

/// Input to one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    /// Prompt shown to the human. Absent input is normalized to "".
    #[serde(default)]
    pub message: String,
    /// Choices the human may multi-select, in display order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predefined_options: Option<Vec<String>>,
    /// Reusable instruction template shown alongside the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_prompt: Option<String>,
}

impl FeedbackRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            predefined_options: None,
            default_prompt: None,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.predefined_options = Some(options);
        self
    }

    pub fn with_default_prompt(mut self, default_prompt: impl Into<String>) -> Self {
        self.default_prompt = Some(default_prompt.into());
        self
    }
}

/// One `images` entry as the UI wrote it.
///
/// Anything other than a string is kept so the reply can report it as an
/// undecodable image at its position instead of failing the whole call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageEntry {
    /// Base64 payload
    Encoded(String),
    Unexpected(Value),
}

impl ImageEntry {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(data) => Self::Encoded(data),
            other => Self::Unexpected(other),
        }
    }
}

impl From<&str> for ImageEntry {
    fn from(data: &str) -> Self {
        Self::Encoded(data.to_string())
    }
}

impl From<String> for ImageEntry {
    fn from(data: String) -> Self {
        Self::Encoded(data)
    }
}

/// Output of one invocation, after normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    #[serde(default)]
    pub interactive_feedback: String,
    /// Image payloads in attachment order
    #[serde(default)]
    pub images: Vec<ImageEntry>,
    #[serde(default)]
    pub end_session: bool,
}

impl FeedbackResponse {
    /// The response synthesized when the dialog was closed without submitting.
    pub fn cancelled() -> Self {
        Self::default()
    }

    /// Normalize a parsed result document.
    ///
    /// Only a non-object document is an error. Inside the object, `null`
    /// counts as missing and mistyped fields are coerced:
    /// - `interactive_feedback`: numbers and booleans become their text, arrays
    ///   and objects become ""
    /// - `images`: a lone value is a one-entry list; non-string entries are kept
    ///   as [`ImageEntry::Unexpected`]
    /// - `end_session`: see [`coerce_flag`]
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut object) = value else {
            return Err(FeedbackError::InvalidResponseShape(format!(
                "expected a JSON object, got {}",
                json_type_name(&value)
            )));
        };

        let interactive_feedback = match take_field(&mut object, "interactive_feedback") {
            None => String::new(),
            Some(Value::String(text)) => text,
            Some(scalar @ (Value::Bool(_) | Value::Number(_))) => {
                warn!(found = json_type_name(&scalar), "interactive_feedback is not a string, using its text");
                scalar.to_string()
            }
            Some(other) => {
                warn!(found = json_type_name(&other), "interactive_feedback is not a string, ignoring it");
                String::new()
            }
        };

        let images = match take_field(&mut object, "images") {
            None => Vec::new(),
            Some(Value::Array(entries)) => entries.into_iter().map(ImageEntry::from_value).collect(),
            Some(lone) => {
                warn!(found = json_type_name(&lone), "images is not an array, treating it as one entry");
                vec![ImageEntry::from_value(lone)]
            }
        };

        let end_session = take_field(&mut object, "end_session")
            .map(coerce_flag)
            .unwrap_or(false);

        Ok(Self {
            interactive_feedback,
            images,
            end_session,
        })
    }
}

/// Read a loosely typed `end_session`.
///
/// Booleans as-is, numbers are true when non-zero, strings are true for
/// "true", "yes" or "1" (any case). Arrays and objects are false.
fn coerce_flag(value: Value) -> bool {
    let flag = match &value {
        Value::Bool(flag) => return *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1"
        ),
        _ => false,
    };
    warn!(found = %value, end_session = flag, "end_session is not a boolean, coerced");
    flag
}

fn take_field(object: &mut Map<String, Value>, key: &str) -> Option<Value> {
    object.remove(key).filter(|v| !v.is_null())
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
