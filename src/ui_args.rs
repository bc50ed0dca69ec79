//! Startup arguments exchanged with the feedback UI process
//!
//! Free text is base64-encoded so that prompts beginning with `-`, or
//! containing quotes and newlines, survive argument parsing untouched. The
//! option list travels as a single JSON array argument (empty string when
//! absent). Every value is a discrete argv entry; no shell is involved.
//!
//! ```text
//! <ui> --prompt <b64> --default-prompt <b64> --predefined-options <json> --output-file <path>
//! ```
//!
//! Both directions live here: the invoker calls [`UiLaunchArgs::to_args`],
//! a UI program parses [`RawUiArgs`] and calls [`UiLaunchArgs::decode`].

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::Parser;
use thiserror::Error;
use tracing::warn;

use crate::feedback::{FeedbackRequest, FeedbackResponse};

/// Prompt shown when the UI is started without `--prompt`
pub const FALLBACK_PROMPT: &str = "I have completed the modifications according to your request.";

pub const ARG_PROMPT: &str = "--prompt";
pub const ARG_DEFAULT_PROMPT: &str = "--default-prompt";
pub const ARG_PREDEFINED_OPTIONS: &str = "--predefined-options";
pub const ARG_OUTPUT_FILE: &str = "--output-file";

#[derive(Error, Debug)]
pub enum UiArgsError {
    #[error("argument {field} is not valid base64: {source}")]
    InvalidBase64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("argument {field} is not valid UTF-8 after decoding: {source}")]
    InvalidUtf8 {
        field: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Encoded form of a request, ready to become argv entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiLaunchArgs {
    pub prompt: String,
    pub default_prompt: String,
    pub predefined_options: String,
    pub output_file: PathBuf,
}

/// Command line as seen by the UI process.
#[derive(Debug, Clone, Parser)]
#[command(name = "feedback-prompt", about = "Run feedback UI")]
pub struct RawUiArgs {
    /// Base64 prompt message to display to user
    #[arg(long)]
    pub prompt: Option<String>,
    /// Base64 reusable instruction text shown under the prompt
    #[arg(long, default_value = "")]
    pub default_prompt: String,
    /// JSON-encoded predefined options list
    #[arg(long, default_value = "")]
    pub predefined_options: String,
    /// JSON file path to save feedback results
    #[arg(long)]
    pub output_file: Option<PathBuf>,
}

/// A request reconstructed on the UI side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedUiRequest {
    pub request: FeedbackRequest,
    pub output_file: Option<PathBuf>,
}

impl UiLaunchArgs {
    pub fn from_request(request: &FeedbackRequest, output_file: &Path) -> Self {
        let predefined_options = match &request.predefined_options {
            Some(options) => serde_json::to_string(options).unwrap_or_default(),
            None => String::new(),
        };

        Self {
            prompt: encode_text(&request.message),
            default_prompt: encode_text(request.default_prompt.as_deref().unwrap_or("")),
            predefined_options,
            output_file: output_file.to_path_buf(),
        }
    }

    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            ARG_PROMPT.into(),
            self.prompt.clone().into(),
            ARG_DEFAULT_PROMPT.into(),
            self.default_prompt.clone().into(),
            ARG_PREDEFINED_OPTIONS.into(),
            self.predefined_options.clone().into(),
            ARG_OUTPUT_FILE.into(),
            self.output_file.clone().into_os_string(),
        ]
    }

    /// Rebuild the request from the UI's parsed command line.
    pub fn decode(raw: RawUiArgs) -> Result<DecodedUiRequest, UiArgsError> {
        let message = match raw.prompt.as_deref() {
            Some(encoded) => decode_text("--prompt", encoded)?,
            None => FALLBACK_PROMPT.to_string(),
        };

        let default_prompt = decode_text("--default-prompt", &raw.default_prompt)?;
        let default_prompt = (!default_prompt.is_empty()).then_some(default_prompt);

        Ok(DecodedUiRequest {
            request: FeedbackRequest {
                message,
                predefined_options: decode_options(&raw.predefined_options),
                default_prompt,
            },
            output_file: raw.output_file,
        })
    }
}

pub fn encode_text(text: &str) -> String {
    BASE64.encode(text.as_bytes())
}

pub fn decode_text(field: &'static str, encoded: &str) -> Result<String, UiArgsError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|source| UiArgsError::InvalidBase64 { field, source })?;
    String::from_utf8(bytes).map_err(|source| UiArgsError::InvalidUtf8 { field, source })
}

/// Options that fail to parse are dropped with a warning rather than failing the UI.
fn decode_options(encoded: &str) -> Option<Vec<String>> {
    if encoded.is_empty() {
        return None;
    }
    match serde_json::from_str::<Vec<String>>(encoded) {
        Ok(options) => Some(options),
        Err(e) => {
            warn!(error = %e, "predefined options are not a JSON list of strings, ignoring");
            None
        }
    }
}

/// Join the selected options and the typed reply the way the dialog reports them.
pub fn compose_feedback(selected_options: &[String], free_text: &str) -> String {
    let mut parts = Vec::with_capacity(2);
    if !selected_options.is_empty() {
        parts.push(selected_options.join("; "));
    }
    let free_text = free_text.trim();
    if !free_text.is_empty() {
        parts.push(free_text.to_string());
    }
    parts.join("\n\n")
}

/// Write the result so the waiting parent only ever sees a complete file.
pub fn write_result(path: &Path, response: &FeedbackResponse) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(response)?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, json)?;
    fs::rename(&temp_path, path)
}
