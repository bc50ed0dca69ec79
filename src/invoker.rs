//! Feedback invocation: run the UI once and turn its answer into content items.
//!
//! One call to [`FeedbackInvoker::invoke`] walks
//! `open channel -> spawn UI -> wait -> read result -> normalize -> translate`.
//! Every failure along the way is caught here and rendered as a single
//! `[error] Feedback UI failed: ...` text item, so callers always get a
//! non-empty reply and never an error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Serialize, Serializer};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{Config, UiCommandConfig};
use crate::error::{FeedbackError, Result};
use crate::executor::{spawn_ui, WaitOutcome};
use crate::feedback::{json_type_name, FeedbackRequest, FeedbackResponse, ImageEntry};
use crate::logging::{truncate_for_log, MAX_LOGGED_PAYLOAD};
use crate::process_manager::{ProcessRegistry, PROCESS_REGISTRY};
use crate::result_channel::ResultChannel;
use crate::ui_args::UiLaunchArgs;

/// Appended to the reply when the human asks to end the feedback loop.
pub const STOP_SENTENCE: &str =
    "The user has ended the feedback session. Do not call interactive_feedback again in this conversation.";

/// The UI does not report image formats, so every image is declared PNG.
pub const IMAGE_MIME_TYPE: &str = "image/png";

const ERROR_PREFIX: &str = "[error] Feedback UI failed: ";

/// One unit of a tool reply.
///
/// Serializes to the MCP content shapes:
/// `{"type":"text","text":...}` and `{"type":"image","data":<b64>,"mimeType":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        #[serde(serialize_with = "serialize_base64")]
        data: Vec<u8>,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn png(data: Vec<u8>) -> Self {
        Self::Image {
            data,
            mime_type: IMAGE_MIME_TYPE.to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }
}

fn serialize_base64<S: Serializer>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data))
}

/// Launches the feedback UI and translates its answer.
///
/// Holds only resolved settings; every invocation gets its own result
/// channel and child process, so one invoker can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct FeedbackInvoker {
    ui_command: UiCommandConfig,
    timeout: Duration,
    result_poll_timeout: Duration,
    poll_interval: Duration,
    kill_grace: Duration,
    default_prompt: Option<String>,
    result_dir: Option<PathBuf>,
    registry: Arc<ProcessRegistry>,
}

impl FeedbackInvoker {
    pub fn new(config: &Config) -> Self {
        Self {
            ui_command: config.get_ui_command(),
            timeout: config.get_timeout(),
            result_poll_timeout: config.get_result_poll_timeout(),
            poll_interval: config.get_poll_interval(),
            kill_grace: config.get_kill_grace(),
            default_prompt: config.get_default_prompt().map(str::to_string),
            result_dir: None,
            registry: Arc::clone(&PROCESS_REGISTRY),
        }
    }

    /// Override the wall-clock ceiling for the UI process.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Allocate result channels under `dir` instead of the system temp dir.
    pub fn with_result_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.result_dir = Some(dir.into());
        self
    }

    /// Track UI processes in `registry` instead of the global one.
    pub fn with_registry(mut self, registry: Arc<ProcessRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Where this invoker's live UI processes are tracked.
    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn ui_command(&self) -> &UiCommandConfig {
        &self.ui_command
    }

    /// Ask the human and return the reply as content items. Never empty, never fails.
    pub fn invoke(&self, request: &FeedbackRequest) -> Vec<ContentItem> {
        let invocation_id = Uuid::new_v4();
        let span = info_span!("feedback_invocation", invocation_id = %invocation_id);
        let _guard = span.enter();
        let start = Instant::now();

        info!(
            message = %truncate_for_log(&request.message, MAX_LOGGED_PAYLOAD),
            option_count = request.predefined_options.as_ref().map_or(0, Vec::len),
            "Requesting feedback"
        );

        let label = format!("{}:{}", invocation_id, self.ui_command.program);
        let reply = match self.request_feedback(request, &label) {
            Ok(response) => build_reply(response),
            Err(e) => {
                error!(
                    error_kind = e.kind(),
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Feedback invocation failed"
                );
                error_reply(&e)
            }
        };

        info!(
            items = reply.len(),
            images = reply.iter().filter(|item| item.is_image()).count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Feedback invocation finished"
        );
        reply
    }

    /// Run the UI once and return its normalized response.
    ///
    /// A UI that exits 0 without writing a result counts as a cancelled
    /// dialog and yields an empty response.
    pub fn request_feedback(&self, request: &FeedbackRequest, label: &str) -> Result<FeedbackResponse> {
        let channel = match &self.result_dir {
            Some(dir) => ResultChannel::open_in(dir)?,
            None => ResultChannel::open()?,
        }
        .with_poll_interval(self.poll_interval);

        let mut request = request.clone();
        if request.default_prompt.is_none() {
            request.default_prompt = self.default_prompt.clone();
        }
        let launch = UiLaunchArgs::from_request(&request, channel.path());

        let mut session = spawn_ui(
            &self.ui_command,
            &launch,
            label,
            self.kill_grace,
            &self.registry,
        )?;

        let outcome = session
            .wait_with_timeout(self.timeout, self.poll_interval)
            .map_err(FeedbackError::ProcessWait)?;

        match outcome {
            WaitOutcome::TimedOut => {
                warn!(
                    pid = session.pid(),
                    timeout_secs = self.timeout.as_secs(),
                    "Feedback UI exceeded its time budget"
                );
                // Kill before the channel goes away so a late write has nowhere to land
                session.terminate();
                channel.close();
                return Err(FeedbackError::ProcessTimeout {
                    timeout: self.timeout,
                });
            }
            WaitOutcome::Exited(status) if !status.success() => {
                let stderr = session.stderr_contents();
                channel.close();
                return Err(FeedbackError::ProcessFailed {
                    code: status.code().unwrap_or(-1),
                    stderr: if stderr.trim().is_empty() {
                        "Unknown error".to_string()
                    } else {
                        stderr.trim().to_string()
                    },
                });
            }
            WaitOutcome::Exited(_) => {
                debug!(pid = session.pid(), "Feedback UI exited cleanly");
            }
        }

        match channel.read_and_close(self.result_poll_timeout) {
            Ok(value) => FeedbackResponse::from_value(value),
            Err(e) if e.is_cancellation() => {
                info!("Feedback UI closed without a result, treating as cancelled");
                Ok(FeedbackResponse::cancelled())
            }
            Err(e) => Err(e),
        }
    }
}

/// Translate a normalized response into content items.
///
/// Text first (trimmed, then the stop sentence, then one warning per bad
/// image), followed by the decoded images in their original order.
pub fn build_reply(response: FeedbackResponse) -> Vec<ContentItem> {
    let mut text = response.interactive_feedback.trim().to_string();

    if response.end_session {
        append_paragraph(&mut text, STOP_SENTENCE);
    }

    let mut images = Vec::with_capacity(response.images.len());
    for (idx, entry) in response.images.iter().enumerate() {
        match decode_entry(entry) {
            Ok(bytes) => images.push(ContentItem::png(bytes)),
            Err(detail) => {
                warn!(image = idx + 1, error = %detail, "Image failed to decode");
                append_paragraph(
                    &mut text,
                    &format!("[warning] Image {} failed to decode: {}", idx + 1, detail),
                );
            }
        }
    }

    let mut reply = Vec::with_capacity(images.len() + 1);
    if !text.is_empty() {
        reply.push(ContentItem::text(text));
    }
    reply.extend(images);

    if reply.is_empty() {
        reply.push(ContentItem::text(""));
    }
    reply
}

/// The whole reply for a failed invocation.
pub fn error_reply(error: &FeedbackError) -> Vec<ContentItem> {
    vec![ContentItem::text(format!("{}{}", ERROR_PREFIX, error))]
}

fn append_paragraph(text: &mut String, paragraph: &str) {
    if !text.is_empty() {
        text.push_str("\n\n");
    }
    text.push_str(paragraph);
}

fn decode_entry(entry: &ImageEntry) -> std::result::Result<Vec<u8>, String> {
    match entry {
        ImageEntry::Encoded(encoded) => decode_image(encoded).map_err(|e| {
            debug!(payload = %truncate_for_log(encoded, 32), "Undecodable image payload");
            e.to_string()
        }),
        ImageEntry::Unexpected(value) => Err(format!(
            "expected a base64 string, got {}",
            json_type_name(value)
        )),
    }
}

/// Line-wrapped base64 is common from clipboard tools, so whitespace is ignored.
fn decode_image(encoded: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    if encoded.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        BASE64.decode(compact)
    } else {
        BASE64.decode(encoded)
    }
}

#[cfg(test)]
#[path = "invoker_tests.rs"]
mod tests;
