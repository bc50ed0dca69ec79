//! Terminal feedback UI.
//!
//! The default program launched by the server. It talks to the human on the
//! controlling terminal (never stdin/stdout, which belong to the server) and
//! writes the answer to `--output-file`.
//!
//! Run by hand with:
//! `feedback-prompt --prompt $(printf 'Ready?' | base64) --output-file /tmp/out.json`

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use interactive_feedback_mcp::feedback::{FeedbackRequest, FeedbackResponse};
use interactive_feedback_mcp::ui_args::{compose_feedback, write_result, RawUiArgs, UiLaunchArgs};

#[cfg(unix)]
const TTY_IN: &str = "/dev/tty";
#[cfg(unix)]
const TTY_OUT: &str = "/dev/tty";
#[cfg(windows)]
const TTY_IN: &str = "CONIN$";
#[cfg(windows)]
const TTY_OUT: &str = "CONOUT$";

const END_SESSION_COMMAND: &str = "!end";
const CANCEL_COMMAND: &str = "!cancel";

fn main() -> Result<()> {
    // stderr is captured by the server and shown when we exit non-zero
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let raw = RawUiArgs::parse();
    let decoded = UiLaunchArgs::decode(raw).context("Invalid launch arguments")?;
    let output_file = decoded
        .output_file
        .context("--output-file is required")?;

    let (input, mut output) = match open_terminal() {
        Ok(terminal) => terminal,
        Err(e) => {
            // No one to ask; leaving no result file reads as a cancelled dialog
            warn!(error = %e, "No terminal available, closing without feedback");
            return Ok(());
        }
    };

    match run_dialog(&decoded.request, input, &mut output)? {
        Some(response) => {
            write_result(&output_file, &response)
                .with_context(|| format!("Failed to write {}", output_file.display()))?;
            info!(path = %output_file.display(), "Feedback written");
        }
        None => info!("Dialog cancelled"),
    }
    Ok(())
}

fn open_terminal() -> io::Result<(BufReader<File>, File)> {
    let input = File::open(Path::new(TTY_IN))?;
    let output = OpenOptions::new().write(true).open(Path::new(TTY_OUT))?;
    Ok((BufReader::new(input), output))
}

/// Show the request and collect an answer. `None` means the human cancelled.
fn run_dialog<R: BufRead, W: Write>(
    request: &FeedbackRequest,
    mut input: R,
    output: &mut W,
) -> Result<Option<FeedbackResponse>> {
    writeln!(output)?;
    writeln!(output, "=== Interactive Feedback ===")?;
    writeln!(output, "{}", request.message)?;
    if let Some(default_prompt) = request.default_prompt.as_deref() {
        writeln!(output)?;
        writeln!(output, "{}", default_prompt)?;
    }

    let mut selected = Vec::new();
    if let Some(options) = request.predefined_options.as_deref().filter(|o| !o.is_empty()) {
        writeln!(output)?;
        for (idx, option) in options.iter().enumerate() {
            writeln!(output, "  {}) {}", idx + 1, option)?;
        }
        write!(output, "Select options (e.g. 1,3; empty for none): ")?;
        output.flush()?;

        let mut line = String::new();
        input.read_line(&mut line)?;
        if line.trim() == CANCEL_COMMAND {
            return Ok(None);
        }
        let (picked, rejected) = parse_selection(&line, options);
        if !rejected.is_empty() {
            writeln!(output, "Ignoring: {}", rejected.join(", "))?;
        }
        selected = picked;
    }

    writeln!(output)?;
    writeln!(
        output,
        "Your feedback (finish with an empty line; {} ends the session, {} closes without answering):",
        END_SESSION_COMMAND, CANCEL_COMMAND
    )?;
    output.flush()?;

    let mut end_session = false;
    let mut lines = Vec::new();
    for line in input.lines() {
        let line = line?;
        match line.trim() {
            "" => break,
            END_SESSION_COMMAND => end_session = true,
            CANCEL_COMMAND => return Ok(None),
            _ => lines.push(line),
        }
    }

    Ok(Some(FeedbackResponse {
        interactive_feedback: compose_feedback(&selected, &lines.join("\n")),
        images: Vec::new(),
        end_session,
    }))
}

/// Resolve 1-based option numbers separated by commas or whitespace.
///
/// Returns the chosen options in display order (deduplicated) and the tokens
/// that did not name an option.
fn parse_selection(line: &str, options: &[String]) -> (Vec<String>, Vec<String>) {
    let mut chosen = vec![false; options.len()];
    let mut rejected = Vec::new();

    for token in line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        match token.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => chosen[n - 1] = true,
            _ => rejected.push(token.to_string()),
        }
    }

    let picked = options
        .iter()
        .zip(chosen)
        .filter_map(|(option, on)| on.then(|| option.clone()))
        .collect();
    (picked, rejected)
}
