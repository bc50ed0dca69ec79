//! Interactive Feedback MCP server
//!
//! Speaks MCP over stdio and exposes the `interactive_feedback` tool, which
//! asks a human through the configured feedback UI program.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use interactive_feedback_mcp::config::{self, Config, UiCommandConfig, DEFAULT_UI_PROGRAM};
use interactive_feedback_mcp::invoker::FeedbackInvoker;
use interactive_feedback_mcp::logging;
use interactive_feedback_mcp::mcp_server::StdioServer;

/// MCP server that asks a human for feedback through a dialog.
#[derive(Parser)]
#[command(name = "interactive-feedback-mcp", version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feedback UI program to launch (overrides config and environment).
    #[arg(long)]
    ui_command: Option<String>,

    /// Seconds to wait for the human before giving up.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);
    let mut loaded_config = config::load_config(&config_path);
    loaded_config.apply_env_overrides(|key| std::env::var(key).ok());
    apply_cli_overrides(&mut loaded_config, &cli);

    let _log_guard = logging::init(loaded_config.get_log_dir().as_deref());

    locate_bundled_ui(&mut loaded_config);

    let ui = loaded_config.get_ui_command();
    info!(
        config_path = %config_path.display(),
        ui_program = %ui.program,
        ui_args = ?ui.args,
        timeout_secs = loaded_config.get_timeout().as_secs(),
        "Loaded config"
    );

    let server = StdioServer::new(FeedbackInvoker::new(&loaded_config));
    let stats = server.run().context("MCP server failed")?;

    info!(
        messages = stats.messages,
        tool_calls = stats.tool_calls,
        "Shutting down"
    );
    Ok(())
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(program) = &cli.ui_command {
        let args = config.get_ui_command().args;
        config.ui_command = Some(UiCommandConfig::new(program.clone()).with_args(args));
    }
    if let Some(secs) = cli.timeout_secs {
        config.timeout_secs = Some(secs);
    }
}

/// Fall back to the `feedback-prompt` binary installed next to this one
/// when the default UI is not on PATH.
fn locate_bundled_ui(config: &mut Config) {
    let ui = config.get_ui_command();
    if ui.program != DEFAULT_UI_PROGRAM || which::which(&ui.program).is_ok() {
        return;
    }

    let sibling = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_UI_PROGRAM)))
        .filter(|path| path.is_file());

    match sibling {
        Some(path) => {
            info!(path = %path.display(), "Using bundled feedback UI");
            config.ui_command =
                Some(UiCommandConfig::new(path.to_string_lossy().into_owned()).with_args(ui.args));
        }
        None => warn!(
            program = DEFAULT_UI_PROGRAM,
            "Default feedback UI not found; tool calls will report a launch error"
        ),
    }
}
