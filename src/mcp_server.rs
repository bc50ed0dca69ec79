//! MCP stdio server
//!
//! Reads newline-delimited JSON-RPC messages from stdin and writes one JSON
//! response per line to stdout. Features:
//! - `tools/call` runs on its own worker thread, so `ping` and friends are
//!   still answered while a feedback dialog is open
//! - Responses go through a single mutex-guarded writer, one line at a time
//! - On end of input every UI process this server started is killed and the
//!   workers are joined

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::invoker::FeedbackInvoker;
use crate::logging::{truncate_for_log, MAX_LOGGED_PAYLOAD};
use crate::mcp_protocol::{self, JsonRpcRequest, JsonRpcResponse, McpMethod};

/// Counters reported when the input stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub messages: usize,
    pub tool_calls: usize,
    pub killed_processes: usize,
}

/// Line-oriented JSON-RPC writer shared by the read loop and workers.
pub struct ResponseWriter<W: Write> {
    inner: Mutex<W>,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Serialize and write one response as a single line, then flush.
    pub fn send(&self, response: &JsonRpcResponse) -> Result<()> {
        let line = serde_json::to_string(response).context("Failed to serialize response")?;
        let mut writer = self.inner.lock();
        writeln!(writer, "{}", line).context("Failed to write response")?;
        writer.flush().context("Failed to flush response")?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

pub struct StdioServer {
    invoker: Arc<FeedbackInvoker>,
}

impl StdioServer {
    pub fn new(invoker: FeedbackInvoker) -> Self {
        Self {
            invoker: Arc::new(invoker),
        }
    }

    /// Serve the process's own stdin/stdout until stdin closes.
    pub fn run(&self) -> Result<ServeStats> {
        let stdin = std::io::stdin();
        let writer = Arc::new(ResponseWriter::new(std::io::stdout()));
        self.serve(stdin.lock(), writer)
    }

    /// Serve `input` until end of stream, answering through `writer`.
    pub fn serve<R, W>(&self, input: R, writer: Arc<ResponseWriter<W>>) -> Result<ServeStats>
    where
        R: BufRead,
        W: Write + Send + 'static,
    {
        info!(event_type = "server_lifecycle", action = "started", "MCP stdio server started");

        let mut stats = ServeStats::default();
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        for line in input.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "Error reading stdin, shutting down");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            stats.messages += 1;
            debug!(message = %truncate_for_log(&line, MAX_LOGGED_PAYLOAD), "Received");

            let request = match mcp_protocol::parse_request(&line) {
                Ok(request) => request,
                Err(response) => {
                    warn!(
                        code = response.error.as_ref().map(|e| e.code),
                        "Rejected malformed message"
                    );
                    send_or_log(&writer, &response);
                    continue;
                }
            };

            if request.is_notification() {
                debug!(method = %request.method, "Notification received");
                continue;
            }

            workers.retain(|worker| !worker.is_finished());

            if McpMethod::from_str(&request.method) == Some(McpMethod::ToolsCall) {
                stats.tool_calls += 1;
                workers.push(self.spawn_tool_call(request, Arc::clone(&writer))?);
            } else {
                let response = mcp_protocol::handle_request(request, &self.invoker);
                send_or_log(&writer, &response);
            }
        }

        info!(
            in_flight = workers.len(),
            "Input closed, stopping feedback UI processes"
        );
        stats.killed_processes = self.invoker.registry().kill_all();

        for worker in workers {
            if worker.join().is_err() {
                error!("Tool call worker panicked");
            }
        }

        info!(
            event_type = "server_lifecycle",
            action = "stopped",
            messages = stats.messages,
            tool_calls = stats.tool_calls,
            killed = stats.killed_processes,
            "MCP stdio server stopped"
        );
        Ok(stats)
    }

    fn spawn_tool_call<W>(
        &self,
        request: JsonRpcRequest,
        writer: Arc<ResponseWriter<W>>,
    ) -> Result<JoinHandle<()>>
    where
        W: Write + Send + 'static,
    {
        let invoker = Arc::clone(&self.invoker);
        let id = request.response_id();
        thread::Builder::new()
            .name("feedback-tool-call".to_string())
            .spawn(move || {
                debug!(id = %id, "Tool call started");
                let response = mcp_protocol::handle_tools_call(request, &invoker);
                send_or_log(&writer, &response);
                debug!(id = %id, "Tool call answered");
            })
            .context("Failed to spawn tool call worker")
    }
}

fn send_or_log<W: Write>(writer: &ResponseWriter<W>, response: &JsonRpcResponse) {
    if let Err(e) = writer.send(response) {
        // The client is gone; nothing else can be done with the answer
        warn!(error = %e, id = %response.id, "Failed to send response");
    }
}

#[cfg(test)]
#[path = "mcp_server_tests.rs"]
mod tests;
