//! Interactive Feedback MCP - ask a human through a dialog, from an agent.
//!
//! This library provides the pieces behind the `interactive_feedback` MCP
//! tool: launching the feedback UI as a child process, handing the answer
//! back through a result file, and translating it into MCP content items.

pub mod config;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod invoker;
pub mod logging;
pub mod process_manager;
pub mod result_channel;
pub mod ui_args;

// MCP protocol surface
pub mod mcp_protocol;
pub mod mcp_server;
pub mod mcp_tools;

pub use error::{FeedbackError, Result};
pub use feedback::{FeedbackRequest, FeedbackResponse};
pub use invoker::{ContentItem, FeedbackInvoker};
