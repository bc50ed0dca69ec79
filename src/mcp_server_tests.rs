use super::*;
use crate::config::Config;
use crate::mcp_protocol::error_codes;
use crate::process_manager::ProcessRegistry;
use serde_json::{json, Value};
use std::io::{BufRead, Cursor};

fn serve_lines(invoker: FeedbackInvoker, input: &str) -> (ServeStats, Vec<Value>) {
    let server = StdioServer::new(invoker);
    let writer = Arc::new(ResponseWriter::new(Vec::new()));

    let stats = server
        .serve(Cursor::new(input.to_string()), Arc::clone(&writer))
        .unwrap();

    let writer = Arc::try_unwrap(writer).ok().expect("workers should be joined");
    let output = String::from_utf8(writer.into_inner()).unwrap();
    let responses = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    (stats, responses)
}

fn default_invoker() -> FeedbackInvoker {
    FeedbackInvoker::new(&Config::default()).with_registry(Arc::new(ProcessRegistry::new()))
}

#[test]
fn test_handshake_and_listing() {
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
        "\n",
    );

    let (stats, responses) = serve_lines(default_invoker(), input);

    assert_eq!(stats.messages, 4);
    assert_eq!(stats.tool_calls, 0);
    // The notification gets no reply
    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "Interactive Feedback MCP");
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[1]["result"]["tools"][0]["name"], "interactive_feedback");
    assert_eq!(responses[2], json!({"jsonrpc": "2.0", "id": 3, "result": {}}));
}

#[test]
fn test_parse_error_is_answered_with_null_id() {
    let (_, responses) = serve_lines(default_invoker(), "{not json\n");

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[0]["error"]["code"], error_codes::PARSE_ERROR);
}

#[test]
fn test_unknown_method() {
    let (_, responses) = serve_lines(
        default_invoker(),
        "{\"jsonrpc\":\"2.0\",\"id\":9,\"method\":\"prompts/list\"}\n",
    );
    assert_eq!(responses[0]["error"]["code"], error_codes::METHOD_NOT_FOUND);
}

#[test]
fn test_response_writer_writes_one_line_per_response() {
    let writer = ResponseWriter::new(Vec::new());
    writer
        .send(&JsonRpcResponse::success(json!(1), json!({})))
        .unwrap();
    writer
        .send(&JsonRpcResponse::success(json!(2), json!({"a": "b\nc"})))
        .unwrap();

    let output = String::from_utf8(writer.into_inner()).unwrap();
    assert_eq!(output.lines().count(), 2);
    assert!(output.ends_with('\n'));
}

#[cfg(unix)]
#[test]
fn test_tool_call_answered_from_worker() {
    use crate::config::UiCommandConfig;

    let results = tempfile::TempDir::new().unwrap();
    let config = Config {
        ui_command: Some(UiCommandConfig::new("/bin/sh").with_args([
            "-c",
            r#"sleep 0.2; printf '{"interactive_feedback": "approved"}' > "$8""#,
            "fake-ui",
        ])),
        poll_interval_ms: Some(10),
        ..Default::default()
    };
    let invoker = FeedbackInvoker::new(&config)
        .with_result_dir(results.path())
        .with_registry(Arc::new(ProcessRegistry::new()));

    let input = concat!(
        r#"{"jsonrpc":"2.0","id":"call","method":"tools/call","params":{"name":"interactive_feedback","arguments":{"message":"Merge?"}}}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":"ping","method":"ping"}"#,
        "\n",
    );

    // End of input kills the UI, so feed the lines through a reader that
    // holds the stream open until the dialog has answered.
    let server = StdioServer::new(invoker);
    let writer = Arc::new(ResponseWriter::new(Vec::new()));
    let reader = SlowEof::new(input, std::time::Duration::from_secs(2));
    let stats = server.serve(reader, Arc::clone(&writer)).unwrap();

    assert_eq!(stats.tool_calls, 1);
    let writer = Arc::try_unwrap(writer).ok().expect("workers should be joined");
    let output = String::from_utf8(writer.into_inner()).unwrap();
    let responses: Vec<Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(responses.len(), 2);
    // ping is answered inline while the dialog is still open
    assert_eq!(responses[0]["id"], "ping");
    assert_eq!(responses[1]["id"], "call");
    assert_eq!(
        responses[1]["result"],
        json!({"content": [{"type": "text", "text": "approved"}]})
    );
}

#[cfg(unix)]
#[test]
fn test_eof_kills_open_dialog() {
    use crate::config::UiCommandConfig;

    let results = tempfile::TempDir::new().unwrap();
    let config = Config {
        ui_command: Some(UiCommandConfig::new("/bin/sh").with_args(["-c", "sleep 30", "fake-ui"])),
        poll_interval_ms: Some(10),
        kill_grace_ms: Some(100),
        ..Default::default()
    };
    let invoker = FeedbackInvoker::new(&config)
        .with_result_dir(results.path())
        .with_registry(Arc::new(ProcessRegistry::new()));

    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"interactive_feedback","arguments":{"message":"Hello?"}}}"#,
        "\n",
    );
    let reader = SlowEof::new(input, std::time::Duration::from_millis(300));

    let server = StdioServer::new(invoker);
    let writer = Arc::new(ResponseWriter::new(Vec::new()));
    let start = std::time::Instant::now();
    let stats = server.serve(reader, Arc::clone(&writer)).unwrap();

    assert!(start.elapsed() < std::time::Duration::from_secs(10));
    assert_eq!(stats.killed_processes, 1);

    let writer = Arc::try_unwrap(writer).ok().expect("workers should be joined");
    let output = String::from_utf8(writer.into_inner()).unwrap();
    let response: Value = serde_json::from_str(output.trim()).unwrap();
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("[error] Feedback UI failed:"), "{}", text);
}

/// Yields `data`, then waits `delay` before reporting end of stream.
struct SlowEof {
    data: Cursor<Vec<u8>>,
    delay: std::time::Duration,
    delayed: bool,
}

impl SlowEof {
    fn new(data: &str, delay: std::time::Duration) -> Self {
        Self {
            data: Cursor::new(data.as_bytes().to_vec()),
            delay,
            delayed: false,
        }
    }
}

impl std::io::Read for SlowEof {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        std::io::Read::read(&mut self.data, buf)
    }
}

impl BufRead for SlowEof {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        if self.data.position() as usize >= self.data.get_ref().len() && !self.delayed {
            self.delayed = true;
            std::thread::sleep(self.delay);
        }
        self.data.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.data.consume(amt)
    }
}
