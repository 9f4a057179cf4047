//! Integration tests for MCP protocol handling.
//!
//! These tests drive a full server session from an in-memory transport,
//! covering the lifecycle, tool listing, dispatch and error replies.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use tableau_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use tableau_mcp::mcp::server::ServerState;
use tableau_mcp::mcp::{McpServer, ToolRouter, Transport};
use tableau_mcp::tableau::{
    ConversionSummary, DatasetBackend, DatasetCheck, DatasetEntry, DatasetListing,
    PublishedDataset, TableauError, TableauResult,
};

// =============================================================================
// Mock backend
// =============================================================================

#[derive(Default)]
struct MockBackend {
    calls: AtomicUsize,
}

impl MockBackend {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatasetBackend for MockBackend {
    async fn convert_excel_to_hyper(
        &self,
        excel_file_path: &str,
        hyper_file_path: Option<&str>,
    ) -> TableauResult<ConversionSummary> {
        self.hit();
        if excel_file_path == "missing" {
            return Err(TableauError::FileNotFound {
                tried: vec![PathBuf::from("/downloads/missing.xlsx")],
            });
        }
        Ok(ConversionSummary {
            input_file: PathBuf::from("/downloads").join(excel_file_path),
            output_file: PathBuf::from(hyper_file_path.unwrap_or("/downloads/sales.hyper")),
            rows: 12,
            columns: 3,
            column_names: vec!["Region".into(), "Units".into(), "Price".into()],
        })
    }

    async fn convert_csv_to_hyper(
        &self,
        csv_file_path: &str,
        _hyper_file_path: Option<&str>,
    ) -> TableauResult<ConversionSummary> {
        self.hit();
        Err(TableauError::file_not_found(csv_file_path))
    }

    async fn upload_dataset(
        &self,
        file_path: &str,
        project: &str,
    ) -> TableauResult<PublishedDataset> {
        self.hit();
        Ok(PublishedDataset {
            name: "sales".into(),
            id: "ds-1".into(),
            project_id: "p-1".into(),
            project: project.into(),
            file_path: PathBuf::from(file_path),
            conversion: None,
        })
    }

    async fn check_dataset(&self, dataset_name: &str, project: &str) -> TableauResult<DatasetCheck> {
        self.hit();
        Ok(DatasetCheck {
            exists: true,
            name: dataset_name.into(),
            id: Some("ds-1".into()),
            project_id: Some("p-1".into()),
            project: project.into(),
        })
    }

    async fn list_datasets(&self, project: &str) -> TableauResult<DatasetListing> {
        self.hit();
        Ok(DatasetListing {
            project: project.into(),
            count: 1,
            datasets: vec![DatasetEntry {
                name: "sales".into(),
                id: "ds-1".into(),
                project_id: "p-1".into(),
            }],
        })
    }
}

// =============================================================================
// Session helpers
// =============================================================================

fn request(id: i64, method: &str, params: &Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

fn tool_call(id: i64, name: &str, arguments: &Value) -> String {
    request(id, "tools/call", &json!({"name": name, "arguments": arguments}))
}

fn handshake() -> Vec<String> {
    vec![
        request(
            1,
            "initialize",
            &json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }),
        ),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
    ]
}

/// Runs a session over `lines` and returns every reply, in order.
async fn run_session(lines: &[String], backend: Arc<MockBackend>) -> Vec<Value> {
    let input = lines.join("\n") + "\n";
    let router = ToolRouter::new(backend, "Sales");
    let mut server = McpServer::with_transport(router, Transport::new(input.as_bytes(), Vec::new()));
    server.serve().await.unwrap();
    assert_eq!(server.state(), ServerState::ShuttingDown);

    let output = String::from_utf8(server.into_transport().into_writer()).unwrap();
    output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// Extracts the envelope from a `tools/call` reply.
fn envelope(reply: &Value) -> Value {
    let text = reply["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let line = &handshake()[0];
    let IncomingMessage::Request(req) = parse_message(line).unwrap() else {
        panic!("Expected Request");
    };
    assert_eq!(req.method, "initialize");
    assert_eq!(req.id, RequestId::Number(1));
}

#[test]
fn test_parse_notification() {
    let line = &handshake()[1];
    let msg = parse_message(line).unwrap();
    assert!(matches!(msg, IncomingMessage::Notification(_)));
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
async fn test_tools_list() {
    let mut lines = handshake();
    lines.push(request(2, "tools/list", &json!({})));

    let replies = run_session(&lines, Arc::default()).await;
    assert_eq!(replies.len(), 2);

    let names: Vec<_> = replies[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "convert_excel_to_hyper",
            "upload_dataset",
            "check_dataset",
            "list_datasets",
            "convert_csv_to_hyper"
        ]
    );
    for tool in replies[1]["result"]["tools"].as_array().unwrap() {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

#[tokio::test]
async fn test_convert_success() {
    let backend = Arc::new(MockBackend::default());
    let mut lines = handshake();
    lines.push(tool_call(2, "convert_excel_to_hyper", &json!({"excel_file_path": "sales.xlsx"})));

    let replies = run_session(&lines, backend.clone()).await;
    assert_eq!(replies[1]["id"], 2);
    assert!(replies[1]["result"].get("isError").is_none());
    assert_eq!(
        envelope(&replies[1]),
        json!({
            "status": "success",
            "action": "convert_excel_to_hyper",
            "result": {
                "input_file": "/downloads/sales.xlsx",
                "output_file": "/downloads/sales.hyper",
                "rows": 12,
                "columns": 3,
                "column_names": ["Region", "Units", "Price"]
            }
        })
    );
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_default_project_applied() {
    let mut lines = handshake();
    lines.push(tool_call(2, "check_dataset", &json!({"dataset_name": "sales"})));
    lines.push(tool_call(
        3,
        "check_dataset",
        &json!({"dataset_name": "sales", "tableau_project": "Finance"}),
    ));

    let replies = run_session(&lines, Arc::default()).await;
    assert_eq!(envelope(&replies[1])["result"]["project"], "Sales");
    assert_eq!(envelope(&replies[2])["result"]["project"], "Finance");
}

#[tokio::test]
async fn test_missing_argument() {
    let backend = Arc::new(MockBackend::default());
    let mut lines = handshake();
    lines.push(tool_call(2, "upload_dataset", &json!({"tableau_project": "Sales"})));

    let replies = run_session(&lines, backend.clone()).await;
    assert_eq!(replies[1]["result"]["isError"], true);
    assert_eq!(
        envelope(&replies[1]),
        json!({
            "status": "error",
            "action": "upload_dataset",
            "message": "Missing required parameter: file_path"
        })
    );
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_unknown_tool() {
    let mut lines = handshake();
    lines.push(tool_call(2, "publish_workbook", &json!({})));

    let replies = run_session(&lines, Arc::default()).await;
    assert_eq!(envelope(&replies[1])["message"], "Unknown tool: publish_workbook");
}

#[tokio::test]
async fn test_backend_error_reported() {
    let mut lines = handshake();
    lines.push(tool_call(2, "convert_excel_to_hyper", &json!({"excel_file_path": "missing"})));

    let replies = run_session(&lines, Arc::default()).await;
    assert_eq!(replies[1]["result"]["isError"], true);
    assert_eq!(
        envelope(&replies[1])["message"],
        "File not found: /downloads/missing.xlsx"
    );
}

#[tokio::test]
async fn test_malformed_lines_do_not_stop_the_loop() {
    let mut lines = handshake();
    lines.push("this is not json".to_string());
    lines.push(String::new());
    lines.push(r#"{"id": 5, "method": "ping"}"#.to_string());
    lines.push(request(6, "ping", &json!({})));

    let replies = run_session(&lines, Arc::default()).await;
    assert_eq!(replies.len(), 4);
    assert_eq!(replies[1]["error"]["code"], -32700);
    assert_eq!(replies[2]["error"]["code"], -32600);
    assert_eq!(replies[2]["id"], 5);
    assert_eq!(replies[3]["id"], 6);
    assert_eq!(replies[3]["result"], json!({}));
}

#[tokio::test]
async fn test_responses_follow_request_order() {
    let mut lines = handshake();
    for id in 2..7 {
        lines.push(tool_call(id, "list_datasets", &json!({})));
    }

    let replies = run_session(&lines, Arc::default()).await;
    let ids: Vec<_> = replies.iter().map(|reply| reply["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
}
