//! MCP server lifecycle and request handling.
//!
//! 1. **Initialisation**: `initialize` request, then the
//!    `notifications/initialized` notification
//! 2. **Operation**: `tools/list`, `tools/call` and `ping`
//! 3. **Shutdown**: end of input, SIGINT or SIGTERM (Ctrl+C on Windows)
//!
//! Requests are handled one at a time; each reply is written and flushed
//! before the next line is read.

use std::string::FromUtf8Error;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error, info};

use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::mcp::tools::ToolRouter;
use crate::mcp::transport::{StdioTransport, Transport};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for `initialize`.
    AwaitingInit,
    /// `initialize` answered, waiting for `notifications/initialized`.
    Initialising,
    /// Serving tool calls.
    Running,
    /// Input ended or a signal arrived.
    ShuttingDown,
}

/// Capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool capabilities; the tool list never changes.
    pub tools: ToolCapabilities,
}

/// Tool capabilities.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCapabilities {
    /// Whether the tool list can change during a session.
    pub list_changed: bool,
}

/// Name and version reported to the client.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client name and version from `initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters of `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version the client wants.
    pub protocol_version: String,
    /// Client capabilities (unused).
    #[serde(default)]
    pub capabilities: Value,
    /// Client identification.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(default)]
    pub arguments: Value,
}

/// A content block in a tool call result.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text.
        text: String,
    },
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content blocks.
    pub content: Vec<ToolContent>,
    /// Set when the tool reported an error.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// A single text block.
    #[must_use]
    pub fn text(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error,
        }
    }
}

/// The MCP server.
pub struct McpServer<R = tokio::io::BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    state: ServerState,
    transport: Transport<R, W>,
    router: ToolRouter,
    protocol_version: Option<String>,
}

impl McpServer {
    /// Creates a server on stdin and stdout.
    #[must_use]
    pub fn new(router: ToolRouter) -> Self {
        Self::with_transport(router, StdioTransport::stdio())
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server on an arbitrary transport.
    pub const fn with_transport(router: ToolRouter, transport: Transport<R, W>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport,
            router,
            protocol_version: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Protocol version agreed during initialisation.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Consumes the server, returning its transport.
    pub fn into_transport(self) -> Transport<R, W> {
        self.transport
    }

    /// Serves until end of input or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(unix)]
    pub async fn run(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    break;
                }
                line = self.transport.read_line() => {
                    if !self.handle_input(line?).await? {
                        break;
                    }
                }
            }
        }
        self.state = ServerState::ShuttingDown;
        Ok(())
    }

    /// Serves until end of input or Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(windows)]
    pub async fn run(&mut self) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                }
                line = self.transport.read_line() => {
                    if !self.handle_input(line?).await? {
                        break;
                    }
                }
            }
        }
        self.state = ServerState::ShuttingDown;
        Ok(())
    }

    /// Serves until end of input, ignoring signals.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> std::io::Result<()> {
        loop {
            let line = self.transport.read_line().await?;
            if !self.handle_input(line).await? {
                break;
            }
        }
        self.state = ServerState::ShuttingDown;
        Ok(())
    }

    /// Handles one read result; returns `false` at end of input.
    async fn handle_input(
        &mut self,
        line: Option<Result<String, FromUtf8Error>>,
    ) -> std::io::Result<bool> {
        let line = match line {
            None => {
                info!("Input closed, shutting down");
                return Ok(false);
            }
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                debug!(error = %e, "Rejected line that is not UTF-8");
                self.transport.write_message(&JsonRpcError::parse_error()).await?;
                return Ok(true);
            }
        };
        if !line.trim().is_empty() {
            self.handle_line(&line).await?;
        }
        Ok(true)
    }

    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        match parse_message(line) {
            Ok(IncomingMessage::Request(req)) => self.handle_request(req).await,
            Ok(IncomingMessage::Notification(notif)) => {
                self.handle_notification(&notif);
                Ok(())
            }
            Err(err) => {
                debug!(code = err.error.code, "Rejected malformed message");
                self.transport.write_message(&err).await
            }
        }
    }

    async fn handle_request(&mut self, req: JsonRpcRequest) -> std::io::Result<()> {
        debug!(id = %req.id, method = %req.method, "Handling request");
        let reply = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(JsonRpcResponse::success(req.id.clone(), json!({}))),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match reply {
            Ok(response) => self.transport.write_message(&response).await,
            Err(err) => self.transport.write_message(&err).await,
        }
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" if self.state == ServerState::Initialising => {
                info!("Client initialised");
                self.state = ServerState::Running;
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::new(ErrorCode::InvalidRequest, "Server already initialised"),
            ));
        }

        let params: InitializeParams = req.parse_params("initialize")?;
        info!(
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            requested_version = %params.protocol_version,
            "Initialising session"
        );

        self.protocol_version = Some(MCP_PROTOCOL_VERSION.to_string());
        self.state = ServerState::Initialising;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": ServerCapabilities {
                    tools: ToolCapabilities::default(),
                },
                "serverInfo": ServerInfo::default(),
            }),
        ))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "tools": self.router.list_tools() }),
        ))
    }

    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;
        let params: ToolCallParams = req.parse_params("tool call")?;

        info!(tool = %params.name, "Calling tool");
        let outcome = self.router.dispatch(&params.name, &params.arguments).await;
        let result = ToolCallResult::text(outcome.to_text(), outcome.is_error());

        let value = serde_json::to_value(&result).map_err(|e| {
            error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(req.id.clone(), "Failed to serialise result")
        })?;
        Ok(JsonRpcResponse::success(req.id.clone(), value))
    }

    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state == ServerState::Running {
            Ok(())
        } else {
            Err(JsonRpcError::not_initialised(id.clone()))
        }
    }
}
