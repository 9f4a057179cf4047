//! Model Context Protocol (MCP) server.
//!
//! Exposes the Tableau operations as MCP tools over the stdio transport,
//! using newline-delimited JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        MCP Server                         │
//! │                                                           │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐   │
//! │   │  Transport  │───▶│   Server    │───▶│ ToolRouter  │   │
//! │   │   (stdio)   │    │ (lifecycle) │    │  (dispatch) │   │
//! │   └─────────────┘    └─────────────┘    └──────┬──────┘   │
//! │                                                │          │
//! │                                                ▼          │
//! │                                   ┌────────────────────┐  │
//! │                                   │   DatasetBackend   │  │
//! │                                   └────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use tools::{ToolName, ToolResult, ToolRouter};
pub use transport::{StdioTransport, Transport};
