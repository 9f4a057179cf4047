//! tableau-mcp: MCP server bridging AI assistants to Tableau Server
//!
//! This library exposes a small set of tools over the Model Context Protocol
//! that let an AI assistant prepare and publish data to Tableau.
//!
//! # Architecture
//!
//! The server is a thin shell. Every tool call resolves a path, calls an
//! external system, and formats the outcome as JSON:
//!
//! - **Conversion**: Excel workbooks and CSV files become `.hyper` extracts,
//!   written by a local `hyperd` process
//! - **Publishing**: extracts are uploaded to a Tableau project, replacing any
//!   datasource of the same name
//! - **Lookup**: datasources are listed and checked by name within a project
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from the environment
//! - [`error`] — Startup error types
//! - [`mcp`] — MCP protocol implementation and tool router
//! - [`tableau`] — Tableau REST client, conversion and path handling

pub mod config;
pub mod error;
pub mod mcp;
pub mod tableau;
