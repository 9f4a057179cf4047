//! Tableau Server access and Hyper conversion.
//!
//! # Layers
//!
//! - [`paths`] resolves user-supplied file names against the default
//!   directory and fills in missing extensions
//! - [`reader`] turns workbooks and CSV files into a [`Table`]
//! - [`hyper`] writes a [`Table`] to a `.hyper` file through `hyperd`
//! - [`convert`] ties the three together
//! - [`client`] and [`datasources`] talk to the Tableau REST API
//! - [`backend`] is what the MCP tool router calls

pub mod backend;
pub mod client;
pub mod convert;
pub mod datasources;
pub mod error;
pub mod hyper;
pub mod paths;
pub mod reader;
pub mod table;

pub use backend::{DatasetBackend, TableauBackend};
pub use client::{Session, TableauClient};
pub use convert::{ConversionSummary, Converter};
pub use datasources::{DatasetCheck, DatasetEntry, DatasetListing, PublishedDataset};
pub use error::{TableauError, TableauResult};
pub use hyper::{ExtractWriter, HyperdWriter};
pub use table::Table;
