//! Writing tables to Tableau Hyper extract files.
//!
//! `.hyper` files are owned by Tableau's `hyperd` database server. This
//! module starts a private `hyperd` process per conversion, talks to it over
//! its PostgreSQL-compatible wire protocol, and lets `hyperd` produce the
//! file. Only the simple-query protocol is used; every value is inlined as an
//! escaped SQL literal.
//!
//! Tables are always written as `"Extract"."Extract"`, the layout Tableau
//! Desktop itself uses for extracts.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, Executor, Row};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::tableau::error::{TableauError, TableauResult};
use crate::tableau::table::{Cell, ColumnType, Table};

/// Schema and table name of the extract table.
pub const EXTRACT_TABLE: &str = "Extract";

/// Alias the target database is attached under.
const DATABASE_ALIAS: &str = "extract_db";

/// User `hyperd` accepts without a password.
const HYPERD_USER: &str = "tableau_internal_user";

/// Rows per `INSERT` statement.
const INSERT_BATCH_ROWS: usize = 500;

/// How long to wait for `hyperd` to accept connections.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between connection attempts during startup.
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Destination for converted tables.
#[async_trait]
pub trait ExtractWriter: Send + Sync {
    /// Writes `table` to `path` as the extract table, replacing any existing
    /// file.
    async fn write_extract(&self, table: &Table, path: &Path) -> TableauResult<()>;
}

/// Row and column count of an extract table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractShape {
    /// Number of rows.
    pub rows: u64,
    /// Number of columns.
    pub columns: usize,
}

/// Writes extracts through a private `hyperd` process.
#[derive(Debug, Clone)]
pub struct HyperdWriter {
    executable: PathBuf,
}

impl HyperdWriter {
    /// Creates a writer that launches the given `hyperd` executable.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Reads back the shape of the extract table in an existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if `hyperd` cannot be started or the file has no
    /// extract table.
    pub async fn describe_extract(&self, path: &Path) -> TableauResult<ExtractShape> {
        let mut session = HyperSession::start(&self.executable, path).await?;
        let shape = session.describe(path).await;
        session.shutdown().await;
        shape
    }
}

#[async_trait]
impl ExtractWriter for HyperdWriter {
    async fn write_extract(&self, table: &Table, path: &Path) -> TableauResult<()> {
        // The target is only replaced once hyperd has finished the new file
        let staging = staging_path(path);
        if let Err(e) = self.write_staged(table, path, &staging).await {
            if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %staging.display(), error = %cleanup, "Failed to remove partial extract");
                }
            }
            return Err(e);
        }

        tokio::fs::rename(&staging, path).await.map_err(|e| {
            TableauError::conversion(path, format!("cannot replace file: {e}"))
        })?;

        info!(
            path = %path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "Wrote Hyper extract"
        );
        Ok(())
    }
}

impl HyperdWriter {
    async fn write_staged(&self, table: &Table, path: &Path, staging: &Path) -> TableauResult<()> {
        let mut session = HyperSession::start(&self.executable, path).await?;
        let result = session.write(table, staging).await;
        session.shutdown().await;
        result
    }
}

/// Sibling of `path` that a new extract is written to before it replaces
/// `path`.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "extract.hyper".into(), |name| name.to_string_lossy());
    path.with_file_name(format!("{name}.tmp-{}", uuid::Uuid::new_v4().simple()))
}

/// A running `hyperd` child plus one connection to it.
struct HyperSession {
    child: Child,
    connection: PgConnection,
}

impl HyperSession {
    async fn start(executable: &Path, target: &Path) -> TableauResult<Self> {
        let port = free_port().map_err(|e| {
            TableauError::conversion(target, format!("no free local port for hyperd: {e}"))
        })?;

        debug!(executable = %executable.display(), port, "Starting hyperd");
        let mut child = Command::new(executable)
            .arg("run")
            .arg("--skip-license")
            .arg("--no-password")
            .arg(format!("--listen-connection=tab.tcp://127.0.0.1:{port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TableauError::conversion(
                    target,
                    format!("cannot start hyperd at {}: {e}", executable.display()),
                )
            })?;

        let options = PgConnectOptions::new()
            .host("127.0.0.1")
            .port(port)
            .username(HYPERD_USER)
            .extra_float_digits(None)
            .statement_cache_capacity(0);

        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
        let connection = loop {
            match options.connect().await {
                Ok(connection) => break connection,
                Err(e) => {
                    if let Ok(Some(status)) = child.try_wait() {
                        return Err(TableauError::conversion(
                            target,
                            format!("hyperd exited during startup ({status})"),
                        ));
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(TableauError::conversion(
                            target,
                            format!("hyperd did not accept connections: {e}"),
                        ));
                    }
                    tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
                }
            }
        };

        Ok(Self { child, connection })
    }

    async fn execute(&mut self, sql: &str, target: &Path) -> TableauResult<()> {
        (&mut self.connection)
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| TableauError::conversion(target, format!("hyperd rejected SQL: {e}")))?;
        Ok(())
    }

    async fn write(&mut self, table: &Table, path: &Path) -> TableauResult<()> {
        let database = string_literal(&path.to_string_lossy());
        let alias = quote_identifier(DATABASE_ALIAS);

        self.execute(&format!("CREATE DATABASE {database}"), path)
            .await?;
        self.execute(&format!("ATTACH DATABASE {database} AS {alias}"), path)
            .await?;
        self.execute(
            &format!(
                "CREATE SCHEMA {alias}.{}",
                quote_identifier(EXTRACT_TABLE)
            ),
            path,
        )
        .await?;
        self.execute(&create_table_sql(table), path).await?;
        for statement in insert_statements(table) {
            self.execute(&statement, path).await?;
        }
        self.execute(&format!("DETACH DATABASE {alias}"), path)
            .await
    }

    async fn describe(&mut self, path: &Path) -> TableauResult<ExtractShape> {
        let database = string_literal(&path.to_string_lossy());
        let alias = quote_identifier(DATABASE_ALIAS);
        let table = qualified_table_name();

        self.execute(&format!("ATTACH DATABASE {database} AS {alias}"), path)
            .await?;

        let count_row = (&mut self.connection)
            .fetch_one(sqlx::raw_sql(&format!("SELECT COUNT(*) FROM {table}")))
            .await
            .map_err(|e| TableauError::conversion(path, format!("cannot count rows: {e}")))?;
        let rows: i64 = count_row
            .try_get(0)
            .map_err(|e| TableauError::conversion(path, format!("cannot decode row count: {e}")))?;

        // `RawSql::fetch_optional` in sqlx 0.8 returns a bare row; go through
        // `Executor` to get the `Option`
        let columns = (&mut self.connection)
            .fetch_optional(sqlx::raw_sql(&format!("SELECT * FROM {table} LIMIT 1")))
            .await
            .map_err(|e| TableauError::conversion(path, format!("cannot read columns: {e}")))?
            .map_or(0, |row| row.columns().len());

        self.execute(&format!("DETACH DATABASE {alias}"), path)
            .await?;

        Ok(ExtractShape {
            rows: u64::try_from(rows).unwrap_or_default(),
            columns,
        })
    }

    async fn shutdown(mut self) {
        if let Err(e) = self.connection.close().await {
            debug!(error = %e, "Error closing hyperd connection");
        }
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to stop hyperd");
        }
    }
}

fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn qualified_table_name() -> String {
    format!(
        "{}.{}.{}",
        quote_identifier(DATABASE_ALIAS),
        quote_identifier(EXTRACT_TABLE),
        quote_identifier(EXTRACT_TABLE)
    )
}

/// Quotes an SQL identifier, doubling embedded quotes.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes an SQL string literal, doubling embedded quotes.
fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

const fn sql_type(kind: ColumnType) -> &'static str {
    match kind {
        ColumnType::BigInt => "BIGINT",
        ColumnType::Double => "DOUBLE PRECISION",
        ColumnType::Bool => "BOOLEAN",
        ColumnType::Timestamp => "TIMESTAMP",
        ColumnType::Text => "TEXT",
    }
}

fn create_table_sql(table: &Table) -> String {
    let columns = table
        .columns
        .iter()
        .map(|column| format!("{} {}", quote_identifier(&column.name), sql_type(column.kind)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({columns})", qualified_table_name())
}

fn insert_statements(table: &Table) -> Vec<String> {
    let target = qualified_table_name();
    table
        .rows
        .chunks(INSERT_BATCH_ROWS)
        .map(|chunk| {
            let values = chunk
                .iter()
                .map(|row| {
                    let cells = row
                        .iter()
                        .zip(&table.columns)
                        .map(|(cell, column)| cell_literal(cell, column.kind))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({cells})")
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("INSERT INTO {target} VALUES {values}")
        })
        .collect()
}

fn cell_literal(cell: &Cell, kind: ColumnType) -> String {
    match (cell, kind) {
        (Cell::Null, _) => "NULL".to_string(),
        (Cell::Int(v), ColumnType::BigInt | ColumnType::Double) => v.to_string(),
        (Cell::Float(v), ColumnType::Double) if v.is_finite() => v.to_string(),
        (Cell::Float(v), ColumnType::Double) => {
            let special = if v.is_nan() {
                "NaN"
            } else if v.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            format!("CAST('{special}' AS DOUBLE PRECISION)")
        }
        (Cell::Bool(v), ColumnType::Bool) => String::from(if *v { "TRUE" } else { "FALSE" }),
        (Cell::DateTime(v), ColumnType::Timestamp) => {
            format!("TIMESTAMP '{}'", v.format("%Y-%m-%d %H:%M:%S%.f"))
        }
        (other, _) => other
            .to_text()
            .map_or_else(|| "NULL".to_string(), |text| string_literal(&text)),
    }
}
