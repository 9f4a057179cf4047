//! Newline-delimited JSON transport.
//!
//! MCP over stdio sends one UTF-8 JSON message per line: requests on stdin,
//! replies on stdout. stderr is left to logging. The transport is generic
//! over its streams so sessions can be driven from in-memory buffers.

use std::io;
use std::string::FromUtf8Error;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

/// A line-oriented JSON transport over a reader and a writer.
pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

/// The transport used in production: stdin and stdout.
pub type StdioTransport = Transport<BufReader<Stdin>, Stdout>;

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over the given streams.
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next line, without its line terminator.
    ///
    /// Returns `None` at end of input. A line that is not valid UTF-8 comes
    /// back as `Some(Err(_))` so the caller can reject it and keep reading.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<Result<String, FromUtf8Error>>> {
        let mut bytes = Vec::new();
        if self.reader.read_until(b'\n', &mut bytes).await? == 0 {
            return Ok(None);
        }

        while matches!(bytes.last(), Some(b'\n' | b'\r')) {
            bytes.pop();
        }
        Ok(Some(String::from_utf8(bytes)))
    }

    /// Serialises `message` on a single line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message<T: Serialize + Sync>(&mut self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        // Compact serde_json output escapes every newline inside strings
        debug_assert!(!json.contains('\n'));

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Consumes the transport, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}
