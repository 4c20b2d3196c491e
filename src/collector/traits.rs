//! Abstractions for SQL access to a monitored server.
//!
//! The `ServerConnector`/`ServerConnection` pair is the seam between the
//! collection pipeline and the driver: production builds connect through
//! the ODBC driver manager, tests and odbc-less builds use the in-memory
//! mock. A connection lives for one collection cycle and is released by
//! `Drop` on every exit path, including query failures.

use crate::config::ServerConfig;

/// One scalar cell of a result row. Numeric database types surface as
/// `Number`; anything else as `Text`. Missing and `Null` are tolerated by
/// every consumer, because catalog-view richness varies by OS version.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Number(f64),
    Text(String),
}

impl SqlValue {
    /// Numeric view of the value. Text parses leniently, `Null` is `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SqlValue::Null => None,
            SqlValue::Number(v) => Some(*v),
            SqlValue::Text(t) => t.trim().parse().ok(),
        }
    }

    /// Textual view of the value. Integral numbers render without a
    /// fractional part (`7`, not `7.0`), matching how version fields like
    /// `OS_VERSION` are consumed.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Number(v) => Some(format!("{}", v)),
            SqlValue::Text(t) => Some(t.clone()),
        }
    }
}

/// One result row: an ordered column-name → value mapping.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Builds a row from (column, value) pairs. Mostly used by fixtures.
    pub fn from_pairs(pairs: &[(&str, SqlValue)]) -> Self {
        let mut row = Row::default();
        for (name, value) in pairs {
            row.push(name, value.clone());
        }
        row
    }

    pub fn push(&mut self, column: &str, value: SqlValue) {
        self.columns.push((column.to_string(), value));
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Numeric column lookup; `None` when absent, null, or non-numeric.
    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(SqlValue::as_number)
    }

    /// Textual column lookup; `None` when absent or null.
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(SqlValue::as_text)
    }
}

/// Connection-establishment failure (network or auth handshake).
#[derive(Debug)]
pub struct ConnectError {
    pub message: String,
}

impl ConnectError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connect: {}", self.message)
    }
}

impl std::error::Error for ConnectError {}

/// Query execution failure.
///
/// `Unsupported` is the typed fallback trigger: the server's OS/database
/// version does not know the requested view or parameter (SQLSTATE class
/// 42). Everything else is `Failed` and aborts the cycle for that server.
#[derive(Debug)]
pub enum QueryError {
    Unsupported(String),
    Failed(String),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Unsupported(msg) => write!(f, "unsupported on this version: {}", msg),
            QueryError::Failed(msg) => write!(f, "query failed: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {}

/// Opens connections to monitored servers.
pub trait ServerConnector: Send + Sync {
    type Connection: ServerConnection;

    /// Opens a connection to one server. The handle is released when
    /// dropped; the pipeline never retries a failed open.
    fn open(&self, server: &ServerConfig, readonly: bool)
    -> Result<Self::Connection, ConnectError>;
}

/// One live connection for the duration of a collection cycle.
pub trait ServerConnection {
    /// Executes one statement and materializes the full result set.
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, QueryError>;
}
