//! ODBC-backed connector (feature `odbc`).
//!
//! Connects through the system ODBC driver manager with the IBM i Access
//! ODBC driver. The process-wide ODBC environment is allocated once on
//! first use. Result cells are fetched as text and re-typed leniently:
//! anything that parses as a number becomes `SqlValue::Number`.

use std::sync::OnceLock;

use odbc_api::{ConnectionOptions, Cursor, Environment, ResultSetMetadata};

use crate::collector::traits::{
    ConnectError, QueryError, Row, ServerConnection, ServerConnector, SqlValue,
};
use crate::config::ServerConfig;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment, ConnectError> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| ConnectError::new(e.to_string()))?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// Connects to IBM i servers through the ODBC driver manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct OdbcConnector;

impl OdbcConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Builds the IBM i Access ODBC connection string for one server.
fn connection_string(server: &ServerConfig, readonly: bool) -> String {
    let mut parts = vec![
        "Driver={IBM i Access ODBC Driver}".to_string(),
        format!("System={}", server.host),
        format!("Uid={}", server.user),
        format!("Pwd={}", server.password),
        format!("SSL={}", if server.ssl { 1 } else { 0 }),
    ];
    if !server.database.is_empty() {
        parts.push(format!("Database={}", server.database));
    }
    if readonly {
        // IBM i Access driver keyword: 2 = read-only connection.
        parts.push("ConnectionType=2".to_string());
    }
    parts.join(";")
}

/// Maps a driver error onto the typed two-tier query taxonomy: SQLSTATE
/// class 42 (undefined object, unsupported parameter) is the enumerable
/// version-difference case that triggers the fallback tier; everything
/// else aborts the cycle.
fn is_unsupported_state(message: &str) -> bool {
    message.contains("State: 42") || message.contains("SQLSTATE=42") || message.contains("[42")
}

fn classify(error: odbc_api::Error) -> QueryError {
    let message = error.to_string();
    if is_unsupported_state(&message) {
        QueryError::Unsupported(message)
    } else {
        QueryError::Failed(message)
    }
}

impl ServerConnector for OdbcConnector {
    type Connection = OdbcConnection;

    fn open(
        &self,
        server: &ServerConfig,
        readonly: bool,
    ) -> Result<OdbcConnection, ConnectError> {
        let conn = environment()?
            .connect_with_connection_string(
                &connection_string(server, readonly),
                ConnectionOptions::default(),
            )
            .map_err(|e| ConnectError::new(e.to_string()))?;
        Ok(OdbcConnection { conn })
    }
}

/// One open ODBC connection; disconnected when dropped.
pub struct OdbcConnection {
    conn: odbc_api::Connection<'static>,
}

impl ServerConnection for OdbcConnection {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, QueryError> {
        let Some(mut cursor) = self.conn.execute(sql, ()).map_err(classify)? else {
            return Ok(Vec::new());
        };
        let names: Vec<String> = cursor
            .column_names()
            .map_err(classify)?
            .collect::<Result<_, _>>()
            .map_err(classify)?;

        let mut rows = Vec::new();
        let mut buffer = Vec::new();
        while let Some(mut cursor_row) = cursor.next_row().map_err(classify)? {
            let mut row = Row::default();
            for (index, name) in names.iter().enumerate() {
                buffer.clear();
                let present = cursor_row
                    .get_text((index + 1) as u16, &mut buffer)
                    .map_err(|e| QueryError::Failed(e.to_string()))?;
                let value = if !present {
                    SqlValue::Null
                } else {
                    let text = String::from_utf8_lossy(&buffer).trim().to_string();
                    match text.parse::<f64>() {
                        Ok(number) => SqlValue::Number(number),
                        Err(_) => SqlValue::Text(text),
                    }
                };
                row.push(name, value);
            }
            rows.push(row);
        }
        Ok(rows)
    }
}
