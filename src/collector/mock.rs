//! In-memory mock connector for testing collectors without a real server.
//!
//! `MockConnector` simulates a fleet of IBM i servers keyed by name,
//! allowing tests (and builds without the `odbc` feature) to exercise the
//! full collection pipeline: configured result sets, unsupported-view
//! rejections, query failures, unreachable servers, and connection
//! open/release accounting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::collector::ibmi::queries;
use crate::collector::traits::{
    ConnectError, QueryError, Row, ServerConnection, ServerConnector, SqlValue,
};
use crate::config::ServerConfig;

#[derive(Clone)]
enum QueryOutcome {
    Rows(Vec<Row>),
    Unsupported,
    Fail(String),
}

/// Scripted query results for one mock server.
///
/// Statements are keyed by their exact SQL text; the pipeline issues only
/// the fixed statements from `collector::ibmi::queries`, so fixtures use
/// those constants as keys. A statement with no scripted outcome behaves
/// like a view the server's OS version does not know (`Unsupported`).
#[derive(Clone, Default)]
pub struct MockServer {
    results: HashMap<String, QueryOutcome>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a multi-row result for `sql`.
    pub fn with_rows(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.results.insert(sql.to_string(), QueryOutcome::Rows(rows));
        self
    }

    /// Scripts a single-row result for `sql`.
    pub fn with_row(self, sql: &str, row: Row) -> Self {
        self.with_rows(sql, vec![row])
    }

    /// Scripts the unsupported-feature rejection for `sql`.
    pub fn with_unsupported(mut self, sql: &str) -> Self {
        self.results
            .insert(sql.to_string(), QueryOutcome::Unsupported);
        self
    }

    /// Scripts a hard query failure for `sql`.
    pub fn with_failure(mut self, sql: &str, message: &str) -> Self {
        self.results
            .insert(sql.to_string(), QueryOutcome::Fail(message.to_string()));
        self
    }

    /// A fully populated current-version server: every catalog view the
    /// pipeline reads answers with representative data.
    pub fn healthy() -> Self {
        Self::new()
            .with_row(
                queries::ENV_SYS_INFO,
                Row::from_pairs(&[
                    ("TOTAL_MEMORY", SqlValue::Number(8192.0)),
                    ("OS_VERSION", SqlValue::Number(7.0)),
                    ("OS_RELEASE", SqlValue::Number(4.0)),
                    ("HOST_NAME", SqlValue::Text("DEMO1".to_string())),
                ]),
            )
            .with_row(
                queries::OS_VERSION_DATA_AREA,
                Row::from_pairs(&[(
                    "DATA_AREA_VALUE",
                    SqlValue::Text("V7R4M0 2924".to_string()),
                )]),
            )
            .with_row(
                queries::SYSTEM_STATUS.preferred,
                Row::from_pairs(&[
                    ("MAXIMUM_JOBS_IN_SYSTEM", SqlValue::Number(163520.0)),
                    ("TOTAL_JOBS_IN_SYSTEM", SqlValue::Number(1207.0)),
                    ("ACTIVE_JOBS_IN_SYSTEM", SqlValue::Number(309.0)),
                    ("BATCH_RUNNING", SqlValue::Number(12.0)),
                    ("ACTIVE_THREADS_IN_SYSTEM", SqlValue::Number(2480.0)),
                    ("MAIN_STORAGE_SIZE", SqlValue::Number(8388608.0)),
                    ("SYSTEM_ASP_STORAGE", SqlValue::Number(1_700_000.0)),
                    ("TOTAL_AUXILIARY_STORAGE", SqlValue::Number(1_800_000.0)),
                    ("SYSTEM_ASP_USED", SqlValue::Number(42.0)),
                    ("CURRENT_TEMPORARY_STORAGE", SqlValue::Number(9000.0)),
                    ("PERMANENT_ADDRESS_RATE", SqlValue::Number(1.2)),
                    ("TEMPORARY_ADDRESS_RATE", SqlValue::Number(3.4)),
                    // Always 0 on current versions; SYSTEM_ACTIVITY_INFO
                    // carries the real figure.
                    ("AVERAGE_CPU_RATE", SqlValue::Number(0.0)),
                    ("AVERAGE_CPU_UTILIZATION", SqlValue::Number(0.0)),
                ]),
            )
            .with_row(
                queries::SYSTEM_ACTIVITY_INFO,
                Row::from_pairs(&[
                    ("AVERAGE_CPU_RATE", SqlValue::Number(97.0)),
                    ("AVERAGE_CPU_UTILIZATION", SqlValue::Number(35.5)),
                ]),
            )
            .with_row(
                queries::REMOTE_CONNECTIONS,
                Row::from_pairs(&[("REMOTE_CONNECTIONS", SqlValue::Number(17.0))]),
            )
            .with_rows(
                queries::SUBSYSTEM_INFO,
                vec![
                    Row::from_pairs(&[
                        ("SUBSYSTEM_DESCRIPTION", SqlValue::Text("QBATCH".to_string())),
                        ("STATUS", SqlValue::Text("ACTIVE".to_string())),
                        ("CURRENT_ACTIVE_JOBS", SqlValue::Number(12.0)),
                    ]),
                    Row::from_pairs(&[
                        ("SUBSYSTEM_DESCRIPTION", SqlValue::Text("QINTER".to_string())),
                        ("STATUS", SqlValue::Text("INACTIVE".to_string())),
                        ("CURRENT_ACTIVE_JOBS", SqlValue::Number(0.0)),
                    ]),
                ],
            )
            .with_rows(
                queries::HTTP_SERVER_INFO,
                vec![Row::from_pairs(&[
                    ("SERVER_NAME", SqlValue::Text("ADMIN".to_string())),
                    ("HTTP_FUNCTION", SqlValue::Text("*ADMIN".to_string())),
                    ("SERVER_NORMAL_CONNECTIONS", SqlValue::Number(5.0)),
                    ("SERVER_SSL_CONNECTIONS", SqlValue::Number(2.0)),
                    ("REQUESTS", SqlValue::Number(118.0)),
                    ("RESPONSES", SqlValue::Number(117.0)),
                    ("ERROR_RESPONSES", SqlValue::Number(1.0)),
                    ("BYTES_SENT", SqlValue::Number(104200.0)),
                    ("BYTES_RECEIVED", SqlValue::Number(51800.0)),
                ])],
            )
            .with_rows(
                queries::MEMORY_POOL_INFO,
                vec![
                    Row::from_pairs(&[
                        ("POOL_NAME", SqlValue::Text("*MACHINE   ".to_string())),
                        ("CURRENT_SIZE", SqlValue::Number(1500.0)),
                        ("RESERVED_SIZE", SqlValue::Number(310.0)),
                        ("CURRENT_THREADS", SqlValue::Number(220.0)),
                    ]),
                    Row::from_pairs(&[
                        ("POOL_NAME", SqlValue::Text("*BASE      ".to_string())),
                        ("CURRENT_SIZE", SqlValue::Number(5200.0)),
                        ("RESERVED_SIZE", SqlValue::Number(0.0)),
                        ("CURRENT_THREADS", SqlValue::Number(1900.0)),
                    ]),
                ],
            )
    }

    /// Like [`MockServer::healthy`] but on a pre-V7R3 OS: the detailed
    /// system-status parameter and the newer views are all rejected.
    pub fn legacy() -> Self {
        let mut server = Self::healthy()
            .with_unsupported(queries::OS_VERSION_DATA_AREA)
            .with_unsupported(queries::SYSTEM_STATUS.preferred)
            .with_unsupported(queries::SYSTEM_ACTIVITY_INFO)
            .with_unsupported(queries::SUBSYSTEM_INFO)
            .with_unsupported(queries::HTTP_SERVER_INFO);
        if let Some(fallback) = queries::SYSTEM_STATUS.fallback {
            server = server.with_row(
                fallback,
                Row::from_pairs(&[
                    ("MAXIMUM_JOBS_IN_SYSTEM", SqlValue::Number(163520.0)),
                    ("TOTAL_JOBS_IN_SYSTEM", SqlValue::Number(812.0)),
                    ("ACTIVE_JOBS_IN_SYSTEM", SqlValue::Number(104.0)),
                    ("SYSTEM_ASP_USED", SqlValue::Number(61.0)),
                    ("AVERAGE_CPU_RATE", SqlValue::Number(88.0)),
                    ("AVERAGE_CPU_UTILIZATION", SqlValue::Number(22.5)),
                ]),
            );
        }
        server
    }
}

/// Connector over a set of scripted servers. A configured server with no
/// scripted counterpart is unreachable.
#[derive(Default)]
pub struct MockConnector {
    servers: HashMap<String, MockServer>,
    executed: Arc<Mutex<Vec<(String, String)>>>,
    open_connections: Arc<AtomicUsize>,
    opened_total: Arc<AtomicUsize>,
    last_readonly: Arc<Mutex<Option<bool>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, name: &str, server: MockServer) -> Self {
        self.servers.insert(name.to_string(), server);
        self
    }

    /// Statements executed against `server`, in order.
    pub fn executed_queries(&self, server: &str) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == server)
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// Connections currently open (not yet dropped).
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Connections opened over the connector's lifetime.
    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }

    /// Readonly flag of the most recent successful open.
    pub fn last_readonly(&self) -> Option<bool> {
        *self.last_readonly.lock().unwrap()
    }
}

impl ServerConnector for MockConnector {
    type Connection = MockConnection;

    fn open(
        &self,
        server: &ServerConfig,
        readonly: bool,
    ) -> Result<MockConnection, ConnectError> {
        let Some(scripted) = self.servers.get(&server.name) else {
            return Err(ConnectError::new(format!(
                "cannot reach {} ({})",
                server.name, server.host
            )));
        };
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        self.open_connections.fetch_add(1, Ordering::SeqCst);
        *self.last_readonly.lock().unwrap() = Some(readonly);
        Ok(MockConnection {
            server: server.name.clone(),
            results: scripted.results.clone(),
            executed: self.executed.clone(),
            open_connections: self.open_connections.clone(),
        })
    }
}

/// One open mock connection; decrements the connector's open-connection
/// count when dropped.
pub struct MockConnection {
    server: String,
    results: HashMap<String, QueryOutcome>,
    executed: Arc<Mutex<Vec<(String, String)>>>,
    open_connections: Arc<AtomicUsize>,
}

impl ServerConnection for MockConnection {
    fn query(&mut self, sql: &str) -> Result<Vec<Row>, QueryError> {
        self.executed
            .lock()
            .unwrap()
            .push((self.server.clone(), sql.to_string()));
        match self.results.get(sql) {
            Some(QueryOutcome::Rows(rows)) => Ok(rows.clone()),
            Some(QueryOutcome::Fail(message)) => Err(QueryError::Failed(message.clone())),
            Some(QueryOutcome::Unsupported) | None => Err(QueryError::Unsupported(format!(
                "[42704] view or parameter not available on this version: {}",
                sql
            ))),
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            host: format!("{}.example.net", name),
            user: "monitor".to_string(),
            password: "secret".to_string(),
            database: String::new(),
            ssl: true,
        }
    }

    #[test]
    fn unknown_server_is_unreachable() {
        let connector = MockConnector::new();
        assert!(connector.open(&config("a"), true).is_err());
        assert_eq!(connector.opened_total(), 0);
    }

    #[test]
    fn connections_are_released_on_drop() {
        let connector = MockConnector::new().with_server("a", MockServer::healthy());
        {
            let _conn = connector.open(&config("a"), true).unwrap();
            assert_eq!(connector.open_connections(), 1);
        }
        assert_eq!(connector.open_connections(), 0);
        assert_eq!(connector.opened_total(), 1);
        assert_eq!(connector.last_readonly(), Some(true));
    }

    #[test]
    fn unscripted_statement_reads_as_unsupported() {
        let connector = MockConnector::new().with_server("a", MockServer::new());
        let mut conn = connector.open(&config("a"), true).unwrap();
        assert!(matches!(
            conn.query("SELECT * FROM QSYS2.SUBSYSTEM_INFO"),
            Err(QueryError::Unsupported(_))
        ));
        assert_eq!(
            connector.executed_queries("a"),
            ["SELECT * FROM QSYS2.SUBSYSTEM_INFO"]
        );
    }
}
