//! IBM i metrics collector.
//!
//! Collects metrics from the IBM i SQL services:
//! - `SYSIBMADM.ENV_SYS_INFO` — environment description (instance-level)
//! - `QSYS2.SYSTEM_STATUS` — jobs, threads, storage (instance-level)
//! - `QSYS2.SYSTEM_ACTIVITY_INFO` — CPU rates (V7R3+)
//! - `QSYS2.NETSTAT_INFO` — established remote connections
//! - `QSYS2.SUBSYSTEM_INFO` — per-subsystem status (V7R3+)
//! - `QSYS2.HTTP_SERVER_INFO` — per-HTTP-server counters (V7R3+)
//! - `QSYS2.MEMORY_POOL_INFO` — per-pool storage and threads
//!
//! ## Per-server cycle
//!
//! Each configured server gets a fresh read-only connection per cycle,
//! released when the cycle ends regardless of outcome. A connection or
//! query failure marks the server's liveness gauge 0 and moves on to the
//! next server; there is no retry and no backoff. Version differences are
//! a two-tier query cascade (see `queries`), not a transient-fault domain.

mod mapping;
mod metrics;
pub(crate) mod queries;

use tracing::{debug, warn};

use crate::collector::CollectError;
use crate::collector::traits::{Row, QueryError, ServerConnection, ServerConnector};
use crate::config::ServerConfig;
use crate::registry::{Registry, RegistryError};

use mapping::ResolvedColumn;
use metrics::IbmiMetrics;

/// Drives the per-server collection cycle and owns the instrument handles.
///
/// Construction registers every metric family and validates the static
/// column mapping tables against the registry, so any wiring defect
/// surfaces at startup.
pub struct IbmiCollector {
    metrics: IbmiMetrics,
    system_columns: Vec<ResolvedColumn>,
    activity_columns: Vec<ResolvedColumn>,
    http_columns: Vec<ResolvedColumn>,
    pool_columns: Vec<ResolvedColumn>,
}

impl IbmiCollector {
    pub fn new(registry: &Registry) -> Result<Self, RegistryError> {
        let metrics = IbmiMetrics::register(registry)?;
        let system_columns = mapping::resolve(registry, mapping::SYSTEM_STATUS_COLUMNS, 1)?;
        let activity_columns = mapping::resolve(registry, mapping::ACTIVITY_COLUMNS, 1)?;
        let http_columns = mapping::resolve(registry, mapping::HTTP_SERVER_COLUMNS, 3)?;
        let pool_columns = mapping::resolve(registry, mapping::MEMORY_POOL_COLUMNS, 2)?;
        Ok(Self {
            metrics,
            system_columns,
            activity_columns,
            http_columns,
            pool_columns,
        })
    }

    /// One sequential pass over all configured servers. Failures are
    /// absorbed per server: liveness goes to 0 and the pass continues.
    pub fn collect_all<C: ServerConnector>(&self, connector: &C, servers: &[ServerConfig]) {
        for server in servers {
            let up = self
                .metrics
                .system_status_up
                .with_label_values(&[&server.name])
                .expect("server label");
            match self.collect_server(connector, server) {
                Ok(()) => up.set(1.0),
                Err(e) => {
                    warn!(server = %server.name, error = %e, "collection failed");
                    up.set(0.0);
                }
            }
        }
    }

    /// One full cycle for one server. The connection is dropped on every
    /// exit path.
    pub fn collect_server<C: ServerConnector>(
        &self,
        connector: &C,
        server: &ServerConfig,
    ) -> Result<(), CollectError> {
        let mut conn = connector
            .open(server, true)
            .map_err(|e| CollectError::Connect(e.message))?;
        debug!(server = %server.name, "connected");
        self.fill_environment(&mut conn, &server.name)?;
        self.fill_system_status(&mut conn, &server.name)?;
        self.fill_network(&mut conn, &server.name)?;
        self.fill_subsystems(&mut conn, &server.name)?;
        self.fill_http_servers(&mut conn, &server.name)?;
        self.fill_memory_pools(&mut conn, &server.name)?;
        Ok(())
    }

    /// ENV_SYS_INFO plus the optional DATA_AREA_INFO refinement of the OS
    /// version string. Also the source of the total memory figure.
    fn fill_environment<Conn: ServerConnection>(
        &self,
        conn: &mut Conn,
        server: &str,
    ) -> Result<(), CollectError> {
        let row = single_row(query_required(conn, queries::ENV_SYS_INFO)?, "ENV_SYS_INFO")?;

        let host_name = row.text("HOST_NAME").unwrap_or_default();
        let mut os_version = match (row.text("OS_VERSION"), row.text("OS_RELEASE")) {
            (Some(version), Some(release)) => format!("V{}R{}", version, release),
            _ => String::new(),
        };
        let mut language_feature_code = String::new();
        // More precise version string for OS versions that support it.
        if let Some(rows) = query_optional(conn, queries::OS_VERSION_DATA_AREA)? {
            if let Some(value) = rows.first().and_then(|r| r.text("DATA_AREA_VALUE")) {
                let mut parts = value.split_whitespace();
                if let (Some(version), Some(code)) = (parts.next(), parts.next()) {
                    os_version = version.to_string();
                    language_feature_code = code.to_string();
                }
            }
        }
        self.metrics
            .environment
            .with_label_values(&[server])
            .expect("server label")
            .set(&[
                ("host_name", host_name.as_str()),
                ("os_version", os_version.as_str()),
                ("language_feature_code", language_feature_code.as_str()),
            ]);

        if let Some(total_memory) = row.number("TOTAL_MEMORY") {
            // Megabytes to bytes.
            self.metrics
                .memory_capacity
                .with_label_values(&[server])
                .expect("server label")
                .set(total_memory * 1_000_000.0);
        }
        debug!(server, "environment collected");
        Ok(())
    }

    /// SYSTEM_STATUS through the detailed/reduced cascade, then the CPU
    /// rates from SYSTEM_ACTIVITY_INFO where available.
    fn fill_system_status<Conn: ServerConnection>(
        &self,
        conn: &mut Conn,
        server: &str,
    ) -> Result<(), CollectError> {
        let row = single_row(
            query_with_fallback(conn, &queries::SYSTEM_STATUS)?,
            "SYSTEM_STATUS",
        )?;
        for column in &self.system_columns {
            column.apply(&row, &[server]);
        }

        // Since V7R3 the CPU rates in SYSTEM_STATUS read 0 and
        // SYSTEM_ACTIVITY_INFO carries the real figures; older releases
        // keep reporting them in the SYSTEM_STATUS row.
        let activity_row = match query_optional(conn, queries::SYSTEM_ACTIVITY_INFO)? {
            Some(rows) => single_row(rows, "SYSTEM_ACTIVITY_INFO")?,
            None => row,
        };
        for column in &self.activity_columns {
            column.apply(&activity_row, &[server]);
        }
        debug!(server, "system status collected");
        Ok(())
    }

    fn fill_network<Conn: ServerConnection>(
        &self,
        conn: &mut Conn,
        server: &str,
    ) -> Result<(), CollectError> {
        let row = single_row(
            query_required(conn, queries::REMOTE_CONNECTIONS)?,
            "NETSTAT_INFO",
        )?;
        if let Some(count) = row.number("REMOTE_CONNECTIONS") {
            self.metrics
                .remote_connections
                .with_label_values(&[server])
                .expect("server label")
                .set(count);
        }
        debug!(server, "network collected");
        Ok(())
    }

    fn fill_subsystems<Conn: ServerConnection>(
        &self,
        conn: &mut Conn,
        server: &str,
    ) -> Result<(), CollectError> {
        let Some(rows) = query_optional(conn, queries::SUBSYSTEM_INFO)? else {
            return Ok(());
        };
        for row in rows {
            let Some(subsystem) = row.text("SUBSYSTEM_DESCRIPTION") else {
                continue;
            };
            if let Some(status) = row.text("STATUS") {
                let state = self
                    .metrics
                    .subsystem_status
                    .with_label_values(&[server, &subsystem])
                    .expect("label arity");
                if let Err(e) = state.set_state(&status) {
                    // Runtime data outside the declared set, not a wiring
                    // defect: keep the previous state and the cycle alive.
                    warn!(server, subsystem = %subsystem, error = %e, "unknown subsystem status");
                }
            }
            if let Some(jobs) = row.number("CURRENT_ACTIVE_JOBS") {
                self.metrics
                    .subsystem_jobs_active
                    .with_label_values(&[server, &subsystem])
                    .expect("label arity")
                    .set(jobs);
            }
        }
        debug!(server, "subsystems collected");
        Ok(())
    }

    fn fill_http_servers<Conn: ServerConnection>(
        &self,
        conn: &mut Conn,
        server: &str,
    ) -> Result<(), CollectError> {
        let Some(rows) = query_optional(conn, queries::HTTP_SERVER_INFO)? else {
            return Ok(());
        };
        for row in rows {
            let (Some(http_server), Some(function)) =
                (row.text("SERVER_NAME"), row.text("HTTP_FUNCTION"))
            else {
                continue;
            };
            for column in &self.http_columns {
                column.apply(&row, &[server, &http_server, &function]);
            }
        }
        debug!(server, "http servers collected");
        Ok(())
    }

    fn fill_memory_pools<Conn: ServerConnection>(
        &self,
        conn: &mut Conn,
        server: &str,
    ) -> Result<(), CollectError> {
        let rows = query_required(conn, queries::MEMORY_POOL_INFO)?;
        for row in rows {
            let Some(pool_name) = row.text("POOL_NAME") else {
                continue;
            };
            // Pool names come back blank-padded to fixed width.
            let pool_name = pool_name.trim();
            for column in &self.pool_columns {
                column.apply(&row, &[server, pool_name]);
            }
        }
        debug!(server, "memory pools collected");
        Ok(())
    }
}

/// Runs the preferred statement, re-issuing the reduced fallback exactly
/// once when the server rejects an unsupported feature. Any other failure
/// aborts the cycle.
fn query_with_fallback<Conn: ServerConnection>(
    conn: &mut Conn,
    query: &queries::VersionedQuery,
) -> Result<Vec<Row>, CollectError> {
    match conn.query(query.preferred) {
        Ok(rows) => Ok(rows),
        Err(QueryError::Unsupported(message)) => {
            let Some(fallback) = query.fallback else {
                return Err(CollectError::Query(message));
            };
            debug!(error = %message, "preferred query unsupported, using fallback");
            conn.query(fallback)
                .map_err(|e| CollectError::Query(e.to_string()))
        }
        Err(e) => Err(CollectError::Query(e.to_string())),
    }
}

/// Runs a statement the cycle cannot do without.
fn query_required<Conn: ServerConnection>(
    conn: &mut Conn,
    sql: &str,
) -> Result<Vec<Row>, CollectError> {
    conn.query(sql)
        .map_err(|e| CollectError::Query(e.to_string()))
}

/// Runs a statement for a view that may not exist on this OS version:
/// `Unsupported` yields `None` and the caller skips the step.
fn query_optional<Conn: ServerConnection>(
    conn: &mut Conn,
    sql: &str,
) -> Result<Option<Vec<Row>>, CollectError> {
    match conn.query(sql) {
        Ok(rows) => Ok(Some(rows)),
        Err(QueryError::Unsupported(message)) => {
            debug!(error = %message, "view not available on this version, skipping");
            Ok(None)
        }
        Err(e) => Err(CollectError::Query(e.to_string())),
    }
}

fn single_row(rows: Vec<Row>, what: &str) -> Result<Row, CollectError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| CollectError::Query(format!("{} returned no rows", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockConnector, MockServer};
    use crate::collector::traits::SqlValue;

    fn server(name: &str) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            host: format!("{}.example.net", name),
            user: "monitor".to_string(),
            password: "secret".to_string(),
            database: String::new(),
            ssl: true,
        }
    }

    fn gauge_value(registry: &Registry, metric: &str, labels: &[&str]) -> f64 {
        registry
            .find_gauge(metric)
            .unwrap()
            .with_label_values(labels)
            .unwrap()
            .get()
    }

    #[test]
    fn healthy_server_maps_all_views() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let connector = MockConnector::new().with_server("a", MockServer::healthy());
        collector.collect_all(&connector, &[server("a")]);

        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 1.0);
        // Percentage to ratio.
        assert_eq!(
            gauge_value(&registry, "system_storage_used_ratio", &["a", "asp"]),
            0.42
        );
        // CURRENT_TEMPORARY_STORAGE as a share of TOTAL_AUXILIARY_STORAGE.
        assert_eq!(
            gauge_value(&registry, "system_storage_used_ratio", &["a", "auxiliary"]),
            9000.0 / 1_800_000.0
        );
        // KB and MB figures land in bytes.
        assert_eq!(
            gauge_value(&registry, "system_storage_capacity_bytes", &["a", "main"]),
            8_388_608_000.0
        );
        assert_eq!(
            gauge_value(&registry, "system_memory_capacity_bytes_total", &["a"]),
            8_192_000_000.0
        );
        // CPU rates come from SYSTEM_ACTIVITY_INFO, not the zeroed
        // SYSTEM_STATUS columns.
        assert_eq!(
            gauge_value(&registry, "system_cpu_nominal_average_ratio", &["a"]),
            0.97
        );
        assert_eq!(gauge_value(&registry, "remote_connections_total", &["a"]), 17.0);
        // Pool names are trimmed.
        assert_eq!(
            gauge_value(&registry, "pool_threads_total", &["a", "*MACHINE"]),
            220.0
        );
        assert_eq!(
            gauge_value(
                &registry,
                "http_server_bytes_total",
                &["a", "ADMIN", "*ADMIN", "sent"]
            ),
            104200.0
        );
        let status = collector
            .metrics
            .subsystem_status
            .with_label_values(&["a", "QINTER"])
            .unwrap();
        assert_eq!(status.state(), "INACTIVE");
    }

    #[test]
    fn unsupported_detail_parameter_issues_exactly_one_fallback() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let connector = MockConnector::new().with_server("a", MockServer::legacy());
        collector.collect_all(&connector, &[server("a")]);

        let executed = connector.executed_queries("a");
        let preferred = executed
            .iter()
            .filter(|sql| sql.as_str() == queries::SYSTEM_STATUS.preferred)
            .count();
        let fallback = executed
            .iter()
            .filter(|sql| sql.as_str() == queries::SYSTEM_STATUS.fallback.unwrap())
            .count();
        assert_eq!(preferred, 1);
        assert_eq!(fallback, 1);

        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 1.0);
        assert_eq!(
            gauge_value(&registry, "system_storage_used_ratio", &["a", "asp"]),
            0.61
        );
        // Without SYSTEM_ACTIVITY_INFO the SYSTEM_STATUS row feeds the CPU
        // rates.
        assert_eq!(
            gauge_value(&registry, "system_cpu_nominal_average_ratio", &["a"]),
            0.88
        );
    }

    #[test]
    fn legacy_server_skips_missing_views_without_failing() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let connector = MockConnector::new().with_server("a", MockServer::legacy());
        collector.collect_all(&connector, &[server("a")]);

        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 1.0);
        for family in registry.snapshot() {
            if family.name.starts_with("http_server_") || family.name.starts_with("subsystem_") {
                assert!(family.samples.is_empty(), "{}", family.name);
            }
        }
    }

    #[test]
    fn connect_failure_marks_liveness_down_and_touches_nothing_else() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let connector = MockConnector::new()
            .with_server("a", MockServer::healthy());
        collector.collect_all(&connector, &[server("a"), server("b")]);

        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 1.0);
        assert_eq!(gauge_value(&registry, "system_status_up", &["b"]), 0.0);
        for family in registry.snapshot() {
            if family.name == "system_status_up" {
                continue;
            }
            for sample in &family.samples {
                assert_ne!(
                    sample.label_values.first().map(String::as_str),
                    Some("b"),
                    "{} has a sample for the unreachable server",
                    family.name
                );
            }
        }
    }

    #[test]
    fn hard_query_failure_aborts_the_cycle() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let connector = MockConnector::new().with_server(
            "a",
            MockServer::healthy()
                .with_failure(queries::MEMORY_POOL_INFO, "SQL0666 query timeout"),
        );
        collector.collect_all(&connector, &[server("a")]);
        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 0.0);
    }

    #[test]
    fn failed_fallback_aborts_the_cycle() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let connector = MockConnector::new().with_server(
            "a",
            MockServer::healthy()
                .with_unsupported(queries::SYSTEM_STATUS.preferred)
                .with_failure(queries::SYSTEM_STATUS.fallback.unwrap(), "SQL0204"),
        );
        collector.collect_all(&connector, &[server("a")]);
        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 0.0);
    }

    #[test]
    fn connections_are_released_even_when_a_query_fails() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let connector = MockConnector::new()
            .with_server(
                "a",
                MockServer::healthy().with_failure(queries::ENV_SYS_INFO, "boom"),
            )
            .with_server("c", MockServer::healthy());
        collector.collect_all(&connector, &[server("a"), server("b"), server("c")]);

        assert_eq!(connector.opened_total(), 2);
        assert_eq!(connector.open_connections(), 0);
        assert_eq!(connector.last_readonly(), Some(true));
        assert_eq!(gauge_value(&registry, "system_status_up", &["c"]), 1.0);
    }

    #[test]
    fn unknown_subsystem_status_is_skipped_without_failing_the_cycle() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let connector = MockConnector::new().with_server(
            "a",
            MockServer::healthy().with_rows(
                queries::SUBSYSTEM_INFO,
                vec![Row::from_pairs(&[
                    ("SUBSYSTEM_DESCRIPTION", SqlValue::Text("QWEIRD".to_string())),
                    ("STATUS", SqlValue::Text("EXPLODED".to_string())),
                    ("CURRENT_ACTIVE_JOBS", SqlValue::Number(3.0)),
                ])],
            ),
        );
        collector.collect_all(&connector, &[server("a")]);

        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 1.0);
        let status = collector
            .metrics
            .subsystem_status
            .with_label_values(&["a", "QWEIRD"])
            .unwrap();
        // First declared state, untouched by the invalid write.
        assert_eq!(status.state(), "ACTIVE");
        assert_eq!(
            gauge_value(&registry, "subsystem_jobs_active_total", &["a", "QWEIRD"]),
            3.0
        );
    }

    #[test]
    fn second_pass_recovers_a_previously_failed_server() {
        let registry = Registry::new();
        let collector = IbmiCollector::new(&registry).unwrap();
        let down = MockConnector::new();
        collector.collect_all(&down, &[server("a")]);
        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 0.0);

        let up = MockConnector::new().with_server("a", MockServer::healthy());
        collector.collect_all(&up, &[server("a")]);
        assert_eq!(gauge_value(&registry, "system_status_up", &["a"]), 1.0);
    }
}
