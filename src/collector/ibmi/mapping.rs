//! Static column-to-metric mapping tables.
//!
//! Each table declares, for one catalog view, which result columns feed
//! which registered gauge and under which unit transform. Tables are
//! resolved against the registry once at startup, so a typo in a metric
//! name or a label-arity mismatch fails before the first collection cycle
//! instead of mid-cycle. Missing and null columns are tolerated at apply
//! time; schema richness varies by OS version.

use crate::collector::traits::Row;
use crate::registry::{GaugeVec, Registry, RegistryError};

/// Unit conversion applied to a raw column value before the gauge write.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Transform {
    Identity,
    /// 0-100 percentage to 0-1 ratio.
    PercentToRatio,
    /// Kilobyte figure to bytes.
    KilobytesToBytes,
    /// Megabyte figure to bytes.
    MegabytesToBytes,
    /// Value as a share of another column in the same row.
    ShareOfColumn(&'static str),
}

impl Transform {
    pub(crate) fn apply(&self, value: f64, row: &Row) -> Option<f64> {
        match self {
            Transform::Identity => Some(value),
            Transform::PercentToRatio => Some(value / 100.0),
            Transform::KilobytesToBytes => Some(value * 1000.0),
            Transform::MegabytesToBytes => Some(value * 1_000_000.0),
            Transform::ShareOfColumn(column) => {
                let total = row.number(column)?;
                if total == 0.0 {
                    None
                } else {
                    Some(value / total)
                }
            }
        }
    }
}

/// One column of interest: source column, target gauge, fixed trailing
/// label values (appended after the dynamic labels), unit transform.
#[derive(Debug)]
pub(crate) struct GaugeColumn {
    pub column: &'static str,
    pub metric: &'static str,
    pub fixed_labels: &'static [&'static str],
    pub transform: Transform,
}

/// SYSTEM_STATUS row, labeled by `server`.
pub(crate) const SYSTEM_STATUS_COLUMNS: &[GaugeColumn] = &[
    GaugeColumn {
        column: "MAXIMUM_JOBS_IN_SYSTEM",
        metric: "system_jobs_max",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "TOTAL_JOBS_IN_SYSTEM",
        metric: "system_jobs_all_total",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "ACTIVE_JOBS_IN_SYSTEM",
        metric: "system_jobs_active_total",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "BATCH_RUNNING",
        metric: "system_jobs_batch_total",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "ACTIVE_THREADS_IN_SYSTEM",
        metric: "system_threads_total",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "MAIN_STORAGE_SIZE",
        metric: "system_storage_capacity_bytes",
        fixed_labels: &["main"],
        transform: Transform::KilobytesToBytes,
    },
    GaugeColumn {
        column: "SYSTEM_ASP_STORAGE",
        metric: "system_storage_capacity_bytes",
        fixed_labels: &["asp"],
        transform: Transform::MegabytesToBytes,
    },
    GaugeColumn {
        column: "TOTAL_AUXILIARY_STORAGE",
        metric: "system_storage_capacity_bytes",
        fixed_labels: &["auxiliary"],
        transform: Transform::MegabytesToBytes,
    },
    GaugeColumn {
        column: "SYSTEM_ASP_USED",
        metric: "system_storage_used_ratio",
        fixed_labels: &["asp"],
        transform: Transform::PercentToRatio,
    },
    GaugeColumn {
        column: "CURRENT_TEMPORARY_STORAGE",
        metric: "system_storage_used_ratio",
        fixed_labels: &["auxiliary"],
        transform: Transform::ShareOfColumn("TOTAL_AUXILIARY_STORAGE"),
    },
    GaugeColumn {
        column: "PERMANENT_ADDRESS_RATE",
        metric: "system_storage_address_used_ratio",
        fixed_labels: &["permanent"],
        transform: Transform::PercentToRatio,
    },
    GaugeColumn {
        column: "TEMPORARY_ADDRESS_RATE",
        metric: "system_storage_address_used_ratio",
        fixed_labels: &["temporary"],
        transform: Transform::PercentToRatio,
    },
];

/// SYSTEM_ACTIVITY_INFO row (or the SYSTEM_STATUS row on releases without
/// that view), labeled by `server`.
pub(crate) const ACTIVITY_COLUMNS: &[GaugeColumn] = &[
    GaugeColumn {
        column: "AVERAGE_CPU_RATE",
        metric: "system_cpu_nominal_average_ratio",
        fixed_labels: &[],
        transform: Transform::PercentToRatio,
    },
    GaugeColumn {
        column: "AVERAGE_CPU_UTILIZATION",
        metric: "system_cpu_usage_average_ratio",
        fixed_labels: &[],
        transform: Transform::PercentToRatio,
    },
];

/// HTTP_SERVER_INFO rows, labeled by `server`, `http_server`,
/// `http_function`.
pub(crate) const HTTP_SERVER_COLUMNS: &[GaugeColumn] = &[
    GaugeColumn {
        column: "SERVER_NORMAL_CONNECTIONS",
        metric: "http_server_connections_total",
        fixed_labels: &["normal"],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "SERVER_SSL_CONNECTIONS",
        metric: "http_server_connections_total",
        fixed_labels: &["ssl"],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "REQUESTS",
        metric: "http_server_requests_total",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "RESPONSES",
        metric: "http_server_responses_total",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "ERROR_RESPONSES",
        metric: "http_server_error_responses_total",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "BYTES_SENT",
        metric: "http_server_bytes_total",
        fixed_labels: &["sent"],
        transform: Transform::Identity,
    },
    GaugeColumn {
        column: "BYTES_RECEIVED",
        metric: "http_server_bytes_total",
        fixed_labels: &["received"],
        transform: Transform::Identity,
    },
];

/// MEMORY_POOL_INFO rows, labeled by `server`, `pool_name`.
pub(crate) const MEMORY_POOL_COLUMNS: &[GaugeColumn] = &[
    GaugeColumn {
        column: "CURRENT_SIZE",
        metric: "pool_storage_current_bytes",
        fixed_labels: &[],
        transform: Transform::MegabytesToBytes,
    },
    GaugeColumn {
        column: "RESERVED_SIZE",
        metric: "pool_storage_reserved_bytes",
        fixed_labels: &[],
        transform: Transform::MegabytesToBytes,
    },
    GaugeColumn {
        column: "CURRENT_THREADS",
        metric: "pool_threads_total",
        fixed_labels: &[],
        transform: Transform::Identity,
    },
];

/// A mapping entry bound to its registered gauge.
pub(crate) struct ResolvedColumn {
    entry: &'static GaugeColumn,
    gauge: GaugeVec,
}

impl std::fmt::Debug for ResolvedColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedColumn")
            .field("metric", &self.entry.metric)
            .finish()
    }
}

impl ResolvedColumn {
    /// Writes one column of `row` into the gauge, labeled by the dynamic
    /// label values plus the entry's fixed labels. Missing, null and
    /// non-numeric cells are skipped.
    pub(crate) fn apply(&self, row: &Row, dynamic_labels: &[&str]) {
        let Some(raw) = row.number(self.entry.column) else {
            return;
        };
        let Some(value) = self.entry.transform.apply(raw, row) else {
            return;
        };
        let mut labels: Vec<&str> = Vec::with_capacity(dynamic_labels.len() + self.entry.fixed_labels.len());
        labels.extend_from_slice(dynamic_labels);
        labels.extend_from_slice(self.entry.fixed_labels);
        self.gauge
            .with_label_values(&labels)
            .expect("label arity validated at startup")
            .set(value);
    }
}

/// Binds a mapping table to the registry, verifying every target metric
/// exists as a gauge and that dynamic + fixed label counts match its
/// definition.
pub(crate) fn resolve(
    registry: &Registry,
    table: &'static [GaugeColumn],
    dynamic_labels: usize,
) -> Result<Vec<ResolvedColumn>, RegistryError> {
    table
        .iter()
        .map(|entry| {
            let gauge = registry.find_gauge(entry.metric)?;
            let supplied = dynamic_labels + entry.fixed_labels.len();
            if gauge.label_count() != supplied {
                return Err(RegistryError::LabelCardinality {
                    metric: entry.metric.to_string(),
                    expected: gauge.label_count(),
                    got: supplied,
                });
            }
            Ok(ResolvedColumn { entry, gauge })
        })
        .collect()
}
