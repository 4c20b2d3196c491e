//! Metric family registration for the IBM i collector.

use crate::registry::{EnumVec, GaugeVec, InfoVec, Registry, RegistryError};

/// The closed set of subsystem states reported by SUBSYSTEM_INFO.
pub(crate) const SUBSYSTEM_STATES: &[&str] =
    &["ACTIVE", "ENDING", "INACTIVE", "RESTRICTED", "STARTING"];

/// Handles to the families the collector writes directly. Families that
/// are only reached through the static column mapping tables are
/// registered here as well, then resolved by name at startup.
pub(crate) struct IbmiMetrics {
    pub(crate) system_status_up: GaugeVec,
    pub(crate) environment: InfoVec,
    pub(crate) memory_capacity: GaugeVec,
    pub(crate) remote_connections: GaugeVec,
    pub(crate) subsystem_status: EnumVec,
    pub(crate) subsystem_jobs_active: GaugeVec,
}

impl IbmiMetrics {
    pub(crate) fn register(registry: &Registry) -> Result<Self, RegistryError> {
        let system_status_up = registry.gauge("system_status_up", "System is up", &["server"])?;
        let environment = registry.info(
            "ecosystem_environment",
            "Environment of the server",
            &["server"],
        )?;
        registry.gauge(
            "system_jobs_max",
            "The maximum number of jobs that are allowed on the system",
            &["server"],
        )?;
        registry.gauge(
            "system_jobs_all_total",
            "The total number of user and system jobs that are currently in the system",
            &["server"],
        )?;
        registry.gauge(
            "system_jobs_active_total",
            "The total number of user and system active jobs in the system",
            &["server"],
        )?;
        registry.gauge(
            "system_jobs_batch_total",
            "The number of batch jobs currently running on the system",
            &["server"],
        )?;
        registry.gauge(
            "system_threads_total",
            "The number of initial and secondary threads in the system, \
             including both user and system threads",
            &["server"],
        )?;
        registry.gauge(
            "system_cpu_usage_average_ratio",
            "Average CPU utilization for all of the active processors",
            &["server"],
        )?;
        registry.gauge(
            "system_cpu_nominal_average_ratio",
            "CPU rate per nominal frequency",
            &["server"],
        )?;
        let memory_capacity = registry.gauge(
            "system_memory_capacity_bytes_total",
            "Total amount of memory on the system",
            &["server"],
        )?;
        registry.gauge(
            "system_storage_capacity_bytes",
            "The amount of storage in the system",
            &["server", "storage_type"],
        )?;
        registry.gauge(
            "system_storage_used_ratio",
            "The percentage of the storage currently in use",
            &["server", "storage_type"],
        )?;
        registry.gauge(
            "system_storage_address_used_ratio",
            "The percentage of the maximum possible addresses for objects that have been used",
            &["server", "object_type"],
        )?;
        let remote_connections = registry.gauge(
            "remote_connections_total",
            "Total number of IPv4 and IPv6 network connections",
            &["server"],
        )?;
        registry.gauge(
            "http_server_connections_total",
            "Total number of connections to the server",
            &["server", "http_server", "http_function", "connections_type"],
        )?;
        registry.gauge(
            "http_server_requests_total",
            "Number of requests received",
            &["server", "http_server", "http_function"],
        )?;
        registry.gauge(
            "http_server_responses_total",
            "Number of responses sent",
            &["server", "http_server", "http_function"],
        )?;
        registry.gauge(
            "http_server_error_responses_total",
            "Number of error responses",
            &["server", "http_server", "http_function"],
        )?;
        registry.gauge(
            "http_server_bytes_total",
            "Total number of bytes sent or received for all requests",
            &["server", "http_server", "http_function", "flow_direction"],
        )?;
        let subsystem_status = registry.enum_metric(
            "subsystem_status",
            "The status of the subsystem",
            &["server", "subsystem"],
            SUBSYSTEM_STATES,
        )?;
        let subsystem_jobs_active = registry.gauge(
            "subsystem_jobs_active_total",
            "The number of jobs currently active in the subsystem",
            &["server", "subsystem"],
        )?;
        registry.gauge(
            "pool_storage_current_bytes",
            "The amount of main storage, in the pool",
            &["server", "pool_name"],
        )?;
        registry.gauge(
            "pool_storage_reserved_bytes",
            "The amount of storage, in the pool reserved for system use \
             (for example, for save/restore operations)",
            &["server", "pool_name"],
        )?;
        registry.gauge(
            "pool_threads_total",
            "The number of threads currently using the pool",
            &["server", "pool_name"],
        )?;

        Ok(Self {
            system_status_up,
            environment,
            memory_capacity,
            remote_connections,
            subsystem_status,
            subsystem_jobs_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_the_full_family_set_once() {
        let registry = Registry::new();
        IbmiMetrics::register(&registry).unwrap();
        assert_eq!(registry.family_count(), 24);
        // A second registration against the same registry is a wiring
        // defect and fails on the first duplicate.
        assert!(matches!(
            IbmiMetrics::register(&registry),
            Err(RegistryError::DuplicateMetric(_))
        ));
        assert_eq!(registry.family_count(), 24);
    }

    #[test]
    fn mapped_families_are_resolvable_as_gauges() {
        let registry = Registry::new();
        IbmiMetrics::register(&registry).unwrap();
        for name in [
            "system_jobs_max",
            "system_storage_capacity_bytes",
            "system_storage_used_ratio",
            "system_storage_address_used_ratio",
            "pool_storage_current_bytes",
            "http_server_bytes_total",
        ] {
            assert!(registry.find_gauge(name).is_ok(), "{name}");
        }
    }
}
