//! Fixed SQL issued against the IBM i catalog and service views.
//!
//! Version differences between OS releases are handled as a two-tier
//! cascade, not open-ended retry: a preferred statement asking for the
//! richest detail, and at most one reduced fallback for releases that
//! reject it. Views that simply do not exist on older releases carry no
//! fallback and are skipped.

/// A preferred statement with at most one reduced-feature fallback.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VersionedQuery {
    pub preferred: &'static str,
    pub fallback: Option<&'static str>,
}

/// Environment summary: memory size, OS version/release, host name.
pub(crate) const ENV_SYS_INFO: &str = "SELECT * FROM SYSIBMADM.ENV_SYS_INFO";

/// Precise OS version string ("V7R4M0 2924"), available since V7R3.
pub(crate) const OS_VERSION_DATA_AREA: &str = "SELECT DATA_AREA_VALUE FROM \
     TABLE(QSYS2.DATA_AREA_INFO(DATA_AREA_LIBRARY=>'QUSRSYS',DATA_AREA_NAME=>'QSS1MRI')) X";

/// System status snapshot. DETAILED_INFO exists since V7R3; older releases
/// reject the parameter and get the reduced statement.
pub(crate) const SYSTEM_STATUS: VersionedQuery = VersionedQuery {
    preferred: "SELECT * FROM \
         TABLE(QSYS2.SYSTEM_STATUS(RESET_STATISTICS=>'YES',DETAILED_INFO=>'ALL')) X",
    fallback: Some(
        "SELECT * FROM TABLE(QSYS2.SYSTEM_STATUS(RESET_STATISTICS=>'YES')) X",
    ),
};

/// CPU activity rates. Since V7R3 SYSTEM_STATUS reports AVERAGE_CPU_RATE
/// as 0 and this view carries the real figures; older releases reject it
/// and the SYSTEM_STATUS row is used instead.
pub(crate) const SYSTEM_ACTIVITY_INFO: &str =
    "SELECT * FROM TABLE(QSYS2.SYSTEM_ACTIVITY_INFO())";

/// Established non-loopback TCP connections.
pub(crate) const REMOTE_CONNECTIONS: &str = "SELECT COUNT(REMOTE_ADDRESS) AS REMOTE_CONNECTIONS \
     FROM QSYS2.NETSTAT_INFO \
     WHERE TCP_STATE = 'ESTABLISHED' \
     AND REMOTE_ADDRESS != '::1' AND REMOTE_ADDRESS != '127.0.0.1'";

/// One row per subsystem; not available before V7R3.
pub(crate) const SUBSYSTEM_INFO: &str = "SELECT * FROM QSYS2.SUBSYSTEM_INFO";

/// One row per (HTTP server, function); not available before V7R3.
pub(crate) const HTTP_SERVER_INFO: &str = "SELECT * FROM QSYS2.HTTP_SERVER_INFO";

/// One row per main storage pool.
pub(crate) const MEMORY_POOL_INFO: &str = "SELECT * FROM QSYS2.MEMORY_POOL_INFO";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_status_preferred_requests_full_detail() {
        assert!(SYSTEM_STATUS.preferred.contains("DETAILED_INFO=>'ALL'"));
        assert!(SYSTEM_STATUS.preferred.contains("RESET_STATISTICS=>'YES'"));
    }

    #[test]
    fn system_status_fallback_drops_only_the_detail_parameter() {
        let fallback = SYSTEM_STATUS.fallback.unwrap();
        assert!(!fallback.contains("DETAILED_INFO"));
        assert!(fallback.contains("RESET_STATISTICS=>'YES'"));
    }

    #[test]
    fn remote_connections_excludes_loopback() {
        assert!(REMOTE_CONNECTIONS.contains("TCP_STATE = 'ESTABLISHED'"));
        assert!(REMOTE_CONNECTIONS.contains("'::1'"));
        assert!(REMOTE_CONNECTIONS.contains("'127.0.0.1'"));
    }

    #[test]
    fn os_version_data_area_targets_qss1mri() {
        assert!(OS_VERSION_DATA_AREA.contains("DATA_AREA_NAME=>'QSS1MRI'"));
        assert!(OS_VERSION_DATA_AREA.contains("DATA_AREA_LIBRARY=>'QUSRSYS'"));
    }
}
