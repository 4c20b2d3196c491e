//! Metrics collection for monitored IBM i servers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      IbmiCollector                       │
//! │   queries (versioned SQL) → mapping (column → gauge)     │
//! │                            │                             │
//! │                  ┌─────────▼─────────┐                   │
//! │                  │  ServerConnector  │ (trait)           │
//! │                  └─────────┬─────────┘                   │
//! └────────────────────────────┼─────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!       ┌──────▼───────┐                ┌──────▼───────┐
//!       │ OdbcConnector│                │ MockConnector│
//!       │ (`odbc` feat)│                │ (testing)    │
//!       └──────────────┘                └──────────────┘
//! ```

pub mod ibmi;
pub mod mock;
#[cfg(feature = "odbc")]
pub mod odbc;
pub mod traits;

pub use ibmi::IbmiCollector;
pub use mock::{MockConnector, MockServer};
#[cfg(feature = "odbc")]
pub use odbc::OdbcConnector;
pub use traits::{ConnectError, QueryError, Row, ServerConnection, ServerConnector, SqlValue};

/// Why one server's collection cycle was abandoned. Recovered locally by
/// marking the server's liveness gauge 0; never fatal for the process.
#[derive(Debug)]
pub enum CollectError {
    /// Network or auth handshake failed.
    Connect(String),
    /// A required query failed (after any fallback tier).
    Query(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Connect(msg) => write!(f, "connection failed: {}", msg),
            CollectError::Query(msg) => write!(f, "query failed: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}
