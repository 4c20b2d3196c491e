//! ibmiprom — Prometheus exporter for IBM i servers.
//!
//! Provides:
//! - `registry` — metric families, instances and the text exposition format
//! - `collector` — per-server collection pipeline over the SQL seam
//!   (ODBC in production, in-memory mock for tests)
//! - `config` — server list parsing
//! - `web` — the scrape endpoint
//!
//! The `ibmipromd` daemon wires these together: one registry shared
//! between a fixed-interval collection loop and the HTTP endpoint.

pub mod collector;
pub mod config;
pub mod registry;
pub mod web;

/// Crate version, surfaced by the daemon's `--version` flag.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
