//! Database-layer probes.
//!
//! ## Probes
//! - **PsqlProbe**: connection test through the external `psql` client
//! - **PostgresProbe**: direct connection, liveness query and catalog inspection

pub mod postgres;
pub mod psql;

pub use postgres::PostgresProbe;
pub use psql::PsqlProbe;
