pub mod database;
pub mod network;

// Re-export all probes for convenience
pub use database::{PostgresProbe, PsqlProbe};
pub use network::{DnsProbe, PingProbe, TcpConnectProbe, TracerouteProbe};
