//! Network-layer probes.
//!
//! ## Probes
//! - **PingProbe**: ICMP reachability through the system `ping`
//! - **TcpConnectProbe**: raw TCP connect to the database port
//! - **TracerouteProbe**: best-effort route listing through `traceroute`
//! - **DnsProbe**: forward and reverse name resolution

use std::{future::Future, io, net::SocketAddr, time::Duration};

use tokio::net::lookup_host;

pub mod dns;
pub mod ping;
pub mod tcp_connect;
pub mod traceroute;

pub use dns::DnsProbe;
pub use ping::PingProbe;
pub use tcp_connect::TcpConnectProbe;
pub use traceroute::TracerouteProbe;

/// System resolver lookup that gives up after `timeout`.
pub(crate) async fn resolve(
    host: &str,
    port: u16,
    timeout: Duration,
) -> io::Result<Vec<SocketAddr>> {
    bounded(timeout, async { Ok(lookup_host((host, port)).await?.collect()) }).await
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("resolver gave no answer within {}s", timeout.as_secs()),
        )),
    }
}
