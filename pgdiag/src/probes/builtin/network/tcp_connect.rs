use std::{
    io,
    net::SocketAddr,
    time::{Duration, Instant},
};

use log::info;
use pgdiag_common::Finding;
use tokio::net::TcpStream;

use super::resolve;
use crate::probes::{CommandRunner, Probe};

/// Result of a single connect attempt.
#[derive(Debug)]
pub enum PortState {
    Open,
    /// The host answered with a reset.
    Closed(io::Error),
    /// Nothing answered before the timeout.
    Filtered,
    Unreachable(io::Error),
}

impl PortState {
    pub fn classify(result: Result<io::Result<TcpStream>, tokio::time::error::Elapsed>) -> Self {
        match result {
            Ok(Ok(_stream)) => PortState::Open,
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => PortState::Closed(e),
            Ok(Err(e)) => PortState::Unreachable(e),
            Err(_) => PortState::Filtered,
        }
    }
}

pub struct TcpConnectProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpConnectProbe {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout,
        }
    }

    async fn pick_address(&self) -> io::Result<SocketAddr> {
        let addrs = resolve(&self.host, self.port, self.timeout).await?;
        // Prefer IPv4 like a plain AF_INET socket would.
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses returned"))
    }

    fn render(&self, addr: SocketAddr, state: PortState) -> Finding {
        let port = self.port;
        match state {
            PortState::Open => Finding::pass(format!(
                "Port {} OPEN - PostgreSQL service answering on {}",
                port,
                addr.ip()
            )),
            PortState::Closed(e) => Finding::fail(format!(
                "Port {} CLOSED - connection refused by {}",
                port,
                addr.ip()
            ))
            .with_details(error_code(&e)),
            PortState::Filtered => Finding::fail(format!(
                "Port {} FILTERED - no answer within {}s",
                port,
                self.timeout.as_secs()
            )),
            PortState::Unreachable(e) => {
                Finding::fail(format!("Port {} unreachable: {}", port, e)).with_details(error_code(&e))
            }
        }
    }
}

fn error_code(e: &io::Error) -> Option<String> {
    e.raw_os_error().map(|code| format!("Error code: {}", code))
}

impl Probe for TcpConnectProbe {
    fn title(&self) -> String {
        format!("🔌 TCP connectivity on port {}...", self.port)
    }

    async fn run<R: CommandRunner>(&self, _runner: &R) -> Vec<Finding> {
        let addr = match self.pick_address().await {
            Ok(addr) => addr,
            Err(e) => {
                return vec![Finding::fail(format!(
                    "DNS error - cannot resolve {}: {}",
                    self.host, e
                ))];
            }
        };

        let started = Instant::now();
        let state = PortState::classify(
            tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await,
        );
        info!(
            "TCP_CONNECT {} -> {:?} in {}ms",
            addr,
            state,
            started.elapsed().as_millis()
        );

        vec![self.render(addr, state)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testing::ScriptedRunner;
    use pgdiag_common::Status;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpConnectProbe::new("127.0.0.1", port, Duration::from_secs(5));
        let findings = probe.run(&ScriptedRunner::default()).await;

        assert_eq!(findings[0].status, Status::Pass);
        assert_eq!(
            findings[0].message,
            format!("Port {} OPEN - PostgreSQL service answering on 127.0.0.1", port)
        );
    }

    #[tokio::test]
    async fn test_closed_port() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = TcpConnectProbe::new("127.0.0.1", port, Duration::from_secs(5));
        let findings = probe.run(&ScriptedRunner::default()).await;

        assert_eq!(findings[0].status, Status::Fail);
        assert!(findings[0].message.contains("CLOSED"));
        assert!(findings[0].details[0].starts_with("Error code: "));
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let probe = TcpConnectProbe::new("pgdiag.invalid", 5432, Duration::from_secs(5));
        let findings = probe.run(&ScriptedRunner::default()).await;

        assert_eq!(findings[0].status, Status::Fail);
        assert!(findings[0].message.starts_with("DNS error - cannot resolve pgdiag.invalid"));
    }

    #[test]
    fn test_render_filtered() {
        let probe = TcpConnectProbe::new("db.example.com", 5432, Duration::from_secs(10));
        let addr: SocketAddr = "10.0.0.7:5432".parse().unwrap();
        let finding = probe.render(addr, PortState::Filtered);

        assert_eq!(finding.status, Status::Fail);
        assert_eq!(finding.message, "Port 5432 FILTERED - no answer within 10s");
    }

    #[cfg(unix)]
    #[test]
    fn test_render_unreachable() {
        let probe = TcpConnectProbe::new("db.example.com", 5432, Duration::from_secs(10));
        let addr: SocketAddr = "10.0.0.7:5432".parse().unwrap();
        let error = io::Error::from_raw_os_error(libc::EHOSTUNREACH);
        let finding = probe.render(addr, PortState::Unreachable(error));

        assert!(finding.message.starts_with("Port 5432 unreachable"));
        assert_eq!(finding.details, vec![format!("Error code: {}", libc::EHOSTUNREACH)]);
    }
}
