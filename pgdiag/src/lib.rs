pub mod error;
pub mod probes;
pub mod report;
pub mod settings;

use std::io::Write;

use anyhow::{Context, Result};
use log::info;
use pgdiag_common::{Finding, Status, Target};

use crate::probes::{
    CommandRunner, Probe,
    builtin::{DnsProbe, PingProbe, PostgresProbe, PsqlProbe, TcpConnectProbe, TracerouteProbe},
};
use crate::report::{Reporter, Tally};
use crate::settings::Settings;

const NETWORK_HINTS_HEALTHY: [&str; 3] = [
    "Problem in the application/ORM connection configuration",
    "Wrong credentials",
    "SSL/TLS misconfigured",
];
const NETWORK_HINTS_BROKEN: [&str; 3] = [
    "Database server down or under maintenance",
    "Firewall/proxy blocking the connection",
    "Local network problems",
];

async fn run_probe<P, R, W>(
    label: Option<String>,
    probe: &P,
    runner: &R,
    reporter: &mut Reporter<W>,
) -> Result<Vec<Finding>>
where
    P: Probe,
    R: CommandRunner,
    W: Write,
{
    let title = match label {
        Some(label) => format!("{} {}", label, probe.title()),
        None => probe.title(),
    };
    reporter.section(&title)?;
    let findings = probe.run(runner).await;
    reporter.findings(&findings)?;
    reporter.flush()?;
    Ok(findings)
}

fn started_at() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S %Z").to_string()
}

/// Ping, TCP, traceroute, DNS and psql checks against the target, in order.
pub struct NetworkDiagnostics {
    pub settings: Settings,
    target: Target,
}

impl NetworkDiagnostics {
    pub fn new(settings: Settings) -> Result<Self> {
        let target = settings.to_target().context("Invalid target configuration")?;
        Ok(Self { settings, target })
    }

    pub async fn run<R: CommandRunner, W: Write>(
        &self,
        runner: &R,
        reporter: &mut Reporter<W>,
    ) -> Result<Tally> {
        let network = &self.settings.network;
        let host = self.target.host.as_str();
        let total = if network.psql_enabled() { 5 } else { 4 };
        let label = |n: usize| Some(format!("[{}/{}]", n, total));

        reporter.title("🔧 Network connectivity diagnostics")?;
        reporter.field("Host", host)?;
        reporter.field("Port", self.target.port)?;
        reporter.field("Started", started_at())?;
        reporter.rule()?;

        let ping = PingProbe::new(host, network.ping_count(), network.ping_timeout());
        run_probe(label(1), &ping, runner, reporter).await?;

        let tcp = TcpConnectProbe::new(host, self.target.port, network.tcp_timeout());
        run_probe(label(2), &tcp, runner, reporter).await?;

        let traceroute = TracerouteProbe::new(
            host,
            network.traceroute_max_hops(),
            network.traceroute_timeout(),
            network.traceroute_max_lines(),
        );
        run_probe(label(3), &traceroute, runner, reporter).await?;

        let dns = DnsProbe::new(host, network.dns_timeout());
        run_probe(label(4), &dns, runner, reporter).await?;

        if network.psql_enabled() {
            let psql = PsqlProbe::new(self.target.clone(), network.psql_timeout());
            run_probe(label(5), &psql, runner, reporter).await?;
        }

        let tally = reporter.tally();
        info!("Network diagnostics finished: {:?}", tally);

        reporter.blank()?;
        reporter.banner()?;
        reporter.line("🎯 DIAGNOSTICS COMPLETE")?;
        reporter.banner()?;
        reporter.line(&format!(
            "Passed: {}, Warnings: {}, Failed: {}",
            tally.passed, tally.warnings, tally.failures
        ))?;
        reporter.blank()?;
        reporter.line("If every test passes ✅ but the application still cannot connect:")?;
        for hint in NETWORK_HINTS_HEALTHY {
            reporter.line(&format!("  • {}", hint))?;
        }
        reporter.blank()?;
        reporter.line("If there are connectivity failures ❌:")?;
        for hint in NETWORK_HINTS_BROKEN {
            reporter.line(&format!("  • {}", hint))?;
        }
        reporter.flush()?;

        Ok(tally)
    }
}

/// Preflight ping followed by a direct database session.
pub struct DatabaseDiagnostics {
    pub settings: Settings,
    target: Target,
}

impl DatabaseDiagnostics {
    pub fn new(settings: Settings) -> Result<Self> {
        let target = settings.to_target().context("Invalid target configuration")?;
        Ok(Self { settings, target })
    }

    fn probe(&self) -> PostgresProbe {
        let database = &self.settings.database;
        PostgresProbe::new(self.target.clone(), database.connect_timeout())
            .schema(database.schema())
            .table_pattern(database.table_pattern())
            .sample(database.sample_columns(), database.sample_limit())
    }

    pub async fn run<R: CommandRunner, W: Write>(
        &self,
        runner: &R,
        reporter: &mut Reporter<W>,
    ) -> Result<Tally> {
        let database = &self.settings.database;

        reporter.title(&format!(
            "🔧 PostgreSQL connection test - {}",
            self.target.host
        ))?;
        reporter.field("Started", started_at())?;

        if database.preflight_ping() {
            let ping = PingProbe::new(
                &self.target.host,
                self.settings.network.ping_count(),
                database.preflight_ping_timeout(),
            )
            .show_output(true);
            run_probe(None, &ping, runner, reporter).await?;
            reporter.blank()?;
            reporter.banner()?;
        }

        let probe = self.probe();
        reporter.section(&probe.title())?;
        reporter.field("Host", &self.target.host)?;
        reporter.field("Port", self.target.port)?;
        reporter.field("Database", &self.target.database)?;
        reporter.field("User", &self.target.user)?;
        reporter.rule()?;
        reporter.flush()?;

        let findings = probe.run(runner).await;
        reporter.findings(&findings)?;
        let working = findings.iter().all(|f| f.status != Status::Fail);
        info!("Database probe finished, working={}", working);

        reporter.blank()?;
        reporter.banner()?;
        if working {
            reporter.line("🎉 Database connection works!")?;
        } else {
            reporter.line("💥 The database connection has problems")?;
            reporter.line("🔧 Possible fixes:")?;
            reporter.line("  1. Check that the database server is active")?;
            reporter.line("  2. Review the access credentials")?;
            reporter.line(&format!(
                "  3. Check the permissions of user '{}'",
                self.target.user
            ))?;
            reporter.line("  4. Check firewall/VPN configuration")?;
        }
        reporter.flush()?;

        Ok(reporter.tally())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::{
        CommandOutcome,
        testing::{ScriptedRunner, exited},
    };
    use crate::settings::{DatabaseSettings, NetworkSettings, TargetSettings};
    use tokio::net::TcpListener;

    const PING_OK: &str = "\
--- 127.0.0.1 ping statistics ---
3 packets transmitted, 3 received, 0% packet loss, time 2003ms
rtt min/avg/max/mdev = 0.031/0.042/0.055/0.010 ms
";

    fn settings(port: u16) -> Settings {
        Settings {
            target: TargetSettings {
                host: Some("127.0.0.1".to_string()),
                port: Some(port),
                ..Default::default()
            },
            network: NetworkSettings {
                tcp_timeout_secs: Some(5),
                ..Default::default()
            },
            database: DatabaseSettings {
                connect_timeout_secs: Some(5),
                ..Default::default()
            },
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_network_run_all_sections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let runner = ScriptedRunner::default()
            .with("ping", exited(true, PING_OK, ""))
            .with("traceroute", CommandOutcome::NotFound)
            .with("psql", exited(true, "1", ""));

        let diagnostics = NetworkDiagnostics::new(settings(port)).unwrap();
        let mut reporter = Reporter::new(Vec::new());
        let tally = diagnostics.run(&runner, &mut reporter).await.unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();

        assert!(tally.healthy());
        assert!(text.contains("[1/5] 🏓 Ping to host..."));
        assert!(text.contains("✅ Ping succeeded - host reachable (3/3 replies, avg 0.0 ms)"));
        assert!(text.contains(&format!("[2/5] 🔌 TCP connectivity on port {}...", port)));
        assert!(text.contains(&format!("Port {} OPEN", port)));
        assert!(text.contains("traceroute command not found"));
        assert!(text.contains("✅ DNS resolves 127.0.0.1 → 127.0.0.1"));
        assert!(text.contains("[5/5] 🐘 PostgreSQL connection"));
        assert!(text.contains("🎯 DIAGNOSTICS COMPLETE"));
        assert!(text.contains("Failed: 0"));

        let programs: Vec<String> = runner
            .calls
            .borrow()
            .iter()
            .map(|c| c.program.clone())
            .collect();
        assert_eq!(programs, vec!["ping", "traceroute", "psql"]);
    }

    #[tokio::test]
    async fn test_network_run_reports_failures_and_skips_psql() {
        let port = closed_port().await;
        let runner = ScriptedRunner::default()
            .with("ping", CommandOutcome::TimedOut(std::time::Duration::from_secs(15)));

        let mut settings = settings(port);
        settings.network.psql = Some(false);
        let diagnostics = NetworkDiagnostics::new(settings).unwrap();
        let mut reporter = Reporter::new(Vec::new());
        let tally = diagnostics.run(&runner, &mut reporter).await.unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();

        assert_eq!(tally.failures, 2);
        assert!(text.contains("[4/4] 🌐 DNS resolution..."));
        assert!(text.contains("❌ Ping timed out (>15s)"));
        assert!(text.contains("CLOSED"));
        assert!(!text.contains("🐘"));
        assert!(text.contains("Failed: 2"));
    }

    #[tokio::test]
    async fn test_database_run_reports_remediation() {
        let port = closed_port().await;
        let runner = ScriptedRunner::default().with("ping", exited(true, PING_OK, ""));

        let diagnostics = DatabaseDiagnostics::new(settings(port)).unwrap();
        let mut reporter = Reporter::new(Vec::new());
        diagnostics.run(&runner, &mut reporter).await.unwrap();
        let text = String::from_utf8(reporter.into_inner()).unwrap();

        assert!(text.starts_with("🔧 PostgreSQL connection test - 127.0.0.1"));
        assert!(text.contains("Ping succeeded"));
        assert!(text.contains(&format!("Port: {}", port)));
        assert!(text.contains("❌ Connection error: "));
        assert!(text.contains("💥 The database connection has problems"));
        assert!(text.contains("  3. Check the permissions of user 'solo_lectura'"));
        assert!(!text.contains("🎉"));
    }

    #[tokio::test]
    async fn test_database_run_without_preflight() {
        let port = closed_port().await;
        let runner = ScriptedRunner::default();

        let mut settings = settings(port);
        settings.database.preflight_ping = Some(false);
        let diagnostics = DatabaseDiagnostics::new(settings).unwrap();
        let mut reporter = Reporter::new(Vec::new());
        diagnostics.run(&runner, &mut reporter).await.unwrap();

        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_rejects_plaintext_sslmode() {
        let mut settings = settings(5432);
        settings.target.sslmode = Some("disable".to_string());
        assert!(NetworkDiagnostics::new(settings.clone()).is_err());
        assert!(DatabaseDiagnostics::new(settings).is_err());
    }
}
