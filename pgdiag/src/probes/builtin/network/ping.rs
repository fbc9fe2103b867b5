//! ICMP reachability probe.
//!
//! Shells out to the system `ping` because raw ICMP sockets need elevated
//! privileges; the setuid `ping` binary already has them.

use std::time::Duration;

use log::info;
use once_cell::sync::Lazy;
use pgdiag_common::Finding;
use regex::Regex;

use crate::probes::{CommandOutcome, CommandRunner, CommandSpec, Probe};

static PACKETS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+) packets transmitted, (\d+) (?:packets )?received").unwrap()
});
static LOSS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d.]+)% packet loss").unwrap());
// Linux: "rtt min/avg/max/mdev = a/b/c/d ms", BSD: "round-trip min/avg/max/stddev = ..."
static RTT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"min/avg/max\S* = ([\d.]+)/([\d.]+)/([\d.]+)").unwrap());

/// Statistics block printed by `ping` when it exits.
#[derive(Debug, Clone, PartialEq)]
pub struct PingSummary {
    pub transmitted: u32,
    pub received: u32,
    pub loss_percent: f64,
    pub rtt_ms: Option<(f64, f64, f64)>,
}

pub fn parse_ping_summary(output: &str) -> Option<PingSummary> {
    let packets = PACKETS_RE.captures(output)?;
    let transmitted = packets[1].parse().ok()?;
    let received = packets[2].parse().ok()?;
    let loss_percent = LOSS_RE
        .captures(output)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0.0);
    let rtt_ms = RTT_RE.captures(output).and_then(|c| {
        Some((
            c[1].parse().ok()?,
            c[2].parse().ok()?,
            c[3].parse().ok()?,
        ))
    });

    Some(PingSummary {
        transmitted,
        received,
        loss_percent,
        rtt_ms,
    })
}

/// Lines worth echoing from the tail of the output.
fn statistics_lines(output: &str) -> Vec<String> {
    let lines: Vec<&str> = output.trim().lines().collect();
    let tail = &lines[lines.len().saturating_sub(3)..];
    tail.iter()
        .filter(|line| line.contains("packet loss") || line.contains("min/avg/max"))
        .map(|line| line.trim().to_string())
        .collect()
}

pub struct PingProbe {
    host: String,
    count: u32,
    timeout: Duration,
    show_output: bool,
}

impl PingProbe {
    pub fn new(host: &str, count: u32, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            count,
            timeout,
            show_output: false,
        }
    }

    /// Echo the full `ping` output instead of the statistics lines only.
    pub fn show_output(mut self, show: bool) -> Self {
        self.show_output = show;
        self
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new("ping", self.timeout)
            .arg("-c")
            .arg(self.count.to_string())
            .arg(&self.host)
    }

    fn interpret(&self, outcome: CommandOutcome) -> Finding {
        match outcome {
            CommandOutcome::Exited {
                success: true,
                stdout,
                ..
            } => {
                let mut headline = "Ping succeeded - host reachable".to_string();
                if let Some(summary) = parse_ping_summary(&stdout) {
                    info!("PING host={} summary={:?}", self.host, summary);
                    headline.push_str(&format!(
                        " ({}/{} replies",
                        summary.received, summary.transmitted
                    ));
                    if let Some((_, avg, _)) = summary.rtt_ms {
                        headline.push_str(&format!(", avg {:.1} ms", avg));
                    }
                    headline.push(')');
                }

                let details = if self.show_output {
                    stdout.trim().lines().map(str::to_string).collect()
                } else {
                    statistics_lines(&stdout)
                };
                Finding::pass(headline).with_details(details)
            }
            CommandOutcome::Exited { stdout, stderr, .. } => {
                let finding = Finding::fail("Ping failed - host unreachable");
                if stderr.trim().is_empty() {
                    finding.with_details(statistics_lines(&stdout))
                } else {
                    finding.with_detail(format!("Error: {}", stderr.trim()))
                }
            }
            CommandOutcome::TimedOut(timeout) => Finding::fail(format!(
                "Ping timed out (>{}s) - connectivity very slow or blocked",
                timeout.as_secs()
            )),
            CommandOutcome::NotFound => Finding::fail("Ping error: ping command not found"),
            CommandOutcome::SpawnFailed(e) => Finding::fail(format!("Ping error: {}", e)),
        }
    }
}

impl Probe for PingProbe {
    fn title(&self) -> String {
        "🏓 Ping to host...".to_string()
    }

    async fn run<R: CommandRunner>(&self, runner: &R) -> Vec<Finding> {
        let outcome = runner.run(&self.command()).await;
        vec![self.interpret(outcome)]
    }
}
