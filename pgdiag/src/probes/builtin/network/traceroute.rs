use std::time::Duration;

use pgdiag_common::Finding;

use crate::probes::{CommandOutcome, CommandRunner, CommandSpec, Probe};

/// Best-effort route listing. Every failure degrades to a warning.
pub struct TracerouteProbe {
    host: String,
    max_hops: u32,
    timeout: Duration,
    max_lines: usize,
}

impl TracerouteProbe {
    pub fn new(host: &str, max_hops: u32, timeout: Duration, max_lines: usize) -> Self {
        Self {
            host: host.to_string(),
            max_hops,
            timeout,
            max_lines,
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new("traceroute", self.timeout)
            .arg("-m")
            .arg(self.max_hops.to_string())
            .arg(&self.host)
    }

    fn interpret(&self, outcome: CommandOutcome) -> Finding {
        match outcome {
            CommandOutcome::Exited {
                success: true,
                stdout,
                ..
            } => Finding::pass("Traceroute completed:").with_details(
                stdout
                    .trim()
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .take(self.max_lines)
                    .map(|line| line.trim_end().to_string()),
            ),
            CommandOutcome::Exited { .. } => Finding::warn("Traceroute unavailable or failed"),
            CommandOutcome::TimedOut(_) => Finding::warn("Traceroute timed out - route is very slow"),
            CommandOutcome::NotFound => {
                Finding::warn("traceroute command not found (normal on some systems)")
            }
            CommandOutcome::SpawnFailed(e) => Finding::warn(format!("Traceroute error: {}", e)),
        }
    }
}

impl Probe for TracerouteProbe {
    fn title(&self) -> String {
        format!("🛣️  Traceroute to {}...", self.host)
    }

    async fn run<R: CommandRunner>(&self, runner: &R) -> Vec<Finding> {
        vec![self.interpret(runner.run(&self.command()).await)]
    }
}
