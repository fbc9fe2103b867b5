use std::time::Duration;

use log::info;
use pgdiag_common::{Finding, Target};

use crate::probes::{CommandOutcome, CommandRunner, CommandSpec, Probe};

const LIVENESS_SQL: &str = "SELECT 1 as test;";

/// Connection test through the stock `psql` client, when installed.
pub struct PsqlProbe {
    target: Target,
    timeout: Duration,
}

impl PsqlProbe {
    pub fn new(target: Target, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    fn command(&self) -> Result<CommandSpec, url::ParseError> {
        let mut spec = CommandSpec::new("psql", self.timeout)
            .arg(self.target.connection_url()?)
            .arg("-c")
            .arg(LIVENESS_SQL);
        if let Some(password) = &self.target.password {
            spec = spec.env("PGPASSWORD", password);
        }
        Ok(spec)
    }

    fn interpret(&self, outcome: CommandOutcome) -> Finding {
        match outcome {
            CommandOutcome::Exited {
                success: true,
                stdout,
                ..
            } => Finding::pass("PostgreSQL connection SUCCEEDED")
                .with_detail(format!("Result: {}", stdout.trim())),
            CommandOutcome::Exited { stderr, code, .. } => {
                info!("psql exited with {:?}", code);
                Finding::fail("PostgreSQL connection FAILED")
                    .with_detail(format!("Error: {}", stderr.trim()))
            }
            CommandOutcome::NotFound => {
                Finding::warn("psql is not installed - cannot test the database directly")
            }
            CommandOutcome::TimedOut(timeout) => Finding::fail(format!(
                "PostgreSQL connection timed out (>{}s)",
                timeout.as_secs()
            )),
            CommandOutcome::SpawnFailed(e) => Finding::fail(format!("psql test error: {}", e)),
        }
    }
}

impl Probe for PsqlProbe {
    fn title(&self) -> String {
        "🐘 PostgreSQL connection (if psql is available)...".to_string()
    }

    async fn run<R: CommandRunner>(&self, runner: &R) -> Vec<Finding> {
        let spec = match self.command() {
            Ok(spec) => spec,
            Err(e) => {
                return vec![Finding::fail(format!(
                    "psql test error: invalid connection URL: {}",
                    e
                ))];
            }
        };
        vec![self.interpret(runner.run(&spec).await)]
    }
}
