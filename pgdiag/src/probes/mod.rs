use std::{process::Stdio, time::Duration};

use log::{debug, warn};
use pgdiag_common::Finding;
use tokio::process::Command;

pub mod builtin;

/// A single diagnostic step. Runs to completion or to its own timeout and
/// never returns an error: failures are reported as findings.
#[allow(async_fn_in_trait)]
pub trait Probe {
    fn title(&self) -> String;

    async fn run<R: CommandRunner>(&self, runner: &R) -> Vec<Finding>;
}

/// External program invocation bounded by a timeout.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Exited {
        success: bool,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    NotFound,
    TimedOut(Duration),
    SpawnFailed(String),
}

#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandOutcome;
}

/// Runs commands on the host. The child is killed if the timeout elapses.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        if which::which(&spec.program).is_err() {
            warn!("{} not found on PATH", spec.program);
            return CommandOutcome::NotFound;
        }

        debug!("Running {} {:?}", spec.program, spec.args);
        let output = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(spec.timeout, output).await {
            Err(_) => CommandOutcome::TimedOut(spec.timeout),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => CommandOutcome::NotFound,
            Ok(Err(e)) => CommandOutcome::SpawnFailed(e.to_string()),
            Ok(Ok(output)) => CommandOutcome::Exited {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
        }
    }
}
