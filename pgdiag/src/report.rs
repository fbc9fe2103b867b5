use std::io::{self, Write};

use pgdiag_common::{Finding, Status};

const BANNER_WIDTH: usize = 60;
const RULE_WIDTH: usize = 50;

/// Running count of findings by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub info: usize,
    pub warnings: usize,
    pub failures: usize,
}

impl Tally {
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.passed += 1,
            Status::Info => self.info += 1,
            Status::Warn => self.warnings += 1,
            Status::Fail => self.failures += 1,
        }
    }

    pub fn healthy(&self) -> bool {
        self.failures == 0
    }
}

/// Human-readable console report.
pub struct Reporter<W: Write> {
    out: W,
    tally: Tally,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            tally: Tally::default(),
        }
    }

    pub fn title(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out, "{}", title)?;
        self.banner()
    }

    pub fn banner(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", "=".repeat(BANNER_WIDTH))
    }

    pub fn rule(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", "-".repeat(RULE_WIDTH))
    }

    pub fn blank(&mut self) -> io::Result<()> {
        writeln!(self.out)
    }

    pub fn field(&mut self, key: &str, value: impl std::fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{}: {}", key, value)
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }

    pub fn section(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out, "\n{}", title)
    }

    pub fn finding(&mut self, finding: &Finding) -> io::Result<()> {
        self.tally.record(finding.status);
        writeln!(self.out, "{} {}", finding.status.icon(), finding.message)?;
        for detail in &finding.details {
            writeln!(self.out, "   {}", detail)?;
        }
        Ok(())
    }

    pub fn findings(&mut self, findings: &[Finding]) -> io::Result<()> {
        findings.iter().try_for_each(|f| self.finding(f))
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
