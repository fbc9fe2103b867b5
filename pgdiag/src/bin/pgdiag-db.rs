use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use pgdiag::{
    DatabaseDiagnostics, probes::SystemRunner, report::Reporter, settings::Settings,
};

/// Direct connection test against the configured PostgreSQL database.
#[derive(Debug, Parser)]
#[command(name = "pgdiag-db")]
struct Opt {
    /// Verbose output
    #[clap(short, long, env = "PGDIAG_VERBOSE")]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if opt.verbose { "info" } else { "warn" },
    ))
    .init();

    let settings = Settings::new().context("Failed to load settings")?;
    let diagnostics = DatabaseDiagnostics::new(settings)?;

    let mut reporter = Reporter::stdout();
    let tally = diagnostics.run(&SystemRunner, &mut reporter).await?;
    info!("Exiting with {} failure(s) reported", tally.failures);

    Ok(())
}
