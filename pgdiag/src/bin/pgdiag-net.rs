use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use pgdiag::{
    NetworkDiagnostics, probes::SystemRunner, report::Reporter, settings::Settings,
};

/// Network-layer connectivity diagnostics for the configured PostgreSQL host.
#[derive(Debug, Parser)]
#[command(name = "pgdiag-net")]
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
    let diagnostics = NetworkDiagnostics::new(settings)?;

    let mut reporter = Reporter::stdout();
    let tally = diagnostics.run(&SystemRunner, &mut reporter).await?;
    info!("Exiting with {} failure(s) reported", tally.failures);

    Ok(())
}
