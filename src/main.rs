use anyhow::Context;
use clap::Parser;

mod cli;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("fleet error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = fleet_manager::config::init().context("failed to load configuration")?;
    init_tracing(cli.quiet, cli.verbose, config.fleet_log.as_deref())?;

    cli::dispatch::run(cli, config).await
}

fn init_tracing(quiet: bool, verbose: bool, directives: Option<&str>) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    // --quiet and --verbose win over FLEET_LOG.
    let filter = match directives {
        Some(directives) if !quiet && !verbose => tracing_subscriber::EnvFilter::try_new(directives)
            .with_context(|| format!("invalid FLEET_LOG directives '{directives}'"))?,
        _ => tracing_subscriber::EnvFilter::new(level),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
