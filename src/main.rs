use anyhow::{Context, Result};
use delve::cli::{commands, output::Output, Cli};
use delve::utils::toml_config::LoggingConfig;
use delve::DelveConfig;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("delve={},warn", level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    let config = DelveConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    init_tracing(&config.logging, cli.verbose);

    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };
    if cli.verbose {
        output.banner();
    }

    commands::execute(cli.command, &config, &output).await
}
