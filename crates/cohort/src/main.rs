//! Cohort CLI binary.
//!
//! This binary provides command-line access to the request client:
//! - Negotiate capabilities with a server
//! - Fetch a URL through the scheduler and cache
//! - Count resources matching a filter across result pages

use clap::Parser;
use cohort::{LoggingConfig, init_logging};

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands, count_resources, fetch, probe_server};

    let cli = Cli::parse();

    let logging = LoggingConfig::for_cli(cli.verbose).with_format(cli.log_format);
    #[cfg(feature = "observability")]
    let _provider = if cli.telemetry {
        Some(cohort::init_observability("cohort", &logging)?)
    } else {
        init_logging(&logging)?;
        None
    };
    #[cfg(not(feature = "observability"))]
    init_logging(&logging)?;

    let config = cli.config()?;

    match cli.command {
        Commands::Probe { server, restricted } => {
            probe_server(&config, &server, restricted).await?;
        }

        Commands::Get { server, path, cache } => {
            fetch(&config, &server, &path, cache.as_deref()).await?;
        }

        Commands::Count {
            server,
            resource,
            limit,
            has,
            page_size,
        } => {
            count_resources(&config, &server, &resource, limit, &has, page_size).await?;
        }
    }

    Ok(())
}
