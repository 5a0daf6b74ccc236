//! CLI command definitions.

use clap::{Parser, Subcommand};
use cohort::{CohortConfig, CohortResult, LogFormat};
use std::path::PathBuf;

/// Cohort - batched, cached, rate-adaptive FHIR client
#[derive(Parser, Debug)]
#[command(name = "cohort")]
#[command(about = "Batched, cached, rate-adaptive FHIR client", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log line format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Configuration file, instead of the layered lookup
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Export spans to stdout through OpenTelemetry
    #[cfg(feature = "observability")]
    #[arg(long, global = true)]
    pub telemetry: bool,
}

impl Cli {
    /// Configuration from `--config`, else the layered lookup.
    pub fn config(&self) -> CohortResult<CohortConfig> {
        match &self.config {
            Some(path) => CohortConfig::from_file(path),
            None => CohortConfig::load(),
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Negotiate capabilities and print the server's features
    Probe {
        /// Base URL of the FHIR server
        server: String,

        /// Only run probes that need no elevated access
        #[arg(long)]
        restricted: bool,
    },

    /// GET a path and print the JSON response
    Get {
        /// Base URL of the FHIR server
        server: String,

        /// Path relative to the server, e.g. `Patient?_count=5`
        path: String,

        /// Durable cache to read through
        #[arg(long)]
        cache: Option<String>,
    },

    /// Collect resources having a field, walking result pages
    Count {
        /// Base URL of the FHIR server
        server: String,

        /// Search URL relative to the server, e.g. `Patient?gender=female`
        resource: String,

        /// Stop once this many resources are kept
        #[arg(long, default_value = "100")]
        limit: usize,

        /// Top-level field a resource must have to be kept
        #[arg(long)]
        has: String,

        /// Page size requested from the server
        #[arg(long, default_value = "50")]
        page_size: usize,
    },
}
