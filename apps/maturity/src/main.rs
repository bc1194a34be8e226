//! # Maturity - DevOps Maturity Assessments
//!
//! The operator binary for the maturity assessment engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               apps/maturity (THE BINARY)             │
//! │                                                      │
//! │   ┌──────────────┐          ┌───────────────────┐    │
//! │   │  CLI (clap)  │─────────▶│ config (toml/env) │    │
//! │   └──────┬───────┘          └───────────────────┘    │
//! │          ▼                                           │
//! │   ┌───────────────┐        ┌────────────────────┐    │
//! │   │ maturity-core │───────▶│ redb + catalog JSON│    │
//! │   │  (THE LOGIC)  │        └────────────────────┘    │
//! │   └───────────────┘                                  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! maturity init
//! maturity team create --name Platform
//! maturity member team --user 1 --team 1 --role editor
//! maturity session issue --user 1
//! maturity assessment start --token <TOKEN> --team 1
//! maturity assessment save --token <TOKEN> --id 1 --section culture --select S2-Q1=S2-Q1-A1
//! maturity assessment complete --token <TOKEN> --id 1
//! maturity assessment export --token <TOKEN> --id 1 --output results.csv
//! ```

use clap::Parser;
use maturity::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Configuration errors are reported before logging exists.
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let default_filter = if cli.verbose {
        "maturity=debug,maturity_core=debug"
    } else {
        "maturity=info,maturity_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // MATURITY_LOG_FORMAT=json (or log_format in the config) enables
    // machine-parseable output.
    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!(kind = ?e.kind(), "Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner to stderr so stdout stays clean for exports.
fn print_banner() {
    eprintln!(
        "maturity v{} - DevOps maturity assessments",
        env!("CARGO_PKG_VERSION")
    );
}
