// SPDX-License-Identifier: EUPL-1.2

//! CSP Reports: violation report collector for the Content-Security-Policy
//! `report-uri` directive.
//!
//! ## Commands
//!
//! - `csp-reports serve` - Run the HTTP collector
//! - `csp-reports clean [DATE]` - Delete reports created before DATE
//! - `csp-reports summarize [--since] [--to] [--top]` - Print a report summary

use chrono::Local;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use csp_reports::{
    commands, config::Config, handlers, hooks::HookRegistry, summary::DEFAULT_TOP, AppState,
};

#[derive(Parser)]
#[command(name = "csp-reports")]
#[command(about = "Collect and summarize Content-Security-Policy violation reports")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Run the report collector (default)
    Serve,
    /// Delete old CSP reports
    Clean {
        /// Delete reports created before this date (YYYY-MM-DD).
        /// Defaults to 7 days ago.
        limit: Option<String>,
        /// Print what was deleted
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print a summary of CSP reports
    Summarize {
        /// First day of the summary (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        since: Option<String>,
        /// Last day of the summary, inclusive (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        to: Option<String>,
        /// Size of each section
        #[arg(long, default_value_t = DEFAULT_TOP as u64, value_parser = clap::value_parser!(u64).range(1..))]
        top: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "csp_reports=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Clean { limit, verbose } => {
            let (cutoff, deleted) = commands::clean(limit.as_deref(), &Local::now(), || {
                AppState::open_repository(&config)
            })
            .await?;
            if verbose {
                println!("Deleted all reports created before {cutoff} ({deleted} reports).");
            }
            Ok(())
        }
        Commands::Summarize { since, to, top } => {
            let summary = commands::summarize(
                since.as_deref(),
                to.as_deref(),
                top as usize,
                &Local::now(),
                || AppState::open_repository(&config),
            )
            .await?;
            print!("{}", summary.render());
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let hooks = HookRegistry::with_builtins();
    let state = Arc::new(AppState::connect(&config, &hooks).await?);

    tracing::info!(
        email_admins = config.pipeline.email_admins,
        log = config.pipeline.log,
        save = config.pipeline.save,
        "CSP Reports pipeline ready"
    );

    let app = handlers::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("CSP Reports listening on http://{}", config.listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
