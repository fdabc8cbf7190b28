mod config;
mod error;
mod extract;
mod fetch;
mod models;
mod output;
mod pipeline;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::fetch::NetkeibaSource;
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "racecard-etl", about = "Race entry table extraction", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Extract entry tables for the given races, one sheet per race
    Export {
        /// Race identifiers or full entry-page URLs
        #[arg(required = true)]
        race_ids: Vec<String>,

        /// Override the configured output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Fetch one page statically and print its race metadata
    Meta {
        /// Race identifier or full entry-page URL
        race_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "racecard_etl=info,warn",
        1 => "racecard_etl=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;

    match cli.command {
        Command::Export { race_ids, out } => {
            if let Some(out) = out {
                config.output.out_dir = out;
            }
            let _t = utils::Stopwatch::scope("race card export");

            let stats = Pipeline::new(config).run(&race_ids).await?;
            info!(
                "Done: {} sheets, {} rows, {} errors",
                stats.races_processed, stats.rows_written, stats.errors
            );
            for failure in &stats.failures {
                info!("[SKIP] {}", failure);
            }
        }

        Command::Meta { race_id } => {
            let source = NetkeibaSource::new(&config)?;
            let meta = source.probe_metadata(&race_id).await?;
            println!("─────────────────────────────────");
            println!("  {}", race_id);
            println!("─────────────────────────────────");
            println!("  name   : {}", or_dash(Some(meta.race_name.as_str())));
            println!("  date   : {}", or_dash(meta.race_date.as_deref()));
            println!("  venue  : {}", or_dash(meta.venue.as_deref()));
            println!("  number : {}", or_dash(meta.race_number.as_deref()));
            println!("  course : {}", or_dash(meta.course_detail.as_deref()));
            println!("  class  : {}", or_dash(meta.class_detail.as_deref()));
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}

fn or_dash(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => "—",
    }
}
