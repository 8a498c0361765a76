#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the weather ingestion pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use weather_ingest::{JsonlSink, Pipeline};
use weather_ingest_cli_utils::{IndicatifProgress, MultiProgress};
use weather_ingest_config::{PipelineSettings, resolve};
use weather_ingest_database::DuckDbWarehouse;
use weather_ingest_models::LogicalDate;
use weather_ingest_source::{OpenMeteoClient, WeatherClient};

#[derive(Parser)]
#[command(name = "weather_ingest", about = "Daily Open-Meteo weather ingestion")]
struct Cli {
    /// Pipeline settings file (TOML). Defaults to `$WEATHER_INGEST_CONFIG`,
    /// then to built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one logical date
    Run {
        /// Logical date (YYYY-MM-DD). Defaults to yesterday (UTC).
        #[arg(long)]
        date: Option<LogicalDate>,
    },
    /// Ingest every date in an inclusive range, oldest first
    Backfill {
        /// First logical date (YYYY-MM-DD)
        #[arg(long)]
        from: LogicalDate,
        /// Last logical date (YYYY-MM-DD)
        #[arg(long)]
        to: LogicalDate,
    },
    /// Send one availability probe to the weather API
    CheckApi,
    /// Print the resolved city roster and storage locations
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = weather_ingest_cli_utils::init_logger();
    let cli = Cli::parse();
    let settings = PipelineSettings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { date } => {
            let date = match date {
                Some(date) => date,
                None => LogicalDate::new(chrono::Utc::now().date_naive())
                    .previous()
                    .ok_or("no date precedes today")?,
            };

            let pipeline = build_pipeline(&settings, &multi)?;
            let report = pipeline.run(date).await?;
            println!("{}: {} ({})", report.logical_date, report.summary, report.state);
        }
        Commands::Backfill { from, to } => {
            if from > to {
                return Err(format!("--from {from} is after --to {to}").into());
            }

            let days = (to.date() - from.date()).num_days() + 1;
            let dates = IndicatifProgress::dates_bar(
                &multi,
                "Backfill",
                u64::try_from(days).unwrap_or(0),
            );

            let pipeline = build_pipeline(&settings, &multi)?;
            let report = pipeline
                .backfill_with_progress(from, to, dates.as_ref())
                .await;

            for (date, outcome) in &report.outcomes {
                match outcome {
                    Ok(run) => println!("{date}: {}", run.summary),
                    Err(e) => println!("{date}: FAILED: {e}"),
                }
            }

            let failed = report.failed();
            if !failed.is_empty() {
                return Err(format!(
                    "{} of {} dates failed",
                    failed.len(),
                    report.outcomes.len()
                )
                .into());
            }
        }
        Commands::CheckApi => {
            let client =
                OpenMeteoClient::new(&settings.api.base_url, settings.api.request_timeout())?;
            if client.probe().await? {
                println!("{} is available", client.forecast_url());
            } else {
                return Err(format!("{} is not available", client.forecast_url()).into());
            }
        }
        Commands::Config => {
            let store = settings.variable_store();
            let resolved = resolve(&store)?;

            println!("Raw base:   {}", resolved.raw_base.display());
            println!("Warehouse:  {}", settings.warehouse.path.display());
            println!("Signal log: {}", settings.signal.events_path.display());
            println!("API:        {}", settings.api.base_url);
            println!();
            println!("{:<24} {:>10} {:>10}", "CITY", "LAT", "LON");
            println!("{}", "-".repeat(46));
            for city in &resolved.cities {
                println!("{:<24} {:>10.4} {:>10.4}", city.name, city.lat, city.lon);
            }
        }
    }

    Ok(())
}

fn build_pipeline(
    settings: &PipelineSettings,
    multi: &MultiProgress,
) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let client = OpenMeteoClient::new(&settings.api.base_url, settings.api.request_timeout())?;
    let warehouse = DuckDbWarehouse::open(&settings.warehouse.path)?;
    let sink = JsonlSink::new(settings.signal.events_path.clone());

    Ok(Pipeline::new(
        Arc::new(client),
        Arc::new(settings.variable_store()),
        Arc::new(warehouse),
        Arc::new(sink),
    )
    .with_settings(settings)
    .with_progress(IndicatifProgress::cities_bar(multi, "Fetching")))
}
