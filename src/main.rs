mod server;
mod solar;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::solar::SampleInterval;
use crate::solar::document::{PipelineConfig, SolarDocument, build_document};
use crate::solar::ingest::{CsvLayout, DEFAULT_POWER_COLUMN, DEFAULT_TIME_COLUMN, load_samples};
use crate::solar::key_dates::KeyDayRule;
use crate::solar::operators::{DEFAULT_OPERATOR, get_operator, list_operators};

#[derive(Parser)]
#[command(name = "solar-year", version, about = "Daily solar energy totals and curves from grid-operator telemetry")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the year document and write it as JSON
    Generate {
        #[command(flatten)]
        pipeline: PipelineArgs,
        /// Destination of the JSON document
        #[arg(short, long, env = "SOLAR_OUTPUT", default_value = "public/data/solar_animation.json")]
        output: PathBuf,
    },
    /// Build the year document and serve it over HTTP
    Serve {
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[arg(long, env = "SOLAR_BIND", default_value = "0.0.0.0:3044")]
        bind: String,
    },
    /// List known grid operators
    Operators,
}

#[derive(Args)]
struct PipelineArgs {
    /// CSV export with one row per reading
    #[arg(short, long, env = "SOLAR_INPUT")]
    input: PathBuf,
    /// Grid operator whose local clock defines the day
    #[arg(long, env = "SOLAR_OPERATOR", default_value = DEFAULT_OPERATOR)]
    operator: String,
    /// IANA timezone; overrides the operator's
    #[arg(long, env = "SOLAR_TIMEZONE")]
    timezone: Option<String>,
    /// Sampling cadence; defaults to the operator's
    #[arg(long, env = "SOLAR_INTERVAL_MINUTES")]
    interval_minutes: Option<u32>,
    /// Local year to report; inferred when omitted
    #[arg(long, env = "SOLAR_YEAR")]
    year: Option<i32>,
    #[arg(long, env = "SOLAR_TIME_COLUMN", default_value = DEFAULT_TIME_COLUMN)]
    time_column: String,
    #[arg(long, env = "SOLAR_POWER_COLUMN", default_value = DEFAULT_POWER_COLUMN)]
    power_column: String,
    /// JSON file of key-date rules, in output order
    #[arg(long, env = "SOLAR_KEY_DATES")]
    key_dates: Option<PathBuf>,
}

impl PipelineArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let operator = match get_operator(&self.operator) {
            Some(op) => op,
            None => bail!("Unknown grid operator: {}", self.operator),
        };

        let timezone = self
            .timezone
            .clone()
            .unwrap_or_else(|| operator.timezone.to_string());
        let interval = SampleInterval::new(
            self.interval_minutes
                .unwrap_or(operator.fuel_mix_interval_minutes),
        )?;

        let key_dates = match &self.key_dates {
            Some(path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("Failed to open key-date file {}", path.display()))?;
                let rules: Vec<KeyDayRule> = serde_json::from_reader(file)
                    .with_context(|| format!("Invalid key-date file {}", path.display()))?;
                Some(rules)
            }
            None => None,
        };

        Ok(PipelineConfig {
            timezone,
            interval,
            year: self.year,
            key_dates,
        })
    }

    fn layout(&self) -> CsvLayout {
        CsvLayout {
            time_column: self.time_column.clone(),
            power_column: self.power_column.clone(),
        }
    }

    async fn run(&self) -> Result<SolarDocument> {
        let config = self.config()?;
        let series = load_samples(&self.input, &self.layout())
            .with_context(|| format!("Failed to load {}", self.input.display()))?;
        let document = build_document(&series, &config).await?;
        Ok(document)
    }
}

fn print_summary(document: &SolarDocument) {
    println!("Sample daily_totals (first 3 days):");
    for total in document.daily_totals.iter().take(3) {
        println!(
            "  {} | {:>10.0} MWh | index {} | {}/{} readings ({:.0}%)",
            total.date,
            total.total_energy,
            total.day_index,
            total.sample_count,
            total.expected_samples,
            total.completeness() * 100.0
        );
    }

    println!("\nKey dates:");
    for key_date in &document.key_dates {
        println!("  {}: {}", key_date.date, key_date.label);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Generate { pipeline, output } => {
            let document = pipeline.run().await?;
            let size = document
                .write_to_path(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!(
                megabytes = size as f64 / 1024.0 / 1024.0,
                "Data generation complete"
            );
            print_summary(&document);
        }
        Command::Serve { pipeline, bind } => {
            let document = pipeline.run().await?;
            server::start_server(document, &bind).await?;
        }
        Command::Operators => {
            for operator in list_operators() {
                println!("{operator}");
            }
        }
    }

    Ok(())
}
