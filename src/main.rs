//! CLI entry point for the rate grouper.
//!
//! Loads the attainment and employment CSVs from a file or URL, groups them
//! by race or ethnicity, and logs or writes the result as JSON.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use rate_grouper::config::Rules;
use rate_grouper::datasets::{load_cleaned_attainment_data, load_cleaned_employment_data};
use rate_grouper::loader::AnomalyPolicy;
use rate_grouper::output::{print_json, print_pretty, write_json};
use serde::Serialize;
use std::ffi::OsStr;
use std::fmt::Debug;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "rate_grouper")]
#[command(about = "Group rate CSVs by race or ethnicity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file overriding the default filtering rules
    #[arg(long, global = true)]
    rules: Option<String>,

    /// Fail on the first row with an invalid year, rate or date
    #[arg(long, global = true, default_value_t = false)]
    strict: bool,

    /// How to log the result when no output file is given
    #[arg(long, global = true, value_enum, default_value_t = Format::Json)]
    format: Format,
}

#[derive(Subcommand)]
enum Commands {
    /// Group the educational attainment dataset
    Attainment {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// JSON file to write the grouped result to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Group the employment dataset
    Employment {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// JSON file to write the grouped result to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Load and group both datasets concurrently
    All {
        /// Attainment CSV path or URL
        #[arg(long, value_name = "FILE_OR_URL")]
        attainment: String,

        /// Employment CSV path or URL
        #[arg(long, value_name = "FILE_OR_URL")]
        employment: String,

        /// Directory to write attainment.json and employment.json to
        #[arg(short = 'd', long)]
        output_dir: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/rate_grouper.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("rate_grouper.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let rules = Rules::load_or_default(cli.rules.as_deref())?;
    let policy = if cli.strict {
        AnomalyPolicy::Reject
    } else {
        rules.anomaly_policy
    };

    match cli.command {
        Commands::Attainment { source, output } => {
            let cleaned = load_cleaned_attainment_data(&source, &rules.attainment, policy).await?;
            report_anomalies("attainment", cleaned.anomalies.len());
            emit(&cleaned.groups, output.as_deref(), cli.format)?;
        }
        Commands::Employment { source, output } => {
            let cleaned = load_cleaned_employment_data(&source, &rules.employment, policy).await?;
            report_anomalies("employment", cleaned.anomalies.len());
            emit(&cleaned.groups, output.as_deref(), cli.format)?;
        }
        Commands::All {
            attainment,
            employment,
            output_dir,
        } => {
            let (attainment, employment) = tokio::try_join!(
                load_cleaned_attainment_data(&attainment, &rules.attainment, policy),
                load_cleaned_employment_data(&employment, &rules.employment, policy),
            )?;
            report_anomalies("attainment", attainment.anomalies.len());
            report_anomalies("employment", employment.anomalies.len());

            let paths = output_dir.map(|dir| {
                (
                    format!("{dir}/attainment.json"),
                    format!("{dir}/employment.json"),
                )
            });
            let (attainment_path, employment_path) = match &paths {
                Some((a, e)) => (Some(a.as_str()), Some(e.as_str())),
                None => (None, None),
            };
            emit(&attainment.groups, attainment_path, cli.format)?;
            emit(&employment.groups, employment_path, cli.format)?;
        }
    }

    Ok(())
}

fn report_anomalies(dataset: &str, count: usize) {
    if count > 0 {
        warn!(dataset, skipped = count, "Rows with invalid values were skipped");
    }
}

/// Writes `value` to `output` when given, logs it in `format` otherwise.
fn emit<T: Serialize + Debug>(value: &T, output: Option<&str>, format: Format) -> Result<()> {
    match (output, format) {
        (Some(path), _) => {
            write_json(path, value)?;
            info!(path, "Grouped result written");
        }
        (None, Format::Json) => print_json(value)?,
        (None, Format::Pretty) => print_pretty(value),
    }
    Ok(())
}
