use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

mod aggregate;
mod config;
mod error;
mod models;
mod pipeline;
mod projection;
mod report;
mod schema;
mod trend;

use config::{RoundingMode, Settings};
use report::Report;

#[derive(Parser)]
#[command(name = "content-decay")]
#[command(about = "Monthly click trends and decay detection for web analytics exports", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the per-page monthly report
    Report {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print classification counts and the top pages
    Summary {
        #[command(flatten)]
        run: RunArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Analytics export with page, date and clicks columns
    #[arg(long)]
    csv: PathBuf,
    /// Date treated as "now" when projecting the current month
    #[arg(long)]
    as_of: Option<NaiveDate>,
    #[arg(long, allow_hyphen_values = true)]
    decline_threshold: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    improve_threshold: Option<f64>,
    /// half-even or half-up
    #[arg(long)]
    rounding: Option<RoundingMode>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Csv,
    Json,
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("content_decay=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn build_report(run: &RunArgs) -> anyhow::Result<Report> {
    let settings = Settings::from_env()
        .and_then(|s| s.with_overrides(run.decline_threshold, run.improve_threshold, run.rounding))
        .map_err(|e| anyhow::anyhow!(e))?;
    let as_of = run.as_of.unwrap_or_else(|| Utc::now().date_naive());

    let file = std::fs::File::open(&run.csv)
        .with_context(|| format!("failed to open {}", run.csv.display()))?;
    let report = pipeline::run(file, as_of, &settings)
        .with_context(|| format!("failed to process {}", run.csv.display()))?;
    Ok(report)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    match cli.command {
        Commands::Report {
            run,
            format,
            out,
            limit,
        } => {
            let report = build_report(&run)?;
            if report.is_empty() {
                println!("No rows found in {}.", run.csv.display());
                return Ok(());
            }

            let rendered = match format {
                Format::Markdown => report
                    .to_markdown(&run.csv.display().to_string(), limit)
                    .into_bytes(),
                Format::Csv => report.to_csv()?,
                Format::Json => serde_json::to_vec_pretty(&report.to_json())?,
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => {
                    use std::io::Write;
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&rendered)?;
                    stdout.flush()?;
                }
            }
        }
        Commands::Summary { run, limit } => {
            let report = build_report(&run)?;
            if report.is_empty() {
                println!("No rows found in {}.", run.csv.display());
                return Ok(());
            }

            let summary = report.summary();
            println!(
                "{} pages: {} declining, {} stable, {} improving (average trend {:.1}%)",
                report.rows.len(),
                summary.declining,
                summary.stable,
                summary.improving,
                summary.average_trend
            );

            println!("Top pages by clicks:");
            for row in report.top_by_total(limit) {
                println!(
                    "- {} {} clicks, trend {:.1}% ({})",
                    row.page, row.total_clicks, row.trend_percentage, row.classification
                );
            }

            let declining = report.top_declining(limit);
            if !declining.is_empty() {
                println!("Most declining pages:");
                for row in declining {
                    println!(
                        "- {} trend {:.1}% across {} clicks",
                        row.page, row.trend_percentage, row.total_clicks
                    );
                }
            }
        }
    }

    Ok(())
}
