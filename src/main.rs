//! This program turns a public e-commerce book dataset (book metadata,
//! customer reviews and sentiment-labelled reviews, as published on Kaggle)
//! into pre-aggregated tables that a sales dashboard can read directly.
//!
//! Each stage is skipped when the files that it produces already exist, so
//! running the program twice in a row only does work once.

mod acquire;
mod aggregate;
mod config;
mod date;
mod gate;
mod output;
mod pipeline;
mod processed;
mod progress;
mod records;
mod report;
mod sources;
mod tables;

use crate::{
    config::Config,
    gate::{FileStatus, StageOutcome},
    pipeline::Summary,
    progress::ProgressReport,
    report::{AuthorInsights, Dashboard, Measure, Overview, ReviewFilter, Session},
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::{num::NonZeroUsize, path::PathBuf, sync::Arc};
use unicase::UniCase;

/// Book sales dataset aggregator
///
/// Fetches the book metadata and review files, normalizes publication dates,
/// joins books with their reviews and writes yearly summary tables (totals,
/// genres, formats, top books, authors and publishers) as CSV files.
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// Directory where input files are stored and output files are written
    #[arg(long, env = "BOOKSTATS_DATASET_DIR", default_value = "./dataset", global = true)]
    dataset_dir: PathBuf,

    /// URL of a remote dataset file
    ///
    /// `{dataset}` is replaced with the dataset identifier, and `{file}` with
    /// the name of the file within that dataset.
    #[arg(
        long,
        env = "BOOKSTATS_REMOTE_URL",
        default_value = "https://www.kaggle.com/api/v1/datasets/download/{dataset}/{file}",
        global = true
    )]
    remote_url: Box<str>,

    /// Copy missing input files from this directory instead of downloading
    /// them
    ///
    /// Files are looked up under the name that they have on the remote host.
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// User name for the remote dataset host
    #[arg(long, env = "KAGGLE_USERNAME", global = true)]
    kaggle_username: Option<Box<str>>,

    /// API key for the remote dataset host
    #[arg(long, env = "KAGGLE_KEY", hide_env_values = true, global = true)]
    kaggle_key: Option<Box<str>>,

    /// Format label of books whose format is not specified
    #[arg(long, default_value = "Unknown", global = true)]
    default_format: Box<str>,

    /// Run stages even if all of their output files already exist
    #[arg(short, long, default_value_t = false, global = true)]
    force: bool,

    /// What should be done (by default, acquire inputs then process them)
    #[command(subcommand)]
    command: Option<Command>,
}
//
impl Args {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> Result<Self> {
        // Decode CLI arguments
        let args = Args::parse();

        // Check CLI arguments for basic sanity
        anyhow::ensure!(
            !args.default_format.trim().is_empty(),
            "the default book format label should not be blank"
        );
        anyhow::ensure!(
            args.remote_url.contains("{file}"),
            "the remote URL template should contain a {{file}} placeholder"
        );
        if args.kaggle_username.is_some() != args.kaggle_key.is_some() {
            log::warn!("Only one of the dataset host username and key is set, they will be ignored");
        }
        match &args.command {
            Some(Command::Report(report)) => {
                if let (Some(first), Some(last)) = (report.first_year, report.last_year) {
                    anyhow::ensure!(
                        first <= last,
                        "requested year range {first}..={last} contains no year"
                    );
                }
            }
            Some(Command::Authors(authors)) => {
                if let (Some(first), Some(last)) = (authors.first_day, authors.last_day) {
                    anyhow::ensure!(
                        first <= last,
                        "requested date range {first}..={last} contains no day"
                    );
                }
            }
            _ => {}
        }
        Ok(args)
    }
}

/// Program operations
#[derive(Subcommand, Debug)]
enum Command {
    /// Acquire the input files, then process them
    Run,

    /// Fetch input files which are missing
    Acquire {
        /// Only consider this remote dataset (e.g. "tobypu/book-reviews-clean")
        #[arg(long)]
        only: Option<Box<str>>,
    },

    /// Compute the output tables from the input files
    Process,

    /// Show which input and output files exist, and when they were written
    Status,

    /// Display the top entities and totals from the output tables
    Report(ReportArgs),

    /// Display the sentiment of reviews and the most helpful ones
    Authors(AuthorArgs),
}

/// Options of the report command
#[derive(clap::Args, Debug)]
struct ReportArgs {
    /// First publication year of interest
    #[arg(long = "from")]
    first_year: Option<Year>,

    /// Last publication year of interest
    #[arg(long = "to")]
    last_year: Option<Year>,

    /// Only consider books of this genre (case-insensitive)
    #[arg(short, long, conflicts_with = "pick_genre")]
    genre: Option<Box<str>>,

    /// Interactively pick the genre of interest
    #[arg(long, default_value_t = false)]
    pick_genre: bool,

    /// Measure that entities are ranked by
    #[arg(short, long, value_enum, default_value = "sales")]
    measure: Measure,

    /// Number of entities shown in each ranking
    #[arg(short = 'n', long, default_value = "10")]
    limit: NonZeroUsize,

    /// Run the pipeline without asking if output files are missing
    #[arg(short, long, default_value_t = false)]
    yes: bool,
}

/// Options of the authors command
#[derive(clap::Args, Debug)]
struct AuthorArgs {
    /// Only consider reviews of books by this author (case-insensitive, can
    /// be repeated)
    #[arg(short, long = "author")]
    authors: Vec<Box<str>>,

    /// Only consider reviews of books of this genre (case-insensitive, can be
    /// repeated)
    #[arg(short, long = "genre")]
    genres: Vec<Box<str>>,

    /// First review day of interest (YYYY-MM-DD)
    #[arg(long = "from")]
    first_day: Option<NaiveDate>,

    /// Last review day of interest (YYYY-MM-DD)
    #[arg(long = "to")]
    last_day: Option<NaiveDate>,

    /// Fetch the reviews without asking if they are missing
    #[arg(short, long, default_value_t = false)]
    yes: bool,
}
//
#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    setup_logging().map_err(|e| anyhow::format_err!("{e}"))?;

    // Decode CLI arguments
    let args = Args::parse_and_check()?;
    let config = Config::new(&args);

    // Do what was asked
    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            if let Some(summary) = run_all(config).await? {
                println!("{summary}");
            }
        }
        Command::Acquire { only } => {
            let report = ProgressReport::new();
            let outcome = match only {
                Some(id) => {
                    let dataset = sources::get(&id)?;
                    acquire::acquire_datasets(config, std::slice::from_ref(dataset), &report).await?
                }
                None => acquire::acquire(config, &report).await?,
            };
            match outcome {
                StageOutcome::Skipped => println!("All input files are already there"),
                StageOutcome::Ran(fetched) => {
                    for path in fetched {
                        println!("Fetched {}", path.display());
                    }
                }
            }
        }
        Command::Process => {
            let report = ProgressReport::new();
            print_outcome(pipeline::process(&config, &report).await?);
        }
        Command::Status => print_status(&config).await?,
        Command::Report(report_args) => show_report(config, report_args).await?,
        Command::Authors(author_args) => show_authors(config, author_args).await?,
    }
    Ok(())
}

/// Acquire missing inputs, then process them if some outputs are missing
async fn run_all(config: Arc<Config>) -> Result<Option<Summary>> {
    let report = ProgressReport::new();
    acquire::acquire(config.clone(), &report).await?;
    match pipeline::process(&config, &report).await? {
        StageOutcome::Skipped => {
            println!("All output files are already there, use --force to recompute them");
            Ok(None)
        }
        StageOutcome::Ran(summary) => Ok(Some(summary)),
    }
}

/// Display the outcome of the aggregation stage
fn print_outcome(outcome: StageOutcome<Summary>) {
    match outcome {
        StageOutcome::Skipped => {
            println!("All output files are already there, use --force to recompute them")
        }
        StageOutcome::Ran(summary) => println!("{summary}"),
    }
}

/// Display the state of the input and output files
async fn print_status(config: &Config) -> Result<()> {
    let inputs = gate::status(&config.layout.inputs()).await?;
    let outputs = gate::status(&config.layout.outputs()).await?;
    println!("Input files:");
    inputs.iter().for_each(print_file_status);
    println!("Output files:");
    outputs.iter().for_each(print_file_status);
    match gate::fingerprint(&outputs) {
        Some(fingerprint) => println!("Outputs last updated {}", format_time(fingerprint)),
        None => println!("Some outputs are missing, the next run will compute them"),
    }
    if gate::outputs_predate_inputs(&inputs, &outputs) {
        println!("Some outputs are older than the inputs, consider rerunning with --force");
    }
    Ok(())
}

/// Display the state of a single file
fn print_file_status(file: &FileStatus) {
    match file.modified {
        Some(modified) => println!("  {}  (modified {})", file.path.display(), format_time(modified)),
        None => println!("  {}  (missing)", file.path.display()),
    }
}

/// Format a file modification time
fn format_time(time: std::time::SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string()
}

/// Display the top entities and totals from the output tables
async fn show_report(config: Arc<Config>, args: ReportArgs) -> Result<()> {
    // Make sure that the output files are there
    let missing = gate::missing(&config.layout.outputs()).await?;
    if !missing.is_empty() {
        if !report::offer_pipeline_run(&missing, args.yes) {
            log::info!("Report cancelled since output files are missing");
            return Ok(());
        }
        if let Some(summary) = run_all(config.clone()).await? {
            println!("{summary}\n");
        }
    }

    // Load the output tables and set up the session
    let dashboard = Dashboard::load(&config.layout).await?;
    let mut session = Session {
        first_year: args.first_year,
        last_year: args.last_year,
        genre: args.genre.map(UniCase::new),
        measure: args.measure,
        limit: args.limit,
    };
    if args.pick_genre {
        session.genre = report::prompt_genre(&dashboard, &session)?.map(UniCase::new);
    }

    // Display the report
    print!("{}", Overview { session: &session, dashboard: &dashboard });
    Ok(())
}

/// Display the author insights from the sentiment-labelled reviews
async fn show_authors(config: Arc<Config>, args: AuthorArgs) -> Result<()> {
    // Make sure that the reviews are there
    let missing = gate::missing(&[config.layout.clean_reviews()]).await?;
    if !missing.is_empty() {
        if !report::offer_pipeline_run(&missing, args.yes) {
            log::info!("Author insights cancelled since the reviews are missing");
            return Ok(());
        }
        if let Some(summary) = run_all(config.clone()).await? {
            println!("{summary}\n");
        }
    }

    // Select the reviews and display the insights
    let reviews = report::load_reviews(&config.layout).await?;
    let filter = ReviewFilter {
        authors: args.authors.into_iter().map(UniCase::new).collect(),
        genres: args.genres.into_iter().map(UniCase::new).collect(),
        first_day: args.first_day,
        last_day: args.last_day,
    };
    print!("{}", AuthorInsights::new(&filter, &reviews));
    Ok(())
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Year of Gregorian Calendar
pub type Year = i32;

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}
