//! Aggregation pipeline: turn the raw input tables into the derived tables

use crate::{
    aggregate::Join,
    config::Config,
    gate::{self, StageOutcome},
    output,
    processed::ProcessedBook,
    progress::ProgressReport,
    records::{self, CleanReviewRecord, Loaded, MetadataRecord, ReviewRecord, Sentiment},
    tables::Tables,
    Result,
};
use anyhow::Context;
use std::fmt;

/// What a pipeline run did
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    /// Number of rows in the processed metadata table
    pub processed_rows: usize,

    /// Number of processed rows with a usable publication date
    pub dated_rows: usize,

    /// Number of input rows that were rejected, per input table
    pub rejected: Rejections,

    /// Number of clean reviews in each sentiment class
    pub sentiments: SentimentCounts,
}
//
impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Processed metadata rows: {}", self.processed_rows)?;
        writeln!(
            f,
            "Rows with a publication date: {} ({} left out of yearly tables)",
            self.dated_rows,
            self.processed_rows - self.dated_rows
        )?;
        writeln!(
            f,
            "Rejected input rows: {} metadata, {} reviews, {} clean reviews",
            self.rejected.metadata, self.rejected.reviews, self.rejected.clean_reviews
        )?;
        write!(
            f,
            "Clean review sentiments: {} negative, {} neutral, {} positive",
            self.sentiments.negative, self.sentiments.neutral, self.sentiments.positive
        )
    }
}

/// Number of rejected input rows per input table
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Rejections {
    pub metadata: usize,
    pub reviews: usize,
    pub clean_reviews: usize,
}

/// Number of clean reviews per sentiment class
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SentimentCounts {
    pub negative: usize,
    pub neutral: usize,
    pub positive: usize,
}
//
impl SentimentCounts {
    /// Count the sentiment classes of a set of clean reviews
    pub fn new<'a>(reviews: impl IntoIterator<Item = &'a CleanReviewRecord>) -> Self {
        let mut counts = Self::default();
        for review in reviews {
            match review.sentiment_rating {
                Sentiment::Negative => counts.negative += 1,
                Sentiment::Neutral => counts.neutral += 1,
                Sentiment::Positive => counts.positive += 1,
            }
        }
        counts
    }
}

/// Run the pipeline, unless all of its outputs already exist
pub async fn process(config: &Config, report: &ProgressReport) -> Result<StageOutcome<Summary>> {
    if !gate::must_run("aggregation", &config.layout.outputs(), config.force).await? {
        return Ok(StageOutcome::Skipped);
    }
    run(config, report).await.map(StageOutcome::Ran)
}

/// Run the pipeline unconditionally
pub async fn run(config: &Config, report: &ProgressReport) -> Result<Summary> {
    // Make sure that the inputs are there before doing anything
    let layout = &config.layout;
    let missing = gate::missing(&layout.inputs()).await?;
    anyhow::ensure!(
        missing.is_empty(),
        "input file(s) {} are missing, please acquire them first",
        missing
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // Load the input tables
    let loading = report.stage("Loading input tables", 3);
    let (metadata, reviews, clean_reviews) = futures::try_join!(
        load_tracked::<MetadataRecord>(layout.metadata(), &loading),
        load_tracked::<ReviewRecord>(layout.reviews(), &loading),
        load_tracked::<CleanReviewRecord>(layout.clean_reviews(), &loading),
    )?;
    let rejected = Rejections {
        metadata: metadata.rejected,
        reviews: reviews.rejected,
        clean_reviews: clean_reviews.rejected,
    };
    let sentiments = SentimentCounts::new(&clean_reviews.rows);
    drop(clean_reviews);

    // Normalize publication dates
    let books = metadata
        .rows
        .into_iter()
        .map(|record| ProcessedBook::new(record, &config.default_format))
        .collect::<Vec<_>>();
    let dated_rows = books.iter().filter(|book| book.published_date.is_some()).count();
    log::info!(
        "{dated_rows} out of {} books have a usable publication date",
        books.len()
    );

    // Join with reviews and aggregate
    let aggregating = report.stage("Aggregating", 1);
    let join = Join::new(&books, &reviews.rows);
    let tables = Tables::build(&join);
    aggregating.make_progress(1);

    // Write down the results
    let writing = report.stage("Writing output tables", output::OutputTable::ALL.len());
    output::persist(layout, &books, &tables, &writing)
        .await
        .context("writing the output tables")?;
    Ok(Summary {
        processed_rows: books.len(),
        dated_rows,
        rejected,
        sentiments,
    })
}

/// Load an input table, tracking progress
async fn load_tracked<T: records::Record>(
    path: std::path::PathBuf,
    loading: &crate::progress::ProgressTracker,
) -> Result<Loaded<T>> {
    let loaded = records::load::<T>(&path).await?;
    loading.make_progress(1);
    Ok(loaded)
}
