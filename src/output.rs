//! Output files of the aggregation pipeline
//!
//! Every table is first staged to a temporary file next to its final
//! location, and only once all of them have been written successfully are
//! they renamed into place. If staging fails, the staged files are removed and
//! existing outputs are left untouched. If a rename fails, the outputs that
//! were already moved stay in place and the staged files that were not are
//! removed, so no temporary file is left behind.

use crate::{
    config::DatasetLayout,
    processed::ProcessedBook,
    progress::ProgressTracker,
    records::Record,
    tables::{
        FormatRow, GenreRow, ScorecardRow, Tables, TopAuthorRow, TopBookRow, TopPublisherRow,
    },
    Result,
};
use anyhow::Context;
use csv_async::AsyncWriterBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};

/// Output table of the pipeline
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum OutputTable {
    ProcessedMetadata,
    Scorecard,
    Genre,
    Format,
    TopBooks,
    TopAuthors,
    TopPublishers,
}
//
impl OutputTable {
    /// Every output table, in the order where they are written
    pub const ALL: [Self; 7] = [
        Self::ProcessedMetadata,
        Self::Scorecard,
        Self::Genre,
        Self::Format,
        Self::TopBooks,
        Self::TopAuthors,
        Self::TopPublishers,
    ];

    /// Name of the file within the dataset directory
    pub fn file_name(self) -> &'static str {
        match self {
            Self::ProcessedMetadata => "processed_metadata.csv",
            Self::Scorecard => "scorecard_data.csv",
            Self::Genre => "genre_data.csv",
            Self::Format => "format_data.csv",
            Self::TopBooks => "top_books_data.csv",
            Self::TopAuthors => "top_authors_data.csv",
            Self::TopPublishers => "top_publishers_data.csv",
        }
    }
}

/// Row type of an output table
pub trait OutputRow: Record + Serialize {
    /// Which table this is a row of
    const OUTPUT: OutputTable;

    /// Column names, in file order
    const COLUMNS: &'static [&'static str];
}

/// Declare the output schema of a row type
///
/// The column list doubles as the required header when the file is read back.
macro_rules! output_row {
    ($row:ty, $output:expr, $table:literal, [$($column:literal),* $(,)?]) => {
        impl Record for $row {
            const TABLE: &'static str = $table;
            const REQUIRED_COLUMNS: &'static [&'static str] = &[$($column),*];
        }
        //
        impl OutputRow for $row {
            const OUTPUT: OutputTable = $output;
            const COLUMNS: &'static [&'static str] = &[$($column),*];
        }
    };
}

output_row!(
    ProcessedBook,
    OutputTable::ProcessedMetadata,
    "processed metadata",
    [
        "parent_asin",
        "title",
        "author_name",
        "publisher",
        "price",
        "price_numeric",
        "page_count",
        "category_level_1",
        "category_level_2",
        "category_level_3_detail",
        "book_format",
        "date_str",
        "published_date",
    ]
);
output_row!(
    ScorecardRow,
    OutputTable::Scorecard,
    "scorecard",
    ["year", "total_books", "total_reviews", "total_sales"]
);
output_row!(
    GenreRow,
    OutputTable::Genre,
    "genre",
    ["year", "genre", "book_count", "review_count", "total_sales"]
);
output_row!(
    FormatRow,
    OutputTable::Format,
    "format",
    [
        "year",
        "book_format",
        "genre",
        "book_count",
        "total_reviews",
        "total_sales",
        "avg_price",
    ]
);
output_row!(
    TopBookRow,
    OutputTable::TopBooks,
    "top books",
    [
        "year",
        "title",
        "author_name",
        "genre",
        "book_count",
        "total_reviews",
        "total_sales",
    ]
);
output_row!(
    TopAuthorRow,
    OutputTable::TopAuthors,
    "top authors",
    ["year", "author_name", "book_count", "total_reviews", "total_sales"]
);
output_row!(
    TopPublisherRow,
    OutputTable::TopPublishers,
    "top publishers",
    [
        "year",
        "publisher",
        "genre",
        "book_count",
        "total_reviews",
        "total_sales",
    ]
);

/// Write the whole output set, or nothing at all
pub async fn persist(
    layout: &DatasetLayout,
    processed: &[ProcessedBook],
    tables: &Tables,
    progress: &ProgressTracker,
) -> Result<()> {
    // Stage every table into a temporary file
    let mut staging = Staging::default();
    let staged = async {
        staging.write(layout, processed, progress).await?;
        staging.write(layout, &tables.scorecard, progress).await?;
        staging.write(layout, &tables.genre, progress).await?;
        staging.write(layout, &tables.format, progress).await?;
        staging.write(layout, &tables.top_books, progress).await?;
        staging.write(layout, &tables.top_authors, progress).await?;
        staging.write(layout, &tables.top_publishers, progress).await
    }
    .await;
    if let Err(e) = staged {
        staging.discard().await;
        return Err(e);
    }

    // Move the staged files into place
    staging.commit().await
}

/// Output files which have been written to a temporary location
#[derive(Debug, Default)]
struct Staging {
    /// Temporary and final location of each staged file
    files: Vec<(PathBuf, PathBuf)>,
}
//
impl Staging {
    /// Stage an output table
    async fn write<R: OutputRow>(
        &mut self,
        layout: &DatasetLayout,
        rows: &[R],
        progress: &ProgressTracker,
    ) -> Result<()> {
        let path = layout.output(R::OUTPUT);
        let temp = temp_path(&path);
        self.files.push((temp.clone(), path));
        write_table(&temp, rows)
            .await
            .with_context(|| format!("writing {} table to {}", R::TABLE, temp.display()))?;
        log::debug!("Staged {} rows of {} table at {}", rows.len(), R::TABLE, temp.display());
        progress.make_progress(1);
        Ok(())
    }

    /// Move staged files to their final location
    ///
    /// On failure, the files that were not moved yet are discarded.
    async fn commit(self) -> Result<()> {
        let mut files = self.files.into_iter();
        while let Some((temp, path)) = files.next() {
            if let Err(e) = fs::rename(&temp, &path).await {
                let context = format!("moving {} into place", path.display());
                let remaining = Staging {
                    files: std::iter::once((temp, path)).chain(files).collect(),
                };
                remaining.discard().await;
                return Err(e).context(context);
            }
            log::info!("Wrote {}", path.display());
        }
        Ok(())
    }

    /// Remove staged files after a failure
    async fn discard(self) {
        for (temp, _path) in self.files {
            if let Err(e) = fs::remove_file(&temp).await {
                log::warn!("Failed to remove staged output {}: {e}", temp.display());
            }
        }
    }
}

/// Temporary location of an output file
fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    temp.into()
}

/// Write rows to a CSV file with a header row
///
/// Empty tables still get their header row.
pub async fn write_table<R: OutputRow>(path: &Path, rows: &[R]) -> Result<()> {
    let file = File::create(path).await?;
    if rows.is_empty() {
        let mut writer = AsyncWriterBuilder::new().create_writer(file);
        writer.write_record(R::COLUMNS).await?;
        writer.flush().await?;
    } else {
        let mut serializer = AsyncWriterBuilder::new()
            .has_headers(true)
            .create_serializer(file);
        for row in rows {
            serializer.serialize(row).await?;
        }
        serializer.flush().await?;
    }
    Ok(())
}
