//! Terminal rendition of the dashboard figures
//!
//! This reads the output files back, filters them according to a [`Session`]
//! and ranks entities. Truncation to the top N only ever happens here. The
//! author insights live in a submodule.

mod authors;

pub use authors::{load_reviews, AuthorInsights, ReviewFilter};

use crate::{
    config::DatasetLayout,
    output::OutputTable,
    records::{self, Record},
    tables::{FormatRow, GenreRow, ScorecardRow, TopAuthorRow, TopBookRow, TopPublisherRow},
    Result, Year,
};
use clap::ValueEnum;
use dialoguer::{Confirm, FuzzySelect};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
    num::NonZeroUsize,
    path::PathBuf,
};
use unicase::UniCase;

/// Label of the genre selector entry that disables genre filtering
const ALL_GENRES: &str = "All Genres";

/// Measure that entities are ranked by
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, ValueEnum)]
pub enum Measure {
    /// Sales proxy (sum of rating × price)
    #[default]
    Sales,

    /// Number of reviews
    Reviews,
}
//
impl Measure {
    /// Format a value of this measure
    fn format(self, value: f64) -> String {
        match self {
            Self::Sales => format!("${value:.2}"),
            Self::Reviews => format!("{value:.0}"),
        }
    }

    /// Human-readable name
    fn label(self) -> &'static str {
        match self {
            Self::Sales => "Sales",
            Self::Reviews => "Reviews",
        }
    }
}

/// User selection that every rendering call works from
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    /// First publication year of interest, if any
    pub first_year: Option<Year>,

    /// Last publication year of interest, if any
    pub last_year: Option<Year>,

    /// Genre of interest, if any
    pub genre: Option<UniCase<Box<str>>>,

    /// Measure that entities are ranked by
    pub measure: Measure,

    /// Number of entities shown in each ranking
    pub limit: NonZeroUsize,
}
//
impl Session {
    /// Truth that a year falls within the selected range
    pub fn includes_year(&self, year: Year) -> bool {
        self.first_year.map_or(true, |first| year >= first)
            && self.last_year.map_or(true, |last| year <= last)
    }

    /// Truth that a genre matches the selected genre
    pub fn includes_genre(&self, genre: Option<&str>) -> bool {
        match (&self.genre, genre) {
            (None, _) => true,
            (Some(selected), Some(genre)) => *selected == UniCase::new(genre),
            (Some(_), None) => false,
        }
    }
}

/// Output tables, as read back from disk
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dashboard {
    pub scorecard: Vec<ScorecardRow>,
    pub genre: Vec<GenreRow>,
    pub format: Vec<FormatRow>,
    pub top_books: Vec<TopBookRow>,
    pub top_authors: Vec<TopAuthorRow>,
    pub top_publishers: Vec<TopPublisherRow>,
}
//
impl Dashboard {
    /// Load the output tables
    pub async fn load(layout: &DatasetLayout) -> Result<Self> {
        Ok(Self {
            scorecard: load_output(layout, OutputTable::Scorecard).await?,
            genre: load_output(layout, OutputTable::Genre).await?,
            format: load_output(layout, OutputTable::Format).await?,
            top_books: load_output(layout, OutputTable::TopBooks).await?,
            top_authors: load_output(layout, OutputTable::TopAuthors).await?,
            top_publishers: load_output(layout, OutputTable::TopPublishers).await?,
        })
    }

    /// Genres which have books within the session's year range, sorted
    pub fn genres(&self, session: &Session) -> Vec<&str> {
        (self.genre.iter())
            .filter(|row| session.includes_year(row.year))
            .map(|row| &*row.genre)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Load an output table
async fn load_output<T: Record>(layout: &DatasetLayout, table: OutputTable) -> Result<Vec<T>> {
    let loaded = records::load::<T>(&layout.output(table)).await?;
    if loaded.rejected > 0 {
        log::warn!(
            "{} rows of {} could not be read back",
            loaded.rejected,
            table.file_name()
        );
    }
    Ok(loaded.rows)
}

/// Ask the user to pick a genre among those of the session's year range
///
/// Returns None if the user picked "All Genres".
pub fn prompt_genre(dashboard: &Dashboard, session: &Session) -> dialoguer::Result<Option<Box<str>>> {
    let genres = dashboard.genres(session);
    let items = std::iter::once(ALL_GENRES)
        .chain(genres.iter().copied())
        .collect::<Vec<_>>();
    let idx = FuzzySelect::new()
        .with_prompt("Which genre should I focus on?")
        .items(&items)
        .default(0)
        .interact()?;
    Ok((idx > 0).then(|| items[idx].into()))
}

/// Warn about missing dataset files and ask whether the pipeline should run
///
/// Returns truth that the pipeline should run. Without an interactive
/// terminal, this is a refusal unless `assume_yes` is set.
pub fn offer_pipeline_run(missing: &[PathBuf], assume_yes: bool) -> bool {
    eprintln!("Warning: required dataset files are missing:");
    for path in missing {
        eprintln!("- {}", path.display());
    }
    if assume_yes {
        return true;
    }
    match Confirm::new()
        .with_prompt("Run the data processing pipeline now?")
        .default(false)
        .interact()
    {
        Ok(answer) => answer,
        Err(e) => {
            log::warn!("Could not ask whether the pipeline should run: {e}");
            eprintln!("Run `bookstats run` to produce them.");
            false
        }
    }
}

/// Rendition of every section of the dashboard
#[derive(Clone, Copy, Debug)]
pub struct Overview<'a> {
    pub session: &'a Session,
    pub dashboard: &'a Dashboard,
}
//
impl fmt::Display for Overview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { session, dashboard } = *self;
        render_scorecard(f, session, &dashboard.scorecard)?;
        render_genres(f, session, &dashboard.genre)?;
        render_formats(f, session, &dashboard.format)?;
        render_top_books(f, session, &dashboard.top_books)?;
        render_top_authors(f, session, &dashboard.top_authors, &dashboard.top_books)?;
        render_top_publishers(f, session, &dashboard.top_publishers)
    }
}

/// Yearly totals over the selected range
fn render_scorecard(f: &mut fmt::Formatter<'_>, session: &Session, scorecard: &[ScorecardRow]) -> fmt::Result {
    let rows = scorecard.iter().filter(|row| session.includes_year(row.year));
    let (books, reviews, sales) = rows.fold((0, 0, 0.0), |(books, reviews, sales), row| {
        (
            books + row.total_books,
            reviews + row.total_reviews,
            sales + row.total_sales,
        )
    });
    writeln!(f, "Total books: {books}")?;
    writeln!(f, "Total reviews: {reviews}")?;
    writeln!(f, "Total sales: {}", Measure::Sales.format(sales))
}

/// Top genres by the session's measure
fn render_genres(f: &mut fmt::Formatter<'_>, session: &Session, genres: &[GenreRow]) -> fmt::Result {
    let ranked = top(
        (genres.iter())
            .filter(|row| session.includes_year(row.year))
            .map(|row| {
                let value = match session.measure {
                    Measure::Sales => row.total_sales,
                    Measure::Reviews => row.review_count as f64,
                };
                (&*row.genre, value)
            }),
        session.limit,
    );
    section(f, &format!("Top genres by {}", session.measure.label()))?;
    for (rank, (genre, value)) in ranked.into_iter().enumerate() {
        writeln!(f, "{:>3}. {genre}  {}", rank + 1, session.measure.format(value))?;
    }
    Ok(())
}

/// Per-format measure and average price
fn render_formats(f: &mut fmt::Formatter<'_>, session: &Session, formats: &[FormatRow]) -> fmt::Result {
    let rows = (formats.iter())
        .filter(|row| session.includes_year(row.year) && !row.is_rollup())
        .collect::<Vec<_>>();
    let ranked = top(
        rows.iter().map(|row| {
            let value = match session.measure {
                Measure::Sales => row.total_sales,
                Measure::Reviews => row.total_reviews as f64,
            };
            (&*row.book_format, value)
        }),
        NonZeroUsize::MAX,
    );
    let mut avg_prices = BTreeMap::<&str, (f64, usize)>::new();
    for row in &rows {
        if let Some(price) = row.avg_price {
            let (sum, count) = avg_prices.entry(&*row.book_format).or_default();
            *sum += price;
            *count += 1;
        }
    }
    section(f, &format!("{} by format", session.measure.label()))?;
    let total = ranked.iter().map(|(_, value)| value).sum::<f64>();
    for (format, value) in &ranked {
        write!(f, "  {format}  {}", session.measure.format(*value))?;
        if let Some((sum, count)) = avg_prices.get(format) {
            write!(f, "  (avg price ${:.2})", sum / *count as f64)?;
        }
        writeln!(f)?;
    }
    writeln!(f, "  Total  {}", session.measure.format(total))
}

/// Top books in the selected genre
fn render_top_books(f: &mut fmt::Formatter<'_>, session: &Session, books: &[TopBookRow]) -> fmt::Result {
    let ranked = top(
        (books.iter())
            .filter(|row| session.includes_year(row.year) && session.includes_genre(row.genre.as_deref()))
            .map(|row| {
                let value = match session.measure {
                    Measure::Sales => row.total_sales,
                    Measure::Reviews => row.total_reviews as f64,
                };
                ((row.title.as_deref(), row.author_name.as_deref()), value)
            }),
        session.limit,
    );
    section(f, &format!("Top {} books by {}", session.limit, session.measure.label()))?;
    for (rank, ((title, author), value)) in ranked.into_iter().enumerate() {
        writeln!(
            f,
            "{:>3}. {} ({})  {}",
            rank + 1,
            label(title),
            label(author),
            session.measure.format(value)
        )?;
    }
    Ok(())
}

/// Top authors, restricted to authors of books in the selected genre
fn render_top_authors(
    f: &mut fmt::Formatter<'_>,
    session: &Session,
    authors: &[TopAuthorRow],
    books: &[TopBookRow],
) -> fmt::Result {
    let genre_authors = session.genre.is_some().then(|| {
        (books.iter())
            .filter(|row| session.includes_year(row.year) && session.includes_genre(row.genre.as_deref()))
            .map(|row| row.author_name.as_deref())
            .collect::<HashSet<_>>()
    });
    let ranked = top(
        (authors.iter())
            .filter(|row| session.includes_year(row.year))
            .filter(|row| {
                genre_authors
                    .as_ref()
                    .map_or(true, |authors| authors.contains(&row.author_name.as_deref()))
            })
            .map(|row| {
                let value = match session.measure {
                    Measure::Sales => row.total_sales,
                    Measure::Reviews => row.total_reviews as f64,
                };
                (row.author_name.as_deref(), value)
            }),
        session.limit,
    );
    section(f, &format!("Top {} authors by {}", session.limit, session.measure.label()))?;
    for (rank, (author, value)) in ranked.into_iter().enumerate() {
        writeln!(f, "{:>3}. {}  {}", rank + 1, label(author), session.measure.format(value))?;
    }
    Ok(())
}

/// Top publishers in the selected genre
fn render_top_publishers(
    f: &mut fmt::Formatter<'_>,
    session: &Session,
    publishers: &[TopPublisherRow],
) -> fmt::Result {
    let ranked = top(
        (publishers.iter())
            .filter(|row| session.includes_year(row.year) && session.includes_genre(row.genre.as_deref()))
            .map(|row| {
                let value = match session.measure {
                    Measure::Sales => row.total_sales,
                    Measure::Reviews => row.total_reviews as f64,
                };
                (row.publisher.as_deref(), value)
            }),
        session.limit,
    );
    section(f, &format!("Top {} publishers by {}", session.limit, session.measure.label()))?;
    for (rank, (publisher, value)) in ranked.into_iter().enumerate() {
        writeln!(f, "{:>3}. {}  {}", rank + 1, label(publisher), session.measure.format(value))?;
    }
    Ok(())
}

/// Sum values per entity, then keep the `limit` entities with the highest sum
///
/// Ties are ordered by entity.
fn top<K: Ord>(entries: impl Iterator<Item = (K, f64)>, limit: NonZeroUsize) -> Vec<(K, f64)> {
    let mut totals = BTreeMap::<K, f64>::new();
    for (key, value) in entries {
        *totals.entry(key).or_default() += value;
    }
    let mut ranked = totals.into_iter().collect::<Vec<_>>();
    // Stable sort, so ties keep the entity order of the BTreeMap
    ranked.sort_by(|(_, a), (_, b)| b.total_cmp(a));
    ranked.truncate(limit.get());
    ranked
}

/// Start a new report section
fn section(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "\n{title}\n{}", "-".repeat(title.len()))
}

/// Display an optional name
fn label(name: Option<&str>) -> &str {
    name.unwrap_or("(unknown)")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            first_year: Some(2019),
            last_year: Some(2020),
            genre: None,
            measure: Measure::Sales,
            limit: NonZeroUsize::new(2).unwrap(),
        }
    }

    fn book(year: Year, title: &str, author: &str, genre: &str, sales: f64) -> TopBookRow {
        TopBookRow {
            year,
            title: Some(title.into()),
            author_name: Some(author.into()),
            genre: Some(genre.into()),
            book_count: 1,
            total_reviews: 1,
            total_sales: sales,
        }
    }

    fn author(year: Year, name: &str, sales: f64) -> TopAuthorRow {
        TopAuthorRow {
            year,
            author_name: Some(name.into()),
            book_count: 1,
            total_reviews: 1,
            total_sales: sales,
        }
    }

    fn dashboard() -> Dashboard {
        Dashboard {
            scorecard: vec![
                ScorecardRow {
                    year: 2018,
                    total_books: 100,
                    total_reviews: 100,
                    total_sales: 100.0,
                },
                ScorecardRow {
                    year: 2019,
                    total_books: 2,
                    total_reviews: 3,
                    total_sales: 4.5,
                },
                ScorecardRow {
                    year: 2020,
                    total_books: 1,
                    total_reviews: 1,
                    total_sales: 1.0,
                },
            ],
            top_books: vec![
                book(2018, "Old", "Ancient", "Fantasy", 1000.0),
                book(2019, "Dune", "Herbert", "Science Fiction", 50.0),
                book(2020, "Dune", "Herbert", "Science Fiction", 25.0),
                book(2020, "It", "King", "Horror", 60.0),
                book(2020, "Carrie", "King", "Horror", 10.0),
                book(2020, "Emma", "Austen", "Romance", 60.0),
            ],
            top_authors: vec![
                author(2018, "Ancient", 1000.0),
                author(2019, "Herbert", 50.0),
                author(2020, "Herbert", 25.0),
                author(2020, "King", 70.0),
                author(2020, "Austen", 60.0),
            ],
            ..Dashboard::default()
        }
    }

    #[test]
    fn top_sums_sorts_and_truncates() {
        let ranked = top(
            [("b", 1.0), ("a", 2.0), ("b", 2.0), ("c", 3.0)].into_iter(),
            NonZeroUsize::new(2).unwrap(),
        );
        assert_eq!(ranked, vec![("b", 3.0), ("c", 3.0)]);
    }

    #[test]
    fn scorecard_totals_cover_the_year_range() {
        let out = Overview { session: &session(), dashboard: &dashboard() }.to_string();
        assert!(out.contains("Total books: 3\n"), "{out}");
        assert!(out.contains("Total reviews: 4\n"), "{out}");
        assert!(out.contains("Total sales: $5.50\n"), "{out}");
    }

    #[test]
    fn top_books_span_years_and_are_capped() {
        let out = Overview { session: &session(), dashboard: &dashboard() }.to_string();
        assert!(out.contains("  1. Dune (Herbert)  $75.00\n"), "{out}");
        assert!(out.contains("  2. Emma (Austen)  $60.00\n"), "{out}");
        assert!(!out.contains("It (King)"), "{out}");
        assert!(!out.contains("Old"), "{out}");
    }

    #[test]
    fn genre_selection_is_case_insensitive_and_restricts_authors() {
        let session = Session {
            genre: Some(UniCase::new("horror".into())),
            ..session()
        };
        let out = Overview { session: &session, dashboard: &dashboard() }.to_string();
        assert!(out.contains("  1. It (King)  $60.00\n"), "{out}");
        assert!(out.contains("  2. Carrie (King)  $10.00\n"), "{out}");
        assert!(out.contains("  1. King  $70.00\n"), "{out}");
        assert!(!out.contains("Herbert"), "{out}");
        assert!(!out.contains("Austen"), "{out}");
    }

    #[test]
    fn formats_exclude_rollup_rows() {
        let format = |book_format: &str, sales: f64, avg_price| FormatRow {
            year: 2020,
            book_format: book_format.into(),
            genre: None,
            book_count: 1,
            total_reviews: 1,
            total_sales: sales,
            avg_price,
        };
        let dashboard = Dashboard {
            format: vec![
                format(crate::tables::ALL_FORMATS, 30.0, Some(5.0)),
                format("Kindle", 10.0, Some(2.0)),
                format("Paperback", 20.0, None),
            ],
            ..Dashboard::default()
        };
        let out = Overview { session: &session(), dashboard: &dashboard }.to_string();
        assert!(out.contains("  Paperback  $20.00\n  Kindle  $10.00  (avg price $2.00)\n  Total  $30.00\n"), "{out}");
    }

    #[test]
    fn genres_of_the_year_range() {
        let genre = |year, genre: &str| GenreRow {
            year,
            genre: genre.into(),
            book_count: 1,
            review_count: 1,
            total_sales: 1.0,
        };
        let dashboard = Dashboard {
            genre: vec![genre(2018, "Fantasy"), genre(2020, "Horror"), genre(2019, "Drama"), genre(2020, "Drama")],
            ..Dashboard::default()
        };
        assert_eq!(dashboard.genres(&session()), vec!["Drama", "Horror"]);
    }
}
