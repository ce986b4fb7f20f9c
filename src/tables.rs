//! Derived aggregate tables
//!
//! Each table is a group-by over the [`Join`] of dated books with their
//! reviews. Row types double as the output file schemas: field order is
//! column order, and the presentation layer reads them back by column name.
//!
//! Top-N tables are not truncated here. They keep every group, sorted by
//! decreasing sales within each year, so that any cap applied downstream is
//! well-defined. Ties are broken by decreasing review count, then by the
//! group's dimension values in ascending order (nulls first).

use crate::{
    aggregate::{Join, Measures},
    Year,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Format label of the per-year rollup rows of the format table
pub const ALL_FORMATS: &str = "All Formats";

/// Yearly totals
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScorecardRow {
    pub year: Year,
    pub total_books: u64,
    pub total_reviews: u64,
    pub total_sales: f64,
}

/// Per-year genre breakdown
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GenreRow {
    pub year: Year,
    pub genre: Box<str>,
    pub book_count: u64,
    pub review_count: u64,
    pub total_sales: f64,
}

/// Per-year format breakdown, including an [`ALL_FORMATS`] rollup per year
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FormatRow {
    pub year: Year,
    pub book_format: Box<str>,

    /// Genre of the group, always empty on rollup rows
    pub genre: Option<Box<str>>,
    pub book_count: u64,
    pub total_reviews: u64,
    pub total_sales: f64,
    pub avg_price: Option<f64>,
}
//
impl FormatRow {
    /// Truth that this is a per-year rollup row
    pub fn is_rollup(&self) -> bool {
        &*self.book_format == ALL_FORMATS
    }
}

/// Per-year book ranking
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TopBookRow {
    pub year: Year,
    pub title: Option<Box<str>>,
    pub author_name: Option<Box<str>>,
    pub genre: Option<Box<str>>,
    pub book_count: u64,
    pub total_reviews: u64,
    pub total_sales: f64,
}

/// Per-year author ranking
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TopAuthorRow {
    pub year: Year,
    pub author_name: Option<Box<str>>,
    pub book_count: u64,
    pub total_reviews: u64,
    pub total_sales: f64,
}

/// Per-year publisher ranking
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TopPublisherRow {
    pub year: Year,
    pub publisher: Option<Box<str>>,
    pub genre: Option<Box<str>>,
    pub book_count: u64,
    pub total_reviews: u64,
    pub total_sales: f64,
}

/// Every derived aggregate table
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tables {
    pub scorecard: Vec<ScorecardRow>,
    pub genre: Vec<GenreRow>,
    pub format: Vec<FormatRow>,
    pub top_books: Vec<TopBookRow>,
    pub top_authors: Vec<TopAuthorRow>,
    pub top_publishers: Vec<TopPublisherRow>,
}
//
impl Tables {
    /// Compute every table from the join
    ///
    /// Tables do not depend on each other, so they are computed in parallel.
    pub fn build(join: &Join<'_>) -> Self {
        let ((scorecard, genre), ((format, top_books), (top_authors, top_publishers))) =
            rayon::join(
                || rayon::join(|| scorecard(join), || genre(join)),
                || {
                    rayon::join(
                        || rayon::join(|| format(join), || top_books(join)),
                        || rayon::join(|| top_authors(join), || top_publishers(join)),
                    )
                },
            );
        Self {
            scorecard,
            genre,
            format,
            top_books,
            top_authors,
            top_publishers,
        }
    }
}

/// Yearly totals, by increasing year
pub fn scorecard(join: &Join<'_>) -> Vec<ScorecardRow> {
    join.group_by(|row| Some(row.year))
        .into_iter()
        .map(|(year, measures)| ScorecardRow {
            year,
            total_books: measures.book_count(),
            total_reviews: measures.review_count(),
            total_sales: measures.total_sales(),
        })
        .collect()
}

/// Genre breakdown, by increasing year then decreasing book count
///
/// Books without a genre are left out.
pub fn genre(join: &Join<'_>) -> Vec<GenreRow> {
    let mut rows = join
        .group_by(|row| row.book.genre().map(|genre| (row.year, genre)))
        .into_iter()
        .map(|((year, genre), measures)| GenreRow {
            year,
            genre: genre.into(),
            book_count: measures.book_count(),
            review_count: measures.review_count(),
            total_sales: measures.total_sales(),
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        (a.year.cmp(&b.year))
            .then(b.book_count.cmp(&a.book_count))
            .then_with(|| a.genre.cmp(&b.genre))
    });
    rows
}

/// Format breakdown
///
/// For each year, the [`ALL_FORMATS`] rollup row comes first, followed by
/// one row per (format, genre) in ascending order. The rollup is computed
/// from the join, not by summing the other rows.
pub fn format(join: &Join<'_>) -> Vec<FormatRow> {
    let rollups = join
        .group_by(|row| Some(row.year))
        .into_iter()
        .map(|(year, measures)| format_row(year, ALL_FORMATS, None, &measures));
    let by_format = join
        .group_by(|row| Some((row.year, &*row.book.book_format, row.book.genre())))
        .into_iter()
        .map(|((year, format, genre), measures)| format_row(year, format, genre, &measures));
    let mut rows = rollups.chain(by_format).collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        (a.year.cmp(&b.year))
            .then(b.is_rollup().cmp(&a.is_rollup()))
            .then_with(|| a.book_format.cmp(&b.book_format))
            .then_with(|| a.genre.cmp(&b.genre))
    });
    rows
}

/// Build a format table row
fn format_row(year: Year, format: &str, genre: Option<&str>, measures: &Measures) -> FormatRow {
    FormatRow {
        year,
        book_format: format.into(),
        genre: genre.map(Into::into),
        book_count: measures.book_count(),
        total_reviews: measures.review_count(),
        total_sales: measures.total_sales(),
        avg_price: measures.avg_price(),
    }
}

/// Book ranking, keyed by (year, title, author, genre)
pub fn top_books(join: &Join<'_>) -> Vec<TopBookRow> {
    let mut rows = join
        .group_by(|row| {
            let book = row.book;
            Some((
                row.year,
                book.title.as_deref(),
                book.author_name.as_deref(),
                book.genre(),
            ))
        })
        .into_iter()
        .map(|((year, title, author_name, genre), measures)| TopBookRow {
            year,
            title: title.map(Into::into),
            author_name: author_name.map(Into::into),
            genre: genre.map(Into::into),
            book_count: measures.book_count(),
            total_reviews: measures.review_count(),
            total_sales: measures.total_sales(),
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        by_year_then_rank((a.year, a.total_sales, a.total_reviews), (b.year, b.total_sales, b.total_reviews))
            .then_with(|| (&a.title, &a.author_name, &a.genre).cmp(&(&b.title, &b.author_name, &b.genre)))
    });
    rows
}

/// Author ranking, keyed by (year, author)
pub fn top_authors(join: &Join<'_>) -> Vec<TopAuthorRow> {
    let mut rows = join
        .group_by(|row| Some((row.year, row.book.author_name.as_deref())))
        .into_iter()
        .map(|((year, author_name), measures)| TopAuthorRow {
            year,
            author_name: author_name.map(Into::into),
            book_count: measures.book_count(),
            total_reviews: measures.review_count(),
            total_sales: measures.total_sales(),
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        by_year_then_rank((a.year, a.total_sales, a.total_reviews), (b.year, b.total_sales, b.total_reviews))
            .then_with(|| a.author_name.cmp(&b.author_name))
    });
    rows
}

/// Publisher ranking, keyed by (year, publisher, genre)
pub fn top_publishers(join: &Join<'_>) -> Vec<TopPublisherRow> {
    let mut rows = join
        .group_by(|row| Some((row.year, row.book.publisher.as_deref(), row.book.genre())))
        .into_iter()
        .map(|((year, publisher, genre), measures)| TopPublisherRow {
            year,
            publisher: publisher.map(Into::into),
            genre: genre.map(Into::into),
            book_count: measures.book_count(),
            total_reviews: measures.review_count(),
            total_sales: measures.total_sales(),
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        by_year_then_rank((a.year, a.total_sales, a.total_reviews), (b.year, b.total_sales, b.total_reviews))
            .then_with(|| (&a.publisher, &a.genre).cmp(&(&b.publisher, &b.genre)))
    });
    rows
}

/// Ranking order of the top tables: increasing year, then decreasing sales,
/// then decreasing review count
fn by_year_then_rank(a: (Year, f64, u64), b: (Year, f64, u64)) -> Ordering {
    let (a_year, a_sales, a_reviews) = a;
    let (b_year, b_sales, b_reviews) = b;
    (a_year.cmp(&b_year))
        .then(b_sales.total_cmp(&a_sales))
        .then(b_reviews.cmp(&a_reviews))
}
