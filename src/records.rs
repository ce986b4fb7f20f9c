//! Typed records of the raw input tables, and their loading
//!
//! Every input CSV file is decoded into one explicit record type. The load
//! boundary is where schemas get enforced: a file that lacks a required column
//! cannot be processed at all, while individual rows that do not fit the
//! record type are rejected and counted rather than propagated as nulls.

use crate::{date, Result};
use anyhow::Context;
use chrono::NaiveDate;
use csv_async::{AsyncReaderBuilder, Trim};
use futures::StreamExt;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use std::path::Path;
use tokio::fs::File;

/// Identifier of a catalog item, shared by metadata and reviews
pub type ItemId = Box<str>;

/// Record type of an input table
pub trait Record: DeserializeOwned {
    /// Human-readable table name, for logs and error messages
    const TABLE: &'static str;

    /// Columns which must be present in the header row
    const REQUIRED_COLUMNS: &'static [&'static str];

    /// Check a decoded row for semantic validity
    ///
    /// Rows which decode fine but make no sense (e.g. an empty item
    /// identifier) are rejected like undecodable ones.
    fn validate(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Row of the raw book metadata table
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetadataRecord {
    /// Unique catalog item identifier
    pub parent_asin: ItemId,

    /// Book title
    pub title: Option<Box<str>>,

    /// Author name
    pub author_name: Option<Box<str>>,

    /// Free-text publication field, e.g. "Penguin (January 5, 2020)"
    pub publisher_date: Option<Box<str>>,

    /// Explicit publisher name, when the corpus provides one
    #[serde(default)]
    pub publisher: Option<Box<str>>,

    /// Price as it was displayed in the catalog
    #[serde(default)]
    pub price: Option<Box<str>>,

    /// Numeric price
    pub price_numeric: Option<f64>,

    /// Page count
    ///
    /// Not aggregated anywhere, so a malformed value is dropped rather than
    /// rejecting the whole row.
    #[serde(default, deserialize_with = "lenient_count")]
    pub page_count: Option<u32>,

    /// Top-level category
    #[serde(default)]
    pub category_level_1: Option<Box<str>>,

    /// Second-level category
    #[serde(default)]
    pub category_level_2: Option<Box<str>>,

    /// Third-level category, used as the book's genre
    pub category_level_3_detail: Option<Box<str>>,

    /// Book format (Paperback, Kindle...)
    #[serde(default)]
    pub book_format: Option<Box<str>>,
}
//
impl Record for MetadataRecord {
    const TABLE: &'static str = "book metadata";
    const REQUIRED_COLUMNS: &'static [&'static str] = &[
        "parent_asin",
        "title",
        "author_name",
        "publisher_date",
        "price_numeric",
        "category_level_3_detail",
    ];

    fn validate(&self) -> std::result::Result<(), String> {
        if self.parent_asin.trim().is_empty() {
            return Err("empty item identifier".into());
        }
        if let Some(price) = self.price_numeric {
            if !price.is_finite() || price < 0.0 {
                return Err(format!("invalid price {price}"));
            }
        }
        Ok(())
    }
}

/// Row of the raw reviews table
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ReviewRecord {
    /// Reviewed catalog item
    pub parent_asin: ItemId,

    /// Identifier of the specific edition that was reviewed
    #[serde(default)]
    pub asin: Option<Box<str>>,

    /// Star rating
    pub rating: f64,
}
//
impl Record for ReviewRecord {
    const TABLE: &'static str = "reviews";
    const REQUIRED_COLUMNS: &'static [&'static str] = &["parent_asin", "rating"];

    fn validate(&self) -> std::result::Result<(), String> {
        if self.parent_asin.trim().is_empty() {
            return Err("empty item identifier".into());
        }
        if !self.rating.is_finite() {
            return Err(format!("invalid rating {}", self.rating));
        }
        Ok(())
    }
}

/// Sentiment class of a cleaned review
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(try_from = "u8")]
pub enum Sentiment {
    /// Encoded as 0
    Negative,

    /// Encoded as 1
    Neutral,

    /// Encoded as 2
    Positive,
}
//
impl TryFrom<u8> for Sentiment {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Negative),
            1 => Ok(Self::Neutral),
            2 => Ok(Self::Positive),
            other => Err(format!("unknown sentiment class {other}")),
        }
    }
}

/// Row of the pre-cleaned reviews table
///
/// This table is only consumed by the presentation layer, but it is still
/// validated when the pipeline runs so that a malformed download is noticed
/// early.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CleanReviewRecord {
    /// Reviewed catalog item
    pub parent_asin: ItemId,

    /// Star rating
    pub rating: f64,

    /// Sentiment class derived from the review text
    pub sentiment_rating: Sentiment,

    /// Review text with stop words and punctuation removed
    pub clean_text: Option<Box<str>>,

    /// Author of the reviewed book
    #[serde(default)]
    pub author_name: Option<Box<str>>,

    /// Genre of the reviewed book
    #[serde(default)]
    pub category_level_3_detail: Option<Box<str>>,

    /// Review timestamp, e.g. "2020-01-05 14:03:12"
    #[serde(default)]
    pub date: Option<Box<str>>,

    /// Number of readers who found the review helpful
    #[serde(default, deserialize_with = "lenient_count")]
    pub helpful_vote: Option<u32>,

    /// Original review text
    #[serde(default)]
    pub text: Option<Box<str>>,
}
//
impl CleanReviewRecord {
    /// Day on which the review was written, if known
    pub fn day(&self) -> Option<NaiveDate> {
        self.date.as_deref().and_then(date::review_day)
    }
}
//
impl Record for CleanReviewRecord {
    const TABLE: &'static str = "clean reviews";
    const REQUIRED_COLUMNS: &'static [&'static str] =
        &["parent_asin", "rating", "sentiment_rating", "clean_text"];

    fn validate(&self) -> std::result::Result<(), String> {
        if self.parent_asin.trim().is_empty() {
            return Err("empty item identifier".into());
        }
        if !self.rating.is_finite() {
            return Err(format!("invalid rating {}", self.rating));
        }
        Ok(())
    }
}

/// Decode an optional count, turning malformed values into `None`
///
/// Integer columns exported with gaps tend to carry a spurious fractional
/// part ("352.0"), which is accepted as long as it is zero.
fn lenient_count<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u32>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    let count = raw.parse::<u32>().ok().or_else(|| {
        let value = raw.parse::<f64>().ok()?;
        (value.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&value))
            .then_some(value as u32)
    });
    if count.is_none() && !raw.is_empty() {
        log::debug!("Ignoring malformed count {raw:?}");
    }
    Ok(count)
}

/// Rows loaded from an input table
#[derive(Clone, Debug, PartialEq)]
pub struct Loaded<T> {
    /// Rows that passed validation, in file order
    pub rows: Vec<T>,

    /// Number of rows that were rejected
    pub rejected: usize,
}

/// Load an input table from a CSV file with a header row
pub async fn load<T: Record>(path: &Path) -> Result<Loaded<T>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {} table at {}", T::TABLE, path.display()))?;
    let mut deserializer = AsyncReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::Headers)
        .create_deserializer(file);

    // Check that the header row has everything we need
    let headers = deserializer
        .headers()
        .await
        .with_context(|| format!("reading the header row of {}", path.display()))?;
    let missing = T::REQUIRED_COLUMNS
        .iter()
        .filter(|&&column| !headers.iter().any(|header| header == column))
        .copied()
        .collect::<Vec<_>>();
    anyhow::ensure!(
        missing.is_empty(),
        "{} table at {} lacks required column(s) {}",
        T::TABLE,
        path.display(),
        missing.join(", ")
    );

    // Decode the rows, setting aside those which don't fit the schema
    let mut records = deserializer.into_deserialize::<T>();
    let mut loaded = Loaded {
        rows: Vec::new(),
        rejected: 0,
    };
    let mut row_idx = 0usize;
    while let Some(record) = records.next().await {
        row_idx += 1;
        let rejection = match record {
            Ok(record) => match record.validate() {
                Ok(()) => {
                    loaded.rows.push(record);
                    continue;
                }
                Err(cause) => cause,
            },
            Err(e) if e.is_io_error() => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
            Err(e) => e.to_string(),
        };
        log::warn!(
            "Rejected row {row_idx} of {} table {}: {rejection}",
            T::TABLE,
            path.display()
        );
        loaded.rejected += 1;
    }
    log::info!(
        "Loaded {} rows from {} table {} ({} rejected)",
        loaded.rows.len(),
        T::TABLE,
        path.display(),
        loaded.rejected
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn load_str<T: Record>(contents: &str) -> Result<Loaded<T>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("table.csv");
        tokio::fs::write(&path, contents).await?;
        load::<T>(&path).await
    }

    #[tokio::test]
    async fn loads_metadata_with_optional_columns_absent() {
        let loaded = load_str::<MetadataRecord>(
            "parent_asin,title,author_name,publisher_date,price_numeric,category_level_3_detail\n\
             B1,Dune,Frank Herbert,Ace (June 1 1990),9.99,Science Fiction\n\
             B2,,,,,\n",
        )
        .await
        .unwrap();
        assert_eq!(loaded.rejected, 0);
        assert_eq!(loaded.rows.len(), 2);
        assert_eq!(loaded.rows[0].price_numeric, Some(9.99));
        assert_eq!(loaded.rows[0].book_format, None);
        assert_eq!(loaded.rows[1].title, None);
        assert_eq!(loaded.rows[1].price_numeric, None);
    }

    #[tokio::test]
    async fn malformed_page_count_keeps_the_row() {
        let loaded = load_str::<MetadataRecord>(
            "parent_asin,title,author_name,publisher_date,price_numeric,category_level_3_detail,page_count\n\
             B1,Dune,Frank Herbert,Ace (June 1 1990),9.99,Science Fiction,352.0\n\
             B2,Emma,Jane Austen,Penguin (May 5 2003),5.00,Romance,lots\n\
             B3,It,Stephen King,Scribner (March 3 2020),2.50,Horror,1138\n",
        )
        .await
        .unwrap();
        assert_eq!(loaded.rejected, 0);
        let pages = loaded.rows.iter().map(|r| r.page_count).collect::<Vec<_>>();
        assert_eq!(pages, vec![Some(352), None, Some(1138)]);
    }

    #[tokio::test]
    async fn aggregated_columns_stay_strict() {
        let loaded = load_str::<MetadataRecord>(
            "parent_asin,title,author_name,publisher_date,price_numeric,category_level_3_detail,page_count\n\
             B1,Dune,Frank Herbert,Ace (June 1 1990),cheap,Science Fiction,352.0\n",
        )
        .await
        .unwrap();
        assert_eq!(loaded.rejected, 1);
        assert!(loaded.rows.is_empty());
    }

    #[tokio::test]
    async fn missing_required_column_is_fatal() {
        let result = load_str::<ReviewRecord>("parent_asin,text\nB1,great\n").await;
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("rating"), "{message}");
    }

    #[tokio::test]
    async fn malformed_rows_are_rejected() {
        let loaded = load_str::<ReviewRecord>(
            "parent_asin,rating\n\
             B1,5\n\
             B1,five\n\
             ,4\n\
             B2,3.5\n",
        )
        .await
        .unwrap();
        assert_eq!(loaded.rejected, 2);
        let ratings = loaded.rows.iter().map(|r| r.rating).collect::<Vec<_>>();
        assert_eq!(ratings, vec![5.0, 3.5]);
    }

    #[tokio::test]
    async fn sentiment_must_be_known() {
        let loaded = load_str::<CleanReviewRecord>(
            "parent_asin,rating,sentiment_rating,clean_text\n\
             B1,5,2,loved it\n\
             B1,1,0,hated it\n\
             B2,3,7,what\n",
        )
        .await
        .unwrap();
        assert_eq!(loaded.rejected, 1);
        assert_eq!(loaded.rows[0].sentiment_rating, Sentiment::Positive);
        assert_eq!(loaded.rows[1].sentiment_rating, Sentiment::Negative);
        assert_eq!(loaded.rows[0].author_name, None);
        assert_eq!(loaded.rows[0].helpful_vote, None);
    }

    #[tokio::test]
    async fn clean_reviews_carry_their_context() {
        let loaded = load_str::<CleanReviewRecord>(
            "parent_asin,rating,sentiment_rating,clean_text,author_name,category_level_3_detail,date,helpful_vote,text\n\
             B1,5,2,loved,Frank Herbert,Science Fiction,2020-01-05 14:03:12,3.0,Loved it!\n\
             B2,1,0,meh,Jane Austen,Romance,someday,,Meh.\n",
        )
        .await
        .unwrap();
        assert_eq!(loaded.rejected, 0);
        let first = &loaded.rows[0];
        assert_eq!(first.author_name.as_deref(), Some("Frank Herbert"));
        assert_eq!(first.helpful_vote, Some(3));
        assert_eq!(first.day(), NaiveDate::from_ymd_opt(2020, 1, 5));
        assert_eq!(first.text.as_deref(), Some("Loved it!"));
        let second = &loaded.rows[1];
        assert_eq!(second.helpful_vote, None);
        assert_eq!(second.day(), None);
    }
}
