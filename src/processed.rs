//! Book metadata after date normalization

use crate::{
    date,
    records::{ItemId, MetadataRecord},
    Year,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Book metadata with its parsed publication date
///
/// This is also the row type of the processed metadata output file, so field
/// order matters: it is the output column order.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ProcessedBook {
    /// Unique catalog item identifier
    pub parent_asin: ItemId,

    /// Book title
    pub title: Option<Box<str>>,

    /// Author name
    pub author_name: Option<Box<str>>,

    /// Publisher name, explicit or recovered from the publication field
    pub publisher: Option<Box<str>>,

    /// Price as it was displayed in the catalog
    pub price: Option<Box<str>>,

    /// Numeric price
    pub price_numeric: Option<f64>,

    /// Page count
    pub page_count: Option<u32>,

    /// Top-level category
    pub category_level_1: Option<Box<str>>,

    /// Second-level category
    pub category_level_2: Option<Box<str>>,

    /// Genre
    pub category_level_3_detail: Option<Box<str>>,

    /// Book format, defaulted when the corpus does not say
    pub book_format: Box<str>,

    /// Date fragment extracted from the publication field
    pub date_str: Option<Box<str>>,

    /// Parsed publication date
    ///
    /// Books without one are kept in the processed metadata file, but left
    /// out of every year-keyed table.
    pub published_date: Option<NaiveDate>,
}
//
impl ProcessedBook {
    /// Normalize a raw metadata record
    pub fn new(record: MetadataRecord, default_format: &str) -> Self {
        let MetadataRecord {
            parent_asin,
            title,
            author_name,
            publisher_date,
            publisher,
            price,
            price_numeric,
            page_count,
            category_level_1,
            category_level_2,
            category_level_3_detail,
            book_format,
        } = record;
        let publisher_date = publisher_date.as_deref().unwrap_or("");
        let date_str = date::date_fragment(publisher_date);
        let published_date = date_str.and_then(date::parse_fragment);
        if published_date.is_none() {
            log::trace!("Book {parent_asin} has no usable publication date in {publisher_date:?}");
        }
        Self {
            publisher: non_blank(publisher)
                .or_else(|| date::publisher_name(publisher_date).map(Into::into)),
            date_str: date_str.map(Into::into),
            published_date,
            book_format: non_blank(book_format).unwrap_or_else(|| default_format.into()),
            parent_asin,
            title,
            author_name,
            price,
            price_numeric,
            page_count,
            category_level_1,
            category_level_2,
            category_level_3_detail,
        }
    }

    /// Publication year, if the publication date is known
    pub fn year(&self) -> Option<Year> {
        self.published_date.map(|date| date.year())
    }

    /// Genre of this book
    pub fn genre(&self) -> Option<&str> {
        self.category_level_3_detail.as_deref()
    }
}

/// Treat blank strings like absent ones
fn non_blank(s: Option<Box<str>>) -> Option<Box<str>> {
    s.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(parent_asin: &str, publisher_date: Option<&str>) -> MetadataRecord {
        MetadataRecord {
            parent_asin: parent_asin.into(),
            title: Some("Title".into()),
            author_name: Some("Author".into()),
            publisher_date: publisher_date.map(Into::into),
            publisher: None,
            price: Some("$10.00".into()),
            price_numeric: Some(10.0),
            page_count: Some(300),
            category_level_1: None,
            category_level_2: None,
            category_level_3_detail: Some("Fantasy".into()),
            book_format: None,
        }
    }

    #[test]
    fn dated_book() {
        let book = ProcessedBook::new(record("B1", Some("Tor (January 5, 2020)")), "Unknown");
        assert_eq!(book.year(), Some(2020));
        assert_eq!(book.date_str.as_deref(), Some("January 5, 2020"));
        assert_eq!(book.publisher.as_deref(), Some("Tor"));
        assert_eq!(&*book.book_format, "Unknown");
    }

    #[test]
    fn undated_book_keeps_its_fragment() {
        let book = ProcessedBook::new(record("B2", Some("Tor (not a date)")), "Unknown");
        assert_eq!(book.year(), None);
        assert_eq!(book.date_str.as_deref(), Some("not a date"));

        let book = ProcessedBook::new(record("B3", None), "Unknown");
        assert_eq!(book.year(), None);
        assert_eq!(book.date_str, None);
        assert_eq!(book.publisher, None);
    }

    #[test]
    fn explicit_publisher_and_format_win() {
        let mut raw = record("B4", Some("Tor (May 2, 2001)"));
        raw.publisher = Some("Tor Books".into());
        raw.book_format = Some("Hardcover".into());
        let book = ProcessedBook::new(raw, "Unknown");
        assert_eq!(book.publisher.as_deref(), Some("Tor Books"));
        assert_eq!(&*book.book_format, "Hardcover");
    }
}
