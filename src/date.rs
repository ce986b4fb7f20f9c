//! Normalization of the free-text publication field of the book metadata
//!
//! The metadata's `publisher_date` column usually looks like
//! `"Penguin Books (January 5, 2020)"`: a publisher name followed by a
//! parenthesized date. Both halves are recovered here. Extraction failures
//! are not errors, they just yield `None` and the owning book is later left
//! out of every year-keyed table.
//!
//! Review timestamps of the sentiment-labelled reviews are reduced to their
//! day here as well.

use chrono::NaiveDate;

/// Format of the parenthesized date fragment, e.g. "January 5, 2020"
const DATE_FORMAT: &str = "%B %d, %Y";

/// Format of the day part of review timestamps
const REVIEW_DAY_FORMAT: &str = "%Y-%m-%d";

/// Extract the parenthesized date fragment of a publication field
///
/// Only the text after the last opening parenthesis is considered. Closing
/// parentheses and surrounding whitespace are stripped from both ends.
pub fn date_fragment(raw: &str) -> Option<&str> {
    let (_before, after) = raw.rsplit_once('(')?;
    Some(after.trim().trim_matches(')').trim())
}

/// Parse a date fragment like "January 5, 2020"
pub fn parse_fragment(fragment: &str) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(fragment, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(e) => {
            log::trace!("Could not parse date fragment {fragment:?}: {e}");
            None
        }
    }
}

/// Publisher name that precedes the parenthesized date, if any
pub fn publisher_name(raw: &str) -> Option<&str> {
    let before = match raw.rsplit_once('(') {
        Some((before, _after)) => before,
        None => raw,
    };
    let before = before.trim();
    (!before.is_empty()).then_some(before)
}

/// Day of a review timestamp like "2020-01-05" or "2020-01-05 14:03:12"
pub fn review_day(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, REVIEW_DAY_FORMAT).ok()
}
