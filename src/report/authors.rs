//! Author insights over the sentiment-labelled reviews
//!
//! Unlike the rest of the report, this works from an input table rather than
//! from the aggregated outputs, since it needs individual reviews.

use super::section;
use crate::{
    config::DatasetLayout,
    pipeline::SentimentCounts,
    records::{self, CleanReviewRecord, Sentiment},
    Result,
};
use chrono::{Datelike, NaiveDate};
use std::{collections::BTreeMap, fmt};
use unicase::UniCase;

/// Selection of reviews that the author insights are computed over
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReviewFilter {
    /// Authors of interest, all of them if empty
    pub authors: Vec<UniCase<Box<str>>>,

    /// Genres of interest, all of them if empty
    pub genres: Vec<UniCase<Box<str>>>,

    /// First review day of interest, if any
    pub first_day: Option<NaiveDate>,

    /// Last review day of interest, if any
    pub last_day: Option<NaiveDate>,
}
//
impl ReviewFilter {
    /// Truth that a review is selected
    pub fn includes(&self, review: &CleanReviewRecord) -> bool {
        matches_any(&self.authors, review.author_name.as_deref())
            && matches_any(&self.genres, review.category_level_3_detail.as_deref())
            && self.includes_day(review.day())
    }

    /// Truth that a review day falls within the selected range
    ///
    /// Reviews of unknown day are only selected when no bound is set.
    fn includes_day(&self, day: Option<NaiveDate>) -> bool {
        if self.first_day.is_none() && self.last_day.is_none() {
            return true;
        }
        day.is_some_and(|day| {
            self.first_day.map_or(true, |first| day >= first)
                && self.last_day.map_or(true, |last| day <= last)
        })
    }
}

/// Truth that a value is among the selected ones (case-insensitive), or
/// that nothing is selected
fn matches_any(selected: &[UniCase<Box<str>>], value: Option<&str>) -> bool {
    selected.is_empty()
        || value.is_some_and(|value| selected.iter().any(|s| *s == UniCase::new(value)))
}

/// Load the sentiment-labelled reviews
pub async fn load_reviews(layout: &DatasetLayout) -> Result<Vec<CleanReviewRecord>> {
    let loaded = records::load::<CleanReviewRecord>(&layout.clean_reviews()).await?;
    if loaded.rejected > 0 {
        log::warn!(
            "{} clean reviews could not be read and are left out",
            loaded.rejected
        );
    }
    Ok(loaded.rows)
}

/// Sentiment breakdown of the selected reviews
#[derive(Clone, Debug)]
pub struct AuthorInsights<'data> {
    /// Selected reviews, in file order
    reviews: Vec<&'data CleanReviewRecord>,
}
//
impl<'data> AuthorInsights<'data> {
    /// Select reviews
    pub fn new(filter: &ReviewFilter, reviews: &'data [CleanReviewRecord]) -> Self {
        Self {
            reviews: reviews.iter().filter(|review| filter.includes(review)).collect(),
        }
    }

    /// Number of selected reviews in each sentiment class
    pub fn sentiments(&self) -> SentimentCounts {
        SentimentCounts::new(self.reviews.iter().copied())
    }

    /// Review of a sentiment class with the most helpful votes
    ///
    /// Reviews with an unknown vote count rank last, ties go to the first
    /// review in file order.
    pub fn most_helpful(&self, sentiment: Sentiment) -> Option<&'data CleanReviewRecord> {
        (self.reviews.iter().copied())
            .filter(|review| review.sentiment_rating == sentiment)
            .fold(None, |best, review| match best {
                Some(best) if best.helpful_vote >= review.helpful_vote => Some(best),
                _ => Some(review),
            })
    }

    /// Number of positive and negative reviews per month
    pub fn monthly_trend(&self) -> BTreeMap<(i32, u32), (usize, usize)> {
        let mut trend = BTreeMap::<_, (usize, usize)>::new();
        for review in &self.reviews {
            let Some(day) = review.day() else {
                continue;
            };
            let (positive, negative) = trend.entry((day.year(), day.month())).or_default();
            match review.sentiment_rating {
                Sentiment::Positive => *positive += 1,
                Sentiment::Negative => *negative += 1,
                Sentiment::Neutral => {}
            }
        }
        trend
    }
}
//
impl fmt::Display for AuthorInsights<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Sentiment distribution
        let total = self.reviews.len();
        writeln!(f, "Author insights over {total} reviews")?;
        let sentiments = self.sentiments();
        if total > 0 {
            let share = |count: usize| 100.0 * count as f64 / total as f64;
            writeln!(
                f,
                "Sentiment: {} negative ({:.1}%), {} neutral ({:.1}%), {} positive ({:.1}%)",
                sentiments.negative,
                share(sentiments.negative),
                sentiments.neutral,
                share(sentiments.neutral),
                sentiments.positive,
                share(sentiments.positive),
            )?;
        }

        // Most helpful reviews of each polarity
        write_review(f, "Most praised review", self.most_helpful(Sentiment::Positive), "positive")?;
        write_review(f, "Most critical review", self.most_helpful(Sentiment::Negative), "negative")?;

        // Evolution over time
        section(f, "Sentiment trend")?;
        let trend = self.monthly_trend();
        if trend.is_empty() {
            writeln!(f, "No review with a valid date.")?;
        }
        for ((year, month), (positive, negative)) in trend {
            writeln!(f, "  {year:04}-{month:02}  {positive} positive  {negative} negative")?;
        }
        Ok(())
    }
}

/// Display a review card
fn write_review(
    f: &mut fmt::Formatter<'_>,
    title: &str,
    review: Option<&CleanReviewRecord>,
    polarity: &str,
) -> fmt::Result {
    section(f, title)?;
    let Some(review) = review else {
        return writeln!(f, "No {polarity} review available.");
    };
    writeln!(f, "Author: {}", review.author_name.as_deref().unwrap_or(""))?;
    match review.helpful_vote {
        Some(votes) => writeln!(f, "Helpful votes: {votes}")?,
        None => writeln!(f, "Helpful votes:")?,
    }
    writeln!(f, "{}", review.text.as_deref().unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(
        author: &str,
        genre: &str,
        date: Option<&str>,
        sentiment: Sentiment,
        votes: Option<u32>,
        text: &str,
    ) -> CleanReviewRecord {
        CleanReviewRecord {
            parent_asin: format!("{author}-{genre}").into(),
            rating: 3.0,
            sentiment_rating: sentiment,
            clean_text: Some(text.to_lowercase().into()),
            author_name: Some(author.into()),
            category_level_3_detail: Some(genre.into()),
            date: date.map(Into::into),
            helpful_vote: votes,
            text: Some(text.into()),
        }
    }

    fn reviews() -> Vec<CleanReviewRecord> {
        vec![
            review("Frank Herbert", "Science Fiction", Some("2020-01-05 10:00:00"), Sentiment::Positive, Some(3), "Spice!"),
            review("Frank Herbert", "Science Fiction", Some("2020-01-20"), Sentiment::Negative, None, "Too long"),
            review("Frank Herbert", "Science Fiction", Some("2020-02-01"), Sentiment::Positive, Some(9), "Classic"),
            review("Stephen King", "Horror", Some("2020-02-02"), Sentiment::Negative, Some(5), "Too scary"),
            review("Stephen King", "Horror", None, Sentiment::Neutral, Some(1), "Fine"),
            review("Jane Austen", "Romance", Some("2021-06-01"), Sentiment::Positive, Some(9), "Witty"),
        ]
    }

    fn selected<'r>(filter: &ReviewFilter, reviews: &'r [CleanReviewRecord]) -> Vec<&'r str> {
        let insights = AuthorInsights::new(filter, reviews);
        (insights.reviews.iter().copied())
            .filter_map(|review| review.text.as_deref())
            .collect()
    }

    #[test]
    fn no_filter_selects_everything() {
        let reviews = reviews();
        assert_eq!(selected(&ReviewFilter::default(), &reviews).len(), 6);
    }

    #[test]
    fn authors_and_genres_match_case_insensitively() {
        let reviews = reviews();
        let filter = ReviewFilter {
            authors: vec![UniCase::new("stephen king".into()), UniCase::new("JANE AUSTEN".into())],
            ..ReviewFilter::default()
        };
        assert_eq!(selected(&filter, &reviews), vec!["Too scary", "Fine", "Witty"]);

        let filter = ReviewFilter {
            genres: vec![UniCase::new("horror".into())],
            ..filter
        };
        assert_eq!(selected(&filter, &reviews), vec!["Too scary", "Fine"]);
    }

    #[test]
    fn date_range_drops_undated_reviews() {
        let reviews = reviews();
        let filter = ReviewFilter {
            first_day: NaiveDate::from_ymd_opt(2020, 1, 20),
            last_day: NaiveDate::from_ymd_opt(2020, 2, 2),
            ..ReviewFilter::default()
        };
        assert_eq!(selected(&filter, &reviews), vec!["Too long", "Classic", "Too scary"]);
    }

    #[test]
    fn most_helpful_prefers_votes_then_file_order() {
        let reviews = reviews();
        let insights = AuthorInsights::new(&ReviewFilter::default(), &reviews);
        let praised = insights.most_helpful(Sentiment::Positive).unwrap();
        assert_eq!(praised.text.as_deref(), Some("Classic"));
        let critical = insights.most_helpful(Sentiment::Negative).unwrap();
        assert_eq!(critical.text.as_deref(), Some("Too scary"));
    }

    #[test]
    fn unknown_votes_rank_last() {
        let reviews = reviews();
        let filter = ReviewFilter {
            authors: vec![UniCase::new("Frank Herbert".into())],
            ..ReviewFilter::default()
        };
        let insights = AuthorInsights::new(&filter, &reviews);
        let critical = insights.most_helpful(Sentiment::Negative).unwrap();
        assert_eq!(critical.text.as_deref(), Some("Too long"));
    }

    #[test]
    fn missing_sentiment_is_reported() {
        let reviews = reviews();
        let filter = ReviewFilter {
            authors: vec![UniCase::new("Jane Austen".into())],
            ..ReviewFilter::default()
        };
        let out = AuthorInsights::new(&filter, &reviews).to_string();
        assert!(out.contains("Author insights over 1 reviews\n"), "{out}");
        assert!(
            out.contains("Sentiment: 0 negative (0.0%), 0 neutral (0.0%), 1 positive (100.0%)\n"),
            "{out}"
        );
        assert!(out.contains("Author: Jane Austen\nHelpful votes: 9\nWitty\n"), "{out}");
        assert!(out.contains("No negative review available.\n"), "{out}");
        assert!(out.contains("  2021-06  1 positive  0 negative\n"), "{out}");
    }

    #[test]
    fn empty_selection() {
        let reviews = reviews();
        let filter = ReviewFilter {
            authors: vec![UniCase::new("Nobody".into())],
            ..ReviewFilter::default()
        };
        let out = AuthorInsights::new(&filter, &reviews).to_string();
        assert!(out.contains("Author insights over 0 reviews\n"), "{out}");
        assert!(!out.contains("Sentiment:"), "{out}");
        assert!(out.contains("No positive review available.\n"), "{out}");
        assert!(out.contains("No negative review available.\n"), "{out}");
        assert!(out.contains("No review with a valid date.\n"), "{out}");
    }

    #[test]
    fn trend_counts_polarities_per_month() {
        let reviews = reviews();
        let insights = AuthorInsights::new(&ReviewFilter::default(), &reviews);
        let trend = insights.monthly_trend().into_iter().collect::<Vec<_>>();
        assert_eq!(
            trend,
            vec![((2020, 1), (1, 1)), ((2020, 2), (1, 1)), ((2021, 6), (1, 0))]
        );
    }
}
