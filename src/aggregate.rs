//! Left join of the book metadata with its reviews, and group-by accumulation
//!
//! Every derived table is a group-by over the same join, which only differs
//! by its grouping key. The join is therefore materialized once as an index
//! of reviews by catalog item, and each table folds the joined rows into a
//! map from its key to [`Measures`].

use crate::{processed::ProcessedBook, records::ReviewRecord, Year};
use std::collections::{BTreeMap, HashMap};

/// Dated books, left-joined with the reviews of the same catalog item
#[derive(Debug)]
pub struct Join<'data> {
    /// Books which have a publication year, along with that year
    books: Vec<(&'data ProcessedBook, Year)>,

    /// Reviews grouped by reviewed catalog item
    reviews_by_item: HashMap<&'data str, Vec<&'data ReviewRecord>>,
}
//
impl<'data> Join<'data> {
    /// Join books with reviews, leaving out books without a publication year
    pub fn new(books: &'data [ProcessedBook], reviews: &'data [ReviewRecord]) -> Self {
        let books = books
            .iter()
            .filter_map(|book| book.year().map(|year| (book, year)))
            .collect::<Vec<_>>();
        let mut reviews_by_item = HashMap::<_, Vec<_>>::new();
        for review in reviews {
            reviews_by_item
                .entry(&*review.parent_asin)
                .or_default()
                .push(review);
        }
        log::debug!(
            "Joined {} dated books with reviews of {} distinct items",
            books.len(),
            reviews_by_item.len()
        );
        Self {
            books,
            reviews_by_item,
        }
    }

    /// Iterate over joined rows
    ///
    /// There is one joined row per dated book. Its review list is empty when
    /// the book has no review, which is how a left join's null side shows up.
    pub fn rows(&self) -> impl Iterator<Item = JoinedBook<'_>> + '_ {
        self.books.iter().map(|&(book, year)| JoinedBook {
            book,
            year,
            reviews: self
                .reviews_by_item
                .get(&*book.parent_asin)
                .map_or(&[][..], Vec::as_slice),
        })
    }

    /// Fold the joined rows into groups
    ///
    /// Rows for which `key` returns `None` are left out.
    pub fn group_by<'join, K: Ord>(
        &'join self,
        mut key: impl FnMut(&JoinedBook<'join>) -> Option<K>,
    ) -> BTreeMap<K, Measures<'join>> {
        let mut groups = BTreeMap::<K, Measures<'join>>::new();
        for row in self.rows() {
            if let Some(key) = key(&row) {
                groups.entry(key).or_default().add(&row);
            }
        }
        groups
    }
}

/// Dated book and all of its reviews
#[derive(Clone, Copy, Debug)]
pub struct JoinedBook<'join> {
    /// Book metadata
    pub book: &'join ProcessedBook,

    /// Publication year
    pub year: Year,

    /// Reviews of this book
    pub reviews: &'join [&'join ReviewRecord],
}

/// Measures accumulated over a group of joined rows
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Measures<'data> {
    /// Distinct catalog items of the group, with their price
    ///
    /// If the metadata lists an item more than once, the first price wins.
    /// Items are ordered so that price sums are reproducible.
    items: BTreeMap<&'data str, Option<f64>>,

    /// Number of matched reviews
    reviews: u64,

    /// Sum of rating × price across matched reviews
    sales: f64,
}
//
impl<'data> Measures<'data> {
    /// Account for a joined row
    ///
    /// Like a SQL join, a catalog item that is listed twice contributes its
    /// reviews twice, but still counts as one book.
    pub fn add(&mut self, row: &JoinedBook<'data>) {
        let price = row.book.price_numeric;
        self.items.entry(&*row.book.parent_asin).or_insert(price);
        self.reviews += row.reviews.len() as u64;
        if let Some(price) = price {
            self.sales += row
                .reviews
                .iter()
                .map(|review| review.rating * price)
                .sum::<f64>();
        }
    }

    /// Number of distinct catalog items
    pub fn book_count(&self) -> u64 {
        self.items.len() as u64
    }

    /// Number of matched reviews
    pub fn review_count(&self) -> u64 {
        self.reviews
    }

    /// Sales proxy: sum of rating × price, zero when nothing matched
    pub fn total_sales(&self) -> f64 {
        self.sales
    }

    /// Mean price of the distinct items which have a price
    pub fn avg_price(&self) -> Option<f64> {
        let (sum, count) = (self.items.values().flatten())
            .fold((0.0, 0usize), |(sum, count), price| (sum + price, count + 1));
        (count > 0).then(|| sum / count as f64)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::records::MetadataRecord;

    /// Build a processed book for tests
    pub fn book(
        id: &str,
        date: &str,
        genre: Option<&str>,
        format: Option<&str>,
        price: Option<f64>,
    ) -> ProcessedBook {
        ProcessedBook::new(
            MetadataRecord {
                parent_asin: id.into(),
                title: Some(format!("Title of {id}").into()),
                author_name: Some(format!("Author of {id}").into()),
                publisher_date: Some(format!("Publisher of {id} ({date})").into()),
                publisher: None,
                price: None,
                price_numeric: price,
                page_count: None,
                category_level_1: None,
                category_level_2: None,
                category_level_3_detail: genre.map(Into::into),
                book_format: format.map(Into::into),
            },
            "Unknown",
        )
    }

    /// Build a review for tests
    pub fn review(id: &str, rating: f64) -> ReviewRecord {
        ReviewRecord {
            parent_asin: id.into(),
            asin: Some(format!("{id}-edition").into()),
            rating,
        }
    }

    #[test]
    fn left_join_keeps_unreviewed_books_and_drops_undated_ones() {
        let books = [
            book("B1", "January 5, 2020", None, None, Some(10.0)),
            book("B2", "not a date", None, None, Some(10.0)),
            book("B3", "March 3, 2021", None, None, Some(4.0)),
        ];
        let reviews = [review("B1", 5.0), review("B1", 3.0), review("B9", 1.0)];
        let join = Join::new(&books, &reviews);
        let rows = join
            .rows()
            .map(|row| (&*row.book.parent_asin, row.year, row.reviews.len()))
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![("B1", 2020, 2), ("B3", 2021, 0)]);
    }

    #[test]
    fn measures_follow_sql_semantics() {
        let books = [
            book("B1", "January 5, 2020", None, None, Some(10.0)),
            book("B1", "January 5, 2020", None, None, Some(12.0)),
            book("B2", "June 1, 2020", None, None, None),
            book("B3", "June 2, 2020", None, None, Some(2.0)),
        ];
        let reviews = [review("B1", 5.0), review("B2", 4.0)];
        let join = Join::new(&books, &reviews);
        let groups = join.group_by(|row| Some(row.year));
        let measures = &groups[&2020];
        assert_eq!(measures.book_count(), 3);
        // B1 is listed twice, so its review is matched twice
        assert_eq!(measures.review_count(), 3);
        // B2 has no price, so its review adds nothing to sales
        assert_eq!(measures.total_sales(), 5.0 * 10.0 + 5.0 * 12.0);
        assert_eq!(measures.avg_price(), Some((10.0 + 2.0) / 2.0));
    }

    #[test]
    fn avg_price_sums_in_item_order() {
        // Summing the small prices first would give a different rounding
        let books = [
            book("A", "January 5, 2020", None, None, Some(1e16)),
            book("C", "January 5, 2020", None, None, Some(1.0)),
            book("B", "January 5, 2020", None, None, Some(1.0)),
        ];
        let join = Join::new(&books, &[]);
        for _ in 0..16 {
            let groups = join.group_by(|row| Some(row.year));
            assert_eq!(groups[&2020].avg_price(), Some(1e16 / 3.0));
        }
    }

    #[test]
    fn unreviewed_group_has_zero_measures() {
        let books = [book("B1", "January 5, 2019", None, None, Some(10.0))];
        let join = Join::new(&books, &[]);
        let groups = join.group_by(|row| Some(row.year));
        let measures = &groups[&2019];
        assert_eq!(measures.book_count(), 1);
        assert_eq!(measures.review_count(), 0);
        assert_eq!(measures.total_sales(), 0.0);
    }

    #[test]
    fn rows_without_key_are_left_out() {
        let books = [
            book("B1", "January 5, 2019", Some("Fantasy"), None, None),
            book("B2", "January 5, 2019", None, None, None),
        ];
        let join = Join::new(&books, &[]);
        let groups = join.group_by(|row| row.book.genre().map(|genre| (row.year, genre)));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&(2019, "Fantasy")].book_count(), 1);
    }
}
