//! Remote datasets which the input files come from

use crate::{config::DatasetLayout, Result};
use anyhow::Context;

/// Get information about a remote dataset
pub fn get(id: &str) -> Result<&'static RemoteDataset> {
    REMOTE_DATASETS
        .iter()
        .find(|dataset| dataset.id == id)
        .with_context(|| {
            let known = REMOTE_DATASETS
                .iter()
                .map(|dataset| dataset.id)
                .collect::<Vec<_>>();
            format!("Unknown dataset {id}, expected one of {}", known.join(", "))
        })
}

/// Every remote dataset, in acquisition order
pub fn all() -> &'static [RemoteDataset] {
    REMOTE_DATASETS
}

/// What we know about a dataset from the remote host
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RemoteDataset {
    /// Dataset identifier on the remote host, as `owner/name`
    pub id: &'static str,

    /// Files that we need from this dataset
    pub files: &'static [RemoteFile],
}

/// File from a remote dataset
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RemoteFile {
    /// Name of the file within the remote dataset
    pub remote_name: &'static str,

    /// Name of the file within the local dataset directory
    pub local_name: &'static str,
}

/// Every dataset that this program needs
const REMOTE_DATASETS: &[RemoteDataset] = &[
    RemoteDataset {
        id: "hadifariborzi/amazon-books-dataset-20k-books-727k-reviews",
        files: &[
            RemoteFile {
                remote_name: "amazon_books_metadata_sample_20k.csv",
                local_name: DatasetLayout::METADATA,
            },
            RemoteFile {
                remote_name: "amazon_books_reviews_sample_20k.csv",
                local_name: DatasetLayout::REVIEWS,
            },
        ],
    },
    RemoteDataset {
        id: "tobypu/book-reviews-clean",
        files: &[RemoteFile {
            remote_name: "books_reviews_clean.csv",
            local_name: DatasetLayout::CLEAN_REVIEWS,
        }],
    },
];
