//! Processing pipeline configuration

use crate::{output::OutputTable, Args};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Final process configuration
///
/// This is the digested form of [`Args`]. Please refer to [`Args`] to know
/// more about individual settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Where input and output files live
    pub layout: DatasetLayout,

    /// Where missing input files are fetched from
    pub remote: RemoteConfig,

    /// Local directory to copy input files from instead of downloading them
    pub source_dir: Option<Box<Path>>,

    /// Format label of books whose format is not specified
    pub default_format: Box<str>,

    /// Truth that stages should run even if their outputs already exist
    pub force: bool,
}
//
impl Config {
    /// Determine process configuration from CLI arguments
    pub(crate) fn new(args: &Args) -> Arc<Self> {
        let credentials = match (&args.kaggle_username, &args.kaggle_key) {
            (Some(username), Some(key)) => Some(Credentials {
                username: username.clone(),
                key: key.clone(),
            }),
            _ => None,
        };
        Arc::new(Self {
            layout: DatasetLayout::new(&args.dataset_dir),
            remote: RemoteConfig {
                url_template: args.remote_url.clone(),
                credentials,
            },
            source_dir: args.source_dir.as_deref().map(Box::from),
            default_format: args.default_format.clone(),
            force: args.force,
        })
    }
}

/// Remote dataset host settings
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteConfig {
    /// URL of a dataset file, with `{dataset}` and `{file}` placeholders
    pub url_template: Box<str>,

    /// HTTP basic auth credentials, if any
    pub credentials: Option<Credentials>,
}
//
impl RemoteConfig {
    /// URL of a file from a remote dataset
    pub fn file_url(&self, dataset: &str, file: &str) -> Box<str> {
        self.url_template
            .replace("{dataset}", dataset)
            .replace("{file}", file)
            .into()
    }
}

/// Dataset host credentials
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    pub username: Box<str>,
    pub key: Box<str>,
}
//
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Locations of the input and output files within the dataset directory
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DatasetLayout {
    /// Dataset directory
    dir: Box<Path>,
}
//
impl DatasetLayout {
    /// Raw book metadata table
    pub const METADATA: &'static str = "metadata.csv";

    /// Raw reviews table
    pub const REVIEWS: &'static str = "reviews.csv";

    /// Pre-cleaned reviews table with sentiment classes
    pub const CLEAN_REVIEWS: &'static str = "books_reviews_clean.csv";

    /// Lay out files within a dataset directory
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().into(),
        }
    }

    /// Dataset directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of a file within the dataset directory
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Location of the raw book metadata table
    pub fn metadata(&self) -> PathBuf {
        self.file(Self::METADATA)
    }

    /// Location of the raw reviews table
    pub fn reviews(&self) -> PathBuf {
        self.file(Self::REVIEWS)
    }

    /// Location of the pre-cleaned reviews table
    pub fn clean_reviews(&self) -> PathBuf {
        self.file(Self::CLEAN_REVIEWS)
    }

    /// Location of every input file
    pub fn inputs(&self) -> Vec<PathBuf> {
        vec![self.metadata(), self.reviews(), self.clean_reviews()]
    }

    /// Location of an output file
    pub fn output(&self, table: OutputTable) -> PathBuf {
        self.file(table.file_name())
    }

    /// Location of every output file
    pub fn outputs(&self) -> Vec<PathBuf> {
        OutputTable::ALL
            .into_iter()
            .map(|table| self.output(table))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_urls_fill_placeholders() {
        let remote = RemoteConfig {
            url_template: "https://host/{dataset}/files/{file}".into(),
            credentials: None,
        };
        assert_eq!(
            &*remote.file_url("owner/books", "metadata.csv"),
            "https://host/owner/books/files/metadata.csv"
        );
    }

    #[test]
    fn credentials_are_not_logged() {
        let credentials = Credentials {
            username: "reader".into(),
            key: "s3cr3t".into(),
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("reader"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn layout_lists_every_output() {
        let layout = DatasetLayout::new("/data");
        let outputs = layout.outputs();
        assert_eq!(outputs.len(), 7);
        assert!(outputs.contains(&PathBuf::from("/data/format_data.csv")));
        assert_eq!(layout.inputs()[0], PathBuf::from("/data/metadata.csv"));
    }
}
