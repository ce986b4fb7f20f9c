//! Corpus acquisition: fetch the raw input files from the remote dataset host
//!
//! A remote dataset is only fetched if some of the files that we need from it
//! are missing locally. Files are either downloaded from the remote host, or
//! copied from a local directory where they have been downloaded already.
//! Either way, they are first written next to their final location and only
//! renamed into place once complete, so an interrupted transfer never leaves
//! a truncated input behind.

use crate::{
    config::Config,
    gate::{self, StageOutcome},
    progress::{ProgressConfig, ProgressReport, ProgressTracker, Work},
    sources::{self, RemoteDataset},
    Result,
};
use anyhow::Context;
use futures::stream::StreamExt;
use reqwest::Response;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    task::JoinSet,
};
use tokio_util::io::StreamReader;

/// File transfer that acquisition should carry out
#[derive(Clone, Debug, Eq, PartialEq)]
struct Transfer {
    /// Dataset that the file comes from
    dataset: &'static str,

    /// Name of the file within the remote dataset
    remote_name: &'static str,

    /// Final location of the file
    destination: PathBuf,
}

/// Fetch every remote dataset that has missing files
///
/// Returns the files that were fetched.
pub async fn acquire(config: Arc<Config>, report: &ProgressReport) -> Result<StageOutcome<Vec<PathBuf>>> {
    acquire_datasets(config, sources::all(), report).await
}

/// Fetch a subset of the remote datasets, if some of their files are missing
pub async fn acquire_datasets(
    config: Arc<Config>,
    datasets: &[RemoteDataset],
    report: &ProgressReport,
) -> Result<StageOutcome<Vec<PathBuf>>> {
    // Figure out which datasets need fetching
    fs::create_dir_all(config.layout.dir())
        .await
        .with_context(|| format!("creating dataset directory {}", config.layout.dir().display()))?;
    let mut transfers = Vec::new();
    for dataset in datasets {
        let destinations = dataset
            .files
            .iter()
            .map(|file| config.layout.file(file.local_name))
            .collect::<Vec<_>>();
        let stage = format!("acquisition of {}", dataset.id);
        if !gate::must_run(&stage, &destinations, config.force).await? {
            continue;
        }
        transfers.extend(dataset.files.iter().zip(destinations).map(|(file, destination)| {
            Transfer {
                dataset: dataset.id,
                remote_name: file.remote_name,
                destination,
            }
        }));
    }
    if transfers.is_empty() {
        return Ok(StageOutcome::Skipped);
    }

    // Carry out the transfers
    let fetched = transfers
        .iter()
        .map(|transfer| transfer.destination.clone())
        .collect();
    match &config.source_dir {
        Some(source_dir) => copy_all(source_dir, transfers, report).await?,
        None => download_all(config.clone(), transfers, report).await?,
    }
    Ok(StageOutcome::Ran(fetched))
}

/// Copy files from a local directory
async fn copy_all(source_dir: &Path, transfers: Vec<Transfer>, report: &ProgressReport) -> Result<()> {
    let copies = report.stage("Copying input files", transfers.len());
    for transfer in transfers {
        let source = source_dir.join(transfer.remote_name);
        let part = part_path(&transfer.destination);
        let copied = async {
            fs::copy(&source, &part).await.with_context(|| {
                format!("copying {} of dataset {}", source.display(), transfer.dataset)
            })?;
            fs::rename(&part, &transfer.destination)
                .await
                .with_context(|| format!("moving {} into place", transfer.destination.display()))
        }
        .await;
        if let Err(e) = copied {
            discard_parts(&[part]).await;
            return Err(e);
        }
        log::info!("Copied {} to {}", source.display(), transfer.destination.display());
        copies.make_progress(1);
    }
    Ok(())
}

/// Download files from the remote dataset host
async fn download_all(config: Arc<Config>, transfers: Vec<Transfer>, report: &ProgressReport) -> Result<()> {
    // Track file downloads
    let downloads = report.stage("Initiating downloads", transfers.len());
    let bytes = report.add(
        "Downloading input files",
        ProgressConfig::new(Work::Bytes(0)).allow_adding_work(),
    );

    // Start file downloads
    let parts = transfers
        .iter()
        .map(|transfer| part_path(&transfer.destination))
        .collect::<Vec<_>>();
    let client = reqwest::Client::new();
    let mut files = JoinSet::new();
    for transfer in transfers {
        files.spawn(download(
            config.clone(),
            client.clone(),
            transfer,
            downloads.clone(),
            bytes.clone(),
        ));
    }

    // Wait for all downloads, any failure is fatal and cancels the others
    while let Some(result) = files.join_next().await {
        let downloaded = result
            .context("waiting for a download to complete")
            .and_then(|downloaded| downloaded);
        if let Err(e) = downloaded {
            files.shutdown().await;
            discard_parts(&parts).await;
            return Err(e);
        }
    }
    Ok(())
}

/// Download a single file from the remote dataset host
async fn download(
    config: Arc<Config>,
    client: reqwest::Client,
    transfer: Transfer,
    downloads: ProgressTracker,
    bytes: ProgressTracker,
) -> Result<()> {
    // Start the download
    let url = config.remote.file_url(transfer.dataset, transfer.remote_name);
    let context = || format!("initiating download of {url}");
    let mut request = client.get(&*url);
    if let Some(credentials) = &config.remote.credentials {
        request = request.basic_auth(&credentials.username, Some(&credentials.key));
    }
    let response = request
        .send()
        .await
        .and_then(Response::error_for_status)
        .with_context(context)?;
    let length = response.content_length();
    if let Some(length) = length {
        bytes.add_work(length);
    } else {
        log::debug!("Download size of {url} is unknown, it won't be tracked");
    }
    if downloads.make_progress(1) {
        bytes.done_adding_work();
    }

    // Expose the response body as an AsyncRead
    let body = StreamReader::new(response.bytes_stream().map(move |res| {
        res
            // Track how many bytes have been downloaded so far
            .inspect(|block| {
                if length.is_some() {
                    bytes.make_progress(block.len() as u64);
                }
            })
            // Translate reqwest errors into I/O errors
            .map_err(|e| io::Error::new(ErrorKind::Other, e))
    }));
    tokio::pin!(body);

    // Stream it to disk, then move the complete file into place
    let part = part_path(&transfer.destination);
    let context = || format!("downloading {url} to {}", part.display());
    let mut file = File::create(&part).await.with_context(context)?;
    let size = tokio::io::copy(&mut body, &mut file).await.with_context(context)?;
    file.flush().await.with_context(context)?;
    drop(file);
    fs::rename(&part, &transfer.destination)
        .await
        .with_context(|| format!("moving {} into place", transfer.destination.display()))?;
    log::info!("Downloaded {url} ({size} bytes) to {}", transfer.destination.display());
    Ok(())
}

/// Location where a file is written until it is complete
fn part_path(path: &Path) -> PathBuf {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    part.into()
}

/// Remove incomplete files left behind by failed transfers
async fn discard_parts(parts: &[PathBuf]) {
    for part in parts {
        match fs::remove_file(part).await {
            Ok(()) => log::debug!("Removed incomplete file {}", part.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove incomplete file {}: {e}", part.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{DatasetLayout, RemoteConfig},
        sources::RemoteFile,
    };
    use tempfile::TempDir;

    const DATASET: RemoteDataset = RemoteDataset {
        id: "someone/books",
        files: &[RemoteFile {
            remote_name: "raw_metadata.csv",
            local_name: DatasetLayout::METADATA,
        }],
    };

    fn config(dataset_dir: &Path, source_dir: &Path) -> Arc<Config> {
        Arc::new(Config {
            layout: DatasetLayout::new(dataset_dir),
            remote: RemoteConfig {
                url_template: "http://127.0.0.1:9/{dataset}/{file}".into(),
                credentials: None,
            },
            source_dir: Some(source_dir.into()),
            default_format: "Unknown".into(),
            force: false,
        })
    }

    #[tokio::test]
    async fn copies_missing_files_once() {
        let source = TempDir::new().unwrap();
        let dataset = TempDir::new().unwrap();
        std::fs::write(source.path().join("raw_metadata.csv"), "parent_asin\nB1\n").unwrap();
        let config = config(dataset.path(), source.path());
        let report = ProgressReport::new();

        let outcome = acquire_datasets(config.clone(), &[DATASET], &report)
            .await
            .unwrap();
        let destination = config.layout.metadata();
        assert_eq!(outcome, StageOutcome::Ran(vec![destination.clone()]));
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "parent_asin\nB1\n");
        assert!(!part_path(&destination).exists());

        // Second acquisition has nothing to do
        let outcome = acquire_datasets(config, &[DATASET], &report).await.unwrap();
        assert_eq!(outcome, StageOutcome::Skipped);
    }

    #[tokio::test]
    async fn failed_copy_leaves_no_part_file() {
        let source = TempDir::new().unwrap();
        let dataset = TempDir::new().unwrap();
        std::fs::write(source.path().join("raw_metadata.csv"), "parent_asin\nB1\n").unwrap();
        let config = Arc::new(Config {
            force: true,
            ..(*config(dataset.path(), source.path())).clone()
        });

        // A non-empty directory in the way makes the final rename fail
        let destination = config.layout.metadata();
        std::fs::create_dir(&destination).unwrap();
        std::fs::write(destination.join("squatter"), "").unwrap();

        let report = ProgressReport::new();
        let result = acquire_datasets(config, &[DATASET], &report).await;
        assert!(result.is_err());
        assert!(!part_path(&destination).exists());
    }

    #[tokio::test]
    async fn failed_download_leaves_no_part_file() {
        let dataset = TempDir::new().unwrap();
        let config = Arc::new(Config {
            source_dir: None,
            ..(*config(dataset.path(), dataset.path())).clone()
        });

        // Leftover of a download that was cancelled along with a failed one
        let destination = config.layout.metadata();
        std::fs::write(part_path(&destination), "parent_as").unwrap();

        let report = ProgressReport::new();
        let result = acquire_datasets(config, &[DATASET], &report).await;
        assert!(result.is_err());
        assert!(!part_path(&destination).exists());
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn missing_source_file_is_fatal() {
        let source = TempDir::new().unwrap();
        let dataset = TempDir::new().unwrap();
        let config = config(dataset.path(), source.path());
        let report = ProgressReport::new();
        let result = acquire_datasets(config.clone(), &[DATASET], &report).await;
        assert!(result.is_err());
        assert!(!config.layout.metadata().exists());
    }
}
