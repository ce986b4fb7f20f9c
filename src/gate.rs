//! Recomputation gate
//!
//! Stages are skipped wholesale when all of their output files exist. There
//! is no partial re-run and no staleness check: modification times are only
//! reported to the user, so that they can decide to force a rerun.

use crate::Result;
use anyhow::Context;
use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};
use tokio::fs;

/// Outcome of a pipeline stage
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StageOutcome<T> {
    /// The stage did not run because its outputs were already there
    Skipped,

    /// The stage ran and produced this
    Ran(T),
}

/// Files from a list which do not exist
pub async fn missing(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    for path in paths {
        let exists = fs::try_exists(path)
            .await
            .with_context(|| format!("checking if {} exists", path.display()))?;
        if !exists {
            missing.push(path.clone());
        }
    }
    Ok(missing)
}

/// Truth that a stage with these outputs needs to run
pub async fn must_run(stage: &str, outputs: &[PathBuf], force: bool) -> Result<bool> {
    if force {
        log::info!("Running {stage} as requested, regardless of existing outputs");
        return Ok(true);
    }
    let missing = missing(outputs).await?;
    if missing.is_empty() {
        log::info!("Skipping {stage}: all of its outputs already exist");
        Ok(false)
    } else {
        log::info!("Running {stage}: {} output(s) missing", missing.len());
        for path in &missing {
            log::debug!("- Missing {}", path.display());
        }
        Ok(true)
    }
}

/// State of a file on disk
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileStatus {
    /// File location
    pub path: PathBuf,

    /// Last modification time, if the file exists
    pub modified: Option<SystemTime>,
}

/// Look up the state of a set of files
pub async fn status(paths: &[PathBuf]) -> Result<Vec<FileStatus>> {
    let mut statuses = Vec::with_capacity(paths.len());
    for path in paths {
        statuses.push(FileStatus {
            path: path.clone(),
            modified: modified(path).await?,
        });
    }
    Ok(statuses)
}

/// Modification time of a file, or None if it does not exist
async fn modified(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path).await {
        Ok(metadata) => {
            let modified = metadata
                .modified()
                .with_context(|| format!("querying modification time of {}", path.display()))?;
            Ok(Some(modified))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("querying metadata of {}", path.display())),
    }
}

/// Most recent modification time across a set of files
///
/// This changes whenever any of the files is rewritten, so it can serve as a
/// cache key for consumers of the output files. Returns None if any file is
/// missing.
pub fn fingerprint(files: &[FileStatus]) -> Option<SystemTime> {
    files
        .iter()
        .map(|file| file.modified)
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .max()
}

/// Truth that some output predates some input
///
/// Missing files are ignored. Modification times are not reliable across
/// clock skew or file copies, so this is only ever reported, never acted
/// upon.
pub fn outputs_predate_inputs(inputs: &[FileStatus], outputs: &[FileStatus]) -> bool {
    let newest_input = inputs.iter().filter_map(|file| file.modified).max();
    let oldest_output = outputs.iter().filter_map(|file| file.modified).min();
    match (newest_input, oldest_output) {
        (Some(input), Some(output)) => output < input,
        _ => false,
    }
}
