//! Download stage.
//!
//! Streams one job's media files into the entity directory. Failures are
//! reported as data, never retried here; the fetch watermark has already
//! advanced, so a failed job is what the failure queue exists for.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::api::{MediaItem, MediaSource};

/// One unit of download work: every file of one media item.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub item: MediaItem,
    pub dir: PathBuf,
    pub entity_title: String,
}

/// A job the download stage could not complete.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub entity_title: String,
    pub item: MediaItem,
    pub reason: String,
}

/// File stem for the n-th (1-based) file of an item.
fn file_stem(item: &MediaItem, n: usize) -> String {
    format!("{}_{}_{}", item.created_at.format("%Y%m%d_%H%M%S"), item.id, n)
}

/// Already-present file stems in a directory. A file counts as present
/// whatever its extension; re-runs after partial failures skip what landed.
async fn existing_stems(dir: &std::path::Path) -> HashSet<String> {
    let mut stems = HashSet::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return stems;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
            stems.insert(stem.to_string());
        }
    }
    stems
}

/// Download every file of one job, skipping files already on disk.
/// Returns the failure reason if any file could not be fetched.
pub(crate) async fn run_job(
    source: &dyn MediaSource,
    job: &DownloadJob,
) -> std::result::Result<(), String> {
    let present = existing_stems(&job.dir).await;

    let mut first_error = None;
    let mut failed = 0usize;
    for (i, url) in job.item.urls.iter().enumerate() {
        let stem = file_stem(&job.item, i + 1);
        if present.contains(&stem) {
            continue;
        }
        if let Err(err) = source.download_to(url, &job.dir, &stem).await {
            failed += 1;
            first_error.get_or_insert_with(|| err.to_string());
        }
    }

    match first_error {
        None => Ok(()),
        Some(reason) if failed == 1 => Err(reason),
        Some(reason) => Err(format!("{} files failed, first: {}", failed, reason)),
    }
}
