//! Three-stage mirror pipeline.
//!
//! Accounts flow through sync, fetch, and download worker pools over bounded
//! channels. Each stage's output channel closes exactly when all of its
//! workers have finished, because the workers hold the only senders; the
//! caller drains the failure channel to natural termination. Cancellation is
//! cooperative: workers check the token at the top of each loop and in-flight
//! units run to completion.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::api::{Account, MediaSource};
use crate::pipeline::download::{run_job, DownloadJob, FailedJob};
use crate::pipeline::fetch::fetch_new_items;
use crate::pipeline::memo::RunMemos;
use crate::pipeline::sync::sync_account;
use crate::store::{Db, EntityHandle, ListEntityRecord};

/// Pipeline sizing knobs.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Download worker count; doubles as the download queue capacity so no
    /// worker sits idle while the queue holds work.
    pub max_download_workers: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            max_download_workers: 8,
        }
    }
}

fn stage_worker_count(accounts: usize) -> usize {
    let parallelism = std::thread::available_parallelism().map_or(4, usize::from);
    accounts.min(2 * parallelism).max(1)
}

/// Run a worker body and trip the global cancel if it panics. The panic is
/// contained to the one worker; everything else winds down cooperatively.
fn supervise<F>(role: &'static str, cancel: CancellationToken, body: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if AssertUnwindSafe(body).catch_unwind().await.is_err() {
            error!(worker = role, "worker panicked, cancelling run");
            cancel.cancel();
        }
    });
}

/// Mirror a batch of accounts under one directory.
///
/// Returns every download job that failed, even when cancellation tripped
/// mid-run. Per-account sync and fetch errors are logged and skipped; a 429
/// from the fetch stage cancels the whole run.
#[allow(clippy::too_many_arguments)]
pub async fn mirror_accounts(
    source: Arc<dyn MediaSource>,
    db: Db,
    accounts: Vec<Account>,
    dir: PathBuf,
    list_entity: Option<ListEntityRecord>,
    memos: Arc<RunMemos>,
    cancel: CancellationToken,
    options: &PipelineOptions,
) -> Vec<FailedJob> {
    if accounts.is_empty() {
        return Vec::new();
    }

    let stage_workers = stage_worker_count(accounts.len());
    let download_workers = options.max_download_workers.max(1);

    let (account_tx, account_rx) = mpsc::channel::<Account>(accounts.len());
    let (entity_tx, entity_rx) = mpsc::channel::<(Account, Arc<EntityHandle>)>(accounts.len());
    let (job_tx, job_rx) = mpsc::channel::<DownloadJob>(download_workers);
    let (fail_tx, mut fail_rx) = mpsc::channel::<FailedJob>(download_workers);

    for account in accounts {
        // Capacity equals the batch size; these sends never block.
        let _ = account_tx.send(account).await;
    }
    drop(account_tx);

    let account_rx = Arc::new(Mutex::new(account_rx));
    let entity_rx = Arc::new(Mutex::new(entity_rx));
    let job_rx = Arc::new(Mutex::new(job_rx));

    for _ in 0..stage_workers {
        let account_rx = account_rx.clone();
        let entity_tx = entity_tx.clone();
        let db = db.clone();
        let dir = dir.clone();
        let list_entity = list_entity.clone();
        let memos = memos.clone();
        let cancel = cancel.clone();
        supervise("sync", cancel.clone(), async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let account = { account_rx.lock().await.recv().await };
                let Some(account) = account else { break };
                match sync_account(&db, &account, &dir, list_entity.as_ref(), &memos).await {
                    Ok(Some(entity)) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            sent = entity_tx.send((account, entity)) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(None) => debug!(account = %account.title(), "already synced this run"),
                    Err(err) => {
                        warn!(account = %account.title(), error = %err, "sync failed, account skipped");
                    }
                }
            }
        });
    }
    drop(entity_tx);

    for _ in 0..stage_workers {
        let entity_rx = entity_rx.clone();
        let job_tx = job_tx.clone();
        let source = source.clone();
        let cancel = cancel.clone();
        supervise("fetch", cancel.clone(), async move {
            'outer: loop {
                if cancel.is_cancelled() {
                    break;
                }
                let next = { entity_rx.lock().await.recv().await };
                let Some((account, entity)) = next else { break };
                let items = match fetch_new_items(source.as_ref(), &account, &entity).await {
                    Ok(items) => items,
                    Err(err) if err.is_rate_limited() => {
                        error!(account = %account.title(), error = %err,
                            "rate limited, cancelling run");
                        cancel.cancel();
                        continue;
                    }
                    Err(err) => {
                        warn!(account = %account.title(), error = %err,
                            "fetch failed, account skipped");
                        continue;
                    }
                };
                let dir = entity.path();
                let entity_title = entity.title();
                for item in items {
                    let job = DownloadJob {
                        item,
                        dir: dir.clone(),
                        entity_title: entity_title.clone(),
                    };
                    tokio::select! {
                        _ = cancel.cancelled() => break 'outer,
                        sent = job_tx.send(job) => {
                            if sent.is_err() {
                                break 'outer;
                            }
                        }
                    }
                }
            }
        });
    }
    drop(job_tx);

    for _ in 0..download_workers {
        let job_rx = job_rx.clone();
        let fail_tx = fail_tx.clone();
        let source = source.clone();
        let cancel = cancel.clone();
        supervise("download", cancel.clone(), async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let job = { job_rx.lock().await.recv().await };
                let Some(job) = job else { break };
                if let Err(reason) = run_job(source.as_ref(), &job).await {
                    warn!(entity = %job.entity_title, item = job.item.id, %reason,
                        "download failed");
                    let failed = FailedJob {
                        entity_title: job.entity_title.clone(),
                        item: job.item.clone(),
                        reason,
                    };
                    // The caller drains failures until every worker is done,
                    // so this send cannot wedge.
                    let _ = fail_tx.send(failed).await;
                }
            }
        });
    }
    drop(fail_tx);

    let mut failures = Vec::new();
    while let Some(failed) = fail_rx.recv().await {
        failures.push(failed);
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MediaItem;
    use crate::pipeline::testutil::StubSource;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use tempfile::tempdir;

    fn account(id: u64, screen_name: &str) -> Account {
        Account {
            id,
            screen_name: screen_name.to_string(),
            name: screen_name.to_uppercase(),
            friends_count: 0,
            protected: false,
        }
    }

    fn item(id: u64, secs: i64, urls: Vec<&str>) -> MediaItem {
        MediaItem {
            id,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            urls: urls.into_iter().map(str::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn three_account_end_to_end() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let memos = Arc::new(RunMemos::new());

        // Account 1 was already synced earlier in this run.
        sync_account(&db, &account(1, "done"), root.path(), None, &memos)
            .await
            .unwrap();

        let source = Arc::new(
            StubSource::default()
                .with_media(
                    3,
                    vec![
                        item(31, 200, vec!["https://m/31a.jpg", "https://m/31b.mp4"]),
                        item(30, 100, vec!["https://m/bad.jpg"]),
                    ],
                )
                .with_failing_url("https://m/bad.jpg"),
        );

        let failures = mirror_accounts(
            source.clone(),
            db.clone(),
            vec![account(1, "done"), account(2, "quiet"), account(3, "busy")],
            root.path().to_path_buf(),
            None,
            memos,
            CancellationToken::new(),
            &PipelineOptions::default(),
        )
        .await;

        // The memo hit was not re-fetched; the quiet account produced no jobs.
        assert_eq!(source.fetch_count(1), 0);
        assert_eq!(source.fetch_count(2), 1);
        assert_eq!(source.fetch_count(3), 1);

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].item.id, 30);
        assert!(failures[0].reason.contains("stubbed download failure"));

        // Both files of the healthy item landed in the entity directory.
        let busy_dir = root.path().join("BUSY(@busy)");
        assert!(busy_dir.join("19700101_000320_31_1.bin").is_file());
        assert!(busy_dir.join("19700101_000320_31_2.bin").is_file());

        // Watermark persisted at the newest item even though one job failed.
        let entity = db.locate_entity(3, root.path()).await.unwrap().unwrap();
        assert_eq!(entity.latest_release_at.unwrap().timestamp(), 200);
    }

    #[tokio::test]
    async fn rate_limit_cancels_the_run() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let cancel = CancellationToken::new();

        let source = Arc::new(StubSource::default().with_rate_limit(1));
        let failures = mirror_accounts(
            source,
            db,
            vec![account(1, "limited")],
            root.path().to_path_buf(),
            None,
            Arc::new(RunMemos::new()),
            cancel.clone(),
            &PipelineOptions::default(),
        )
        .await;

        assert!(cancel.is_cancelled());
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn worker_panic_is_contained_and_cancels() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let cancel = CancellationToken::new();

        let source = Arc::new(StubSource::default().with_fetch_panic(1));
        // Returns normally: the panic is caught, the run is cancelled, and
        // the failure queue still closes.
        let failures = mirror_accounts(
            source,
            db,
            vec![account(1, "boom")],
            root.path().to_path_buf(),
            None,
            Arc::new(RunMemos::new()),
            cancel.clone(),
            &PipelineOptions::default(),
        )
        .await;

        assert!(cancel.is_cancelled());
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_run_does_no_work() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let source = Arc::new(StubSource::default().with_media(
            1,
            vec![item(10, 100, vec!["https://m/10.jpg"])],
        ));
        let failures = mirror_accounts(
            source.clone(),
            db.clone(),
            vec![account(1, "nasa")],
            root.path().to_path_buf(),
            None,
            Arc::new(RunMemos::new()),
            cancel,
            &PipelineOptions::default(),
        )
        .await;

        assert!(failures.is_empty());
        assert!(source.downloaded_urls().is_empty());
        assert!(db.locate_entity(1, root.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bad_title_is_skipped_without_stopping_the_batch() {
        let root = tempdir().unwrap();
        let db = Db::open_memory().await.unwrap();

        let source = Arc::new(StubSource::default().with_media(
            2,
            vec![item(20, 100, vec!["https://m/20.jpg"])],
        ));
        let failures = mirror_accounts(
            source.clone(),
            db.clone(),
            vec![account(1, ".."), account(2, "fine")],
            root.path().to_path_buf(),
            None,
            Arc::new(RunMemos::new()),
            CancellationToken::new(),
            &PipelineOptions::default(),
        )
        .await;

        assert!(failures.is_empty());
        assert!(db.locate_entity(1, root.path()).await.unwrap().is_none());
        assert!(db
            .locate_entity(2, Path::new(root.path()))
            .await
            .unwrap()
            .is_some());
        assert_eq!(source.downloaded_urls().len(), 1);
    }
}
