//! Bulk transfer pipeline: directory <-> key prefix.
//!
//! One producer (directory walker on save, prefix listing on load) feeds a
//! bounded channel; a fixed set of workers drains it. Producer and workers run
//! at the same time, so uploads start before the walk finishes.
//!
//! The first failing task stops the pool: in-flight tasks finish, no new task
//! is taken, and the triggering error is returned. Objects that already made
//! it stay where they are. Bulk transfers are not transactional, and a retry
//! simply overwrites them.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::TryStreamExt;
use tokio::fs;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::local::{directory_prefix, join_key, local_path_for, relative_key};
use crate::domain::{TransferError, TransferTask};
use crate::observability::TransferCounts;
use crate::ports::ObjectClient;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Upload,
    Download,
}

/// Worker pool settings for directory transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkTransfer {
    workers: usize,
    queue_depth: usize,
}

impl BulkTransfer {
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_depth: queue_depth.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Upload every regular file under `root` to `key_prefix`, keeping
    /// relative paths. Symlinks are skipped, not followed.
    pub async fn save_directory(
        &self,
        client: Arc<dyn ObjectClient>,
        bucket: &str,
        key_prefix: &str,
        root: &Path,
    ) -> Result<TransferCounts, TransferError> {
        let meta = fs::metadata(root)
            .await
            .map_err(|e| TransferError::local_io(root, e))?;
        if !meta.is_dir() {
            return Err(TransferError::LocalPathIsFile(root.to_path_buf()));
        }
        let root = fs::canonicalize(root)
            .await
            .map_err(|e| TransferError::local_io(root, e))?;

        let (tx, rx) = mpsc::channel(self.queue_depth);
        let mut tasks = JoinSet::new();
        let prefix = key_prefix.to_string();
        tasks.spawn_blocking(move || Finished::Producer(walk_directory(&root, &prefix, &tx)));

        self.run(client, bucket, Direction::Upload, rx, tasks).await
    }

    /// Download every object under `key_prefix/` into `root`, recreating the
    /// relative layout. `root` is created if needed.
    pub async fn load_directory(
        &self,
        client: Arc<dyn ObjectClient>,
        bucket: &str,
        key_prefix: &str,
        root: &Path,
    ) -> Result<TransferCounts, TransferError> {
        match fs::metadata(root).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(TransferError::LocalPathIsFile(root.to_path_buf()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(root)
                    .await
                    .map_err(|e| TransferError::local_io(root, e))?;
            }
            Err(e) => return Err(TransferError::local_io(root, e)),
        }

        // List "runs/42/", never "runs/42": siblings like "runs/420" stay out.
        let prefix = directory_prefix(key_prefix);
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let mut tasks = JoinSet::new();
        tasks.spawn(list_tasks(
            Arc::clone(&client),
            bucket.to_string(),
            prefix.clone(),
            root.to_path_buf(),
            tx,
        ));

        let counts = self.run(client, bucket, Direction::Download, rx, tasks).await?;
        // listing produced nothing (markers only, or no objects at all)
        if counts.objects == 0 {
            return Err(TransferError::not_found(bucket, &prefix));
        }
        Ok(counts)
    }

    async fn run(
        &self,
        client: Arc<dyn ObjectClient>,
        bucket: &str,
        direction: Direction,
        rx: mpsc::Receiver<TransferTask>,
        mut tasks: JoinSet<Finished>,
    ) -> Result<TransferCounts, TransferError> {
        let (abort, _) = watch::channel(false);
        let abort = Arc::new(abort);
        let ctx = Arc::new(WorkerContext {
            client,
            bucket: bucket.to_string(),
            direction,
            queue: Mutex::new(rx),
            abort: Arc::clone(&abort),
        });
        for worker_id in 0..self.workers {
            let ctx = Arc::clone(&ctx);
            tasks.spawn(async move { Finished::Worker(worker_loop(worker_id, ctx).await) });
        }
        // Workers hold the only receiver now; once they are gone the producer's
        // next send fails and it stops.
        drop(ctx);

        let mut counts = TransferCounts::default();
        let mut failure: Option<Failure> = None;
        let mut producer_failure: Option<Failure> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Finished::Worker(report)) => {
                    counts += report.counts;
                    if failure.is_none() {
                        failure = report.failure;
                    }
                }
                Ok(Finished::Producer(Ok(emitted))) => debug!(emitted, "bulk producer done"),
                Ok(Finished::Producer(Err(failed))) => {
                    warn!(key = %failed.0, error = %failed.1, "bulk producer failed, stopping bulk transfer");
                    abort.send_replace(true);
                    producer_failure = Some(failed);
                }
                Err(join_error) => {
                    abort.send_replace(true);
                    if failure.is_none() {
                        failure = Some((
                            String::new(),
                            TransferError::Internal(format!("bulk transfer task died: {join_error}")),
                        ));
                    }
                }
            }
        }

        settle(counts, failure.or(producer_failure))
    }
}

/// Key (or local path) of the failed task and its error.
type Failure = (String, TransferError);

/// Final result of a pool run. A failure after some objects landed is
/// reported as [`TransferError::PartialBulkFailure`], whoever raised it.
fn settle(counts: TransferCounts, failure: Option<Failure>) -> Result<TransferCounts, TransferError> {
    match failure {
        None => Ok(counts),
        Some((_, err)) if counts.objects == 0 => Err(err),
        Some((key, err)) => Err(TransferError::PartialBulkFailure {
            completed: counts.objects,
            key,
            source: Box::new(err),
        }),
    }
}

impl Default for BulkTransfer {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_QUEUE_DEPTH)
    }
}

/// What a task in the pool's JoinSet returns.
enum Finished {
    Producer(Result<usize, Failure>),
    Worker(WorkerReport),
}

struct WorkerReport {
    counts: TransferCounts,
    /// Key and error of the task that stopped this worker.
    failure: Option<Failure>,
}

struct WorkerContext {
    client: Arc<dyn ObjectClient>,
    bucket: String,
    direction: Direction,
    queue: Mutex<mpsc::Receiver<TransferTask>>,
    abort: Arc<watch::Sender<bool>>,
}

impl WorkerContext {
    async fn next_task(&self) -> Option<TransferTask> {
        self.queue.lock().await.recv().await
    }

    async fn execute(&self, task: &TransferTask) -> Result<u64, TransferError> {
        match self.direction {
            Direction::Upload => {
                self.client
                    .put_object(&self.bucket, task.key(), task.local_path())
                    .await
            }
            Direction::Download => {
                if let Some(parent) = task.local_path().parent() {
                    // "p/a" already landed as a file and "p/a/b" needs it as a directory
                    fs::create_dir_all(parent).await.map_err(|e| match e.kind() {
                        io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory => {
                            TransferError::LocalPathIsFile(parent.to_path_buf())
                        }
                        _ => TransferError::local_io(parent, e),
                    })?;
                }
                self.client
                    .get_object(&self.bucket, task.key(), task.local_path())
                    .await
            }
        }
    }
}

async fn worker_loop(worker_id: usize, ctx: Arc<WorkerContext>) -> WorkerReport {
    let mut abort_rx = ctx.abort.subscribe();
    let mut counts = TransferCounts::default();

    loop {
        // abort が来ていたら新しいタスクは取らない
        if *abort_rx.borrow() {
            break;
        }

        let task = tokio::select! {
            _ = abort_rx.changed() => continue,
            task = ctx.next_task() => task,
        };
        let Some(task) = task else {
            break;
        };

        match ctx.execute(&task).await {
            Ok(bytes) => counts.record(bytes),
            Err(err) => {
                warn!(worker_id, key = task.key(), error = %err, "transfer task failed, stopping bulk transfer");
                ctx.abort.send_replace(true);
                return WorkerReport {
                    counts,
                    failure: Some((task.key().to_string(), err)),
                };
            }
        }
    }

    WorkerReport {
        counts,
        failure: None,
    }
}

/// Walk `root` and emit one task per regular file. Runs on a blocking thread.
fn walk_directory(
    root: &Path,
    key_prefix: &str,
    tx: &mpsc::Sender<TransferTask>,
) -> Result<usize, Failure> {
    let mut pending = vec![root.to_path_buf()];
    let mut emitted = 0;
    let failed_at = |path: &Path, err: TransferError| (path.display().to_string(), err);

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| failed_at(&dir, TransferError::local_io(&dir, e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| failed_at(&dir, TransferError::local_io(&dir, e)))?;
            let path = entry.path();
            // file_type() does not follow symlinks.
            let file_type = entry
                .file_type()
                .map_err(|e| failed_at(&path, TransferError::local_io(&path, e)))?;
            if file_type.is_symlink() {
                debug!(path = %path.display(), "skipping symlink");
                continue;
            }
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let relative = path.strip_prefix(root).map_err(|_| {
                failed_at(
                    &path,
                    TransferError::InvalidPath {
                        path: path.display().to_string(),
                        reason: "path is outside the transfer root",
                    },
                )
            })?;
            let relative = relative_key(relative).map_err(|e| failed_at(&path, e))?;
            let key = join_key(key_prefix, &relative);
            if tx.blocking_send(TransferTask::new(key, path)).is_err() {
                // pool stopped
                return Ok(emitted);
            }
            emitted += 1;
        }
    }
    Ok(emitted)
}

async fn list_tasks(
    client: Arc<dyn ObjectClient>,
    bucket: String,
    prefix: String,
    root: PathBuf,
    tx: mpsc::Sender<TransferTask>,
) -> Finished {
    Finished::Producer(emit_listed(client.as_ref(), &bucket, &prefix, &root, &tx).await)
}

async fn emit_listed(
    client: &dyn ObjectClient,
    bucket: &str,
    prefix: &str,
    root: &Path,
    tx: &mpsc::Sender<TransferTask>,
) -> Result<usize, Failure> {
    let mut listing = client.list_objects(bucket, prefix);
    let mut emitted = 0;
    while let Some(name) = listing
        .try_next()
        .await
        .map_err(|e| (prefix.to_string(), e))?
    {
        let Some(relative) = name.strip_prefix(prefix) else {
            continue;
        };
        // directory markers
        if relative.is_empty() || relative.ends_with('/') {
            continue;
        }
        let local = local_path_for(root, relative).map_err(|e| (name.clone(), e))?;
        if tx.send(TransferTask::new(name, local)).await.is_err() {
            break;
        }
        emitted += 1;
    }
    Ok(emitted)
}
