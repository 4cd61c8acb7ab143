//! Test doubles wrapping a real [`ObjectClient`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::{Artifact, Provider, TransferError};
use crate::ports::{ClientFactory, ObjectClient};

/// Counts calls per operation and forwards them.
pub struct CountingClient<C> {
    inner: C,
    puts: AtomicUsize,
    gets: AtomicUsize,
    lists: AtomicUsize,
}

impl<C> CountingClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
        }
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.gets.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.lists() + self.transfers()
    }
}

#[async_trait]
impl<C: ObjectClient> ObjectClient for CountingClient<C> {
    fn provider(&self) -> Provider {
        self.inner.provider()
    }

    async fn put_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_object(bucket, key, path).await
    }

    async fn get_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_object(bucket, key, path).await
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, Result<String, TransferError>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list_objects(bucket, prefix)
    }
}

type FailWhen = Box<dyn Fn(usize) -> bool + Send + Sync>;

/// Fails put/get calls chosen by call index; listings always pass through.
pub struct FaultyClient<C> {
    inner: C,
    calls: AtomicUsize,
    fail_when: FailWhen,
    make_error: fn() -> TransferError,
}

impl<C> FaultyClient<C> {
    /// The first `n` transfers succeed, every later one fails.
    pub fn fail_after(inner: C, n: usize, make_error: fn() -> TransferError) -> Self {
        Self::with(inner, Box::new(move |call| call >= n), make_error)
    }

    /// The first `n` transfers fail, every later one succeeds.
    pub fn fail_first(inner: C, n: usize, make_error: fn() -> TransferError) -> Self {
        Self::with(inner, Box::new(move |call| call < n), make_error)
    }

    fn with(inner: C, fail_when: FailWhen, make_error: fn() -> TransferError) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            fail_when,
            make_error,
        }
    }

    /// Transfer calls seen so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TransferError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if (self.fail_when)(call) {
            return Err((self.make_error)());
        }
        Ok(())
    }
}

#[async_trait]
impl<C: ObjectClient> ObjectClient for FaultyClient<C> {
    fn provider(&self) -> Provider {
        self.inner.provider()
    }

    async fn put_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError> {
        self.check()?;
        self.inner.put_object(bucket, key, path).await
    }

    async fn get_object(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransferError> {
        self.check()?;
        self.inner.get_object(bucket, key, path).await
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> BoxStream<'a, Result<String, TransferError>> {
        self.inner.list_objects(bucket, prefix)
    }
}

/// Hands out one shared client, after checking credentials.
pub struct SharedClientFactory(pub Arc<dyn ObjectClient>);

impl ClientFactory for SharedClientFactory {
    fn connect(&self, artifact: &Artifact) -> Result<Arc<dyn ObjectClient>, TransferError> {
        artifact.validate_credentials()?;
        Ok(Arc::clone(&self.0))
    }
}

/// Every regular file under `root`, keyed by its `/`-joined relative path.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.insert(key, std::fs::read(&path).unwrap());
            }
        }
    }
    files
}
