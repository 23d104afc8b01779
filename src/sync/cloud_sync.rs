use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::categories::{Category, StoredCategoriesPayload};

#[derive(Debug, Error)]
pub enum CloudSyncError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Sync endpoint rejected payload with status {0}")]
    Rejected(u16),
}

/// Fire-and-forget notification that the category set changed.
#[cfg_attr(test, mockall::automock)]
pub trait SyncTrigger {
    fn trigger(&self, categories: &[Category]);
}

impl<T: SyncTrigger + ?Sized> SyncTrigger for &T {
    fn trigger(&self, categories: &[Category]) {
        (**self).trigger(categories)
    }
}

/// For read-only use of the registry.
pub struct NoopTrigger;

impl SyncTrigger for NoopTrigger {
    fn trigger(&self, _categories: &[Category]) {}
}

/// Destination of a category snapshot.
#[async_trait]
pub trait CategorySink: Send + Sync {
    async fn push(&self, payload: &StoredCategoriesPayload) -> Result<(), CloudSyncError>;
}

pub struct HttpCategorySink {
    url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl HttpCategorySink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            access_token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_access_token(mut self, access_token: String) -> Self {
        self.access_token = Some(access_token);
        self
    }
}

#[async_trait]
impl CategorySink for HttpCategorySink {
    async fn push(&self, payload: &StoredCategoriesPayload) -> Result<(), CloudSyncError> {
        let mut request = self.client.post(&self.url).json(payload);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::info!("Category sync response status: {}", status);

        if !status.is_success() {
            return Err(CloudSyncError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Used when no sync endpoint is configured.
pub struct LogSink;

#[async_trait]
impl CategorySink for LogSink {
    async fn push(&self, payload: &StoredCategoriesPayload) -> Result<(), CloudSyncError> {
        tracing::info!(
            "No sync endpoint configured; {} categories kept local",
            payload.categories.len()
        );
        Ok(())
    }
}

/// Coalesces bursts of triggers into one push of the latest snapshot.
///
/// Each trigger replaces the pending snapshot; a background task waits
/// `debounce` after a change before pushing. Push failures are logged and
/// never reach the code that triggered them.
pub struct DebouncedSync {
    pending: watch::Sender<Option<Vec<Category>>>,
    worker: JoinHandle<()>,
}

impl DebouncedSync {
    /// Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn CategorySink>, debounce: Duration) -> Self {
        let (pending, receiver) = watch::channel(None);
        let worker = tokio::spawn(run_sync_loop(receiver, sink, debounce));
        Self { pending, worker }
    }

    /// Flushes any pending snapshot and waits for the worker to finish.
    pub async fn shutdown(self) {
        drop(self.pending);
        if let Err(e) = self.worker.await {
            tracing::error!("Category sync worker failed: {}", e);
        }
    }
}

impl SyncTrigger for DebouncedSync {
    fn trigger(&self, categories: &[Category]) {
        self.pending.send_replace(Some(categories.to_vec()));
    }
}

async fn run_sync_loop(
    mut receiver: watch::Receiver<Option<Vec<Category>>>,
    sink: Arc<dyn CategorySink>,
    debounce: Duration,
) {
    while receiver.changed().await.is_ok() {
        tokio::time::sleep(debounce).await;

        let snapshot = receiver.borrow_and_update().clone();
        let Some(categories) = snapshot else {
            continue;
        };

        let payload = StoredCategoriesPayload::new(categories);
        match sink.push(&payload).await {
            Ok(()) => tracing::debug!("Synced {} categories", payload.categories.len()),
            Err(e) => tracing::warn!("Category sync failed: {}", e),
        }
    }
}
