//! Upload stage: key generation, transfer, synthetic progress.
//!
//! ## Keys
//!
//! ```text
//! {destination_prefix}/{unix_millis}-{8 base-36 chars}.{ext}
//! pixels/1760000000000-k3v9q0zz.jpg
//! ```
//!
//! The extension comes from the transformed payload's format, not from the
//! filename the user picked.
//!
//! ## Progress
//!
//! Storage reports nothing until the transfer resolves, so progress is
//! synthesized: every `interval_ms` it advances by `step_percent`, capped at
//! 90. It reaches 100 only after `put` has resolved successfully.
//!
//! ## Cancellation
//!
//! The transfer races the run's [`CancellationToken`]. On cancellation the
//! `put` future and the ticker are dropped, which aborts the transfer, and
//! the outcome is [`UploadOutcome::Cancelled`]. A storage error that arrives
//! after cancellation was requested is also reported as `Cancelled`.

use crate::config::{ProgressConfig, UploadConfig};
use crate::env::{Clock, RandomSource, base36};
use crate::error::UploadError;
use crate::storage::{StorageBackend, StorageError};
use crate::types::Blob;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

/// Synthetic progress never passes this value before the transfer resolves.
pub const PROGRESS_CEILING: u8 = 90;

const SUFFIX_LEN: usize = 8;

/// A stored object's durable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedObject {
    pub public_url: String,
    pub byte_size: u64,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded(UploadedObject),
    Cancelled,
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Rejected { message, retryable } => {
                UploadError::StorageRejected { message, retryable }
            }
            StorageError::Network(message) => UploadError::NetworkFailure { message },
            StorageError::Io(e) => UploadError::NetworkFailure {
                message: e.to_string(),
            },
        }
    }
}

pub struct UploadExecutor {
    storage: Arc<dyn StorageBackend>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    destination_prefix: String,
    progress: ProgressConfig,
}

impl UploadExecutor {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            random,
            destination_prefix: config.destination_prefix.clone(),
            progress: config.progress.clone(),
        }
    }

    /// Build a collision-resistant storage key.
    pub fn generate_key(&self, extension: &str) -> String {
        let millis = self.clock.now_millis();
        let suffix = base36(self.random.next_u64(), SUFFIX_LEN);
        let prefix = self.destination_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{millis}-{suffix}.{extension}")
        } else {
            format!("{prefix}/{millis}-{suffix}.{extension}")
        }
    }

    /// Transfer `blob`, reporting progress through `on_progress`.
    ///
    /// `on_progress` receives strictly increasing values; 100 is delivered
    /// only on success.
    pub async fn upload<F>(
        &self,
        blob: &Blob,
        extension: &str,
        token: &CancellationToken,
        mut on_progress: F,
    ) -> Result<UploadOutcome, UploadError>
    where
        F: FnMut(u8) + Send,
    {
        if token.is_cancelled() {
            return Ok(UploadOutcome::Cancelled);
        }

        let key = self.generate_key(extension);
        tracing::debug!(%key, bytes = blob.len(), "starting upload");

        let period = self.progress.interval();
        let step = self.progress.step_percent;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut progress = 0u8;

        let transfer = self
            .storage
            .put(&key, Arc::clone(&blob.bytes), &blob.content_type);
        tokio::pin!(transfer);

        let result = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(%key, "upload aborted");
                    return Ok(UploadOutcome::Cancelled);
                }
                result = &mut transfer => break result,
                _ = ticker.tick() => {
                    if progress < PROGRESS_CEILING {
                        progress = progress.saturating_add(step).min(PROGRESS_CEILING);
                        on_progress(progress);
                    }
                }
            }
        };

        // An abort can race a transport error; cancellation wins.
        if token.is_cancelled() {
            return Ok(UploadOutcome::Cancelled);
        }

        let stored = result.map_err(UploadError::from)?;
        on_progress(100);
        Ok(UploadOutcome::Uploaded(UploadedObject {
            public_url: self.storage.public_url_for(&stored.stored_path),
            byte_size: blob.len(),
            key: key.clone(),
        }))
    }
}
