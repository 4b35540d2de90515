//! Pipeline controller: the state machine a host talks to.
//!
//! ```text
//! Idle → Validating → Transforming → (Cropping) → Uploading → Succeeded
//!            │              │             │            ├──────→ Failed
//!            └──────────────┴─────────────┼────────────┴──────→ Failed
//!                                         └→ Idle (crop abandoned)
//!                   any active phase ──cancel()──→ Cancelled
//! ```
//!
//! ## Runs and generations
//!
//! Every [`submit_file`](PipelineController::submit_file) or
//! [`retry`](PipelineController::retry) starts a new *run* with a fresh
//! generation id and cancellation token. Starting a run supersedes the
//! previous one: its token is cancelled, the generation moves on, and every
//! tracked reference is released.
//!
//! A run executes its stages sequentially inside one spawned task. Each stage
//! result is committed under the controller lock only if the run's generation
//! is still current; a stale result is dropped without ever being tracked.
//! The lock is never held across an `.await`.
//!
//! ## Notifications
//!
//! Each state change is published as a full [`PipelineState`] snapshot on the
//! optional event channel, in commit order.

use crate::config::{ConfigError, UploadConfig};
use crate::crop::{CenterCrop, CropCoordinator, CropOutcome};
use crate::env::{Clock, RandomSource, SystemClock, ThreadRandom};
use crate::error::{ControllerError, PipelineError, TransformError};
use crate::imaging::{
    EncodedFormat, ImageBackend, OutputFormat, Quality, RustBackend, Transformed, transform,
};
use crate::storage::StorageBackend;
use crate::tracker::{Handle, ResourceTracker, TrackerStats};
use crate::types::{Blob, SourceFile, essence};
use crate::upload::{UploadExecutor, UploadOutcome, UploadedObject};
use crate::validate::validate;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    Transforming,
    Cropping,
    Uploading,
    Succeeded,
    Failed,
    Cancelled,
}

impl Phase {
    /// A run is in flight.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Phase::Validating | Phase::Transforming | Phase::Cropping | Phase::Uploading
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::Cancelled)
    }
}

/// Snapshot of the pipeline, as published to the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineState {
    pub phase: Phase,
    pub progress_percent: u8,
    pub last_error: Option<PipelineError>,
    pub compressed_byte_size: Option<u64>,
    /// Present only while a failed run can be retried.
    pub retained_source: Option<SourceFile>,
    /// Generation of the run this snapshot belongs to.
    pub run: u64,
    /// Tracked reference to the current transform result, for previews.
    pub preview: Option<Handle>,
    pub uploaded: Option<UploadedObject>,
}

/// A transform result registered with the tracker.
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub transformed: Transformed,
    pub handle: Handle,
}

/// Where a run enters the stage sequence.
enum RunStart {
    Validate(SourceFile),
    Transform(SourceFile),
    Upload(SourceFile, TransformResult),
}

struct Inner {
    state: PipelineState,
    tracker: ResourceTracker,
    generation: u64,
    token: CancellationToken,
    /// Encoded bytes of a run that failed at upload; retried without
    /// re-running the transform.
    retained_upload: Option<Transformed>,
    shut_down: bool,
    events: Option<UnboundedSender<PipelineState>>,
}

impl Inner {
    fn publish(&self) {
        if let Some(events) = &self.events {
            // A host that dropped its receiver is not interested any more.
            let _ = events.send(self.state.clone());
        }
    }

    /// Cancel the current run and release everything it tracked.
    fn supersede(&mut self) -> (u64, CancellationToken) {
        self.token.cancel();
        self.generation += 1;
        self.token = CancellationToken::new();
        let released = self.tracker.release_all();
        if released > 0 {
            tracing::debug!(released, "released references of superseded run");
        }
        (self.generation, self.token.clone())
    }

    fn fail(
        &mut self,
        error: PipelineError,
        source: Option<SourceFile>,
        upload: Option<Transformed>,
        allow_retry: bool,
    ) {
        self.tracker.release_all();
        let retain = allow_retry && error.retryable();
        tracing::debug!(run = self.generation, %error, retain, "run failed");
        self.retained_upload = upload.filter(|_| retain);
        self.state.retained_source = source.filter(|_| retain);
        self.state.phase = Phase::Failed;
        self.state.last_error = Some(error);
        self.state.preview = None;
        self.publish();
    }
}

struct Shared {
    inner: Mutex<Inner>,
    config: Arc<UploadConfig>,
    backend: Arc<dyn ImageBackend>,
    cropper: Arc<dyn CropCoordinator>,
    uploader: UploadExecutor,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the run into `phase`. Returns `false` if the run is stale.
    fn enter(&self, run: u64, phase: Phase) -> bool {
        let mut inner = self.lock();
        if inner.generation != run {
            return false;
        }
        if inner.state.phase != phase {
            tracing::debug!(run, ?phase, "entering stage");
            inner.state.phase = phase;
            if phase == Phase::Uploading {
                inner.state.progress_percent = 0;
            }
            inner.publish();
        }
        true
    }

    fn report_progress(&self, run: u64, percent: u8) {
        let mut inner = self.lock();
        if inner.generation == run
            && inner.state.phase == Phase::Uploading
            && percent > inner.state.progress_percent
        {
            inner.state.progress_percent = percent;
            inner.publish();
        }
    }

    async fn execute(self: Arc<Self>, run: u64, token: CancellationToken, start: RunStart) {
        let (source, result) = match start {
            RunStart::Validate(file) => {
                if let Err(err) = validate(&file, &self.config) {
                    let mut inner = self.lock();
                    if inner.generation == run {
                        inner.fail(err.into(), None, None, false);
                    }
                    return;
                }
                if !self.enter(run, Phase::Transforming) {
                    return;
                }
                let Some(result) = self.transform_stage(run, &token, &file).await else {
                    return;
                };
                (file, result)
            }
            RunStart::Transform(file) => {
                let Some(result) = self.transform_stage(run, &token, &file).await else {
                    return;
                };
                (file, result)
            }
            RunStart::Upload(file, result) => {
                // Retained bytes have already been through the crop stage.
                self.upload_stage(run, &token, result, file).await;
                return;
            }
        };

        let Some(result) = self.crop_stage(run, &token, result, &source).await else {
            return;
        };
        self.upload_stage(run, &token, result, source).await;
    }

    async fn transform_stage(
        &self,
        run: u64,
        token: &CancellationToken,
        file: &SourceFile,
    ) -> Option<TransformResult> {
        let backend = Arc::clone(&self.backend);
        let config = Arc::clone(&self.config);
        let job_file = file.clone();
        let job =
            tokio::task::spawn_blocking(move || transform(backend.as_ref(), &job_file, &config));

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            joined = job => joined.unwrap_or_else(|e| {
                Err(TransformError::EncodeFailed(format!("transform task failed: {e}")))
            }),
        };

        let mut inner = self.lock();
        if inner.generation != run {
            tracing::warn!(run, "discarding stale transform result");
            return None;
        }
        match outcome {
            Ok(transformed) => {
                let handle = inner.tracker.track(Arc::clone(&transformed.blob.bytes));
                inner.state.compressed_byte_size = Some(transformed.byte_len());
                inner.state.preview = Some(handle);
                Some(TransformResult {
                    transformed,
                    handle,
                })
            }
            Err(err) => {
                inner.fail(err.into(), Some(file.clone()), None, self.config.allow_retry);
                None
            }
        }
    }

    async fn crop_stage(
        &self,
        run: u64,
        token: &CancellationToken,
        result: TransformResult,
        source: &SourceFile,
    ) -> Option<TransformResult> {
        let Some(ratio) = self.config.crop_aspect_ratio else {
            return Some(result);
        };
        if !self.enter(run, Phase::Cropping) {
            return None;
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            outcome = self.cropper.crop(&result.transformed.blob, ratio) => outcome,
        };

        let mut inner = self.lock();
        if inner.generation != run {
            tracing::warn!(run, "discarding stale crop result");
            return None;
        }
        match outcome {
            Ok(CropOutcome::Cropped { blob, dimensions }) => {
                inner.tracker.release(result.handle);
                let handle = inner.tracker.track(Arc::clone(&blob.bytes));
                let transformed = Transformed {
                    format: format_of(&blob),
                    blob,
                    dimensions,
                    source_extension: result.transformed.source_extension,
                };
                inner.state.compressed_byte_size = Some(transformed.byte_len());
                inner.state.preview = Some(handle);
                Some(TransformResult {
                    transformed,
                    handle,
                })
            }
            Ok(CropOutcome::Cancelled) => {
                tracing::debug!(run, "crop abandoned");
                inner.tracker.release_all();
                inner.retained_upload = None;
                inner.state = PipelineState {
                    run,
                    ..PipelineState::default()
                };
                inner.publish();
                None
            }
            Err(err) => {
                let error = TransformError::EncodeFailed(err.to_string());
                inner.fail(
                    error.into(),
                    Some(source.clone()),
                    None,
                    self.config.allow_retry,
                );
                None
            }
        }
    }

    async fn upload_stage(
        &self,
        run: u64,
        token: &CancellationToken,
        result: TransformResult,
        source: SourceFile,
    ) {
        if !self.enter(run, Phase::Uploading) {
            return;
        }
        let extension = result.transformed.extension();
        let outcome = self
            .uploader
            .upload(&result.transformed.blob, &extension, token, |percent| {
                self.report_progress(run, percent)
            })
            .await;

        let mut inner = self.lock();
        if inner.generation != run {
            tracing::warn!(run, "discarding stale upload outcome");
            return;
        }
        match outcome {
            Ok(UploadOutcome::Uploaded(object)) => {
                tracing::debug!(run, url = %object.public_url, "upload succeeded");
                inner.tracker.release_all();
                inner.retained_upload = None;
                inner.state.phase = Phase::Succeeded;
                inner.state.progress_percent = 100;
                inner.state.preview = None;
                inner.state.retained_source = None;
                inner.state.uploaded = Some(object);
                inner.publish();
            }
            Ok(UploadOutcome::Cancelled) => {
                inner.tracker.release_all();
                inner.state.phase = Phase::Cancelled;
                inner.state.preview = None;
                inner.publish();
            }
            Err(err) => inner.fail(
                err.into(),
                Some(source),
                Some(result.transformed),
                self.config.allow_retry,
            ),
        }
    }
}

fn format_of(blob: &Blob) -> EncodedFormat {
    match essence(&blob.content_type).as_str() {
        "image/png" => EncodedFormat::Encoded(OutputFormat::Png),
        "image/jpeg" => EncodedFormat::Encoded(OutputFormat::Jpeg),
        other => EncodedFormat::Original(other.to_string()),
    }
}

/// Assembles a [`PipelineController`] from its collaborators.
///
/// Everything but the configuration and storage has a production default:
/// [`RustBackend`], [`CenterCrop`] at the configured compression quality,
/// [`SystemClock`], [`ThreadRandom`].
pub struct PipelineBuilder {
    config: UploadConfig,
    storage: Arc<dyn StorageBackend>,
    backend: Arc<dyn ImageBackend>,
    cropper: Option<Arc<dyn CropCoordinator>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    events: Option<UnboundedSender<PipelineState>>,
}

impl PipelineBuilder {
    pub fn with_backend(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_cropper(mut self, cropper: Arc<dyn CropCoordinator>) -> Self {
        self.cropper = Some(cropper);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Publish every state change on `events`.
    pub fn with_events(mut self, events: UnboundedSender<PipelineState>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<PipelineController, ConfigError> {
        self.config.validate()?;
        let uploader = UploadExecutor::new(self.storage, self.clock, self.random, &self.config);
        let quality = Quality::from_fraction(self.config.compression_quality);
        let cropper = self
            .cropper
            .unwrap_or_else(|| Arc::new(CenterCrop::new(quality)));
        Ok(PipelineController {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: PipelineState::default(),
                    tracker: ResourceTracker::new(),
                    generation: 0,
                    token: CancellationToken::new(),
                    retained_upload: None,
                    shut_down: false,
                    events: self.events,
                }),
                config: Arc::new(self.config),
                backend: self.backend,
                cropper,
                uploader,
            }),
        })
    }
}

/// One upload pipeline. Handles a single file at a time.
///
/// Entry points that start a run spawn onto the current tokio runtime and
/// must be called from within one.
pub struct PipelineController {
    shared: Arc<Shared>,
}

impl PipelineController {
    pub fn builder(config: UploadConfig, storage: Arc<dyn StorageBackend>) -> PipelineBuilder {
        PipelineBuilder {
            config,
            storage,
            backend: Arc::new(RustBackend::new()),
            cropper: None,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            events: None,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.shared.config
    }

    /// Start a run for `file`, superseding any run in flight (including one
    /// waiting on the crop collaborator).
    pub fn submit_file(&self, file: SourceFile) -> Result<JoinHandle<()>, ControllerError> {
        let (run, token) = {
            let mut inner = self.shared.lock();
            if inner.shut_down {
                return Err(ControllerError::ShutDown);
            }
            if inner.state.phase.is_active() {
                tracing::debug!(
                    run = inner.generation,
                    phase = ?inner.state.phase,
                    "superseding active run"
                );
            }
            let (run, token) = inner.supersede();
            inner.retained_upload = None;
            inner.state = PipelineState {
                phase: Phase::Validating,
                run,
                ..PipelineState::default()
            };
            tracing::debug!(run, file = %file.filename, bytes = file.byte_len, "run started");
            inner.publish();
            (run, token)
        };
        Ok(self.spawn(run, token, RunStart::Validate(file)))
    }

    /// Retry the last failed run.
    ///
    /// A run that failed at upload re-sends its retained encoded bytes;
    /// otherwise the transform is re-run on the retained source. Validation
    /// is never repeated.
    pub fn retry(&self) -> Result<JoinHandle<()>, ControllerError> {
        let (run, token, start) = {
            let mut inner = self.shared.lock();
            if inner.shut_down {
                return Err(ControllerError::ShutDown);
            }
            if !self.shared.config.allow_retry {
                return Err(ControllerError::RetryDisabled);
            }
            if inner.state.phase != Phase::Failed {
                return Err(ControllerError::NothingToRetry);
            }
            let source = inner
                .state
                .retained_source
                .clone()
                .ok_or(ControllerError::NothingToRetry)?;
            let upload = inner.retained_upload.take();
            let (run, token) = inner.supersede();

            let mut state = PipelineState {
                run,
                ..PipelineState::default()
            };
            let start = match upload {
                Some(transformed) => {
                    let handle = inner.tracker.track(Arc::clone(&transformed.blob.bytes));
                    state.phase = Phase::Uploading;
                    state.compressed_byte_size = Some(transformed.byte_len());
                    state.preview = Some(handle);
                    RunStart::Upload(
                        source,
                        TransformResult {
                            transformed,
                            handle,
                        },
                    )
                }
                None => {
                    state.phase = Phase::Transforming;
                    RunStart::Transform(source)
                }
            };
            tracing::debug!(run, phase = ?state.phase, "retrying");
            inner.state = state;
            inner.publish();
            (run, token, start)
        };
        Ok(self.spawn(run, token, start))
    }

    /// Cancel the active run. Returns `false` if nothing was in flight.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.lock();
        if !inner.state.phase.is_active() {
            return false;
        }
        let (run, _) = inner.supersede();
        tracing::debug!(run = inner.state.run, "run cancelled");
        inner.retained_upload = None;
        inner.state = PipelineState {
            phase: Phase::Cancelled,
            run,
            ..PipelineState::default()
        };
        inner.publish();
        true
    }

    /// Return to `Idle`, dropping retained files. Cancels an active run.
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        let (run, _) = inner.supersede();
        inner.retained_upload = None;
        inner.state = PipelineState {
            run,
            ..PipelineState::default()
        };
        inner.publish();
    }

    /// Host teardown: cancel, release everything, refuse later submissions.
    pub fn shutdown(&self) {
        let mut inner = self.shared.lock();
        if inner.shut_down {
            return;
        }
        inner.shut_down = true;
        let active = inner.state.phase.is_active();
        let (run, _) = inner.supersede();
        inner.retained_upload = None;
        inner.state.retained_source = None;
        inner.state.preview = None;
        if active {
            inner.state = PipelineState {
                phase: Phase::Cancelled,
                run,
                ..PipelineState::default()
            };
            inner.publish();
        }
        tracing::debug!("pipeline shut down");
    }

    pub fn state(&self) -> PipelineState {
        self.shared.lock().state.clone()
    }

    /// Bytes behind a live tracked reference (e.g. [`PipelineState::preview`]).
    pub fn resolve(&self, handle: Handle) -> Option<Arc<[u8]>> {
        self.shared.lock().tracker.resolve(handle)
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.shared.lock().tracker.stats()
    }

    fn spawn(&self, run: u64, token: CancellationToken, start: RunStart) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.shared).execute(run, token, start))
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
