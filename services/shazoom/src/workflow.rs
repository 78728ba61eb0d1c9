//!
//! src/workflow.rs  Oct 16th, 2026
//!
//! Identification workflow. One attempt runs
//!     Idle -> Uploading -> Ready -> Identifying -> Completed | Failed
//! for a local file, or Idle -> Identifying -> ... for an example sample.
//! Every selection starts a new attempt; completions belonging to an older
//! attempt are dropped instead of overwriting the newer state.
//!

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::ElapsedClock;
use crate::config::WorkflowConfig;
use crate::errors::ShazoomError;
use crate::samples;
use crate::types::{IdentificationResult, UploadDestination, UploadReference, UploadTarget};
use crate::upload::{self, LocalFile, UploadCoordinator};

const EVENT_CAPACITY: usize = 64;

/// The external collaborators: destination issuer, object store and the
/// identification endpoint
#[async_trait]
pub trait IdentifyBackend: Send + Sync {
    async fn warm_up(&self) -> Result<(), ShazoomError>;
    async fn upload_destination(&self) -> Result<UploadDestination, ShazoomError>;
    async fn transmit(&self, target: &UploadTarget, file: &LocalFile) -> Result<(), ShazoomError>;
    async fn identify(&self, reference: &UploadReference) ->
        Result<IdentificationResult, ShazoomError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Upload,
    Identification
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Uploading,
    /// uploaded and waiting for the user to submit
    Ready(UploadReference),
    Identifying,
    Completed(IdentificationResult),
    Failed(Failure)
}

/// State without its payload, for events and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    Ready,
    Identifying,
    Completed,
    Failed
}

impl WorkflowState {
    pub fn phase(&self) -> Phase {
        match self {
            WorkflowState::Idle => Phase::Idle,
            WorkflowState::Uploading => Phase::Uploading,
            WorkflowState::Ready(_) => Phase::Ready,
            WorkflowState::Identifying => Phase::Identifying,
            WorkflowState::Completed(_) => Phase::Completed,
            WorkflowState::Failed(_) => Phase::Failed
        }
    }

}

impl Phase {
    /// Uploading or identifying; the clock only runs here
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Uploading | Phase::Identifying)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub attempt: u64,
    pub from: Phase,
    pub to: Phase
}

#[derive(Debug)]
struct Inner {
    state: WorkflowState,
    attempt: u64,
    clock: ElapsedClock
}

pub struct Workflow<B: ?Sized> {
    backend: Arc<B>,
    config: WorkflowConfig,
    uploader: UploadCoordinator,
    inner: Mutex<Inner>,
    events: broadcast::Sender<Transition>
}

impl<B> Workflow<B>
where
    B: IdentifyBackend + ?Sized
{
    pub fn new(backend: Arc<B>, config: WorkflowConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            config,
            uploader: UploadCoordinator::new(config.max_upload_bytes),
            inner: Mutex::new(Inner {
                state: WorkflowState::Idle,
                attempt: 0,
                clock: ElapsedClock::new()
            }),
            events
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.events.subscribe()
    }

    pub fn state(&self) -> WorkflowState {
        self.lock().state.clone()
    }

    #[cfg(test)]
    pub fn attempt(&self) -> u64 {
        self.lock().attempt
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.lock().clock.seconds()
    }

    pub fn is_low_confidence(&self, result: &IdentificationResult) -> bool {
        result.is_low_confidence(self.config.low_confidence_percent)
    }

    /// Wake the backend up; failures are logged and otherwise ignored
    pub async fn warm_up(&self) {
        match self.backend.warm_up().await {
            Ok(()) => debug!("workflow.warmup.ok"),
            Err(e) => warn!(error = %e, "workflow.warmup.failed")
        }
    }

    fn set_state(&self, inner: &mut Inner, next: WorkflowState) {
        match &next {
            WorkflowState::Uploading | WorkflowState::Identifying => inner.clock.start(),
            WorkflowState::Idle | WorkflowState::Ready(_) => inner.clock.reset(),
            WorkflowState::Completed(_) | WorkflowState::Failed(_) => inner.clock.stop()
        }
        let transition = Transition {
            attempt: inner.attempt,
            from: inner.state.phase(),
            to: next.phase()
        };
        info!(
            attempt = transition.attempt,
            from = ?transition.from,
            to = ?transition.to,
            "workflow.transition"
        );
        inner.state = next;
        // nobody listening is fine
        let _ = self.events.send(transition);
    }

    /// A new selection: discard the previous attempt and return to Idle
    fn begin(&self) -> u64 {
        let mut inner = self.lock();
        inner.attempt += 1;
        let attempt = inner.attempt;
        self.set_state(&mut inner, WorkflowState::Idle);
        attempt
    }

    /// Apply `next` only if `attempt` is still the latest one
    fn advance(&self, attempt: u64, next: WorkflowState) -> Result<(), ShazoomError> {
        let mut inner = self.lock();
        if inner.attempt != attempt {
            debug!(attempt, latest = inner.attempt, to = ?next.phase(), "workflow.stale");
            return Err(ShazoomError::Superseded { attempt });
        }
        self.set_state(&mut inner, next);
        Ok(())
    }

    ///
    /// Select a local file and upload it. Files failing the pre-flight
    /// checks leave the workflow in Idle without any request being made.
    /// On success the workflow waits in Ready for `submit`.
    ///
    pub async fn select_file(&self, file: LocalFile) -> Result<UploadReference, ShazoomError> {
        let attempt = self.begin();

        if let Err(e) = upload::validate(&file, self.config.max_upload_bytes) {
            warn!(attempt, file = file.name(), error = %e, "workflow.rejected");
            return Err(e);
        }

        self.advance(attempt, WorkflowState::Uploading)?;
        match self.uploader.upload(self.backend.as_ref(), &file).await {
            Ok(reference) => {
                self.advance(attempt, WorkflowState::Ready(reference.clone()))?;
                Ok(reference)
            },
            Err(e) => {
                self.advance(attempt, WorkflowState::Failed(Failure {
                    kind: FailureKind::Upload,
                    message: e.user_message()
                }))?;
                Err(e)
            }
        }
    }

    /// Identify the uploaded file held in Ready
    pub async fn submit(&self) -> Result<IdentificationResult, ShazoomError> {
        let (attempt, reference) = {
            let inner = self.lock();
            match &inner.state {
                WorkflowState::Ready(reference) => (inner.attempt, reference.clone()),
                other => return Err(ShazoomError::Identification(
                    format!("nothing to identify while {:?}", other.phase())
                ))
            }
        };
        self.identify(attempt, reference).await
    }

    /// Example samples are already stored, so they skip Uploading
    pub async fn select_sample(&self, reference: UploadReference) ->
        Result<IdentificationResult, ShazoomError> {
        let attempt = self.begin();
        self.identify(attempt, reference).await
    }

    /// A sample dropped onto the upload area
    pub async fn drop_sample(&self, payload: &str) -> Result<IdentificationResult, ShazoomError> {
        let payload = samples::parse_drag_payload(payload)?;
        debug!(sample = %payload.id, file_key = %payload.file_key, "workflow.drop");
        self.select_sample(payload.reference()).await
    }

    async fn identify(&self, attempt: u64, reference: UploadReference) ->
        Result<IdentificationResult, ShazoomError> {
        self.advance(attempt, WorkflowState::Identifying)?;

        match self.backend.identify(&reference).await {
            Ok(result) => {
                self.advance(attempt, WorkflowState::Completed(result.clone()))?;
                info!(
                    attempt,
                    file_key = %reference,
                    matched = result.matched_track.is_some(),
                    confidence = result.confidence_percent,
                    "workflow.identified"
                );
                Ok(result)
            },
            Err(e) => {
                let e = match e {
                    ShazoomError::Identification(_) => e,
                    other => ShazoomError::Identification(other.to_string())
                };
                self.advance(attempt, WorkflowState::Failed(Failure {
                    kind: FailureKind::Identification,
                    message: e.user_message()
                }))?;
                Err(e)
            }
        }
    }
}
