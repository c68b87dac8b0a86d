//! Analysis sessions: one submitted text, one request, one reveal pass
//!
//! The reveal pass starts together with the request, so stage headers march
//! while the model server is still working; stage data is shown only once
//! both the response and the pass are done.
//!
//! At most one session is live. Starting a new one cancels the previous
//! occupant under the same lock that installs the new one, and every
//! asynchronous completion carries the [`SessionId`] it was started for, so a
//! stale response or cursor tick is dropped instead of applied.

use crate::display::DisplayModel;
use crate::normalizer::ResultNormalizer;
use crate::provider::{InferenceProvider, PredictRequest, ProviderError, RawInferenceResult};
use crate::scheduler::{RevealPass, RevealProgress, RevealScheduler};
use crate::stages::Stage;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cause reported to the user for every failed request
pub const CONNECTION_ERROR: &str = "connection error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Errors from starting a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("input text is empty")]
    EmptyInput,
}

/// Where the live session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Requesting,
    Revealing,
    Failed { cause: String },
    Complete,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Failed { .. } | Phase::Complete)
    }
}

/// Join data readiness with reveal progress.
///
/// Called whenever either input changes. `Complete` needs both the normalized
/// data and a finished pass.
pub fn join(data_ready: bool, progress: RevealProgress) -> Phase {
    match (data_ready, progress.finished) {
        (true, true) => Phase::Complete,
        (true, false) => Phase::Revealing,
        (false, _) => Phase::Requesting,
    }
}

/// What render surfaces see
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session: Option<SessionId>,
    #[serde(flatten)]
    pub phase: Phase,
    pub progress: RevealProgress,
    /// Present only once the session is complete
    pub model: Option<Arc<DisplayModel>>,
}

impl SessionSnapshot {
    fn idle() -> Self {
        Self {
            session: None,
            phase: Phase::Idle,
            progress: RevealProgress::default(),
            model: None,
        }
    }

    /// Whether the data for `stage` may be shown
    pub fn stage_visible(&self, stage: Stage) -> bool {
        self.model.is_some() && self.progress.reached(stage.index())
    }
}

/// How a session ended, from its own point of view
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Complete(Arc<DisplayModel>),
    Failed(String),
    /// A newer session replaced this one before it finished
    Superseded,
}

/// Returned from [`AnalysisSession::start`]
pub struct SessionHandle {
    id: SessionId,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Latest snapshot, if this session is still the live one
    pub fn current(&self) -> Option<SessionSnapshot> {
        let snapshot = self.state.borrow();
        (snapshot.session == Some(self.id)).then(|| snapshot.clone())
    }

    /// Wait until this session completes, fails, or is replaced.
    pub async fn wait(&mut self) -> SessionOutcome {
        let id = self.id;
        let result = self
            .state
            .wait_for(|s| s.session != Some(id) || s.phase.is_terminal())
            .await
            .map(|s| s.clone());

        match result {
            Ok(snapshot) if snapshot.session != Some(id) => SessionOutcome::Superseded,
            Ok(SessionSnapshot {
                phase: Phase::Failed { cause },
                ..
            }) => SessionOutcome::Failed(cause),
            Ok(SessionSnapshot {
                model: Some(model), ..
            }) => SessionOutcome::Complete(model),
            _ => SessionOutcome::Superseded,
        }
    }
}

/// Owns the single live session and publishes its state.
pub struct AnalysisSession {
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

struct Shared {
    provider: Arc<dyn InferenceProvider>,
    scheduler: RevealScheduler,
    request_timeout: Duration,
    slot: Mutex<Slot>,
    state: watch::Sender<SessionSnapshot>,
}

struct Slot {
    live: Option<Live>,
    normalizer: ResultNormalizer,
}

struct Live {
    id: SessionId,
    request: Option<JoinHandle<()>>,
    pass: Option<RevealPass>,
    model: Option<Arc<DisplayModel>>,
    progress: RevealProgress,
    failure: Option<String>,
}

impl Live {
    fn cancel(self) {
        if let Some(request) = self.request {
            request.abort();
        }
        if let Some(pass) = self.pass {
            pass.cancel();
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let phase = match &self.failure {
            Some(cause) => Phase::Failed {
                cause: cause.clone(),
            },
            None => join(self.model.is_some(), self.progress),
        };
        let model = if phase == Phase::Complete {
            self.model.clone()
        } else {
            None
        };

        SessionSnapshot {
            session: Some(self.id),
            phase,
            progress: self.progress,
            model,
        }
    }
}

impl AnalysisSession {
    /// `request_timeout` bounds the wait for the model server.
    pub fn new(provider: Arc<dyn InferenceProvider>, request_timeout: Duration) -> Self {
        Self::with_normalizer(provider, request_timeout, ResultNormalizer::new())
    }

    pub fn with_normalizer(
        provider: Arc<dyn InferenceProvider>,
        request_timeout: Duration,
        normalizer: ResultNormalizer,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::idle());

        Self {
            shared: Arc::new(Shared {
                provider,
                scheduler: RevealScheduler::new(Stage::count()),
                request_timeout,
                slot: Mutex::new(Slot {
                    live: None,
                    normalizer,
                }),
                state,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Begin analysing `text`, replacing any session in progress.
    ///
    /// Must be called inside a tokio runtime. Blank text is rejected without
    /// contacting the model server and without touching the current state.
    pub fn start(&self, text: &str) -> Result<SessionHandle, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = PredictRequest::new(text);

        let mut slot = self.shared.lock_slot();
        if let Some(previous) = slot.live.take() {
            info!(session = %id, superseded = %previous.id, "Cancelling previous session");
            previous.cancel();
        }

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let outcome = shared.request(&request).await;
            shared.on_response(id, outcome);
        });

        let pass = self.shared.start_pass(id);
        let live = Live {
            id,
            request: Some(task),
            progress: pass.progress(),
            pass: Some(pass),
            model: None,
            failure: None,
        };
        self.shared.publish(live.snapshot());
        slot.live = Some(live);

        info!(
            session = %id,
            chars = text.chars().count(),
            provider = %self.shared.provider.name(),
            "Started analysis"
        );

        Ok(SessionHandle {
            id,
            state: self.shared.state.subscribe(),
        })
    }

    /// Current state of the live session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.state.borrow().clone()
    }

    /// Follow state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.state.subscribe()
    }

    pub fn stage_count(&self) -> usize {
        self.shared.scheduler.stage_count()
    }
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        self.state.send_replace(snapshot);
    }

    async fn request(&self, request: &PredictRequest) -> Result<RawInferenceResult, ProviderError> {
        match tokio::time::timeout(self.request_timeout, self.provider.predict(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        }
    }

    /// The reveal pass for session `id`, reporting back through weak handles
    fn start_pass(self: &Arc<Self>, id: SessionId) -> RevealPass {
        let advance = Arc::downgrade(self);
        let complete = Arc::downgrade(self);
        self.scheduler.start(
            move |cursor| update_progress(&advance, id, |p| p.cursor = Some(cursor)),
            move || update_progress(&complete, id, |p| p.finished = true),
        )
    }

    fn on_response(&self, id: SessionId, outcome: Result<RawInferenceResult, ProviderError>) {
        let mut guard = self.lock_slot();
        let slot = &mut *guard;

        let Some(live) = slot.live.as_mut().filter(|live| live.id == id) else {
            debug!(session = %id, "Discarding response for stale session");
            return;
        };
        live.request = None;

        match outcome {
            Err(e) => {
                warn!(session = %id, error = %e, "Inference request failed");
                live.failure = Some(CONNECTION_ERROR.to_string());
                if let Some(pass) = live.pass.take() {
                    pass.cancel();
                }
            }
            Ok(raw) => {
                let model = Arc::new(slot.normalizer.normalize(raw));
                info!(
                    session = %id,
                    tokens = model.token_count(),
                    sentiment = %model.sentiment,
                    "Normalized inference result"
                );
                live.model = Some(model);
            }
        }

        self.publish(live.snapshot());
    }

    fn on_progress(&self, id: SessionId, update: impl FnOnce(&mut RevealProgress)) {
        let mut slot = self.lock_slot();
        let Some(live) = slot.live.as_mut().filter(|live| live.id == id) else {
            debug!(session = %id, "Discarding reveal step for stale session");
            return;
        };

        update(&mut live.progress);
        if live.progress.finished {
            info!(session = %id, "Reveal complete");
        }
        self.publish(live.snapshot());
    }
}

fn update_progress(shared: &Weak<Shared>, id: SessionId, update: impl FnOnce(&mut RevealProgress)) {
    if let Some(shared) = shared.upgrade() {
        shared.on_progress(id, update);
    }
}
