//! Per-candidate decision engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::{Stream, StreamExt};
use url::Url;

use crate::candidate::{Candidate, CandidateId, Discovered, Failure, IgnoreReason, Reason};
use crate::classifier::PixelClassifier;
use crate::config::Config;
use crate::decoder::ImageDecoder;
use crate::error::Result;
use crate::gate::{AdmissionDecision, CandidateGate};
use crate::interaction::{Interaction, InteractionHandler, InteractionRouter};
use crate::presenter::{Presenter, TracingPresenter};
use crate::state::{Event, MosaicState};

/// Outcome of [`MosaicEngine::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Obscured and ready for analysis of `url`.
    Admitted {
        /// Resolved image URL.
        url: Url,
        /// Token identifying this admission of the element.
        generation: u64,
    },
    /// Rejected before any fetch.
    Ignored(IgnoreReason),
    /// The identity was admitted before; nothing changed.
    AlreadySeen,
}

/// Outcome of [`MosaicEngine::interact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// The override trap fired: the candidate is revealed and the interaction
    /// was suppressed.
    Overridden,
    /// The interaction went to the registered handlers as usual.
    Delivered,
}

/// The engine owning every candidate's state.
///
/// Create once per document and feed it discovery notifications, either one
/// at a time with [`MosaicEngine::process`] or as a stream with
/// [`MosaicEngine::run`]. Pipelines for different candidates run
/// concurrently on the calling task; each candidate's own steps are strictly
/// ordered (obscure, fetch, classify, decide).
pub struct MosaicEngine<D> {
    config: Arc<Config>,
    gate: CandidateGate,
    classifier: PixelClassifier,
    decoder: D,
    presenter: Arc<dyn Presenter>,
    candidates: Mutex<HashMap<CandidateId, Candidate>>,
    generations: AtomicU64,
    router: InteractionRouter,
}

impl<D: ImageDecoder> MosaicEngine<D> {
    /// Create an engine from a validated configuration.
    ///
    /// Presentation changes go to a [`TracingPresenter`] until replaced with
    /// [`MosaicEngine::with_presenter`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if `config` fails validation.
    pub fn new(config: Config, decoder: D) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            gate: CandidateGate::new(Arc::clone(&config)),
            classifier: PixelClassifier::new(config.color_clusters.clone()),
            config,
            decoder,
            presenter: Arc::new(TracingPresenter),
            candidates: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
            router: InteractionRouter::new(),
        })
    }

    /// Replace the presentation sink.
    #[must_use]
    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register another consumer of interactions, e.g. a lightbox.
    ///
    /// Handlers see every interaction except the one an override trap
    /// suppresses.
    pub fn register_handler(&self, handler: Arc<dyn InteractionHandler>) {
        self.router.register(handler);
    }

    /// Admit a discovered candidate.
    ///
    /// Runs synchronously. An eligible candidate is marked
    /// [`MosaicState::Protected`] and presented obscured before this returns,
    /// so before any fetch can be issued. Admitting a known identity again is a
    /// no-op; after [`MosaicEngine::forget`] the identity counts as a new
    /// element with a new generation.
    pub fn admit(&self, discovered: &Discovered) -> Admission {
        let id = &discovered.id;
        let generation = {
            let mut candidates = self.records();
            if candidates.contains_key(id) {
                tracing::trace!(candidate = %id, "Already admitted");
                return Admission::AlreadySeen;
            }
            let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
            let mut candidate = Candidate::new(id.clone());
            candidate.generation = generation;
            candidates.insert(id.clone(), candidate);
            generation
        };

        match self.gate.admit(discovered) {
            AdmissionDecision::Ignored(reason) => {
                self.apply(id, generation, Event::Ineligible, |c| {
                    c.reason = Some(Reason::Ignored(reason));
                });
                Admission::Ignored(reason)
            }
            AdmissionDecision::Eligible(url) => {
                let source = url.clone();
                self.apply(id, generation, Event::Eligible, |c| c.source_url = Some(source));
                Admission::Admitted { url, generation }
            }
        }
    }

    /// Run one candidate's whole pipeline.
    ///
    /// Returns the state the candidate settled in, or `None` if it was
    /// forgotten while in flight (even if it was admitted again since).
    pub async fn process(&self, discovered: Discovered) -> Option<MosaicState> {
        match self.admit(&discovered) {
            Admission::Admitted { url, generation } => {
                self.analyze(&discovered.id, generation, &url).await
            }
            Admission::Ignored(_) | Admission::AlreadySeen => self.state(&discovered.id),
        }
    }

    /// Drive every notification from `feed` to completion.
    ///
    /// Pipelines run concurrently without a limit; completion order across
    /// candidates is unspecified.
    pub async fn run<S>(&self, feed: S)
    where
        S: Stream<Item = Discovered>,
    {
        feed.for_each_concurrent(None, |discovered| async move {
            self.process(discovered).await;
        })
        .await;
    }

    async fn analyze(&self, id: &CandidateId, generation: u64, url: &Url) -> Option<MosaicState> {
        let decoded = match self.decoder.decode(url).await {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(candidate = %id, url = %url, error = %e, "Image failed to load");
                return self.fail(id, generation, Failure::Load(e.to_string()));
            }
        };

        let dimensions = (decoded.width, decoded.height);
        if !self.gate.is_large_enough(decoded.width, decoded.height) {
            return self.apply(id, generation, Event::TooSmall, |c| {
                c.dimensions = Some(dimensions);
                c.reason = Some(Reason::Ignored(IgnoreReason::Small));
            });
        }

        match self
            .classifier
            .classify(&decoded.pixels, decoded.width, decoded.height)
        {
            Ok(result) => {
                let event = Event::Classified {
                    ratio: result.ratio,
                    threshold: self.config.threshold,
                };
                self.apply(id, generation, event, |c| {
                    c.dimensions = Some(dimensions);
                    c.classification = Some(result);
                })
            }
            Err(e) => {
                tracing::warn!(candidate = %id, error = %e, "Pixels could not be read");
                self.fail(id, generation, Failure::Read(e.to_string()))
            }
        }
    }

    fn fail(&self, id: &CandidateId, generation: u64, failure: Failure) -> Option<MosaicState> {
        self.apply(id, generation, Event::Failed, |c| {
            c.reason = Some(Reason::Failed(failure));
        })
    }

    /// Deliver a user interaction to candidate `id`.
    ///
    /// The first interaction with a retained or failed candidate fires its
    /// override trap: the candidate is revealed, `interaction` is marked
    /// default-prevented and propagation-stopped, and no registered handler
    /// sees it. Every other interaction goes to the handlers unchanged.
    pub fn interact(&self, id: &CandidateId, interaction: &mut Interaction) -> InteractionOutcome {
        if self.router.dispatch(id, interaction) {
            let generation = self.records().get(id).map(|c| c.generation);
            if let Some(generation) = generation {
                self.apply(id, generation, Event::Override, |_| {});
            }
            InteractionOutcome::Overridden
        } else {
            InteractionOutcome::Delivered
        }
    }

    /// Drop the record for an element that left the document.
    ///
    /// An in-flight pipeline for it still completes but has no further
    /// visible effect.
    pub fn forget(&self, id: &CandidateId) -> Option<Candidate> {
        let removed = self.records().remove(id)?;
        if let Some(handle) = &removed.trap {
            self.router.traps().release(handle);
        }
        tracing::debug!(candidate = %id, generation = removed.generation, "Candidate forgotten");
        Some(removed)
    }

    /// Current state of `id`, if known.
    #[must_use]
    pub fn state(&self, id: &CandidateId) -> Option<MosaicState> {
        self.records().get(id).map(|c| c.state)
    }

    /// A copy of the record for `id`, if known.
    #[must_use]
    pub fn candidate(&self, id: &CandidateId) -> Option<Candidate> {
        self.records().get(id).cloned()
    }

    /// Copies of every record, ordered by identity.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Candidate> {
        let mut all: Vec<_> = self.records().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    fn records(&self) -> MutexGuard<'_, HashMap<CandidateId, Candidate>> {
        self.candidates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move `id` through the state table, then present the result.
    ///
    /// Returns `None` without presenting if the candidate was forgotten, was
    /// admitted again under a newer generation, or the table rejects the event.
    fn apply(
        &self,
        id: &CandidateId,
        generation: u64,
        event: Event,
        edit: impl FnOnce(&mut Candidate),
    ) -> Option<MosaicState> {
        let (state, visual, status) = {
            let mut candidates = self.records();
            let candidate = candidates.get_mut(id)?;
            if candidate.generation != generation {
                tracing::debug!(
                    candidate = %id,
                    stale = generation,
                    current = candidate.generation,
                    "Dropping result of a superseded pipeline"
                );
                return None;
            }
            let next = match candidate.state.next(event) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!(candidate = %id, error = %e, "Transition rejected");
                    return None;
                }
            };
            candidate.state = next;
            edit(candidate);

            // Armed before the lock drops so no interaction can slip past an
            // obscured candidate.
            if next.awaits_override() {
                if let Some(handle) = self.router.traps().arm(id) {
                    tracing::debug!(candidate = %handle.candidate(), "Override trap armed");
                    candidate.trap = Some(handle);
                }
            }
            (next, candidate.visual(), candidate.status())
        };

        tracing::debug!(candidate = %id, ?state, status = %status, "Candidate transitioned");
        self.presenter.present(id, visual, &status);
        Some(state)
    }
}

impl<D> std::fmt::Debug for MosaicEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tracked = self.candidates.lock().map_or(0, |c| c.len());
        f.debug_struct("MosaicEngine")
            .field("config", &self.config)
            .field("candidates", &tracked)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
