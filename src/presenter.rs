//! Presentation sink for visual and status changes.

use crate::candidate::CandidateId;
use crate::state::Visual;

/// Receives every visible change the engine makes to a candidate.
///
/// Calls for one candidate arrive in pipeline order. In particular the
/// [`Visual::Obscured`] call for an eligible candidate arrives before its
/// image is requested.
pub trait Presenter: Send + Sync {
    /// Apply `visual` to the element and record `status` on it.
    fn present(&self, id: &CandidateId, visual: Visual, status: &str);
}

/// Presenter that writes each change to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn present(&self, id: &CandidateId, visual: Visual, status: &str) {
        tracing::info!(candidate = %id, visual = %visual, status, "Presentation updated");
    }
}
