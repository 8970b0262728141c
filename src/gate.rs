//! Admission filter for discovered candidates.
//!
//! The gate only decides. The engine records the candidate as admitted before
//! asking the gate, and presents an eligible candidate obscured before it
//! requests any fetch.

use std::sync::Arc;

use url::Url;

use crate::candidate::{Discovered, IgnoreReason};
use crate::config::Config;

/// Result of running a candidate through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Analyze the image at this URL.
    Eligible(Url),
    /// Leave the element alone.
    Ignored(IgnoreReason),
}

/// Source and size checks driven by [`Config`].
#[derive(Debug, Clone)]
pub struct CandidateGate {
    config: Arc<Config>,
}

impl CandidateGate {
    /// Create a gate reading from `config`.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Resolve the candidate's image URL and check its origin.
    #[must_use]
    pub fn admit(&self, discovered: &Discovered) -> AdmissionDecision {
        let raw = match discovered.source.raw_url() {
            Ok(raw) => raw,
            Err(reason) => return AdmissionDecision::Ignored(reason),
        };

        match Url::parse(raw) {
            Ok(url) if self.config.is_allowed_source(&url) => AdmissionDecision::Eligible(url),
            Ok(_) => AdmissionDecision::Ignored(IgnoreReason::DisallowedSource),
            Err(e) => {
                tracing::debug!(candidate = %discovered.id, url = raw, error = %e, "Unparseable image URL");
                AdmissionDecision::Ignored(IgnoreReason::DisallowedSource)
            }
        }
    }

    /// Whether decoded dimensions meet the minimum in both axes.
    #[must_use]
    pub fn is_large_enough(&self, width: u32, height: u32) -> bool {
        width >= self.config.min_dimension && height >= self.config.min_dimension
    }
}
