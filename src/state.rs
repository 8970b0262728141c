//! Candidate lifecycle states and the transition table.

use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle state of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MosaicState {
    /// Discovered but not yet admitted.
    Unprocessed,
    /// Obscured while its image is fetched and classified.
    Protected,
    /// Revealed by the user through the override trap.
    ManualRevealed,
    /// Revealed because its ratio fell below the threshold.
    AutoRevealed,
    /// Kept obscured because its ratio reached the threshold.
    RetainedProtected,
    /// Not analyzed; see the candidate's reason.
    Ignored,
    /// Fetch, decode or pixel read failed. Stays obscured.
    Error,
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// The gate rejected the candidate before any fetch.
    Ineligible,
    /// The gate accepted the candidate.
    Eligible,
    /// The decoded image is below the minimum dimension.
    TooSmall,
    /// Classification finished.
    Classified {
        /// Safety ratio in percent.
        ratio: f64,
        /// Configured auto-reveal threshold in percent.
        threshold: f64,
    },
    /// Fetch, decode or classification failed.
    Failed,
    /// The user triggered the override trap.
    Override,
}

impl MosaicState {
    /// Apply `event`, returning the next state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] for any pair outside the table.
    pub fn next(self, event: Event) -> Result<Self> {
        use MosaicState::{
            AutoRevealed, Error as Failed, Ignored, ManualRevealed, Protected, RetainedProtected,
            Unprocessed,
        };

        let to = match (self, event) {
            (Unprocessed, Event::Ineligible) | (Protected, Event::TooSmall) => Ignored,
            (Unprocessed, Event::Eligible) => Protected,
            (Protected, Event::Classified { ratio, threshold }) => {
                if ratio < threshold {
                    AutoRevealed
                } else {
                    RetainedProtected
                }
            }
            (Protected, Event::Failed) => Failed,
            (RetainedProtected | Failed, Event::Override) => ManualRevealed,
            (from, event) => return Err(Error::InvalidTransition { from, event }),
        };
        Ok(to)
    }

    /// Whether no automatic transition leaves this state.
    #[must_use]
    pub fn is_settled(self) -> bool {
        !matches!(self, Self::Unprocessed | Self::Protected)
    }

    /// Whether an override trap belongs on a candidate in this state.
    #[must_use]
    pub fn awaits_override(self) -> bool {
        matches!(self, Self::RetainedProtected | Self::Error)
    }

    /// Visual treatment for this state.
    ///
    /// `Ignored` is ambiguous on its own (rejected up front vs. found too
    /// small after protection), so callers pass the treatment explicitly for
    /// that case; here it maps to [`Visual::Untouched`].
    #[must_use]
    pub fn visual(self) -> Visual {
        match self {
            Self::Unprocessed | Self::Ignored => Visual::Untouched,
            Self::Protected | Self::RetainedProtected | Self::Error => Visual::Obscured,
            Self::AutoRevealed | Self::ManualRevealed => Visual::Revealed,
        }
    }
}

/// What the presentation layer should do with the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visual {
    /// Leave the element as the page rendered it.
    Untouched,
    /// Apply the obscuring treatment.
    Obscured,
    /// Remove the obscuring treatment.
    Revealed,
}

impl Visual {
    /// CSS class the presentation layer puts on the element, if any.
    #[must_use]
    pub fn css_class(self) -> Option<&'static str> {
        match self {
            Self::Untouched => None,
            Self::Obscured => Some("mosaic-applied"),
            Self::Revealed => Some("mosaic-removed"),
        }
    }
}

impl fmt::Display for Visual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.css_class().unwrap_or("untouched"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [MosaicState; 7] = [
        MosaicState::Unprocessed,
        MosaicState::Protected,
        MosaicState::ManualRevealed,
        MosaicState::AutoRevealed,
        MosaicState::RetainedProtected,
        MosaicState::Ignored,
        MosaicState::Error,
    ];

    fn classified(ratio: f64) -> Event {
        Event::Classified {
            ratio,
            threshold: 5.0,
        }
    }

    #[test]
    fn admission_transitions() {
        assert_eq!(
            MosaicState::Unprocessed.next(Event::Ineligible).unwrap(),
            MosaicState::Ignored
        );
        assert_eq!(
            MosaicState::Unprocessed.next(Event::Eligible).unwrap(),
            MosaicState::Protected
        );
    }

    #[test]
    fn threshold_boundary_retains() {
        let p = MosaicState::Protected;
        assert_eq!(p.next(classified(4.99)).unwrap(), MosaicState::AutoRevealed);
        assert_eq!(p.next(classified(5.0)).unwrap(), MosaicState::RetainedProtected);
        assert_eq!(p.next(classified(100.0)).unwrap(), MosaicState::RetainedProtected);
        assert_eq!(p.next(classified(0.0)).unwrap(), MosaicState::AutoRevealed);
    }

    #[test]
    fn failure_and_size_from_protected() {
        let p = MosaicState::Protected;
        assert_eq!(p.next(Event::Failed).unwrap(), MosaicState::Error);
        assert_eq!(p.next(Event::TooSmall).unwrap(), MosaicState::Ignored);
    }

    #[test]
    fn override_only_from_retained_or_error() {
        for state in ALL {
            let result = state.next(Event::Override);
            if state.awaits_override() {
                assert_eq!(result.unwrap(), MosaicState::ManualRevealed);
            } else {
                assert!(result.is_err(), "{state:?} accepted an override");
            }
        }
    }

    #[test]
    fn unprocessed_is_never_reentered() {
        let events = [
            Event::Ineligible,
            Event::Eligible,
            Event::TooSmall,
            classified(1.0),
            Event::Failed,
            Event::Override,
        ];
        for state in ALL {
            for event in events {
                if let Ok(next) = state.next(event) {
                    assert_ne!(next, MosaicState::Unprocessed);
                }
            }
        }
    }

    #[test]
    fn settled_states_reject_automatic_events() {
        for state in ALL.into_iter().filter(|s| s.is_settled()) {
            for event in [Event::Eligible, Event::Ineligible, classified(0.0), Event::Failed] {
                assert!(state.next(event).is_err());
            }
        }
    }

    #[test]
    fn failure_is_obscured_like_retained() {
        assert_eq!(MosaicState::Error.visual(), MosaicState::RetainedProtected.visual());
        assert_eq!(MosaicState::Error.visual(), Visual::Obscured);
    }

    #[test]
    fn css_classes() {
        assert_eq!(Visual::Obscured.css_class(), Some("mosaic-applied"));
        assert_eq!(Visual::Revealed.css_class(), Some("mosaic-removed"));
        assert_eq!(Visual::Untouched.css_class(), None);
    }
}
