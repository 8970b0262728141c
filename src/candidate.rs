//! Candidates announced by the discovery feed and the records the engine
//! keeps for them.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::classifier::ClassificationResult;
use crate::interaction::TrapHandle;
use crate::state::{MosaicState, Visual};

/// Stable identity of an image-bearing element, assigned by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId(String);

impl CandidateId {
    /// Wrap a feed-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Where an element's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSource {
    /// An `<img>`-like element with a direct source attribute.
    Image {
        /// Source attribute, possibly empty.
        src: Option<String>,
    },
    /// An element whose image is a lazy-load attribute or CSS background.
    Background {
        /// Lazy-load indirection (`data-original`), preferred when present.
        data_original: Option<String>,
        /// Computed `background-image` value, e.g. `url("https://...")`.
        background_image: Option<String>,
    },
}

/// One candidate-appeared notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// Element identity.
    pub id: CandidateId,
    /// How to find the element's image.
    pub source: ElementSource,
}

impl Discovered {
    /// Notification for an image element.
    pub fn image(id: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            id: CandidateId::new(id),
            source: ElementSource::Image {
                src: Some(src.into()),
            },
        }
    }

    /// Notification for a lazy-loaded element carrying `data-original`.
    pub fn lazy(id: impl Into<String>, data_original: impl Into<String>) -> Self {
        Self {
            id: CandidateId::new(id),
            source: ElementSource::Background {
                data_original: Some(data_original.into()),
                background_image: None,
            },
        }
    }

    /// Notification for an element with a CSS background image.
    pub fn background(id: impl Into<String>, background_image: impl Into<String>) -> Self {
        Self {
            id: CandidateId::new(id),
            source: ElementSource::Background {
                data_original: None,
                background_image: Some(background_image.into()),
            },
        }
    }
}

/// Why a candidate was not analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnoreReason {
    /// Image element with an empty or inline `data:` source.
    Src,
    /// Background element with neither a lazy-load attribute nor a `url(...)`.
    NoBackgroundImage,
    /// Host is not an allowed source, or the URL does not parse.
    DisallowedSource,
    /// Decoded image is below the minimum dimension.
    Small,
}

impl IgnoreReason {
    /// Tag used in status strings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::NoBackgroundImage => "no_bg_image",
            Self::DisallowedSource => "disallowed_source",
            Self::Small => "small",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn background_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?(.*?)['"]?\s*\)"#).expect("background url pattern is valid")
    })
}

/// Extract the first URL from a CSS `background-image` value.
#[must_use]
pub fn background_image_url(value: &str) -> Option<&str> {
    background_url_pattern()
        .captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
}

impl ElementSource {
    /// The raw image location, or why there is none.
    ///
    /// # Errors
    ///
    /// Returns the [`IgnoreReason`] for elements without a usable source.
    pub fn raw_url(&self) -> Result<&str, IgnoreReason> {
        match self {
            Self::Image { src } => match src.as_deref().map(str::trim) {
                Some(s) if !s.is_empty() && !s.starts_with("data:") => Ok(s),
                _ => Err(IgnoreReason::Src),
            },
            Self::Background {
                data_original,
                background_image,
            } => data_original
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .or_else(|| background_image.as_deref().and_then(background_image_url))
                .ok_or(IgnoreReason::NoBackgroundImage),
        }
    }
}

/// Why a candidate ended in [`MosaicState::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Fetching or decoding the image failed.
    Load(String),
    /// The decoded buffer could not be sampled.
    Read(String),
}

impl Failure {
    /// Underlying error message.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Load(d) | Self::Read(d) => d,
        }
    }
}

/// Diagnostic reason attached to non-decision terminal states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Not analyzed.
    Ignored(IgnoreReason),
    /// Analysis failed.
    Failed(Failure),
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignored(r) => write!(f, "ignored_{r}"),
            Self::Failed(Failure::Load(d)) => write!(f, "load_error: {d}"),
            Self::Failed(Failure::Read(d)) => write!(f, "read_error: {d}"),
        }
    }
}

/// Everything the engine knows about one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Element identity.
    pub id: CandidateId,
    /// Resolved image URL, once resolved.
    pub source_url: Option<Url>,
    /// Natural `(width, height)`, once decoded.
    pub dimensions: Option<(u32, u32)>,
    /// Current lifecycle state.
    pub state: MosaicState,
    /// Diagnostic reason for `Ignored` and `Error`.
    pub reason: Option<Reason>,
    /// Classification outcome, once classified.
    pub classification: Option<ClassificationResult>,
    /// Admission this record belongs to. A pipeline only updates the record
    /// whose generation it was started with.
    pub generation: u64,
    pub(crate) trap: Option<TrapHandle>,
}

impl Candidate {
    /// A fresh, unprocessed record.
    #[must_use]
    pub fn new(id: CandidateId) -> Self {
        Self {
            id,
            source_url: None,
            dimensions: None,
            state: MosaicState::Unprocessed,
            reason: None,
            classification: None,
            generation: 0,
            trap: None,
        }
    }

    /// Visual treatment for the current state.
    ///
    /// Undersized images were already obscured when their size became known,
    /// so they are explicitly revealed; other ignored candidates were never
    /// touched.
    #[must_use]
    pub fn visual(&self) -> Visual {
        match (self.state, &self.reason) {
            (MosaicState::Ignored, Some(Reason::Ignored(IgnoreReason::Small))) => Visual::Revealed,
            (state, _) => state.visual(),
        }
    }

    /// Externally observable status tag.
    ///
    /// One of `processing`, `ignored_<reason>`, `mosaiced (<ratio>%)`,
    /// `unmosaiced (<ratio>%)`, `manual_unmosaiced` or `load_error`.
    #[must_use]
    pub fn status(&self) -> String {
        let ratio = self.classification.map_or(0.0, |c| c.ratio);
        match self.state {
            MosaicState::Unprocessed => "unprocessed".to_string(),
            MosaicState::Protected => "processing".to_string(),
            MosaicState::Ignored => match &self.reason {
                Some(Reason::Ignored(r)) => format!("ignored_{r}"),
                _ => "ignored".to_string(),
            },
            MosaicState::AutoRevealed => format!("unmosaiced ({ratio:.1}%)"),
            MosaicState::RetainedProtected => format!("mosaiced ({ratio:.1}%)"),
            MosaicState::ManualRevealed => "manual_unmosaiced".to_string(),
            MosaicState::Error => "load_error".to_string(),
        }
    }
}
