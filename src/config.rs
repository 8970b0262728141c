//! Engine configuration.
//!
//! Loaded once at startup (usually from YAML) and read-only afterwards. Every
//! field has a default, so an empty document yields the stock brown-cluster
//! heuristic with a 5% threshold.

use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

/// Inclusive RGB range describing one "unsafe" color cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ColorCluster {
    /// Red channel `[low, high]`.
    pub r: [u8; 2],
    /// Green channel `[low, high]`.
    pub g: [u8; 2],
    /// Blue channel `[low, high]`.
    pub b: [u8; 2],
}

impl ColorCluster {
    /// Create a cluster from inclusive per-channel bounds.
    #[must_use]
    pub const fn new(r: [u8; 2], g: [u8; 2], b: [u8; 2]) -> Self {
        Self { r, g, b }
    }

    /// Whether the (possibly fractional) color lies inside all three ranges.
    #[must_use]
    pub fn contains(&self, r: f64, g: f64, b: f64) -> bool {
        in_range(self.r, r) && in_range(self.g, g) && in_range(self.b, b)
    }

    fn is_well_formed(&self) -> bool {
        self.r[0] <= self.r[1] && self.g[0] <= self.g[1] && self.b[0] <= self.b[1]
    }
}

fn in_range(bounds: [u8; 2], value: f64) -> bool {
    value >= f64::from(bounds[0]) && value <= f64::from(bounds[1])
}

/// Brown tones that make up the default classification.
pub const DEFAULT_CLUSTERS: [ColorCluster; 4] = [
    ColorCluster::new([100, 165], [40, 100], [20, 70]),
    ColorCluster::new([139, 210], [69, 130], [19, 80]),
    ColorCluster::new([80, 120], [40, 70], [20, 50]),
    ColorCluster::new([60, 145], [25, 105], [0, 45]),
];

/// Process-wide engine options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Ratio (percent) below which a candidate is revealed automatically.
    pub threshold: f64,
    /// Candidates narrower or shorter than this (pixels) are ignored.
    pub min_dimension: u32,
    /// Hosts whose images are analyzed. Subdomains match too.
    pub allowed_sources: Vec<String>,
    /// Clusters counted as unsafe, tried in order.
    pub color_clusters: Vec<ColorCluster>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            min_dimension: 10,
            allowed_sources: vec!["imgur.com".to_string()],
            color_clusters: DEFAULT_CLUSTERS.to_vec(),
        }
    }
}

impl Config {
    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for malformed YAML and
    /// [`Error::InvalidConfig`] when [`Config::validate`] fails.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty map.
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise as
    /// [`Config::from_yaml_str`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            threshold = config.threshold,
            clusters = config.color_clusters.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(Error::InvalidConfig(format!(
                "threshold must be between 0 and 100, got {}",
                self.threshold
            )));
        }
        if self.allowed_sources.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "allowed_sources must name at least one host".to_string(),
            ));
        }
        if let Some(idx) = self.color_clusters.iter().position(|c| !c.is_well_formed()) {
            return Err(Error::InvalidConfig(format!(
                "color cluster {idx} has a lower bound above its upper bound"
            )));
        }
        Ok(())
    }

    /// Whether `url`'s host is an allowed source or a subdomain of one.
    #[must_use]
    pub fn is_allowed_source(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.allowed_sources.iter().any(|allowed| {
            let allowed = allowed.trim().trim_end_matches('.').to_ascii_lowercase();
            !allowed.is_empty()
                && (host == allowed
                    || host
                        .strip_suffix(allowed.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.')))
        })
    }
}
