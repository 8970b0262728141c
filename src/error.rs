//! Error types for the mosaic-guard crate.

use crate::state::{Event, MosaicState};

/// Errors that can occur while configuring the engine or analyzing a candidate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while reading configuration or image files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The fetched bytes could not be decoded as an image.
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// The HTTP transport failed (connect, timeout, body read).
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("fetch of {url} returned HTTP {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Returned status code.
        status: u16,
    },

    /// The pixel buffer does not hold `width * height` RGBA samples.
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    PixelBuffer {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Required byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// The state machine has no transition for this event in this state.
    #[error("no transition from {from:?} on {event:?}")]
    InvalidTransition {
        /// State the candidate was in.
        from: MosaicState,
        /// Event that was rejected.
        event: Event,
    },
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let invalid = Error::InvalidConfig("threshold out of range".to_string());
        assert!(invalid.to_string().contains("threshold out of range"));

        let buffer = Error::PixelBuffer {
            width: 10,
            height: 20,
            expected: 800,
            actual: 12,
        };
        let msg = buffer.to_string();
        assert!(msg.contains("10x20"));
        assert!(msg.contains("800"));

        let status = Error::HttpStatus {
            url: "https://i.imgur.com/a.png".to_string(),
            status: 404,
        };
        assert!(status.to_string().contains("HTTP 404"));

        let transition = Error::InvalidTransition {
            from: MosaicState::AutoRevealed,
            event: Event::Override,
        };
        assert!(transition.to_string().contains("AutoRevealed"));
    }
}
