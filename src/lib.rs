//! Obscure embedded images by default and reveal them only when their color
//! profile looks safe.
//!
//! Every image-bearing element announced by a discovery feed goes through the
//! same pipeline: it is obscured immediately, its image is fetched and decoded,
//! the pixels are reduced to a single ratio of "unsafe" colored pixels, and the
//! element is revealed only if that ratio is below the configured threshold.
//! Anything uncertain (fetch failure, unreadable pixels) stays obscured. The
//! user can reveal a retained image with one interaction, which is then
//! swallowed so no other handler (a lightbox, say) acts on it.
//!
//! # Quick Start
//!
//! ```no_run
//! use mosaic_guard::{Config, Discovered, HttpImageDecoder, MosaicEngine};
//!
//! # async fn demo() -> mosaic_guard::Result<()> {
//! let engine = MosaicEngine::new(Config::default(), HttpImageDecoder::new()?)?;
//! let state = engine
//!     .process(Discovered::image("img-1", "https://i.imgur.com/example.png"))
//!     .await;
//! println!("{state:?}");
//! # Ok(())
//! # }
//! ```
//!
//! # Classification only
//!
//! ```
//! use mosaic_guard::PixelClassifier;
//!
//! let classifier = PixelClassifier::default();
//! let pixels = [120u8, 60, 30, 255].repeat(4);
//! let result = classifier.classify(&pixels, 2, 2).unwrap();
//! assert_eq!(result.ratio, 100.0);
//! ```

#![deny(missing_docs)]

pub mod candidate;
pub mod classifier;
pub mod config;
pub mod decoder;
mod engine;
pub mod error;
pub mod gate;
pub mod interaction;
pub mod presenter;
pub mod state;

pub use candidate::{Candidate, CandidateId, Discovered, ElementSource, IgnoreReason};
pub use classifier::{ClassificationResult, PixelClassifier};
pub use config::{ColorCluster, Config};
pub use decoder::{decode_file, is_supported_image, DecodedImage, HttpImageDecoder, ImageDecoder};
pub use engine::{Admission, InteractionOutcome, MosaicEngine};
pub use error::{Error, Result};
pub use interaction::{Interaction, InteractionHandler};
pub use presenter::{Presenter, TracingPresenter};
pub use state::{MosaicState, Visual};
