//! Image fetch and decode collaborators.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use url::Url;

use crate::error::{Error, Result};

/// Default request timeout for [`HttpImageDecoder`].
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A decoded image as a flat RGBA8 buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// `width * height * 4` bytes, row-major RGBA.
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Decode any format `image` understands.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Image`] if the bytes are not a supported image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        Ok(Self::from(rgba))
    }
}

/// Decode a local image file.
///
/// # Errors
///
/// Returns [`Error::Image`] if the file cannot be opened or decoded.
pub fn decode_file(path: &Path) -> Result<DecodedImage> {
    Ok(DecodedImage::from(image::open(path)?.to_rgba8()))
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "gif"
        ),
        None => false,
    }
}

impl From<RgbaImage> for DecodedImage {
    fn from(image: RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        }
    }
}

/// Fetches and decodes the image behind a URL.
///
/// A single failure is final for the candidate; implementations may retry
/// internally but the engine never calls twice for the same candidate.
#[async_trait]
pub trait ImageDecoder: Send + Sync {
    /// Fetch and decode `url`.
    async fn decode(&self, url: &Url) -> Result<DecodedImage>;
}

/// [`ImageDecoder`] over HTTP(S) using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpImageDecoder {
    client: reqwest::Client,
}

impl HttpImageDecoder {
    /// Create a decoder with the default 30 second timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a decoder with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fetch`] if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mosaic-guard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageDecoder for HttpImageDecoder {
    async fn decode(&self, url: &Url) -> Result<DecodedImage> {
        tracing::debug!(url = %url, "Fetching image");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Fetched image");
        DecodedImage::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use image::{ImageFormat, Rgba};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn from_bytes_decodes_png_to_rgba() {
        let decoded = DecodedImage::from_bytes(&png_bytes(3, 2, [1, 2, 3, 255])).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.pixels.len(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels[..4], &[1, 2, 3, 255]);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let err = DecodedImage::from_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("anim.gif")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }

    #[test]
    fn decode_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, png_bytes(5, 4, [0, 0, 0, 255])).unwrap();
        let decoded = decode_file(&path).unwrap();
        assert_eq!((decoded.width, decoded.height), (5, 4));
    }

    #[tokio::test]
    async fn http_decoder_fetches_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(png_bytes(12, 12, [120, 60, 30, 255]))
                    .insert_header("content-type", "image/png"),
            )
            .mount(&server)
            .await;

        let decoder = HttpImageDecoder::new().unwrap();
        let url = Url::parse(&format!("{}/a.png", server.uri())).unwrap();
        let decoded = decoder.decode(&url).await.unwrap();
        assert_eq!((decoded.width, decoded.height), (12, 12));
    }

    #[tokio::test]
    async fn http_decoder_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let decoder = HttpImageDecoder::new().unwrap();
        let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();
        let err = decoder.decode(&url).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
    }
}
