//! Decode and encode collaborators used by the batch orchestrator

use crate::config::ImageFormat;
use crate::error::{Result, WatermarkError};
use crate::models::{RasterSurface, WatermarkSource};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Image decode/encode backend
#[async_trait]
pub trait ImageCodec: Send + Sync {
    /// Decode a source image. `hint` comes from the source mime type when known.
    async fn decode(&self, name: &str, bytes: Vec<u8>, hint: Option<ImageFormat>) -> Result<RasterSurface>;

    async fn decode_logo(&self, bytes: Arc<[u8]>) -> Result<WatermarkSource>;

    /// Encode with `quality` in `[0, 1]`; lossless formats ignore it
    async fn encode(&self, surface: RasterSurface, format: ImageFormat, quality: f32) -> Result<Vec<u8>>;

    /// Format detected from the leading bytes
    fn sniff(&self, bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes)
            .ok()
            .and_then(ImageFormat::from_image_format)
    }
}

/// Codec backed by the `image` crate, run on the blocking thread pool
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCrateCodec {
    pub fn new() -> Self {
        Self
    }

    fn load(bytes: &[u8], hint: Option<ImageFormat>) -> std::result::Result<DynamicImage, image::ImageError> {
        match hint {
            // A wrong mime hint shouldn't sink a readable file
            Some(format) => image::load_from_memory_with_format(bytes, format.to_image_format())
                .or_else(|_| image::load_from_memory(bytes)),
            None => image::load_from_memory(bytes),
        }
    }

    fn encode_blocking(surface: RasterSurface, format: ImageFormat, quality: f32) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        let image = DynamicImage::ImageRgba8(surface.into_pixels());
        // Alpha is dropped for formats that cannot carry it
        let image = if format.supports_transparency() {
            image
        } else {
            DynamicImage::ImageRgb8(image.to_rgb8())
        };

        let written = match format {
            ImageFormat::Jpeg => {
                let quality = (quality.clamp(0.01, 1.0) * 100.0).round() as u8;
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
                image.write_with_encoder(encoder)
            }
            other => image.write_to(&mut buffer, other.to_image_format()),
        };
        written.map_err(|e| encode_error(format, e))?;

        Ok(buffer.into_inner())
    }
}

fn encode_error(format: ImageFormat, error: image::ImageError) -> WatermarkError {
    match error {
        image::ImageError::Unsupported(e) => {
            debug!("No {:?} encoder: {}", format, e);
            WatermarkError::UnsupportedFormat {
                format: format.mime_type().to_string(),
            }
        }
        other => WatermarkError::Encode {
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl ImageCodec for ImageCrateCodec {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn decode(&self, name: &str, bytes: Vec<u8>, hint: Option<ImageFormat>) -> Result<RasterSurface> {
        let owned_name = name.to_string();
        let image = tokio::task::spawn_blocking(move || Self::load(&bytes, hint))
            .await
            .map_err(|e| WatermarkError::TaskJoin {
                message: format!("Failed to spawn image decoding task: {}", e),
            })?
            .map_err(|e| WatermarkError::Decode {
                name: owned_name,
                message: e.to_string(),
            })?;

        debug!("Decoded {}: {}x{} pixels", name, image.width(), image.height());
        Ok(RasterSurface::new(image.into_rgba8()))
    }

    async fn decode_logo(&self, bytes: Arc<[u8]>) -> Result<WatermarkSource> {
        let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| WatermarkError::TaskJoin {
                message: format!("Failed to spawn logo decoding task: {}", e),
            })?
            .map_err(|e| WatermarkError::LogoDecode { message: e.to_string() })?;

        debug!("Decoded logo: {}x{} pixels", image.width(), image.height());
        Ok(WatermarkSource::new(image.into_rgba8()))
    }

    #[instrument(skip(self, surface), fields(width = surface.width(), height = surface.height()))]
    async fn encode(&self, surface: RasterSurface, format: ImageFormat, quality: f32) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || Self::encode_blocking(surface, format, quality))
            .await
            .map_err(|e| WatermarkError::TaskJoin {
                message: format!("Failed to spawn image encoding task: {}", e),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[tokio::test]
    async fn test_decode_png() {
        let codec = ImageCrateCodec::new();
        let surface = codec
            .decode("a.png", png_bytes(12, 7, [1, 2, 3, 255]), Some(ImageFormat::Png))
            .await
            .unwrap();
        assert_eq!((surface.width(), surface.height()), (12, 7));
        assert_eq!(*surface.pixels().get_pixel(0, 0), Rgba([1, 2, 3, 255]));
    }

    #[tokio::test]
    async fn test_wrong_hint_falls_back_to_sniffing() {
        let codec = ImageCrateCodec::new();
        let surface = codec
            .decode("a.jpg", png_bytes(3, 3, [0, 0, 0, 255]), Some(ImageFormat::Jpeg))
            .await
            .unwrap();
        assert_eq!(surface.width(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_bytes_fail_with_decode_error() {
        let codec = ImageCrateCodec::new();
        let err = codec
            .decode("broken.png", b"not an image".to_vec(), None)
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "decode_error");
        assert!(err.to_string().contains("broken.png"));

        let err = codec.decode_logo(Arc::from(&b"garbage"[..])).await.unwrap_err();
        assert_eq!(err.error_type(), "logo_decode_error");
        assert!(!err.fails_item());
    }

    #[tokio::test]
    async fn test_encode_formats_round_trip_dimensions() {
        let codec = ImageCrateCodec::new();
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp] {
            let surface = RasterSurface::new(RgbaImage::from_pixel(9, 5, Rgba([200, 100, 50, 255])));
            let bytes = codec.encode(surface, format, 0.9).await.unwrap();
            assert_eq!(codec.sniff(&bytes), Some(format));

            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (9, 5));
        }
    }

    #[tokio::test]
    async fn test_jpeg_quality_affects_size() {
        let codec = ImageCrateCodec::new();
        let noisy = RgbaImage::from_fn(64, 64, |x, y| Rgba([(x * 4) as u8, (y * 4) as u8, ((x * y) % 256) as u8, 255]));
        let high = codec
            .encode(RasterSurface::new(noisy.clone()), ImageFormat::Jpeg, 0.95)
            .await
            .unwrap();
        let low = codec
            .encode(RasterSurface::new(noisy), ImageFormat::Jpeg, 0.1)
            .await
            .unwrap();
        assert!(low.len() < high.len());
    }

    #[tokio::test]
    async fn test_alpha_kept_only_where_format_supports_it() {
        let codec = ImageCrateCodec::new();
        let translucent = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 128]));

        for format in [ImageFormat::Png, ImageFormat::Bmp, ImageFormat::Jpeg] {
            let bytes = codec
                .encode(RasterSurface::new(translucent.clone()), format, 0.9)
                .await
                .unwrap();
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!(decoded.color().has_alpha(), format.supports_transparency(), "{:?}", format);
        }
    }

    #[test]
    fn test_missing_encoder_maps_to_unsupported_format() {
        use image::error::{ImageFormatHint, UnsupportedError, UnsupportedErrorKind};

        let hint = ImageFormatHint::Exact(image::ImageFormat::WebP);
        let missing = image::ImageError::Unsupported(UnsupportedError::from_format_and_kind(
            hint.clone(),
            UnsupportedErrorKind::Format(hint),
        ));
        let err = encode_error(ImageFormat::WebP, missing);
        assert_eq!(err.error_type(), "unsupported_format");
        assert!(err.to_string().contains("image/webp"));
        assert!(err.fails_item());

        let io = image::ImageError::IoError(std::io::Error::new(std::io::ErrorKind::WriteZero, "full"));
        assert_eq!(encode_error(ImageFormat::Png, io).error_type(), "encode_error");
    }

    #[test]
    fn test_sniff_unknown_bytes() {
        assert_eq!(ImageCrateCodec.sniff(b"hello"), None);
        assert_eq!(ImageCrateCodec.sniff(&png_bytes(1, 1, [0, 0, 0, 0])), Some(ImageFormat::Png));
    }
}
