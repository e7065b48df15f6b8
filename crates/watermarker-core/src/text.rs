//! Text measurement and glyph rasterization

use crate::config::FontConfig;
use crate::error::{Result, WatermarkError};
use ab_glyph::{Font, FontArc, GlyphId, PxScale, ScaleFont};
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Pixels of slack around the advance box for overhanging glyph outlines
const MASK_PADDING: u32 = 2;

/// Anti-aliased coverage of a rendered line of text
#[derive(Debug, Clone)]
pub struct GlyphMask {
    pub coverage: GrayImage,
    /// Offset from the pen origin (left end of the baseline) to the mask's
    /// top-left corner
    pub origin_x: f32,
    pub origin_y: f32,
}

/// Turns strings into coverage masks at a given pixel size
pub trait GlyphRasterizer: Send + Sync {
    /// Advance width of `text` in pixels
    fn measure(&self, text: &str, font_size: f32) -> f32;

    fn rasterize(&self, text: &str, font_size: f32) -> Result<GlyphMask>;
}

/// Glyph rasterizer backed by a TrueType/OpenType font
#[derive(Clone)]
pub struct FontRasterizer {
    font: FontArc,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for FontRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontRasterizer")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FontRasterizer {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(data).map_err(|e| WatermarkError::Font {
            message: e.to_string(),
        })?;
        Ok(Self { font, path: None })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let mut rasterizer = Self::from_bytes(data)?;
        rasterizer.path = Some(path.to_path_buf());
        Ok(rasterizer)
    }

    /// File the font was loaded from, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// First loadable font among the configured candidates
    pub fn discover(config: &FontConfig) -> Option<Self> {
        for path in config.candidates() {
            if !path.is_file() {
                continue;
            }
            match Self::from_file(path) {
                Ok(rasterizer) => {
                    info!("Using font {}", path.display());
                    return Some(rasterizer);
                }
                Err(e) => warn!("Skipping font {}: {}", path.display(), e),
            }
        }
        debug!("No usable font found among configured candidates");
        None
    }

    fn advance(&self, text: &str, scale: PxScale) -> f32 {
        let scaled_font = self.font.as_scaled(scale);
        let mut width = 0.0f32;
        let mut prev_glyph: Option<GlyphId> = None;
        for c in text.chars() {
            let glyph_id = scaled_font.glyph_id(c);
            if let Some(prev) = prev_glyph {
                width += scaled_font.kern(prev, glyph_id);
            }
            width += scaled_font.h_advance(glyph_id);
            prev_glyph = Some(glyph_id);
        }
        width
    }
}

impl GlyphRasterizer for FontRasterizer {
    fn measure(&self, text: &str, font_size: f32) -> f32 {
        self.advance(text, PxScale::from(font_size))
    }

    fn rasterize(&self, text: &str, font_size: f32) -> Result<GlyphMask> {
        if !(font_size.is_finite() && font_size > 0.0) {
            return Err(WatermarkError::Font {
                message: format!("invalid font size {}", font_size),
            });
        }

        let scale = PxScale::from(font_size);
        let scaled_font = self.font.as_scaled(scale);
        let ascent = scaled_font.ascent();
        let descent = scaled_font.descent();

        let width = self.advance(text, scale).ceil().max(1.0) as u32 + MASK_PADDING * 2;
        let height = (ascent - descent).ceil().max(1.0) as u32 + MASK_PADDING * 2;
        let mut coverage = GrayImage::new(width, height);

        let pad = MASK_PADDING as f32;
        let baseline_y = pad + ascent;
        let mut cursor_x = pad;
        let mut prev_glyph: Option<GlyphId> = None;

        for c in text.chars() {
            let glyph_id = scaled_font.glyph_id(c);
            if let Some(prev) = prev_glyph {
                cursor_x += scaled_font.kern(prev, glyph_id);
            }

            let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(cursor_x, baseline_y));
            if let Some(outlined) = self.font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|px, py, amount| {
                    let x = px as i32 + bounds.min.x as i32;
                    let y = py as i32 + bounds.min.y as i32;
                    if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
                        let pixel = coverage.get_pixel_mut(x as u32, y as u32);
                        let value = (amount.clamp(0.0, 1.0) * 255.0).round() as u8;
                        *pixel = Luma([pixel[0].saturating_add(value)]);
                    }
                });
            }

            cursor_x += scaled_font.h_advance(glyph_id);
            prev_glyph = Some(glyph_id);
        }

        Ok(GlyphMask {
            coverage,
            origin_x: -pad,
            origin_y: -baseline_y,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Compositor;
    use crate::models::{RasterSurface, WatermarkOptions};
    use crate::normalizer::WatermarkSpec;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    /// DejaVu Sans Mono, see the license file next to it
    const FIXTURE_FONT: &[u8] = include_bytes!("../tests/fixtures/DejaVuSansMono.ttf");

    fn fixture_font() -> FontRasterizer {
        FontRasterizer::from_bytes(FIXTURE_FONT.to_vec()).unwrap()
    }

    #[test]
    fn test_invalid_font_bytes_are_rejected() {
        let err = FontRasterizer::from_bytes(b"definitely not a font".to_vec()).unwrap_err();
        assert_eq!(err.error_type(), "font_error");
    }

    #[test]
    fn test_missing_font_file_is_io_error() {
        let err = FontRasterizer::from_file(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert_eq!(err.error_type(), "io_error");
    }

    #[test]
    fn test_discover_without_candidates() {
        let config = FontConfig {
            font_path: Some(PathBuf::from("/nonexistent/font.ttf")),
            search_paths: Vec::new(),
        };
        assert!(FontRasterizer::discover(&config).is_none());
    }

    #[test]
    fn test_fixture_font_measures_and_rasterizes() {
        let rasterizer = fixture_font();
        assert!(rasterizer.path().is_none());

        let short = rasterizer.measure("Hi", 24.0);
        let long = rasterizer.measure("Hello watermark", 24.0);
        assert!(short > 0.0);
        assert!(long > short);
        assert!(rasterizer.measure("Hi", 48.0) > short);

        let mask = rasterizer.rasterize("Hi", 24.0).unwrap();
        assert!(mask.coverage.width() >= short.ceil() as u32);
        assert!(mask.origin_y < 0.0);
        assert!(mask.coverage.pixels().any(|p| p[0] > 0));

        assert!(rasterizer.rasterize("Hi", 0.0).is_err());
    }

    #[test]
    fn test_fixture_font_bottom_right_placement_stays_on_surface() {
        let rasterizer = fixture_font();
        let measured = f64::from(rasterizer.measure("Hi", 24.0));
        let compositor = Compositor::new(Some(Arc::new(rasterizer)));
        let options = WatermarkOptions::from_json(
            r##"{"text": "Hi", "fontSize": 24, "opacity": 1.0, "color": "#000000",
                "textShadow": false, "position": "bottom-right", "offsetX": 20, "offsetY": 20}"##,
        )
        .unwrap();
        let spec = WatermarkSpec::from_options(&options, None);
        let mut surface = RasterSurface::new(RgbaImage::from_pixel(400, 200, Rgba([255, 255, 255, 255])));

        let report = compositor.composite_watermark(&mut surface, &spec, None).unwrap();
        assert_eq!(report.text_placements, 1);
        assert!(report.skipped.is_empty());

        // Box spans x in [400 - 20 - w, 380], baseline at 200 - 24 - 20 = 156
        let changed: Vec<(u32, u32)> = surface
            .pixels()
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] < 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!changed.is_empty());
        let left = 380.0 - measured - f64::from(MASK_PADDING) - 1.0;
        for (x, y) in changed {
            assert!(f64::from(x) >= left && x <= 381, "column {} outside text box", x);
            assert!((129..=158).contains(&y), "row {} outside text box", y);
        }
    }
}
