//! Draws text and logo watermark passes onto a raster surface

use crate::error::{Result, WatermarkError};
use crate::models::{Distribution, RasterSurface, WatermarkSource};
use crate::normalizer::{LogoSpec, TextSpec, WatermarkSpec};
use crate::paint::{Canvas, ShadowStyle};
use crate::position::{ItemBox, Placement, PositionCalculator, PositionModel};
use crate::text::{GlyphMask, GlyphRasterizer};
use crate::tiling::TileLayoutPlanner;
use image::imageops::FilterType;
use image::RgbaImage;
use kurbo::{Point, Rect};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Smallest edge a logo is scaled down to
pub const MIN_LOGO_DIMENSION: f64 = 10.0;

/// Which drawing pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    Text,
    Logo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPass {
    pub pass: PassKind,
    pub reason: String,
}

/// What a single `composite_watermark` call drew.
///
/// Placement counts are instances actually on the surface, so a pass that
/// stopped partway reports what it drew before the failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompositeReport {
    pub text_placements: usize,
    pub logo_placements: usize,
    pub skipped: Vec<SkippedPass>,
}

impl CompositeReport {
    pub fn was_skipped(&self, pass: PassKind) -> bool {
        self.skipped.iter().any(|s| s.pass == pass)
    }

    fn skip(&mut self, pass: PassKind, reason: String) {
        warn!("{:?} pass skipped: {}", pass, reason);
        self.skipped.push(SkippedPass { pass, reason });
    }

    /// Note a pass failure, or hand it back when it should fail the whole image
    fn record_failure(&mut self, pass: PassKind, error: WatermarkError) -> Result<()> {
        if error.fails_item() {
            return Err(error);
        }
        self.skip(pass, error.to_string());
        Ok(())
    }
}

/// Placements a pass drew and the error that stopped it, if any
#[derive(Debug, Default)]
struct PassOutcome {
    drawn: usize,
    error: Option<WatermarkError>,
}

impl PassOutcome {
    fn failed(error: WatermarkError) -> Self {
        Self {
            drawn: 0,
            error: Some(error),
        }
    }
}

/// Display size of a logo fitted into a `size` x `size` box, keeping its
/// aspect ratio. Both edges are floored at [`MIN_LOGO_DIMENSION`].
pub fn logo_display_size(natural_width: u32, natural_height: u32, size: f64) -> (f64, f64) {
    let ratio = if natural_height == 0 {
        1.0
    } else {
        f64::from(natural_width) / f64::from(natural_height)
    };

    let (width, height) = if ratio > 1.0 {
        (size, size / ratio)
    } else {
        (size * ratio, size)
    };
    (width.max(MIN_LOGO_DIMENSION), height.max(MIN_LOGO_DIMENSION))
}

/// Compositor for watermark passes
#[derive(Clone, Default)]
pub struct Compositor {
    glyphs: Option<Arc<dyn GlyphRasterizer>>,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor")
            .field("has_font", &self.glyphs.is_some())
            .finish()
    }
}

impl Compositor {
    /// Compositor whose text pass uses `glyphs`; `None` disables text drawing
    pub fn new(glyphs: Option<Arc<dyn GlyphRasterizer>>) -> Self {
        Self { glyphs }
    }

    pub fn has_font(&self) -> bool {
        self.glyphs.is_some()
    }

    /// Draw the text pass then the logo pass of `spec` onto `surface`.
    ///
    /// Font, geometry and logo faults skip only their pass and show up in the
    /// report. Any other error fails the call. Calling this twice draws the
    /// watermark twice.
    pub fn composite_watermark(
        &self,
        surface: &mut RasterSurface,
        spec: &WatermarkSpec,
        logo: Option<&WatermarkSource>,
    ) -> Result<CompositeReport> {
        let mut report = CompositeReport::default();

        if spec.kind.includes_text() {
            let outcome = self.draw_text_pass(surface, &spec.text);
            report.text_placements = outcome.drawn;
            if let Some(e) = outcome.error {
                report.record_failure(PassKind::Text, e)?;
            }
        }

        if spec.kind.includes_logo() {
            match logo {
                Some(logo) => {
                    let outcome = self.draw_logo_pass(surface, &spec.logo, logo);
                    report.logo_placements = outcome.drawn;
                    if let Some(e) = outcome.error {
                        report.record_failure(PassKind::Logo, e)?;
                    }
                }
                None => report.skip(PassKind::Logo, "no decoded logo available".to_string()),
            }
        }

        debug!(
            "Composited {} text and {} logo placements on {}x{}",
            report.text_placements,
            report.logo_placements,
            surface.width(),
            surface.height()
        );
        Ok(report)
    }

    fn draw_text_pass(&self, surface: &mut RasterSurface, text: &TextSpec) -> PassOutcome {
        if text.content.trim().is_empty() {
            debug!("Watermark text is blank, nothing to draw");
            return PassOutcome::default();
        }

        let (mask, item, placements) = match self.prepare_text(surface, text) {
            Ok(prepared) => prepared,
            Err(e) => return PassOutcome::failed(e),
        };

        let mut canvas = Canvas::new(surface.pixels_mut());
        draw_all(&placements, |placement| {
            draw_text_placement(&mut canvas, text, &mask, item, placement)
        })
    }

    /// Measure, lay out and rasterize the text without touching the surface
    fn prepare_text(&self, surface: &RasterSurface, text: &TextSpec) -> Result<(GlyphMask, ItemBox, Vec<Placement>)> {
        let glyphs = self.glyphs.as_ref().ok_or_else(|| WatermarkError::Font {
            message: "no usable font configured".to_string(),
        })?;

        let font_size = text.font_size as f32;
        let measured = glyphs.measure(&text.content, font_size);
        if !(measured.is_finite() && measured > 0.0) {
            return Err(WatermarkError::Geometry {
                message: format!("text measured {} pixels wide", measured),
            });
        }
        let item = ItemBox::text(f64::from(measured), text.font_size);
        let placements = plan_placements(
            surface,
            item,
            text.distribution,
            &text.position,
            text.spacing,
            text.rotation,
        );

        let mask = glyphs.rasterize(&text.content, font_size)?;
        let extent = Rect::from_origin_size(
            (f64::from(mask.origin_x), f64::from(mask.origin_y)),
            (f64::from(mask.coverage.width()), f64::from(mask.coverage.height())),
        );
        validate_placements(&placements, extent)?;
        Ok((mask, item, placements))
    }

    fn draw_logo_pass(&self, surface: &mut RasterSurface, logo: &LogoSpec, source: &WatermarkSource) -> PassOutcome {
        if source.width() == 0 || source.height() == 0 {
            return PassOutcome::failed(WatermarkError::Geometry {
                message: "logo has no pixels".to_string(),
            });
        }

        let (width, height) = logo_display_size(source.width(), source.height(), logo.size);
        let item = ItemBox::logo(width, height);
        let placements = plan_placements(
            surface,
            item,
            logo.distribution,
            &logo.position,
            logo.spacing,
            logo.rotation,
        );
        if let Err(e) = validate_placements(&placements, Rect::new(0.0, 0.0, width, height)) {
            return PassOutcome::failed(e);
        }

        let scaled = scale_logo(source.bitmap(), width, height);
        let mut canvas = Canvas::new(surface.pixels_mut());
        draw_all(&placements, |placement| {
            draw_logo_placement(&mut canvas, logo, &scaled, item, placement)
        })
    }
}

fn plan_placements(
    surface: &RasterSurface,
    item: ItemBox,
    distribution: Distribution,
    position: &PositionModel,
    spacing: f64,
    rotation: Option<f64>,
) -> Vec<Placement> {
    let (surface_w, surface_h) = (f64::from(surface.width()), f64::from(surface.height()));
    match distribution {
        Distribution::Single => {
            let (x, y) = PositionCalculator::resolve(surface_w, surface_h, item, position);
            vec![Placement::new(x, y, rotation.unwrap_or(0.0))]
        }
        Distribution::Multi => TileLayoutPlanner::plan(surface_w, surface_h, item, spacing, rotation).placements,
    }
}

/// Reject a layout before anything is drawn if any instance, offset by
/// `extent`, would land on non-finite coordinates
fn validate_placements(placements: &[Placement], extent: Rect) -> Result<()> {
    for placement in placements {
        let corners = [
            placement.x + extent.x0,
            placement.y + extent.y0,
            placement.x + extent.x1,
            placement.y + extent.y1,
            placement.rotation_degrees,
        ];
        if !corners.iter().all(|v| v.is_finite()) {
            return Err(WatermarkError::Geometry {
                message: format!("placement {:?} has non-finite bounds", placement),
            });
        }
    }
    Ok(())
}

/// Draw `placements` in order, stopping at the first failure
fn draw_all(placements: &[Placement], mut draw: impl FnMut(&Placement) -> Result<()>) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    for placement in placements {
        if let Err(e) = draw(placement) {
            if outcome.drawn > 0 {
                warn!("Pass stopped after {} of {} placements", outcome.drawn, placements.len());
            }
            outcome.error = Some(e);
            break;
        }
        outcome.drawn += 1;
    }
    outcome
}

fn scale_logo(bitmap: &RgbaImage, width: f64, height: f64) -> RgbaImage {
    let target_w = (width.round() as u32).max(1);
    let target_h = (height.round() as u32).max(1);
    if (target_w, target_h) == bitmap.dimensions() {
        return bitmap.clone();
    }
    image::imageops::resize(bitmap, target_w, target_h, FilterType::Lanczos3)
}

/// Draw one text instance whose baseline starts at the placement point
pub(crate) fn draw_text_placement(
    canvas: &mut Canvas<'_>,
    text: &TextSpec,
    mask: &GlyphMask,
    item: ItemBox,
    placement: &Placement,
) -> Result<()> {
    canvas.scoped(|c| {
        let state = c.state_mut();
        state.fill = text.color;
        state.global_alpha = text.opacity as f32;
        state.shadow = text.shadow.then(ShadowStyle::text_default);

        if placement.rotation_degrees != 0.0 {
            let center = Point::new(placement.x + item.width / 2.0, placement.y - item.height / 2.0);
            c.rotate_about(center, placement.rotation_degrees);
        }

        let origin = Point::new(
            placement.x + f64::from(mask.origin_x),
            placement.y + f64::from(mask.origin_y),
        );
        c.fill_mask(&mask.coverage, origin)
    })
}

/// Draw one logo instance whose top-left corner is the placement point
pub(crate) fn draw_logo_placement(
    canvas: &mut Canvas<'_>,
    logo: &LogoSpec,
    scaled: &RgbaImage,
    item: ItemBox,
    placement: &Placement,
) -> Result<()> {
    canvas.scoped(|c| {
        let state = c.state_mut();
        state.global_alpha = logo.opacity as f32;
        state.smoothing = true;
        state.shadow = logo.shadow.then(ShadowStyle::text_default);

        if placement.rotation_degrees != 0.0 {
            let center = Point::new(placement.x + item.width / 2.0, placement.y + item.height / 2.0);
            c.rotate_about(center, placement.rotation_degrees);
        }

        let dest = Rect::new(placement.x, placement.y, placement.x + item.width, placement.y + item.height);
        c.draw_image(scaled, dest)
    })
}
