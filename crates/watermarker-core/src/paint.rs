//! Explicit paint state and a scoped drawing canvas over an RGBA buffer
//!
//! Drawing state (fill, alpha, shadow, transform, smoothing) lives in a
//! [`PaintState`] value owned by the [`Canvas`]. Changes are made inside
//! [`Canvas::scoped`], which restores the previous state on every exit path.

use crate::error::{Result, WatermarkError};
use crate::models::Color;
use image::{Rgba, RgbaImage};
use kurbo::{Affine, Point, Rect};

/// Drop shadow drawn beneath every shape while set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowStyle {
    pub color: Color,
    /// Device-space offset, unaffected by the current transform
    pub offset_x: f64,
    pub offset_y: f64,
    pub blur: f64,
}

impl ShadowStyle {
    /// 50% black, offset by 2 units, 4 units of blur
    pub fn text_default() -> Self {
        Self {
            color: Color::new(0, 0, 0, 128),
            offset_x: 2.0,
            offset_y: 2.0,
            blur: 4.0,
        }
    }
}

/// Everything a draw call reads besides its own arguments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintState {
    pub fill: Color,
    pub global_alpha: f32,
    pub shadow: Option<ShadowStyle>,
    pub transform: Affine,
    /// Bilinear resampling when true, nearest neighbour otherwise
    pub smoothing: bool,
}

impl Default for PaintState {
    fn default() -> Self {
        Self {
            fill: Color::black(),
            global_alpha: 1.0,
            shadow: None,
            transform: Affine::IDENTITY,
            smoothing: true,
        }
    }
}

/// A rasterised intermediate with its top-left corner on the target
struct Layer {
    origin_x: i64,
    origin_y: i64,
    pixels: RgbaImage,
}

/// Drawing surface with a save/restore stack of [`PaintState`]
pub struct Canvas<'a> {
    target: &'a mut RgbaImage,
    state: PaintState,
    saved: Vec<PaintState>,
}

impl<'a> Canvas<'a> {
    pub fn new(target: &'a mut RgbaImage) -> Self {
        Self {
            target,
            state: PaintState::default(),
            saved: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.target.width()
    }

    pub fn height(&self) -> u32 {
        self.target.height()
    }

    pub fn state(&self) -> &PaintState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PaintState {
        &mut self.state
    }

    /// Number of states currently saved
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Run `draw` with a saved copy of the current state, restoring it afterwards
    /// whether `draw` succeeds or fails.
    pub fn scoped<T>(&mut self, draw: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let depth = self.saved.len();
        self.saved.push(self.state);
        let result = draw(self);
        // Drop anything the closure left unbalanced, then restore our own entry
        self.saved.truncate(depth + 1);
        if let Some(previous) = self.saved.pop() {
            self.state = previous;
        }
        result
    }

    /// Append a transform after the current one (canvas `transform` semantics)
    pub fn transform(&mut self, affine: Affine) {
        self.state.transform = self.state.transform * affine;
    }

    /// Rotate by `degrees` clockwise about `center` in user space
    pub fn rotate_about(&mut self, center: Point, degrees: f64) {
        let center = center.to_vec2();
        self.transform(
            Affine::translate(center) * Affine::rotate(degrees.to_radians()) * Affine::translate(-center),
        );
    }

    /// Fill a coverage mask with the current fill color.
    ///
    /// `coverage` is an 8-bit alpha mask whose top-left lands at `origin`.
    pub fn fill_mask(&mut self, coverage: &image::GrayImage, origin: Point) -> Result<()> {
        let fill = self.state.fill;
        let tinted = RgbaImage::from_fn(coverage.width(), coverage.height(), |x, y| {
            let c = coverage.get_pixel(x, y)[0] as u32;
            Rgba([fill.r, fill.g, fill.b, ((c * fill.a as u32 + 127) / 255) as u8])
        });
        let dest = Rect::from_origin_size(origin, (f64::from(coverage.width()), f64::from(coverage.height())));
        self.draw_image(&tinted, dest)
    }

    /// Draw `source` stretched into `dest` (user space) through the current state
    pub fn draw_image(&mut self, source: &RgbaImage, dest: Rect) -> Result<()> {
        if source.width() == 0 || source.height() == 0 || dest.width() <= 0.0 || dest.height() <= 0.0 {
            return Ok(());
        }
        if !(dest.x0.is_finite() && dest.y0.is_finite() && dest.x1.is_finite() && dest.y1.is_finite()) {
            return Err(WatermarkError::Geometry {
                message: format!("non-finite destination rectangle {:?}", dest),
            });
        }

        let Some(layer) = self.rasterize(source, dest)? else {
            return Ok(());
        };

        if let Some(shadow) = self.state.shadow {
            if shadow.color.a > 0 {
                let shadow_layer = cast_shadow(&layer, &shadow);
                composite_layer(self.target, &shadow_layer);
            }
        }
        composite_layer(self.target, &layer);
        Ok(())
    }

    /// Resample `source` through the current transform into a device-space
    /// layer clipped to the target. `None` when nothing is visible.
    fn rasterize(&self, source: &RgbaImage, dest: Rect) -> Result<Option<Layer>> {
        let scale = Affine::scale_non_uniform(
            dest.width() / f64::from(source.width()),
            dest.height() / f64::from(source.height()),
        );
        let to_device = self.state.transform * Affine::translate(dest.origin().to_vec2()) * scale;
        if to_device.determinant().abs() < f64::EPSILON {
            return Err(WatermarkError::Geometry {
                message: "degenerate transform".to_string(),
            });
        }
        let to_source = to_device.inverse();

        let source_rect = Rect::new(0.0, 0.0, f64::from(source.width()), f64::from(source.height()));
        let bounds = to_device.transform_rect_bbox(source_rect);
        // Keep room for the shadow offset pulling in off-surface pixels
        let margin = self
            .state
            .shadow
            .map(|s| s.offset_x.abs().max(s.offset_y.abs()) + s.blur * 2.0)
            .unwrap_or(0.0);

        let x0 = (bounds.x0.floor()).max(-margin.ceil()) as i64;
        let y0 = (bounds.y0.floor()).max(-margin.ceil()) as i64;
        let x1 = (bounds.x1.ceil()).min(f64::from(self.width()) + margin.ceil()) as i64;
        let y1 = (bounds.y1.ceil()).min(f64::from(self.height()) + margin.ceil()) as i64;
        if x1 <= x0 || y1 <= y0 {
            return Ok(None);
        }

        let alpha = self.state.global_alpha.clamp(0.0, 1.0);
        let smoothing = self.state.smoothing;
        let width = (x1 - x0) as u32;
        let height = (y1 - y0) as u32;

        let pixels = RgbaImage::from_fn(width, height, |lx, ly| {
            let device = Point::new((x0 + lx as i64) as f64 + 0.5, (y0 + ly as i64) as f64 + 0.5);
            let p = to_source * device;
            let mut sample = if smoothing {
                sample_bilinear(source, p.x - 0.5, p.y - 0.5)
            } else {
                sample_nearest(source, p.x, p.y)
            };
            sample[3] = (sample[3] as f32 * alpha).round() as u8;
            Rgba(sample)
        });

        Ok(Some(Layer {
            origin_x: x0,
            origin_y: y0,
            pixels,
        }))
    }
}

/// Silhouette of `layer` in the shadow color, offset and blurred
fn cast_shadow(layer: &Layer, shadow: &ShadowStyle) -> Layer {
    let sigma = (shadow.blur / 2.0) as f32;
    let padding = (sigma * 3.0).ceil() as u32;
    let width = layer.pixels.width() + padding * 2;
    let height = layer.pixels.height() + padding * 2;

    let mut silhouette = RgbaImage::from_pixel(
        width,
        height,
        Rgba([shadow.color.r, shadow.color.g, shadow.color.b, 0]),
    );
    for (x, y, pixel) in layer.pixels.enumerate_pixels() {
        let a = (pixel[3] as u32 * shadow.color.a as u32 + 127) / 255;
        silhouette.put_pixel(
            x + padding,
            y + padding,
            Rgba([shadow.color.r, shadow.color.g, shadow.color.b, a as u8]),
        );
    }

    if sigma > 0.0 {
        silhouette = gaussian_blur(silhouette, sigma);
    }

    Layer {
        origin_x: layer.origin_x - padding as i64 + shadow.offset_x.round() as i64,
        origin_y: layer.origin_y - padding as i64 + shadow.offset_y.round() as i64,
        pixels: silhouette,
    }
}

fn composite_layer(target: &mut RgbaImage, layer: &Layer) {
    let (tw, th) = (target.width() as i64, target.height() as i64);
    for (x, y, pixel) in layer.pixels.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        let tx = layer.origin_x + x as i64;
        let ty = layer.origin_y + y as i64;
        if tx < 0 || ty < 0 || tx >= tw || ty >= th {
            continue;
        }
        let base = target.get_pixel_mut(tx as u32, ty as u32);
        *base = blend_over(*base, *pixel);
    }
}

/// Source-over alpha compositing of straight (non-premultiplied) pixels
pub fn blend_over(base: Rgba<u8>, overlay: Rgba<u8>) -> Rgba<u8> {
    let overlay_alpha = overlay[3] as f32 / 255.0;
    if overlay_alpha == 0.0 {
        return base;
    }
    let base_alpha = base[3] as f32 / 255.0;
    let final_alpha = overlay_alpha + base_alpha * (1.0 - overlay_alpha);
    if final_alpha == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let inv_alpha = 1.0 - overlay_alpha;
    let channel = |i: usize| {
        let value = (overlay[i] as f32 * overlay_alpha + base[i] as f32 * base_alpha * inv_alpha) / final_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (final_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

fn sample_nearest(source: &RgbaImage, x: f64, y: f64) -> [u8; 4] {
    let (sx, sy) = (x.floor(), y.floor());
    if sx < 0.0 || sy < 0.0 || sx >= f64::from(source.width()) || sy >= f64::from(source.height()) {
        return [0, 0, 0, 0];
    }
    source.get_pixel(sx as u32, sy as u32).0
}

/// Bilinear sample with transparent black outside the source.
///
/// Channels are interpolated premultiplied so transparent edges don't bleed
/// dark fringes into the result.
fn sample_bilinear(source: &RgbaImage, x: f64, y: f64) -> [u8; 4] {
    let (w, h) = (source.width() as i64, source.height() as i64);
    let fx = x.floor();
    let fy = y.floor();
    let tx = (x - fx) as f32;
    let ty = (y - fy) as f32;
    let (ix, iy) = (fx as i64, fy as i64);

    let texel = |cx: i64, cy: i64| -> [f32; 4] {
        if cx < 0 || cy < 0 || cx >= w || cy >= h {
            return [0.0; 4];
        }
        let p = source.get_pixel(cx as u32, cy as u32);
        let a = p[3] as f32 / 255.0;
        [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
    };

    let weights = [
        ((1.0 - tx) * (1.0 - ty), texel(ix, iy)),
        (tx * (1.0 - ty), texel(ix + 1, iy)),
        ((1.0 - tx) * ty, texel(ix, iy + 1)),
        (tx * ty, texel(ix + 1, iy + 1)),
    ];

    let mut acc = [0.0f32; 4];
    for (weight, t) in weights {
        for c in 0..4 {
            acc[c] += t[c] * weight;
        }
    }

    let alpha = acc[3];
    if alpha <= 0.0 {
        return [0, 0, 0, 0];
    }
    let unpremultiply = 255.0 / alpha;
    [
        (acc[0] * unpremultiply).round().clamp(0.0, 255.0) as u8,
        (acc[1] * unpremultiply).round().clamp(0.0, 255.0) as u8,
        (acc[2] * unpremultiply).round().clamp(0.0, 255.0) as u8,
        alpha.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Separable gaussian blur with edge clamping
pub fn gaussian_blur(mut image: RgbaImage, sigma: f32) -> RgbaImage {
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image;
    }

    let width = image.width();
    let height = image.height();
    let radius = (sigma * 3.0).ceil() as i64;
    let kernel_size = (radius * 2 + 1) as usize;

    let mut kernel = vec![0.0f32; kernel_size];
    let mut sum = 0.0;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = (i as i64 - radius) as f32 / sigma;
        *k = (-0.5 * x * x).exp();
        sum += *k;
    }
    for k in &mut kernel {
        *k /= sum;
    }

    let mut temp_image = RgbaImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0.0f32; 4];
            for (i, &weight) in kernel.iter().enumerate() {
                let sample_x = (x as i64 + i as i64 - radius).clamp(0, width as i64 - 1) as u32;
                let pixel = image.get_pixel(sample_x, y);
                for c in 0..4 {
                    acc[c] += pixel[c] as f32 * weight;
                }
            }
            temp_image.put_pixel(x, y, Rgba(acc.map(|v| v.round().clamp(0.0, 255.0) as u8)));
        }
    }

    for y in 0..height {
        for x in 0..width {
            let mut acc = [0.0f32; 4];
            for (i, &weight) in kernel.iter().enumerate() {
                let sample_y = (y as i64 + i as i64 - radius).clamp(0, height as i64 - 1) as u32;
                let pixel = temp_image.get_pixel(x, sample_y);
                for c in 0..4 {
                    acc[c] += pixel[c] as f32 * weight;
                }
            }
            image.put_pixel(x, y, Rgba(acc.map(|v| v.round().clamp(0.0, 255.0) as u8)));
        }
    }

    image
}
