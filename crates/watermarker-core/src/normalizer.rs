//! Turns raw watermark options into an immutable, validated [`WatermarkSpec`]

use crate::models::{Anchor, Color, Distribution, WatermarkOptions, WatermarkType};
use crate::position::PositionModel;
use serde::Serialize;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, warn};

pub const FONT_SIZE_RANGE: RangeInclusive<f64> = 12.0..=300.0;
pub const OPACITY_RANGE: RangeInclusive<f64> = 0.1..=1.0;
pub const TEXT_SPACING_RANGE: RangeInclusive<f64> = 50.0..=1200.0;
pub const LOGO_SIZE_RANGE: RangeInclusive<f64> = 20.0..=800.0;
pub const LOGO_SPACING_RANGE: RangeInclusive<f64> = 50.0..=500.0;
pub const OFFSET_RANGE: RangeInclusive<f64> = 0.0..=200.0;
pub const PERCENT_RANGE: RangeInclusive<f64> = 0.0..=100.0;

const DEFAULT_TEXT: &str = "Watermark";
const DEFAULT_FONT_SIZE: f64 = 24.0;
const DEFAULT_TEXT_OPACITY: f64 = 0.7;
const DEFAULT_OFFSET: f64 = 20.0;
const DEFAULT_TEXT_SPACING: f64 = 625.0;
const DEFAULT_LOGO_SIZE: f64 = 100.0;
const DEFAULT_LOGO_OPACITY: f64 = 0.8;
const DEFAULT_LOGO_SPACING: f64 = 275.0;

/// Text group of a normalized spec
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSpec {
    pub content: String,
    pub font_size: f64,
    pub opacity: f64,
    pub color: Color,
    /// Degrees in `[0, 360)`; `None` lets tiled text fall back to its default tilt
    pub rotation: Option<f64>,
    pub shadow: bool,
    pub distribution: Distribution,
    pub spacing: f64,
    pub position: PositionModel,
}

/// Logo group of a normalized spec
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogoSpec {
    /// Edge of the square box the logo is fitted into
    pub size: f64,
    pub opacity: f64,
    pub rotation: Option<f64>,
    pub shadow: bool,
    pub distribution: Distribution,
    pub spacing: f64,
    pub position: PositionModel,
    /// Encoded logo bitmap, decoded per image by the codec
    #[serde(skip)]
    pub source: Option<Arc<[u8]>>,
}

/// Immutable watermark plan shared by every image of a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatermarkSpec {
    pub kind: WatermarkType,
    pub text: TextSpec,
    pub logo: LogoSpec,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self::from_options(&WatermarkOptions::default(), None)
    }
}

impl WatermarkSpec {
    /// Normalize raw options. Never fails; anything missing or unusable falls
    /// back to its default. An empty `text` is not missing and stays empty.
    pub fn from_options(options: &WatermarkOptions, logo_source: Option<Arc<[u8]>>) -> Self {
        let kind = parse_or_default(options.watermark_type.as_deref(), "watermark type");

        let text = TextSpec {
            // Present but blank text is kept; the compositor draws nothing for it
            content: options.text.clone().unwrap_or_else(|| DEFAULT_TEXT.to_string()),
            font_size: clamp_or(options.font_size, FONT_SIZE_RANGE, DEFAULT_FONT_SIZE),
            opacity: normalize_opacity(options.opacity, DEFAULT_TEXT_OPACITY),
            color: options
                .color
                .as_deref()
                .and_then(|c| {
                    let parsed = Color::parse(c);
                    if parsed.is_none() {
                        warn!("Unrecognised color '{}', using white", c);
                    }
                    parsed
                })
                .unwrap_or_else(Color::white),
            rotation: normalize_rotation(options.text_rotation),
            shadow: options.text_shadow.unwrap_or(true),
            distribution: parse_or_default(options.text_distribution.as_deref(), "text distribution"),
            spacing: clamp_or(options.text_spacing, TEXT_SPACING_RANGE, DEFAULT_TEXT_SPACING),
            position: position_model(
                options.text_horizontal_position,
                options.text_vertical_position,
                options.position.as_deref(),
                options.offset_x,
                options.offset_y,
            ),
        };

        let logo = LogoSpec {
            size: clamp_or(options.logo_size, LOGO_SIZE_RANGE, DEFAULT_LOGO_SIZE),
            opacity: normalize_opacity(options.logo_opacity, DEFAULT_LOGO_OPACITY),
            rotation: normalize_rotation(options.logo_rotation),
            shadow: options.logo_shadow.unwrap_or(false),
            distribution: parse_or_default(options.logo_distribution.as_deref(), "logo distribution"),
            spacing: clamp_or(options.logo_spacing, LOGO_SPACING_RANGE, DEFAULT_LOGO_SPACING),
            position: position_model(
                options.logo_horizontal_position,
                options.logo_vertical_position,
                options.logo_position.as_deref(),
                options.logo_offset_x,
                options.logo_offset_y,
            ),
            source: logo_source,
        };

        let spec = Self { kind, text, logo };
        debug!("Normalized watermark spec: {:?}", spec);
        spec
    }

    pub fn has_logo_source(&self) -> bool {
        self.logo.source.is_some()
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn clamp_or(value: Option<f64>, range: RangeInclusive<f64>, default: f64) -> f64 {
    finite(value)
        .map(|v| v.clamp(*range.start(), *range.end()))
        .unwrap_or(default)
}

/// Values above 1 are read as percentages
fn normalize_opacity(value: Option<f64>, default: f64) -> f64 {
    let opacity = finite(value)
        .map(|v| if v > 1.0 { v / 100.0 } else { v })
        .unwrap_or(default);
    opacity.clamp(*OPACITY_RANGE.start(), *OPACITY_RANGE.end())
}

fn normalize_rotation(value: Option<f64>) -> Option<f64> {
    finite(value).map(|v| v.rem_euclid(360.0))
}

fn parse_or_default<T>(value: Option<&str>, what: &str) -> T
where
    T: std::str::FromStr + Default + std::fmt::Debug,
{
    match value {
        None => T::default(),
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            let fallback = T::default();
            warn!("Unrecognised {} '{}', using {:?}", what, raw, fallback);
            fallback
        }),
    }
}

/// Percentage wins when both percent fields are present, otherwise the legacy anchor
fn position_model(
    horizontal: Option<f64>,
    vertical: Option<f64>,
    anchor: Option<&str>,
    offset_x: Option<f64>,
    offset_y: Option<f64>,
) -> PositionModel {
    if let (Some(h), Some(v)) = (finite(horizontal), finite(vertical)) {
        return PositionModel::Percentage {
            horizontal: h.clamp(*PERCENT_RANGE.start(), *PERCENT_RANGE.end()),
            vertical: v.clamp(*PERCENT_RANGE.start(), *PERCENT_RANGE.end()),
        };
    }

    PositionModel::Anchor {
        anchor: parse_or_default::<Anchor>(anchor, "anchor"),
        offset_x: clamp_or(offset_x, OFFSET_RANGE, DEFAULT_OFFSET),
        offset_y: clamp_or(offset_y, OFFSET_RANGE, DEFAULT_OFFSET),
    }
}
