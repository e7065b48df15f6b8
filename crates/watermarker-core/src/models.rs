//! Core data models: raw watermark options as received from configuration

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Which watermark passes run for each image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkType {
    #[default]
    Text,
    Logo,
    Both,
}

impl WatermarkType {
    pub fn includes_text(self) -> bool {
        matches!(self, WatermarkType::Text | WatermarkType::Both)
    }

    pub fn includes_logo(self) -> bool {
        matches!(self, WatermarkType::Logo | WatermarkType::Both)
    }
}

impl FromStr for WatermarkType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(WatermarkType::Text),
            "logo" => Ok(WatermarkType::Logo),
            "both" => Ok(WatermarkType::Both),
            _ => Err(()),
        }
    }
}

/// Single placement or a tiled grid across the surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    #[default]
    Single,
    Multi,
}

impl FromStr for Distribution {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Distribution::Single),
            "multi" => Ok(Distribution::Multi),
            _ => Err(()),
        }
    }
}

/// Named positions of the legacy anchor model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl Anchor {
    pub fn is_top(self) -> bool {
        matches!(self, Anchor::TopLeft | Anchor::TopRight)
    }
}

impl FromStr for Anchor {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top-left" => Ok(Anchor::TopLeft),
            "top-right" => Ok(Anchor::TopRight),
            "bottom-left" => Ok(Anchor::BottomLeft),
            "bottom-right" => Ok(Anchor::BottomRight),
            "center" => Ok(Anchor::Center),
            _ => Err(()),
        }
    }
}

/// Color representation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    pub fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    /// Parse a CSS style color: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(..)` or `rgba(..)`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            return Self::parse_hex(hex);
        }

        static FUNCTIONAL: OnceLock<Option<Regex>> = OnceLock::new();
        let re = FUNCTIONAL
            .get_or_init(|| {
                Regex::new(
                    r"^(?i)rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([0-9]*\.?[0-9]+)\s*)?\)$",
                )
                .ok()
            })
            .as_ref()?;

        let captures = re.captures(value)?;
        let channel = |i: usize| -> Option<u8> { captures.get(i)?.as_str().parse::<u8>().ok() };
        let alpha = match captures.get(4) {
            Some(a) => {
                let a: f32 = a.as_str().parse().ok()?;
                (a.clamp(0.0, 1.0) * 255.0).round() as u8
            }
            None => 255,
        };
        Some(Self::new(channel(1)?, channel(2)?, channel(3)?, alpha))
    }

    fn parse_hex(hex: &str) -> Option<Self> {
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let nibble = |i: usize| byte(&hex[i..=i]).map(|v| v * 17);
                Some(Self::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Some(Self::rgb(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?)),
            8 => Some(Self::new(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
                byte(&hex[6..8])?,
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

/// Decoded pixels of one image while it is being watermarked
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSurface {
    pixels: image::RgbaImage,
}

impl RasterSurface {
    pub fn new(pixels: image::RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &image::RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut image::RgbaImage {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> image::RgbaImage {
        self.pixels
    }
}

/// A decoded logo bitmap
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSource {
    bitmap: image::RgbaImage,
}

impl WatermarkSource {
    pub fn new(bitmap: image::RgbaImage) -> Self {
        Self { bitmap }
    }

    pub fn width(&self) -> u32 {
        self.bitmap.width()
    }

    pub fn height(&self) -> u32 {
        self.bitmap.height()
    }

    pub fn bitmap(&self) -> &image::RgbaImage {
        &self.bitmap
    }

    /// Natural width / height ratio
    pub fn aspect_ratio(&self) -> f64 {
        if self.bitmap.height() == 0 {
            return 1.0;
        }
        f64::from(self.bitmap.width()) / f64::from(self.bitmap.height())
    }
}

/// Raw watermark options as posted by the configuration form.
///
/// Every field is optional; the normalizer fills in defaults and resolves
/// which positioning model applies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkOptions {
    pub watermark_type: Option<String>,

    // Text group
    pub text: Option<String>,
    pub font_size: Option<f64>,
    pub opacity: Option<f64>,
    pub color: Option<String>,
    pub position: Option<String>,
    pub offset_x: Option<f64>,
    pub offset_y: Option<f64>,
    pub text_distribution: Option<String>,
    pub text_spacing: Option<f64>,
    pub text_rotation: Option<f64>,
    pub text_shadow: Option<bool>,
    pub text_horizontal_position: Option<f64>,
    pub text_vertical_position: Option<f64>,

    // Logo group
    pub logo_size: Option<f64>,
    pub logo_opacity: Option<f64>,
    pub logo_position: Option<String>,
    pub logo_offset_x: Option<f64>,
    pub logo_offset_y: Option<f64>,
    pub logo_distribution: Option<String>,
    pub logo_spacing: Option<f64>,
    pub logo_rotation: Option<f64>,
    pub logo_shadow: Option<bool>,
    pub logo_horizontal_position: Option<f64>,
    pub logo_vertical_position: Option<f64>,
}

impl WatermarkOptions {
    /// Parse options from the JSON payload of the configuration form
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_creation() {
        let color = Color::rgb(255, 128, 64);
        assert_eq!(color.r, 255);
        assert_eq!(color.g, 128);
        assert_eq!(color.b, 64);
        assert_eq!(color.a, 255);

        let black = Color::black();
        assert_eq!(black, Color::new(0, 0, 0, 255));
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!(Color::parse("#ffffff"), Some(Color::white()));
        assert_eq!(Color::parse("#f00"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::parse("#00000080"), Some(Color::new(0, 0, 0, 128)));
        assert_eq!(Color::parse("rgb(10, 20, 30)"), Some(Color::rgb(10, 20, 30)));
        assert_eq!(Color::parse("RGBA(0,0,0,0.5)"), Some(Color::new(0, 0, 0, 128)));
        assert_eq!(Color::parse("#zzzzzz"), None);
        assert_eq!(Color::parse("rgb(300, 0, 0)"), None);
        assert_eq!(Color::parse("white"), None);
    }

    #[test]
    fn test_color_display() {
        assert_eq!(Color::rgb(255, 0, 16).to_string(), "#ff0010");
        assert_eq!(Color::new(0, 0, 0, 128).to_string(), "#00000080");
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("both".parse::<WatermarkType>(), Ok(WatermarkType::Both));
        assert!("neither".parse::<WatermarkType>().is_err());
        assert_eq!("multi".parse::<Distribution>(), Ok(Distribution::Multi));
        assert_eq!("TOP-RIGHT".parse::<Anchor>(), Ok(Anchor::TopRight));
        assert!(Anchor::TopLeft.is_top());
        assert!(!Anchor::Center.is_top());
    }

    #[test]
    fn test_options_deserialization() {
        let json = r##"{
            "watermarkType": "both",
            "text": "Sample",
            "fontSize": 32,
            "textHorizontalPosition": 80,
            "textVerticalPosition": 75,
            "logoDistribution": "multi",
            "unknownField": true
        }"##;

        let options = WatermarkOptions::from_json(json).unwrap();
        assert_eq!(options.watermark_type.as_deref(), Some("both"));
        assert_eq!(options.font_size, Some(32.0));
        assert_eq!(options.text_horizontal_position, Some(80.0));
        assert_eq!(options.logo_distribution.as_deref(), Some("multi"));
        assert_eq!(options.logo_size, None);
    }
}
