//! Configuration management for the watermarking engine

use crate::error::{Result, WatermarkError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Encoder quality used when nothing else is configured
pub const DEFAULT_ENCODE_QUALITY: f32 = 0.9;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub processing: ProcessingConfig,
    pub fonts: FontConfig,
    pub logging: LoggingConfig,
}

/// Processing-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Encoder quality in `0.0..=1.0`, only honoured by lossy formats
    pub encode_quality: f32,
    /// Output format when the source format cannot be determined
    pub fallback_format: ImageFormat,
    /// Reuse the decoded logo across images of one session
    pub cache_logo: bool,
    /// Prefix for suggested output file names
    pub output_prefix: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            encode_quality: DEFAULT_ENCODE_QUALITY,
            fallback_format: ImageFormat::Png,
            cache_logo: false,
            output_prefix: "watermarked_".to_string(),
        }
    }
}

/// Font discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Explicit font file, tried before the search paths
    pub font_path: Option<PathBuf>,
    pub search_paths: Vec<PathBuf>,
}

impl Default for FontConfig {
    fn default() -> Self {
        let search_paths = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/Library/Fonts/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        Self {
            font_path: None,
            search_paths,
        }
    }
}

impl FontConfig {
    /// Candidate font files in lookup order
    pub fn candidates(&self) -> impl Iterator<Item = &Path> {
        self.font_path
            .iter()
            .chain(self.search_paths.iter())
            .map(PathBuf::as_path)
    }
}

/// Where log output goes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Console,
    File,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub output_type: LogOutput,
    pub output_path: Option<PathBuf>,
    /// Emit JSON lines instead of human readable output
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output_type: LogOutput::Console,
            output_path: None,
            structured: false,
        }
    }
}

/// Supported image formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
    Tiff,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 6] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::WebP,
        ImageFormat::Gif,
        ImageFormat::Bmp,
        ImageFormat::Tiff,
    ];

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::WebP => "webp",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Tiff => "tiff",
        }
    }

    /// Get the MIME type for this format
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Tiff => "image/tiff",
        }
    }

    /// Parse a MIME type such as `image/jpeg`
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" | "image/apng" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::WebP),
            "image/gif" => Some(ImageFormat::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageFormat::Bmp),
            "image/tiff" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }

    /// Detect the format from a file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::WebP),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            "tiff" | "tif" => Some(ImageFormat::Tiff),
            _ => None,
        }
    }

    /// Check if this format supports transparency
    pub fn supports_transparency(&self) -> bool {
        matches!(self, ImageFormat::Png | ImageFormat::WebP | ImageFormat::Gif | ImageFormat::Tiff)
    }

    pub fn to_image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::WebP => image::ImageFormat::WebP,
            ImageFormat::Gif => image::ImageFormat::Gif,
            ImageFormat::Bmp => image::ImageFormat::Bmp,
            ImageFormat::Tiff => image::ImageFormat::Tiff,
        }
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::WebP => Some(ImageFormat::WebP),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            image::ImageFormat::Bmp => Some(ImageFormat::Bmp),
            image::ImageFormat::Tiff => Some(ImageFormat::Tiff),
            _ => None,
        }
    }
}

/// Configuration manager
///
/// Layers the TOML file over the built-in defaults, then applies
/// `WATERMARKER__SECTION__KEY` environment overrides.
pub struct ConfigManager {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a configuration manager with a custom path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = Self::load_layered(&config_path)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Update the configuration
    pub fn update_config(&mut self, config: AppConfig) -> Result<()> {
        self.config = config;
        self.save()
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WatermarkError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }

        let config_str = toml::to_string_pretty(&self.config).map_err(|e| WatermarkError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(&self.config_path, config_str).map_err(|e| WatermarkError::Config {
            message: format!("Failed to write config file: {}", e),
        })?;

        tracing::info!("Configuration saved to {:?}", self.config_path);
        Ok(())
    }

    /// Get the default configuration file path
    fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| WatermarkError::Config {
                message: "Could not determine config directory".to_string(),
            })?
            .join("watermarker");

        Ok(config_dir.join("config.toml"))
    }

    fn load_layered(path: &Path) -> Result<AppConfig> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix("WATERMARKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| WatermarkError::Config {
                message: format!("Failed to read config file: {}", e),
            })?;

        let config: AppConfig = settings.try_deserialize().map_err(|e| WatermarkError::Config {
            message: format!("Failed to parse config file: {}", e),
        })?;

        if path.exists() {
            tracing::info!("Configuration loaded from {:?}", path);
        } else {
            tracing::info!("Using default configuration");
        }
        Ok(config)
    }
}
