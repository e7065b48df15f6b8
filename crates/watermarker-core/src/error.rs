//! Error types for the watermarking engine

/// Main error type for watermarking operations
#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    #[error("Failed to decode image {name}: {message}")]
    Decode { name: String, message: String },

    #[error("Failed to decode logo: {message}")]
    LogoDecode { message: String },

    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    #[error("Image format not supported: {format}")]
    UnsupportedFormat { format: String },

    #[error("Font error: {message}")]
    Font { message: String },

    #[error("Invalid watermark geometry: {message}")]
    Geometry { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Logging initialization failed: {message}")]
    LoggingError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {message}")]
    TaskJoin { message: String },
}

impl WatermarkError {
    /// Get the error type as a string for categorization
    pub fn error_type(&self) -> &'static str {
        match self {
            WatermarkError::Decode { .. } => "decode_error",
            WatermarkError::LogoDecode { .. } => "logo_decode_error",
            WatermarkError::Encode { .. } => "encode_error",
            WatermarkError::UnsupportedFormat { .. } => "unsupported_format",
            WatermarkError::Font { .. } => "font_error",
            WatermarkError::Geometry { .. } => "geometry_error",
            WatermarkError::Config { .. } => "config_error",
            WatermarkError::LoggingError { .. } => "logging_error",
            WatermarkError::Io(_) => "io_error",
            WatermarkError::Serialization(_) => "serialization_error",
            WatermarkError::Cancelled => "cancelled",
            WatermarkError::TaskJoin { .. } => "task_join_error",
        }
    }

    /// Whether this error marks the whole image as failed.
    ///
    /// Logo, font and geometry faults only skip a drawing pass.
    pub fn fails_item(&self) -> bool {
        !matches!(
            self,
            WatermarkError::LogoDecode { .. }
                | WatermarkError::Font { .. }
                | WatermarkError::Geometry { .. }
        )
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WatermarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        let error = WatermarkError::UnsupportedFormat {
            format: "xyz".to_string(),
        };
        assert_eq!(error.error_type(), "unsupported_format");
        assert!(error.fails_item());
    }

    #[test]
    fn test_pass_level_errors_do_not_fail_item() {
        let error = WatermarkError::LogoDecode {
            message: "truncated".to_string(),
        };
        assert!(!error.fails_item());

        let error = WatermarkError::Geometry {
            message: "nan".to_string(),
        };
        assert!(!error.fails_item());

        let error = WatermarkError::Decode {
            name: "a.png".to_string(),
            message: "bad header".to_string(),
        };
        assert!(error.fails_item());
        assert_eq!(error.to_string(), "Failed to decode image a.png: bad header");
    }
}
