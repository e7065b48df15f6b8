//! # Watermarker Core
//!
//! Batch watermark compositing: normalizes watermark options, resolves text
//! and logo placements (single or tiled), draws them with rotation, opacity
//! and drop shadows, and drives decode/composite/encode over a list of images
//! with per-image fault isolation.

pub mod batch;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod paint;
pub mod position;
pub mod text;
pub mod tiling;

// Re-export commonly used types
pub use batch::{BatchEntry, BatchOrchestrator, BatchProgress, BatchResult, BatchSummary, ItemStatus, SourceImage};
pub use codec::{ImageCodec, ImageCrateCodec};
pub use compositor::{CompositeReport, Compositor, PassKind};
pub use config::*;
pub use error::*;
pub use logging::*;
pub use models::*;
pub use normalizer::{LogoSpec, TextSpec, WatermarkSpec};
pub use position::{ItemBox, ItemCategory, ItemKind, Placement, PositionCalculator, PositionModel};
pub use text::{FontRasterizer, GlyphRasterizer};
pub use tiling::{TileLayout, TileLayoutPlanner};

/// Initialize logging for the watermarker core library.
///
/// Keep the returned guard alive when logging to a file.
pub fn init(config: &LoggingConfig) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let guard = logging::init_logging(config)?;
    tracing::info!("Watermarker core {} initialized", version());
    Ok(guard)
}

/// Get the version of the watermarker core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
