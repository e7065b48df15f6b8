//! Centered grid of repeated placements for the multi distribution mode

use crate::position::{ItemBox, ItemKind, Placement};
use tracing::debug;

/// Rotation applied to tiled text when none was configured
pub const DEFAULT_TILED_TEXT_ROTATION: f64 = -15.0;

/// Rotation applied to tiled logos when none was configured
pub const DEFAULT_TILED_LOGO_ROTATION: f64 = 0.0;

/// Upper bound on `cols * rows` for one grid
pub const MAX_TILE_CELLS: u32 = 1 << 16;

/// Result of planning a tiled layout
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayout {
    pub cols: u32,
    pub rows: u32,
    pub start_x: f64,
    pub start_y: f64,
    /// Cells that fit fully inside the surface, row-major
    pub placements: Vec<Placement>,
}

/// Tile layout planner
#[derive(Debug, Clone, Copy, Default)]
pub struct TileLayoutPlanner;

impl TileLayoutPlanner {
    /// Default rotation for tiled items of this kind
    pub fn default_rotation(kind: ItemKind) -> f64 {
        match kind {
            ItemKind::Text => DEFAULT_TILED_TEXT_ROTATION,
            ItemKind::Logo => DEFAULT_TILED_LOGO_ROTATION,
        }
    }

    /// Plan a grid of `item` copies `spacing` units apart.
    ///
    /// `rotation` overrides the per-kind default rotation. Out-of-bounds cells
    /// are dropped, so the result may be empty when the item exceeds the surface.
    /// Grids over [`MAX_TILE_CELLS`] lose rows until they fit.
    pub fn plan(
        surface_w: f64,
        surface_h: f64,
        item: ItemBox,
        spacing: f64,
        rotation: Option<f64>,
    ) -> TileLayout {
        let spacing = if spacing.is_finite() { spacing.max(1.0) } else { 1.0 };
        let rotation = rotation.unwrap_or_else(|| Self::default_rotation(item.kind));

        let cols = Self::count(surface_w - item.width, spacing);
        let rows = Self::count(surface_h - item.height, spacing).min(MAX_TILE_CELLS / cols);

        let total_w = f64::from(cols - 1) * spacing + item.width;
        let total_h = f64::from(rows - 1) * spacing + item.height;

        let start_x = (surface_w - total_w) / 2.0;
        let start_y = match item.kind {
            ItemKind::Text => item.height + (surface_h - total_h) / 2.0,
            ItemKind::Logo => (surface_h - total_h) / 2.0,
        };

        let mut placements = Vec::with_capacity((cols as usize) * (rows as usize));
        for row in 0..rows {
            for col in 0..cols {
                let x = start_x + f64::from(col) * spacing;
                let y = start_y + f64::from(row) * spacing;
                if Self::fits(surface_w, surface_h, item, x, y) {
                    placements.push(Placement::new(x, y, rotation));
                }
            }
        }

        debug!(
            "Tile grid {}x{} for {:?} item starting at ({}, {}), {} of {} cells inside",
            cols,
            rows,
            item.kind,
            start_x,
            start_y,
            placements.len(),
            cols * rows
        );

        TileLayout {
            cols,
            rows,
            start_x,
            start_y,
            placements,
        }
    }

    /// `floor(free / spacing) + 1`, between one and [`MAX_TILE_CELLS`]
    fn count(free: f64, spacing: f64) -> u32 {
        let n = (free / spacing).floor() + 1.0;
        if n.is_finite() && n >= 1.0 {
            n.min(f64::from(MAX_TILE_CELLS)) as u32
        } else {
            1
        }
    }

    fn fits(surface_w: f64, surface_h: f64, item: ItemBox, x: f64, y: f64) -> bool {
        let horizontal = x >= 0.0 && x + item.width <= surface_w;
        let vertical = match item.kind {
            ItemKind::Text => y >= item.height && y <= surface_h,
            ItemKind::Logo => y >= 0.0 && y + item.height <= surface_h,
        };
        horizontal && vertical
    }
}
