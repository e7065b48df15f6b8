//! Placement of a single watermark item on a surface
//!
//! Coordinates are in surface pixels with the origin at the top-left corner.
//! Text items are positioned by their baseline (`y` is the bottom of the
//! measured box); logos are positioned by their top edge.

use crate::models::Anchor;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Items taller than this are treated as large logos with loose clamping
pub const LARGE_ITEM_HEIGHT: f64 = 100.0;

/// Margin kept visible when a large item is pushed past an edge
const LOOSE_EDGE_MARGIN: f64 = 10.0;

/// Share of a large item allowed to hang off the surface in the percentage model
const OVERHANG_RATIO: f64 = 0.8;

/// Minimum gap between a top-anchored text box and the top edge
const TOP_TEXT_MIN_OFFSET: f64 = 5.0;

/// What is being drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Text,
    Logo,
}

/// Clamping strictness derived from the item kind and size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCategory {
    /// Kept fully on the surface
    Compact,
    /// May partially leave the surface
    Large,
}

impl ItemCategory {
    /// Text is always compact; logos become large above [`LARGE_ITEM_HEIGHT`]
    pub fn classify(kind: ItemKind, item_height: f64) -> Self {
        match kind {
            ItemKind::Logo if item_height > LARGE_ITEM_HEIGHT => ItemCategory::Large,
            _ => ItemCategory::Compact,
        }
    }
}

/// Measured size of one watermark item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemBox {
    pub width: f64,
    pub height: f64,
    pub kind: ItemKind,
}

impl ItemBox {
    pub fn text(width: f64, height: f64) -> Self {
        Self { width, height, kind: ItemKind::Text }
    }

    pub fn logo(width: f64, height: f64) -> Self {
        Self { width, height, kind: ItemKind::Logo }
    }

    pub fn category(&self) -> ItemCategory {
        ItemCategory::classify(self.kind, self.height)
    }

    /// Offset added to a top edge to reach this item's reference line
    fn baseline_shift(&self) -> f64 {
        match self.kind {
            ItemKind::Text => self.height,
            ItemKind::Logo => 0.0,
        }
    }
}

/// Positioning model chosen once during normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum PositionModel {
    /// Slider based: 0% is the left/top edge, 100% the right/bottom edge
    Percentage { horizontal: f64, vertical: f64 },
    /// Legacy named anchor plus inward offsets
    Anchor { anchor: Anchor, offset_x: f64, offset_y: f64 },
}

/// A resolved position for one drawn instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub rotation_degrees: f64,
}

impl Placement {
    pub fn new(x: f64, y: f64, rotation_degrees: f64) -> Self {
        Self { x, y, rotation_degrees }
    }
}

/// Lower bound wins when the range is inverted, so an item larger than the
/// surface pins to the leading edge instead of panicking like `f64::clamp`.
fn clamp_low(value: f64, low: f64, high: f64) -> f64 {
    value.min(high).max(low)
}

/// Position calculator for watermark placement
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionCalculator;

impl PositionCalculator {
    /// Resolve the reference point of `item` on a `surface_w` x `surface_h` surface.
    ///
    /// Never fails: non-finite intermediate values collapse to the origin.
    pub fn resolve(surface_w: f64, surface_h: f64, item: ItemBox, model: &PositionModel) -> (f64, f64) {
        let (x, y) = match *model {
            PositionModel::Percentage { horizontal, vertical } => {
                Self::resolve_percentage(surface_w, surface_h, item, horizontal, vertical)
            }
            PositionModel::Anchor { anchor, offset_x, offset_y } => {
                Self::resolve_anchor(surface_w, surface_h, item, anchor, offset_x, offset_y)
            }
        };

        let x = if x.is_finite() { x } else { 0.0 };
        let y = if y.is_finite() { y } else { item.baseline_shift() };

        debug!(
            "Resolved {:?} item {}x{} on {}x{} to ({}, {})",
            item.kind, item.width, item.height, surface_w, surface_h, x, y
        );
        (x, y)
    }

    fn resolve_percentage(
        surface_w: f64,
        surface_h: f64,
        item: ItemBox,
        horizontal: f64,
        vertical: f64,
    ) -> (f64, f64) {
        let x = (surface_w - item.width).max(0.0) * (horizontal / 100.0);
        let y = (surface_h - item.height).max(0.0) * (vertical / 100.0) + item.baseline_shift();

        match (item.category(), item.kind) {
            (ItemCategory::Large, _) => (
                clamp_low(x, -item.width * OVERHANG_RATIO, surface_w - item.width * (1.0 - OVERHANG_RATIO)),
                clamp_low(y, -item.height * OVERHANG_RATIO, surface_h - item.height * (1.0 - OVERHANG_RATIO)),
            ),
            (ItemCategory::Compact, ItemKind::Text) => (
                clamp_low(x, 0.0, surface_w - item.width),
                clamp_low(y, item.height, surface_h),
            ),
            (ItemCategory::Compact, ItemKind::Logo) => (
                clamp_low(x, 0.0, surface_w - item.width),
                clamp_low(y, 0.0, surface_h - item.height),
            ),
        }
    }

    fn resolve_anchor(
        surface_w: f64,
        surface_h: f64,
        item: ItemBox,
        anchor: Anchor,
        offset_x: f64,
        offset_y: f64,
    ) -> (f64, f64) {
        let (x, y) = Self::anchor_base(surface_w, surface_h, item, anchor, offset_x, offset_y);

        match (item.category(), item.kind) {
            (ItemCategory::Large, _) => (
                clamp_low(x, -item.width + LOOSE_EDGE_MARGIN, surface_w - LOOSE_EDGE_MARGIN),
                clamp_low(y, -item.height + LOOSE_EDGE_MARGIN, surface_h - LOOSE_EDGE_MARGIN),
            ),
            (ItemCategory::Compact, ItemKind::Text) => {
                let mut x = clamp_low(x, 0.0, surface_w - item.width);
                let mut y = if anchor.is_top() {
                    y.max(item.height + offset_y.max(TOP_TEXT_MIN_OFFSET))
                } else {
                    clamp_low(y, item.height, surface_h)
                };

                // Final pass keeps the whole box on the surface
                if x + item.width > surface_w {
                    x = surface_w - item.width;
                }
                y = y.min(surface_h).max(item.height);
                (x, y)
            }
            (ItemCategory::Compact, ItemKind::Logo) => (
                clamp_low(x, 0.0, surface_w - item.width),
                clamp_low(y, 0.0, surface_h - item.height),
            ),
        }
    }

    /// Unclamped position for a legacy anchor.
    ///
    /// The legacy anchor table treats every compact item like text: its
    /// top-left and top-right rows put `y` at `offsetY + itemH` and clamp it to
    /// `[itemH, H]`. Logos here keep their top-edge convention instead, so a
    /// compact logo anchored top-left with no offset sits at `(0, 0)` rather
    /// than `(0, itemH)`, and is clamped to `[0, H - itemH]`.
    fn anchor_base(
        surface_w: f64,
        surface_h: f64,
        item: ItemBox,
        anchor: Anchor,
        offset_x: f64,
        offset_y: f64,
    ) -> (f64, f64) {
        let shift = item.baseline_shift();
        match anchor {
            Anchor::TopLeft => (offset_x, offset_y + shift),
            Anchor::TopRight => (surface_w - item.width - offset_x, offset_y + shift),
            Anchor::BottomLeft => (offset_x, surface_h - item.height - offset_y),
            Anchor::BottomRight => (surface_w - item.width - offset_x, surface_h - item.height - offset_y),
            Anchor::Center => (
                (surface_w - item.width) / 2.0 + offset_x,
                (surface_h - item.height) / 2.0 + offset_y,
            ),
        }
    }
}
