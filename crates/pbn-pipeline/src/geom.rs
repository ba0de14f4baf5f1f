//! Pixel-space geometry: integer points and inclusive bounding boxes.

use serde::{Deserialize, Serialize};

/// A pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelPoint {
    /// Column index.
    pub x: usize,
    /// Row index.
    pub y: usize,
}

impl PixelPoint {
    /// Create a new pixel coordinate.
    #[must_use]
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned bounding box in pixel space. Both corners are
/// inclusive, so a single pixel has `min == max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Leftmost column.
    pub min_x: usize,
    /// Topmost row.
    pub min_y: usize,
    /// Rightmost column.
    pub max_x: usize,
    /// Bottom row.
    pub max_y: usize,
}

impl BoundingBox {
    /// A box containing exactly one pixel.
    #[must_use]
    pub const fn at(p: PixelPoint) -> Self {
        Self {
            min_x: p.x,
            min_y: p.y,
            max_x: p.x,
            max_y: p.y,
        }
    }

    /// Grow the box so it contains `p`.
    pub fn include(&mut self, p: PixelPoint) {
        self.min_x = self.min_x.min(p.x);
        self.min_y = self.min_y.min(p.y);
        self.max_x = self.max_x.max(p.x);
        self.max_y = self.max_y.max(p.y);
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Whether `p` lies inside the box (edges included).
    #[must_use]
    pub const fn contains(&self, p: PixelPoint) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Whether `other` lies entirely inside `self`.
    #[must_use]
    pub const fn contains_box(&self, other: &Self) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.max_y - self.min_y + 1
    }
}
