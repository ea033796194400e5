//! Geometric primitives for key hit testing
//!
//! Integer rectangles and points in keyboard coordinates, with the
//! squared-distance and edge-extended containment tests used by
//! nearest-key search.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Keyboard edges a key touches.
    ///
    /// A key attached to an edge claims every point between itself and
    /// that edge, so touches near the border never fall through.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EdgeFlags: u8 {
        const LEFT   = 0b0001;
        const RIGHT  = 0b0010;
        const TOP    = 0b0100;
        const BOTTOM = 0b1000;
    }
}

/// Point in keyboard coordinates (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Round a floating touch position to the pixel grid
    pub fn from_f32(x: f32, y: f32) -> Self {
        Self {
            x: x.round() as i32,
            y: y.round() as i32,
        }
    }
}

/// Axis-aligned rectangle (x, y = top-left corner)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Center point (integer division, matching the hit-test grid)
    #[inline]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Half-open containment: left/top inclusive, right/bottom exclusive.
    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Containment with edge extension.
    ///
    /// For each edge flag set, the rectangle is treated as extending to
    /// infinity in that direction.
    pub fn contains_with_edges(&self, p: Point, edges: EdgeFlags) -> bool {
        let left = edges.contains(EdgeFlags::LEFT);
        let right = edges.contains(EdgeFlags::RIGHT);
        let top = edges.contains(EdgeFlags::TOP);
        let bottom = edges.contains(EdgeFlags::BOTTOM);

        (p.x >= self.x || (left && p.x <= self.right()))
            && (p.x < self.right() || (right && p.x >= self.x))
            && (p.y >= self.y || (top && p.y <= self.bottom()))
            && (p.y < self.bottom() || (bottom && p.y >= self.y))
    }

    /// Squared distance from the rectangle center to `p`.
    ///
    /// Squared so proximity checks never need a square root.
    #[inline]
    pub fn squared_distance_from(&self, p: Point) -> i64 {
        let c = self.center();
        let dx = (c.x - p.x) as i64;
        let dy = (c.y - p.y) as i64;
        dx * dx + dy * dy
    }

    /// Rectangles overlap (half-open)
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        if self.width <= 0 || self.height <= 0 {
            return *other;
        }
        if other.width <= 0 || other.height <= 0 {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let r = self.right().max(other.right());
        let b = self.bottom().max(other.bottom());
        Rect::new(x, y, r - x, b - y)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}
