use serde::{Deserialize, Serialize};

/// Axis-aligned person box in image pixels, `(x1, y1)` top-left and `(x2, y2)` bottom-right.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize, PartialOrd)]
pub struct PoseBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub w: f32,
    pub h: f32,

    pub conf: f32,
}

impl PoseBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            w: x2 - x1,
            h: y2 - y1,
            conf,
        }
    }

    /// Box covering the whole image: `(0, 0, width - 1, height - 1)` with confidence 1.0.
    ///
    /// Used when person detection is bypassed and every image is treated as a single subject.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self::new(
            0.,
            0.,
            width.saturating_sub(1) as f32,
            height.saturating_sub(1) as f32,
            1.0,
        )
    }

    /// Returns the width of the bounding box.
    pub fn width(&self) -> f32 {
        self.w
    }

    /// Returns the height of the bounding box.
    pub fn height(&self) -> f32 {
        self.h
    }

    /// Returns the bounding box coordinates as `(x1, y1, x2, y2)`.
    pub fn xy1_xy2(&self) -> (f32, f32, f32, f32) {
        (self.x1, self.y1, self.x2, self.y2)
    }

    /// `(x, y, w, h)` treating `x2`/`y2` as inclusive pixel indices, so a box spanning
    /// pixels `0..=639` is 640 wide.
    pub fn xywh_inclusive(&self) -> (f32, f32, f32, f32) {
        (self.x1, self.y1, self.x2 - self.x1 + 1., self.y2 - self.y1 + 1.)
    }

    /// `[x1, y1, x2, y2, conf]`
    pub fn to_array(&self) -> [f32; 5] {
        [self.x1, self.y1, self.x2, self.y2, self.conf]
    }

    /// Computes the area of the bounding box.
    pub fn area(&self) -> f32 {
        self.h * self.w
    }

    /// Computes the intersection area between this bounding box and another.
    pub fn intersect(&self, other: &PoseBox) -> f32 {
        let left = self.x1.max(other.x1);
        let right = (self.x1 + self.w).min(other.x1 + other.w);
        let top = self.y1.max(other.y1);
        let bottom = (self.y1 + self.h).min(other.y1 + other.h);
        (right - left).max(0.) * (bottom - top).max(0.)
    }

    /// Computes the union area between this bounding box and another.
    pub fn union(&self, other: &PoseBox) -> f32 {
        self.area() + other.area() - self.intersect(other)
    }

    pub fn iou(&self, other: &PoseBox) -> f32 {
        let union = self.union(other);
        if union <= 0. {
            return 0.;
        }
        self.intersect(other) / union
    }

    /// Clamps the box to `[0, width - 1] x [0, height - 1]`.
    pub fn clamp_to(mut self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1) as f32;
        let max_y = height.saturating_sub(1) as f32;
        self.x1 = self.x1.clamp(0., max_x);
        self.y1 = self.y1.clamp(0., max_y);
        self.x2 = self.x2.clamp(0., max_x);
        self.y2 = self.y2.clamp(0., max_y);
        self.w = self.x2 - self.x1;
        self.h = self.y2 - self.y1;
        self
    }

    /// Sets the bounding box's coordinates using `(x1, y1, x2, y2)` and calculates width and height.
    pub fn with_x1y1_x2y2(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;

        self.w = x2 - x1;
        self.h = y2 - y1;
        self
    }

    pub fn with_confidence(mut self, x: f32) -> Self {
        self.conf = x;
        self
    }
}
