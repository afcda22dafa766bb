//! Axis-aligned boxes in corner-pair form.

use super::coord::{Coord, Normalized, Pixel};

/// An axis-aligned bounding box stored as (xmin, ymin, xmax, ymax).
///
/// Construction never rejects a box: inverted, zero-area or out-of-image
/// boxes are representable so that they can be reported and passed through
/// rather than dropped while parsing.
#[derive(Clone, Copy, PartialEq)]
pub struct BBoxXYXY<TSpace> {
    pub min: Coord<TSpace>,
    pub max: Coord<TSpace>,
}

impl<TSpace> BBoxXYXY<TSpace> {
    #[inline]
    pub fn new(min: Coord<TSpace>, max: Coord<TSpace>) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self::new(Coord::new(xmin, ymin), Coord::new(xmax, ymax))
    }

    /// Builds a box from its top-left corner and size (COCO layout).
    #[inline]
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_xyxy(x, y, x + width, y + height)
    }

    /// Builds a box from its center and size (YOLO layout).
    #[inline]
    pub fn from_cxcywh(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self::from_xyxy(cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.min.x
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.min.y
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.max.x
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.max.y
    }

    /// Negative when the box is inverted on the x axis.
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Negative when the box is inverted on the y axis.
    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    #[inline]
    pub fn to_xyxy(&self) -> [f64; 4] {
        [self.min.x, self.min.y, self.max.x, self.max.y]
    }

    #[inline]
    pub fn to_xywh(&self) -> [f64; 4] {
        [self.min.x, self.min.y, self.width(), self.height()]
    }

    #[inline]
    pub fn to_cxcywh(&self) -> [f64; 4] {
        [
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            self.width(),
            self.height(),
        ]
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Returns true if min <= max on both axes.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    /// Returns true if the box covers no area (or is inverted).
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

impl<TSpace> std::fmt::Debug for BBoxXYXY<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBoxXYXY")
            .field("xmin", &self.min.x)
            .field("ymin", &self.min.y)
            .field("xmax", &self.max.x)
            .field("ymax", &self.max.y)
            .finish()
    }
}

impl<TSpace> Default for BBoxXYXY<TSpace> {
    fn default() -> Self {
        Self::from_xyxy(0.0, 0.0, 0.0, 0.0)
    }
}

impl BBoxXYXY<Pixel> {
    /// Divides by the image dimensions. Callers must ensure both are non-zero.
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Normalized> {
        BBoxXYXY::from_xyxy(
            self.min.x / image_width,
            self.min.y / image_height,
            self.max.x / image_width,
            self.max.y / image_height,
        )
    }

    /// Returns true if the box lies inside `[0, width] x [0, height]`,
    /// allowing `tolerance` pixels of slack on every edge.
    pub fn is_within(&self, image_width: f64, image_height: f64, tolerance: f64) -> bool {
        self.min.x >= -tolerance
            && self.min.y >= -tolerance
            && self.max.x <= image_width + tolerance
            && self.max.y <= image_height + tolerance
    }
}

impl BBoxXYXY<Normalized> {
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Pixel> {
        BBoxXYXY::from_xyxy(
            self.min.x * image_width,
            self.min.y * image_height,
            self.max.x * image_width,
            self.max.y * image_height,
        )
    }
}
