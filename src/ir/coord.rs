//! Coordinate spaces and typed points.
//!
//! Boxes travel through the converter in one of two spaces: absolute pixels
//! (COCO, Pascal VOC) or fractions of the image size (YOLO). The space is a
//! type parameter so the two cannot be mixed without an explicit conversion
//! that supplies the image dimensions.

use std::fmt;
use std::marker::PhantomData;

/// Marker for absolute pixel coordinates, origin at the top-left corner.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Marker for coordinates expressed as a fraction of image width/height.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalized {}

/// A 2D point tagged with its coordinate space.
#[derive(Clone, Copy, PartialEq)]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> Coord<TSpace> {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    /// Returns true if neither component is NaN or infinite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl<TSpace> fmt::Debug for Coord<TSpace> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl<TSpace> Default for Coord<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}
