//! Box layout conventions and conversions between them.
//!
//! Each schema stores a box as four numbers, but the numbers mean different
//! things. [`convert_geometry`] rewrites a box from one [`BoxConvention`] to
//! another, requiring [`ImageSize`] only when crossing between pixel and
//! normalized space.

use std::fmt;

use super::bbox::BBoxXYXY;
use super::coord::{Normalized, Pixel};

/// How four box numbers are to be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoxConvention {
    /// `[xmin, ymin, xmax, ymax]` in pixels (Pascal VOC).
    CornerPixel,
    /// `[x, y, width, height]` in pixels, (x, y) top-left (COCO).
    CornerSizePixel,
    /// `[x_center, y_center, width, height]` as fractions of the image (YOLO).
    CenterSizeNormalized,
    /// `[xmin, ymin, xmax, ymax]` as fractions of the image.
    CornerNormalized,
}

impl BoxConvention {
    pub fn is_normalized(self) -> bool {
        matches!(
            self,
            BoxConvention::CenterSizeNormalized | BoxConvention::CornerNormalized
        )
    }
}

/// Width and height of an image in pixels, both non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    width: u32,
    height: u32,
}

impl ImageSize {
    /// Returns `None` when either dimension is zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Returned when a pixel <-> normalized conversion has no image size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissingImageSize {
    pub from: BoxConvention,
    pub to: BoxConvention,
}

impl fmt::Display for MissingImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "converting {:?} to {:?} requires image width and height",
            self.from, self.to
        )
    }
}

impl std::error::Error for MissingImageSize {}

/// Rewrites `values` from convention `from` to convention `to`.
///
/// Layout changes (center+size vs corner pair) are exact. Crossing between
/// pixel and normalized space scales by the image size and fails if `size`
/// is `None`.
pub fn convert_geometry(
    values: [f64; 4],
    from: BoxConvention,
    to: BoxConvention,
    size: Option<ImageSize>,
) -> Result<[f64; 4], MissingImageSize> {
    if from == to {
        return Ok(values);
    }

    let [a, b, c, d] = values;
    let out = match (from.is_normalized(), to.is_normalized()) {
        (false, false) => layout_pixel(pixel_box(from, a, b, c, d), to),
        (true, true) => layout_normalized(normalized_box(from, a, b, c, d), to),
        (false, true) => {
            let size = size.ok_or(MissingImageSize { from, to })?;
            let bbox = pixel_box(from, a, b, c, d)
                .to_normalized(size.width as f64, size.height as f64);
            layout_normalized(bbox, to)
        }
        (true, false) => {
            let size = size.ok_or(MissingImageSize { from, to })?;
            let bbox =
                normalized_box(from, a, b, c, d).to_pixel(size.width as f64, size.height as f64);
            layout_pixel(bbox, to)
        }
    };

    Ok(out)
}

fn pixel_box(from: BoxConvention, a: f64, b: f64, c: f64, d: f64) -> BBoxXYXY<Pixel> {
    match from {
        BoxConvention::CornerSizePixel => BBoxXYXY::from_xywh(a, b, c, d),
        _ => BBoxXYXY::from_xyxy(a, b, c, d),
    }
}

fn normalized_box(from: BoxConvention, a: f64, b: f64, c: f64, d: f64) -> BBoxXYXY<Normalized> {
    match from {
        BoxConvention::CenterSizeNormalized => BBoxXYXY::from_cxcywh(a, b, c, d),
        _ => BBoxXYXY::from_xyxy(a, b, c, d),
    }
}

fn layout_pixel(bbox: BBoxXYXY<Pixel>, to: BoxConvention) -> [f64; 4] {
    match to {
        BoxConvention::CornerSizePixel => bbox.to_xywh(),
        _ => bbox.to_xyxy(),
    }
}

fn layout_normalized(bbox: BBoxXYXY<Normalized>, to: BoxConvention) -> [f64; 4] {
    match to {
        BoxConvention::CenterSizeNormalized => bbox.to_cxcywh(),
        _ => bbox.to_xyxy(),
    }
}
