//! The format-agnostic dataset model.
//!
//! Every reader produces a [`Dataset`] and every writer consumes one, so a
//! conversion between any two schemas is a parse into this model followed by
//! an emit out of it. Boxes are always stored as pixel-space corner pairs.

use std::collections::BTreeMap;

use super::bbox::BBoxXYXY;
use super::coord::Pixel;
use super::ids::{AnnotationId, CategoryId, ImageId};

/// A polygon as a flat `[x0, y0, x1, y1, ...]` list of pixel coordinates.
pub type Polygon = Vec<f64>;

/// A set of images, their categories and their annotation records.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    /// Dataset-level metadata; only COCO carries it.
    pub info: DatasetInfo,
    pub images: Vec<Image>,
    pub categories: Vec<Category>,
    pub annotations: Vec<Annotation>,
}

impl Dataset {
    /// Looks up an image by id.
    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.iter().find(|image| image.id == id)
    }

    /// Looks up a category by id.
    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }
}

/// COCO `info` block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetInfo {
    pub description: Option<String>,
    pub version: Option<String>,
    pub year: Option<u32>,
    pub contributor: Option<String>,
    pub url: Option<String>,
    pub date_created: Option<String>,
}

impl DatasetInfo {
    pub fn is_empty(&self) -> bool {
        *self == DatasetInfo::default()
    }
}

/// Image metadata needed to move between pixel and normalized coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub id: ImageId,
    /// File name relative to the dataset's image root.
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    /// Number of channels, when the source records it.
    pub depth: Option<u32>,
}

impl Image {
    pub fn new(
        id: impl Into<ImageId>,
        file_name: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            width,
            height,
            depth: None,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Returns the image size, or `None` if either dimension is zero.
    pub fn size(&self) -> Option<super::ImageSize> {
        super::ImageSize::new(self.width, self.height)
    }
}

/// A class label.
#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub supercategory: Option<String>,
}

impl Category {
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supercategory: None,
        }
    }
}

/// One object instance in one image.
#[derive(Clone, Debug)]
pub struct Annotation {
    pub id: AnnotationId,
    pub image_id: ImageId,
    pub category_id: CategoryId,
    pub bbox: BBoxXYXY<Pixel>,
    /// Polygon outlines in pixel space; empty for box-only records.
    pub segmentation: Vec<Polygon>,
    /// Detection score, for prediction files.
    pub confidence: Option<f64>,
    /// Schema-specific flags such as `pose`, `truncated`, `difficult`,
    /// `iscrowd` and `area`.
    pub attributes: BTreeMap<String, String>,
}

impl Annotation {
    pub fn new(
        id: impl Into<AnnotationId>,
        image_id: impl Into<ImageId>,
        category_id: impl Into<CategoryId>,
        bbox: BBoxXYXY<Pixel>,
    ) -> Self {
        Self {
            id: id.into(),
            image_id: image_id.into(),
            category_id: category_id.into(),
            bbox,
            segmentation: Vec::new(),
            confidence: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_segmentation(mut self, polygons: Vec<Polygon>) -> Self {
        self.segmentation = polygons;
        self
    }
}
