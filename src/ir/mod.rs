//! Intermediate representation shared by all annotation schemas.
//!
//! Readers parse COCO JSON, YOLO text and Pascal VOC XML into a [`Dataset`];
//! writers emit a [`Dataset`] back out. Boxes are held as pixel-space corner
//! pairs, with the coordinate space carried in the type so that pixel and
//! normalized values cannot be mixed by accident.
//!
//! # Example
//!
//! ```
//! use annoconv::ir::{Annotation, BBoxXYXY, Category, Dataset, Image, Pixel};
//!
//! let dataset = Dataset {
//!     images: vec![Image::new(1u64, "a.jpg", 100, 200)],
//!     categories: vec![Category::new(1u64, "defect")],
//!     annotations: vec![Annotation::new(
//!         1u64,
//!         1u64,
//!         1u64,
//!         BBoxXYXY::<Pixel>::from_xywh(10.0, 20.0, 30.0, 40.0),
//!     )],
//!     ..Default::default()
//! };
//! assert_eq!(dataset.annotations[0].bbox.xmax(), 40.0);
//! ```

mod bbox;
mod categories;
mod coord;
pub mod geometry;
mod ids;
pub mod io_coco_json;
pub mod io_voc_xml;
pub mod io_yolo;
mod model;

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::AnnoconvError;

pub use bbox::BBoxXYXY;
pub use categories::{CategoryConflict, CategoryTable};
pub use coord::{Coord, Normalized, Pixel};
pub use geometry::{convert_geometry, BoxConvention, ImageSize};
pub use ids::{AnnotationId, CategoryId, ImageId};
pub use model::{Annotation, Category, Dataset, DatasetInfo, Image, Polygon};

/// An input file that was skipped because it could not be converted.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: AnnoconvError,
}

/// A dataset read from a per-image schema, plus the files that were skipped.
#[derive(Debug, Default)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    /// Number of source files considered, including failed ones.
    pub files_seen: usize,
    pub failures: Vec<FileFailure>,
}

impl LoadedDataset {
    /// Wraps a dataset read from a single source file.
    pub fn single(dataset: Dataset) -> Self {
        Self {
            dataset,
            files_seen: 1,
            failures: Vec::new(),
        }
    }

    /// Records a failure if it is per-file, or propagates it otherwise.
    pub(crate) fn absorb(&mut self, path: PathBuf, error: AnnoconvError) -> Result<(), AnnoconvError> {
        if !error.is_per_file() {
            return Err(error);
        }
        log::error!("skipping {}: {}", path.display(), error);
        self.failures.push(FileFailure { path, error });
        Ok(())
    }
}

/// Output paths, relative to the output root, for one file per image.
///
/// Each path is the image's `file_name` with `extension`, in input order.
/// A name that is absolute or climbs with `..` is rejected, as is a name
/// whose path is already taken by another image (`a.jpg` and `a.png`).
pub(crate) fn image_output_paths<'a>(
    images: impl IntoIterator<Item = &'a Image>,
    extension: &str,
) -> Result<Vec<PathBuf>, AnnoconvError> {
    let mut taken: BTreeMap<PathBuf, &str> = BTreeMap::new();
    let mut paths = Vec::new();

    for image in images {
        let name = Path::new(&image.file_name);
        let mut has_file = false;
        for component in name.components() {
            match component {
                Component::Normal(_) => has_file = true,
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(AnnoconvError::malformed(
                        name,
                        format!(
                            "image {} file_name must be a relative path inside the dataset",
                            image.id
                        ),
                    ));
                }
            }
        }
        if !has_file {
            return Err(AnnoconvError::malformed(
                name,
                format!("image {} has an empty file_name", image.id),
            ));
        }

        let output = name.with_extension(extension);
        if let Some(other) = taken.insert(output.clone(), &image.file_name) {
            return Err(AnnoconvError::malformed(
                name,
                format!(
                    "output file {} is also produced by image '{}'",
                    output.display(),
                    other
                ),
            ));
        }
        paths.push(output);
    }

    Ok(paths)
}
