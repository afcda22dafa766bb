//! COCO JSON reader and writer.
//!
//! COCO keeps a whole dataset in one JSON object with `images`,
//! `annotations` and `categories` arrays. Boxes are `[x, y, width, height]`
//! in absolute pixels with (x, y) the top-left corner.
//!
//! The writer sorts every list by id so that output is reproducible.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::{Annotation, Category, Dataset, DatasetInfo, Image, Polygon};
use super::{AnnotationId, BBoxXYXY, CategoryId, CategoryTable, ImageId, Pixel};
use crate::error::AnnoconvError;

/// File name used when the caller gives an output directory instead of a
/// `.json` path.
pub const DEFAULT_FILE_NAME: &str = "annotations.json";

#[derive(Debug, Serialize, Deserialize)]
struct CocoDataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info: Option<CocoInfo>,
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CocoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    year: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contributor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date_created: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoImage {
    id: u64,
    width: u32,
    height: u32,
    file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    supercategory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoAnnotation {
    /// Optional on input; missing ids are assigned after the largest one seen.
    #[serde(default)]
    id: Option<u64>,
    image_id: u64,
    category_id: u64,
    bbox: [f64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iscrowd: Option<u8>,
    /// Polygon lists are kept; RLE objects are accepted and ignored.
    #[serde(default)]
    segmentation: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

/// Reads a COCO JSON file.
///
/// # Errors
/// [`AnnoconvError::MalformedInput`] if the file is not valid JSON, lacks
/// one of the required arrays, or has annotations that reference images or
/// categories not declared in the file.
pub fn read_coco_json(path: &Path) -> Result<Dataset, AnnoconvError> {
    let bytes = fs::read(path)?;
    parse_coco(&bytes, path)
}

/// Parses a COCO document held in memory.
pub fn from_coco_str(json: &str) -> Result<Dataset, AnnoconvError> {
    parse_coco(json.as_bytes(), Path::new("<memory>"))
}

/// Writes a dataset as one COCO JSON file.
///
/// The document is fully serialized before the file is created, so a
/// failure never leaves a truncated file behind.
pub fn write_coco_json(path: &Path, dataset: &Dataset) -> Result<(), AnnoconvError> {
    let json = serde_json::to_string_pretty(&ir_to_coco(dataset)).map_err(|source| {
        AnnoconvError::CocoJsonWrite {
            path: path.to_path_buf(),
            source,
        }
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    Ok(())
}

/// Serializes a dataset to a pretty-printed COCO string.
pub fn to_coco_string(dataset: &Dataset) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ir_to_coco(dataset))
}

/// Resolves where a COCO file goes for a caller-supplied output path.
pub fn output_file(output: &Path) -> std::path::PathBuf {
    let is_json = output
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        output.to_path_buf()
    } else {
        output.join(DEFAULT_FILE_NAME)
    }
}

fn parse_coco(bytes: &[u8], path: &Path) -> Result<Dataset, AnnoconvError> {
    let coco: CocoDataset = serde_json::from_slice(bytes)
        .map_err(|source| AnnoconvError::malformed(path, source.to_string()))?;
    coco_to_ir(coco, path)
}

fn coco_to_ir(coco: CocoDataset, path: &Path) -> Result<Dataset, AnnoconvError> {
    let info = coco
        .info
        .map(|info| DatasetInfo {
            description: info.description,
            version: info.version,
            year: info.year,
            contributor: info.contributor,
            url: info.url,
            date_created: info.date_created,
        })
        .unwrap_or_default();

    let mut image_ids = HashSet::with_capacity(coco.images.len());
    let mut images = Vec::with_capacity(coco.images.len());
    for img in coco.images {
        if !image_ids.insert(img.id) {
            return Err(AnnoconvError::malformed(
                path,
                format!("duplicate image id {}", img.id),
            ));
        }
        images.push(Image::new(img.id, img.file_name, img.width, img.height));
    }

    let mut table = CategoryTable::new();
    for cat in coco.categories {
        let category = Category {
            id: CategoryId::new(cat.id),
            name: cat.name,
            supercategory: cat.supercategory,
        };
        table
            .insert(category)
            .map_err(|conflict| AnnoconvError::malformed(path, conflict.to_string()))?;
    }

    let mut next_id = coco
        .annotations
        .iter()
        .filter_map(|ann| ann.id)
        .max()
        .unwrap_or(0)
        + 1;

    let mut annotations = Vec::with_capacity(coco.annotations.len());
    for (index, ann) in coco.annotations.into_iter().enumerate() {
        if !image_ids.contains(&ann.image_id) {
            return Err(AnnoconvError::malformed(
                path,
                format!(
                    "annotation at index {index} references unknown image_id {}",
                    ann.image_id
                ),
            ));
        }
        if table.name_of(CategoryId::new(ann.category_id)).is_none() {
            return Err(AnnoconvError::malformed(
                path,
                format!(
                    "annotation at index {index} references unknown category_id {}",
                    ann.category_id
                ),
            ));
        }

        let id = ann.id.unwrap_or_else(|| {
            let id = next_id;
            next_id += 1;
            id
        });

        let [x, y, w, h] = ann.bbox;
        let mut annotation = Annotation::new(
            AnnotationId::new(id),
            ImageId::new(ann.image_id),
            CategoryId::new(ann.category_id),
            BBoxXYXY::<Pixel>::from_xywh(x, y, w, h),
        )
        .with_segmentation(polygons_from_value(&ann.segmentation));

        annotation.confidence = ann.score;
        if let Some(iscrowd) = ann.iscrowd {
            annotation
                .attributes
                .insert("iscrowd".to_string(), iscrowd.to_string());
        }
        if let Some(area) = ann.area {
            annotation
                .attributes
                .insert("area".to_string(), format!("{:.6}", area));
        }

        annotations.push(annotation);
    }

    Ok(Dataset {
        info,
        images,
        categories: table.into_categories(),
        annotations,
    })
}

/// Extracts polygon lists; anything else (RLE, null, empty) yields none.
fn polygons_from_value(value: &serde_json::Value) -> Vec<Polygon> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|polygon| {
            let points: Option<Polygon> = polygon
                .as_array()?
                .iter()
                .map(serde_json::Value::as_f64)
                .collect();
            points.filter(|points| points.len() >= 6 && points.len() % 2 == 0)
        })
        .collect()
}

fn ir_to_coco(dataset: &Dataset) -> CocoDataset {
    let info = (!dataset.info.is_empty()).then(|| CocoInfo {
        description: dataset.info.description.clone(),
        version: dataset.info.version.clone(),
        year: dataset.info.year,
        contributor: dataset.info.contributor.clone(),
        url: dataset.info.url.clone(),
        date_created: dataset.info.date_created.clone(),
    });

    let mut images: Vec<CocoImage> = dataset
        .images
        .iter()
        .map(|img| CocoImage {
            id: img.id.as_u64(),
            width: img.width,
            height: img.height,
            file_name: img.file_name.clone(),
        })
        .collect();
    images.sort_by_key(|img| img.id);

    let mut categories: Vec<CocoCategory> = dataset
        .categories
        .iter()
        .map(|cat| CocoCategory {
            id: cat.id.as_u64(),
            name: cat.name.clone(),
            supercategory: cat.supercategory.clone(),
        })
        .collect();
    categories.sort_by_key(|cat| cat.id);

    let mut annotations: Vec<CocoAnnotation> = dataset
        .annotations
        .iter()
        .map(|ann| {
            let area = ann
                .attributes
                .get("area")
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or_else(|| ann.bbox.area());
            let iscrowd = ann
                .attributes
                .get("iscrowd")
                .and_then(|raw| raw.parse::<u8>().ok())
                .unwrap_or(0);

            CocoAnnotation {
                id: Some(ann.id.as_u64()),
                image_id: ann.image_id.as_u64(),
                category_id: ann.category_id.as_u64(),
                bbox: ann.bbox.to_xywh(),
                area: Some(area),
                iscrowd: Some(iscrowd),
                segmentation: serde_json::json!(ann.segmentation),
                score: ann.confidence,
            }
        })
        .collect();
    annotations.sort_by_key(|ann| ann.id);

    CocoDataset {
        info,
        images,
        annotations,
        categories,
    }
}
