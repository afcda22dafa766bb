#![allow(dead_code)]

//! Dataset generators and record comparisons shared by the property tests.
//!
//! Generated datasets look like real COCO exports: ids are sparse, images
//! mix extensions and carry a channel depth, and some annotations carry VOC
//! flags. Records are compared by image file name and category name, since
//! every schema is free to renumber ids.

use std::collections::{BTreeMap, BTreeSet};

use annoconv::ir::{Annotation, BBoxXYXY, Category, Dataset, Image, Pixel};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// COCO stores the f64 box as written.
pub const COCO_TOLERANCE: f64 = 1e-10;
/// VOC prints the shortest f64 representation.
pub const VOC_TOLERANCE: f64 = 1e-9;

const EXTENSIONS: [&str; 3] = ["jpg", "png", "jpeg"];
const DEPTHS: [Option<u32>; 3] = [None, Some(1), Some(3)];

/// Pixel error of a YOLO round trip at six decimal places, for the largest image.
pub fn yolo_tolerance(dataset: &Dataset) -> f64 {
    dataset
        .images
        .iter()
        .map(|img| img.width.max(img.height) as f64 * 1e-6)
        .fold(1e-9, f64::max)
}

pub fn config() -> ProptestConfig {
    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(64);
    config
}

/// One annotation as every schema sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub file_name: String,
    pub category: String,
    pub corners: [f64; 4],
}

pub fn records(dataset: &Dataset) -> Result<Vec<Record>, String> {
    let files: BTreeMap<_, _> = dataset
        .images
        .iter()
        .map(|img| (img.id, img.file_name.as_str()))
        .collect();
    let names: BTreeMap<_, _> = dataset
        .categories
        .iter()
        .map(|cat| (cat.id, cat.name.as_str()))
        .collect();

    let mut out = dataset
        .annotations
        .iter()
        .map(|ann| {
            let file_name = files
                .get(&ann.image_id)
                .ok_or_else(|| format!("annotation {} has no image {}", ann.id, ann.image_id))?;
            let category = names.get(&ann.category_id).ok_or_else(|| {
                format!("annotation {} has no category {}", ann.id, ann.category_id)
            })?;
            Ok(Record {
                file_name: file_name.to_string(),
                category: category.to_string(),
                corners: ann.bbox.to_xyxy(),
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    out.sort_by(|a, b| {
        (&a.file_name, &a.category)
            .cmp(&(&b.file_name, &b.category))
            .then_with(|| {
                a.corners
                    .iter()
                    .zip(&b.corners)
                    .map(|(x, y)| x.total_cmp(y))
                    .find(|ord| ord.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    Ok(out)
}

/// Both datasets hold the same records, boxes within `eps`.
pub fn same_records(left: &Dataset, right: &Dataset, eps: f64) -> Result<(), String> {
    let (l, r) = (records(left)?, records(right)?);
    if l.len() != r.len() {
        return Err(format!("{} records vs {}", l.len(), r.len()));
    }
    match_records(&l, &r, eps)
}

/// Every record of `part` appears in `whole`, boxes within `eps`.
pub fn records_within(part: &Dataset, whole: &Dataset, eps: f64) -> Result<(), String> {
    match_records(&records(part)?, &records(whole)?, eps)
}

fn match_records(wanted: &[Record], pool: &[Record], eps: f64) -> Result<(), String> {
    let mut taken = vec![false; pool.len()];
    for record in wanted {
        let hit = pool.iter().enumerate().position(|(idx, candidate)| {
            !taken[idx]
                && candidate.file_name == record.file_name
                && candidate.category == record.category
                && candidate
                    .corners
                    .iter()
                    .zip(&record.corners)
                    .all(|(a, b)| (a - b).abs() <= eps)
        });
        match hit {
            Some(idx) => taken[idx] = true,
            None => return Err(format!("no match for {record:?} within {eps}")),
        }
    }
    Ok(())
}

/// Every annotation points at an existing image and category.
pub fn check_references(dataset: &Dataset) -> Result<(), String> {
    records(dataset).map(|_| ())
}

/// Category names and ids are each unique, so the table maps both ways.
pub fn check_category_bijection(dataset: &Dataset) -> Result<(), String> {
    let mut ids = BTreeSet::new();
    let mut names = BTreeSet::new();
    for cat in &dataset.categories {
        if !ids.insert(cat.id) {
            return Err(format!("category id {} appears twice", cat.id));
        }
        if !names.insert(cat.name.as_str()) {
            return Err(format!("category name '{}' appears twice", cat.name));
        }
    }
    Ok(())
}

/// Sizes for a generated dataset.
#[derive(Clone, Copy, Debug)]
pub struct Shape {
    pub images: usize,
    pub categories: usize,
    pub annotations: usize,
}

#[derive(Clone, Debug)]
struct ImageSeed {
    stem: String,
    extension: usize,
    width: u32,
    height: u32,
    depth: usize,
}

#[derive(Clone, Debug)]
struct BoxSeed {
    image: usize,
    category: usize,
    corner: (u32, u32),
    extent: (u32, u32),
    difficult: Option<bool>,
}

/// Any dataset within `shape`; some images and categories may go unused.
pub fn arb_dataset(shape: Shape) -> BoxedStrategy<Dataset> {
    (
        image_seeds(shape.images),
        category_names(shape.categories),
        proptest::collection::vec(box_seed(), 0..=shape.annotations),
        1u64..=4,
    )
        .prop_map(|(images, names, boxes, stride)| assemble(images, names, boxes, stride, false))
        .boxed()
}

/// A dataset where every image and every category has an annotation, so
/// schemas that drop empty categories (VOC) still hold everything.
pub fn arb_covered_dataset(shape: Shape) -> BoxedStrategy<Dataset> {
    assert!(shape.annotations >= shape.images.max(shape.categories));
    (
        image_seeds(shape.images),
        category_names(shape.categories),
        proptest::collection::vec(
            box_seed(),
            shape.images.max(shape.categories)..=shape.annotations,
        ),
        1u64..=4,
    )
        .prop_map(|(images, names, boxes, stride)| assemble(images, names, boxes, stride, true))
        .boxed()
}

fn image_seeds(max: usize) -> impl Strategy<Value = Vec<ImageSeed>> {
    // Unique stems keep one output file per image.
    proptest::collection::btree_set("[a-z0-9_]{1,10}", 1..=max).prop_flat_map(|stems| {
        let count = stems.len();
        (
            Just(stems),
            proptest::collection::vec(
                (0..EXTENSIONS.len(), 2u32..=4096, 2u32..=4096, 0..DEPTHS.len()),
                count,
            ),
        )
            .prop_map(|(stems, attrs)| {
                stems
                    .into_iter()
                    .zip(attrs)
                    .map(|(stem, (extension, width, height, depth))| ImageSeed {
                        stem,
                        extension,
                        width,
                        height,
                        depth,
                    })
                    .collect()
            })
    })
}

fn category_names(max: usize) -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set("[a-z]{1,12}", 1..=max)
        .prop_map(|names| names.into_iter().collect())
}

fn box_seed() -> impl Strategy<Value = BoxSeed> {
    (
        any::<usize>(),
        any::<usize>(),
        (any::<u32>(), any::<u32>()),
        (any::<u32>(), any::<u32>()),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(image, category, corner, extent, difficult)| BoxSeed {
            image,
            category,
            corner,
            extent,
            difficult,
        })
}

fn assemble(
    image_seeds: Vec<ImageSeed>,
    names: Vec<String>,
    box_seeds: Vec<BoxSeed>,
    stride: u64,
    cover: bool,
) -> Dataset {
    // COCO exports rarely number densely.
    let sparse_id = |idx: usize| 1 + idx as u64 * stride;

    let images: Vec<Image> = image_seeds
        .into_iter()
        .enumerate()
        .map(|(idx, seed)| {
            let file_name = format!("{}.{}", seed.stem, EXTENSIONS[seed.extension]);
            let mut image = Image::new(sparse_id(idx), file_name, seed.width, seed.height);
            image.depth = DEPTHS[seed.depth];
            image
        })
        .collect();

    let categories: Vec<Category> = names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| Category::new(sparse_id(idx) + 100, name))
        .collect();

    let annotations = box_seeds
        .into_iter()
        .enumerate()
        .map(|(idx, seed)| {
            let (image, category) = if cover && idx < images.len().max(categories.len()) {
                (&images[idx % images.len()], &categories[idx % categories.len()])
            } else {
                (
                    &images[seed.image % images.len()],
                    &categories[seed.category % categories.len()],
                )
            };
            let mut ann = Annotation::new(
                sparse_id(idx) + 1000,
                image.id,
                category.id,
                box_inside(image, seed.corner, seed.extent),
            );
            if let Some(difficult) = seed.difficult {
                ann.attributes
                    .insert("difficult".to_string(), u8::from(difficult).to_string());
            }
            ann
        })
        .collect();

    Dataset {
        images,
        categories,
        annotations,
        ..Default::default()
    }
}

/// An integer box at least one pixel wide and tall, inside the image.
fn box_inside(image: &Image, corner: (u32, u32), extent: (u32, u32)) -> BBoxXYXY<Pixel> {
    let xmin = corner.0 % (image.width - 1);
    let ymin = corner.1 % (image.height - 1);
    let xmax = xmin + 1 + extent.0 % (image.width - xmin);
    let ymax = ymin + 1 + extent.1 % (image.height - ymin);
    BBoxXYXY::from_xyxy(xmin as f64, ymin as f64, xmax as f64, ymax as f64)
}
