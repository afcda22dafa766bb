//! Dataset validation.
//!
//! Checks run on the IR after parsing and before emitting:
//! - structural integrity (unique IDs, valid references, image dimensions)
//! - naming (non-empty, non-duplicated category names)
//! - geometry (finite, ordered, non-empty boxes inside the image)
//!
//! Structural problems are errors: the dataset cannot be emitted faithfully.
//! Geometric oddities are warnings: the box is converted unmodified.

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use std::collections::{HashMap, HashSet};

use crate::ir::{AnnotationId, CategoryId, Dataset, ImageId};

/// Pixels of slack allowed past each image edge before a box counts as out
/// of bounds.
pub const BOUNDS_TOLERANCE: f64 = 0.5;

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// If true, callers should treat warnings as failures.
    pub strict: bool,
}

/// Validates a dataset and returns a report of all issues found.
pub fn validate_dataset(dataset: &Dataset, _opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    let image_ids: HashSet<ImageId> = dataset.images.iter().map(|i| i.id).collect();
    let category_ids: HashSet<CategoryId> = dataset.categories.iter().map(|c| c.id).collect();

    validate_images(dataset, &mut report);
    validate_categories(dataset, &mut report);
    validate_annotations(dataset, &image_ids, &category_ids, &mut report);

    report
}

fn validate_images(dataset: &Dataset, report: &mut ValidationReport) {
    let mut seen_ids: HashMap<ImageId, usize> = HashMap::new();

    for (idx, image) in dataset.images.iter().enumerate() {
        let id = image.id.as_u64();

        if let Some(first_idx) = seen_ids.get(&image.id) {
            report.add(ValidationIssue::error(
                IssueCode::DuplicateImageId,
                format!(
                    "Duplicate image ID {} (first seen at index {})",
                    id, first_idx
                ),
                IssueContext::Image { id },
            ));
        } else {
            seen_ids.insert(image.id, idx);
        }

        if image.width == 0 || image.height == 0 {
            report.add(ValidationIssue::error(
                IssueCode::InvalidImageDimensions,
                format!(
                    "Invalid dimensions {}x{} for '{}' (must be positive)",
                    image.width, image.height, image.file_name
                ),
                IssueContext::Image { id },
            ));
        }

        if image.file_name.is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyFileName,
                "Empty filename",
                IssueContext::Image { id },
            ));
        }
    }
}

fn validate_categories(dataset: &Dataset, report: &mut ValidationReport) {
    let mut seen_ids: HashMap<CategoryId, usize> = HashMap::new();
    let mut seen_names: HashMap<&str, CategoryId> = HashMap::new();

    for (idx, category) in dataset.categories.iter().enumerate() {
        let id = category.id.as_u64();

        if let Some(first_idx) = seen_ids.get(&category.id) {
            report.add(ValidationIssue::error(
                IssueCode::DuplicateCategoryId,
                format!(
                    "Duplicate category ID {} (first seen at index {})",
                    id, first_idx
                ),
                IssueContext::Category { id },
            ));
        } else {
            seen_ids.insert(category.id, idx);
        }

        if category.name.is_empty() {
            report.add(ValidationIssue::warning(
                IssueCode::EmptyCategoryName,
                "Empty category name",
                IssueContext::Category { id },
            ));
        } else if let Some(first_id) = seen_names.get(category.name.as_str()) {
            report.add(ValidationIssue::warning(
                IssueCode::DuplicateCategoryName,
                format!(
                    "Duplicate category name '{}' (also used by category {})",
                    category.name, first_id
                ),
                IssueContext::Category { id },
            ));
        } else {
            seen_names.insert(&category.name, category.id);
        }
    }
}

fn validate_annotations(
    dataset: &Dataset,
    image_ids: &HashSet<ImageId>,
    category_ids: &HashSet<CategoryId>,
    report: &mut ValidationReport,
) {
    let mut seen_ids: HashMap<AnnotationId, usize> = HashMap::new();

    let image_dims: HashMap<ImageId, (u32, u32)> = dataset
        .images
        .iter()
        .map(|i| (i.id, (i.width, i.height)))
        .collect();

    for (idx, annotation) in dataset.annotations.iter().enumerate() {
        let id = annotation.id.as_u64();

        if let Some(first_idx) = seen_ids.get(&annotation.id) {
            report.add(ValidationIssue::error(
                IssueCode::DuplicateAnnotationId,
                format!(
                    "Duplicate annotation ID {} (first seen at index {})",
                    id, first_idx
                ),
                IssueContext::Annotation { id },
            ));
        } else {
            seen_ids.insert(annotation.id, idx);
        }

        if !image_ids.contains(&annotation.image_id) {
            report.add(ValidationIssue::error(
                IssueCode::MissingImageRef,
                format!("References non-existent image {}", annotation.image_id),
                IssueContext::Annotation { id },
            ));
        }

        if !category_ids.contains(&annotation.category_id) {
            report.add(ValidationIssue::error(
                IssueCode::MissingCategoryRef,
                format!(
                    "References non-existent category {}",
                    annotation.category_id
                ),
                IssueContext::Annotation { id },
            ));
        }

        let bbox = &annotation.bbox;

        if !bbox.is_finite() {
            report.add(ValidationIssue::error(
                IssueCode::BBoxNotFinite,
                format!(
                    "Non-finite coordinates ({}, {}, {}, {})",
                    bbox.xmin(),
                    bbox.ymin(),
                    bbox.xmax(),
                    bbox.ymax()
                ),
                IssueContext::Annotation { id },
            ));
            continue;
        }

        if !bbox.is_ordered() {
            report.add(ValidationIssue::warning(
                IssueCode::InvalidBBoxOrdering,
                format!(
                    "Inverted box: min ({}, {}) should be <= max ({}, {})",
                    bbox.xmin(),
                    bbox.ymin(),
                    bbox.xmax(),
                    bbox.ymax()
                ),
                IssueContext::Annotation { id },
            ));
        } else if bbox.is_degenerate() {
            report.add(ValidationIssue::warning(
                IssueCode::ZeroAreaBox,
                format!(
                    "Zero-area box {:.1}x{:.1} at ({:.1}, {:.1})",
                    bbox.width(),
                    bbox.height(),
                    bbox.xmin(),
                    bbox.ymin()
                ),
                IssueContext::Annotation { id },
            ));
        }

        if let Some(&(width, height)) = image_dims.get(&annotation.image_id) {
            if width > 0
                && height > 0
                && !bbox.is_within(width as f64, height as f64, BOUNDS_TOLERANCE)
            {
                report.add(ValidationIssue::warning(
                    IssueCode::BBoxOutOfBounds,
                    format!(
                        "Bounding box ({:.1}, {:.1}, {:.1}, {:.1}) extends outside image bounds (0, 0, {}, {})",
                        bbox.xmin(), bbox.ymin(), bbox.xmax(), bbox.ymax(), width, height
                    ),
                    IssueContext::Annotation { id },
                ));
            }
        }
    }
}
