//! YOLO label reader and writer.
//!
//! YOLO keeps one `.txt` file per image. Each line is
//! `class_id x_center y_center width height` with coordinates normalized to
//! the image size, so reading needs the companion image to recover pixel
//! coordinates. Two layouts are understood:
//!
//! - a dataset root with `labels/` and `images/` subdirectories;
//! - a bare labels directory, with the images directory supplied separately
//!   (or found as a sibling `images/`).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use super::model::{Annotation, Category, Dataset, Image};
use super::{
    convert_geometry, image_output_paths, AnnotationId, BBoxXYXY, BoxConvention, CategoryId,
    CategoryTable, ImageId, ImageSize, LoadedDataset, Pixel,
};
use crate::error::AnnoconvError;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];
const LABEL_EXTENSION: &str = "txt";
const CLASSES_TXT: &str = "classes.txt";
const DATA_YAML: &str = "data.yaml";

/// Default number of decimal places for normalized coordinates.
pub const DEFAULT_PRECISION: usize = 6;

/// Reader settings.
#[derive(Clone, Debug, Default)]
pub struct YoloReadOptions {
    /// Class names by index. Overrides `data.yaml` and `classes.txt`.
    pub class_names: Option<Vec<String>>,
    /// Directory holding the images the label files describe.
    pub images_dir: Option<PathBuf>,
}

/// Writer settings.
#[derive(Clone, Debug)]
pub struct YoloWriteOptions {
    /// Decimal places for normalized coordinates.
    pub precision: usize,
}

impl Default for YoloWriteOptions {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }
}

/// Reads a YOLO labels tree into IR.
///
/// A label file is skipped (and recorded in [`LoadedDataset::failures`])
/// when a line is malformed, a class id is outside the class list, or the
/// companion image cannot be found or measured. Images with no label file
/// are included with no annotations.
pub fn read_yolo(path: &Path, options: &YoloReadOptions) -> Result<LoadedDataset, AnnoconvError> {
    let layout = discover_layout(path, options)?;
    let class_names = match &options.class_names {
        Some(names) => names.clone(),
        None => read_class_map(&layout)?,
    };
    let table = CategoryTable::from_names(class_names.iter().cloned())
        .map_err(|conflict| AnnoconvError::malformed(path, conflict.to_string()))?;
    log::debug!("YOLO class map has {} class(es)", table.len());

    let label_files = collect_label_files(&layout.labels_dir)?;
    let mut loaded = LoadedDataset {
        files_seen: label_files.len(),
        ..Default::default()
    };

    // Stems of every label file, including ones that fail to parse, so a
    // rejected label never resurfaces as an unlabeled image.
    let label_stems: BTreeSet<PathBuf> = label_files
        .iter()
        .map(|label_path| stem_rel(&layout.labels_dir, label_path))
        .collect();

    // Keyed by image path relative to the images dir.
    let mut entries: BTreeMap<String, (ImageSize, Vec<(usize, BBoxXYXY<Pixel>)>)> = BTreeMap::new();

    for label_path in label_files {
        log::debug!("reading {}", label_path.display());
        match read_label_file(&label_path, &layout, class_names.len()) {
            Ok((image_rel, size, boxes)) => {
                entries.insert(image_rel, (size, boxes));
            }
            Err(error) => loaded.absorb(label_path, error)?,
        }
    }

    if let Some(images_dir) = &layout.images_dir {
        for image_path in collect_files(images_dir, &IMAGE_EXTENSIONS)? {
            if label_stems.contains(&stem_rel(images_dir, &image_path)) {
                continue;
            }
            let rel = rel_string(images_dir, &image_path);
            loaded.files_seen += 1;
            match read_image_size(&image_path) {
                Ok(size) => {
                    entries.insert(rel, (size, Vec::new()));
                }
                Err(error) => loaded.absorb(image_path, error)?,
            }
        }
    }

    let mut next_annotation_id: u64 = 1;
    for (index, (file_name, (size, boxes))) in entries.into_iter().enumerate() {
        let image_id = ImageId::new((index + 1) as u64);
        for (class_id, bbox) in boxes {
            loaded.dataset.annotations.push(Annotation::new(
                AnnotationId::new(next_annotation_id),
                image_id,
                CategoryId::new(class_id as u64 + 1),
                bbox,
            ));
            next_annotation_id += 1;
        }
        loaded
            .dataset
            .images
            .push(Image::new(image_id, file_name, size.width(), size.height()));
    }

    loaded.dataset.categories = table.into_categories();
    Ok(loaded)
}

/// Writes a dataset as YOLO labels.
///
/// Creates `labels/<image stem>.txt` for every image (empty when the image
/// has no annotations), plus `classes.txt` and `data.yaml` at the root and
/// an empty `images/` directory. Class indices follow ascending category
/// id. Returns the number of label files written.
///
/// Every image must have non-zero dimensions; this is checked before any
/// file is created.
pub fn write_yolo_dir(
    path: &Path,
    dataset: &Dataset,
    options: &YoloWriteOptions,
) -> Result<usize, AnnoconvError> {
    let table = CategoryTable::from_categories(&dataset.categories)
        .map_err(|conflict| AnnoconvError::malformed(path, conflict.to_string()))?;

    let mut images_sorted: Vec<(&Image, ImageSize)> = Vec::with_capacity(dataset.images.len());
    for image in &dataset.images {
        let size = image.size().ok_or_else(|| {
            AnnoconvError::missing_metadata(
                Path::new(&image.file_name),
                format!(
                    "image {} has dimensions {}x{}; YOLO needs both to be non-zero",
                    image.id, image.width, image.height
                ),
            )
        })?;
        images_sorted.push((image, size));
    }
    images_sorted.sort_by(|(a, _), (b, _)| a.file_name.cmp(&b.file_name));
    let label_paths =
        image_output_paths(images_sorted.iter().map(|(image, _)| *image), LABEL_EXTENSION)?;

    let mut annotations_by_image: BTreeMap<ImageId, Vec<&Annotation>> = BTreeMap::new();
    for ann in &dataset.annotations {
        annotations_by_image.entry(ann.image_id).or_default().push(ann);
    }

    let labels_dir = path.join("labels");
    fs::create_dir_all(&labels_dir)?;
    fs::create_dir_all(path.join("images"))?;

    for (&(image, size), label_rel) in images_sorted.iter().zip(&label_paths) {
        let mut anns = annotations_by_image.remove(&image.id).unwrap_or_default();
        anns.sort_by_key(|ann| ann.id);

        let mut content = String::new();
        for ann in anns {
            let class_index = table.class_index(ann.category_id).ok_or_else(|| {
                AnnoconvError::malformed(
                    path,
                    format!(
                        "annotation {} references missing category {}",
                        ann.id, ann.category_id
                    ),
                )
            })?;
            let values = convert_geometry(
                ann.bbox.to_xyxy(),
                BoxConvention::CornerPixel,
                BoxConvention::CenterSizeNormalized,
                Some(size),
            )
            .map_err(|err| {
                AnnoconvError::missing_metadata(Path::new(&image.file_name), err.to_string())
            })?;
            content.push_str(&format_label_line(class_index, values, options.precision));
            content.push('\n');
        }

        let label_path = labels_dir.join(label_rel);
        if let Some(parent) = label_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&label_path, content)?;
    }

    let categories = table.sorted_by_id();
    write_class_files(path, &categories)?;

    Ok(images_sorted.len())
}

/// Formats one label line with fixed precision.
pub fn format_label_line(class_index: usize, values: [f64; 4], precision: usize) -> String {
    let [cx, cy, w, h] = values;
    format!("{class_index} {cx:.precision$} {cy:.precision$} {w:.precision$} {h:.precision$}")
}

#[derive(Clone, Debug)]
struct YoloLayout {
    root: PathBuf,
    labels_dir: PathBuf,
    images_dir: Option<PathBuf>,
}

#[derive(Debug, PartialEq)]
struct YoloLabelRow {
    class_id: usize,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
}

fn discover_layout(input: &Path, options: &YoloReadOptions) -> Result<YoloLayout, AnnoconvError> {
    if !input.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("YOLO input '{}' is not a directory", input.display()),
        )
        .into());
    }

    let (root, labels_dir) = if input.join("labels").is_dir() {
        (input.to_path_buf(), input.join("labels"))
    } else {
        let root = input
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(input)
            .to_path_buf();
        (root, input.to_path_buf())
    };

    let images_dir = match &options.images_dir {
        Some(dir) if dir.is_dir() => Some(dir.clone()),
        Some(dir) => {
            log::warn!("images directory {} does not exist", dir.display());
            None
        }
        None => Some(root.join("images")).filter(|dir| dir.is_dir()),
    };

    Ok(YoloLayout {
        root,
        labels_dir,
        images_dir,
    })
}

fn read_class_map(layout: &YoloLayout) -> Result<Vec<String>, AnnoconvError> {
    for dir in [&layout.root, &layout.labels_dir] {
        let data_yaml = dir.join(DATA_YAML);
        if data_yaml.is_file() {
            return read_data_yaml_names(&data_yaml);
        }
    }
    for dir in [&layout.labels_dir, &layout.root] {
        let classes_txt = dir.join(CLASSES_TXT);
        if classes_txt.is_file() {
            return read_classes_txt(&classes_txt);
        }
    }

    log::warn!(
        "no {DATA_YAML} or {CLASSES_TXT} found near {}; class names will be inferred",
        layout.labels_dir.display()
    );
    infer_class_map(&layout.labels_dir)
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

/// Reads class names from a `data.yaml` file (`names:` as a list or as an
/// index mapping).
pub fn read_data_yaml_names(path: &Path) -> Result<Vec<String>, AnnoconvError> {
    let data = fs::read_to_string(path)?;
    let parsed: DataYaml = serde_yaml::from_str(&data)
        .map_err(|source| AnnoconvError::malformed(path, source.to_string()))?;

    let names = match parsed.names {
        DataYamlNames::Sequence(names) => names,
        DataYamlNames::Mapping(mapping) => {
            let len = mapping.keys().next_back().map(|max| max + 1).unwrap_or(0);
            (0..len)
                .map(|index| {
                    mapping
                        .get(&index)
                        .filter(|name| !name.trim().is_empty())
                        .cloned()
                        .unwrap_or_else(|| format!("class_{index}"))
                })
                .collect()
        }
    };

    Ok(names)
}

/// Reads class names from a text file, one per line. Trailing blank lines
/// are ignored; a blank line in the middle is malformed.
pub fn read_classes_txt(path: &Path) -> Result<Vec<String>, AnnoconvError> {
    let data = fs::read_to_string(path)?;
    let lines: Vec<&str> = data.lines().map(str::trim).collect();
    let used = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .map(|last| last + 1)
        .unwrap_or(0);

    lines[..used]
        .iter()
        .enumerate()
        .map(|(index, line)| {
            if line.is_empty() {
                Err(AnnoconvError::malformed(
                    path,
                    format!("line {} is empty", index + 1),
                ))
            } else {
                Ok(line.to_string())
            }
        })
        .collect()
}

fn write_class_files(output_root: &Path, categories: &[&Category]) -> Result<(), AnnoconvError> {
    let mut classes = String::new();
    let mut yaml = String::from("names:\n");
    for (idx, category) in categories.iter().enumerate() {
        classes.push_str(&category.name);
        classes.push('\n');
        yaml.push_str(&format!("  {}: {}\n", idx, yaml_single_quoted(&category.name)));
    }

    fs::write(output_root.join(CLASSES_TXT), classes)?;
    fs::write(output_root.join(DATA_YAML), yaml)?;
    Ok(())
}

fn yaml_single_quoted(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

fn infer_class_map(labels_dir: &Path) -> Result<Vec<String>, AnnoconvError> {
    let mut class_ids = BTreeSet::new();
    for label_path in collect_label_files(labels_dir)? {
        let content = fs::read_to_string(&label_path)?;
        for (line_idx, line) in content.lines().enumerate() {
            // Bad lines are reported when the file itself is read.
            if let Ok(Some(row)) = parse_label_line(line, &label_path, line_idx + 1) {
                class_ids.insert(row.class_id);
            }
        }
    }

    Ok(match class_ids.last() {
        Some(&max_id) => (0..=max_id).map(|id| format!("class_{id}")).collect(),
        None => Vec::new(),
    })
}

/// Parses one label file, returning the companion image's relative path,
/// its size and the boxes in pixels. Nothing is kept if any line fails.
fn read_label_file(
    label_path: &Path,
    layout: &YoloLayout,
    class_count: usize,
) -> Result<(String, ImageSize, Vec<(usize, BBoxXYXY<Pixel>)>), AnnoconvError> {
    let content = fs::read_to_string(label_path)?;
    let rows = parse_label_rows(&content, label_path, class_count)?;

    let images_dir = layout.images_dir.as_deref().ok_or_else(|| {
        AnnoconvError::missing_metadata(label_path, "no images directory to read dimensions from")
    })?;
    let label_rel = label_path
        .strip_prefix(&layout.labels_dir)
        .unwrap_or(label_path);
    let image_path = find_image_for_label(images_dir, label_rel).ok_or_else(|| {
        AnnoconvError::missing_metadata(
            label_path,
            format!(
                "no image named '{}' with extension {:?} in {}",
                label_rel.with_extension("").display(),
                IMAGE_EXTENSIONS,
                images_dir.display()
            ),
        )
    })?;

    let size = read_image_size(&image_path)?;
    let boxes = rows_to_pixels(rows, size, label_path)?;
    Ok((rel_string(images_dir, &image_path), size, boxes))
}

fn parse_label_rows(
    content: &str,
    label_path: &Path,
    class_count: usize,
) -> Result<Vec<YoloLabelRow>, AnnoconvError> {
    let mut rows = Vec::new();
    for (line_idx, line) in content.lines().enumerate() {
        let line_num = line_idx + 1;
        let Some(row) = parse_label_line(line, label_path, line_num)? else {
            continue;
        };
        if row.class_id >= class_count {
            return Err(AnnoconvError::malformed(
                label_path,
                format!(
                    "line {line_num}: class_id {} is out of range for {} class(es)",
                    row.class_id, class_count
                ),
            ));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn rows_to_pixels(
    rows: Vec<YoloLabelRow>,
    size: ImageSize,
    label_path: &Path,
) -> Result<Vec<(usize, BBoxXYXY<Pixel>)>, AnnoconvError> {
    rows.into_iter()
        .map(|row| {
            let [xmin, ymin, xmax, ymax] = convert_geometry(
                [row.cx, row.cy, row.w, row.h],
                BoxConvention::CenterSizeNormalized,
                BoxConvention::CornerPixel,
                Some(size),
            )
            .map_err(|err| AnnoconvError::missing_metadata(label_path, err.to_string()))?;
            Ok((row.class_id, BBoxXYXY::from_xyxy(xmin, ymin, xmax, ymax)))
        })
        .collect()
}

fn read_image_size(path: &Path) -> Result<ImageSize, AnnoconvError> {
    let size = imagesize::size(path).map_err(|source| {
        AnnoconvError::missing_metadata(path, format!("cannot read image header: {source}"))
    })?;

    let width = u32::try_from(size.width).unwrap_or(0);
    let height = u32::try_from(size.height).unwrap_or(0);
    ImageSize::new(width, height).ok_or_else(|| {
        AnnoconvError::missing_metadata(
            path,
            format!("unusable image size {}x{}", size.width, size.height),
        )
    })
}

fn stem_rel(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).with_extension("")
}

fn find_image_for_label(images_dir: &Path, label_rel_path: &Path) -> Option<PathBuf> {
    let stem_rel_path = label_rel_path.with_extension("");
    IMAGE_EXTENSIONS
        .iter()
        .flat_map(|ext| [ext.to_string(), ext.to_ascii_uppercase()])
        .map(|ext| images_dir.join(&stem_rel_path).with_extension(ext))
        .find(|candidate| candidate.is_file())
}

fn collect_label_files(labels_dir: &Path) -> Result<Vec<PathBuf>, AnnoconvError> {
    let files = collect_files(labels_dir, &[LABEL_EXTENSION])?;
    Ok(files
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| !name.eq_ignore_ascii_case(CLASSES_TXT))
                .unwrap_or(true)
        })
        .collect())
}

/// Files under `root` with one of `extensions`, sorted by relative path.
fn collect_files(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, AnnoconvError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| {
            std::io::Error::other(format!("failed while traversing {}: {source}", root.display()))
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort_by_cached_key(|path| rel_string(root, path));
    Ok(files)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<YoloLabelRow>, AnnoconvError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // At most 6 tokens, so pathological lines do not allocate unboundedly.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();
    if tokens.len() != 5 {
        let found = if tokens.len() > 5 {
            "more than 5".to_string()
        } else {
            tokens.len().to_string()
        };
        return Err(AnnoconvError::malformed(
            file_path,
            format!("line {line_num}: expected 5 tokens, found {found}"),
        ));
    }

    let class_id = tokens[0].parse::<usize>().map_err(|_| {
        AnnoconvError::malformed(
            file_path,
            format!(
                "line {line_num}: invalid class_id '{}'; expected non-negative integer",
                tokens[0]
            ),
        )
    })?;

    let parse = |raw: &str, field: &str| {
        raw.parse::<f64>().map_err(|_| {
            AnnoconvError::malformed(
                file_path,
                format!("line {line_num}: invalid {field} '{raw}'; expected a number"),
            )
        })
    };

    Ok(Some(YoloLabelRow {
        class_id,
        cx: parse(tokens[1], "x_center")?,
        cy: parse(tokens[2], "y_center")?,
        w: parse(tokens[3], "width")?,
        h: parse(tokens[4], "height")?,
    }))
}

fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

/// Fuzz-only entrypoint for single-line label parsing.
/// Runs a whole label file through the reader's row parsing and pixel
/// conversion, as if its companion image were `width` x `height`.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_file(
    content: &str,
    class_count: usize,
    width: u32,
    height: u32,
) -> Result<(), AnnoconvError> {
    let path = Path::new("<fuzz>");
    let rows = parse_label_rows(content, path, class_count)?;
    if let Some(size) = ImageSize::new(width, height) {
        rows_to_pixels(rows, size, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png_header(path: &Path, width: u32, height: u32) {
        let mut bytes = b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR".to_vec();
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 2, 0, 0, 0, 0, 0, 0, 0]);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn parse_label_line_accepts_valid_rows() {
        let row = parse_label_line("2 0.5 0.25 0.3 0.1", Path::new("a.txt"), 1)
            .expect("parse should succeed")
            .expect("line should produce a row");
        assert_eq!(
            row,
            YoloLabelRow {
                class_id: 2,
                cx: 0.5,
                cy: 0.25,
                w: 0.3,
                h: 0.1,
            }
        );
    }

    #[test]
    fn parse_label_line_skips_blank_rows() {
        assert!(parse_label_line("   ", Path::new("a.txt"), 2)
            .expect("parse should succeed")
            .is_none());
    }

    #[test]
    fn parse_label_line_rejects_wrong_token_counts() {
        for line in ["0 0.1 0.2", "0 0.1 0.2 0.3 0.4 0.5"] {
            let err = parse_label_line(line, Path::new("a.txt"), 3).unwrap_err();
            assert!(matches!(err, AnnoconvError::MalformedInput { .. }), "{line}");
        }
    }

    #[test]
    fn parse_label_line_rejects_negative_class() {
        let err = parse_label_line("-1 0.5 0.5 0.1 0.1", Path::new("a.txt"), 1).unwrap_err();
        assert!(err.to_string().contains("invalid class_id '-1'"));
    }

    #[test]
    fn label_rows_name_the_line_with_an_unknown_class() {
        let content = "0 0.5 0.5 0.2 0.2\n\n1 0.1 0.1 0.1 0.1\n2 0.5 0.5 0.1 0.1\n";
        let err = parse_label_rows(content, Path::new("a.txt"), 2).unwrap_err();
        assert!(err.is_per_file());
        assert!(err
            .to_string()
            .contains("line 4: class_id 2 is out of range for 2 class(es)"));

        let rows = parse_label_rows(content, Path::new("a.txt"), 3).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn rows_to_pixels_scales_by_image_size() {
        let rows = parse_label_rows("1 0.25 0.2 0.3 0.2\n", Path::new("a.txt"), 2).unwrap();
        let size = ImageSize::new(100, 200).unwrap();
        let boxes = rows_to_pixels(rows, size, Path::new("a.txt")).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].0, 1);
        let [xmin, ymin, xmax, ymax] = boxes[0].1.to_xyxy();
        for (got, want) in [xmin, ymin, xmax, ymax].iter().zip([10.0, 20.0, 40.0, 60.0]) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn format_label_line_uses_fixed_precision() {
        assert_eq!(
            format_label_line(0, [0.25, 0.2, 0.3, 0.2], 2),
            "0 0.25 0.20 0.30 0.20"
        );
        assert_eq!(
            format_label_line(3, [0.5, 0.5, 1.0, 1.0], 6),
            "3 0.500000 0.500000 1.000000 1.000000"
        );
    }

    #[test]
    fn class_map_prefers_data_yaml_over_classes_txt() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(temp.path().join("labels")).unwrap();
        fs::write(temp.path().join(DATA_YAML), "names:\n  0: person\n  2: bicycle\n").unwrap();
        fs::write(temp.path().join("labels").join(CLASSES_TXT), "wrong\n").unwrap();

        let layout = discover_layout(temp.path(), &YoloReadOptions::default()).unwrap();
        let names = read_class_map(&layout).unwrap();
        assert_eq!(names, vec!["person", "class_1", "bicycle"]);
    }

    #[test]
    fn classes_txt_ignores_trailing_blank_lines_only() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join(CLASSES_TXT);

        fs::write(&path, "cat\ndog\n\n").unwrap();
        assert_eq!(read_classes_txt(&path).unwrap(), vec!["cat", "dog"]);

        fs::write(&path, "cat\n\ndog\n").unwrap();
        assert!(read_classes_txt(&path).is_err());
    }

    #[test]
    fn flat_labels_dir_with_sibling_images() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let labels = temp.path().join("yolo");
        fs::create_dir_all(&labels).unwrap();
        fs::write(labels.join(CLASSES_TXT), "cat\ndog\n").unwrap();
        fs::write(labels.join("a.txt"), "1 0.5 0.5 0.5 0.5\n").unwrap();

        let images = temp.path().join("pictures");
        write_png_header(&images.join("a.png"), 20, 10);

        let options = YoloReadOptions {
            images_dir: Some(images),
            ..Default::default()
        };
        let loaded = read_yolo(&labels, &options).expect("read yolo");

        assert!(loaded.failures.is_empty());
        assert_eq!(loaded.dataset.categories.len(), 2);
        assert_eq!(loaded.dataset.annotations.len(), 1);
        let bbox = loaded.dataset.annotations[0].bbox;
        assert!((bbox.xmin() - 5.0).abs() < 1e-9);
        assert!((bbox.ymax() - 7.5).abs() < 1e-9);
        assert_eq!(loaded.dataset.annotations[0].category_id, CategoryId(2));
    }

    #[test]
    fn missing_image_is_recorded_per_file() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(temp.path().join("labels")).unwrap();
        fs::write(temp.path().join(CLASSES_TXT), "cat\n").unwrap();
        fs::write(temp.path().join("labels/ok.txt"), "0 0.5 0.5 0.2 0.2\n").unwrap();
        fs::write(temp.path().join("labels/orphan.txt"), "0 0.5 0.5 0.2 0.2\n").unwrap();
        write_png_header(&temp.path().join("images/ok.png"), 10, 10);

        let loaded = read_yolo(temp.path(), &YoloReadOptions::default()).expect("read");

        assert_eq!(loaded.files_seen, 2);
        assert_eq!(loaded.failures.len(), 1);
        assert!(loaded.failures[0].path.ends_with("orphan.txt"));
        assert!(matches!(
            loaded.failures[0].error,
            AnnoconvError::MissingImageMetadata { .. }
        ));
        assert_eq!(loaded.dataset.images.len(), 1);
        assert_eq!(loaded.dataset.annotations.len(), 1);
    }

    #[test]
    fn out_of_range_class_aborts_only_that_file() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::create_dir_all(temp.path().join("labels")).unwrap();
        fs::write(temp.path().join(CLASSES_TXT), "cat\n").unwrap();
        fs::write(temp.path().join("labels/a.txt"), "0 0.5 0.5 0.2 0.2\n3 0.1 0.1 0.1 0.1\n").unwrap();
        write_png_header(&temp.path().join("images/a.png"), 10, 10);
        write_png_header(&temp.path().join("images/b.png"), 10, 10);

        let loaded = read_yolo(temp.path(), &YoloReadOptions::default()).expect("read");

        assert_eq!(loaded.failures.len(), 1);
        assert!(loaded.failures[0].error.to_string().contains("out of range"));
        // The failed label takes a.png with it; only b.png remains.
        assert_eq!(loaded.dataset.images.len(), 1);
        assert_eq!(loaded.dataset.images[0].file_name, "b.png");
        assert!(loaded.dataset.annotations.is_empty());
    }

    #[test]
    fn write_creates_labels_and_class_files() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let dataset = Dataset {
            images: vec![
                Image::new(1u64, "a.jpg", 100, 200),
                Image::new(2u64, "train/empty.jpg", 8, 8),
            ],
            categories: vec![Category::new(7u64, "z-last"), Category::new(3u64, "a-first")],
            annotations: vec![Annotation::new(
                1u64,
                1u64,
                7u64,
                BBoxXYXY::from_xywh(10.0, 20.0, 30.0, 40.0),
            )],
            ..Default::default()
        };

        let written = write_yolo_dir(temp.path(), &dataset, &YoloWriteOptions::default()).unwrap();
        assert_eq!(written, 2);

        let label = fs::read_to_string(temp.path().join("labels/a.txt")).unwrap();
        assert_eq!(label, "1 0.250000 0.200000 0.300000 0.200000\n");
        assert!(fs::read_to_string(temp.path().join("labels/train/empty.txt"))
            .unwrap()
            .is_empty());

        let classes = fs::read_to_string(temp.path().join(CLASSES_TXT)).unwrap();
        assert_eq!(classes, "a-first\nz-last\n");
        let yaml = fs::read_to_string(temp.path().join(DATA_YAML)).unwrap();
        assert!(yaml.contains("1: 'z-last'"));
    }

    #[test]
    fn write_rejects_zero_sized_images_before_writing() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let out = temp.path().join("out");
        let dataset = Dataset {
            images: vec![Image::new(1u64, "a.jpg", 0, 10)],
            ..Default::default()
        };

        let err = write_yolo_dir(&out, &dataset, &YoloWriteOptions::default()).unwrap_err();
        assert!(matches!(err, AnnoconvError::MissingImageMetadata { .. }));
        assert!(!out.exists());
    }
}
