//! Pascal VOC XML reader and writer.
//!
//! VOC stores one XML file per image. The reader accepts a single `.xml`
//! file, a directory of XML files, or a dataset root containing
//! `Annotations/`. The writer emits one `<stem>.xml` per image directly
//! under the output directory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::Node;
use walkdir::WalkDir;

use super::model::{Annotation, Dataset, Image};
use super::{
    image_output_paths, AnnotationId, BBoxXYXY, CategoryId, CategoryTable, ImageId,
    LoadedDataset, Pixel,
};
use crate::error::AnnoconvError;

const VOC_XML_EXTENSION: &str = "xml";
const DEFAULT_DEPTH: u32 = 3;
const OBJECT_FLAGS: [&str; 3] = ["truncated", "difficult", "occluded"];

/// Reader settings.
#[derive(Clone, Debug, Default)]
pub struct VocReadOptions {
    /// Fixes category order (ids 1..=n). Names missing from the list are
    /// appended after it.
    pub class_names: Option<Vec<String>>,
}

/// Reads VOC annotations into IR.
///
/// Each XML file is parsed independently; a file that violates the schema
/// is recorded in [`LoadedDataset::failures`] and skipped. Without a class
/// list, category ids follow the alphabetical order of the names seen.
pub fn read_voc(path: &Path, options: &VocReadOptions) -> Result<LoadedDataset, AnnoconvError> {
    let xml_files = discover_xml_files(path)?;

    let mut loaded = LoadedDataset {
        files_seen: xml_files.len(),
        ..Default::default()
    };

    let mut parsed_files = Vec::with_capacity(xml_files.len());
    let mut seen_filenames = BTreeSet::new();
    for xml_path in xml_files {
        log::debug!("reading {}", xml_path.display());
        let parsed = match parse_voc_xml(&xml_path) {
            Ok(parsed) => parsed,
            Err(error) => {
                loaded.absorb(xml_path, error)?;
                continue;
            }
        };

        if !seen_filenames.insert(parsed.filename.clone()) {
            let error = AnnoconvError::malformed(
                &xml_path,
                format!(
                    "duplicate <filename> '{}' already declared by another XML file",
                    parsed.filename
                ),
            );
            loaded.absorb(xml_path, error)?;
            continue;
        }

        parsed_files.push(parsed);
    }

    let table = build_category_table(&parsed_files, options, path)?;
    loaded.dataset = assemble_dataset(parsed_files, table, path)?;
    Ok(loaded)
}

fn assemble_dataset(
    parsed_files: Vec<ParsedVocAnnotation>,
    table: CategoryTable,
    path: &Path,
) -> Result<Dataset, AnnoconvError> {
    let mut dataset = Dataset::default();
    let mut next_annotation_id: u64 = 1;

    for (index, parsed) in parsed_files.into_iter().enumerate() {
        let image_id = ImageId::new((index + 1) as u64);
        let mut image = Image::new(image_id, parsed.filename, parsed.width, parsed.height);
        image.depth = parsed.depth;
        dataset.images.push(image);

        for object in parsed.objects {
            let category_id: CategoryId = table.id_of(&object.name).ok_or_else(|| {
                AnnoconvError::malformed(
                    path,
                    format!("category '{}' missing from table", object.name),
                )
            })?;

            let mut annotation = Annotation::new(
                AnnotationId::new(next_annotation_id),
                image_id,
                category_id,
                BBoxXYXY::<Pixel>::from_xyxy(object.xmin, object.ymin, object.xmax, object.ymax),
            );
            annotation.attributes = object.attrs;
            dataset.annotations.push(annotation);
            next_annotation_id += 1;
        }
    }

    dataset.categories = table.into_categories();
    Ok(dataset)
}

fn build_category_table(
    parsed_files: &[ParsedVocAnnotation],
    options: &VocReadOptions,
    path: &Path,
) -> Result<CategoryTable, AnnoconvError> {
    let mut table = match &options.class_names {
        Some(names) => CategoryTable::from_names(names.iter().cloned())
            .map_err(|conflict| AnnoconvError::malformed(path, conflict.to_string()))?,
        None => CategoryTable::new(),
    };

    let names: BTreeSet<&str> = parsed_files
        .iter()
        .flat_map(|parsed| parsed.objects.iter().map(|object| object.name.as_str()))
        .collect();

    for name in names {
        if options.class_names.is_some() && table.id_of(name).is_none() {
            log::warn!("category '{name}' is not in the class list; appending it");
        }
        table.intern(name);
    }

    Ok(table)
}

/// Writes one VOC XML file per image under `path`.
///
/// Images without annotations still get a file. Returns the number of files
/// written.
pub fn write_voc_dir(path: &Path, dataset: &Dataset) -> Result<usize, AnnoconvError> {
    let table = CategoryTable::from_categories(&dataset.categories)
        .map_err(|conflict| AnnoconvError::malformed(path, conflict.to_string()))?;

    let mut annotations_by_image: BTreeMap<ImageId, Vec<&Annotation>> = BTreeMap::new();
    for annotation in &dataset.annotations {
        annotations_by_image
            .entry(annotation.image_id)
            .or_default()
            .push(annotation);
    }

    let mut images_sorted: Vec<&Image> = dataset.images.iter().collect();
    images_sorted.sort_by(|left, right| left.file_name.cmp(&right.file_name));
    let xml_paths = image_output_paths(images_sorted.iter().copied(), VOC_XML_EXTENSION)?;

    fs::create_dir_all(path)?;

    for (image, xml_rel) in images_sorted.iter().zip(&xml_paths) {
        let xml_path = path.join(xml_rel);
        if let Some(parent) = xml_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut annotations = annotations_by_image.remove(&image.id).unwrap_or_default();
        annotations.sort_by_key(|annotation| annotation.id);

        let xml = render_voc_xml(image, &annotations, &table, path)?;
        fs::write(&xml_path, xml)?;
    }

    Ok(images_sorted.len())
}

/// Parses one VOC document held in memory.
pub fn from_voc_xml_str(xml: &str) -> Result<Dataset, AnnoconvError> {
    let path = Path::new("<memory>");
    let parsed = vec![parse_voc_xml_str(xml, path)?];
    let table = build_category_table(&parsed, &VocReadOptions::default(), path)?;
    assemble_dataset(parsed, table, path)
}

#[derive(Debug)]
struct ParsedVocAnnotation {
    filename: String,
    width: u32,
    height: u32,
    depth: Option<u32>,
    objects: Vec<ParsedVocObject>,
}

#[derive(Debug)]
struct ParsedVocObject {
    name: String,
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
    attrs: BTreeMap<String, String>,
}

fn discover_xml_files(input: &Path) -> Result<Vec<PathBuf>, AnnoconvError> {
    if input.is_file() {
        if !has_xml_extension(input) {
            return Err(AnnoconvError::malformed(input, "expected an .xml file"));
        }
        return Ok(vec![input.to_path_buf()]);
    }

    if !input.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("VOC input '{}' does not exist", input.display()),
        )
        .into());
    }

    let dir = if input.join("Annotations").is_dir() {
        input.join("Annotations")
    } else {
        input.to_path_buf()
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && has_xml_extension(&path) {
            files.push(path);
        }
    }
    files.sort_by_cached_key(|path| rel_string(&dir, path));

    let nested = WalkDir::new(&dir)
        .follow_links(true)
        .min_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && has_xml_extension(entry.path()))
        .count();
    if nested > 0 {
        log::warn!(
            "VOC reader scans {} flat; skipping {} nested .xml file(s)",
            dir.display(),
            nested
        );
    }

    Ok(files)
}

fn parse_voc_xml(path: &Path) -> Result<ParsedVocAnnotation, AnnoconvError> {
    let xml = fs::read_to_string(path)?;
    parse_voc_xml_str(&xml, path)
}

fn parse_voc_xml_str(xml: &str, path: &Path) -> Result<ParsedVocAnnotation, AnnoconvError> {
    let document = roxmltree::Document::parse(xml)
        .map_err(|source| AnnoconvError::malformed(path, source.to_string()))?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(AnnoconvError::malformed(
            path,
            "missing <annotation> root element",
        ));
    }

    let filename = required_child_text(annotation, "filename", path, "<annotation>")?;

    let size = required_child_element(annotation, "size", path, "<annotation>")?;
    let width = parse_required::<u32>(size, "width", path, "<size>")?;
    let height = parse_required::<u32>(size, "height", path, "<size>")?;
    let depth = optional_child_text(size, "depth")
        .map(|raw| {
            raw.parse::<u32>().map_err(|_| {
                AnnoconvError::malformed(path, format!("invalid <depth> value '{raw}' in <size>"))
            })
        })
        .transpose()?;

    let mut objects = Vec::new();
    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let name = required_child_text(object, "name", path, "<object>")?;
        let bndbox = required_child_element(object, "bndbox", path, "<object>")?;

        let mut attrs = BTreeMap::new();
        for key in std::iter::once("pose").chain(OBJECT_FLAGS) {
            if let Some(value) = optional_child_text(object, key) {
                attrs.insert(key.to_string(), value);
            }
        }

        objects.push(ParsedVocObject {
            name,
            xmin: parse_required::<f64>(bndbox, "xmin", path, "<bndbox>")?,
            ymin: parse_required::<f64>(bndbox, "ymin", path, "<bndbox>")?,
            xmax: parse_required::<f64>(bndbox, "xmax", path, "<bndbox>")?,
            ymax: parse_required::<f64>(bndbox, "ymax", path, "<bndbox>")?,
            attrs,
        });
    }

    Ok(ParsedVocAnnotation {
        filename,
        width,
        height,
        depth,
        objects,
    })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>, AnnoconvError> {
    child_element(node, tag)
        .ok_or_else(|| AnnoconvError::malformed(path, format!("missing <{tag}> in {context}")))
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String, AnnoconvError> {
    optional_child_text(node, tag)
        .ok_or_else(|| AnnoconvError::malformed(path, format!("missing <{tag}> in {context}")))
}

fn parse_required<T: std::str::FromStr>(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<T, AnnoconvError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<T>().map_err(|_| {
        AnnoconvError::malformed(
            path,
            format!(
                "invalid <{tag}> value '{raw}' in {context}; expected {}",
                std::any::type_name::<T>()
            ),
        )
    })
}

fn render_voc_xml(
    image: &Image,
    annotations: &[&Annotation],
    table: &CategoryTable,
    output_root: &Path,
) -> Result<String, AnnoconvError> {
    let folder = Path::new(&image.file_name)
        .parent()
        .and_then(|parent| parent.to_str())
        .filter(|parent| !parent.is_empty())
        .unwrap_or("images");
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<annotation>\n");
    xml.push_str(&format!("  <folder>{}</folder>\n", xml_escape(folder)));
    xml.push_str(&format!("  <filename>{}</filename>\n", xml_escape(&image.file_name)));
    xml.push_str("  <source>\n");
    xml.push_str("    <database>The VOC Database</database>\n");
    xml.push_str("    <annotation>PASCAL VOC</annotation>\n");
    xml.push_str("    <image>flickr</image>\n");
    xml.push_str("  </source>\n");
    xml.push_str("  <size>\n");
    xml.push_str(&format!("    <width>{}</width>\n", image.width));
    xml.push_str(&format!("    <height>{}</height>\n", image.height));
    xml.push_str(&format!(
        "    <depth>{}</depth>\n",
        image.depth.unwrap_or(DEFAULT_DEPTH)
    ));
    xml.push_str("  </size>\n");
    xml.push_str("  <segmented>0</segmented>\n");

    for annotation in annotations {
        let name = table.name_of(annotation.category_id).ok_or_else(|| {
            AnnoconvError::malformed(
                output_root,
                format!(
                    "annotation {} references missing category {}",
                    annotation.id, annotation.category_id
                ),
            )
        })?;

        let pose = annotation
            .attributes
            .get("pose")
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or("Unspecified");

        xml.push_str("  <object>\n");
        xml.push_str(&format!("    <name>{}</name>\n", xml_escape(name)));
        xml.push_str(&format!("    <pose>{}</pose>\n", xml_escape(pose)));
        for key in OBJECT_FLAGS {
            let value = annotation
                .attributes
                .get(key)
                .and_then(|raw| normalize_bool_attr(raw));
            match (key, value) {
                (_, Some(value)) => xml.push_str(&format!("    <{key}>{value}</{key}>\n")),
                ("occluded", None) => {}
                (_, None) => xml.push_str(&format!("    <{key}>0</{key}>\n")),
            }
        }
        xml.push_str("    <bndbox>\n");
        xml.push_str(&format!("      <xmin>{}</xmin>\n", annotation.bbox.xmin()));
        xml.push_str(&format!("      <ymin>{}</ymin>\n", annotation.bbox.ymin()));
        xml.push_str(&format!("      <xmax>{}</xmax>\n", annotation.bbox.xmax()));
        xml.push_str(&format!("      <ymax>{}</ymax>\n", annotation.bbox.ymax()));
        xml.push_str("    </bndbox>\n");
        xml.push_str("  </object>\n");
    }

    xml.push_str("</annotation>\n");
    Ok(xml)
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn normalize_bool_attr(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some("1"),
        "false" | "no" | "0" => Some("0"),
        _ => None,
    }
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(VOC_XML_EXTENSION))
        .unwrap_or(false)
}

fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}
