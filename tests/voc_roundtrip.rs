//! Integration tests for Pascal VOC format support.

use std::fs;
use std::path::Path;

use annoconv::ir::io_voc_xml::{read_voc, write_voc_dir, VocReadOptions};
use annoconv::ir::{Annotation, BBoxXYXY, Category, Dataset, Image, LoadedDataset};
use annoconv::AnnoconvError;

fn create_sample_voc_dataset(root: &Path) {
    fs::create_dir_all(root.join("Annotations")).expect("create annotations dir");

    let xml_a = r#"<?xml version="1.0" encoding="utf-8"?>
<annotation>
  <filename>img_b.jpg</filename>
  <size>
    <width>120</width>
    <height>80</height>
    <depth>1</depth>
  </size>
  <object>
    <name>dog</name>
    <truncated>yes</truncated>
    <bndbox>
      <xmin>10</xmin>
      <ymin>12</ymin>
      <xmax>60</xmax>
      <ymax>70</ymax>
    </bndbox>
  </object>
</annotation>
"#;

    let xml_b = r#"<?xml version="1.0" encoding="utf-8"?>
<annotation>
  <filename>img_a.jpg</filename>
  <size>
    <width>100</width>
    <height>50</height>
    <depth>3</depth>
  </size>
  <object>
    <name>cat</name>
    <pose>Sitting</pose>
    <difficult>0</difficult>
    <bndbox>
      <xmin>1</xmin>
      <ymin>2</ymin>
      <xmax>30</xmax>
      <ymax>40</ymax>
    </bndbox>
  </object>
  <object>
    <name>dog</name>
    <occluded>1</occluded>
    <bndbox>
      <xmin>31</xmin>
      <ymin>4</ymin>
      <xmax>80</xmax>
      <ymax>45</ymax>
    </bndbox>
  </object>
</annotation>
"#;

    let xml_c = r#"<?xml version="1.0" encoding="utf-8"?>
<annotation>
  <filename>img_c.jpg</filename>
  <size>
    <width>64</width>
    <height>64</height>
    <depth>3</depth>
  </size>
</annotation>
"#;

    fs::write(root.join("Annotations/a.xml"), xml_a).expect("write a.xml");
    fs::write(root.join("Annotations/b.xml"), xml_b).expect("write b.xml");
    fs::write(root.join("Annotations/c.xml"), xml_c).expect("write c.xml");
}

fn read_clean(path: &Path) -> Dataset {
    let loaded = read_voc(path, &VocReadOptions::default()).expect("read voc dataset");
    assert!(loaded.failures.is_empty(), "{:?}", loaded.failures);
    loaded.dataset
}

#[test]
fn read_voc_assigns_deterministic_ids_and_preserves_fields() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_sample_voc_dataset(temp.path());

    let loaded = read_voc(temp.path(), &VocReadOptions::default()).expect("read voc dataset");
    assert_eq!(loaded.files_seen, 3);
    let dataset = loaded.dataset;

    assert_eq!(dataset.images.len(), 3);
    assert_eq!(dataset.categories.len(), 2);
    assert_eq!(dataset.annotations.len(), 3);

    // Images follow XML file order: a.xml, b.xml, c.xml.
    assert_eq!(dataset.images[0].file_name, "img_b.jpg");
    assert_eq!(dataset.images[0].id.as_u64(), 1);
    assert_eq!(dataset.images[0].depth, Some(1));
    assert_eq!(dataset.images[1].file_name, "img_a.jpg");
    assert_eq!(dataset.images[1].id.as_u64(), 2);
    assert_eq!(dataset.images[2].file_name, "img_c.jpg");
    assert_eq!(dataset.images[2].id.as_u64(), 3);

    assert_eq!(dataset.categories[0].name, "cat");
    assert_eq!(dataset.categories[0].id.as_u64(), 1);
    assert_eq!(dataset.categories[1].name, "dog");
    assert_eq!(dataset.categories[1].id.as_u64(), 2);

    assert_eq!(dataset.annotations[0].id.as_u64(), 1);
    assert_eq!(dataset.annotations[0].image_id.as_u64(), 1); // img_b.jpg
    assert_eq!(dataset.annotations[0].category_id.as_u64(), 2); // dog

    assert_eq!(dataset.annotations[1].id.as_u64(), 2);
    assert_eq!(dataset.annotations[1].image_id.as_u64(), 2); // img_a.jpg
    assert_eq!(dataset.annotations[1].category_id.as_u64(), 1); // cat
    assert_eq!(
        dataset.annotations[1].attributes.get("pose"),
        Some(&"Sitting".to_string())
    );

    // Coordinates are read as-is.
    let bbox = &dataset.annotations[1].bbox;
    assert!((bbox.xmin() - 1.0).abs() < 1e-9);
    assert!((bbox.ymin() - 2.0).abs() < 1e-9);
    assert!((bbox.xmax() - 30.0).abs() < 1e-9);
    assert!((bbox.ymax() - 40.0).abs() < 1e-9);
}

#[test]
fn voc_write_then_read_roundtrip_semantic() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let input_root = temp.path().join("input_voc");
    let output_root = temp.path().join("output_voc");

    create_sample_voc_dataset(&input_root);

    let input_dataset = read_clean(&input_root);
    let written = write_voc_dir(&output_root, &input_dataset).expect("write voc dataset");
    assert_eq!(written, 3);

    // One flat XML per image, named after the image.
    for name in ["img_a.xml", "img_b.xml", "img_c.xml"] {
        assert!(output_root.join(name).is_file(), "{name}");
    }

    let restored = read_clean(&output_root);

    assert_eq!(restored.images.len(), input_dataset.images.len());
    assert_eq!(restored.categories.len(), input_dataset.categories.len());
    assert_eq!(restored.annotations.len(), input_dataset.annotations.len());

    let boxes_by_file = |dataset: &Dataset| {
        let mut boxes: Vec<_> = dataset
            .annotations
            .iter()
            .map(|ann| {
                let image = dataset
                    .images
                    .iter()
                    .find(|img| img.id == ann.image_id)
                    .expect("annotation references an image");
                let category = dataset
                    .categories
                    .iter()
                    .find(|cat| cat.id == ann.category_id)
                    .expect("annotation references a category");
                (
                    image.file_name.clone(),
                    category.name.clone(),
                    ann.bbox.to_xyxy().map(|v| v.to_bits()),
                )
            })
            .collect();
        boxes.sort();
        boxes
    };

    assert_eq!(boxes_by_file(&input_dataset), boxes_by_file(&restored));
}

#[test]
fn write_voc_preserves_subdirectory_structure() {
    let temp = tempfile::tempdir().expect("create temp dir");

    let dataset = Dataset {
        images: vec![Image::new(1u64, "train/img1.jpg", 32, 32)],
        categories: vec![Category::new(1u64, "cat")],
        annotations: vec![Annotation::new(
            1u64,
            1u64,
            1u64,
            BBoxXYXY::from_xyxy(1.0, 2.0, 20.0, 25.0),
        )],
        ..Default::default()
    };

    write_voc_dir(temp.path(), &dataset).expect("write voc");

    let xml = fs::read_to_string(temp.path().join("train/img1.xml")).expect("read written xml");
    assert!(xml.contains("<filename>train/img1.jpg</filename>"));
}

#[test]
fn write_voc_normalizes_boolean_attributes() {
    let temp = tempfile::tempdir().expect("create temp dir");

    let mut annotation = Annotation::new(1u64, 1u64, 1u64, BBoxXYXY::from_xyxy(1.0, 2.0, 3.0, 4.0));
    annotation
        .attributes
        .insert("truncated".to_string(), "true".to_string());
    annotation
        .attributes
        .insert("difficult".to_string(), "no".to_string());
    annotation
        .attributes
        .insert("occluded".to_string(), "maybe".to_string());

    let dataset = Dataset {
        images: vec![Image::new(1u64, "img_bool.jpg", 10, 10)],
        categories: vec![Category::new(1u64, "cat")],
        annotations: vec![annotation],
        ..Default::default()
    };

    write_voc_dir(temp.path(), &dataset).expect("write voc");

    let xml = fs::read_to_string(temp.path().join("img_bool.xml")).expect("read written xml");
    assert!(xml.contains("<truncated>1</truncated>"));
    assert!(xml.contains("<difficult>0</difficult>"));
    assert!(!xml.contains("<occluded>"));
}

#[test]
fn read_voc_from_annotations_dir_succeeds() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_sample_voc_dataset(temp.path());

    let dataset = read_clean(&temp.path().join("Annotations"));
    assert_eq!(dataset.images.len(), 3);
    assert_eq!(dataset.annotations.len(), 3);
}

#[test]
fn read_voc_accepts_a_single_file() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_sample_voc_dataset(temp.path());

    let dataset = read_clean(&temp.path().join("Annotations/b.xml"));
    assert_eq!(dataset.images.len(), 1);
    assert_eq!(dataset.images[0].file_name, "img_a.jpg");
    assert_eq!(dataset.annotations.len(), 2);
}

#[test]
fn read_voc_skips_malformed_file_and_keeps_the_rest() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_sample_voc_dataset(temp.path());
    fs::write(
        temp.path().join("Annotations/broken.xml"),
        "<annotation><filename>x.jpg</filename><size><width>4</width></size></annotation>",
    )
    .expect("write broken xml");

    let LoadedDataset {
        dataset,
        files_seen,
        failures,
    } = read_voc(temp.path(), &VocReadOptions::default()).expect("read voc dataset");

    assert_eq!(files_seen, 4);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].path.ends_with("broken.xml"));
    assert!(matches!(
        failures[0].error,
        AnnoconvError::MalformedInput { .. }
    ));
    assert_eq!(dataset.images.len(), 3);
    assert_eq!(dataset.annotations.len(), 3);
}

#[test]
fn read_voc_rejects_duplicate_filename() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_sample_voc_dataset(temp.path());
    fs::copy(
        temp.path().join("Annotations/c.xml"),
        temp.path().join("Annotations/d.xml"),
    )
    .expect("copy xml");

    let loaded = read_voc(temp.path(), &VocReadOptions::default()).expect("read voc dataset");

    assert_eq!(loaded.failures.len(), 1);
    assert!(loaded.failures[0].path.ends_with("d.xml"));
    assert!(loaded.failures[0]
        .error
        .to_string()
        .contains("duplicate <filename> 'img_c.jpg'"));
    assert_eq!(loaded.dataset.images.len(), 3);
}

#[test]
fn read_voc_class_list_fixes_ids_and_appends_unlisted_names() {
    let temp = tempfile::tempdir().expect("create temp dir");
    create_sample_voc_dataset(temp.path());

    let options = VocReadOptions {
        class_names: Some(vec!["dog".to_string(), "bird".to_string()]),
    };
    let dataset = read_voc(temp.path(), &options)
        .expect("read voc dataset")
        .dataset;

    let names: Vec<_> = dataset
        .categories
        .iter()
        .map(|cat| (cat.id.as_u64(), cat.name.as_str()))
        .collect();
    assert_eq!(names, vec![(1, "dog"), (2, "bird"), (3, "cat")]);
}

#[test]
fn read_voc_missing_input_is_io_error() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let err = read_voc(&temp.path().join("absent"), &VocReadOptions::default()).unwrap_err();
    assert!(matches!(err, AnnoconvError::Io(_)), "{err:?}");
}
