use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use camino::Utf8Path;
use flate2::Compression;
use flate2::write::GzEncoder;
use zip::write::SimpleFileOptions;

use astro_dataset_builder::archive::normalize_archives;
use astro_dataset_builder::error::AstroError;
use astro_dataset_builder::output::JsonOutput;

mod common;

fn write_gz(path: &Utf8Path, payload: &[u8]) {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn write_zip(path: &Utf8Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, payload) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(payload.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

fn names_in(dir: &Utf8Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[test]
fn consolidates_gz_zip_and_plain_fits() {
    let (_temp, root) = common::utf8_temp();
    let source = root.join("downloads");
    let target = root.join("tmp");
    fs::create_dir_all(&source).unwrap();

    write_gz(&source.join("J0001_cutout.fits.gz"), b"first");
    write_zip(
        &source.join("bundle.zip"),
        &[
            ("nested/J0002.fits", "second"),
            ("J0003.fits", "third"),
            ("README.txt", "ignore me"),
        ],
    );
    fs::write(source.join("J0004.fits"), b"fourth").unwrap();
    fs::write(source.join("notes.csv"), b"a,b").unwrap();

    let summary = normalize_archives(&source, &target, &JsonOutput).unwrap();

    assert_eq!(summary.gunzipped, 1);
    assert_eq!(summary.unzipped, 2);
    assert_eq!(summary.copied, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        names_in(&target),
        vec!["J0001_cutout.fits", "J0002.fits", "J0003.fits", "J0004.fits"]
    );
    assert_eq!(fs::read(target.join("J0001_cutout.fits")).unwrap(), b"first");
    assert_eq!(fs::read(target.join("J0002.fits")).unwrap(), b"second");
}

#[test]
fn target_only_receives_fits_names() {
    let (_temp, root) = common::utf8_temp();
    let source = root.join("downloads");
    let target = root.join("tmp");
    fs::create_dir_all(&source).unwrap();

    write_gz(&source.join("catalog.csv.gz"), b"a,b");
    write_gz(&source.join("image.fits.gz"), b"pixels");
    write_zip(&source.join("extra.zip"), &[("preview.png", "png")]);

    normalize_archives(&source, &target, &JsonOutput).unwrap();

    for name in names_in(&target) {
        assert!(name.ends_with(".fits"), "unexpected file {name}");
    }
    assert_eq!(names_in(&target), vec!["image.fits"]);
}

#[test]
fn source_files_are_left_in_place() {
    let (_temp, root) = common::utf8_temp();
    let source = root.join("downloads");
    fs::create_dir_all(&source).unwrap();
    write_gz(&source.join("a.fits.gz"), b"a");

    normalize_archives(&source, &root.join("tmp"), &JsonOutput).unwrap();
    assert!(source.join("a.fits.gz").exists());
}

#[test]
fn corrupt_gzip_fails() {
    let (_temp, root) = common::utf8_temp();
    let source = root.join("downloads");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("broken.fits.gz"), b"not gzip at all").unwrap();

    let err = normalize_archives(&source, &root.join("tmp"), &JsonOutput).unwrap_err();
    assert_matches!(err, AstroError::Filesystem(_));
}
