use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use serde::Serialize;
use zip::ZipArchive;

use crate::domain::{FITS_EXT, FileKind, GZIP_EXT, strip_extension};
use crate::error::AstroError;
use crate::layout::{ensure_dir, list_files};
use crate::output::{ProgressEvent, ProgressSink, iso_timestamp};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractSummary {
    pub gunzipped: usize,
    pub unzipped: usize,
    pub copied: usize,
    pub skipped: usize,
    pub target_dir: String,
    pub finished_at: String,
}

impl ExtractSummary {
    pub fn written(&self) -> usize {
        self.gunzipped + self.unzipped + self.copied
    }
}

/// Consolidates `.fits` payloads from `source_dir` into `target_dir`.
///
/// `.gz` files are inflated in memory, `.zip` bundles are flattened, and `.fits` files are
/// copied as-is. Only `.fits` names ever reach the target; a name written twice keeps the
/// last write.
pub fn normalize_archives(
    source_dir: &Utf8Path,
    target_dir: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<ExtractSummary, AstroError> {
    let files = list_files(source_dir)?;
    ensure_dir(target_dir)?;

    let mut summary = ExtractSummary {
        target_dir: target_dir.to_string(),
        ..ExtractSummary::default()
    };

    let by_kind = |kind: FileKind| {
        files
            .iter()
            .filter(move |path| {
                path.file_name()
                    .and_then(FileKind::from_name)
                    .is_some_and(|found| found == kind)
            })
            .collect::<Vec<_>>()
    };

    let gz_files = by_kind(FileKind::Gzip);
    sink.event(ProgressEvent::new(format!(
        "phase=Extract; {} .gz files",
        gz_files.len()
    )));
    for path in gz_files {
        if gunzip_fits(path, target_dir)?.is_some() {
            summary.gunzipped += 1;
        } else {
            summary.skipped += 1;
        }
    }

    let zip_files = by_kind(FileKind::Zip);
    sink.event(ProgressEvent::new(format!(
        "phase=Extract; {} .zip files",
        zip_files.len()
    )));
    for path in zip_files {
        let (written, skipped) = unzip_fits(path, target_dir)?;
        summary.unzipped += written.len();
        summary.skipped += skipped;
    }

    let fits_files = by_kind(FileKind::Fits);
    sink.event(ProgressEvent::new(format!(
        "phase=Copy; {} .fits files",
        fits_files.len()
    )));
    for path in fits_files {
        copy_into(path, target_dir)?;
        summary.copied += 1;
    }

    summary.finished_at = iso_timestamp();
    tracing::info!(
        gunzipped = summary.gunzipped,
        unzipped = summary.unzipped,
        copied = summary.copied,
        skipped = summary.skipped,
        "archive normalization complete"
    );
    Ok(summary)
}

/// Inflates one `.gz` file into `target_dir` under its archive-stripped name. Returns `None`
/// when the inner name is not a `.fits` file.
pub fn gunzip_fits(
    archive: &Utf8Path,
    target_dir: &Utf8Path,
) -> Result<Option<Utf8PathBuf>, AstroError> {
    let file_name = archive
        .file_name()
        .ok_or_else(|| AstroError::Filesystem(format!("invalid archive path {archive}")))?;
    let Some(inner) = strip_extension(file_name, GZIP_EXT) else {
        return Ok(None);
    };
    if strip_extension(inner, FITS_EXT).is_none() {
        tracing::debug!(archive = %archive, "dropping non-fits payload");
        return Ok(None);
    }

    let file = fs::File::open(archive.as_std_path())
        .map_err(|err| AstroError::Filesystem(format!("open {archive}: {err}")))?;
    let mut decoder = GzDecoder::new(file);
    let mut payload = Vec::new();
    decoder
        .read_to_end(&mut payload)
        .map_err(|err| AstroError::Filesystem(format!("gunzip {archive}: {err}")))?;

    let destination = target_dir.join(inner);
    fs::write(destination.as_std_path(), &payload)
        .map_err(|err| AstroError::Filesystem(format!("write {destination}: {err}")))?;
    tracing::debug!(archive = %archive, path = %destination, "extracted");
    Ok(Some(destination))
}

/// Writes every `.fits` entry of a zip bundle into `target_dir` under its base name.
/// Returns the written paths and the number of entries skipped.
pub fn unzip_fits(
    archive: &Utf8Path,
    target_dir: &Utf8Path,
) -> Result<(Vec<Utf8PathBuf>, usize), AstroError> {
    let file = fs::File::open(archive.as_std_path())
        .map_err(|err| AstroError::Filesystem(format!("open zip {archive}: {err}")))?;
    let mut bundle =
        ZipArchive::new(file).map_err(|err| AstroError::Filesystem(format!("{archive}: {err}")))?;

    let mut written = Vec::new();
    let mut skipped = 0;
    for i in 0..bundle.len() {
        let mut entry = bundle
            .by_index(i)
            .map_err(|err| AstroError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let base_name = entry
            .enclosed_name()
            .and_then(|path| path.file_name().map(|name| name.to_os_string()))
            .and_then(|name| name.into_string().ok());
        let Some(base_name) = base_name else {
            tracing::warn!(archive = %archive, entry = entry.name(), "skipping unsafe zip entry");
            skipped += 1;
            continue;
        };
        if strip_extension(&base_name, FITS_EXT).is_none() {
            skipped += 1;
            continue;
        }

        let destination = target_dir.join(&base_name);
        let mut outfile = fs::File::create(destination.as_std_path())
            .map_err(|err| AstroError::Filesystem(format!("create {destination}: {err}")))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| AstroError::Filesystem(format!("unzip {archive}: {err}")))?;
        written.push(destination);
    }
    Ok((written, skipped))
}

fn copy_into(path: &Utf8Path, target_dir: &Utf8Path) -> Result<Utf8PathBuf, AstroError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| AstroError::Filesystem(format!("invalid file path {path}")))?;
    let destination = target_dir.join(file_name);
    fs::copy(path.as_std_path(), destination.as_std_path())
        .map_err(|err| AstroError::Filesystem(format!("copy {path}: {err}")))?;
    Ok(destination)
}
