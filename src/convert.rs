use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use ndarray::ArrayD;
use serde::Serialize;

use crate::domain::{FITS_EXT, NPY_EXT, strip_extension};
use crate::error::AstroError;
use crate::fits::decode_fits;
use crate::layout::{OutputLayout, ensure_dir, scan_dir, write_bytes_atomic};
use crate::npy::encode_npy;
use crate::output::{ProgressEvent, ProgressSink, iso_timestamp};

/// Result of decoding one FITS file.
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    Converted(ArrayD<f64>),
    DecodeFailed(String),
}

/// Partition of the input files by conversion outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionManifest {
    pub good: Vec<String>,
    pub error: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionSummary {
    pub good: usize,
    pub error: usize,
    pub output_dir: String,
    pub good_manifest: Option<String>,
    pub error_manifest: Option<String>,
    pub finished_at: String,
}

/// Reads and decodes one file. I/O and format failures both become `DecodeFailed`.
pub fn decode_file(path: &Utf8Path) -> ConversionOutcome {
    let bytes = match fs::read(path.as_std_path()) {
        Ok(bytes) => bytes,
        Err(err) => return ConversionOutcome::DecodeFailed(format!("read failed: {err}")),
    };
    match decode_fits(&bytes) {
        Ok(array) => ConversionOutcome::Converted(array),
        Err(err) => ConversionOutcome::DecodeFailed(err.to_string()),
    }
}

/// Converts every `.fits` file of `input_dir` into `<layout>/npy_files/<stem>.npy`.
///
/// Each file is visited once, in name order. Decode failures are recorded in the manifest
/// and never produce output; filesystem failures while writing abort the run. Files whose
/// names are not valid UTF-8 are listed as errors under their lossy name.
pub fn convert_directory(
    input_dir: &Utf8Path,
    layout: &OutputLayout,
    sink: &dyn ProgressSink,
) -> Result<ConversionManifest, AstroError> {
    let listing = scan_dir(input_dir)?;
    let unreadable_names: Vec<String> = listing
        .non_utf8
        .into_iter()
        .filter(|name| name.ends_with(&format!(".{FITS_EXT}")))
        .collect();
    let inputs: Vec<(Utf8PathBuf, String)> = listing
        .files
        .into_iter()
        .filter_map(|path| {
            let stem = path
                .file_name()
                .and_then(|name| strip_extension(name, FITS_EXT))?
                .to_string();
            Some((path, stem))
        })
        .collect();

    let npy_dir = layout.npy_dir();
    ensure_dir(&npy_dir)?;
    sink.event(ProgressEvent::new(format!(
        "phase=Convert; {} .fits files",
        inputs.len() + unreadable_names.len()
    )));

    let mut manifest = ConversionManifest::default();
    for name in unreadable_names {
        tracing::warn!(file = %name, "file name is not valid utf-8");
        manifest.error.push(name);
    }
    for (path, stem) in inputs {
        let file_name = path.file_name().unwrap_or_default().to_string();
        match decode_file(&path) {
            ConversionOutcome::Converted(array) => {
                let destination = npy_dir.join(format!("{stem}.{NPY_EXT}"));
                write_bytes_atomic(&destination, &encode_npy(&array))?;
                tracing::debug!(file = %file_name, shape = ?array.shape(), "converted");
                manifest.good.push(file_name);
            }
            ConversionOutcome::DecodeFailed(reason) => {
                tracing::warn!(file = %file_name, %reason, "conversion failed");
                manifest.error.push(file_name);
            }
        }
    }

    tracing::info!(
        good = manifest.good.len(),
        error = manifest.error.len(),
        "conversion complete"
    );
    Ok(manifest)
}

/// Writes `good_files.txt` and `error_files.txt`. An empty list is not written; the
/// returned path is `None` in that case.
pub fn write_manifests(
    manifest: &ConversionManifest,
    layout: &OutputLayout,
) -> Result<(Option<Utf8PathBuf>, Option<Utf8PathBuf>), AstroError> {
    let good = if manifest.good.is_empty() {
        tracing::error!("no file converted, skipping good file manifest");
        None
    } else {
        let path = layout.good_manifest_path();
        write_lines(&path, &manifest.good)?;
        Some(path)
    };

    let error = if manifest.error.is_empty() {
        tracing::info!("no conversion errors, skipping error file manifest");
        None
    } else {
        let path = layout.error_manifest_path();
        write_lines(&path, &manifest.error)?;
        Some(path)
    };

    Ok((good, error))
}

pub fn summarize(
    manifest: &ConversionManifest,
    layout: &OutputLayout,
    written: &(Option<Utf8PathBuf>, Option<Utf8PathBuf>),
) -> ConversionSummary {
    ConversionSummary {
        good: manifest.good.len(),
        error: manifest.error.len(),
        output_dir: layout.npy_dir().to_string(),
        good_manifest: written.0.as_ref().map(|path| path.to_string()),
        error_manifest: written.1.as_ref().map(|path| path.to_string()),
        finished_at: iso_timestamp(),
    }
}

fn write_lines(path: &Utf8Path, lines: &[String]) -> Result<(), AstroError> {
    let mut content = lines.join("\n");
    content.push('\n');
    write_bytes_atomic(path, content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifests_are_not_written() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let layout = OutputLayout::new(root);

        let manifest = ConversionManifest {
            good: vec!["a.fits".to_string()],
            error: Vec::new(),
        };
        let (good, error) = write_manifests(&manifest, &layout).unwrap();
        assert!(error.is_none());
        assert!(!layout.error_manifest_path().exists());
        let good = good.unwrap();
        assert_eq!(fs::read_to_string(good).unwrap(), "a.fits\n");
    }

    #[test]
    fn unreadable_file_is_a_decode_failure() {
        let outcome = decode_file(Utf8Path::new("/nonexistent/dir/x.fits"));
        assert!(matches!(outcome, ConversionOutcome::DecodeFailed(_)));
    }
}
