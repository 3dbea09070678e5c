use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::SourceTag;
use crate::error::AstroError;

pub const DOWNLOADS_DIR: &str = "downloads";
pub const NPY_DIR: &str = "npy_files";
pub const CATALOG_TABLE_FILE: &str = "df_main.csv";
pub const DOWNLOAD_TABLE_FILE: &str = "df_url.csv";
pub const GOOD_MANIFEST_FILE: &str = "good_files.txt";
pub const ERROR_MANIFEST_FILE: &str = "error_files.txt";

/// Paths under one output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn downloads_dir(&self) -> Utf8PathBuf {
        self.root.join(DOWNLOADS_DIR)
    }

    pub fn npy_dir(&self) -> Utf8PathBuf {
        self.root.join(NPY_DIR)
    }

    pub fn source_dir(&self, tag: SourceTag) -> Utf8PathBuf {
        self.root.join(tag.as_str())
    }

    pub fn catalog_table_path(&self) -> Utf8PathBuf {
        self.root.join(CATALOG_TABLE_FILE)
    }

    pub fn download_table_path(&self) -> Utf8PathBuf {
        self.root.join(DOWNLOAD_TABLE_FILE)
    }

    pub fn good_manifest_path(&self) -> Utf8PathBuf {
        self.root.join(GOOD_MANIFEST_FILE)
    }

    pub fn error_manifest_path(&self) -> Utf8PathBuf {
        self.root.join(ERROR_MANIFEST_FILE)
    }

    pub fn ensure_root(&self) -> Result<(), AstroError> {
        ensure_dir(&self.root)
    }

    /// Copies the configuration document used for this run into the output root.
    pub fn copy_config(&self, config_path: &Path) -> Result<Utf8PathBuf, AstroError> {
        let file_name = config_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AstroError::Filesystem(format!("invalid config path {}", config_path.display()))
            })?;
        let dest = self.root.join(file_name);
        self.ensure_root()?;
        let same_file = match (fs::canonicalize(config_path), fs::canonicalize(&dest)) {
            (Ok(src), Ok(dst)) => src == dst,
            _ => false,
        };
        if !same_file {
            fs::copy(config_path, dest.as_std_path())
                .map_err(|err| AstroError::Filesystem(err.to_string()))?;
        }
        Ok(dest)
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), AstroError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| AstroError::Filesystem(format!("create {path}: {err}")))
}

/// Writes through a sibling temp file so readers never observe a truncated file.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), AstroError> {
    let parent = path
        .parent()
        .ok_or_else(|| AstroError::Filesystem(format!("invalid destination path {path}")))?;
    ensure_dir(parent)?;
    let temp = tempfile::Builder::new()
        .prefix(".astro-write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| AstroError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| AstroError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| AstroError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Regular files of one directory, split by whether their names are valid UTF-8.
#[derive(Debug, Clone, Default)]
pub struct FileListing {
    /// Sorted by file name.
    pub files: Vec<Utf8PathBuf>,
    /// Lossy renderings of names that are not valid UTF-8.
    pub non_utf8: Vec<String>,
}

pub fn scan_dir(dir: &Utf8Path) -> Result<FileListing, AstroError> {
    if !dir.as_std_path().is_dir() {
        return Err(AstroError::MissingDirectory(dir.as_std_path().to_path_buf()));
    }
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| AstroError::Filesystem(format!("read {dir}: {err}")))?;
    let mut listing = FileListing::default();
    for entry in entries {
        let entry = entry.map_err(|err| AstroError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => listing.files.push(path),
            Err(_) => listing
                .non_utf8
                .push(entry.file_name().to_string_lossy().into_owned()),
        }
    }
    listing.files.sort();
    listing.non_utf8.sort();
    Ok(listing)
}

/// Regular files directly inside `dir`, sorted by file name. Names that are not valid UTF-8
/// are skipped with a warning.
pub fn list_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, AstroError> {
    let listing = scan_dir(dir)?;
    for name in &listing.non_utf8 {
        tracing::warn!(name = %name, "skipping non-utf8 file name");
    }
    Ok(listing.files)
}
