use std::fmt;

use serde::{Deserialize, Serialize};

pub const FITS_EXT: &str = "fits";
pub const GZIP_EXT: &str = "gz";
pub const ZIP_EXT: &str = "zip";
pub const NPY_EXT: &str = "npy";

/// A single catalog cell. Cells holding anchors keep the cell text and the href of the
/// last anchor in the cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    Link { text: String, href: String },
}

impl CellValue {
    pub fn text(&self) -> &str {
        match self {
            CellValue::Text(text) => text,
            CellValue::Link { text, .. } => text,
        }
    }

    pub fn href(&self) -> Option<&str> {
        match self {
            CellValue::Text(_) => None,
            CellValue::Link { href, .. } => Some(href),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(text) => write!(f, "{text}"),
            CellValue::Link { text, href } => write!(f, "({text}, {href})"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl CatalogTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub name: String,
    pub detail_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    pub owner_name: String,
    pub link_url: String,
}

/// One row of `df_url.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    #[serde(rename = "name")]
    pub owner_name: String,
    #[serde(rename = "url")]
    pub link_url: String,
    #[serde(rename = "download")]
    pub succeeded: bool,
}

impl DownloadRecord {
    pub fn new(link: DownloadLink, succeeded: bool) -> Self {
        Self {
            owner_name: link.owner_name,
            link_url: link.link_url,
            succeeded,
        }
    }
}

/// Kind of a raw survey file, judged by its final extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Fits,
    Gzip,
    Zip,
}

impl FileKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext {
            FITS_EXT => Some(FileKind::Fits),
            GZIP_EXT => Some(FileKind::Gzip),
            ZIP_EXT => Some(FileKind::Zip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Hst,
    Zoo,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Hst => "hst",
            SourceTag::Zoo => "zoo",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// File name a download is stored under: the last path segment of the URL with every `*`
/// removed.
pub fn download_file_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or_default().replace('*', "")
}

/// Strips the final extension when it equals `ext`.
pub fn strip_extension<'a>(name: &'a str, ext: &str) -> Option<&'a str> {
    let (stem, found) = name.rsplit_once('.')?;
    (found == ext && !stem.is_empty()).then_some(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_name_strips_asterisks() {
        assert_eq!(
            download_file_name("http://host/data/foo*.fits.gz"),
            "foo.fits.gz"
        );
        assert_eq!(download_file_name("http://host/dir/"), "");
    }

    #[test]
    fn file_kind_uses_final_extension() {
        assert_eq!(FileKind::from_name("foo.fits"), Some(FileKind::Fits));
        assert_eq!(FileKind::from_name("foo.fits.gz"), Some(FileKind::Gzip));
        assert_eq!(FileKind::from_name("bundle.zip"), Some(FileKind::Zip));
        assert_eq!(FileKind::from_name("notes.txt"), None);
        assert_eq!(FileKind::from_name("README"), None);
    }

    #[test]
    fn strip_extension_requires_match() {
        assert_eq!(strip_extension("foo.fits.gz", GZIP_EXT), Some("foo.fits"));
        assert_eq!(strip_extension("foo.fits", GZIP_EXT), None);
        assert_eq!(strip_extension(".gz", GZIP_EXT), None);
    }

    #[test]
    fn link_cell_display() {
        let cell = CellValue::Link {
            text: "J0000+0000".to_string(),
            href: "detail.html".to_string(),
        };
        assert_eq!(cell.to_string(), "(J0000+0000, detail.html)");
        assert_eq!(cell.href(), Some("detail.html"));
    }
}
