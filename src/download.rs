use std::fs;

use camino::Utf8PathBuf;

use crate::domain::download_file_name;
use crate::error::AstroError;
use crate::fetch::Fetcher;
use crate::layout::ensure_dir;

/// Fetches survey files into the downloads directory.
///
/// A non-success status is reported as `Ok(false)` and nothing is written. Transport
/// failures are returned as errors and end the crawl.
pub struct DownloadRecorder<'a> {
    fetcher: &'a dyn Fetcher,
    downloads_dir: Utf8PathBuf,
}

impl<'a> DownloadRecorder<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, downloads_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            fetcher,
            downloads_dir: downloads_dir.into(),
        }
    }

    pub fn download(&self, url: &str) -> Result<bool, AstroError> {
        let file_name = download_file_name(url);
        if file_name.is_empty() {
            tracing::warn!(url, "link has no file name, not downloading");
            return Ok(false);
        }

        let response = self.fetcher.get(url)?;
        if !response.is_success() {
            tracing::warn!(url, status = response.status, "download failed");
            return Ok(false);
        }

        ensure_dir(&self.downloads_dir)?;
        let destination = self.downloads_dir.join(&file_name);
        fs::write(destination.as_std_path(), &response.body)
            .map_err(|err| AstroError::Filesystem(format!("write {destination}: {err}")))?;
        tracing::debug!(url, path = %destination, bytes = response.body.len(), "downloaded");
        Ok(true)
    }
}
