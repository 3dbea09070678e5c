#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use camino::Utf8PathBuf;

use astro_dataset_builder::error::AstroError;
use astro_dataset_builder::fetch::{FetchResponse, Fetcher};

/// In-memory transport. Unknown URLs answer 404; URLs in `broken` fail at the transport level.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, FetchResponse>,
    broken: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            },
        );
        self
    }

    pub fn with_file(mut self, url: &str, body: &[u8]) -> Self {
        self.pages.insert(
            url.to_string(),
            FetchResponse {
                status: 200,
                body: body.to_vec(),
            },
        );
        self
    }

    pub fn with_broken(mut self, url: &str) -> Self {
        self.broken.push(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    fn get(&self, url: &str) -> Result<FetchResponse, AstroError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.broken.iter().any(|broken| broken == url) {
            return Err(AstroError::Network(format!("connection reset: {url}")));
        }
        Ok(self.pages.get(url).cloned().unwrap_or(FetchResponse {
            status: 404,
            body: b"not found".to_vec(),
        }))
    }
}

pub fn utf8_temp() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

/// Minimal single-HDU FITS file holding `rows x cols` big-endian f64 pixels.
pub fn fits_image(rows: usize, cols: usize, value: impl Fn(usize, usize) -> f64) -> Vec<u8> {
    let cards = [
        "SIMPLE  =                    T".to_string(),
        "BITPIX  =                  -64".to_string(),
        "NAXIS   =                    2".to_string(),
        format!("NAXIS1  = {cols:>20}"),
        format!("NAXIS2  = {rows:>20}"),
        "END".to_string(),
    ];
    let mut bytes: Vec<u8> = cards
        .iter()
        .flat_map(|card| format!("{card:<80}").into_bytes())
        .collect();
    bytes.resize(bytes.len().div_ceil(2880) * 2880, b' ');

    let mut data = Vec::with_capacity(rows * cols * 8);
    for row in 0..rows {
        for col in 0..cols {
            data.extend_from_slice(&value(row, col).to_be_bytes());
        }
    }
    data.resize(data.len().div_ceil(2880) * 2880, 0);
    bytes.extend_from_slice(&data);
    bytes
}
