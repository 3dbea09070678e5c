use std::time::Instant;

use camino::Utf8Path;
use scraper::{Html, Selector};
use serde::Serialize;

use crate::catalog::{catalog_records, fetch_catalog, write_catalog_table};
use crate::config::CrawlConfig;
use crate::domain::{CatalogTable, DownloadLink, DownloadRecord};
use crate::download::DownloadRecorder;
use crate::error::AstroError;
use crate::fetch::{Fetcher, get_success, resolve_href};
use crate::layout::OutputLayout;
use crate::output::{ProgressEvent, ProgressSink, iso_timestamp};

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub catalog_url: String,
    pub survey: String,
    pub link_column: String,
}

impl From<&CrawlConfig> for CrawlOptions {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            catalog_url: config.catalog_url.clone(),
            survey: config.survey.clone(),
            link_column: config.link_column.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlResult {
    pub table: CatalogTable,
    pub records: Vec<DownloadRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlSummary {
    pub catalog_rows: usize,
    pub links: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub catalog_table: String,
    pub download_table: String,
    pub finished_at: String,
}

impl CrawlResult {
    pub fn summary(&self, layout: &OutputLayout) -> CrawlSummary {
        let downloaded = self.records.iter().filter(|record| record.succeeded).count();
        CrawlSummary {
            catalog_rows: self.table.rows.len(),
            links: self.records.len(),
            downloaded,
            failed: self.records.len() - downloaded,
            catalog_table: layout.catalog_table_path().to_string(),
            download_table: layout.download_table_path().to_string(),
            finished_at: iso_timestamp(),
        }
    }
}

/// Catalog fetch, detail-page crawl and downloads, one request at a time.
pub struct Crawler<F: Fetcher> {
    fetcher: F,
    layout: OutputLayout,
    options: CrawlOptions,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(fetcher: F, layout: OutputLayout, options: CrawlOptions) -> Self {
        Self {
            fetcher,
            layout,
            options,
        }
    }

    pub fn run(&self, sink: &dyn ProgressSink) -> Result<CrawlResult, AstroError> {
        self.layout.ensure_root()?;

        sink.event(ProgressEvent::new(format!(
            "phase=Catalog; fetching {}",
            self.options.catalog_url
        )));
        let table = fetch_catalog(&self.fetcher, &self.options.catalog_url)?;
        write_catalog_table(&table, &self.layout.catalog_table_path())?;
        tracing::info!(
            rows = table.rows.len(),
            columns = table.columns.len(),
            "catalog table written"
        );

        let catalog = catalog_records(&table, &self.options.link_column)?;
        let recorder = DownloadRecorder::new(&self.fetcher, self.layout.downloads_dir());
        let mut records = Vec::new();

        for (index, entry) in catalog.iter().enumerate() {
            let start = Instant::now();
            let detail_url = resolve_href(&self.options.catalog_url, &entry.detail_url)?;
            let page = get_success(&self.fetcher, &detail_url)?;
            let hrefs = extract_survey_links(&page.text(), &self.options.survey)?;

            for href in hrefs {
                let link = DownloadLink {
                    owner_name: entry.name.clone(),
                    link_url: resolve_href(&detail_url, &href)?,
                };
                let succeeded = recorder.download(&link.link_url)?;
                records.push(DownloadRecord::new(link, succeeded));
            }

            sink.event(ProgressEvent::timed(
                format!(
                    "phase=Crawl; {}/{} {} links={}",
                    index + 1,
                    catalog.len(),
                    entry.name,
                    records.len()
                ),
                start.elapsed(),
            ));
        }

        write_download_table(&records, &self.layout.download_table_path())?;
        tracing::info!(links = records.len(), "download table written");

        Ok(CrawlResult { table, records })
    }
}

/// Every `<a href>` on the page whose href contains `survey` as a literal substring, in
/// document order.
pub fn extract_survey_links(html: &str, survey: &str) -> Result<Vec<String>, AstroError> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]")
        .map_err(|err| AstroError::CatalogParse(format!("selector a[href]: {err}")))?;
    Ok(document
        .select(&anchors)
        .filter_map(|anchor| anchor.value().attr("href"))
        .filter(|href| href.contains(survey))
        .map(|href| href.to_string())
        .collect())
}

/// Persists the crawl outcome as `df_url.csv` with columns `name,url,download`.
pub fn write_download_table(records: &[DownloadRecord], path: &Utf8Path) -> Result<(), AstroError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path.as_std_path())
        .map_err(|err| AstroError::AuditWrite(format!("{path}: {err}")))?;
    writer
        .write_record(["name", "url", "download"])
        .map_err(|err| AstroError::AuditWrite(err.to_string()))?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|err| AstroError::AuditWrite(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| AstroError::AuditWrite(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survey_filter_is_substring_match() {
        let html = r#"
            <a href="https://archive.example.org/HST/J0001_cutout.fits.gz">hst</a>
            <a href="https://archive.example.org/PS1/J0001.fits">ps1</a>
            <a>no href</a>
            <a href="/preview?survey=HST">preview</a>"#;
        let links = extract_survey_links(html, "HST").unwrap();
        assert_eq!(
            links,
            vec![
                "https://archive.example.org/HST/J0001_cutout.fits.gz",
                "/preview?survey=HST"
            ]
        );
    }
}
