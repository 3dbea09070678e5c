use camino::Utf8Path;
use scraper::{ElementRef, Html, Selector};

use crate::domain::{CatalogRecord, CatalogTable, CellValue};
use crate::error::AstroError;
use crate::fetch::{Fetcher, get_success};

/// Fetches the catalog page and parses its results table.
pub fn fetch_catalog(fetcher: &dyn Fetcher, url: &str) -> Result<CatalogTable, AstroError> {
    let response = get_success(fetcher, url)?;
    parse_catalog(&response.text())
}

/// Parses the first `<table>` of the page.
///
/// Column names come from every `<th>`. Each body `<tr>` becomes one row; a `<td>` holding
/// anchors becomes a [`CellValue::Link`] with the href of its last anchor.
pub fn parse_catalog(html: &str) -> Result<CatalogTable, AstroError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let body_sel = selector("tbody")?;
    let header_sel = selector("th")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let anchor_sel = selector("a")?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| AstroError::CatalogParse("no <table> in page".to_string()))?;

    let columns: Vec<String> = table.select(&header_sel).map(element_text).collect();
    if columns.is_empty() {
        return Err(AstroError::CatalogParse("table has no header cells".to_string()));
    }

    let body = table
        .select(&body_sel)
        .next()
        .ok_or_else(|| AstroError::CatalogParse("table has no body".to_string()))?;

    let mut rows = Vec::new();
    for (index, row) in body.select(&row_sel).enumerate() {
        let cells: Vec<CellValue> = row
            .select(&cell_sel)
            .map(|cell| {
                let text = element_text(cell);
                match cell.select(&anchor_sel).last() {
                    Some(anchor) => CellValue::Link {
                        text,
                        href: anchor.value().attr("href").unwrap_or_default().to_string(),
                    },
                    None => CellValue::Text(text),
                }
            })
            .collect();
        if cells.is_empty() {
            tracing::debug!(row = index, "skipping body row without data cells");
            continue;
        }
        if cells.len() != columns.len() {
            return Err(AstroError::CatalogParse(format!(
                "row {index} has {} cells, expected {}",
                cells.len(),
                columns.len()
            )));
        }
        rows.push(cells);
    }

    Ok(CatalogTable { columns, rows })
}

/// `(name, detail_url)` pairs taken from the link cells of `link_column`.
pub fn catalog_records(
    table: &CatalogTable,
    link_column: &str,
) -> Result<Vec<CatalogRecord>, AstroError> {
    let index = table.column_index(link_column).ok_or_else(|| {
        AstroError::CatalogParse(format!("catalog has no column named {link_column}"))
    })?;
    let mut records = Vec::new();
    for row in &table.rows {
        match &row[index] {
            CellValue::Link { text, href } if !href.is_empty() => records.push(CatalogRecord {
                name: text.clone(),
                detail_url: href.clone(),
            }),
            cell => tracing::warn!(cell = %cell.text(), "catalog row has no detail link"),
        }
    }
    Ok(records)
}

/// Persists the table as `df_main.csv`; link cells are written as `(text, href)`.
pub fn write_catalog_table(table: &CatalogTable, path: &Utf8Path) -> Result<(), AstroError> {
    let mut writer = csv::Writer::from_path(path.as_std_path())
        .map_err(|err| AstroError::AuditWrite(format!("{path}: {err}")))?;
    writer
        .write_record(&table.columns)
        .map_err(|err| AstroError::AuditWrite(err.to_string()))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|cell| cell.to_string()))
            .map_err(|err| AstroError::AuditWrite(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| AstroError::AuditWrite(err.to_string()))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn selector(css: &str) -> Result<Selector, AstroError> {
    Selector::parse(css).map_err(|err| AstroError::CatalogParse(format!("selector {css}: {err}")))
}
