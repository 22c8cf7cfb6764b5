//! Flat-file export of the (filtered) catalog: CSV, XLSX and JSON.

use chrono::{DateTime, Local, SecondsFormat, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{HarvestError, Result};
use crate::model::ProductRecord;

pub const COLUMNS: [&str; 9] = [
    "商品名称",
    "类目",
    "价格",
    "销量",
    "店铺名称",
    "店铺链接",
    "商品链接",
    "采集时间",
    "原始内容",
];

const FILENAME_PREFIX: &str = "TikTok数据_";
const SHEET_NAME: &str = "商品数据";
const MISSING_CATEGORY: &str = "未知";
const MISSING_LINK: &str = "无";
const BOM: &str = "\u{feff}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "json" => Ok(ExportFormat::Json),
            other => Err(HarvestError::Export(format!(
                "Unknown format '{}'. Use: csv, xlsx, or json",
                other
            ))),
        }
    }
}

/// One exported row, field order matches [`COLUMNS`]
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ExportRow {
    #[serde(rename = "商品名称")]
    pub product_name: String,
    #[serde(rename = "类目")]
    pub category: String,
    #[serde(rename = "价格")]
    pub price: String,
    #[serde(rename = "销量")]
    pub sales_volume: String,
    #[serde(rename = "店铺名称")]
    pub shop_name: String,
    #[serde(rename = "店铺链接")]
    pub shop_link: String,
    #[serde(rename = "商品链接")]
    pub product_link: String,
    #[serde(rename = "采集时间")]
    pub captured_at: String,
    #[serde(rename = "原始内容")]
    pub raw_content: String,
}

impl ExportRow {
    pub fn from_record(record: &ProductRecord) -> Self {
        Self {
            product_name: record.product_name.clone(),
            category: record
                .category
                .clone()
                .unwrap_or_else(|| MISSING_CATEGORY.to_string()),
            price: record.price.clone(),
            sales_volume: record.sales_volume.clone(),
            shop_name: record.shop_name.clone(),
            shop_link: record
                .shop_link
                .clone()
                .unwrap_or_else(|| MISSING_LINK.to_string()),
            product_link: record
                .product_link
                .clone()
                .unwrap_or_else(|| MISSING_LINK.to_string()),
            captured_at: record
                .timestamp
                .with_timezone(&Local)
                .format("%Y/%-m/%-d %H:%M:%S")
                .to_string(),
            raw_content: record.raw_content.clone(),
        }
    }

    fn cells(&self) -> [&str; 9] {
        [
            self.product_name.as_str(),
            self.category.as_str(),
            self.price.as_str(),
            self.sales_volume.as_str(),
            self.shop_name.as_str(),
            self.shop_link.as_str(),
            self.product_link.as_str(),
            self.captured_at.as_str(),
            self.raw_content.as_str(),
        ]
    }
}

fn rows(records: &[&ProductRecord]) -> Vec<ExportRow> {
    records.iter().map(|r| ExportRow::from_record(r)).collect()
}

/// CSV with BOM, plain header line, every value quoted, no trailing newline
pub fn to_csv(records: &[&ProductRecord]) -> Result<String> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(BOM.as_bytes());
    buffer.extend_from_slice(COLUMNS.join(",").as_bytes());
    buffer.push(b'\n');

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(buffer);

    for row in rows(records) {
        writer.write_record(row.cells())?;
    }

    let mut bytes = writer
        .into_inner()
        .map_err(|e| HarvestError::Export(format!("csv flush: {}", e)))?;
    // lines are joined, not terminated
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    String::from_utf8(bytes).map_err(|e| HarvestError::Export(format!("csv utf-8: {}", e)))
}

/// Workbook with a single sheet holding the same columns
pub fn to_xlsx(records: &[&ProductRecord]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in COLUMNS.iter().enumerate() {
        sheet.write_string(0, col as u16, *title)?;
    }
    for (i, row) in rows(records).iter().enumerate() {
        let line = i as u32 + 1;
        for (col, cell) in row.cells().iter().enumerate() {
            sheet.write_string(line, col as u16, *cell)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Pretty-printed JSON array keyed by the column labels
pub fn to_json(records: &[&ProductRecord]) -> Result<String> {
    serde_json::to_string_pretty(&rows(records))
        .map_err(|e| HarvestError::Export(format!("json: {}", e)))
}

/// `TikTok数据_2024-01-05T14-03-22.csv`
pub fn export_filename(now: DateTime<Utc>, format: ExportFormat) -> String {
    let stamp: String = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
        .chars()
        .take(19)
        .collect();
    format!("{}{}.{}", FILENAME_PREFIX, stamp, format.extension())
}

/// Serialize `records` and write them under `dir`, returning the file path
pub fn write_export(
    records: &[&ProductRecord],
    format: ExportFormat,
    dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let bytes = match format {
        ExportFormat::Csv => to_csv(records)?.into_bytes(),
        ExportFormat::Xlsx => to_xlsx(records)?,
        ExportFormat::Json => to_json(records)?.into_bytes(),
    };

    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(now, format));
    std::fs::write(&path, bytes)?;
    log::info!("💾 Exported {} record(s) to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str, category: Option<&str>) -> ProductRecord {
        ProductRecord {
            id: uuid::Uuid::new_v4().to_string(),
            product_name: name.to_string(),
            price: "$15.99".to_string(),
            sales_volume: "10.2k".to_string(),
            revenue: 163_098.0,
            product_link: Some("https://tiktok.com/product/12345".to_string()),
            shop_name: "FashionNova".to_string(),
            shop_link: None,
            raw_content: "他说 \"好看\"".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 5, 14, 3, 22).unwrap(),
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn csv_starts_with_bom_and_header() {
        let records = [record("Dress", None)];
        let refs: Vec<&ProductRecord> = records.iter().collect();
        let csv = to_csv(&refs).unwrap();
        assert!(csv.starts_with('\u{feff}'));
        let first_line = csv.trim_start_matches('\u{feff}').lines().next().unwrap();
        assert_eq!(first_line, COLUMNS.join(","));
    }

    #[test]
    fn csv_quotes_everything_and_doubles_inner_quotes() {
        let records = [record("Dress", None)];
        let refs: Vec<&ProductRecord> = records.iter().collect();
        let csv = to_csv(&refs).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with("\"Dress\",\"未知\",\"$15.99\""));
        assert!(row.contains("\"无\""));
        assert!(row.ends_with("\"他说 \"\"好看\"\"\""));
    }

    #[test]
    fn csv_round_trips_commas() {
        let records = [record("Nice, Dress", Some("女装服饰")), record("Mop", None)];
        let refs: Vec<&ProductRecord> = records.iter().collect();
        let csv = to_csv(&refs).unwrap();

        let mut reader = csv::Reader::from_reader(csv.trim_start_matches('\u{feff}').as_bytes());
        let parsed: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(parsed.len(), refs.len());
        assert_eq!(&parsed[0][0], "Nice, Dress");
        assert_eq!(&parsed[0][1], "女装服饰");
        assert_eq!(&parsed[0][8], "他说 \"好看\"");
    }

    #[test]
    fn csv_lines_have_no_trailing_terminator() {
        let records = [record("Dress", None), record("Mop", None)];
        let refs: Vec<&ProductRecord> = records.iter().collect();
        let csv = to_csv(&refs).unwrap();
        assert!(csv.ends_with("\"他说 \"\"好看\"\"\""));
        assert_eq!(csv.matches('\n').count(), 2);
    }

    #[test]
    fn empty_export_has_header_only() {
        let csv = to_csv(&[]).unwrap();
        assert_eq!(csv, format!("\u{feff}{}", COLUMNS.join(",")));
        assert_eq!(csv.lines().count(), 1);
        assert_eq!(to_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn json_keeps_column_order() {
        let records = [record("Dress", None)];
        let refs: Vec<&ProductRecord> = records.iter().collect();
        let json = to_json(&refs).unwrap();
        let name_at = json.find("商品名称").unwrap();
        let raw_at = json.find("原始内容").unwrap();
        assert!(name_at < raw_at);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["店铺链接"], "无");
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let records = [record("Dress", None)];
        let refs: Vec<&ProductRecord> = records.iter().collect();
        let bytes = to_xlsx(&refs).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn filename_pattern() {
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 14, 3, 22).unwrap();
        assert_eq!(
            export_filename(now, ExportFormat::Csv),
            "TikTok数据_2024-01-05T14-03-22.csv"
        );
        assert_eq!(
            export_filename(now, ExportFormat::Xlsx),
            "TikTok数据_2024-01-05T14-03-22.xlsx"
        );
    }

    #[test]
    fn format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("excel".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn write_export_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let records = [record("Dress", None)];
        let refs: Vec<&ProductRecord> = records.iter().collect();
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 14, 3, 22).unwrap();
        let path = write_export(&refs, ExportFormat::Json, dir.path(), now).unwrap();
        assert!(path.exists());
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("Dress"));
    }
}
