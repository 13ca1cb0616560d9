//! 数据文件解析服务 - 业务能力层
//!
//! 把下载的文件转换成表格数据。解析失败不致命，由调用方记录后跳过。
//!
//! - csv / tsv / json / txt：一张表
//! - xlsx / xls / ods：每个工作表一张表，来源记为 `文件名#工作表`
//! - pdf：每页一行（`page`, `text`）

use std::io::Cursor;

use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::models::{DownloadedFile, TabularData};

/// 数据解析能力
#[async_trait]
pub trait DataExtractor: Send + Sync {
    async fn extract(&self, file: &DownloadedFile) -> Result<TabularData, ExtractError>;

    /// 解析文件中的全部表格；默认只有一张
    async fn extract_all(&self, file: &DownloadedFile) -> Result<Vec<TabularData>, ExtractError> {
        Ok(vec![self.extract(file).await?])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Csv,
    Tsv,
    Json,
    Text,
    Workbook,
    Pdf,
}

static FORMATS: phf::Map<&'static str, FileFormat> = phf::phf_map! {
    "csv" => FileFormat::Csv,
    "tsv" => FileFormat::Tsv,
    "json" => FileFormat::Json,
    "txt" => FileFormat::Text,
    "xlsx" => FileFormat::Workbook,
    "xlsm" => FileFormat::Workbook,
    "xls" => FileFormat::Workbook,
    "ods" => FileFormat::Workbook,
    "pdf" => FileFormat::Pdf,
};

/// 是否是可以解析的文件扩展名
pub fn is_supported_extension(ext: &str) -> bool {
    FORMATS.contains_key(ext.to_ascii_lowercase().as_str())
}

fn parse_error(name: &str, message: impl ToString) -> ExtractError {
    ExtractError::Parse {
        path: name.to_string(),
        message: message.to_string(),
    }
}

/// 支持文本表格、电子表格与 PDF 的解析器
#[derive(Debug, Default, Clone)]
pub struct FileDataExtractor;

impl FileDataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 解析内存中的文本内容，返回第一张表
    pub fn parse(&self, name: &str, content: &str) -> Result<TabularData, ExtractError> {
        self.parse_bytes(name, content.as_bytes())?
            .into_iter()
            .next()
            .ok_or_else(|| parse_error(name, "文件中没有数据"))
    }

    /// 按扩展名解析文件内容
    pub fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<Vec<TabularData>, ExtractError> {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let format = FORMATS
            .get(ext.as_str())
            .copied()
            .ok_or_else(|| ExtractError::Unsupported(name.to_string()))?;

        let tables = match format {
            FileFormat::Csv => vec![parse_delimited(name, &decode_text(bytes), b',')?],
            FileFormat::Tsv => vec![parse_delimited(name, &decode_text(bytes), b'\t')?],
            FileFormat::Json => vec![parse_json(name, &decode_text(bytes))?],
            FileFormat::Text => vec![TabularData {
                source: name.to_string(),
                columns: vec!["line".to_string()],
                rows: decode_text(bytes)
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| vec![JsonValue::String(line.to_string())])
                    .collect(),
            }],
            FileFormat::Workbook => parse_workbook(name, bytes)?,
            FileFormat::Pdf => vec![parse_pdf(name, bytes)?],
        };

        for table in &tables {
            debug!(
                "解析 {} 完成: {} 行, {} 列",
                table.source,
                table.rows.len(),
                table.columns.len()
            );
        }
        Ok(tables)
    }
}

#[async_trait]
impl DataExtractor for FileDataExtractor {
    async fn extract(&self, file: &DownloadedFile) -> Result<TabularData, ExtractError> {
        self.extract_all(file)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| parse_error(&file.name, "文件中没有数据"))
    }

    async fn extract_all(&self, file: &DownloadedFile) -> Result<Vec<TabularData>, ExtractError> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|source| ExtractError::Io {
                path: file.path.display().to_string(),
                source,
            })?;
        self.parse_bytes(&file.name, &bytes)
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

/// 每个非空工作表一张表，首行作为列名
fn parse_workbook(name: &str, bytes: &[u8]) -> Result<Vec<TabularData>, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| parse_error(name, e))?;

    let mut tables = Vec::new();
    for sheet in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| parse_error(name, e))?;
        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            debug!("工作表 {} 为空，跳过", sheet);
            continue;
        };

        let columns = header
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Data::Empty => format!("column_{}", i + 1),
                other => other.to_string().trim().to_string(),
            })
            .collect();
        tables.push(TabularData {
            source: format!("{}#{}", name, sheet),
            columns,
            rows: rows.map(|row| row.iter().map(workbook_cell).collect()).collect(),
        });
    }

    if tables.is_empty() {
        return Err(parse_error(name, "工作簿中没有数据"));
    }
    Ok(tables)
}

/// 电子表格单元格 → JSON；整数值的浮点数还原为整数
fn workbook_cell(cell: &Data) -> JsonValue {
    match cell {
        Data::Int(i) => JsonValue::from(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => JsonValue::from(*f as i64),
        Data::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Data::Bool(b) => JsonValue::Bool(*b),
        Data::String(s) => JsonValue::String(s.clone()),
        Data::Empty => JsonValue::Null,
        other => JsonValue::String(other.to_string()),
    }
}

/// PDF 每页一行；单页提取失败时该页文本为空
fn parse_pdf(name: &str, bytes: &[u8]) -> Result<TabularData, ExtractError> {
    let document = lopdf::Document::load_mem(bytes).map_err(|e| parse_error(name, e))?;

    let rows = document
        .get_pages()
        .keys()
        .map(|&page| {
            let text = document.extract_text(&[page]).unwrap_or_else(|e| {
                warn!("⚠️ {} 第 {} 页文本提取失败: {}", name, page, e);
                String::new()
            });
            vec![JsonValue::from(page), JsonValue::String(text.trim().to_string())]
        })
        .collect();

    Ok(TabularData {
        source: name.to_string(),
        columns: vec!["page".to_string(), "text".to_string()],
        rows,
    })
}

fn parse_delimited(name: &str, content: &str, delimiter: u8) -> Result<TabularData, ExtractError> {
    let parse_err = |e: csv::Error| ExtractError::Parse {
        path: name.to_string(),
        message: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(parse_err)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_err)?;
        rows.push(record.iter().map(parse_cell).collect());
    }

    Ok(TabularData {
        source: name.to_string(),
        columns,
        rows,
    })
}

/// 能转成数值的单元格存为数值
fn parse_cell(cell: &str) -> JsonValue {
    if let Ok(n) = cell.parse::<i64>() {
        return JsonValue::from(n);
    }
    match cell.parse::<f64>() {
        Ok(f) if f.is_finite() => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(cell.to_string())),
        _ => JsonValue::String(cell.to_string()),
    }
}

fn parse_json(name: &str, content: &str) -> Result<TabularData, ExtractError> {
    let value: JsonValue = serde_json::from_str(content).map_err(|e| ExtractError::Parse {
        path: name.to_string(),
        message: e.to_string(),
    })?;

    // 对象数组 → 表格；其他 JSON → 单元格
    if let Some(items) = value.as_array() {
        if !items.is_empty() && items.iter().all(JsonValue::is_object) {
            let mut columns: Vec<String> = Vec::new();
            for item in items {
                if let Some(map) = item.as_object() {
                    for key in map.keys() {
                        if !columns.contains(key) {
                            columns.push(key.clone());
                        }
                    }
                }
            }
            let rows = items
                .iter()
                .map(|item| {
                    columns
                        .iter()
                        .map(|c| item.get(c).cloned().unwrap_or(JsonValue::Null))
                        .collect()
                })
                .collect();
            return Ok(TabularData {
                source: name.to_string(),
                columns,
                rows,
            });
        }
    }

    Ok(TabularData {
        source: name.to_string(),
        columns: vec!["value".to_string()],
        rows: vec![vec![value]],
    })
}
