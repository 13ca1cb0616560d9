//! 页面与数据文件模型

use std::path::PathBuf;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::utils::numbers::strip_digit_grouping;

/// 页面中的链接
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    #[serde(default)]
    pub text: String,
}

impl PageLink {
    /// 链接指向的文件名（URL 路径的最后一段），取不到时为 `download`
    pub fn file_name(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()?
                    .filter(|segment| !segment.is_empty())
                    .last()
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "download".to_string())
    }

    /// 文件扩展名（小写）
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }
}

/// 渲染后的题目页面
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    /// `body.innerText`
    pub text: String,
    /// `#result` 元素的文本
    pub result_text: String,
    pub links: Vec<PageLink>,
    /// 可下载的数据文件
    pub files: Vec<PageLink>,
}

/// 已下载到临时目录的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub name: String,
    pub path: PathBuf,
    pub source_url: String,
}

/// 表格数据
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TabularData {
    /// 来源文件名
    pub source: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl TabularData {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.trim().eq_ignore_ascii_case(name.trim()))
            })
    }

    /// 某一列中能转成数值的单元格
    pub fn numeric_column(&self, index: usize) -> Vec<Option<f64>> {
        self.rows
            .iter()
            .map(|row| row.get(index).and_then(cell_as_f64))
            .collect()
    }

    /// 前 `limit` 行的文本预览，附带每个数值列的合计与均值
    pub fn preview(&self, limit: usize) -> String {
        let mut out = format!(
            "{} ({} 行, {} 列)\n{}\n",
            self.source,
            self.rows.len(),
            self.columns.len(),
            self.columns.join(" | ")
        );
        for row in self.rows.iter().take(limit) {
            let cells: Vec<String> = row.iter().map(cell_to_string).collect();
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
        if self.rows.len() > limit {
            out.push_str(&format!("... 还有 {} 行\n", self.rows.len() - limit));
        }
        for (index, column) in self.columns.iter().enumerate() {
            let values: Vec<f64> = self.numeric_column(index).into_iter().flatten().collect();
            if values.is_empty() {
                continue;
            }
            let sum: f64 = values.iter().sum();
            out.push_str(&format!(
                "列 {}: 数值 {} 个, 合计 {}, 均值 {}\n",
                column,
                values.len(),
                sum,
                sum / values.len() as f64
            ));
        }
        out
    }
}

pub(crate) fn cell_as_f64(cell: &JsonValue) -> Option<f64> {
    match cell {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => strip_digit_grouping(s.trim())?.parse().ok(),
        _ => None,
    }
}

fn cell_to_string(cell: &JsonValue) -> String {
    match cell {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
