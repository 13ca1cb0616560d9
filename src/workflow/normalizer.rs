//! 答案规范化
//!
//! 把分析器给出的候选答案转换成评分接口接受的格式。纯函数，无 I/O。

use base64::Engine;
use serde_json::Value as JsonValue;

use crate::error::NormalizationError;
use crate::models::{AnswerCandidate, DeclaredType, WireValue};
use crate::utils::numbers::strip_digit_grouping;

const DATA_URI_PREFIX: &str = "data:image/";

/// 规范化候选答案
///
/// | 声明类型 | 结果 |
/// |---|---|
/// | number | 数值；文本会去掉千分位逗号后解析，其他逗号与非有限数报错 |
/// | string | 去掉首尾空白的文本 |
/// | boolean | 布尔值；接受 true/false/yes/no 等文本 |
/// | object | 原样透传；文本形式的 JSON 会被解析 |
/// | image | PNG 的 data URI；没有图片时退化为 `WithoutImage` |
pub fn normalize(candidate: &AnswerCandidate) -> Result<WireValue, NormalizationError> {
    match candidate.declared_type {
        DeclaredType::Number => normalize_number(&candidate.value),
        DeclaredType::String => normalize_string(&candidate.value),
        DeclaredType::Boolean => normalize_boolean(&candidate.value),
        DeclaredType::Object => normalize_object(&candidate.value),
        DeclaredType::Image => normalize_image(candidate),
    }
}

fn mismatch(expected: &'static str, value: &JsonValue) -> NormalizationError {
    NormalizationError::TypeMismatch {
        expected,
        value: value.to_string(),
    }
}

fn normalize_number(value: &JsonValue) -> Result<WireValue, NormalizationError> {
    match value {
        JsonValue::Number(n) => Ok(WireValue::Number(n.clone())),
        JsonValue::String(s) => {
            let cleaned =
                strip_digit_grouping(s.trim()).ok_or_else(|| mismatch("number", value))?;
            if let Ok(i) = cleaned.parse::<i64>() {
                return Ok(WireValue::Number(i.into()));
            }
            if let Ok(u) = cleaned.parse::<u64>() {
                return Ok(WireValue::Number(u.into()));
            }
            let f: f64 = cleaned.parse().map_err(|_| mismatch("number", value))?;
            serde_json::Number::from_f64(f)
                .map(WireValue::Number)
                .ok_or_else(|| NormalizationError::NonFinite(s.trim().to_string()))
        }
        _ => Err(mismatch("number", value)),
    }
}

fn normalize_string(value: &JsonValue) -> Result<WireValue, NormalizationError> {
    match value {
        JsonValue::String(s) => Ok(WireValue::Text(s.trim().to_string())),
        JsonValue::Number(n) => Ok(WireValue::Text(n.to_string())),
        JsonValue::Bool(b) => Ok(WireValue::Text(b.to_string())),
        _ => Err(mismatch("string", value)),
    }
}

fn normalize_boolean(value: &JsonValue) -> Result<WireValue, NormalizationError> {
    match value {
        JsonValue::Bool(b) => Ok(WireValue::Bool(*b)),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(WireValue::Bool(true)),
            "false" | "no" | "n" | "0" => Ok(WireValue::Bool(false)),
            _ => Err(mismatch("boolean", value)),
        },
        _ => Err(mismatch("boolean", value)),
    }
}

fn normalize_object(value: &JsonValue) -> Result<WireValue, NormalizationError> {
    match value {
        JsonValue::Object(_) | JsonValue::Array(_) => Ok(WireValue::Object(value.clone())),
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(s.trim()) {
            Ok(parsed @ (JsonValue::Object(_) | JsonValue::Array(_))) => {
                Ok(WireValue::Object(parsed))
            }
            _ => Err(mismatch("object", value)),
        },
        _ => Err(mismatch("object", value)),
    }
}

fn normalize_image(candidate: &AnswerCandidate) -> Result<WireValue, NormalizationError> {
    if let Some(bytes) = &candidate.image {
        if bytes.is_empty() {
            return Err(NormalizationError::EmptyImage);
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        return Ok(WireValue::Image(format!("data:image/png;base64,{}", encoded)));
    }

    // 分析器直接给出了 data URI
    if let JsonValue::String(s) = &candidate.value {
        let s = s.trim();
        if s.starts_with(DATA_URI_PREFIX) {
            let payload = s.split_once("base64,").map(|(_, p)| p).unwrap_or_default();
            if payload.is_empty() {
                return Err(NormalizationError::EmptyImage);
            }
            return Ok(WireValue::Image(s.to_string()));
        }
    }

    Ok(WireValue::WithoutImage(candidate.value.clone()))
}
