//! 答案相关模型
//!
//! `AnswerCandidate` 由分析器产生、被规范化器消费一次；
//! `WireValue` 是最终发送给评分接口的答案表示。

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 答案类型别名表（LLM 的写法并不统一）
static DECLARED_TYPE_ALIASES: phf::Map<&'static str, DeclaredType> = phf::phf_map! {
    "number" => DeclaredType::Number,
    "int" => DeclaredType::Number,
    "integer" => DeclaredType::Number,
    "float" => DeclaredType::Number,
    "string" => DeclaredType::String,
    "text" => DeclaredType::String,
    "boolean" => DeclaredType::Boolean,
    "bool" => DeclaredType::Boolean,
    "object" => DeclaredType::Object,
    "json" => DeclaredType::Object,
    "array" => DeclaredType::Object,
    "image" => DeclaredType::Image,
    "base64_image" => DeclaredType::Image,
    "chart" => DeclaredType::Image,
};

/// 分析器声明的答案类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredType {
    Number,
    String,
    Boolean,
    Object,
    Image,
}

impl DeclaredType {
    /// 从 LLM 返回的类型标记解析（大小写不敏感）
    pub fn parse(tag: &str) -> Option<Self> {
        DECLARED_TYPE_ALIASES
            .get(tag.trim().to_ascii_lowercase().as_str())
            .copied()
    }
}

/// 图表种类
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    /// x 列为数值时按数值定位，否则按行序
    Scatter,
}

/// 图表请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    #[serde(default)]
    pub kind: ChartKind,
    /// 类别列（散点图时为横轴数值列）
    pub x_column: String,
    /// 数值列
    pub y_column: String,
    #[serde(default)]
    pub title: Option<String>,
    /// 数据来源文件名，缺省时使用第一张表
    #[serde(default)]
    pub source: Option<String>,
}

/// 分析器给出的候选答案
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerCandidate {
    pub value: JsonValue,
    pub declared_type: DeclaredType,
    /// 声明为图片时需要渲染的图表
    pub chart: Option<ChartRequest>,
    /// 图表渲染器生成的 PNG 数据
    pub image: Option<Vec<u8>>,
}

impl AnswerCandidate {
    pub fn new(value: JsonValue, declared_type: DeclaredType) -> Self {
        Self {
            value,
            declared_type,
            chart: None,
            image: None,
        }
    }

    pub fn with_chart(mut self, chart: ChartRequest) -> Self {
        self.chart = Some(chart);
        self
    }
}

/// 发送给评分接口的答案
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireValue {
    Number(serde_json::Number),
    Text(String),
    Bool(bool),
    Object(JsonValue),
    /// `data:image/png;base64,...`
    Image(String),
    /// 声明为图片但图表渲染失败，退化为提交分析器的原始值
    WithoutImage(JsonValue),
}

impl WireValue {
    pub fn to_json(&self) -> JsonValue {
        match self {
            WireValue::Number(n) => JsonValue::Number(n.clone()),
            WireValue::Text(s) | WireValue::Image(s) => JsonValue::String(s.clone()),
            WireValue::Bool(b) => JsonValue::Bool(*b),
            WireValue::Object(v) | WireValue::WithoutImage(v) => v.clone(),
        }
    }

    pub fn is_without_image(&self) -> bool {
        matches!(self, WireValue::WithoutImage(_))
    }

    /// 评分接口眼中是否是同一个答案：数字按数值比较（`42` 与 `42.0` 相同）
    pub fn same_answer(&self, other: &WireValue) -> bool {
        json_equivalent(&self.to_json(), &other.to_json())
    }
}

fn json_equivalent(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (JsonValue::Array(xs), JsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equivalent(x, y))
        }
        (JsonValue::Object(xs), JsonValue::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equivalent(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declared_type_accepts_aliases() {
        assert_eq!(DeclaredType::parse("Number"), Some(DeclaredType::Number));
        assert_eq!(DeclaredType::parse(" base64_image "), Some(DeclaredType::Image));
        assert_eq!(DeclaredType::parse("bool"), Some(DeclaredType::Boolean));
        assert_eq!(DeclaredType::parse("table"), None);
    }

    #[test]
    fn wire_value_serializes_without_tags() {
        let answer = WireValue::Number(serde_json::Number::from(42));
        assert_eq!(serde_json::to_value(&answer).unwrap(), json!(42));

        let answer = WireValue::Object(json!({"a": 1}));
        assert_eq!(serde_json::to_value(&answer).unwrap(), json!({"a": 1}));
        assert_eq!(answer.to_json(), json!({"a": 1}));
    }

    #[test]
    fn integral_float_is_the_same_answer_as_integer() {
        let int = WireValue::Number(serde_json::Number::from(42));
        let float = WireValue::Number(serde_json::Number::from_f64(42.0).unwrap());
        assert_ne!(int, float);
        assert!(int.same_answer(&float));
        assert!(!int.same_answer(&WireValue::Text("42".to_string())));

        let nested = WireValue::Object(json!({"total": 3, "parts": [1, 2]}));
        let nested_float = WireValue::Object(json!({"total": 3.0, "parts": [1.0, 2]}));
        assert!(nested.same_answer(&nested_float));
        assert!(!nested.same_answer(&WireValue::Object(json!({"total": 3}))));
    }

    #[test]
    fn chart_kind_defaults_to_bar() {
        let chart: ChartRequest =
            serde_json::from_value(json!({"x_column": "city", "y_column": "amount"})).unwrap();
        assert_eq!(chart.kind, ChartKind::Bar);
        let chart: ChartRequest = serde_json::from_value(
            json!({"kind": "scatter", "x_column": "x", "y_column": "y"}),
        )
        .unwrap();
        assert_eq!(chart.kind, ChartKind::Scatter);
    }
}
