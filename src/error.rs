//! 错误类型
//!
//! 按题目链的阶段划分：抓取、解析文件、分析、规范化、提交。
//! 除 `ExtractError` 外，其余错误都会在单步执行器边界被转换为 `StepOutcome`，
//! 不会越过编排层。

use std::time::Duration;

use thiserror::Error;

/// 页面抓取错误（Page Renderer）
#[derive(Debug, Error)]
pub enum FetchError {
    /// 浏览器启动或连接失败
    #[error("浏览器不可用: {0}")]
    BrowserUnavailable(String),
    /// 导航失败
    #[error("导航到 {url} 失败: {message}")]
    NavigationFailed { url: String, message: String },
    /// 页面脚本执行失败
    #[error("执行页面脚本失败: {0}")]
    ScriptFailed(String),
    /// 文件下载失败
    #[error("下载文件 {url} 失败: {message}")]
    DownloadFailed { url: String, message: String },
    /// 超时
    #[error("抓取 {url} 超时 ({timeout:?})")]
    Timeout { url: String, timeout: Duration },
}

/// 数据文件解析错误（不致命，只降低输入的丰富程度）
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 不支持的文件格式
    #[error("不支持的文件格式: {0}")]
    Unsupported(String),
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 内容解析失败
    #[error("解析文件失败 ({path}): {message}")]
    Parse { path: String, message: String },
}

/// 题目分析错误（Question Analyzer）
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// LLM API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// LLM 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容中找不到可解析的 JSON
    #[error("无法解析LLM响应: {0}")]
    UnparsableResponse(String),
    /// 响应中没有 answer_type 字段（或不是字符串）
    #[error("LLM响应缺少 answer_type")]
    MissingAnswerType,
    /// 未知的答案类型
    #[error("未知的答案类型: {0}")]
    UnknownAnswerType(String),
    /// 同一题目重复给出已被判错的答案
    #[error("重复提交已被判错的答案: {0}")]
    DuplicateAnswer(String),
    /// 分析超时
    #[error("分析超时 ({0:?})")]
    Timeout(Duration),
}

/// 答案规范化错误
#[derive(Debug, Error, PartialEq)]
pub enum NormalizationError {
    /// 数值不是有限数
    #[error("数值不是有限数: {0}")]
    NonFinite(String),
    /// 值与声明的类型不匹配且无法转换
    #[error("值 {value} 无法转换为 {expected}")]
    TypeMismatch { expected: &'static str, value: String },
    /// 图片数据为空
    #[error("图片数据为空")]
    EmptyImage,
}

/// 图表渲染错误（Chart Renderer）
#[derive(Debug, Error)]
pub enum ChartError {
    /// 没有可用的数据表
    #[error("没有可用于绘图的数据表")]
    NoData,
    /// 找不到列
    #[error("找不到列: {0}")]
    MissingColumn(String),
    /// 列中没有数值
    #[error("列 {0} 中没有数值")]
    NoNumericValues(String),
    /// 编码失败
    #[error("图片编码失败: {0}")]
    Encode(String),
}

/// 提交答案错误（Grading endpoint）
#[derive(Debug, Error)]
pub enum SubmitError {
    /// 网络请求失败
    #[error("提交请求失败 ({endpoint}): {message}")]
    RequestFailed { endpoint: String, message: String },
    /// 响应不符合评分接口约定
    #[error("评分接口响应格式错误 ({endpoint}): {body}")]
    MalformedResponse { endpoint: String, body: String },
    /// 找不到提交地址
    #[error("无法确定提交地址: {0}")]
    NoSubmitUrl(String),
    /// 提交超时
    #[error("提交超时 ({0:?})")]
    Timeout(Duration),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 缺少必填项
    #[error("缺少必填配置: {0}")]
    Missing(String),
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },
    /// 配置文件读取或解析失败
    #[error("配置文件 {path} 无效: {message}")]
    File { path: String, message: String },
}

/// 入站请求校验错误
#[derive(Debug, Error)]
pub enum TriggerError {
    /// JSON 无效或字段不合法
    #[error("请求格式无效: {0}")]
    InvalidPayload(String),
    /// secret 不匹配
    #[error("secret 无效")]
    Forbidden,
}

impl TriggerError {
    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            TriggerError::InvalidPayload(_) => 400,
            TriggerError::Forbidden => 403,
        }
    }
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum QuizError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    /// 剩余时间不足以开始新的一步
    #[error("剩余时间不足: 剩余 {remaining:?}, 至少需要 {required:?}")]
    BudgetExceeded {
        remaining: Duration,
        required: Duration,
    },
}

/// 应用程序结果类型
pub type Result<T, E = QuizError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_error_maps_to_http_status() {
        assert_eq!(TriggerError::InvalidPayload("x".into()).status_code(), 400);
        assert_eq!(TriggerError::Forbidden.status_code(), 403);
    }

    #[test]
    fn quiz_error_wraps_stage_errors_transparently() {
        let err: QuizError = SubmitError::NoSubmitUrl("https://x/q1".into()).into();
        assert_eq!(err.to_string(), "无法确定提交地址: https://x/q1");
    }
}
