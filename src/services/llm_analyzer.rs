//! 题目分析服务 - 业务能力层
//!
//! 只负责"LLM 读题并给出候选答案"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use std::sync::OnceLock;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::AnalysisError;
use crate::models::{
    AnswerCandidate, ChartRequest, DeclaredType, PriorAttempt, RenderedPage, TabularData,
};
use crate::utils::logging::truncate_text;

/// 分析器的输入
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub page: &'a RenderedPage,
    /// 成功解析的数据表（部分文件可能解析失败）
    pub tables: &'a [TabularData],
    /// 同一题目之前被判错的答案
    pub prior: &'a [PriorAttempt],
}

/// 题目分析能力
#[async_trait]
pub trait QuestionAnalyzer: Send + Sync {
    async fn analyze(&self, input: AnalysisInput<'_>) -> Result<AnswerCandidate, AnalysisError>;
}

const PAGE_TEXT_LIMIT: usize = 8000;
const DATA_LIMIT: usize = 10000;
const PREVIEW_ROWS: usize = 20;

/// LLM 分析器
///
/// 职责：
/// - 把页面文本、数据表和之前的错误答案组织成提示词
/// - 调用 LLM 并把返回的 JSON 解析成 `AnswerCandidate`
/// - 不提交答案，不关心重试
pub struct LlmAnalyzer {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmAnalyzer {
    /// 创建新的 LLM 分析器
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<String, AnalysisError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let api_failed = |message: String| AnalysisError::ApiCallFailed {
            model: self.model_name.clone(),
            message,
        };

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| api_failed(e.to_string()))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| api_failed(e.to_string()))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.2)
            .max_tokens(2048u32)
            .build()
            .map_err(|e| api_failed(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            api_failed(e.to_string())
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AnalysisError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl QuestionAnalyzer for LlmAnalyzer {
    async fn analyze(&self, input: AnalysisInput<'_>) -> Result<AnswerCandidate, AnalysisError> {
        let (user_message, system_message) = build_analysis_messages(input);
        let response = self.send_to_llm(&user_message, Some(&system_message)).await?;
        debug!("LLM 响应: {}", truncate_text(&response, 300));
        parse_analysis_response(&response)
    }
}

/// 构建读题用的消息
///
/// 返回 (user_message, system_message)
pub fn build_analysis_messages(input: AnalysisInput<'_>) -> (String, String) {
    let system_message = "你是一个数据分析助手，负责解答网页上的测验题。\
                          你会拿到题目页面的文本、页面中的链接以及已下载数据文件的内容摘要。\
                          只输出一个 JSON 对象，不要输出任何解释。"
        .to_string();

    let links = serde_json::to_string_pretty(&input.page.links).unwrap_or_default();

    let mut data = String::new();
    for table in input.tables {
        data.push_str(&table.preview(PREVIEW_ROWS));
        data.push('\n');
    }
    if data.is_empty() {
        data = "无".to_string();
    }

    let prior = if input.prior.is_empty() {
        "无".to_string()
    } else {
        input
            .prior
            .iter()
            .enumerate()
            .map(|(i, attempt)| {
                format!(
                    "  {}. 答案 {} 被判错，原因: {}",
                    i + 1,
                    attempt.answer.to_json(),
                    attempt.reason.as_deref().unwrap_or("未说明")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let user_message = format!(
        r#"请解答下面的测验题。

【题目页面文本】
{}

【#result 元素文本】
{}

【页面链接】
{}

【数据文件】
{}

【之前被判错的答案】（不要再给出相同的答案）
{}

【输出格式】
{{
    "answer": 答案本身,
    "answer_type": "number|string|boolean|object|image",
    "chart": {{"kind": "bar|line|scatter", "x_column": "类别列（散点图为横轴数值列）", "y_column": "数值列", "title": "标题", "source": "数据表来源"}}
}}
- 数字只写数字，不要单位
- 布尔值写 true 或 false
- 需要提交图表时 answer_type 为 image，并填写 chart；否则省略 chart"#,
        truncate_text(&input.page.text, PAGE_TEXT_LIMIT),
        input.page.result_text,
        links,
        truncate_text(&data, DATA_LIMIT),
        prior
    );

    (user_message, system_message)
}

fn json_object_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\{.*\}").ok()).as_ref()
}

/// 从 LLM 响应中解析候选答案
pub fn parse_analysis_response(response: &str) -> Result<AnswerCandidate, AnalysisError> {
    let unparsable = || AnalysisError::UnparsableResponse(truncate_text(response, 200));

    let object = json_object_pattern()
        .and_then(|pattern| pattern.find(response))
        .ok_or_else(unparsable)?;
    let value: JsonValue = serde_json::from_str(object.as_str()).map_err(|_| unparsable())?;

    let answer = value.get("answer").cloned().ok_or_else(unparsable)?;
    let tag = value
        .get("answer_type")
        .and_then(JsonValue::as_str)
        .ok_or(AnalysisError::MissingAnswerType)?;
    let declared_type = DeclaredType::parse(tag)
        .ok_or_else(|| AnalysisError::UnknownAnswerType(tag.to_string()))?;

    let mut candidate = AnswerCandidate::new(answer, declared_type);
    if let Some(chart) = value.get("chart").filter(|c| c.is_object()) {
        match serde_json::from_value::<ChartRequest>(chart.clone()) {
            Ok(chart) => candidate = candidate.with_chart(chart),
            Err(e) => warn!("图表参数无法解析，忽略: {}", e),
        }
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WireValue;
    use serde_json::json;

    #[test]
    fn parse_response_inside_code_fence() {
        let response = "```json\n{\"answer\": \"42\", \"answer_type\": \"number\"}\n```";
        let candidate = parse_analysis_response(response).unwrap();
        assert_eq!(candidate.value, json!("42"));
        assert_eq!(candidate.declared_type, DeclaredType::Number);
        assert!(candidate.chart.is_none());
    }

    #[test]
    fn parse_response_with_chart() {
        let response = r#"{"answer": "chart", "answer_type": "image",
            "chart": {"x_column": "city", "y_column": "amount"}}"#;
        let candidate = parse_analysis_response(response).unwrap();
        assert_eq!(candidate.declared_type, DeclaredType::Image);
        let chart = candidate.chart.unwrap();
        assert_eq!(chart.y_column, "amount");
        assert_eq!(chart.kind, crate::models::ChartKind::Bar);

        let response = r#"{"answer": "trend", "answer_type": "chart",
            "chart": {"kind": "line", "x_column": "month", "y_column": "sales"}}"#;
        let chart = parse_analysis_response(response).unwrap().chart.unwrap();
        assert_eq!(chart.kind, crate::models::ChartKind::Line);
    }

    #[test]
    fn parse_response_errors() {
        assert!(matches!(
            parse_analysis_response("I think the answer is 42"),
            Err(AnalysisError::UnparsableResponse(_))
        ));
        assert!(matches!(
            parse_analysis_response(r#"{"answer_type": "number"}"#),
            Err(AnalysisError::UnparsableResponse(_))
        ));
        assert!(matches!(
            parse_analysis_response(r#"{"answer": 1, "answer_type": "matrix"}"#),
            Err(AnalysisError::UnknownAnswerType(_))
        ));
    }

    #[test]
    fn missing_or_non_text_type_is_rejected() {
        for response in [
            r#"{"answer": "hello"}"#,
            r#"{"answer": "hello", "answer_type": null}"#,
            r#"{"answer": 3, "answer_type": 1}"#,
        ] {
            assert!(matches!(
                parse_analysis_response(response),
                Err(AnalysisError::MissingAnswerType)
            ));
        }
    }

    #[test]
    fn messages_include_prior_rejections() {
        let page = RenderedPage {
            url: "https://x/q1".to_string(),
            text: "What is the sum of the amount column?".to_string(),
            ..Default::default()
        };
        let prior = vec![PriorAttempt {
            answer: WireValue::Number(41.into()),
            reason: Some("Off by one".to_string()),
        }];
        let (user, system) = build_analysis_messages(AnalysisInput {
            page: &page,
            tables: &[],
            prior: &prior,
        });
        assert!(system.contains("JSON"));
        assert!(user.contains("What is the sum"));
        assert!(user.contains("答案 41 被判错，原因: Off by one"));
    }

    /// 测试真实 LLM 调用
    #[tokio::test]
    #[ignore]
    async fn test_analyze_live() {
        let _ = tracing_subscriber::fmt::try_init();
        let config = Config::load().unwrap();
        let analyzer = LlmAnalyzer::new(&config);
        let page = RenderedPage {
            url: "https://x/q1".to_string(),
            text: "What is 6 times 7? Answer with a number.".to_string(),
            ..Default::default()
        };
        let candidate = analyzer
            .analyze(AnalysisInput {
                page: &page,
                tables: &[],
                prior: &[],
            })
            .await
            .unwrap();
        println!("候选答案: {:?}", candidate);
        assert_eq!(candidate.declared_type, DeclaredType::Number);
    }
}
