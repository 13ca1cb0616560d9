//! 入站请求模型

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::TriggerError;

/// 启动一条题目链的请求
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuizRequest {
    pub email: String,
    pub secret: String,
    pub url: String,
}

impl QuizRequest {
    /// 解析并校验请求体（不校验 secret）
    pub fn parse(raw: &str) -> Result<Self, TriggerError> {
        let request: QuizRequest = serde_json::from_str(raw)
            .map_err(|e| TriggerError::InvalidPayload(e.to_string()))?;
        request.validate_shape()?;
        Ok(request)
    }

    fn validate_shape(&self) -> Result<(), TriggerError> {
        let email_ok = match self.email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.'),
            None => false,
        };
        if !email_ok {
            return Err(TriggerError::InvalidPayload(format!(
                "email 格式无效: {}",
                self.email
            )));
        }
        let url_ok = Url::parse(&self.url)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
            .unwrap_or(false);
        if !url_ok {
            return Err(TriggerError::InvalidPayload(format!(
                "url 必须是 http(s) 地址: {}",
                self.url
            )));
        }
        Ok(())
    }
}

/// 请求被接受后的即时回执
#[derive(Debug, Clone, Serialize)]
pub struct Accepted {
    pub status: &'static str,
    pub chain_id: String,
    pub received_at: String,
}
