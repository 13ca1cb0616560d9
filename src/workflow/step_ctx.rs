//! 单步上下文
//!
//! 封装"我正在处理哪条链的第几步"这一信息

use std::fmt::Display;

/// 单步上下文
#[derive(Debug, Clone)]
pub struct StepCtx {
    /// 题目链 ID
    pub chain_id: String,

    /// 本链中的第几步（从 1 开始，仅用于日志显示）
    pub step_number: u32,

    /// 题目地址
    pub url: String,

    /// 在该地址上的第几次尝试（从 1 开始）
    pub attempt_number: u32,
}

impl StepCtx {
    pub fn new(chain_id: &str, step_number: u32, url: &str, attempt_number: u32) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            step_number,
            url: url.to_string(),
            attempt_number,
        }
    }
}

impl Display for StepCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[链 {} 第{}步 尝试#{}]",
            self.chain_id, self.step_number, self.attempt_number
        )
    }
}
