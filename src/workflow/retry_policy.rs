//! 重试策略
//!
//! 根据单步结果决定下一步：同一地址重试、前往下一题，或结束整条链。
//! 纯函数，不做任何 I/O，也不读取时钟。

use std::time::Duration;

use crate::config::Config;
use crate::models::{ChainStatus, Directive, StepOutcome, StepRecord, StepStage};

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 同一地址的最大尝试次数
    pub max_retries: u32,
    /// 抓取或提交失败后的等待时间
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }

    /// 决定下一步
    ///
    /// `history` 不包含本步。
    ///
    /// - 答对且有下一题：前往下一题（下一题已答对过则视为循环，放弃）
    /// - 答对且没有下一题：整条链完成
    /// - 答错但评分接口给了下一题：前往下一题
    /// - 答错：未达上限时立即重试，否则 `Exhausted`
    /// - 出错：未达上限时重试（抓取/提交失败先等待），否则 `Abandoned`
    pub fn decide(
        &self,
        outcome: &StepOutcome,
        current_url: &str,
        attempt_number: u32,
        history: &[StepRecord],
    ) -> Directive {
        let can_retry = attempt_number < self.max_retries;

        match outcome {
            StepOutcome::Correct { next_url } => self.advance(next_url, current_url, history),
            StepOutcome::ChainComplete => Directive::Stop(ChainStatus::Solved),
            StepOutcome::Incorrect {
                next_url: Some(next_url),
                ..
            } if next_url != current_url => self.advance(next_url, current_url, history),
            StepOutcome::Incorrect { .. } => {
                if can_retry {
                    Directive::RetrySameUrl {
                        backoff: Duration::ZERO,
                    }
                } else {
                    Directive::Stop(ChainStatus::Exhausted)
                }
            }
            StepOutcome::Error { stage, .. } => {
                if !can_retry {
                    return Directive::Stop(ChainStatus::Abandoned);
                }
                let backoff = match stage {
                    StepStage::Fetch | StepStage::Submit => self.backoff,
                    StepStage::Analyze => Duration::ZERO,
                };
                Directive::RetrySameUrl { backoff }
            }
            StepOutcome::Pending => Directive::Stop(ChainStatus::Abandoned),
        }
    }

    fn advance(&self, next_url: &str, current_url: &str, history: &[StepRecord]) -> Directive {
        let already_solved = next_url == current_url
            || history
                .iter()
                .any(|record| record.url == next_url && record.outcome.is_correct());
        if already_solved {
            Directive::Stop(ChainStatus::Abandoned)
        } else {
            Directive::AdvanceToUrl(next_url.to_string())
        }
    }
}
