//! 题目链状态模型
//!
//! `QuizStep` 描述某个 URL 上的一次尝试；`ChainState` 是唯一跨步骤存活的实体，
//! 只由编排器持有和修改。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::answer::WireValue;

/// 单步执行到达的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStage {
    Fetch,
    Analyze,
    Submit,
}

/// 单步结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    /// 尚未执行完
    Pending,
    /// 答对，评分接口给出了下一题
    Correct { next_url: String },
    /// 答对，且没有下一题
    ChainComplete,
    /// 答错；`reason` 是评分接口的原始文本，只记录不解析
    Incorrect {
        reason: Option<String>,
        next_url: Option<String>,
    },
    /// 某个阶段失败
    Error { stage: StepStage, message: String },
}

impl StepOutcome {
    pub fn error(stage: StepStage, err: impl std::fmt::Display) -> Self {
        StepOutcome::Error {
            stage,
            message: err.to_string(),
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, StepOutcome::Correct { .. } | StepOutcome::ChainComplete)
    }
}

/// 单步执行结果：结果 + 实际提交的答案
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub outcome: StepOutcome,
    pub submitted: Option<WireValue>,
}

impl StepResult {
    pub fn failed(stage: StepStage, err: impl std::fmt::Display) -> Self {
        Self {
            outcome: StepOutcome::error(stage, err),
            submitted: None,
        }
    }
}

/// 某个 URL 上的一次尝试
#[derive(Debug, Clone)]
pub struct QuizStep {
    pub url: String,
    /// 从 1 开始；换 URL 时重置，同 URL 重试时递增
    pub attempt_number: u32,
    pub started_at: Instant,
    pub deadline: Instant,
    pub outcome: StepOutcome,
}

impl QuizStep {
    pub fn new(url: impl Into<String>, attempt_number: u32, budget: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            url: url.into(),
            attempt_number,
            started_at,
            deadline: started_at + budget,
            outcome: StepOutcome::Pending,
        }
    }
}

/// 已完成步骤的摘要（诊断用）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub url: String,
    pub attempt_number: u32,
    pub outcome: StepOutcome,
    pub submitted: Option<WireValue>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// 之前在同一 URL 上被判错的答案
#[derive(Debug, Clone, PartialEq)]
pub struct PriorAttempt {
    pub answer: WireValue,
    pub reason: Option<String>,
}

impl PriorAttempt {
    /// 从历史中取出某个 URL 上已提交过的答案
    pub fn collect(history: &[StepRecord], url: &str) -> Vec<PriorAttempt> {
        history
            .iter()
            .filter(|record| record.url == url)
            .filter_map(|record| {
                let answer = record.submitted.clone()?;
                let reason = match &record.outcome {
                    StepOutcome::Incorrect { reason, .. } => reason.clone(),
                    _ => None,
                };
                Some(PriorAttempt { answer, reason })
            })
            .collect()
    }
}

/// 题目链的最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChainStatus {
    Solved,
    TimedOut,
    Abandoned,
    Exhausted,
}

/// 重试策略的决定
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// 在同一 URL 上重新分析，之前先等待 `backoff`
    RetrySameUrl { backoff: Duration },
    /// 前往评分接口给出的下一题
    AdvanceToUrl(String),
    Stop(ChainStatus),
}

/// 跨步骤存活的链状态
#[derive(Debug)]
pub struct ChainState {
    pub chain_id: String,
    pub started_at: Instant,
    pub deadline: Instant,
    /// 距离总时限的剩余时间，只减不增
    pub remaining_budget: Duration,
    /// 整条链累计的尝试次数
    pub total_attempts: u32,
    pub urls_visited: u32,
    /// 按完成顺序追加的步骤摘要
    pub history: Vec<StepRecord>,
}

impl ChainState {
    pub fn new(chain_id: impl Into<String>, budget: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            chain_id: chain_id.into(),
            started_at,
            deadline: started_at + budget,
            remaining_budget: budget,
            total_attempts: 0,
            urls_visited: 0,
            history: Vec::new(),
        }
    }

    /// 重新计算剩余时间
    pub fn recompute_budget(&mut self) -> Duration {
        self.remaining_budget = self.deadline.saturating_duration_since(Instant::now());
        self.remaining_budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// 题目链报告
#[derive(Debug, Clone, Serialize)]
pub struct ChainReport {
    pub chain_id: String,
    pub status: ChainStatus,
    pub urls_visited: u32,
    pub total_attempts: u32,
    pub elapsed: Duration,
    pub history: Vec<StepRecord>,
}

impl ChainReport {
    pub fn from_state(state: ChainState, status: ChainStatus) -> Self {
        let elapsed = state.elapsed();
        Self {
            chain_id: state.chain_id,
            status,
            urls_visited: state.urls_visited,
            total_attempts: state.total_attempts,
            elapsed,
            history: state.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, outcome: StepOutcome, submitted: Option<WireValue>) -> StepRecord {
        StepRecord {
            url: url.to_string(),
            attempt_number: 1,
            outcome,
            submitted,
            started_at: Utc::now(),
            elapsed: Duration::from_secs(1),
        }
    }

    #[test]
    fn prior_attempts_only_include_submitted_answers_for_url() {
        let history = vec![
            record(
                "https://x/q1",
                StepOutcome::Incorrect {
                    reason: Some("too small".into()),
                    next_url: None,
                },
                Some(WireValue::Text("a".into())),
            ),
            record(
                "https://x/q1",
                StepOutcome::error(StepStage::Fetch, "timeout"),
                None,
            ),
            record(
                "https://x/q0",
                StepOutcome::ChainComplete,
                Some(WireValue::Bool(true)),
            ),
        ];

        let prior = PriorAttempt::collect(&history, "https://x/q1");
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[0].answer, WireValue::Text("a".into()));
        assert_eq!(prior[0].reason.as_deref(), Some("too small"));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_budget_never_goes_negative() {
        let mut state = ChainState::new("c1", Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(state.recompute_budget(), Duration::ZERO);
    }
}
