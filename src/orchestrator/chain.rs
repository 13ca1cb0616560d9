//! 题目链编排器 - 编排层
//!
//! ## 职责
//!
//! 从起始地址开始，逐题调用 `StepExecutor`，按 `RetryPolicy` 的决定重试或前进，
//! 直到整条链答完、放弃或时间耗尽。
//!
//! ## 时间约束
//!
//! - 整条链有一个固定的截止时间，每步开始前重新计算剩余时间
//! - 剩余时间少于 `min_step_budget` 时不再开始新的一步
//! - 单步时限取 `min(剩余时间, step_timeout)`，超时的步骤会被强制取消
//! - 重试等待时间不超过剩余时间
//!
//! `ChainState` 只在本模块中修改。

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::QuizError;
use crate::infrastructure::ScratchSpace;
use crate::models::{
    ChainReport, ChainState, ChainStatus, Directive, PriorAttempt, QuizStep, StepRecord,
    StepResult, StepStage,
};
use crate::utils::logging::{log_chain_report, log_chain_start};
use crate::workflow::{Collaborators, Credentials, RetryPolicy, StepCtx, StepExecutor};

/// 生成短的题目链 ID
pub fn new_chain_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 题目链编排器
pub struct ChainOrchestrator {
    executor: StepExecutor,
    policy: RetryPolicy,
    credentials: Credentials,
    step_timeout: Duration,
    min_step_budget: Duration,
    max_attempts: u32,
    scratch_root: PathBuf,
}

impl ChainOrchestrator {
    pub fn new(config: &Config, collaborators: Collaborators) -> Self {
        Self {
            executor: StepExecutor::new(collaborators, config),
            policy: RetryPolicy::from_config(config),
            credentials: Credentials::from_config(config),
            step_timeout: config.step_timeout(),
            min_step_budget: config.min_step_budget(),
            max_attempts: config.max_attempts,
            scratch_root: config.scratch_root.clone(),
        }
    }

    /// 使用配置中的身份信息运行一条题目链
    pub async fn run_chain(&self, initial_url: &str, deadline: Instant) -> ChainReport {
        let chain_id = new_chain_id();
        self.run(&chain_id, &self.credentials, initial_url, deadline)
            .await
    }

    /// 运行一条题目链，总是返回报告
    pub async fn run(
        &self,
        chain_id: &str,
        credentials: &Credentials,
        initial_url: &str,
        deadline: Instant,
    ) -> ChainReport {
        let mut state = ChainState::new(chain_id, deadline.saturating_duration_since(Instant::now()));
        log_chain_start(chain_id, initial_url, state.remaining_budget.as_secs());

        let scratch = match ScratchSpace::create(&self.scratch_root, chain_id) {
            Ok(scratch) => scratch,
            Err(e) => {
                error!("[链 {}] ❌ 无法创建临时目录: {}", chain_id, e);
                let report = ChainReport::from_state(state, ChainStatus::Abandoned);
                log_chain_report(&report);
                return report;
            }
        };

        let status = self
            .drive(&mut state, credentials, initial_url, &scratch)
            .await;
        scratch.close();

        let report = ChainReport::from_state(state, status);
        log_chain_report(&report);
        report
    }

    async fn drive(
        &self,
        state: &mut ChainState,
        credentials: &Credentials,
        initial_url: &str,
        scratch: &ScratchSpace,
    ) -> ChainStatus {
        let mut current_url = initial_url.to_string();
        let mut attempt_number = 1;
        state.urls_visited = 1;

        loop {
            let remaining = state.recompute_budget();
            if remaining.is_zero() || remaining < self.min_step_budget {
                let err = QuizError::BudgetExceeded {
                    remaining,
                    required: self.min_step_budget,
                };
                warn!("[链 {}] ⏰ {}", state.chain_id, err);
                return ChainStatus::TimedOut;
            }
            if state.total_attempts >= self.max_attempts {
                warn!(
                    "[链 {}] ⚠️ 已达到最大尝试次数 {}",
                    state.chain_id, self.max_attempts
                );
                return ChainStatus::Exhausted;
            }

            state.total_attempts += 1;
            let step_budget = remaining.min(self.step_timeout);
            let mut step = QuizStep::new(&current_url, attempt_number, step_budget);
            let ctx = StepCtx::new(
                &state.chain_id,
                state.total_attempts,
                &current_url,
                attempt_number,
            );
            let prior = PriorAttempt::collect(&state.history, &current_url);
            let started_at = Utc::now();

            let mut stage = StepStage::Fetch;
            let run = AssertUnwindSafe(self.executor.run_step(
                &ctx,
                credentials,
                scratch,
                &prior,
                step.deadline,
                &mut stage,
            ))
            .catch_unwind();
            let finished = timeout_at(step.deadline, run).await;

            let result = match finished {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => {
                    error!("{} 💥 单步执行 panic，停在 {:?} 阶段", ctx, stage);
                    StepResult::failed(stage, "单步执行发生 panic")
                }
                Err(_) => {
                    warn!("{} ⏰ 单步超时 ({:?})，停在 {:?} 阶段", ctx, step_budget, stage);
                    StepResult::failed(stage, format!("单步超时 ({:?})", step_budget))
                }
            };
            step.outcome = result.outcome;

            // 总时限已到且本步没有答对：不再重试
            let overall_expired = Instant::now() >= state.deadline;
            let directive = if overall_expired && !step.outcome.is_correct() {
                Directive::Stop(ChainStatus::TimedOut)
            } else {
                self.policy
                    .decide(&step.outcome, &current_url, attempt_number, &state.history)
            };

            let elapsed = step.started_at.elapsed();
            info!(
                "{} 结果: {:?}，耗时 {:.2} 秒 → {:?}",
                ctx,
                step.outcome,
                elapsed.as_secs_f64(),
                directive
            );
            state.history.push(StepRecord {
                url: step.url,
                attempt_number,
                outcome: step.outcome,
                submitted: result.submitted,
                started_at,
                elapsed,
            });
            state.recompute_budget();

            match directive {
                Directive::RetrySameUrl { backoff } => {
                    attempt_number += 1;
                    let wait = backoff.min(state.remaining_budget);
                    if !wait.is_zero() {
                        info!("{} ⏳ 等待 {:?} 后重试", ctx, wait);
                        sleep(wait).await;
                    }
                }
                Directive::AdvanceToUrl(next_url) => {
                    info!("{} ➡️ 前往下一题: {}", ctx, next_url);
                    current_url = next_url;
                    attempt_number = 1;
                    state.urls_visited += 1;
                }
                Directive::Stop(status) => return status,
            }
        }
    }
}
