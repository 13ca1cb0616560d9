//! 单步执行流程 - 流程层
//!
//! 核心职责：定义"一道题的一次尝试"的完整流程
//!
//! 流程顺序：
//! 1. 渲染页面 → 下载并解析数据文件（失败不致命）
//! 2. LLM 读题 → 需要时画图 → 规范化答案
//! 3. 确定提交地址 → 提交一次 → 解读评分结果
//!
//! 每个外部调用都受本步截止时间约束。本模块不做重试，
//! 所有失败都转换成 `StepOutcome::Error` 交给重试策略。

use std::sync::Arc;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AnalysisError, FetchError, QuizError, SubmitError};
use crate::infrastructure::ScratchSpace;
use crate::models::{
    DeclaredType, PriorAttempt, RenderedPage, StepOutcome, StepResult, StepStage, TabularData,
    WireValue,
};
use crate::services::chart_renderer::select_table;
use crate::services::grader::resolve_submit_url;
use crate::services::{
    AnalysisInput, ChartRenderer, DataExtractor, GradeResponse, Grader, PageRenderer,
    QuestionAnalyzer, Submission,
};
use crate::utils::logging::truncate_text;
use crate::workflow::normalizer::normalize;
use crate::workflow::step_ctx::StepCtx;

/// 候选答案与被判错的答案重复时，最多再问几次
const ANALYSIS_ROUNDS: usize = 2;

/// 单步所依赖的外部能力
#[derive(Clone)]
pub struct Collaborators {
    pub renderer: Arc<dyn PageRenderer>,
    pub analyzer: Arc<dyn QuestionAnalyzer>,
    pub extractor: Arc<dyn DataExtractor>,
    pub charts: Arc<dyn ChartRenderer>,
    pub grader: Arc<dyn Grader>,
}

/// 提交答案时携带的身份信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.email.clone(), config.secret.clone())
    }
}

/// 单步执行器
///
/// - 编排一次尝试的完整流程
/// - 不持有链状态，不决定是否重试
/// - 只依赖业务能力（services）
pub struct StepExecutor {
    collaborators: Collaborators,
    submit_url: Option<String>,
}

impl StepExecutor {
    pub fn new(collaborators: Collaborators, config: &Config) -> Self {
        Self {
            collaborators,
            submit_url: config.submit_url.clone(),
        }
    }

    /// 执行一步
    ///
    /// `stage` 随流程推进而更新，调用方在本步被强制取消时据此判断停在哪个阶段。
    pub async fn run_step(
        &self,
        ctx: &StepCtx,
        credentials: &Credentials,
        scratch: &ScratchSpace,
        prior: &[PriorAttempt],
        deadline: Instant,
        stage: &mut StepStage,
    ) -> StepResult {
        // ========== 阶段 1: 抓取 ==========
        *stage = StepStage::Fetch;
        info!("{} 🌐 抓取题目页面: {}", ctx, ctx.url);
        let page = match self.fetch(ctx, deadline).await {
            Ok(page) => page,
            Err(e) => {
                warn!("{} ❌ 抓取失败: {}", ctx, e);
                return StepResult::failed(StepStage::Fetch, e);
            }
        };
        let tables = self.collect_tables(ctx, &page, scratch, deadline).await;

        // ========== 阶段 2: 分析 ==========
        *stage = StepStage::Analyze;
        let answer = match self.propose_answer(ctx, &page, &tables, prior, deadline).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("{} ❌ 分析失败: {}", ctx, e);
                return StepResult::failed(StepStage::Analyze, e);
            }
        };
        info!(
            "{} 💡 候选答案: {}",
            ctx,
            truncate_text(&answer.to_json().to_string(), 120)
        );

        // ========== 阶段 3: 提交 ==========
        *stage = StepStage::Submit;
        let response = match self.submit(ctx, credentials, &page, &answer, deadline).await {
            Ok(response) => response,
            Err(e) => {
                warn!("{} ❌ 提交失败: {}", ctx, e);
                return StepResult::failed(StepStage::Submit, e);
            }
        };

        let outcome = interpret(&response);
        match &outcome {
            StepOutcome::Correct { next_url } => info!("{} ✅ 回答正确，下一题: {}", ctx, next_url),
            StepOutcome::ChainComplete => info!("{} 🏁 回答正确，没有下一题", ctx),
            StepOutcome::Incorrect { reason, .. } => info!(
                "{} ✗ 回答错误: {}",
                ctx,
                reason.as_deref().unwrap_or("未说明原因")
            ),
            _ => {}
        }

        StepResult {
            outcome,
            submitted: Some(answer),
        }
    }

    async fn fetch(&self, ctx: &StepCtx, deadline: Instant) -> Result<RenderedPage, FetchError> {
        let limit = deadline.saturating_duration_since(Instant::now());
        match timeout_at(deadline, self.collaborators.renderer.render(&ctx.url, limit)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: ctx.url.clone(),
                timeout: limit,
            }),
        }
    }

    /// 下载并解析页面中的数据文件，单个文件失败只记录日志
    async fn collect_tables(
        &self,
        ctx: &StepCtx,
        page: &RenderedPage,
        scratch: &ScratchSpace,
        deadline: Instant,
    ) -> Vec<TabularData> {
        let mut tables = Vec::new();

        for link in &page.files {
            let file = match timeout_at(
                deadline,
                self.collaborators.renderer.download(link, scratch),
            )
            .await
            {
                Ok(Ok(file)) => file,
                Ok(Err(e)) => {
                    warn!("{} ⚠️ 跳过文件: {}", ctx, e);
                    continue;
                }
                Err(_) => {
                    warn!("{} ⚠️ 下载 {} 时本步时间耗尽", ctx, link.url);
                    break;
                }
            };

            match timeout_at(deadline, self.collaborators.extractor.extract_all(&file)).await {
                Ok(Ok(extracted)) => {
                    for table in extracted {
                        debug!("{} 📄 {} 解析出 {} 行", ctx, table.source, table.rows.len());
                        tables.push(table);
                    }
                }
                Ok(Err(e)) => warn!("{} ⚠️ 解析失败，跳过: {}", ctx, e),
                Err(_) => {
                    warn!("{} ⚠️ 解析 {} 时本步时间耗尽", ctx, file.name);
                    break;
                }
            }
        }

        if !page.files.is_empty() {
            info!(
                "{} 📊 数据文件 {} 个，得到 {} 张表",
                ctx,
                page.files.len(),
                tables.len()
            );
        }
        tables
    }

    /// 读题并得到规范化后的答案
    ///
    /// 与之前被判错的答案相同时重新分析一次，仍然相同则报错，不重复提交。
    async fn propose_answer(
        &self,
        ctx: &StepCtx,
        page: &RenderedPage,
        tables: &[TabularData],
        prior: &[PriorAttempt],
        deadline: Instant,
    ) -> Result<WireValue, QuizError> {
        let mut duplicate = None;

        for round in 1..=ANALYSIS_ROUNDS {
            let limit = deadline.saturating_duration_since(Instant::now());
            let input = AnalysisInput {
                page,
                tables,
                prior,
            };
            let mut candidate =
                match timeout_at(deadline, self.collaborators.analyzer.analyze(input)).await {
                    Ok(result) => result?,
                    Err(_) => return Err(AnalysisError::Timeout(limit).into()),
                };

            if candidate.declared_type == DeclaredType::Image && candidate.image.is_none() {
                if let Some(chart) = &candidate.chart {
                    let rendered = select_table(tables, chart)
                        .and_then(|table| self.collaborators.charts.render(table, chart));
                    match rendered {
                        Ok(bytes) => candidate.image = Some(bytes),
                        Err(e) => warn!("{} ⚠️ 图表生成失败，提交不含图片的答案: {}", ctx, e),
                    }
                }
            }

            let answer = normalize(&candidate)?;
            if !prior.iter().any(|attempt| attempt.answer.same_answer(&answer)) {
                return Ok(answer);
            }

            warn!(
                "{} 🔁 第 {} 次分析得到的答案已被判错过，重新分析",
                ctx, round
            );
            duplicate = Some(answer);
        }

        let answer = duplicate.map(|a| a.to_json().to_string()).unwrap_or_default();
        Err(AnalysisError::DuplicateAnswer(answer).into())
    }

    async fn submit(
        &self,
        ctx: &StepCtx,
        credentials: &Credentials,
        page: &RenderedPage,
        answer: &WireValue,
        deadline: Instant,
    ) -> Result<GradeResponse, SubmitError> {
        let submit_url = resolve_submit_url(page, self.submit_url.as_deref())?;
        info!("{} 📤 提交到: {}", ctx, submit_url);

        let submission = Submission {
            email: credentials.email.clone(),
            secret: credentials.secret.clone(),
            url: ctx.url.clone(),
            answer: answer.clone(),
        };
        let limit = deadline.saturating_duration_since(Instant::now());
        match timeout_at(
            deadline,
            self.collaborators
                .grader
                .submit(&submit_url, &submission, limit),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SubmitError::Timeout(limit)),
        }
    }
}

/// 把评分结果转换成单步结果
fn interpret(response: &GradeResponse) -> StepOutcome {
    match (response.correct, response.next_url()) {
        (true, Some(next_url)) => StepOutcome::Correct {
            next_url: next_url.to_string(),
        },
        (true, None) => StepOutcome::ChainComplete,
        (false, next_url) => StepOutcome::Incorrect {
            reason: response.reason.clone(),
            next_url: next_url.map(str::to_string),
        },
    }
}
