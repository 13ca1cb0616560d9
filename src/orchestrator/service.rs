//! 入站请求服务 - 编排层
//!
//! ## 职责
//!
//! 1. **请求校验**：解析请求体并核对 secret，失败时给出 400 / 403
//! 2. **资源管理**：持有浏览器等外部能力，供所有题目链共享
//! 3. **并发控制**：使用 Semaphore 限制同时运行的题目链数量
//! 4. **后台运行**：请求被接受后立即返回回执，题目链在后台任务中运行

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::browser;
use crate::config::Config;
use crate::error::{QuizError, TriggerError};
use crate::models::{Accepted, ChainReport, QuizRequest};
use crate::orchestrator::chain::{new_chain_id, ChainOrchestrator};
use crate::services::{BrowserRenderer, FileDataExtractor, HttpGrader, LlmAnalyzer, PlotRenderer};
use crate::workflow::{Collaborators, Credentials};

/// 接受请求后返回的回执和后台任务句柄
pub struct AcceptedChain {
    pub receipt: Accepted,
    pub handle: JoinHandle<ChainReport>,
}

/// 题目链服务
pub struct QuizService {
    config: Config,
    orchestrator: Arc<ChainOrchestrator>,
    semaphore: Arc<Semaphore>,
}

impl QuizService {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let orchestrator = Arc::new(ChainOrchestrator::new(&config, collaborators));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_chains.max(1)));
        Self {
            config,
            orchestrator,
            semaphore,
        }
    }

    /// 打开浏览器并组装真实的外部能力
    pub async fn initialize(config: Config) -> Result<Self, QuizError> {
        log_startup(&config);

        let browser = browser::open_browser(&config).await?;
        let collaborators = Collaborators {
            renderer: Arc::new(BrowserRenderer::new(browser, &config)),
            analyzer: Arc::new(LlmAnalyzer::new(&config)),
            extractor: Arc::new(FileDataExtractor::new()),
            charts: Arc::new(PlotRenderer::default()),
            grader: Arc::new(HttpGrader::new()),
        };

        Ok(Self::new(config, collaborators))
    }

    /// 接受一个启动请求
    ///
    /// 校验通过后立即返回；题目链的总时限从此刻开始计算，
    /// 排队等待并发名额的时间也计入其中。
    pub fn accept(&self, raw: &str) -> Result<AcceptedChain, TriggerError> {
        let request = QuizRequest::parse(raw).map_err(|e| {
            warn!("⚠️ 拒绝请求 ({}): {}", e.status_code(), e);
            e
        })?;
        if request.secret != self.config.secret {
            warn!("⚠️ 拒绝请求 (403): {} 的 secret 不匹配", request.email);
            return Err(TriggerError::Forbidden);
        }

        let chain_id = new_chain_id();
        let deadline = Instant::now() + self.config.quiz_timeout();
        info!("📨 [链 {}] 已接受请求: {}", chain_id, request.url);

        let receipt = Accepted {
            status: "accepted",
            chain_id: chain_id.clone(),
            received_at: chrono::Utc::now().to_rfc3339(),
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let semaphore = Arc::clone(&self.semaphore);
        let credentials = Credentials::new(request.email, request.secret);
        let handle = tokio::spawn(async move {
            // 信号量从不关闭
            let _permit = semaphore.acquire_owned().await.ok();
            orchestrator
                .run(&chain_id, &credentials, &request.url, deadline)
                .await
        });

        Ok(AcceptedChain { receipt, handle })
    }
}

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🎯 题目链服务启动");
    info!("{}", "=".repeat(60));
    info!("🤖 模型: {}", config.llm_model_name);
    info!("⏱️ 总时限: {} 秒, 单步时限: {} 秒", config.quiz_timeout_secs, config.step_timeout_secs);
    info!("🔁 单题最多尝试: {} 次", config.max_retries);
    info!("📊 最大并发链数: {}", config.max_concurrent_chains);
    info!("{}", "=".repeat(60));
}
