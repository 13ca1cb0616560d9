use std::env;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;

use quiz_chain::utils::logging;
use quiz_chain::{Config, QuizService};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::load()?;
    config.validate_required()?;

    // 请求体：第一个命令行参数，或由环境变量拼出
    let raw = match env::args().nth(1) {
        Some(raw) => raw,
        None => {
            let url = env::var("QUIZ_URL").context("缺少请求体参数，也没有设置 QUIZ_URL")?;
            json!({
                "email": config.email,
                "secret": config.secret,
                "url": url,
            })
            .to_string()
        }
    };

    let service = QuizService::initialize(config).await?;
    let accepted = service
        .accept(&raw)
        .map_err(|e| anyhow::anyhow!("请求被拒绝 ({}): {}", e.status_code(), e))?;
    info!("回执: {}", serde_json::to_string(&accepted.receipt)?);

    let report = accepted.handle.await.context("题目链任务异常退出")?;
    info!("报告: {}", serde_json::to_string(&report)?);

    Ok(())
}
