/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::{ChainReport, ChainStatus};

/// 初始化日志
///
/// 默认级别 `info`，可以通过 `RUST_LOG` 覆盖。重复调用不会报错。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录题目链启动信息
pub fn log_chain_start(chain_id: &str, url: &str, budget_secs: u64) {
    info!("{}", "=".repeat(60));
    info!("🚀 [链 {}] 开始解题", chain_id);
    info!("🔗 起始地址: {}", url);
    info!("⏱️ 总时限: {} 秒", budget_secs);
    info!("{}", "=".repeat(60));
}

/// 打印最终报告
pub fn log_chain_report(report: &ChainReport) {
    let icon = match report.status {
        ChainStatus::Solved => "✅",
        ChainStatus::Exhausted => "⚠️",
        ChainStatus::TimedOut => "⏰",
        ChainStatus::Abandoned => "❌",
    };
    info!("\n{}", "=".repeat(60));
    info!("📊 [链 {}] 解题结束", report.chain_id);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("{} 状态: {:?}", icon, report.status);
    info!("🔗 访问题目数: {}", report.urls_visited);
    info!("🔁 总尝试次数: {}", report.total_attempts);
    info!("⏱️ 总耗时: {:.2} 秒", report.elapsed.as_secs_f64());
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
