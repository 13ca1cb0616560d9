//! # Quiz Chain
//!
//! 自动解答网页测验题链：打开题目页面，下载并解析数据文件，请 LLM 读题，
//! 提交答案，再沿着评分接口给出的地址继续下一题，全程受固定总时限约束。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `BrowserTab` - 标签页的唯一持有者，提供导航与 eval() 能力，被取消时也会关闭
//! - `ScratchSpace` - 每条链独占的临时目录
//!
//! ### ② 业务能力层（Services）
//! - `PageRenderer` - 渲染页面、下载文件
//! - `DataExtractor` - 解析 csv / tsv / json / txt / 电子表格 / pdf
//! - `QuestionAnalyzer` - LLM 读题
//! - `ChartRenderer` - 生成柱状图、折线图、散点图
//! - `Grader` - 提交答案
//!
//! ### ③ 流程层（Workflow）
//! - `StepExecutor` - 一次尝试的完整流程（fetch → analyze → submit）
//! - `RetryPolicy` - 根据结果决定重试、前进或结束
//! - `normalize` - 答案规范化
//!
//! ### ④ 编排层（Orchestration）
//! - `ChainOrchestrator` - 运行一条题目链
//! - `QuizService` - 接受请求、控制并发

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{QuizError, Result};
pub use models::{ChainReport, ChainStatus, QuizRequest};
pub use orchestrator::{ChainOrchestrator, QuizService};
pub use workflow::{Collaborators, Credentials, StepExecutor};
