//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `service` - 入站请求服务
//! - 校验请求（400 / 403）
//! - 持有浏览器等共享资源
//! - 控制并发数量（Semaphore），在后台任务中运行题目链
//!
//! ### `chain` - 题目链编排器
//! - 逐题调用 `StepExecutor`
//! - 维护 `ChainState`（唯一修改者）
//! - 执行总时限与单步时限，按重试策略重试或前进
//!
//! ## 层次关系
//!
//! ```text
//! service (处理入站请求)
//!     ↓
//! chain (处理一条题目链)
//!     ↓
//! workflow::StepExecutor (处理一次尝试)
//!     ↓
//! services (能力层：render / extract / analyze / chart / grade)
//!     ↓
//! infrastructure (基础设施：BrowserTab / ScratchSpace)
//! ```

pub mod chain;
pub mod service;

pub use chain::{new_chain_id, ChainOrchestrator};
pub use service::{AcceptedChain, QuizService};
