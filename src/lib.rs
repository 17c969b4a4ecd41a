//! # AutoDoc
//!
//! 批量答题并生成 Word 文档的 Rust 应用程序，支持断点续跑
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有输出文档，只暴露"追加 / 保存"能力
//! - `DocxDocument` - 唯一的文档 owner
//!
//! ### ② 业务能力层（Services / Clients）
//! - `clients/` - `LlmClient` 远程生成能力（含退避重试）
//! - `services/` - Markdown 转换、费用计算、断点存储
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一道题"的完整处理流程
//! - `QuestionCtx` - 上下文封装（题目索引 + 总数）
//! - `QuestionFlow` - 流程编排（生成 → 转换 → 计费）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 工作任务，顺序处理全部题目
//! - `orchestrator/controller` - 控制端，消费消息并转发用户指令
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{CompletionBackend, LlmClient};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{DocxDocument, MemoryDocument, OutputDocument};
pub use models::{Block, Checkpoint, Run};
pub use orchestrator::{App, BatchProcessor, Notification, RunControl, RunOutcome, RunReport};
pub use workflow::{QuestionCtx, QuestionFlow};
