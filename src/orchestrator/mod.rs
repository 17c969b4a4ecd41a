//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责整次运行的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `controller` - 控制端
//! - 管理应用生命周期（初始化、运行、收尾统计）
//! - 启动工作任务，按固定间隔消费消息队列
//! - 把终端指令和 Ctrl-C 转换为暂停 / 取消
//!
//! ### `batch_processor` - 工作任务
//! - 解析断点，顺序遍历题目（Vec<String>）
//! - 创建并复用 QuestionFlow
//! - 每题成功后保存文档、写断点、发送统计
//! - 单题失败只记录，不中断整批
//!
//! ### `run_control` / `notification` - 两端之间的共享状态与消息
//!
//! ## 层次关系
//!
//! ```text
//! controller (App，消费 Notification)
//!     ↓ RunControl / mpsc
//! batch_processor (处理 Vec<String>)
//!     ↓
//! workflow::QuestionFlow (处理单个题目)
//!     ↓
//! clients / services (生成、转换、计费、断点)
//!     ↓
//! infrastructure (输出文档)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：controller 管交互，batch_processor 管循环
//! 2. **资源隔离**：只有工作任务持有文档和断点
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod batch_processor;
pub mod controller;
pub mod notification;
pub mod run_control;

// 重新导出主要类型
pub use batch_processor::{BatchProcessor, RunReport};
pub use controller::{check_preconditions, drain_notifications, App, Command};
pub use notification::{Notification, Notifier, RunOutcome};
pub use run_control::RunControl;
