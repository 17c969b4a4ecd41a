//! 控制端 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：加载题目、检查前置条件、打开输出文档
//! 2. **启动工作任务**：`BatchProcessor` 在独立任务中运行
//! 3. **消费消息**：按固定间隔清空消息队列并输出日志
//! 4. **用户指令**：`p` 暂停 / 继续，`s` / `q` 停止，Ctrl-C 停止
//!
//! 控制端不持有文档、断点或统计，只通过 `RunControl` 影响工作任务。

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use crate::clients::LlmClient;
use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::DocxDocument;
use crate::models::{load_questions, RunStats};
use crate::orchestrator::batch_processor::{BatchProcessor, RunReport};
use crate::orchestrator::notification::{Notification, Notifier, RunOutcome};
use crate::orchestrator::run_control::RunControl;
use crate::services::pricing::format_cost;
use crate::services::{progress_key, ProgressStore};
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::QuestionFlow;

/// 用户在终端输入的指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    Stop,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "p" | "pause" | "resume" => Some(Command::TogglePause),
            "s" | "q" | "stop" | "quit" => Some(Command::Stop),
            _ => None,
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    input_path: PathBuf,
    output_path: PathBuf,
    questions: Vec<String>,
}

impl App {
    /// 初始化应用
    ///
    /// 题目为空或未配置 API Key 时返回 `AppError::Precondition`，此时不会启动工作任务。
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);
        if let Some(notice) = config.unknown_profile_notice() {
            warn!("⚠️ {}", notice);
        }

        let input_path = config
            .input_path
            .clone()
            .ok_or_else(|| AppError::precondition("未指定输入文档（AUTODOC_INPUT 或命令行参数）"))?;

        info!("📁 正在读取题目: {}", input_path.display());
        let questions = load_questions(&input_path, config.min_question_length)
            .await
            .with_context(|| format!("无法加载题目: {}", input_path.display()))?;

        check_preconditions(&config, &questions)?;

        let output_path = config.resolve_output_path(&input_path);
        info!("📄 输出文档: {}", output_path.display());

        Ok(Self {
            config,
            input_path,
            output_path,
            questions,
        })
    }

    /// 运行应用主逻辑，直到工作任务结束
    pub async fn run(self) -> Result<RunReport> {
        let document = DocxDocument::open_or_create(&self.output_path)?;
        let control = RunControl::new();
        let (notifier, rx) = Notifier::channel();

        let flow = QuestionFlow::new(LlmClient::from_config(&self.config), &self.config);
        let processor = BatchProcessor::new(
            flow,
            document,
            ProgressStore::new(&self.config.progress_dir),
            progress_key(&self.input_path),
            self.questions,
            control.clone(),
            notifier,
            self.config.pause_poll(),
        );

        info!("💡 输入 p 暂停 / 继续，输入 s 停止，Ctrl-C 也可停止");
        let worker = tokio::spawn(processor.run());
        let ctrl_c = spawn_ctrl_c_listener(control.clone());
        spawn_command_listener(control.clone());

        drain_notifications(rx, self.config.queue_poll(), display_notification).await;
        ctrl_c.abort();

        let report = match worker.await {
            Ok(report) => report,
            Err(e) => {
                error!("🔥 工作任务异常退出: {}", e);
                RunReport {
                    outcome: RunOutcome::Failed(e.to_string()),
                    stats: RunStats::default(),
                    start_index: 0,
                    total: 0,
                    committed: Vec::new(),
                    failed: Vec::new(),
                }
            }
        };

        print_final_stats(
            report.stats.processed_count,
            report.stats.failed_count,
            report.attempted_range(),
            &format_cost(report.stats.cumulative_cost),
        );
        info!("\n答案已保存至: {}", self.output_path.display());
        info!("日志已保存至: {}", self.config.output_log_file);

        Ok(report)
    }
}

/// 检查启动前置条件
pub fn check_preconditions(config: &Config, questions: &[String]) -> Result<(), AppError> {
    if questions.is_empty() {
        return Err(AppError::precondition("输入文档中没有找到题目"));
    }
    if config.llm_api_key.trim().is_empty() {
        return Err(AppError::precondition("未配置 API Key（OPENAI_API_KEY）"));
    }
    Ok(())
}

/// 按固定间隔清空消息队列，直到收到 `Finished` 或发送端全部关闭
///
/// # 返回
/// 收到的最终状态；工作任务未发送 `Finished` 就退出时返回 `None`
pub async fn drain_notifications<F>(
    mut rx: UnboundedReceiver<Notification>,
    poll: Duration,
    mut on_notification: F,
) -> Option<RunOutcome>
where
    F: FnMut(&Notification),
{
    let mut ticker = tokio::time::interval(poll);

    loop {
        ticker.tick().await;
        loop {
            match rx.try_recv() {
                Ok(notification) => {
                    on_notification(&notification);
                    if let Notification::Finished(outcome) = notification {
                        return Some(outcome);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return None,
            }
        }
    }
}

fn display_notification(notification: &Notification) {
    match notification {
        Notification::Log(message) => info!("• {}", message),
        Notification::Progress { percent, label } => info!("📈 进度 {:>3}% ({})", percent, label),
        Notification::Stats { cost_usd, eta } => {
            info!("💰 累计费用: {} | ⏳ 预计剩余: {}", format_cost(*cost_usd), eta)
        }
        Notification::Finished(RunOutcome::Completed) => info!("🎉 运行完成"),
        Notification::Finished(RunOutcome::Cancelled) => info!("⏹️ 运行已停止"),
        Notification::Finished(RunOutcome::Failed(reason)) => error!("🔥 运行失败: {}", reason),
    }
}

fn spawn_ctrl_c_listener(control: RunControl) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⏹️ 收到 Ctrl-C，正在停止...");
            control.cancel();
        }
    })
}

/// 终端指令在独立线程中阻塞读取，进程退出时随之结束
fn spawn_command_listener(control: RunControl) {
    let spawned = std::thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match Command::parse(&line) {
                    Some(Command::TogglePause) => {
                        if control.toggle_pause() {
                            info!("⏸️ 已暂停，输入 p 继续");
                        } else {
                            info!("▶️ 继续运行");
                        }
                    }
                    Some(Command::Stop) => {
                        info!("⏹️ 正在停止...");
                        control.cancel();
                        break;
                    }
                    None => {}
                }
                if control.is_cancelled() {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        warn!("⚠️ 无法启动终端指令监听: {}", e);
    }
}
