/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use anyhow::{Context, Result};
use std::fs;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// 初始化全局日志
///
/// 同时输出到控制台和 `config.output_log_file`。
/// 设置了 `RUST_LOG` 时以其为准，否则按 `verbose_logging` 选择 debug / info。
pub fn init(config: &Config) -> Result<()> {
    init_log_file(&config.output_log_file)?;

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.output_log_file)
        .with_context(|| format!("无法打开日志文件: {}", config.output_log_file))?;

    let default_level = if config.verbose_logging { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init()
        .context("日志系统初始化失败")?;

    Ok(())
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批量答题日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法写入日志文件: {}", log_file_path))?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 顺序批量答题模式");
    info!("🤖 模型: {} | 温度: {:.1}", config.llm_model_name, config.temperature);
    info!("🧠 角色: {}", config.profile);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 本次运行需要处理的总数
/// - `cost_display`: 已格式化的费用
pub fn print_final_stats(success: usize, failed: usize, total: usize, cost_display: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 本次运行统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("💰 费用: {}", cost_display);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// 将秒数格式化为 `H:MM:SS`
pub fn format_eta(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}
