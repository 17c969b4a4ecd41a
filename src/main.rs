use std::path::PathBuf;

use anyhow::Result;
use autodoc::utils::logging;
use autodoc::{App, Config, RunOutcome};
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config_path = std::env::var("AUTODOC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("autodoc.toml"));
    let mut config = Config::load(Some(&config_path))?;

    // 命令行参数优先于配置中的输入文档
    if let Some(input) = std::env::args().nth(1) {
        config.input_path = Some(PathBuf::from(input));
    }

    // 初始化日志
    logging::init(&config)?;

    // 初始化并运行应用
    let app = match App::initialize(config).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ {:#}", e);
            return Err(e);
        }
    };
    let report = app.run().await?;

    if let RunOutcome::Failed(reason) = &report.outcome {
        anyhow::bail!("运行失败: {}", reason);
    }

    Ok(())
}
