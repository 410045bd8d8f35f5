use anyhow::Result;
use mcq_solver::utils::logging;
use mcq_solver::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置（日志尚未初始化，先读 VERBOSE_LOGGING 决定级别）
    let config = Config::load();
    let verbose = config.as_ref().map(|c| c.verbose_logging).unwrap_or(false);
    logging::init(verbose);
    let config = config?;

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
