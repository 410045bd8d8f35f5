//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use std::fs;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, RunMode};
use crate::error::AppResult;
use crate::workflow::RunStats;

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；否则默认 `info`，`verbose` 时为 `debug`。重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n选择题求解日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    match config.run_mode {
        RunMode::Page => {
            info!("🚀 程序启动 - 页面模式");
            info!("🌐 目标页面: {}", config.target_url);
        }
        RunMode::Image => {
            info!("🚀 程序启动 - 图片模式");
            info!(
                "🖼️ 图片: {}",
                config.image_path.as_deref().unwrap_or("<未指定>")
            );
        }
    }
    info!("🤖 模型: {}", config.llm_model_name);
    info!(
        "🖱️ 自动作答: {}",
        if config.auto_answer { "开启" } else { "关闭" }
    );
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &RunStats, elapsed: Duration, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {} (耗时 {:.1}s)",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        elapsed.as_secs_f64()
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已作答: {}/{}", stats.answered, stats.total);
    info!("🖱️ 已点击: {}", stats.clicked);
    info!("❓ 无法确定: {}", stats.undetermined);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("一二三四五", 3), "一二三...");
    }

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");
        init_log_file(&path.to_string_lossy()).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("选择题求解日志"));
    }
}
