//! 警告写入服务 - 业务能力层
//!
//! 只负责"写 warn.txt"能力，不关心流程

use std::fs::OpenOptions;
use std::io::Write;

use chrono::Local;
use tracing::debug;

use crate::error::AppResult;

/// 警告写入服务
///
/// 职责：
/// - 将无法确定答案的题目追加到警告文件，供人工处理
/// - 只处理单个题目
pub struct WarnWriter {
    warn_file_path: String,
}

impl WarnWriter {
    pub fn new() -> Self {
        Self::with_path("warn.txt")
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            warn_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.warn_file_path
    }

    /// 写入一条警告
    ///
    /// - `source`: 题目来源（URL 或图片路径）
    /// - `question_index`: 题目序号（从 1 开始）
    /// - `detail`: 题干和模型回答等信息
    pub fn write(&self, source: &str, question_index: usize, detail: &str) -> AppResult<()> {
        debug!(
            "写入警告: 来源 {} | 题目 {} | 内容长度: {}",
            source,
            question_index,
            detail.len()
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.warn_file_path)?;

        let warn_msg = format!(
            "[{}] 来源 {} | 题目 {} | {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            source,
            question_index,
            detail.replace('\n', " ")
        );
        file.write_all(warn_msg.as_bytes())?;

        Ok(())
    }
}

impl Default for WarnWriter {
    fn default() -> Self {
        Self::new()
    }
}
