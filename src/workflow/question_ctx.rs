//! 题目处理上下文
//!
//! 封装"我正在处理哪个来源的第几题"这一信息

use std::fmt::Display;

/// 题目处理上下文
#[derive(Debug, Clone)]
pub struct QuestionCtx {
    /// 题目来源（页面 URL 或图片路径）
    pub source: String,

    /// 题目序号（从1开始）
    pub question_index: usize,

    /// 该来源的题目总数（仅用于日志显示）
    pub total: usize,
}

impl QuestionCtx {
    pub fn new(source: impl Into<String>, question_index: usize, total: usize) -> Self {
        Self {
            source: source.into(),
            question_index,
            total,
        }
    }
}

impl Display for QuestionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[题目 {}/{}]", self.question_index, self.total)
    }
}
