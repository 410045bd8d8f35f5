//! 题目处理流程 - 流程层
//!
//! 核心职责：定义"一道题"的完整处理流程
//!
//! 流程顺序：
//! 1. 渲染提示词 → 询问模型（失败或空回答时重试）
//! 2. 答案匹配级联 → 选项索引
//! 3. 自动作答（只有页面元素来源的选项才能点击）
//! 4. 无法确定答案时写入 warn.txt（兜底）

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{ElementClicker, PageHandle};
use crate::models::question::{MatchResult, Question};
use crate::services::llm_service::{ask_with_retries, option_label, render_prompt};
use crate::services::{AnswerResolver, CompletionProvider, WarnWriter};
use crate::utils::logging::truncate_text;
use crate::workflow::outcome::QuestionOutcome;
use crate::workflow::question_ctx::QuestionCtx;

/// 模型调用失败后的重试间隔
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// 自动作答的目标页面
#[derive(Clone, Copy)]
pub struct AnswerTarget<'a> {
    /// 检测时使用的页面快照（判断元素可见 / 可用）
    pub page: &'a dyn PageHandle,
    pub clicker: &'a dyn ElementClicker,
}

/// 题目处理流程
///
/// - 编排单道题的完整处理流程
/// - 不持有任何资源（page）
/// - 只依赖业务能力（services）
pub struct QuestionFlow {
    provider: Arc<dyn CompletionProvider>,
    resolver: AnswerResolver,
    warn_writer: WarnWriter,
    prompt_template: Option<String>,
    max_retries: usize,
    retry_delay: Duration,
    auto_answer: bool,
    answer_delay: Duration,
}

impl QuestionFlow {
    pub fn new(config: &Config, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            resolver: AnswerResolver::new(config.resolver_config()),
            warn_writer: WarnWriter::with_path(&config.warn_file),
            prompt_template: config.prompt_template.clone(),
            max_retries: config.max_retries,
            retry_delay: RETRY_DELAY,
            auto_answer: config.auto_answer,
            answer_delay: Duration::from_millis(config.answer_delay_ms),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub async fn run(
        &self,
        question: &Question,
        ctx: &QuestionCtx,
        target: Option<AnswerTarget<'_>>,
    ) -> QuestionOutcome {
        info!("{} 题干: {}", ctx, truncate_text(&question.text, 80));

        // ========== 询问模型 ==========
        let prompt = render_prompt(self.prompt_template.as_deref(), question);
        let response = match ask_with_retries(
            self.provider.as_ref(),
            &prompt,
            self.max_retries,
            self.retry_delay,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("{} ❌ 模型调用彻底失败 (已尝试 {} 次): {}", ctx, self.max_retries, e);
                self.write_warn(ctx, question, &format!("模型调用失败: {}", e));
                return QuestionOutcome::Failed(e.to_string());
            }
        };
        info!("{} 模型回答: {}", ctx, truncate_text(&response, 60));

        // ========== 答案匹配 ==========
        let (index, strategy) = match self.resolver.resolve(&response, &question.option_texts()) {
            MatchResult::Resolved { index, strategy } => (index, strategy),
            MatchResult::Unresolved => {
                warn!("{} ⚠️ 无法把回答映射到选项，写入 warn.txt", ctx);
                self.write_warn(ctx, question, &format!("模型回答: {}", response));
                return QuestionOutcome::Undetermined;
            }
        };
        let option = &question.options[index];
        info!(
            "{} ✓ 答案: {}. {} (策略: {})",
            ctx,
            option_label(index),
            option.text,
            strategy
        );

        // ========== 自动作答 ==========
        let clicked = match (self.auto_answer, target, option.source_handle) {
            (true, Some(target), Some(node)) => {
                if !self.answer_delay.is_zero() {
                    tokio::time::sleep(self.answer_delay).await;
                }
                let allow_pointer = target.page.is_visible(node) && target.page.is_enabled(node);
                match target.clicker.click_node(node, allow_pointer).await {
                    Ok(method) => {
                        info!("{} ✓ 已选择选项 {} ({})", ctx, option_label(index), method);
                        Some(method)
                    }
                    Err(e) => {
                        warn!("{} ⚠️ 点击选项失败: {}", ctx, e);
                        None
                    }
                }
            }
            (true, _, None) => {
                info!("{} 选项没有对应的页面元素，只记录答案", ctx);
                None
            }
            _ => None,
        };

        QuestionOutcome::Answered {
            index,
            strategy,
            clicked,
        }
    }

    /// 写入警告日志，写入失败只记录
    fn write_warn(&self, ctx: &QuestionCtx, question: &Question, reason: &str) {
        let detail = format!("题干: {} | {}", question.text, reason);
        match self
            .warn_writer
            .write(&ctx.source, ctx.question_index, &detail)
        {
            Ok(()) => warn!("{} ⚠️ 已写入 {}", ctx, self.warn_writer.path()),
            Err(e) => error!("{} 写入 {} 失败: {}", ctx, self.warn_writer.path(), e),
        }
    }
}
