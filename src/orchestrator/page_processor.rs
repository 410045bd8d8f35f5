//! 页面处理器 - 编排层
//!
//! ## 核心功能
//!
//! 1. **页面快照**：把当前 DOM 拍平成 `DomSnapshot`
//! 2. **结构检测**：四种策略合并去重
//! 3. **截图兜底**：结构检测无结果时截图，走图片识别管道
//! 4. **逐题作答**：复用同一个 `QuestionFlow`，汇总统计

use tracing::{debug, info};

use crate::error::{AppResult, ErrorKind};
use crate::infrastructure::JsExecutor;
use crate::models::question::Question;
use crate::orchestrator::image_processor::ImagePipeline;
use crate::services::StructuralDetector;
use crate::workflow::{AnswerTarget, QuestionCtx, QuestionFlow, RunStats};

/// 处理当前页面
pub async fn process_page(
    executor: &JsExecutor,
    source: &str,
    detector: &StructuralDetector,
    pipeline: &ImagePipeline,
    flow: &QuestionFlow,
) -> AppResult<RunStats> {
    info!("\n📄 正在分析页面: {}", source);
    let snapshot = executor.snapshot().await?;

    match detector.detect(&snapshot, source) {
        Ok(questions) => {
            let target = AnswerTarget {
                page: &snapshot,
                clicker: executor,
            };
            Ok(answer_questions(flow, &questions, source, Some(target)).await)
        }
        Err(e) if e.kind() == Some(ErrorKind::NoQuestionFound) => {
            info!("🔄 页面结构中没有找到题目，截图后走图片识别");
            let png = executor.screenshot_png().await?;
            let questions = pipeline.extract_questions(png, source).await?;
            Ok(answer_questions(flow, &questions, source, None).await)
        }
        Err(e) => Err(e),
    }
}

/// 逐题作答并汇总统计
pub async fn answer_questions(
    flow: &QuestionFlow,
    questions: &[Question],
    source: &str,
    target: Option<AnswerTarget<'_>>,
) -> RunStats {
    if let Ok(report) = serde_json::to_string(questions) {
        debug!("检测报告: {}", report);
    }

    let mut stats = RunStats::default();
    let total = questions.len();
    for (index, question) in questions.iter().enumerate() {
        info!("\n{}", "─".repeat(40));
        let ctx = QuestionCtx::new(source, index + 1, total);
        let outcome = flow.run(question, &ctx, target).await;
        stats.record(&outcome);
    }
    stats
}
