//! 图片处理器 - 编排层
//!
//! 图片字节 → 预处理 → 识别扫描 →（扫描无文本时）兜底识别 → 文本解析 → 逐题作答

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{AppError, AppResult, ErrorKind, OcrError};
use crate::models::question::Question;
use crate::orchestrator::page_processor::answer_questions;
use crate::services::image_preprocessor::encode_png;
use crate::services::ocr_correction::correct_text;
use crate::services::text_parser::parse_questions;
use crate::services::{FallbackChain, ImagePreprocessor, RecognitionSweep, SweepOutcome};
use crate::utils::logging::truncate_text;
use crate::workflow::{QuestionFlow, RunStats};

/// 图片识别管道
pub struct ImagePipeline {
    preprocessor: Arc<ImagePreprocessor>,
    sweep: Arc<RecognitionSweep>,
    fallback: FallbackChain,
    /// 构造时探测一次；不可用时跳过扫描，直接兜底
    ocr_available: bool,
}

impl ImagePipeline {
    pub fn new(preprocessor: ImagePreprocessor, sweep: RecognitionSweep, fallback: FallbackChain) -> Self {
        let ocr_available = sweep.engine_available();
        if !ocr_available {
            warn!(
                "⚠️ OCR 引擎 {} 不可用，图片识别将直接进入兜底识别",
                sweep.engine_name()
            );
        }
        Self {
            preprocessor: Arc::new(preprocessor),
            sweep: Arc::new(sweep),
            fallback,
            ocr_available,
        }
    }

    pub fn ocr_available(&self) -> bool {
        self.ocr_available
    }

    /// 识别图片中的文字（已纠错）
    pub async fn extract_text(&self, bytes: Vec<u8>) -> AppResult<String> {
        if !self.ocr_available {
            return self.extract_text_without_ocr(bytes).await;
        }

        let preprocessor = self.preprocessor.clone();
        let sweep = self.sweep.clone();

        // 预处理和 OCR 都是 CPU / 子进程密集型，放到阻塞线程池
        let (result, fallback_png) = tokio::task::spawn_blocking(move || {
            sweep_blocking(&preprocessor, &sweep, &bytes)
        })
        .await
        .map_err(|e| AppError::Other(format!("识别任务异常退出: {}", e)))?;

        match result {
            Ok(outcome) => {
                info!(
                    "✓ OCR 完成: 共尝试 {} 种配置，最佳 {} psm={} oem={}",
                    outcome.attempts,
                    outcome.best.candidate,
                    outcome.best.segmentation_mode,
                    outcome.best.engine_mode
                );
                Ok(outcome.corrected_text)
            }
            Err(e) if e.kind() == Some(ErrorKind::OcrExhausted) => {
                warn!("⚠️ {}", e);
                let Some(png) = fallback_png else {
                    return Err(e);
                };
                self.recognize_fallback(&png).await.ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    /// OCR 引擎缺失：只做预处理，图片直接交给兜底识别
    async fn extract_text_without_ocr(&self, bytes: Vec<u8>) -> AppResult<String> {
        let preprocessor = self.preprocessor.clone();
        let png = tokio::task::spawn_blocking(move || -> AppResult<Vec<u8>> {
            let candidates = preprocessor.prepare(&bytes)?;
            match candidates.first() {
                Some(first) => encode_png(&first.image),
                None => Err(AppError::Other("预处理没有产出候选图片".to_string())),
            }
        })
        .await
        .map_err(|e| AppError::Other(format!("预处理任务异常退出: {}", e)))??;

        self.recognize_fallback(&png).await.ok_or_else(|| {
            OcrError::EngineUnavailable {
                engine: self.sweep.engine_name().to_string(),
            }
            .into()
        })
    }

    async fn recognize_fallback(&self, png: &[u8]) -> Option<String> {
        let found = self.fallback.recognize(png).await?;
        Some(correct_text(&found.text, &self.sweep.config().correction))
    }

    /// 识别图片并解析出题目
    pub async fn extract_questions(&self, bytes: Vec<u8>, source: &str) -> AppResult<Vec<Question>> {
        let text = self.extract_text(bytes).await?;
        info!("识别文本: {}", truncate_text(&text.replace('\n', " / "), 120));

        let questions = parse_questions(&text);
        if questions.is_empty() {
            return Err(AppError::no_question_found(source));
        }
        info!("✓ 从图片中解析出 {} 道题", questions.len());
        Ok(questions)
    }
}

/// 在阻塞线程中运行预处理 + 扫描；扫描失败时顺带给出兜底识别用的 PNG
fn sweep_blocking(
    preprocessor: &ImagePreprocessor,
    sweep: &RecognitionSweep,
    bytes: &[u8],
) -> (AppResult<SweepOutcome>, Option<Vec<u8>>) {
    let candidates = match preprocessor.prepare(bytes) {
        Ok(candidates) => candidates,
        Err(e) => return (Err(e), None),
    };
    let result = sweep.run(&candidates);
    let fallback_png = match &result {
        Err(_) => candidates.first().and_then(|c| encode_png(&c.image).ok()),
        Ok(_) => None,
    };
    (result, fallback_png)
}

/// 处理一张图片：识别题目并逐题作答（图片题目没有可点击的元素）
pub async fn process_image(
    pipeline: &ImagePipeline,
    flow: &QuestionFlow,
    bytes: Vec<u8>,
    source: &str,
) -> AppResult<RunStats> {
    let questions = pipeline.extract_questions(bytes, source).await?;
    Ok(answer_questions(flow, &questions, source, None).await)
}
