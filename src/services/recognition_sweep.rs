//! 识别扫描 - 业务能力层
//!
//! 对每张候选图片，遍历"页面分割模式 × 引擎模式"的所有组合调用 OCR 引擎，
//! 给每次结果打分并保留最好的一次，最后只对胜出的文本做纠错。

use std::sync::Arc;

use phf::phf_set;
use tracing::{debug, info, warn};

use crate::error::{AppResult, OcrError};
use crate::services::image_preprocessor::PreparedImage;
use crate::services::ocr_correction::{correct_text, CorrectionRules};
use crate::services::ocr_engine::{OcrEngine, OcrOutput, OcrRequest};

/// 全页、单块、稀疏文本、单列、单行
pub const SEGMENTATION_MODES: [u8; 5] = [3, 6, 11, 4, 7];
/// 神经网络、传统引擎
pub const ENGINE_MODES: [u8; 2] = [1, 0];

/// 题目文本中的常见词，命中越多说明识别越像自然语言
static COMMON_WORDS: phf::Set<&'static str> = phf_set! {
    "the", "a", "an", "is", "are", "was", "were", "be", "of", "and", "or", "not", "to", "in",
    "on", "at", "by", "for", "with", "from", "as", "that", "this", "it", "which", "what", "who",
    "when", "where", "why", "how", "true", "false", "all", "none", "above", "following",
    "correct", "answer", "question", "option", "choose", "select",
};

/// 扫描参数
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub language: String,
    pub whitelist: Option<String>,
    pub segmentation_modes: Vec<u8>,
    pub engine_modes: Vec<u8>,
    /// 每命中一个常见词的加分
    pub common_word_bonus: f32,
    /// 计分的常见词命中上限
    pub common_word_cap: usize,
    pub correction: CorrectionRules,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            whitelist: None,
            segmentation_modes: SEGMENTATION_MODES.to_vec(),
            engine_modes: ENGINE_MODES.to_vec(),
            common_word_bonus: 1.5,
            common_word_cap: 10,
            correction: CorrectionRules::default(),
        }
    }
}

/// 一次识别尝试
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionAttempt {
    pub candidate: &'static str,
    pub segmentation_mode: u8,
    pub engine_mode: u8,
    pub extracted_text: String,
    pub confidence_score: f32,
}

/// 扫描结果
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub best: RecognitionAttempt,
    /// 纠错后的文本
    pub corrected_text: String,
    /// 共调用了多少种配置
    pub attempts: usize,
}

/// 识别扫描
pub struct RecognitionSweep {
    engine: Arc<dyn OcrEngine>,
    config: SweepConfig,
}

impl RecognitionSweep {
    pub fn new(engine: Arc<dyn OcrEngine>, config: SweepConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// 探测 OCR 引擎是否可用（可能启动子进程）
    pub fn engine_available(&self) -> bool {
        self.engine.is_available()
    }

    /// 运行扫描
    ///
    /// 单个配置失败只记录日志；所有配置都没有文本时返回 [`OcrError::Exhausted`]。
    pub fn run(&self, candidates: &[PreparedImage]) -> AppResult<SweepOutcome> {
        let mut attempted = Vec::new();
        let mut best: Option<RecognitionAttempt> = None;

        for candidate in candidates {
            for &psm in &self.config.segmentation_modes {
                for &oem in &self.config.engine_modes {
                    let request = OcrRequest {
                        language: self.config.language.clone(),
                        segmentation_mode: psm,
                        engine_mode: oem,
                        whitelist: self.config.whitelist.clone(),
                    };
                    let label = format!("{} {}", candidate.label, request.describe());
                    attempted.push(label.clone());

                    let output = match self.engine.recognize(&candidate.image, &request) {
                        Ok(output) => output,
                        Err(e) => {
                            warn!("⚠️ OCR 配置 {} 失败: {}", label, e);
                            continue;
                        }
                    };
                    if output.text.trim().is_empty() {
                        debug!("OCR 配置 {} 没有识别出文本", label);
                        continue;
                    }

                    let attempt = RecognitionAttempt {
                        candidate: candidate.label,
                        segmentation_mode: psm,
                        engine_mode: oem,
                        confidence_score: self.score(&output),
                        extracted_text: output.text,
                    };
                    debug!(
                        "OCR 配置 {} 得分 {:.2}，文本 {} 字符",
                        label,
                        attempt.confidence_score,
                        attempt.extracted_text.chars().count()
                    );

                    if best.as_ref().map_or(true, |b| is_better(&attempt, b)) {
                        best = Some(attempt);
                    }
                }
            }
        }

        let Some(best) = best else {
            return Err(OcrError::Exhausted { attempted }.into());
        };

        info!(
            "✓ OCR 最佳配置: {} psm={} oem={} (得分 {:.2})",
            best.candidate, best.segmentation_mode, best.engine_mode, best.confidence_score
        );
        let corrected_text = correct_text(&best.extracted_text, &self.config.correction);
        Ok(SweepOutcome {
            best,
            corrected_text,
            attempts: attempted.len(),
        })
    }

    /// 平均置信度 + 常见词加分
    pub fn score(&self, output: &OcrOutput) -> f32 {
        let confidences: Vec<f32> = output
            .tokens
            .iter()
            .filter(|t| !t.text.trim().is_empty() && t.confidence >= 0.0)
            .map(|t| t.confidence)
            .collect();
        let mean = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };

        let hits = output
            .text
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| COMMON_WORDS.contains(w.as_str()))
            .count()
            .min(self.config.common_word_cap);

        mean + self.config.common_word_bonus * hits as f32
    }
}

/// 严格更高分胜出；同分时文本更长者胜出；否则保留先出现的
fn is_better(candidate: &RecognitionAttempt, current: &RecognitionAttempt) -> bool {
    if (candidate.confidence_score - current.confidence_score).abs() <= f32::EPSILON {
        candidate.extracted_text.chars().count() > current.extracted_text.chars().count()
    } else {
        candidate.confidence_score > current.confidence_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ErrorKind};
    use crate::services::ocr_engine::OcrToken;
    use image::GrayImage;

    /// 按 (psm, oem) 返回预设结果的假引擎
    struct ScriptedEngine {
        responses: Vec<((u8, u8), &'static str, f32)>,
    }

    impl OcrEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn recognize(&self, _image: &GrayImage, request: &OcrRequest) -> AppResult<OcrOutput> {
            let key = (request.segmentation_mode, request.engine_mode);
            match self.responses.iter().find(|(k, _, _)| *k == key) {
                Some((_, text, conf)) => Ok(OcrOutput {
                    text: text.to_string(),
                    tokens: text
                        .split_whitespace()
                        .map(|w| OcrToken {
                            text: w.to_string(),
                            confidence: *conf,
                        })
                        .collect(),
                }),
                None => Err(OcrError::EngineFailed {
                    config: request.describe(),
                    message: "boom".to_string(),
                }
                .into()),
            }
        }
    }

    fn candidates() -> Vec<PreparedImage> {
        vec![PreparedImage {
            label: "normalized",
            image: GrayImage::new(4, 4),
        }]
    }

    fn sweep(responses: Vec<((u8, u8), &'static str, f32)>) -> RecognitionSweep {
        RecognitionSweep::new(Arc::new(ScriptedEngine { responses }), SweepConfig::default())
    }

    #[test]
    fn test_best_score_wins_and_is_corrected() {
        let outcome = sweep(vec![
            ((3, 1), "garbage xx", 40.0),
            ((6, 1), "What is it?\n5) Paris\nA) Rome", 85.0),
            ((11, 0), "", 99.0),
        ])
        .run(&candidates())
        .unwrap();

        assert_eq!(outcome.best.segmentation_mode, 6);
        assert_eq!(outcome.best.engine_mode, 1);
        assert_eq!(outcome.corrected_text, "What is it?\nb) Paris\na) Rome");
        assert_eq!(outcome.attempts, 10);
    }

    #[test]
    fn test_tie_prefers_longer_text() {
        let outcome = sweep(vec![((3, 1), "xx yy", 50.0), ((6, 1), "xx yy zz", 50.0)])
            .run(&candidates())
            .unwrap();
        assert_eq!(outcome.best.segmentation_mode, 6);
    }

    #[test]
    fn test_tie_same_length_keeps_first() {
        let outcome = sweep(vec![((6, 1), "xx yy", 50.0), ((3, 1), "zz ww", 50.0)])
            .run(&candidates())
            .unwrap();
        assert_eq!(outcome.best.segmentation_mode, 3);
    }

    #[test]
    fn test_common_word_bonus() {
        let s = sweep(vec![]);
        let plain = OcrOutput {
            text: "xq zv".to_string(),
            tokens: vec![
                OcrToken {
                    text: "xq".to_string(),
                    confidence: 80.0,
                },
                OcrToken {
                    text: "zv".to_string(),
                    confidence: -1.0,
                },
            ],
        };
        assert!((s.score(&plain) - 80.0).abs() < 1e-4);

        let wordy = OcrOutput {
            text: "What is the answer?".to_string(),
            tokens: vec![],
        };
        // what / is / the / answer 四个命中
        assert!((s.score(&wordy) - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_exhausted_lists_attempts() {
        let err = sweep(vec![((3, 1), "   ", 90.0)])
            .run(&candidates())
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::OcrExhausted));
        match err {
            AppError::Ocr(OcrError::Exhausted { attempted }) => {
                assert_eq!(attempted.len(), 10);
                assert!(attempted.contains(&"normalized psm=3 oem=1".to_string()));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
