use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{GrayImage, Luma};
use mcq_solver::config::Config;
use mcq_solver::error::{AppResult, ErrorKind, OcrError};
use mcq_solver::infrastructure::{ClickMethod, ElementClicker};
use mcq_solver::models::{DomSnapshot, DomTree, NodeId, QuestionKind};
use mcq_solver::orchestrator::{answer_questions, process_image, ImagePipeline};
use mcq_solver::services::fallback::{FallbackRecognizer, Unavailable};
use mcq_solver::services::image_preprocessor::encode_png;
use mcq_solver::services::ocr_engine::{OcrOutput, OcrRequest, OcrToken};
use mcq_solver::services::{
    CompletionProvider, FallbackChain, ImagePreprocessor, OcrEngine, RecognitionSweep,
    StructuralDetector, SweepConfig,
};
use mcq_solver::workflow::{AnswerTarget, QuestionFlow};

// ========== 测试替身 ==========

struct AlwaysB;

#[async_trait]
impl CompletionProvider for AlwaysB {
    fn model_name(&self) -> &str {
        "always-b"
    }

    async fn complete(&self, _prompt: &str) -> AppResult<String> {
        Ok("The correct answer is B".to_string())
    }
}

#[derive(Default)]
struct RecordingClicker {
    clicks: Mutex<Vec<NodeId>>,
}

#[async_trait]
impl ElementClicker for RecordingClicker {
    async fn click_node(&self, node: NodeId, _allow_pointer: bool) -> AppResult<ClickMethod> {
        self.clicks.lock().unwrap().push(node);
        Ok(ClickMethod::Pointer)
    }
}

/// 对所有配置返回同一段文本的 OCR 引擎
struct FixedOcr(&'static str);

impl OcrEngine for FixedOcr {
    fn name(&self) -> &str {
        "fixed"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn recognize(&self, _image: &GrayImage, _request: &OcrRequest) -> AppResult<OcrOutput> {
        Ok(OcrOutput {
            text: self.0.to_string(),
            tokens: self
                .0
                .split_whitespace()
                .map(|w| OcrToken {
                    text: w.to_string(),
                    confidence: 90.0,
                })
                .collect(),
        })
    }
}

/// 未安装的 OCR 引擎，记录被调用的次数
#[derive(Default)]
struct MissingOcr {
    calls: Mutex<usize>,
}

impl OcrEngine for MissingOcr {
    fn name(&self) -> &str {
        "missing"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn recognize(&self, _image: &GrayImage, _request: &OcrRequest) -> AppResult<OcrOutput> {
        *self.calls.lock().unwrap() += 1;
        Err(OcrError::EngineUnavailable {
            engine: "missing".to_string(),
        }
        .into())
    }
}

struct FixedFallback(&'static str);

#[async_trait]
impl FallbackRecognizer for FixedFallback {
    fn name(&self) -> &str {
        "fixed-fallback"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn recognize(&self, _png: &[u8]) -> AppResult<String> {
        Ok(self.0.to_string())
    }
}

fn test_flow(dir: &tempfile::TempDir) -> QuestionFlow {
    let config = Config {
        warn_file: dir.path().join("warn.txt").to_string_lossy().to_string(),
        answer_delay_ms: 0,
        ..Config::default()
    };
    QuestionFlow::new(&config, Arc::new(AlwaysB)).with_retry_delay(Duration::ZERO)
}

fn pipeline(ocr_text: &'static str, fallback: Vec<Box<dyn FallbackRecognizer>>) -> ImagePipeline {
    ImagePipeline::new(
        ImagePreprocessor::default(),
        RecognitionSweep::new(Arc::new(FixedOcr(ocr_text)), SweepConfig::default()),
        FallbackChain::new(fallback),
    )
}

fn blank_png() -> Vec<u8> {
    encode_png(&GrayImage::from_pixel(120, 60, Luma([255u8]))).unwrap()
}

// ========== 页面：检测 → 询问 → 匹配 → 点击 ==========

#[tokio::test]
async fn test_page_detect_and_answer() {
    let option = |id: &str, value: &str, label: &str| {
        vec![
            DomTree::radio("capital", value, Some(id)),
            DomTree::el("label", &[("for", id)], vec![DomTree::text(label)]),
        ]
    };
    let mut choices = option("c1", "london", "London");
    choices.extend(option("c2", "paris", "Paris"));

    let dom = DomSnapshot::from_tree(DomTree::el(
        "body",
        &[],
        vec![
            DomTree::el(
                "form",
                &[],
                vec![DomTree::el(
                    "div",
                    &[],
                    vec![
                        DomTree::el(
                            "p",
                            &[],
                            vec![DomTree::text("Q1: What is the capital of France?")],
                        ),
                        DomTree::el("div", &[], choices),
                    ],
                )],
            ),
            DomTree::el("p", &[], vec![DomTree::text("Which number is even?")]),
            DomTree::el("p", &[], vec![DomTree::text("A) 3")]),
            DomTree::el("p", &[], vec![DomTree::text("B) 8")]),
            DomTree::el("p", &[], vec![DomTree::text("C) 11")]),
        ],
    ));

    let questions = StructuralDetector::default()
        .detect(&dom, "fixture")
        .unwrap();
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0].kind, QuestionKind::Radio);
    assert_eq!(questions[0].option_texts(), vec!["London", "Paris"]);
    assert_eq!(questions[1].kind, QuestionKind::Pattern);
    assert!(questions.iter().all(|q| q.options.len() >= 2));

    let dir = tempfile::tempdir().unwrap();
    let clicker = RecordingClicker::default();
    let target = AnswerTarget {
        page: &dom,
        clicker: &clicker,
    };
    let stats = answer_questions(&test_flow(&dir), &questions, "fixture", Some(target)).await;

    assert_eq!(stats.total, 2);
    assert_eq!(stats.answered, 2);
    // 文本模式的题目没有可点击的元素
    assert_eq!(stats.clicked, 1);
    let clicks = clicker.clicks.lock().unwrap();
    assert_eq!(clicks.as_slice(), &[questions[0].options[1].source_handle.unwrap()]);
}

// ========== 图片：预处理 → 扫描 → 解析 → 询问 ==========

#[tokio::test]
async fn test_image_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        "Which of these is a fruit?\n(A) Apple\n5) Car\nC. Rock",
        vec![],
    );

    let questions = pipeline
        .extract_questions(blank_png(), "quiz.png")
        .await
        .unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].text, "Which of these is a fruit?");
    assert_eq!(questions[0].option_texts(), vec!["Apple", "Car", "Rock"]);

    let stats = process_image(&pipeline, &test_flow(&dir), blank_png(), "quiz.png")
        .await
        .unwrap();
    assert_eq!(stats.answered, 1);
    assert_eq!(stats.clicked, 0);
}

#[tokio::test]
async fn test_exhausted_sweep_uses_fallback() {
    let pipeline = pipeline(
        "",
        vec![
            Box::new(Unavailable::new("secondary-ocr")),
            Box::new(FixedFallback("Is water wet?\nA) Yes\nB) No")),
        ],
    );

    let questions = pipeline
        .extract_questions(blank_png(), "scan.png")
        .await
        .unwrap();
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].option_texts(), vec!["Yes", "No"]);
}

#[tokio::test]
async fn test_exhausted_without_fallback() {
    let err = pipeline("   ", vec![Box::new(Unavailable::new("secondary-ocr"))])
        .extract_text(blank_png())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::OcrExhausted));
}

#[tokio::test]
async fn test_unreadable_image() {
    let err = pipeline("irrelevant", vec![])
        .extract_text(b"definitely not an image".to_vec())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnreadableImage));
}

#[tokio::test]
async fn test_text_without_questions() {
    let err = pipeline("just a caption without any options", vec![])
        .extract_questions(blank_png(), "caption.png")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NoQuestionFound));
}

#[tokio::test]
async fn test_missing_ocr_goes_straight_to_fallback() {
    let engine = Arc::new(MissingOcr::default());
    let pipeline = ImagePipeline::new(
        ImagePreprocessor::default(),
        RecognitionSweep::new(engine.clone(), SweepConfig::default()),
        FallbackChain::new(vec![Box::new(FixedFallback("Is fire hot?\nA) Yes\nB) No"))]),
    );
    assert!(!pipeline.ocr_available());

    let questions = pipeline
        .extract_questions(blank_png(), "scan.png")
        .await
        .unwrap();
    assert_eq!(questions[0].option_texts(), vec!["Yes", "No"]);
    assert_eq!(*engine.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_ocr_without_fallback() {
    let engine = Arc::new(MissingOcr::default());
    let pipeline = ImagePipeline::new(
        ImagePreprocessor::default(),
        RecognitionSweep::new(engine.clone(), SweepConfig::default()),
        FallbackChain::new(vec![Box::new(Unavailable::new("secondary-ocr"))]),
    );

    let err = pipeline.extract_text(blank_png()).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::CollaboratorUnavailable));
    assert_eq!(*engine.calls.lock().unwrap(), 0);
}

// ========== 需要真实环境的测试 ==========

#[tokio::test]
#[ignore] // 需要开启调试端口的浏览器：cargo test -- --ignored
async fn test_browser_snapshot() {
    mcq_solver::utils::logging::init(true);
    let config = Config::from_env().unwrap();

    let session = mcq_solver::BrowserSession::open(&config)
        .await
        .expect("连接浏览器失败");
    let snapshot = session.executor().snapshot().await.expect("页面快照失败");
    assert!(!snapshot.is_empty());
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore] // 需要本机安装 tesseract，并通过 IMAGE_PATH 指定一张题目截图
async fn test_tesseract_on_real_image() {
    use mcq_solver::services::TesseractCli;

    mcq_solver::utils::logging::init(true);
    let config = Config::from_env().unwrap();
    let path = config.image_path.clone().expect("需要 IMAGE_PATH");
    let bytes = mcq_solver::services::image_preprocessor::read_image_file(&path).unwrap();

    let pipeline = ImagePipeline::new(
        ImagePreprocessor::new(config.preprocess_config()),
        RecognitionSweep::new(
            Arc::new(TesseractCli::new(&config.tesseract_path, config.tessdata_dir.clone())),
            config.sweep_config(),
        ),
        FallbackChain::new(vec![]),
    );
    let questions = pipeline.extract_questions(bytes, &path).await.unwrap();
    println!("识别出 {} 道题", questions.len());
    assert!(!questions.is_empty());
}
