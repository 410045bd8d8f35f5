//! 应用 - 编排层
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：日志文件、LLM 服务、OCR 引擎、兜底识别链
//! 2. **按模式运行**：页面模式持有浏览器会话；图片模式读取文件
//! 3. **全局统计**：汇总所有题目的处理结果

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::config::{Config, RunMode};
use crate::orchestrator::image_processor::{process_image, ImagePipeline};
use crate::orchestrator::page_processor::process_page;
use crate::services::image_preprocessor::read_image_file;
use crate::services::{
    FallbackChain, ImagePreprocessor, LlmService, RecognitionSweep,
    StructuralDetector, TesseractCli,
};
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::workflow::{QuestionFlow, RunStats};

/// 应用主结构
pub struct App {
    config: Config,
    detector: StructuralDetector,
    pipeline: ImagePipeline,
    flow: QuestionFlow,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)
            .with_context(|| format!("无法初始化日志文件 {}", config.output_log_file))?;

        log_startup(&config);

        let llm = Arc::new(LlmService::new(&config));
        if !llm.is_configured() {
            warn!("⚠️ 未配置 LLM_API_KEY，所有题目都会失败");
        }

        let engine = TesseractCli::new(&config.tesseract_path, config.tessdata_dir.clone());

        let pipeline = ImagePipeline::new(
            ImagePreprocessor::new(config.preprocess_config()),
            RecognitionSweep::new(Arc::new(engine), config.sweep_config()),
            FallbackChain::standard(config.cloud_vision_api_key.clone(), llm.clone()),
        );
        let flow = QuestionFlow::new(&config, llm);

        Ok(Self {
            config,
            detector: StructuralDetector::default(),
            pipeline,
            flow,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunStats> {
        let started = Instant::now();

        let stats = match self.config.run_mode {
            RunMode::Page => self.run_page().await?,
            RunMode::Image => self.run_image().await?,
        };

        print_final_stats(&stats, started.elapsed(), &self.config.output_log_file);
        Ok(stats)
    }

    async fn run_page(&self) -> Result<RunStats> {
        let session = BrowserSession::open(&self.config)
            .await
            .context("无法打开浏览器页面")?;
        let executor = session.executor();
        let source = session.current_url().await;

        let result = process_page(
            &executor,
            &source,
            &self.detector,
            &self.pipeline,
            &self.flow,
        )
        .await;

        session.close().await?;
        let stats = result.with_context(|| format!("处理页面失败: {}", source))?;
        info!("✓ 页面处理完成: {}", source);
        Ok(stats)
    }

    async fn run_image(&self) -> Result<RunStats> {
        let path = self
            .config
            .image_path
            .as_deref()
            .context("图片模式必须提供 IMAGE_PATH")?;
        info!("\n🖼️ 正在读取图片: {}", path);
        let bytes = read_image_file(path)?;

        let stats = process_image(&self.pipeline, &self.flow, bytes, path)
            .await
            .with_context(|| format!("处理图片失败: {}", path))?;
        info!("✓ 图片处理完成: {}", path);
        Ok(stats)
    }
}
