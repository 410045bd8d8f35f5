//! 兜底识别 - 业务能力层
//!
//! 识别扫描没有产出任何文本时，按固定优先级尝试：备用 OCR 引擎 → 云端文字检测 → 视觉模型。
//! 每一级都可能不可用，不可用时直接跳过。

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::services::llm_service::LlmService;

const CLOUD_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

/// 兜底识别协作方
#[async_trait]
pub trait FallbackRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// 识别 PNG 图片中的文字
    async fn recognize(&self, png: &[u8]) -> AppResult<String>;
}

/// 不可用的占位实现
#[derive(Debug, Clone)]
pub struct Unavailable {
    name: &'static str,
}

impl Unavailable {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl FallbackRecognizer for Unavailable {
    fn name(&self) -> &str {
        self.name
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn recognize(&self, _png: &[u8]) -> AppResult<String> {
        Err(AppError::Other(format!("{} 不可用", self.name)))
    }
}

/// Google Cloud Vision 文字检测
pub struct CloudVisionRecognizer {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl CloudVisionRecognizer {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: CLOUD_VISION_ENDPOINT.to_string(),
        }
    }

    /// 使用自定义端点（代理或测试服务器）
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl FallbackRecognizer for CloudVisionRecognizer {
    fn name(&self) -> &str {
        "cloud-vision"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn recognize(&self, png: &[u8]) -> AppResult<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Other("未配置 Cloud Vision API Key".to_string()))?;

        let body = json!({
            "requests": [{
                "image": { "content": STANDARD.encode(png) },
                "features": [{ "type": "TEXT_DETECTION" }]
            }]
        });

        debug!("调用 Cloud Vision 文字检测，图片 {} 字节", png.len());
        let response: JsonValue = self
            .client
            .post(&self.endpoint)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(extract_annotation_text(&response))
    }
}

/// 从 Cloud Vision 响应中取出全文
pub fn extract_annotation_text(response: &JsonValue) -> String {
    let first = &response["responses"][0];
    first["fullTextAnnotation"]["text"]
        .as_str()
        .or_else(|| first["textAnnotations"][0]["description"].as_str())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// 视觉模型识别
pub struct VisionLlmRecognizer {
    llm: Arc<LlmService>,
}

impl VisionLlmRecognizer {
    pub fn new(llm: Arc<LlmService>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FallbackRecognizer for VisionLlmRecognizer {
    fn name(&self) -> &str {
        "vision-llm"
    }

    fn is_available(&self) -> bool {
        self.llm.is_configured()
    }

    async fn recognize(&self, png: &[u8]) -> AppResult<String> {
        self.llm.extract_text(png).await
    }
}

/// 兜底识别的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackText {
    pub recognizer: String,
    pub text: String,
}

/// 按优先级排列的兜底识别链
pub struct FallbackChain {
    recognizers: Vec<Box<dyn FallbackRecognizer>>,
}

impl FallbackChain {
    pub fn new(recognizers: Vec<Box<dyn FallbackRecognizer>>) -> Self {
        Self { recognizers }
    }

    /// 标准三级：备用 OCR（默认不可用）→ Cloud Vision → 视觉模型
    pub fn standard(cloud_vision_api_key: Option<String>, llm: Arc<LlmService>) -> Self {
        Self::new(vec![
            Box::new(Unavailable::new("secondary-ocr")),
            Box::new(CloudVisionRecognizer::new(cloud_vision_api_key)),
            Box::new(VisionLlmRecognizer::new(llm)),
        ])
    }

    /// 依次尝试，返回第一个非空结果；全部失败返回 `None`
    pub async fn recognize(&self, png: &[u8]) -> Option<FallbackText> {
        for recognizer in &self.recognizers {
            if !recognizer.is_available() {
                debug!("兜底识别 {} 不可用，跳过", recognizer.name());
                continue;
            }
            info!("🔄 尝试兜底识别: {}", recognizer.name());
            match recognizer.recognize(png).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!("✓ 兜底识别 {} 成功，{} 字符", recognizer.name(), text.chars().count());
                    return Some(FallbackText {
                        recognizer: recognizer.name().to_string(),
                        text,
                    });
                }
                Ok(_) => warn!("⚠️ 兜底识别 {} 没有返回文本", recognizer.name()),
                Err(e) => warn!("⚠️ 兜底识别 {} 失败: {}", recognizer.name(), e),
            }
        }
        None
    }
}
