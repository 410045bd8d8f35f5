//! LLM 服务 - 业务能力层
//!
//! 只负责"向语言模型提问"能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};
use crate::models::question::Question;

/// 默认提示词
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Answer the following multiple-choice question.

Question: {{question}}

Options:
{{options}}

Respond ONLY with the letter of the correct option.";

const ANSWER_SYSTEM_MESSAGE: &str = "You are a precise quiz assistant. Answer with a single option letter.";

const VISION_PROMPT: &str = "Extract all text from this image exactly as written, \
preserving line breaks. Output only the extracted text.";

/// 语言模型补全能力
///
/// 工作流只依赖这个 trait，测试中可以换成脚本化的实现。
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 模型名称（日志用）
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> AppResult<String>;
}

/// 选项序号对应的字母
pub fn option_label(index: usize) -> String {
    if index < 26 {
        ((b'A' + index as u8) as char).to_string()
    } else {
        (index + 1).to_string()
    }
}

/// 渲染提问用的提示词
///
/// 模板支持 `{{question}}` 和 `{{options}}` 两个占位符，选项按 `A. 文本` 逐行列出。
pub fn render_prompt(template: Option<&str>, question: &Question) -> String {
    let options = question
        .options
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}. {}", option_label(i), o.text))
        .collect::<Vec<_>>()
        .join("\n");

    template
        .unwrap_or(DEFAULT_PROMPT_TEMPLATE)
        .replace("{{question}}", &question.text)
        .replace("{{options}}", &options)
}

/// 带重试的提问
///
/// 调用失败或返回空文本都算一次失败，最多尝试 `max_attempts` 次，每次之间等待 `delay`。
pub async fn ask_with_retries(
    provider: &dyn CompletionProvider,
    prompt: &str,
    max_attempts: usize,
    delay: Duration,
) -> AppResult<String> {
    let max_attempts = max_attempts.max(1);
    let mut last_error: Option<AppError> = None;

    for attempt in 1..=max_attempts {
        match provider.complete(prompt).await {
            Ok(response) if !response.trim().is_empty() => {
                debug!("第 {} 次尝试获得响应", attempt);
                return Ok(response.trim().to_string());
            }
            Ok(_) => {
                warn!("⚠️ LLM 返回空内容 (第 {}/{} 次)", attempt, max_attempts);
                last_error = Some(
                    LlmError::EmptyContent {
                        model: provider.model_name().to_string(),
                    }
                    .into(),
                );
            }
            Err(e) => {
                warn!("⚠️ LLM 调用失败 (第 {}/{} 次): {}", attempt, max_attempts, e);
                last_error = Some(e);
            }
        }
        if attempt < max_attempts && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_error.unwrap_or_else(|| {
        LlmError::EmptyContent {
            model: provider.model_name().to_string(),
        }
        .into()
    }))
}

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API 回答单道题
/// - 调用视觉模型从截图中提取文字
/// - 不认识页面，不关心流程顺序
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    vision_model_name: String,
    temperature: f32,
    has_api_key: bool,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            vision_model_name: config.vision_model_name.clone(),
            temperature: config.llm_temperature,
            has_api_key: !config.llm_api_key.trim().is_empty(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.has_api_key
    }

    /// 通用的 LLM 调用函数
    ///
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `imgs`: 图片 URL 列表（可选，支持 data URL），会追加到用户消息中
    pub async fn send_to_llm(
        &self,
        model: &str,
        user_message: &str,
        system_message: Option<&str>,
        imgs: Option<&[String]>,
    ) -> AppResult<String> {
        if !self.has_api_key {
            return Err(LlmError::MissingApiKey.into());
        }
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = match imgs {
            Some(img_urls) if !img_urls.is_empty() => {
                let mut content_parts = vec![ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText {
                        text: user_message.to_string(),
                    },
                )];
                for url in img_urls {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::High),
                            },
                        },
                    ));
                }
                debug!("使用 Vision API，包含 {} 张图片", img_urls.len());
                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                    .build()?
            }
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()?,
        };
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(1024u32)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(model, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::EmptyContent {
                model: model.to_string(),
            })?;

        Ok(content.trim().to_string())
    }

    /// 用视觉模型提取 PNG 图片中的文字
    pub async fn extract_text(&self, png: &[u8]) -> AppResult<String> {
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png));
        self.send_to_llm(&self.vision_model_name, VISION_PROMPT, None, Some(&[data_url]))
            .await
    }
}

#[async_trait]
impl CompletionProvider for LlmService {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, prompt: &str) -> AppResult<String> {
        self.send_to_llm(&self.model_name, prompt, Some(ANSWER_SYSTEM_MESSAGE), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::question::{QuestionKind, QuestionOption};
    use std::sync::Mutex;

    /// 按顺序返回预设结果
    struct ScriptedProvider {
        responses: Mutex<Vec<AppResult<String>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<AppResult<String>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str) -> AppResult<String> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn capital_question() -> Question {
        Question::new(
            "What is the capital of France?",
            vec![
                QuestionOption::from_text("London", "A"),
                QuestionOption::from_text("Paris", "B"),
            ],
            QuestionKind::FreeText,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_render_default_prompt() {
        let prompt = render_prompt(None, &capital_question());
        assert!(prompt.contains("Question: What is the capital of France?"));
        assert!(prompt.contains("A. London\nB. Paris"));
        assert!(prompt.ends_with("Respond ONLY with the letter of the correct option."));
    }

    #[test]
    fn test_render_custom_template() {
        let prompt = render_prompt(Some("Q={{question}} | {{options}}"), &capital_question());
        assert_eq!(prompt, "Q=What is the capital of France? | A. London\nB. Paris");
    }

    #[test]
    fn test_option_label() {
        assert_eq!(option_label(0), "A");
        assert_eq!(option_label(25), "Z");
        assert_eq!(option_label(26), "27");
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let provider = ScriptedProvider::new(vec![
            Err(AppError::llm_api_failed("scripted", "timeout")),
            Ok("   ".to_string()),
            Ok(" B ".to_string()),
        ]);
        let answer = ask_with_retries(&provider, "prompt", 3, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(answer, "B");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let provider = ScriptedProvider::new(vec![
            Err(AppError::llm_api_failed("scripted", "timeout")),
            Err(AppError::llm_api_failed("scripted", "refused")),
        ]);
        let err = ask_with_retries(&provider, "prompt", 2, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refused"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let config = Config {
            llm_api_key: String::new(),
            ..Config::default()
        };
        let service = LlmService::new(&config);
        assert!(!service.is_configured());
        let err = service.complete("hello").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::CollaboratorUnavailable));
    }

    /// 需要真实的 API Key：LLM_API_KEY=... cargo test test_live_completion -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_live_completion() {
        let _ = tracing_subscriber::fmt::try_init();
        let config = Config::from_env().unwrap();
        let service = LlmService::new(&config);
        let prompt = render_prompt(None, &capital_question());
        let answer = ask_with_retries(&service, &prompt, 3, Duration::from_secs(2))
            .await
            .unwrap();
        println!("LLM 响应: {}", answer);
        assert!(!answer.is_empty());
    }
}
