//! 错误类型
//!
//! 核心只向调用方暴露五种失败类别（见 [`ErrorKind`]），
//! 具体的错误枚举携带足够的上下文（例如已尝试过的 OCR 配置），便于定位问题而不必盲目重试。

use thiserror::Error;

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    /// 所有解码器都无法读取图片
    UnreadableImage,
    /// 没有任何识别配置产出文本
    OcrExhausted,
    /// 所有检测策略都没有找到题目
    NoQuestionFound,
    /// 答案匹配级联全部失败
    UnresolvedAnswer,
    /// 页面 / OCR / LLM 等协作方不可用
    CollaboratorUnavailable,
}

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 图片相关错误
    #[error("图片错误: {0}")]
    Image(#[from] ImageError),
    /// OCR 相关错误
    #[error("OCR错误: {0}")]
    Ocr(#[from] OcrError),
    /// 题目检测错误
    #[error("检测错误: {0}")]
    Detection(#[from] DetectionError),
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 图片错误
#[derive(Debug, Error)]
pub enum ImageError {
    /// 主解码器和备用解码器都失败
    #[error("无法解码图片 ({len} 字节): 主解码器: {primary}; 备用解码器: {secondary}")]
    Unreadable {
        len: usize,
        primary: String,
        secondary: String,
    },
    /// 读取图片文件失败
    #[error("读取图片文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 编码图片失败
    #[error("编码图片失败: {0}")]
    EncodeFailed(String),
}

/// OCR 错误
#[derive(Debug, Error)]
pub enum OcrError {
    /// 所有配置都没有识别出文本
    #[error("OCR 识别耗尽: 已尝试 {} 种配置均无文本 [{}]", .attempted.len(), .attempted.join(", "))]
    Exhausted { attempted: Vec<String> },
    /// 单次识别调用失败（在扫描中会被吸收）
    #[error("OCR 调用失败 ({config}): {message}")]
    EngineFailed { config: String, message: String },
    /// OCR 引擎未安装
    #[error("OCR 引擎不可用: {engine}")]
    EngineUnavailable { engine: String },
}

/// 题目检测错误
#[derive(Debug, Error)]
pub enum DetectionError {
    /// 所有策略都没有产出题目
    #[error("未找到题目 (来源: {source_desc})")]
    NoQuestionFound { source_desc: String },
    /// 页面快照失败
    #[error("页面快照失败: {0}")]
    SnapshotFailed(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {message}")]
    ConnectionFailed { port: u16, message: String },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {0}")]
    LaunchFailed(String),
    /// 导航失败
    #[error("导航到 {url} 失败: {message}")]
    NavigationFailed { url: String, message: String },
    /// 执行脚本失败
    #[error("执行脚本失败: {0}")]
    ScriptExecutionFailed(String),
    /// 选项元素已不在页面中
    #[error("页面中找不到节点 #{node}")]
    ElementMissing { node: usize },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 构建请求失败
    #[error("构建LLM请求失败: {0}")]
    RequestBuildFailed(String),
    /// 未配置 API Key
    #[error("未配置 LLM API Key")]
    MissingApiKey,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {message}")]
    FileReadFailed { path: String, message: String },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {message}")]
    TomlParseFailed { path: String, message: String },
    /// 配置值非法
    #[error("配置项 {field} 非法: {message}")]
    InvalidValue { field: String, message: String },
}

impl AppError {
    /// 映射到失败类别
    ///
    /// 返回 `None` 表示属于管道之外的错误（配置、脚本执行等）。
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Image(ImageError::Unreadable { .. }) => Some(ErrorKind::UnreadableImage),
            AppError::Image(_) => None,
            AppError::Ocr(OcrError::Exhausted { .. }) => Some(ErrorKind::OcrExhausted),
            AppError::Ocr(OcrError::EngineUnavailable { .. }) => {
                Some(ErrorKind::CollaboratorUnavailable)
            }
            AppError::Ocr(OcrError::EngineFailed { .. }) => None,
            AppError::Detection(DetectionError::NoQuestionFound { .. }) => {
                Some(ErrorKind::NoQuestionFound)
            }
            AppError::Detection(DetectionError::SnapshotFailed(_)) => {
                Some(ErrorKind::CollaboratorUnavailable)
            }
            AppError::Browser(BrowserError::ConnectionFailed { .. })
            | AppError::Browser(BrowserError::LaunchFailed(_)) => {
                Some(ErrorKind::CollaboratorUnavailable)
            }
            AppError::Browser(_) => None,
            AppError::Llm(LlmError::ApiCallFailed { .. }) | AppError::Llm(LlmError::MissingApiKey) => {
                Some(ErrorKind::CollaboratorUnavailable)
            }
            AppError::Llm(_) => None,
            AppError::Config(_) | AppError::Other(_) => None,
        }
    }

    /// 创建浏览器连接错误
    pub fn browser_connection_failed(port: u16, source: impl std::fmt::Display) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            message: source.to_string(),
        })
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(model: impl Into<String>, source: impl std::fmt::Display) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            message: source.to_string(),
        })
    }

    /// 创建"未找到题目"错误
    pub fn no_question_found(source_desc: impl Into<String>) -> Self {
        AppError::Detection(DetectionError::NoQuestionFound {
            source_desc: source_desc.into(),
        })
    }
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed(err.to_string()))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("JSON解析失败: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(format!("IO错误: {}", err))
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(ImageError::EncodeFailed(err.to_string()))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Other(format!("HTTP请求失败: {}", err))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(ConfigError::TomlParseFailed {
            path: String::new(),
            message: err.to_string(),
        })
    }
}

impl From<async_openai::error::OpenAIError> for AppError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        AppError::Llm(LlmError::RequestBuildFailed(err.to_string()))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
