use std::path::Path;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};
use crate::services::answer_resolver::ResolverConfig;
use crate::services::image_preprocessor::{PreprocessConfig, RecognizerPolarity};
use crate::services::ocr_correction::CorrectionRules;
use crate::services::recognition_sweep::SweepConfig;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "mcq_solver.toml";

/// 运行模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// 在浏览器页面中检测题目
    Page,
    /// 从图片中识别题目
    Image,
}

impl std::str::FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "page" => Ok(RunMode::Page),
            "image" => Ok(RunMode::Image),
            other => Err(ConfigError::EnvVarParseFailed {
                var_name: "RUN_MODE".to_string(),
                value: other.to_string(),
                expected_type: "page | image".to_string(),
            }),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 运行模式
    pub run_mode: RunMode,
    // --- 浏览器配置 ---
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 目标URL
    pub target_url: String,
    /// 是否自行启动无头浏览器（否则连接调试端口）
    pub launch_headless: bool,
    /// 浏览器可执行文件路径
    pub chrome_executable: Option<String>,
    // --- 图片模式 ---
    /// 待识别的图片路径
    pub image_path: Option<String>,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 视觉兜底识别使用的模型
    pub vision_model_name: String,
    pub llm_temperature: f32,
    /// LLM 调用失败时的最大尝试次数
    pub max_retries: usize,
    /// 自定义提示词模板，支持 `{{question}}` 和 `{{options}}` 占位符
    pub prompt_template: Option<String>,
    // --- 自动作答 ---
    /// 匹配成功后是否自动点击选项
    pub auto_answer: bool,
    /// 点击前的等待时间（毫秒）
    pub answer_delay_ms: u64,
    // --- OCR 配置 ---
    pub tesseract_path: String,
    pub tessdata_dir: Option<String>,
    pub ocr_language: String,
    pub ocr_whitelist: Option<String>,
    /// 是否把误识别的选项标记（如 `5)`）修正为字母标记
    pub ocr_marker_fix: bool,
    pub ocr_common_word_bonus: f32,
    // --- 图片预处理 ---
    pub min_image_width: u32,
    pub low_contrast_std: f32,
    pub dark_mean: f32,
    pub light_text_on_dark: bool,
    // --- 答案匹配 ---
    pub fuzzy_threshold: f64,
    // --- 兜底识别 ---
    pub cloud_vision_api_key: Option<String>,
    // --- 日志 ---
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 无法确定答案的题目写入的文件
    pub warn_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Page,
            browser_debug_port: 9222,
            target_url: "about:blank".to_string(),
            launch_headless: false,
            chrome_executable: None,
            image_path: None,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            vision_model_name: "gpt-4o".to_string(),
            llm_temperature: 0.1,
            max_retries: 3,
            prompt_template: None,
            auto_answer: true,
            answer_delay_ms: 1500,
            tesseract_path: "tesseract".to_string(),
            tessdata_dir: None,
            ocr_language: "eng".to_string(),
            ocr_whitelist: None,
            ocr_marker_fix: true,
            ocr_common_word_bonus: 1.5,
            min_image_width: 800,
            low_contrast_std: 40.0,
            dark_mean: 100.0,
            light_text_on_dark: false,
            fuzzy_threshold: 0.8,
            cloud_vision_api_key: None,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            warn_file: "warn.txt".to_string(),
        }
    }
}

impl Config {
    /// 加载配置
    ///
    /// 先读取 `MCQ_CONFIG` 指定的文件（或当前目录下的 `mcq_solver.toml`），再用环境变量覆盖。
    pub fn load() -> AppResult<Self> {
        let file = std::env::var("MCQ_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let base = if Path::new(&file).exists() {
            Self::from_toml_file(&file)?
        } else {
            Self::default()
        };
        let config = base.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// 只从环境变量读取（缺省值来自 `Default`）
    pub fn from_env() -> AppResult<Self> {
        Self::default().apply_env()
    }

    /// 从 TOML 文件读取，未出现的字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// 从 TOML 字符串读取
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Config = toml::from_str(content).map_err(|e| ConfigError::TomlParseFailed {
            path: String::new(),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// 用环境变量覆盖已有配置
    pub fn apply_env(self) -> AppResult<Self> {
        let d = self;
        Ok(Self {
            run_mode: env_parse("RUN_MODE", "page | image")?.unwrap_or(d.run_mode),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", "u16")?.unwrap_or(d.browser_debug_port),
            target_url: std::env::var("TARGET_URL").unwrap_or(d.target_url),
            launch_headless: env_parse("LAUNCH_HEADLESS", "bool")?.unwrap_or(d.launch_headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().or(d.chrome_executable),
            image_path: std::env::var("IMAGE_PATH").ok().or(d.image_path),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(d.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(d.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(d.llm_model_name),
            vision_model_name: std::env::var("VISION_MODEL_NAME").unwrap_or(d.vision_model_name),
            llm_temperature: env_parse("LLM_TEMPERATURE", "f32")?.unwrap_or(d.llm_temperature),
            max_retries: env_parse("MAX_RETRIES", "usize")?.unwrap_or(d.max_retries),
            prompt_template: std::env::var("PROMPT_TEMPLATE").ok().or(d.prompt_template),
            auto_answer: env_parse("AUTO_ANSWER", "bool")?.unwrap_or(d.auto_answer),
            answer_delay_ms: env_parse("ANSWER_DELAY_MS", "u64")?.unwrap_or(d.answer_delay_ms),
            tesseract_path: std::env::var("TESSERACT_PATH").unwrap_or(d.tesseract_path),
            tessdata_dir: std::env::var("TESSDATA_DIR").ok().or(d.tessdata_dir),
            ocr_language: std::env::var("OCR_LANGUAGE").unwrap_or(d.ocr_language),
            ocr_whitelist: std::env::var("OCR_WHITELIST").ok().or(d.ocr_whitelist),
            ocr_marker_fix: env_parse("OCR_MARKER_FIX", "bool")?.unwrap_or(d.ocr_marker_fix),
            ocr_common_word_bonus: env_parse("OCR_COMMON_WORD_BONUS", "f32")?
                .unwrap_or(d.ocr_common_word_bonus),
            min_image_width: env_parse("MIN_IMAGE_WIDTH", "u32")?.unwrap_or(d.min_image_width),
            low_contrast_std: env_parse("LOW_CONTRAST_STD", "f32")?.unwrap_or(d.low_contrast_std),
            dark_mean: env_parse("DARK_MEAN", "f32")?.unwrap_or(d.dark_mean),
            light_text_on_dark: env_parse("LIGHT_TEXT_ON_DARK", "bool")?.unwrap_or(d.light_text_on_dark),
            fuzzy_threshold: env_parse("FUZZY_THRESHOLD", "f64")?.unwrap_or(d.fuzzy_threshold),
            cloud_vision_api_key: std::env::var("CLOUD_VISION_API_KEY").ok().or(d.cloud_vision_api_key),
            verbose_logging: env_parse("VERBOSE_LOGGING", "bool")?.unwrap_or(d.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(d.output_log_file),
            warn_file: std::env::var("WARN_FILE").unwrap_or(d.warn_file),
        })
    }

    /// 校验取值范围
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "fuzzy_threshold".to_string(),
                message: format!("{} 不在 [0, 1] 范围内", self.fuzzy_threshold),
            }
            .into());
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_retries".to_string(),
                message: "至少需要尝试 1 次".to_string(),
            }
            .into());
        }
        if self.run_mode == RunMode::Image && self.image_path.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "image_path".to_string(),
                message: "图片模式必须提供 IMAGE_PATH".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// 图片预处理参数
    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            min_width: self.min_image_width,
            low_contrast_std: self.low_contrast_std,
            dark_mean: self.dark_mean,
            polarity: if self.light_text_on_dark {
                RecognizerPolarity::LightOnDark
            } else {
                RecognizerPolarity::DarkOnLight
            },
            ..PreprocessConfig::default()
        }
    }

    /// 识别扫描参数
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            language: self.ocr_language.clone(),
            whitelist: self.ocr_whitelist.clone(),
            common_word_bonus: self.ocr_common_word_bonus,
            correction: CorrectionRules {
                marker_fix: self.ocr_marker_fix,
            },
            ..SweepConfig::default()
        }
    }

    /// 答案匹配参数
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            fuzzy_threshold: self.fuzzy_threshold,
        }
    }
}

/// 读取并解析一个可选的环境变量
fn env_parse<T: std::str::FromStr>(var_name: &str, expected_type: &str) -> AppResult<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_partial_override() {
        let config = Config::from_toml_str(
            r#"
run_mode = "image"
image_path = "quiz.png"
fuzzy_threshold = 0.75
ocr_marker_fix = false
"#,
        )
        .unwrap();

        assert_eq!(config.run_mode, RunMode::Image);
        assert_eq!(config.image_path.as_deref(), Some("quiz.png"));
        assert!((config.fuzzy_threshold - 0.75).abs() < f64::EPSILON);
        assert!(!config.ocr_marker_fix);
        // 未出现的字段保持默认值
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.ocr_language, "eng");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("run_mode = 3").unwrap_err();
        assert!(err.to_string().contains("TOML"));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = Config {
            fuzzy_threshold: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_image_mode_requires_path() {
        let config = Config {
            run_mode: RunMode::Image,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_mode_from_str() {
        assert_eq!("Page".parse::<RunMode>().unwrap(), RunMode::Page);
        assert_eq!(" image ".parse::<RunMode>().unwrap(), RunMode::Image);
        assert!("video".parse::<RunMode>().is_err());
    }

    #[test]
    fn test_derived_configs() {
        let config = Config {
            light_text_on_dark: true,
            ocr_marker_fix: false,
            ..Config::default()
        };
        assert_eq!(config.preprocess_config().polarity, RecognizerPolarity::LightOnDark);
        assert!(!config.sweep_config().correction.marker_fix);
        assert!((config.resolver_config().fuzzy_threshold - 0.8).abs() < f64::EPSILON);
    }
}
