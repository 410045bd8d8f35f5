//! OCR 引擎 - 业务能力层
//!
//! [`OcrEngine`] 是识别扫描依赖的外部协作方；默认实现调用 `tesseract` 命令行并解析 TSV 输出。

use std::process::Command;

use image::GrayImage;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{AppResult, ImageError, OcrError};

/// 单次识别请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    pub language: String,
    /// 页面分割模式（psm）
    pub segmentation_mode: u8,
    /// 引擎模式（oem）
    pub engine_mode: u8,
    pub whitelist: Option<String>,
}

impl OcrRequest {
    /// 日志和错误里使用的配置描述
    pub fn describe(&self) -> String {
        format!("psm={} oem={}", self.segmentation_mode, self.engine_mode)
    }
}

/// 识别出的词
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    /// 0..=100，引擎无法给出时为负数
    pub confidence: f32,
}

/// 识别结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    pub text: String,
    pub tokens: Vec<OcrToken>,
}

/// OCR 引擎
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// 引擎是否可用（例如二进制是否已安装）
    fn is_available(&self) -> bool;

    fn recognize(&self, image: &GrayImage, request: &OcrRequest) -> AppResult<OcrOutput>;
}

/// tesseract 命令行
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    tessdata_dir: Option<String>,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, tessdata_dir: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            tessdata_dir,
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract", None)
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn recognize(&self, image: &GrayImage, request: &OcrRequest) -> AppResult<OcrOutput> {
        let failed = |message: String| OcrError::EngineFailed {
            config: request.describe(),
            message,
        };

        let temp_input = NamedTempFile::with_suffix(".png").map_err(|e| failed(e.to_string()))?;
        image
            .save(temp_input.path())
            .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(temp_input.path()).arg("stdout");
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.arg("-l")
            .arg(&request.language)
            .arg("--psm")
            .arg(request.segmentation_mode.to_string())
            .arg("--oem")
            .arg(request.engine_mode.to_string());
        if let Some(whitelist) = &request.whitelist {
            cmd.arg("-c")
                .arg(format!("tessedit_char_whitelist={}", whitelist));
        }
        cmd.arg("tsv");

        debug!("运行 tesseract ({})", request.describe());
        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OcrError::EngineUnavailable {
                    engine: self.binary.clone(),
                }
            } else {
                failed(e.to_string())
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(stderr.trim().to_string()).into());
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// 解析 tesseract TSV 输出，按 (block, par, line) 组行
pub fn parse_tsv(tsv: &str) -> OcrOutput {
    let mut lines: Vec<String> = Vec::new();
    let mut tokens = Vec::new();
    let mut current_key: Option<(i32, i32, i32, i32)> = None;
    let mut current_words: Vec<String> = Vec::new();

    // 字段: level, page_num, block_num, par_num, line_num, word_num,
    //       left, top, width, height, conf, text
    for row in tsv.lines().skip(1) {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }
        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }
        let key = (
            fields[1].parse().unwrap_or(-1),
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        if current_key != Some(key) {
            if !current_words.is_empty() {
                lines.push(current_words.join(" "));
                current_words.clear();
            }
            current_key = Some(key);
        }
        current_words.push(text.to_string());
        tokens.push(OcrToken {
            text: text.to_string(),
            confidence: fields[10].parse().unwrap_or(-1.0),
        });
    }
    if !current_words.is_empty() {
        lines.push(current_words.join(" "));
    }

    OcrOutput {
        text: lines.join("\n"),
        tokens,
    }
}
