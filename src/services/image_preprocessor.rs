//! 图片预处理 - 业务能力层
//!
//! 任意编码的原始字节 → 归一化的灰度/二值图。对比度增强、二值化方式、纠偏、反色、放大
//! 都由图片统计量决定。解码成功之后不会再失败：预处理出错时退回普通灰度图。

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use imageproc::contrast::{adaptive_threshold, otsu_level, stretch_contrast, threshold, ThresholdType};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use tracing::{debug, warn};

use crate::error::{AppResult, ImageError};

/// OCR 引擎期望的极性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognizerPolarity {
    /// 白底黑字（tesseract 默认）
    #[default]
    DarkOnLight,
    /// 黑底白字
    LightOnDark,
}

/// 预处理参数
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    /// 宽度下限，小于该值时放大
    pub min_width: u32,
    /// 标准差低于该值视为低对比度
    pub low_contrast_std: f32,
    /// 均值低于该值视为偏暗，改用全局 Otsu 阈值
    pub dark_mean: f32,
    /// 自适应阈值的邻域半径
    pub adaptive_radius: u32,
    pub polarity: RecognizerPolarity,
    pub deskew: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_width: 800,
            low_contrast_std: 40.0,
            dark_mean: 100.0,
            adaptive_radius: 15,
            polarity: RecognizerPolarity::DarkOnLight,
            deskew: true,
        }
    }
}

/// 灰度统计量
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStats {
    pub mean: f32,
    pub std_dev: f32,
}

/// 候选图片
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// 用于日志的名称
    pub label: &'static str,
    pub image: GrayImage,
}

/// 图片预处理器
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// 解码并生成候选图片：完整归一化的在前，普通灰度图在后
    pub fn prepare(&self, bytes: &[u8]) -> AppResult<Vec<PreparedImage>> {
        let decoded = decode_image(bytes)?;
        let gray = decoded.to_luma8();
        debug!("图片解码完成: {}x{}", gray.width(), gray.height());

        let mut candidates = Vec::with_capacity(2);
        match self.normalize(&gray) {
            Ok(normalized) => candidates.push(PreparedImage {
                label: "normalized",
                image: normalized,
            }),
            Err(reason) => warn!("⚠️ 图片预处理失败，使用原始灰度图: {}", reason),
        }
        candidates.push(PreparedImage {
            label: "grayscale",
            image: gray,
        });
        Ok(candidates)
    }

    /// 完整归一化流程
    pub fn normalize(&self, gray: &GrayImage) -> Result<GrayImage, String> {
        if gray.width() == 0 || gray.height() == 0 {
            return Err(format!("图片尺寸为空: {}x{}", gray.width(), gray.height()));
        }

        let stats = image_stats(gray);
        debug!("图片统计: 均值 {:.1}, 标准差 {:.1}", stats.mean, stats.std_dev);

        let mut work = if stats.std_dev < self.config.low_contrast_std {
            debug!("低对比度，执行对比度拉伸");
            stretch_to_full_range(gray)
        } else {
            gray.clone()
        };

        work = if stats.mean < self.config.dark_mean {
            let level = otsu_level(&work);
            debug!("偏暗图片，使用 Otsu 全局阈值 {}", level);
            threshold(&work, level, ThresholdType::Binary)
        } else {
            adaptive_threshold(&work, self.config.adaptive_radius)
        };

        if self.config.deskew {
            if let Some(angle) = skew_angle(&work) {
                if angle.abs() > 0.1 {
                    debug!("纠偏角度 {:.2}°", angle);
                    work = rotate_replicate(&work, angle);
                }
            }
        }

        work = normalize_polarity(work, self.config.polarity);

        if work.width() < self.config.min_width {
            let scale = self.config.min_width as f32 / work.width() as f32;
            let height = ((work.height() as f32 * scale).round() as u32).max(1);
            debug!(
                "图片宽度 {} 小于 {}，放大到 {}x{}",
                work.width(),
                self.config.min_width,
                self.config.min_width,
                height
            );
            work = image::imageops::resize(&work, self.config.min_width, height, FilterType::Lanczos3);
        }

        Ok(work)
    }
}

/// 读取图片文件
pub fn read_image_file(path: impl AsRef<Path>) -> AppResult<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|source| {
        ImageError::ReadFailed {
            path: path.display().to_string(),
            source,
        }
        .into()
    })
}

/// 解码图片：先按常规格式解码，失败后把字节当作 base64 / data URL 再解一次
pub fn decode_image(bytes: &[u8]) -> AppResult<DynamicImage> {
    let primary = match image::load_from_memory(bytes) {
        Ok(img) => return Ok(img),
        Err(e) => e.to_string(),
    };
    match decode_base64_payload(bytes) {
        Ok(img) => {
            debug!("通过 base64 解码图片成功");
            Ok(img)
        }
        Err(secondary) => Err(ImageError::Unreadable {
            len: bytes.len(),
            primary,
            secondary,
        }
        .into()),
    }
}

fn decode_base64_payload(bytes: &[u8]) -> Result<DynamicImage, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| format!("不是文本: {}", e))?;
    let payload = match text.split_once(',') {
        Some((header, data)) if header.trim_start().starts_with("data:") => data,
        _ => text,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let raw = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("base64 解码失败: {}", e))?;
    image::load_from_memory(&raw).map_err(|e| e.to_string())
}

/// 编码为 PNG
pub fn encode_png(image: &GrayImage) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    Ok(buf)
}

/// 灰度均值和标准差
pub fn image_stats(image: &GrayImage) -> ImageStats {
    let n = (image.width() as f64) * (image.height() as f64);
    if n == 0.0 {
        return ImageStats {
            mean: 0.0,
            std_dev: 0.0,
        };
    }
    let (sum, sum_sq) = image.pixels().fold((0f64, 0f64), |(s, sq), p| {
        let v = p[0] as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    ImageStats {
        mean: mean as f32,
        std_dev: variance.sqrt() as f32,
    }
}

/// 把实际灰度范围线性拉伸到 0..=255
fn stretch_to_full_range(image: &GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    // 纯色图没有可拉伸的范围
    if max <= min {
        return image.clone();
    }
    stretch_contrast(image, min, max, 0, 255)
}

/// 前景像素的最小外接矩形倾角（度），没有前景时返回 `None`
///
/// 二值图中占少数的一方视为前景。
pub fn skew_angle(binary: &GrayImage) -> Option<f32> {
    let dark = binary.pixels().filter(|p| p[0] < 128).count();
    let total = (binary.width() * binary.height()) as usize;
    let foreground_is_dark = dark * 2 <= total;

    let points: Vec<Point<i32>> = binary
        .enumerate_pixels()
        .filter(|(_, _, p)| (p[0] < 128) == foreground_is_dark)
        .map(|(x, y, _)| Point::new(x as i32, y as i32))
        .collect();
    if points.len() < 3 {
        return None;
    }

    let rect = min_area_rect(&points);
    let dx = (rect[1].x - rect[0].x) as f32;
    let dy = (rect[1].y - rect[0].y) as f32;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    // 边的角度映射到 [-90, 0)
    let mut angle = dy.atan2(dx).to_degrees();
    while angle >= 0.0 {
        angle -= 90.0;
    }
    while angle < -90.0 {
        angle += 90.0;
    }

    let correction = if angle < -45.0 {
        -(90.0 + angle)
    } else {
        -angle
    };
    Some(correction)
}

/// 以中心为原点旋转 `degrees`，双线性插值，边界复制
///
/// 角度约定与 [`skew_angle`] 一致：传入它的返回值即可把倾斜拉平。
fn rotate_replicate(image: &GrayImage, degrees: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    let (cx, cy) = ((w as f32 - 1.0) / 2.0, (h as f32 - 1.0) / 2.0);
    let (sin, cos) = degrees.to_radians().sin_cos();
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;

    GrayImage::from_fn(w, h, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        // 输出点按 -degrees 反向映射回源图
        let sx = (cos * dx + sin * dy + cx).clamp(0.0, max_x);
        let sy = (cos * dy - sin * dx + cy).clamp(0.0, max_y);

        let x0 = sx.floor() as u32;
        let y0 = sy.floor() as u32;
        let x1 = (x0 + 1).min(w - 1);
        let y1 = (y0 + 1).min(h - 1);
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let px = |xx: u32, yy: u32| image.get_pixel(xx, yy)[0] as f32;
        let top = px(x0, y0) * (1.0 - fx) + px(x1, y0) * fx;
        let bottom = px(x0, y1) * (1.0 - fx) + px(x1, y1) * fx;
        Luma([(top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8])
    })
}

/// 按引擎期望的极性反色（均值高于中点视为浅色背景）
fn normalize_polarity(mut image: GrayImage, polarity: RecognizerPolarity) -> GrayImage {
    let light_background = image_stats(&image).mean > 127.5;
    let invert = match polarity {
        RecognizerPolarity::DarkOnLight => !light_background,
        RecognizerPolarity::LightOnDark => light_background,
    };
    if invert {
        image::imageops::invert(&mut image);
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 白底上画一条黑色横条
    fn bar_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if y >= height / 2 - 2 && y <= height / 2 + 2 && x >= 10 && x < width - 10 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_unreadable_image() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert_eq!(err.kind(), Some(crate::error::ErrorKind::UnreadableImage));
    }

    #[test]
    fn test_base64_data_url_decodes() {
        let png = encode_png(&bar_image(40, 20)).unwrap();
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let img = decode_image(data_url.as_bytes()).unwrap();
        assert_eq!(img.width(), 40);
    }

    #[test]
    fn test_candidates_order_and_upscale() {
        let png = encode_png(&bar_image(200, 60)).unwrap();
        let candidates = ImagePreprocessor::default().prepare(&png).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].label, "normalized");
        assert_eq!(candidates[0].image.width(), 800);
        assert_eq!(candidates[0].image.height(), 240);
        assert_eq!(candidates[1].label, "grayscale");
        assert_eq!(candidates[1].image.width(), 200);
    }

    #[test]
    fn test_polarity() {
        let dark_bg = GrayImage::from_pixel(10, 10, Luma([0]));
        let out = normalize_polarity(dark_bg.clone(), RecognizerPolarity::DarkOnLight);
        assert_eq!(out.get_pixel(0, 0)[0], 255);
        let out = normalize_polarity(dark_bg, RecognizerPolarity::LightOnDark);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_no_foreground_skips_deskew() {
        let blank = GrayImage::from_pixel(50, 50, Luma([255]));
        assert!(skew_angle(&blank).is_none());
    }

    #[test]
    fn test_axis_aligned_has_no_skew() {
        let angle = skew_angle(&bar_image(100, 40)).unwrap();
        assert!(angle.abs() < 0.5, "angle = {}", angle);
    }

    /// 白底上画一条绕中心倾斜 `degrees` 的黑色长条（y 轴向下）
    fn skewed_bar(degrees: f32) -> GrayImage {
        let (w, h) = (240u32, 160u32);
        let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
        let (sin, cos) = degrees.to_radians().sin_cos();
        GrayImage::from_fn(w, h, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let along = dx * cos + dy * sin;
            let across = dy * cos - dx * sin;
            if along.abs() <= 90.0 && across.abs() <= 4.0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_deskew_straightens_bar() {
        for degrees in [5.0f32, -5.0, 12.0, -12.0] {
            let skewed = skewed_bar(degrees);
            let correction = skew_angle(&skewed).unwrap();
            assert!(
                (correction + degrees).abs() < 1.0,
                "skew {}: correction {}",
                degrees,
                correction
            );

            let straightened = rotate_replicate(&skewed, correction);
            let residual = skew_angle(&straightened).unwrap();
            assert!(
                residual.abs() < 1.0,
                "skew {}: residual {}",
                degrees,
                residual
            );
        }
    }

    #[test]
    fn test_normalize_deskews() {
        let out = ImagePreprocessor::new(PreprocessConfig {
            min_width: 0,
            ..PreprocessConfig::default()
        })
        .normalize(&skewed_bar(8.0))
        .unwrap();
        let residual = skew_angle(&out).unwrap();
        assert!(residual.abs() < 1.0, "residual {}", residual);
    }

    #[test]
    fn test_stats_and_stretch() {
        let img = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 100 } else { 120 }]));
        let stats = image_stats(&img);
        assert!((stats.mean - 110.0).abs() < 1e-3);
        assert!((stats.std_dev - 10.0).abs() < 1e-3);
        let stretched = stretch_to_full_range(&img);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
        assert_eq!(stretched.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn test_empty_image_degrades() {
        let empty = GrayImage::new(0, 0);
        assert!(ImagePreprocessor::default().normalize(&empty).is_err());
    }
}
