//! 答案匹配服务 - 业务能力层
//!
//! 把 LLM 返回的自由文本映射到选项索引。按固定顺序尝试 8 种策略，第一个成功的胜出；
//! 全部失败时返回 [`MatchResult::Unresolved`]，调用方必须显式处理。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::question::{MatchResult, MatchStrategy};
use crate::utils::logging::truncate_text;

static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-D])\b").expect("letter regex"));
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([1-9])\b").expect("number regex"));
static OPTION_KEYWORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\boption\s*([A-D1-9])\b").expect("option regex"));
static ANSWER_IS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)the answer is\s*([A-D1-9])\b").expect("answer-is regex"));
static ANNOTATED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Da-d])\s*\([^)]+\)").expect("annotated regex"));

/// 匹配参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// 模糊匹配阈值（严格大于才算命中）
    pub fuzzy_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.8,
        }
    }
}

/// 答案匹配器
#[derive(Debug, Clone, Default)]
pub struct AnswerResolver {
    config: ResolverConfig,
}

impl AnswerResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// 把响应映射到选项索引
    pub fn resolve<S: AsRef<str>>(&self, response: &str, options: &[S]) -> MatchResult {
        let count = options.len();
        if count == 0 {
            return MatchResult::Unresolved;
        }
        let options: Vec<&str> = options.iter().map(|o| o.as_ref()).collect();
        let raw = response.trim();
        let norm_response = normalize(raw);
        let norm_options: Vec<String> = options.iter().map(|o| normalize(o)).collect();

        let result = letter_match(raw, count)
            .map(|i| (i, MatchStrategy::Letter))
            .or_else(|| number_match(raw, count).map(|i| (i, MatchStrategy::Number)))
            .or_else(|| {
                exact_match(&norm_response, &norm_options).map(|i| (i, MatchStrategy::ExactText))
            })
            .or_else(|| {
                substring_match(&norm_response, &norm_options)
                    .map(|i| (i, MatchStrategy::Substring))
            })
            .or_else(|| {
                fuzzy_match(&norm_response, &norm_options, self.config.fuzzy_threshold)
                    .map(|i| (i, MatchStrategy::Fuzzy))
            })
            .or_else(|| keyword_match(raw, count).map(|i| (i, MatchStrategy::KeywordPattern)))
            .or_else(|| {
                annotated_match(raw, count).map(|i| (i, MatchStrategy::AnnotatedPattern))
            })
            .or_else(|| {
                no_space_match(&norm_response, &norm_options)
                    .map(|i| (i, MatchStrategy::NoSpaceExact))
            });

        match result {
            Some((index, strategy)) => {
                debug!(
                    "✓ 答案匹配成功 [{}]: '{}' → 选项 {}",
                    strategy,
                    truncate_text(raw, 40),
                    index + 1
                );
                MatchResult::Resolved { index, strategy }
            }
            None => {
                warn!("⚠️ 无法匹配答案: '{}'", truncate_text(raw, 80));
                MatchResult::Unresolved
            }
        }
    }
}

/// 文本归一化：小写、NFKD 兼容分解并去掉组合符号、去标点、空白折叠
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn in_range(index: usize, count: usize) -> Option<usize> {
    (index < count).then_some(index)
}

/// 字母或数字标记转成索引
fn marker_index(marker: &str) -> Option<usize> {
    let c = marker.chars().next()?;
    match c {
        'A'..='Z' => Some(c as usize - 'A' as usize),
        'a'..='z' => Some(c as usize - 'a' as usize),
        '1'..='9' => Some(c as usize - '1' as usize),
        _ => None,
    }
}

fn letter_match(raw: &str, count: usize) -> Option<usize> {
    let caps = LETTER_RE.captures(raw)?;
    in_range(marker_index(&caps[1])?, count)
}

fn number_match(raw: &str, count: usize) -> Option<usize> {
    let caps = NUMBER_RE.captures(raw)?;
    in_range(marker_index(&caps[1])?, count)
}

fn exact_match(response: &str, options: &[String]) -> Option<usize> {
    if response.is_empty() {
        return None;
    }
    options.iter().position(|o| o == response)
}

/// `needle` 的词序列是否连续出现在 `haystack` 的词序列中
fn contains_tokens(haystack: &[&str], needle: &[&str]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

fn substring_match(response: &str, options: &[String]) -> Option<usize> {
    let resp_tokens: Vec<&str> = response.split_whitespace().collect();
    if resp_tokens.is_empty() {
        return None;
    }
    options.iter().position(|o| {
        let opt_tokens: Vec<&str> = o.split_whitespace().collect();
        contains_tokens(&resp_tokens, &opt_tokens) || contains_tokens(&opt_tokens, &resp_tokens)
    })
}

/// 响应与选项的最佳相似度：整句以及每个与选项等长的词窗口
fn similarity(response: &str, resp_tokens: &[&str], option: &str) -> f64 {
    let mut best = strsim::normalized_levenshtein(response, option);
    let width = option.split_whitespace().count();
    if width > 0 && width <= resp_tokens.len() {
        for window in resp_tokens.windows(width) {
            let score = strsim::normalized_levenshtein(&window.join(" "), option);
            if score > best {
                best = score;
            }
        }
    }
    best
}

fn fuzzy_match(response: &str, options: &[String], threshold: f64) -> Option<usize> {
    if response.is_empty() {
        return None;
    }
    let resp_tokens: Vec<&str> = response.split_whitespace().collect();
    let mut best: Option<(usize, f64)> = None;
    for (i, option) in options.iter().enumerate() {
        if option.is_empty() {
            continue;
        }
        let score = similarity(response, &resp_tokens, option);
        if score > threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    if let Some((i, score)) = best {
        debug!("模糊匹配得分 {:.3} → 选项 {}", score, i + 1);
    }
    best.map(|(i, _)| i)
}

fn keyword_match(raw: &str, count: usize) -> Option<usize> {
    [&*OPTION_KEYWORD_RE, &*ANSWER_IS_RE].iter().find_map(|re| {
        let caps = re.captures(raw)?;
        let marker = caps[1].to_uppercase();
        in_range(marker_index(&marker)?, count)
    })
}

fn annotated_match(raw: &str, count: usize) -> Option<usize> {
    let caps = ANNOTATED_RE.captures(raw)?;
    in_range(marker_index(&caps[1].to_uppercase())?, count)
}

fn no_space_match(response: &str, options: &[String]) -> Option<usize> {
    let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    let resp = squash(response);
    if resp.is_empty() {
        return None;
    }
    options.iter().position(|o| squash(o) == resp)
}
