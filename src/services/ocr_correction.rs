//! OCR 文本纠错
//!
//! 只作用于扫描选出的最佳文本，按固定顺序执行：
//! 1. 切出行首的选项标记，标记不参与字典替换
//! 2. 按词的上下文做字符混淆替换（`0↔o`、`1↔l`、`5↔s`、符号→字母）
//! 3. 选项标记统一成 `a)` 形式
//! 4. 折叠空白，去掉不可打印字符

use once_cell::sync::Lazy;
use phf::phf_map;
use regex::Regex;

use crate::models::question::has_question_mark;

/// 纠错规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionRules {
    /// 把误识别的数字标记（如 `5)`）当作字母标记（`b)`）
    pub marker_fix: bool,
}

impl Default for CorrectionRules {
    fn default() -> Self {
        Self { marker_fix: true }
    }
}

/// 以字母为主的词里，误识别成数字/符号的字符
static LETTER_CONFUSIONS: phf::Map<char, char> = phf_map! {
    '0' => 'o',
    '1' => 'l',
    '5' => 's',
    '@' => 'a',
    '$' => 's',
    '|' => 'l',
};

/// 以数字为主的词里，误识别成字母的字符
static DIGIT_CONFUSIONS: phf::Map<char, char> = phf_map! {
    'o' => '0',
    'O' => '0',
    'l' => '1',
    'I' => '1',
    's' => '5',
    'S' => '5',
};

/// 圆圈字母一类的符号标记
static SYMBOL_MARKERS: phf::Map<char, char> = phf_map! {
    '@' => 'a',
    '©' => 'c',
    '¢' => 'c',
};

/// 选项标记位置上常见的数字误读
static MARKER_MISREADS: phf::Map<char, char> = phf_map! {
    '5' => 'b',
    '6' => 'b',
};

const BULLETS: &[char] = &['•', '●', '▪', '◦', '○', '■', '□', '·', '*', '-', '–'];

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\((?P<paren>[^\s()])\)|\[(?P<bracket>[^\s\[\]])\]|(?P<delim>[A-Za-z0-9@©¢])[).]|(?P<symbol>[•●▪◦○■□·*\-–@©¢]))(?P<rest>\s.*|$)",
    )
    .expect("marker regex")
});

/// 序数词和年代（`1st`、`5th`、`1990s`），字母和数字都是真实的
static ORDINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d+(?:st|nd|rd|th|s)$").expect("ordinal regex"));

/// 当前连续选项行的标记类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerRun {
    None,
    Letters,
    Numbers,
    Bullets(usize),
}

/// 对识别文本做完整纠错
pub fn correct_text(text: &str, rules: &CorrectionRules) -> String {
    let mut run = MarkerRun::None;
    let mut out = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        let split = if has_question_mark(line) {
            None
        } else {
            split_marker(line)
        };

        let corrected = match split {
            Some((core, rest)) => {
                let body = correct_words(rest);
                match canonical_marker(core, rules, &mut run) {
                    Some(letter) => format!("{}) {}", letter, body),
                    None => format!("{} {}", core_as_written(line, rest), body),
                }
            }
            None => {
                run = MarkerRun::None;
                correct_words(line)
            }
        };

        let cleaned = clean_line(&corrected);
        if !cleaned.is_empty() {
            out.push(cleaned);
        }
    }

    out.join("\n")
}

/// 切出行首标记，返回（标记核心字符，其余文本）
fn split_marker(line: &str) -> Option<(char, &str)> {
    let caps = MARKER_RE.captures(line)?;
    let core = ["paren", "bracket", "delim", "symbol"]
        .iter()
        .find_map(|name| caps.name(name))
        .and_then(|m| m.as_str().chars().next())?;
    let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or_default();
    Some((core, rest))
}

/// 原样保留的标记文本（无法规范化时使用）
fn core_as_written<'a>(line: &'a str, rest: &str) -> &'a str {
    &line[..line.len() - rest.len()]
}

/// 标记核心字符 → 规范字母
fn canonical_marker(core: char, rules: &CorrectionRules, run: &mut MarkerRun) -> Option<char> {
    if core.is_ascii_alphabetic() {
        *run = MarkerRun::Letters;
        return Some(core.to_ascii_lowercase());
    }
    if let Some(&letter) = SYMBOL_MARKERS.get(&core) {
        *run = MarkerRun::Letters;
        return Some(letter);
    }
    if core.is_ascii_digit() {
        if rules.marker_fix && *run != MarkerRun::Numbers {
            if let Some(&letter) = MARKER_MISREADS.get(&core) {
                *run = MarkerRun::Letters;
                return Some(letter);
            }
        }
        let digit = core.to_digit(10)?;
        if digit == 0 {
            return None;
        }
        *run = MarkerRun::Numbers;
        return Some((b'a' + (digit - 1) as u8) as char);
    }
    if BULLETS.contains(&core) {
        let index = match *run {
            MarkerRun::Bullets(n) => n,
            _ => 0,
        };
        *run = MarkerRun::Bullets(index + 1);
        return (index < 26).then(|| (b'a' + index as u8) as char);
    }
    None
}

/// 按词做字符混淆替换
fn correct_words(text: &str) -> String {
    text.split_whitespace()
        .map(correct_token)
        .collect::<Vec<_>>()
        .join(" ")
}

fn correct_token(token: &str) -> String {
    if token == "|" {
        return "I".to_string();
    }
    let core = token.trim_matches(|c: char| !c.is_alphanumeric());
    if ORDINAL_RE.is_match(core) {
        return token.to_string();
    }

    let chars: Vec<char> = token.chars().collect();
    let letters = chars.iter().filter(|c| c.is_alphabetic()).count();
    let digits = chars.iter().filter(|c| c.is_ascii_digit()).count();

    if letters > digits && chars.iter().any(|c| LETTER_CONFUSIONS.contains_key(c)) {
        let upper = letters >= 2 && chars.iter().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase());
        chars
            .iter()
            .enumerate()
            .map(|(i, &c)| match LETTER_CONFUSIONS.get(&c) {
                Some(&fixed) if surrounded_by_letters(&chars, i) => match (upper, fixed) {
                    (true, 'l') => 'I',
                    (true, other) => other.to_ascii_uppercase(),
                    (false, other) => other,
                },
                _ => c,
            })
            .collect()
    } else if digits > letters && letters > 0 {
        token
            .chars()
            .map(|c| DIGIT_CONFUSIONS.get(&c).copied().unwrap_or(c))
            .collect()
    } else {
        token.to_string()
    }
}

/// 混淆字符两侧紧邻的真实字母合计至少两个
fn surrounded_by_letters(chars: &[char], index: usize) -> bool {
    let left = chars[..index].iter().rev().take_while(|c| c.is_alphabetic()).count();
    let right = chars[index + 1..].iter().take_while(|c| c.is_alphabetic()).count();
    left + right >= 2
}

/// 折叠空白并去掉不可打印字符
fn clean_line(line: &str) -> String {
    let printable: String = line
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .collect();
    printable.split_whitespace().collect::<Vec<_>>().join(" ")
}
