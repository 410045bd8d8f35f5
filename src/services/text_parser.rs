//! 文本题目解析 - 业务能力层
//!
//! 把 OCR 或页面纯文本按行切分，用一个小状态机识别"题干 + 选项"。
//! 纯函数：同样的输入总是得到同样的输出。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::question::{has_question_mark, Question, QuestionKind, QuestionOption};

/// 选项行：`(A)`、`[A]`、`A)`、`1.`、`A-`、`A:`、项目符号
static OPTION_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:\([A-Za-z0-9]\)|\[[A-Za-z0-9]\]|[A-Za-z0-9]\)|[A-Za-z0-9]\.(?:\s|$)|[A-Za-z]\s?[-:](?:\s|$)|[•●▪◦○■□·*\-–](?:\s|$))\s*(?P<body>.*)$",
    )
    .expect("option line regex")
});

/// 选项文本开头的杂散符号
const STRAY_LEADING: &[char] = &[
    '|', '•', '●', '▪', '◦', '○', '·', '*', '~', '_', '=', '>', ':', ';', ',', '.', ')', ']', '-', '–',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    SeekingQuestion,
    AccumulatingQuestion,
}

#[derive(Debug, Default)]
struct PendingQuestion {
    lines: Vec<String>,
    options: Vec<String>,
}

impl PendingQuestion {
    fn start(line: &str) -> Self {
        Self {
            lines: vec![line.to_string()],
            options: Vec::new(),
        }
    }

    fn has_question_mark(&self) -> bool {
        self.lines.iter().any(|l| has_question_mark(l))
    }

    fn into_question(self) -> Option<Question> {
        let options = self
            .options
            .into_iter()
            .map(|text| QuestionOption::from_text(text.clone(), text))
            .collect();
        Question::new(self.lines.join(" "), options, QuestionKind::FreeText, None)
    }
}

/// 如果是选项行，返回去掉标记后的选项文本（可能为空）
///
/// 含问号的行一律当作题干处理。
pub fn parse_option_line(line: &str) -> Option<String> {
    let line = line.trim();
    if has_question_mark(line) {
        return None;
    }
    let caps = OPTION_LINE_RE.captures(line)?;
    let body = caps.name("body").map(|m| m.as_str()).unwrap_or_default();
    Some(clean_option_text(body))
}

fn clean_option_text(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut rest = collapsed.as_str();
    loop {
        let mut chars = rest.chars();
        let Some(first) = chars.next() else { break };
        let after = chars.as_str();
        // `-5`、`.5` 里的符号属于数值本身
        let strippable = first.is_whitespace()
            || (STRAY_LEADING.contains(&first) && !after.starts_with(|c: char| c.is_ascii_digit()));
        if !strippable {
            break;
        }
        rest = after;
    }
    rest.to_string()
}

fn is_option_line(line: &str) -> bool {
    parse_option_line(line).is_some()
}

/// 从文本中解析题目
pub fn parse_questions(text: &str) -> Vec<Question> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut questions = Vec::new();
    let mut state = ParserState::SeekingQuestion;
    let mut pending = PendingQuestion::default();

    for (i, line) in lines.iter().enumerate() {
        if let Some(option) = parse_option_line(line) {
            if state == ParserState::AccumulatingQuestion && !option.is_empty() {
                pending.options.push(option);
            }
            continue;
        }

        let next_is_option = lines.get(i + 1).map(|l| is_option_line(l)).unwrap_or(false);
        let starts_question = has_question_mark(line) || next_is_option;

        match state {
            ParserState::SeekingQuestion => {
                if starts_question {
                    pending = PendingQuestion::start(line);
                    state = ParserState::AccumulatingQuestion;
                }
            }
            ParserState::AccumulatingQuestion if pending.options.is_empty() => {
                // 还没出现选项：多行题干，或者被新的问句替换
                if has_question_mark(line) && pending.has_question_mark() {
                    pending = PendingQuestion::start(line);
                } else {
                    pending.lines.push(line.to_string());
                }
            }
            ParserState::AccumulatingQuestion => {
                if starts_question {
                    let finished = std::mem::replace(&mut pending, PendingQuestion::start(line));
                    questions.extend(finished.into_question());
                }
            }
        }
    }

    if state == ParserState::AccumulatingQuestion {
        questions.extend(pending.into_question());
    }

    debug!("文本解析完成: {} 行 → {} 道题", lines.len(), questions.len());
    questions
}

/// 选项字母标记
fn option_marker(index: usize) -> String {
    if index < 26 {
        format!("{})", (b'A' + index as u8) as char)
    } else {
        "*".to_string()
    }
}

/// 把题目写回规范文本（`A)` 标记，题目之间空一行）
pub fn render_canonical(questions: &[Question]) -> String {
    questions
        .iter()
        .map(|q| {
            let mut block = q.text.clone();
            for (i, option) in q.options.iter().enumerate() {
                block.push('\n');
                block.push_str(&option_marker(i));
                block.push(' ');
                block.push_str(&option.text);
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_question() {
        let questions = parse_questions("What is the capital of France?\nA) London\nB) Paris\nC) Rome\n");
        assert_eq!(questions.len(), 1);
        let q = &questions[0];
        assert_eq!(q.text, "What is the capital of France?");
        assert_eq!(q.kind, QuestionKind::FreeText);
        assert_eq!(q.option_texts(), vec!["London", "Paris", "Rome"]);
        assert_eq!(q.options[1].value, "Paris");
        assert!(q.options.iter().all(|o| o.source_handle.is_none()));
    }

    #[test]
    fn test_marker_variants() {
        let text = "Pick one?\n(a) first\n[B] second\n3. third\nD: fourth\n• fifth\nE- sixth";
        let questions = parse_questions(text);
        assert_eq!(questions.len(), 1);
        assert_eq!(
            questions[0].option_texts(),
            vec!["first", "second", "third", "fourth", "fifth", "sixth"]
        );
    }

    #[test]
    fn test_multiline_question_and_multiple_questions() {
        let text = "\
Which of these numbers is prime?
(Select one)
A) 4
B) 7
Some footer noise
What colour is the sky?
A) Blue
B) Green
";
        let questions = parse_questions(text);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].text, "Which of these numbers is prime? (Select one)");
        assert_eq!(questions[0].option_texts(), vec!["4", "7"]);
        assert_eq!(questions[1].text, "What colour is the sky?");
    }

    #[test]
    fn test_lookahead_question_without_mark() {
        let questions = parse_questions("Choose the largest planet\nA) Jupiter\nB) Mars");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "Choose the largest planet");
    }

    #[test]
    fn test_single_option_dropped() {
        let questions = parse_questions("Is it true?\nA) Yes\nNext question here?\nA) x\nB) y");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "Next question here?");
    }

    #[test]
    fn test_question_replaced_before_options() {
        let questions = parse_questions("Any questions?\nWhat is 2+2?\n1) 3\n2) 4");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "What is 2+2?");
    }

    #[test]
    fn test_stray_symbols_stripped() {
        let questions = parse_questions("Q?\nA) | London\nB)   Paris   city");
        assert_eq!(questions[0].option_texts(), vec!["London", "Paris city"]);
    }

    #[test]
    fn test_signed_and_decimal_options_kept() {
        let questions = parse_questions("What is 2 - 7?\nA) -5\nB) 5\nC) .5\nD) - -1");
        assert_eq!(questions[0].option_texts(), vec!["-5", "5", ".5", "-1"]);
    }

    #[test]
    fn test_full_width_question_mark() {
        let questions = parse_questions("中国的首都是哪里？\nA) 上海\nB) 北京");
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].option_texts(), vec!["上海", "北京"]);
    }

    #[test]
    fn test_no_question() {
        assert!(parse_questions("").is_empty());
        assert!(parse_questions("A) orphan\nB) options").is_empty());
    }

    #[test]
    fn test_render_is_idempotent() {
        let text = "Which of these numbers is prime?\n(Select one)\n1. 4\n2. 7\n3. 9\nWhat colour is the sky?\n• Blue\n• Green";
        let first = parse_questions(text);
        let rendered = render_canonical(&first);
        let second = parse_questions(&rendered);
        assert_eq!(first, second);
        assert_eq!(render_canonical(&second), rendered);
    }
}
