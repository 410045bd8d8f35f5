use serde::Serialize;

use crate::models::dom::NodeId;

/// 问号（含全角问号）
pub const QUESTION_MARKS: [char; 2] = ['?', '？'];

/// 判断文本中是否含有问号
pub fn has_question_mark(text: &str) -> bool {
    text.contains(QUESTION_MARKS)
}

/// 题目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    /// 单选按钮组
    Radio,
    /// 复选框组
    Checkbox,
    /// 从纯文本 / OCR 中解析得到
    FreeText,
    /// 通过正则模式从页面文本中匹配得到
    Pattern,
}

/// 选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionOption {
    pub text: String,
    pub value: String,
    /// 来源交互元素（只对结构化检测有效）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<NodeId>,
}

impl QuestionOption {
    /// 文本来源的选项，没有页面元素
    pub fn from_text(text: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            value: value.into(),
            source_handle: None,
        }
    }

    /// 页面元素来源的选项
    pub fn from_element(text: impl Into<String>, value: impl Into<String>, node: NodeId) -> Self {
        Self {
            text: text.into(),
            value: value.into(),
            source_handle: Some(node),
        }
    }
}

/// 题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub kind: QuestionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_handle: Option<NodeId>,
}

impl Question {
    /// 至少需要两个选项
    pub const MIN_OPTIONS: usize = 2;

    /// 构造题目，不满足不变量（题干非空、至少两个选项）时返回 `None`
    pub fn new(
        text: impl Into<String>,
        options: Vec<QuestionOption>,
        kind: QuestionKind,
        container_handle: Option<NodeId>,
    ) -> Option<Self> {
        let text = text.into().trim().to_string();
        if text.is_empty() || options.len() < Self::MIN_OPTIONS {
            return None;
        }
        Some(Self {
            text,
            options,
            kind,
            container_handle,
        })
    }

    /// 去重键：小写 + 空白归一
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.text)
    }

    /// 选项文本列表
    pub fn option_texts(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.text.as_str()).collect()
    }
}

/// 题干去重键
pub fn dedup_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 按题干去重，保留第一次出现的题目
pub fn dedup_questions(questions: Vec<Question>) -> Vec<Question> {
    let mut seen = std::collections::HashSet::new();
    questions
        .into_iter()
        .filter(|q| seen.insert(q.dedup_key()))
        .collect()
}

/// 匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchStrategy {
    Letter,
    Number,
    ExactText,
    Substring,
    Fuzzy,
    KeywordPattern,
    AnnotatedPattern,
    NoSpaceExact,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchStrategy::Letter => "字母",
            MatchStrategy::Number => "数字",
            MatchStrategy::ExactText => "精确文本",
            MatchStrategy::Substring => "子串",
            MatchStrategy::Fuzzy => "模糊",
            MatchStrategy::KeywordPattern => "关键词模式",
            MatchStrategy::AnnotatedPattern => "字母加注释",
            MatchStrategy::NoSpaceExact => "去空格精确",
        };
        f.write_str(name)
    }
}

/// 答案匹配结果
///
/// `Unresolved` 是正常结果而不是错误，调用方必须显式处理，不能当成第 0 项。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum MatchResult {
    Resolved { index: usize, strategy: MatchStrategy },
    Unresolved,
}

impl MatchResult {
    /// 匹配到的选项索引
    pub fn index(&self) -> Option<usize> {
        match self {
            MatchResult::Resolved { index, .. } => Some(*index),
            MatchResult::Unresolved => None,
        }
    }

    /// 命中的策略
    pub fn strategy(&self) -> Option<MatchStrategy> {
        match self {
            MatchResult::Resolved { strategy, .. } => Some(*strategy),
            MatchResult::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, MatchResult::Resolved { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(texts: &[&str]) -> Vec<QuestionOption> {
        texts
            .iter()
            .map(|t| QuestionOption::from_text(*t, *t))
            .collect()
    }

    #[test]
    fn test_question_invariant() {
        assert!(Question::new("Q?", opts(&["a"]), QuestionKind::FreeText, None).is_none());
        assert!(Question::new("   ", opts(&["a", "b"]), QuestionKind::FreeText, None).is_none());

        let q = Question::new("  Q? ", opts(&["a", "b"]), QuestionKind::FreeText, None).unwrap();
        assert_eq!(q.text, "Q?");
    }

    #[test]
    fn test_dedup_first_wins() {
        let first = Question::new("What is 2+2?", opts(&["3", "4"]), QuestionKind::Radio, None).unwrap();
        let dup = Question::new(
            "  what   is 2+2? ",
            opts(&["three", "four"]),
            QuestionKind::Pattern,
            None,
        )
        .unwrap();
        let other = Question::new("Why?", opts(&["x", "y"]), QuestionKind::Pattern, None).unwrap();

        let out = dedup_questions(vec![first.clone(), dup, other]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], first);
        assert_eq!(out[1].text, "Why?");
    }

    #[test]
    fn test_full_width_question_mark() {
        assert!(has_question_mark("中国的首都是哪里？"));
        assert!(!has_question_mark("选择正确答案"));
    }

    #[test]
    fn test_match_result_accessors() {
        let r = MatchResult::Resolved {
            index: 2,
            strategy: MatchStrategy::Fuzzy,
        };
        assert_eq!(r.index(), Some(2));
        assert_eq!(r.strategy(), Some(MatchStrategy::Fuzzy));
        assert!(MatchResult::Unresolved.index().is_none());
    }
}
