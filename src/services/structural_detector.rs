//! 结构化题目检测 - 业务能力层
//!
//! 在页面结构上运行四种互相独立的策略（表单分组、列表、表格行、正则文本），
//! 合并结果后按题干去重。单个元素解析失败直接跳过，不影响其它元素。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::infrastructure::page_handle::{PageHandle, Selector};
use crate::models::dom::NodeId;
use crate::models::question::{
    dedup_questions, has_question_mark, Question, QuestionKind, QuestionOption,
};

/// 向上查找题干的最大层数
const MAX_ANCESTOR_LEVELS: usize = 5;
/// 题干文本的最小长度（字符数，严格大于）
const MIN_QUESTION_CHARS: usize = 10;

static PATTERN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([^\n]*[?？])[ \t]*\n\s*A\)[ \t]*([^\n]+)\n\s*B\)[ \t]*([^\n]+)\n\s*C\)[ \t]*([^\n]+)(?:\n\s*D\)[ \t]*([^\n]+))?",
    )
    .expect("pattern regex")
});

/// 检测策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionStrategy {
    /// 表单内同名单选组 / 复选框组
    FormGrouped,
    /// 含输入框的 ul / ol
    ListBased,
    /// 含多个输入框的表格行
    TableBased,
    /// 整页文本中的 "问句 + A) B) C) [D)]"
    PatternBased,
}

impl DetectionStrategy {
    pub const ALL: [DetectionStrategy; 4] = [
        DetectionStrategy::FormGrouped,
        DetectionStrategy::ListBased,
        DetectionStrategy::TableBased,
        DetectionStrategy::PatternBased,
    ];

    /// 运行单个策略
    pub fn detect(&self, page: &dyn PageHandle) -> Vec<Question> {
        match self {
            DetectionStrategy::FormGrouped => detect_form_groups(page),
            DetectionStrategy::ListBased => detect_lists(page),
            DetectionStrategy::TableBased => detect_tables(page),
            DetectionStrategy::PatternBased => detect_patterns(&page.page_text()),
        }
    }
}

impl std::fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DetectionStrategy::FormGrouped => "表单分组",
            DetectionStrategy::ListBased => "列表",
            DetectionStrategy::TableBased => "表格",
            DetectionStrategy::PatternBased => "文本模式",
        };
        f.write_str(name)
    }
}

/// 检测调度器：运行所有策略，合并后去重
#[derive(Debug, Clone)]
pub struct StructuralDetector {
    strategies: Vec<DetectionStrategy>,
}

impl Default for StructuralDetector {
    fn default() -> Self {
        Self {
            strategies: DetectionStrategy::ALL.to_vec(),
        }
    }
}

impl StructuralDetector {
    pub fn with_strategies(strategies: Vec<DetectionStrategy>) -> Self {
        Self { strategies }
    }

    /// 检测页面中的题目，一道都没有时返回 `NoQuestionFound`
    pub fn detect(&self, page: &dyn PageHandle, source_desc: &str) -> AppResult<Vec<Question>> {
        let mut all = Vec::new();
        for strategy in &self.strategies {
            let found = strategy.detect(page);
            debug!("策略 [{}] 找到 {} 道题", strategy, found.len());
            all.extend(found);
        }

        let total = all.len();
        let unique = dedup_questions(all);
        if unique.is_empty() {
            return Err(AppError::no_question_found(source_desc));
        }
        info!("✓ 检测到 {} 道题 (去重前 {} 道)", unique.len(), total);
        Ok(unique)
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_question_line(text: &str) -> Option<String> {
    text.lines()
        .find(|l| has_question_mark(l))
        .map(collapse)
        .filter(|l| !l.is_empty())
}

fn input_kind(page: &dyn PageHandle, input: NodeId) -> QuestionKind {
    match page.attribute(input, "type") {
        Some(t) if t.eq_ignore_ascii_case("radio") => QuestionKind::Radio,
        _ => QuestionKind::Checkbox,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ========== 表单分组 ==========

fn detect_form_groups(page: &dyn PageHandle) -> Vec<Question> {
    let mut questions = Vec::new();

    for form in page.query(None, &Selector::tag("form")) {
        // 保持首次出现的顺序
        let mut radio_groups: Vec<(String, Vec<NodeId>)> = Vec::new();
        let mut checkbox_groups: Vec<(String, Vec<NodeId>)> = Vec::new();

        for input in page.query(Some(form), &Selector::choice_inputs()) {
            let name = page.attribute(input, "name").unwrap_or_default();
            let groups = match input_kind(page, input) {
                QuestionKind::Radio if name.is_empty() => continue,
                QuestionKind::Radio => &mut radio_groups,
                _ => &mut checkbox_groups,
            };
            match groups.iter_mut().find(|(n, _)| *n == name) {
                Some((_, members)) => members.push(input),
                None => groups.push((name, vec![input])),
            }
        }

        let groups = radio_groups
            .into_iter()
            .map(|g| (g, QuestionKind::Radio))
            .chain(checkbox_groups.into_iter().map(|g| (g, QuestionKind::Checkbox)));
        for ((name, members), kind) in groups {
            if members.len() < Question::MIN_OPTIONS {
                continue;
            }
            match extract_from_group(page, &members, kind) {
                Some(q) => questions.push(q),
                None => debug!("输入组 '{}' 未能组成题目", name),
            }
        }
    }

    questions
}

fn extract_from_group(page: &dyn PageHandle, inputs: &[NodeId], kind: QuestionKind) -> Option<Question> {
    let question = inputs.iter().find_map(|&input| {
        page.ancestors(input, MAX_ANCESTOR_LEVELS)
            .into_iter()
            .map(|anc| page.text(anc))
            .find(|text| has_question_mark(text) && text.chars().count() > MIN_QUESTION_CHARS)
            .and_then(|text| first_question_line(&text))
    })?;

    let options = inputs
        .iter()
        .enumerate()
        .map(|(n, &input)| {
            let value = non_empty(page.attribute(input, "value"));
            let text = label_text(page, input)
                .or_else(|| {
                    let parent = page.parent(input)?;
                    let text = collapse(&page.text(parent).replace(&question, ""));
                    (!text.is_empty()).then_some(text)
                })
                .or_else(|| value.clone())
                .unwrap_or_else(|| format!("Option {}", n + 1));
            QuestionOption::from_element(text.clone(), value.unwrap_or(text), input)
        })
        .collect();

    let container = inputs
        .first()
        .and_then(|&i| page.parent(i))
        .and_then(|p| page.parent(p));
    Question::new(question, options, kind, container)
}

/// `label[for=id]` 的文本
fn label_text(page: &dyn PageHandle, input: NodeId) -> Option<String> {
    let id = non_empty(page.attribute(input, "id"))?;
    let label = page.query(None, &Selector::label_for(&id)).into_iter().next()?;
    let text = collapse(&page.text(label));
    (!text.is_empty()).then_some(text)
}

// ========== 列表 ==========

fn detect_lists(page: &dyn PageHandle) -> Vec<Question> {
    page.query(None, &Selector::lists())
        .into_iter()
        .filter_map(|list| extract_from_list(page, list))
        .collect()
}

fn extract_from_list(page: &dyn PageHandle, list: NodeId) -> Option<Question> {
    let items: Vec<NodeId> = page
        .children(list)
        .into_iter()
        .filter(|&c| page.tag(c) == Some("li"))
        .collect();
    if items.len() < Question::MIN_OPTIONS {
        return None;
    }

    let inputs_per_item: Vec<Vec<NodeId>> = items
        .iter()
        .map(|&item| page.query(Some(item), &Selector::choice_inputs()))
        .collect();
    if inputs_per_item.iter().all(|i| i.is_empty()) {
        return None;
    }

    let question = page
        .previous_element_sibling(list)
        .map(|prev| collapse(&page.text(prev)))
        .filter(|t| has_question_mark(t))
        .or_else(|| {
            let parent = page.parent(list)?;
            first_question_line(&page.text(parent))
        })?;

    let options: Vec<QuestionOption> = items
        .iter()
        .zip(&inputs_per_item)
        .filter_map(|(&item, inputs)| {
            let input = *inputs.first()?;
            let text = collapse(&page.text(item));
            if text.is_empty() {
                return None;
            }
            let value = non_empty(page.attribute(input, "value")).unwrap_or_else(|| text.clone());
            Some(QuestionOption::from_element(text, value, input))
        })
        .collect();

    let kind = options
        .first()
        .and_then(|o| o.source_handle)
        .map(|input| input_kind(page, input))?;
    Question::new(question, options, kind, Some(list))
}

// ========== 表格 ==========

fn detect_tables(page: &dyn PageHandle) -> Vec<Question> {
    let mut questions = Vec::new();
    for table in page.query(None, &Selector::tag("table")) {
        let rows = page.query(Some(table), &Selector::tag("tr"));
        for (index, &row) in rows.iter().enumerate() {
            let inputs = page.query(Some(row), &Selector::choice_inputs());
            if inputs.len() < Question::MIN_OPTIONS {
                continue;
            }
            if let Some(q) = extract_from_row(page, &rows[..index], row, &inputs) {
                questions.push(q);
            }
        }
    }
    questions
}

fn extract_from_row(
    page: &dyn PageHandle,
    previous_rows: &[NodeId],
    row: NodeId,
    inputs: &[NodeId],
) -> Option<Question> {
    let question = page
        .query(Some(row), &Selector::cells())
        .first()
        .map(|&cell| collapse(&page.text(cell)))
        .filter(|t| has_question_mark(t))
        .or_else(|| {
            previous_rows
                .iter()
                .rev()
                .map(|&prev| collapse(&page.text(prev)))
                .find(|t| has_question_mark(t))
        })?;

    let options = inputs
        .iter()
        .filter_map(|&input| {
            let cell = page.closest_ancestor(input, &Selector::cells())?;
            let text = collapse(&page.text(cell));
            if text.is_empty() {
                return None;
            }
            let value = non_empty(page.attribute(input, "value")).unwrap_or_else(|| text.clone());
            Some(QuestionOption::from_element(text, value, input))
        })
        .collect();

    let kind = input_kind(page, *inputs.first()?);
    Question::new(question, options, kind, Some(row))
}

// ========== 文本模式 ==========

/// 在纯文本中查找 "问句 + A) B) C) [D)]"
pub fn detect_patterns(page_text: &str) -> Vec<Question> {
    PATTERN_RE
        .captures_iter(page_text)
        .filter_map(|caps| {
            let question = collapse(caps.get(1)?.as_str());
            let options = ["A", "B", "C", "D"]
                .iter()
                .enumerate()
                .filter_map(|(i, value)| {
                    let text = collapse(caps.get(i + 2)?.as_str());
                    (!text.is_empty()).then(|| QuestionOption::from_text(text, *value))
                })
                .collect();
            Question::new(question, options, QuestionKind::Pattern, None)
        })
        .collect()
}
