//! 页面访问抽象 - 基础设施层
//!
//! 检测器只通过这个 trait 读取页面，既可以跑在浏览器快照上，也可以跑在测试构造的 DOM 上。

use crate::models::dom::NodeId;

/// 元素选择条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// 标签名（小写）
    Tag(String),
    /// `<input type="...">`
    InputType(String),
    /// `<label for="...">`
    LabelFor(String),
    /// 任一条件满足
    Any(Vec<Selector>),
}

impl Selector {
    pub fn tag(tag: &str) -> Self {
        Selector::Tag(tag.to_ascii_lowercase())
    }

    pub fn input_type(kind: &str) -> Self {
        Selector::InputType(kind.to_ascii_lowercase())
    }

    pub fn label_for(id: &str) -> Self {
        Selector::LabelFor(id.to_string())
    }

    /// 单选按钮或复选框
    pub fn choice_inputs() -> Self {
        Selector::Any(vec![Self::input_type("radio"), Self::input_type("checkbox")])
    }

    /// 列表（ul / ol）
    pub fn lists() -> Self {
        Selector::Any(vec![Self::tag("ul"), Self::tag("ol")])
    }

    /// 表格单元格
    pub fn cells() -> Self {
        Selector::Any(vec![Self::tag("td"), Self::tag("th")])
    }
}

/// 只读的页面视图
pub trait PageHandle {
    /// 根节点（通常是 body）
    fn root(&self) -> Option<NodeId>;

    /// 在 `scope` 的后代中（`None` 表示整页，含根节点）按文档顺序查找元素
    fn query(&self, scope: Option<NodeId>, selector: &Selector) -> Vec<NodeId>;

    /// 标签名，文本节点返回 `None`
    fn tag(&self, node: NodeId) -> Option<&str>;

    /// 可见文本（块级元素换行，单元格空格分隔）
    fn text(&self, node: NodeId) -> String;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// 前一个元素兄弟（跳过文本节点）
    fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn is_enabled(&self, node: NodeId) -> bool;

    /// 自身及所有祖先都可见
    fn is_visible(&self, node: NodeId) -> bool;

    /// 整页可见文本
    fn page_text(&self) -> String {
        self.root().map(|r| self.text(r)).unwrap_or_default()
    }

    /// 判断元素是否满足选择条件
    fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        let Some(tag) = self.tag(node) else {
            return false;
        };
        match selector {
            Selector::Tag(t) => tag == t,
            Selector::InputType(kind) => {
                tag == "input"
                    && self
                        .attribute(node, "type")
                        .map(|t| t.eq_ignore_ascii_case(kind))
                        .unwrap_or(false)
            }
            Selector::LabelFor(id) => {
                tag == "label" && self.attribute(node, "for").as_deref() == Some(id.as_str())
            }
            Selector::Any(list) => list.iter().any(|s| self.matches(node, s)),
        }
    }

    /// 最近的满足条件的祖先（不含自身）
    fn closest_ancestor(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if self.matches(id, selector) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    /// 向上最多 `levels` 层的祖先，由近到远
    fn ancestors(&self, node: NodeId, levels: usize) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(node);
        while let Some(id) = current {
            if out.len() >= levels {
                break;
            }
            out.push(id);
            current = self.parent(id);
        }
        out
    }
}
