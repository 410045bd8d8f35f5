//! 页面 DOM 快照
//!
//! 浏览器端脚本一次性把 `document.body` 拍平成节点数组，并给每个元素打上 `data-mcq-node` 属性，
//! 之后所有检测都在这份快照上同步完成；点击时再用同一个编号找回真实元素。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DetectionError};
use crate::infrastructure::page_handle::{PageHandle, Selector};

/// 快照中的节点编号，同时也是页面元素上 `data-mcq-node` 的值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn default_true() -> bool {
    true
}

/// 快照节点（与浏览器端脚本返回的 JSON 一一对应）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    /// 元素标签（小写），文本节点为 `None`
    pub tag: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// 文本节点内容
    pub text: Option<String>,
    pub parent: Option<usize>,
    #[serde(default)]
    pub children: Vec<usize>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// 换行分隔的块级元素
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "legend", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "tfoot", "thead",
    "tr", "ul",
];

/// 页面快照
#[derive(Debug, Clone, Default)]
pub struct DomSnapshot {
    nodes: Vec<DomNode>,
}

impl DomSnapshot {
    /// 从浏览器返回的节点数组构建，并校验父子索引
    pub fn from_nodes(nodes: Vec<DomNode>) -> AppResult<Self> {
        let len = nodes.len();
        for (i, node) in nodes.iter().enumerate() {
            let bad_child = node.children.iter().find(|&&c| c >= len || c == i);
            let bad_parent = node.parent.filter(|&p| p >= len);
            if bad_child.is_some() || bad_parent.is_some() {
                return Err(DetectionError::SnapshotFailed(format!(
                    "节点 {} 的父子索引越界 (共 {} 个节点)",
                    i, len
                ))
                .into());
            }
        }
        Ok(Self { nodes })
    }

    /// 从嵌套结构构建（测试和离线样例用）
    pub fn from_tree(tree: DomTree) -> Self {
        let mut nodes = Vec::new();
        flatten(tree, None, &mut nodes);
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id.0)
    }

    fn render(&self, id: usize, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if !node.visible {
            return;
        }
        match node.tag.as_deref() {
            None => {
                if let Some(text) = &node.text {
                    let mut last_space = out.ends_with(' ');
                    for c in text.chars() {
                        if c.is_whitespace() {
                            if !last_space {
                                out.push(' ');
                                last_space = true;
                            }
                        } else {
                            out.push(c);
                            last_space = false;
                        }
                    }
                }
            }
            Some("br") => out.push('\n'),
            Some(tag) => {
                let block = BLOCK_TAGS.contains(&tag);
                if block {
                    out.push('\n');
                }
                for &child in &node.children {
                    self.render(child, out);
                }
                if tag == "td" || tag == "th" {
                    out.push(' ');
                }
                if block {
                    out.push('\n');
                }
            }
        }
    }

    fn collect(&self, id: usize, selector: &Selector, out: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for &child in &node.children {
            if self.matches(NodeId(child), selector) {
                out.push(NodeId(child));
            }
            self.collect(child, selector, out);
        }
    }
}

impl PageHandle for DomSnapshot {
    fn root(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.parent.is_none())
            .map(NodeId)
    }

    fn query(&self, scope: Option<NodeId>, selector: &Selector) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(start) = scope.or_else(|| self.root()) else {
            return out;
        };
        if scope.is_none() && self.matches(start, selector) {
            out.push(start);
        }
        self.collect(start.0, selector, &mut out);
        out
    }

    fn tag(&self, node: NodeId) -> Option<&str> {
        self.node(node).and_then(|n| n.tag.as_deref())
    }

    fn text(&self, node: NodeId) -> String {
        let mut raw = String::new();
        self.render(node.0, &mut raw);
        raw.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.node(node).and_then(|n| n.attrs.get(name).cloned())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent).map(NodeId)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node)
            .map(|n| n.children.iter().copied().map(NodeId).collect())
            .unwrap_or_default()
    }

    fn previous_element_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&s| s == node)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|&s| self.tag(s).is_some())
    }

    fn is_enabled(&self, node: NodeId) -> bool {
        self.node(node).map(|n| n.enabled).unwrap_or(false)
    }

    fn is_visible(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            match self.node(id) {
                Some(n) if n.visible => current = n.parent.map(NodeId),
                _ => return false,
            }
        }
        true
    }
}

/// 嵌套的 DOM 描述
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomTree {
    Text(String),
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<DomTree>,
        #[serde(default)]
        hidden: bool,
        #[serde(default)]
        disabled: bool,
    },
}

impl DomTree {
    pub fn el(tag: &str, attrs: &[(&str, &str)], children: Vec<DomTree>) -> Self {
        DomTree::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            children,
            hidden: false,
            disabled: false,
        }
    }

    pub fn text(text: &str) -> Self {
        DomTree::Text(text.to_string())
    }

    /// 单选按钮
    pub fn radio(name: &str, value: &str, id: Option<&str>) -> Self {
        let mut attrs = vec![("type", "radio"), ("name", name), ("value", value)];
        if let Some(id) = id {
            attrs.push(("id", id));
        }
        Self::el("input", &attrs, vec![])
    }

    /// 复选框
    pub fn checkbox(name: &str, value: &str) -> Self {
        Self::el(
            "input",
            &[("type", "checkbox"), ("name", name), ("value", value)],
            vec![],
        )
    }

    pub fn hidden(mut self) -> Self {
        if let DomTree::Element { hidden, .. } = &mut self {
            *hidden = true;
        }
        self
    }

    pub fn disabled(mut self) -> Self {
        if let DomTree::Element { disabled, .. } = &mut self {
            *disabled = true;
        }
        self
    }
}

fn flatten(tree: DomTree, parent: Option<usize>, nodes: &mut Vec<DomNode>) -> usize {
    let id = nodes.len();
    match tree {
        DomTree::Text(text) => nodes.push(DomNode {
            tag: None,
            attrs: BTreeMap::new(),
            text: Some(text),
            parent,
            children: Vec::new(),
            visible: true,
            enabled: true,
        }),
        DomTree::Element {
            tag,
            attrs,
            children,
            hidden,
            disabled,
        } => {
            nodes.push(DomNode {
                tag: Some(tag),
                attrs,
                text: None,
                parent,
                children: Vec::new(),
                visible: !hidden,
                enabled: !disabled,
            });
            for child in children {
                let child_id = flatten(child, Some(id), nodes);
                nodes[id].children.push(child_id);
            }
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DomSnapshot {
        DomSnapshot::from_tree(DomTree::el(
            "body",
            &[],
            vec![
                DomTree::el("h2", &[], vec![DomTree::text("  Which   planet is red? ")]),
                DomTree::el(
                    "ul",
                    &[],
                    vec![
                        DomTree::el(
                            "li",
                            &[],
                            vec![DomTree::radio("p", "mars", None), DomTree::text("Mars")],
                        ),
                        DomTree::el(
                            "li",
                            &[],
                            vec![DomTree::radio("p", "venus", None), DomTree::text("Venus")],
                        ),
                    ],
                ),
                DomTree::el("p", &[], vec![DomTree::text("secret")]).hidden(),
            ],
        ))
    }

    #[test]
    fn test_text_rendering() {
        let dom = sample();
        let root = dom.root().unwrap();
        assert_eq!(dom.text(root), "Which planet is red?\nMars\nVenus");
    }

    #[test]
    fn test_query_and_traversal() {
        let dom = sample();
        let radios = dom.query(None, &Selector::input_type("radio"));
        assert_eq!(radios.len(), 2);
        assert_eq!(dom.attribute(radios[1], "value").as_deref(), Some("venus"));

        let li = dom.parent(radios[0]).unwrap();
        assert_eq!(dom.tag(li), Some("li"));
        let ul = dom.parent(li).unwrap();
        let h2 = dom.previous_element_sibling(ul).unwrap();
        assert_eq!(dom.tag(h2), Some("h2"));
        assert!(dom.previous_element_sibling(h2).is_none());
    }

    #[test]
    fn test_visibility_inherits() {
        let dom = sample();
        let hidden_p = dom.query(None, &Selector::tag("p"))[0];
        assert!(!dom.is_visible(hidden_p));
        let text_node = dom.children(hidden_p)[0];
        assert!(!dom.is_visible(text_node));
    }

    #[test]
    fn test_from_nodes_rejects_bad_indices() {
        let nodes = vec![DomNode {
            tag: Some("body".to_string()),
            attrs: BTreeMap::new(),
            text: None,
            parent: None,
            children: vec![5],
            visible: true,
            enabled: true,
        }];
        assert!(DomSnapshot::from_nodes(nodes).is_err());
    }

    #[test]
    fn test_from_nodes_json() {
        let json = r#"[
            {"tag": "body", "attrs": {}, "text": null, "parent": null, "children": [1]},
            {"tag": null, "text": "Hello?", "parent": 0}
        ]"#;
        let nodes: Vec<DomNode> = serde_json::from_str(json).unwrap();
        let dom = DomSnapshot::from_nodes(nodes).unwrap();
        assert_eq!(dom.page_text(), "Hello?");
    }
}
