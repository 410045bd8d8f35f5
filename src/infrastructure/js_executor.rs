//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS / 拍快照 / 点元素 / 截图"的能力

use async_trait::async_trait;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::error::{AppResult, BrowserError, DetectionError};
use crate::models::dom::{DomNode, DomSnapshot, NodeId};

/// 页面快照脚本：把 body 拍平成节点数组，并给每个元素打上 `data-mcq-node`
const SNAPSHOT_JS: &str = r#"
(() => {
    const SKIP = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE']);
    const nodes = [];
    const visit = (node, parent) => {
        const id = nodes.length;
        if (node.nodeType === Node.TEXT_NODE) {
            nodes.push({ tag: null, text: node.textContent, parent, children: [] });
            return id;
        }
        node.setAttribute('data-mcq-node', String(id));
        const attrs = {};
        for (const a of node.attributes) attrs[a.name] = a.value;
        const style = window.getComputedStyle(node);
        const visible = !node.hidden && style.display !== 'none' && style.visibility !== 'hidden'
            && !(node.tagName === 'INPUT' && node.type === 'hidden');
        const entry = {
            tag: node.tagName.toLowerCase(), attrs, text: null, parent,
            children: [], visible, enabled: !node.disabled,
        };
        nodes.push(entry);
        for (const child of node.childNodes) {
            if (child.nodeType === Node.ELEMENT_NODE) {
                if (SKIP.has(child.tagName)) continue;
            } else if (child.nodeType === Node.TEXT_NODE) {
                if (!child.textContent.trim()) continue;
            } else {
                continue;
            }
            entry.children.push(visit(child, id));
        }
        return id;
    };
    if (document.body) visit(document.body, null);
    return nodes;
})()
"#;

/// 点击成功时使用的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickMethod {
    /// 模拟鼠标点击
    Pointer,
    /// JS `el.click()`
    Script,
    /// 直接设置 `checked = true` 并派发 change 事件
    StateMutation,
}

impl std::fmt::Display for ClickMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClickMethod::Pointer => "鼠标点击",
            ClickMethod::Script => "JS click",
            ClickMethod::StateMutation => "checked 赋值",
        };
        f.write_str(name)
    }
}

/// 点击选项元素的能力
#[async_trait]
pub trait ElementClicker: Send + Sync {
    async fn click_node(&self, node: NodeId, allow_pointer: bool) -> AppResult<ClickMethod>;
}

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力
/// - 不认识 Question
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))?;
        let json_value = result
            .into_value()
            .map_err(|e| BrowserError::ScriptExecutionFailed(e.to_string()))?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 拍摄当前页面的 DOM 快照
    pub async fn snapshot(&self) -> AppResult<DomSnapshot> {
        let nodes: Vec<DomNode> = self
            .eval_as(SNAPSHOT_JS)
            .await
            .map_err(|e| DetectionError::SnapshotFailed(e.to_string()))?;
        debug!("页面快照完成，共 {} 个节点", nodes.len());
        DomSnapshot::from_nodes(nodes)
    }

    /// 点击快照中的节点
    ///
    /// 依次尝试：模拟鼠标点击 → JS click() → 直接设置 checked。
    /// 元素不可见或被禁用时传 `allow_pointer = false`，跳过鼠标点击。
    pub async fn click(&self, node: NodeId, allow_pointer: bool) -> AppResult<ClickMethod> {
        let selector = format!("[data-mcq-node=\"{}\"]", node.0);

        if allow_pointer {
            match self.page.find_element(selector.as_str()).await {
                Ok(element) => {
                    let _ = element.scroll_into_view().await;
                    match element.click().await {
                        Ok(_) => return Ok(ClickMethod::Pointer),
                        Err(e) => debug!("鼠标点击节点 {} 失败: {}", node, e),
                    }
                }
                Err(e) => debug!("未找到节点 {} 对应的元素: {}", node, e),
            }
        }

        let js_click = format!(
            r#"(() => {{
                const el = document.querySelector('{}');
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            selector
        );
        match self.eval_as::<bool>(js_click).await {
            Ok(true) => return Ok(ClickMethod::Script),
            Ok(false) => return Err(BrowserError::ElementMissing { node: node.0 }.into()),
            Err(e) => warn!("JS click 节点 {} 失败: {}", node, e),
        }

        let js_check = format!(
            r#"(() => {{
                const el = document.querySelector('{}');
                if (!el) return false;
                el.checked = true;
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            selector
        );
        if self.eval_as::<bool>(js_check).await? {
            Ok(ClickMethod::StateMutation)
        } else {
            Err(BrowserError::ElementMissing { node: node.0 }.into())
        }
    }

    /// 整页截图（PNG）
    pub async fn screenshot_png(&self) -> AppResult<Vec<u8>> {
        let params = ScreenshotParams::builder().full_page(true).build();
        let bytes = self.page.screenshot(params).await?;
        debug!("截图完成: {} 字节", bytes.len());
        Ok(bytes)
    }
}

#[async_trait]
impl ElementClicker for JsExecutor {
    async fn click_node(&self, node: NodeId, allow_pointer: bool) -> AppResult<ClickMethod> {
        self.click(node, allow_pointer).await
    }
}
