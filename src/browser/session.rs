use chromiumoxide::{Browser, Page};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::{connect_to_browser_and_page, launch_headless_browser};
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::JsExecutor;

/// 浏览器会话
///
/// 持有 Browser、当前页面和事件处理任务。会话被丢弃时事件任务随之终止。
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    /// 浏览器是否由本程序启动（只有自己启动的才在结束时关闭）
    owned: bool,
}

impl BrowserSession {
    /// 按配置启动无头浏览器或连接到调试端口
    pub async fn open(config: &Config) -> AppResult<Self> {
        let (browser, page, handler_task, owned) = if config.launch_headless {
            let (b, p, h) =
                launch_headless_browser(&config.target_url, config.chrome_executable.as_deref())
                    .await?;
            (b, p, h, true)
        } else {
            let (b, p, h) =
                connect_to_browser_and_page(config.browser_debug_port, Some(&config.target_url))
                    .await?;
            (b, p, h, false)
        };

        Ok(Self {
            browser,
            page,
            handler_task,
            owned,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 当前页面的 URL
    pub async fn current_url(&self) -> String {
        self.page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| "about:blank".to_string())
    }

    /// 创建绑定当前页面的 JS 执行器
    pub fn executor(&self) -> JsExecutor {
        JsExecutor::new(self.page.clone())
    }

    /// 结束会话
    pub async fn close(mut self) -> AppResult<()> {
        if self.owned {
            info!("关闭无头浏览器");
            if let Err(e) = self.browser.close().await {
                warn!("⚠️ 关闭浏览器失败: {}", e);
            }
        } else {
            debug!("断开浏览器连接（保留用户浏览器）");
        }
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
