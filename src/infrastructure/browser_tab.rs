//! 浏览器标签页 - 基础设施层
//!
//! 一次渲染独占一个标签页。正常流程用 `close()` 关闭；
//! 渲染被超时或取消打断时，标签页在 drop 时交给后台任务关闭，不会残留。

use std::future::Future;

use chromiumoxide::{Browser, Page};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::FetchError;

type Cleanup = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + Sync>;

/// drop 时把清理任务交给当前 tokio 运行时
pub struct CloseOnDrop {
    pending: Option<Cleanup>,
}

impl CloseOnDrop {
    pub fn new<F, Fut>(cleanup: F) -> Self
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            pending: Some(Box::new(move || cleanup().boxed())),
        }
    }

    /// 已经手动清理过，drop 时不再执行
    pub fn disarm(&mut self) {
        self.pending = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let Some(cleanup) = self.pending.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(cleanup());
            }
            Err(_) => warn!("⚠️ 不在 tokio 运行时中，无法清理标签页"),
        }
    }
}

/// 渲染用的标签页
pub struct BrowserTab {
    page: Page,
    guard: CloseOnDrop,
}

impl BrowserTab {
    /// 打开一个空白标签页
    pub async fn open(browser: &Browser) -> Result<Self, FetchError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::BrowserUnavailable(e.to_string()))?;

        let orphan = page.clone();
        let guard = CloseOnDrop::new(move || async move {
            debug!("🧹 渲染被中断，后台关闭标签页");
            if let Err(e) = orphan.close().await {
                debug!("关闭标签页失败: {}", e);
            }
        });
        Ok(Self { page, guard })
    }

    pub async fn goto(&self, url: &str) -> Result<(), FetchError> {
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| FetchError::NavigationFailed {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    /// 执行脚本并反序列化结果
    pub async fn eval_as<T: DeserializeOwned>(&self, script: &str) -> Result<T, FetchError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| FetchError::ScriptFailed(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| FetchError::ScriptFailed(e.to_string()))
    }

    pub async fn close(self) {
        let BrowserTab { page, mut guard } = self;
        guard.disarm();
        if let Err(e) = page.close().await {
            debug!("关闭标签页失败: {}", e);
        }
    }
}
