//! 页面渲染服务 - 业务能力层
//!
//! 只负责"打开题目页面、拿到渲染后的内容和可下载文件"，不关心流程

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Browser;
use reqwest::Url;
use serde::Deserialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::infrastructure::{BrowserTab, ScratchSpace};
use crate::models::{DownloadedFile, PageLink, RenderedPage};
use crate::services::data_extractor::is_supported_extension;

/// 页面渲染能力
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// 渲染页面，超过 `timeout` 返回 `FetchError::Timeout`
    async fn render(&self, url: &str, timeout: Duration) -> Result<RenderedPage, FetchError>;

    /// 下载页面引用的文件到临时目录
    async fn download(
        &self,
        link: &PageLink,
        scratch: &ScratchSpace,
    ) -> Result<DownloadedFile, FetchError>;
}

const SNAPSHOT_SCRIPT: &str = r#"
(() => {
    const anchors = Array.from(document.querySelectorAll('a[href]'));
    const result = document.querySelector('#result');
    return {
        html: document.documentElement ? document.documentElement.outerHTML : '',
        text: document.body ? document.body.innerText : '',
        result_text: result ? result.innerText : '',
        links: anchors.map(a => ({ url: a.href, text: (a.innerText || '').trim() }))
    };
})()
"#;

#[derive(Debug, Deserialize)]
struct PageSnapshot {
    #[serde(default)]
    html: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    result_text: String,
    #[serde(default)]
    links: Vec<PageLink>,
}

/// 基于 chromiumoxide 的渲染器
///
/// 每次渲染打开一个新标签页，渲染完（或被取消时）关闭；文件通过 HTTP 直接下载。
pub struct BrowserRenderer {
    browser: Browser,
    http: reqwest::Client,
    render_wait: Duration,
}

impl BrowserRenderer {
    pub fn new(browser: Browser, config: &Config) -> Self {
        Self {
            browser,
            http: reqwest::Client::new(),
            render_wait: config.render_wait(),
        }
    }

    async fn snapshot(&self, tab: &BrowserTab, url: &str) -> Result<RenderedPage, FetchError> {
        tab.goto(url).await?;

        // 等待页面中的 JS 执行完
        sleep(self.render_wait).await;

        let snapshot: PageSnapshot = tab.eval_as(SNAPSHOT_SCRIPT).await?;
        let (links, files) = classify_links(snapshot.links);

        Ok(RenderedPage {
            url: url.to_string(),
            html: snapshot.html,
            text: snapshot.text,
            result_text: snapshot.result_text,
            links,
            files,
        })
    }
}

#[async_trait]
impl PageRenderer for BrowserRenderer {
    async fn render(&self, url: &str, limit: Duration) -> Result<RenderedPage, FetchError> {
        info!("🌐 正在打开题目页面: {}", url);

        let tab = BrowserTab::open(&self.browser).await?;

        let result = match timeout(limit, self.snapshot(&tab, url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: limit,
            }),
        };
        tab.close().await;

        if let Ok(page) = &result {
            debug!(
                "页面文本 {} 字符, 链接 {} 个, 数据文件 {} 个",
                page.text.chars().count(),
                page.links.len(),
                page.files.len()
            );
        }
        result
    }

    async fn download(
        &self,
        link: &PageLink,
        scratch: &ScratchSpace,
    ) -> Result<DownloadedFile, FetchError> {
        download_file(&self.http, link, scratch).await
    }
}

/// 过滤出 http(s) 链接，并挑出可解析的数据文件
pub fn classify_links(raw: Vec<PageLink>) -> (Vec<PageLink>, Vec<PageLink>) {
    let links: Vec<PageLink> = raw
        .into_iter()
        .filter(|link| {
            Url::parse(&link.url)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false)
        })
        .collect();
    let mut files: Vec<PageLink> = Vec::new();
    for link in &links {
        let supported = link
            .extension()
            .map(|ext| is_supported_extension(&ext))
            .unwrap_or(false);
        if supported && !files.iter().any(|f| f.url == link.url) {
            files.push(link.clone());
        }
    }
    (links, files)
}

/// 通过 HTTP 下载文件
pub async fn download_file(
    http: &reqwest::Client,
    link: &PageLink,
    scratch: &ScratchSpace,
) -> Result<DownloadedFile, FetchError> {
    let failed = |message: String| FetchError::DownloadFailed {
        url: link.url.clone(),
        message,
    };

    info!("📥 正在下载文件: {}", link.url);
    let response = http
        .get(&link.url)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        warn!("下载失败，状态码: {}", status);
        return Err(failed(format!("HTTP {}", status)));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let name = link.file_name();
    let path = scratch.file_path(&name);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| failed(e.to_string()))?;

    debug!("文件已保存: {} ({} 字节)", path.display(), bytes.len());
    Ok(DownloadedFile {
        name,
        path,
        source_url: link.url.clone(),
    })
}
