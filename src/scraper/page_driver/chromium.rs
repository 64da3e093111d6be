//! `chromiumoxide`-backed `PageDriver`.
//!
//! Launch sequence and stealth-argument set follow the prior
//! `launch_browser` helper this module replaces, trimmed of the
//! managed-download path (which depended on a sibling crate for its cache
//! directory and is out of scope here). A bundled or `CHROMIUM_PATH`-discovered
//! browser is assumed; the page driver otherwise treats the browser as an
//! opaque adapter over "a headless browser".

use super::{ElementHandle, PageDriver};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

pub struct ChromiumPageDriver {
    browser: Browser,
    _handler: JoinHandle<()>,
    page: Page,
}

impl ChromiumPageDriver {
    pub async fn launch(headless: bool) -> Result<Self> {
        let user_data_dir = std::env::temp_dir().join(format!("parcel_chrome_{}", std::process::id()));
        std::fs::create_dir_all(&user_data_dir).context("creating chrome user data dir")?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(Duration::from_secs(30))
            .window_size(1920, 1080)
            .user_data_dir(user_data_dir)
            .arg(format!("--user-agent={USER_AGENT}"));

        builder = if headless {
            builder.headless_mode(HeadlessMode::default())
        } else {
            builder.with_head()
        };

        let config = builder.build().map_err(anyhow::Error::msg).context("building browser config")?;
        let (browser, mut handler) = Browser::launch(config).await.context("launching browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(%err, "chromiumoxide handler event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await.context("opening initial page")?;

        Ok(Self { browser, _handler: handler_task, page })
    }

    fn visible_script(selector: &str) -> String {
        format!(
            "(() => {{ const el = document.querySelector({selector:?}); \
             if (!el) return null; \
             const r = el.getBoundingClientRect(); \
             return (r.width > 0 && r.height > 0) ? true : null; }})()"
        )
    }

    fn count_script(selector: &str) -> String {
        format!("document.querySelectorAll({selector:?}).length")
    }

    /// Resolve a handle to the live element it names. `ElementHandle` only
    /// carries a selector and a document-order index, never a live
    /// reference, so every operation re-queries the page.
    async fn resolve_element(&self, handle: &ElementHandle) -> Result<chromiumoxide::Element> {
        let elements = self.page.find_elements(handle.0.as_str()).await?;
        elements
            .into_iter()
            .nth(handle.1)
            .with_context(|| format!("element vanished: {} [{}]", handle.0, handle.1))
    }
}

#[async_trait]
impl PageDriver for ChromiumPageDriver {
    async fn open(&mut self, url: &str) -> Result<()> {
        self.page.goto(url).await.with_context(|| format!("navigating to {url}"))?;
        self.page.wait_for_navigation().await.ok();
        Ok(())
    }

    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn find_first(&self, selectors: &[&str], timeout: Duration) -> Result<Option<ElementHandle>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            for selector in selectors {
                let visible: Option<bool> = self
                    .page
                    .evaluate(Self::visible_script(selector))
                    .await
                    .ok()
                    .and_then(|v| v.into_value().ok());
                if visible == Some(true) {
                    return Ok(Some(ElementHandle((*selector).to_string(), 0)));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    }

    async fn find_all(&self, selector: &str, timeout: Duration) -> Result<Vec<ElementHandle>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let count: usize = self
                .page
                .evaluate(Self::count_script(selector))
                .await
                .ok()
                .and_then(|v| v.into_value().ok())
                .unwrap_or(0);
            if count > 0 {
                return Ok((0..count).map(|i| ElementHandle(selector.to_string(), i)).collect());
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    }

    async fn fill(&self, handle: &ElementHandle, text: &str) -> Result<()> {
        let element = self.resolve_element(handle).await?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn press(&self, handle: &ElementHandle, key: &str) -> Result<()> {
        let element = self.resolve_element(handle).await?;
        element.focus().await?;
        self.page.press_key(key).await?;
        Ok(())
    }

    async fn click(&self, handle: &ElementHandle) -> Result<()> {
        let element = self.resolve_element(handle).await?;
        element.click().await?;
        Ok(())
    }

    async fn attr(&self, handle: &ElementHandle, name: &str) -> Result<Option<String>> {
        let element = self.resolve_element(handle).await?;
        Ok(element.attribute(name).await?)
    }

    async fn text(&self, handle: &ElementHandle) -> Result<String> {
        let element = self.resolve_element(handle).await?;
        Ok(element.inner_text().await?.unwrap_or_default())
    }

    async fn inner_html(&self, handle: &ElementHandle) -> Result<String> {
        let element = self.resolve_element(handle).await?;
        Ok(element.inner_html().await?.unwrap_or_default())
    }

    async fn page_title(&self) -> Result<String> {
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn close(&mut self) -> Result<()> {
        self.page.close().await.ok();
        self.browser.close().await.ok();
        Ok(())
    }
}

