//! Chromium-backed page driver
//!
//! Wraps a chromiumoxide browser with one active page. Role and text
//! locators are resolved in the page by tagging the match with a marker
//! attribute and then finding it by CSS.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{CleanupPolicy, ScraperConfig};
use crate::driver::{ClickStrategy, DriverError, Key, Locator, PageDriver, WaitCondition};

const MARKER_ATTRIBUTE: &str = "data-rtf-locator";
const POLL_START: Duration = Duration::from_millis(100);
const POLL_MAX: Duration = Duration::from_secs(1);
const CLEAR_FIELD_JS: &str =
    "function() { this.focus(); if ('value' in this) { this.value = ''; } }";

fn backend<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> DriverError + '_ {
    move |e| DriverError::Backend(format!("{}: {}", context, e))
}

/// A launched browser plus the page every driver call acts on
pub struct ChromiumDriver {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    next_marker: u64,
}

impl ChromiumDriver {
    pub async fn launch(headless: bool) -> Result<Self, DriverError> {
        info!(headless, "Launching Chromium");

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--lang=en-US")
            .window_size(1920, 1080);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| DriverError::Backend(format!("browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(backend("browser launch failed"))?;

        // The CDP connection only makes progress while the handler is polled
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(backend("new page failed"))?;

        Ok(Self {
            browser,
            handler,
            page,
            next_marker: 0,
        })
    }

    /// Close the browser process and stop the event handler
    pub async fn close(mut self) -> Result<(), DriverError> {
        self.browser.close().await.map_err(backend("browser close failed"))?;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Browser process did not exit cleanly");
        }
        self.handler.abort();
        Ok(())
    }

    async fn find(&self, selector: &str) -> Option<Element> {
        self.page.find_element(selector).await.ok()
    }

    /// Tag the first element matching the role/text query and return its CSS handle
    async fn mark(&mut self, locator: &Locator) -> Result<Option<String>, DriverError> {
        self.next_marker += 1;
        let marker = self.next_marker.to_string();
        let marker_json = serde_json::to_string(&marker).map_err(backend("marker encoding"))?;

        let finder = match locator {
            Locator::Role { role, name } => {
                let role_json = serde_json::to_string(role).map_err(backend("locator encoding"))?;
                let name_json = serde_json::to_string(name).map_err(backend("locator encoding"))?;
                format!(
                    r#"(() => {{
                        const role = {role}, name = {name};
                        const native = {{ button: 'button', combobox: 'input', textbox: 'input', link: 'a', option: 'li' }};
                        const query = `[role="${{role}}"]` + (native[role] ? `, ${{native[role]}}` : '');
                        const label = el => (el.getAttribute('aria-label') || el.getAttribute('placeholder') || el.innerText || '').trim();
                        return Array.from(document.querySelectorAll(query)).find(el => label(el) === name)
                            || Array.from(document.querySelectorAll(query)).find(el => label(el).includes(name));
                    }})()"#,
                    role = role_json,
                    name = name_json
                )
            }
            Locator::Text(text) => {
                let text_json = serde_json::to_string(text).map_err(backend("locator encoding"))?;
                format!(
                    r#"(() => {{
                        const text = {text};
                        return Array.from(document.querySelectorAll('button, a, [role="button"], span'))
                            .find(el => (el.innerText || '').trim() === text);
                    }})()"#,
                    text = text_json
                )
            }
            Locator::Css(selector) => return Ok(Some(selector.clone())),
        };

        let script = format!(
            "(() => {{ const el = {finder}; if (!el) return false; el.setAttribute('{attr}', {marker}); return true; }})()",
            finder = finder,
            attr = MARKER_ATTRIBUTE,
            marker = marker_json
        );
        let found: bool = self
            .page
            .evaluate(script)
            .await
            .map_err(backend("locator script failed"))?
            .into_value()
            .map_err(backend("locator script result"))?;

        Ok(found.then(|| format!(r#"[{}="{}"]"#, MARKER_ATTRIBUTE, marker)))
    }

    /// Poll for a selector with capped exponential backoff
    async fn poll_selectors(&self, selectors: &[String], timeout: Duration) -> bool {
        let start = Instant::now();
        let mut interval = POLL_START;

        loop {
            for selector in selectors {
                if self.find(selector).await.is_some() {
                    return true;
                }
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(POLL_MAX);
        }
    }
}

impl Drop for ChromiumDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    type Handle = Element;

    async fn goto(&mut self, url: &str) -> Result<(), DriverError> {
        debug!(url, "Navigating");
        self.page
            .goto(url)
            .await
            .map_err(|e| DriverError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn locate(&mut self, locator: &Locator) -> Result<Option<Element>, DriverError> {
        match self.mark(locator).await? {
            Some(selector) => Ok(self.find(&selector).await),
            None => Ok(None),
        }
    }

    async fn locate_all(&mut self, selector: &str) -> Result<Vec<Element>, DriverError> {
        match self.page.find_elements(selector).await {
            Ok(elements) => Ok(elements),
            Err(e) => {
                debug!(selector, error = %e, "No elements matched");
                Ok(Vec::new())
            }
        }
    }

    async fn click(
        &mut self,
        handle: &Element,
        strategy: ClickStrategy,
    ) -> Result<(), DriverError> {
        let intercepted =
            |e: chromiumoxide::error::CdpError| DriverError::ClickIntercepted(e.to_string());
        match strategy {
            ClickStrategy::Plain => {
                handle.click().await.map_err(intercepted)?;
            }
            ClickStrategy::ScrollIntoView => {
                handle.scroll_into_view().await.map_err(intercepted)?;
                let point = handle.clickable_point().await.map_err(intercepted)?;
                self.page.click(point).await.map_err(intercepted)?;
            }
            ClickStrategy::Dom => {
                handle
                    .call_js_fn("function() { this.click(); }", false)
                    .await
                    .map_err(intercepted)?;
            }
        }
        Ok(())
    }

    async fn fill(&mut self, handle: &Element, text: &str) -> Result<(), DriverError> {
        handle
            .call_js_fn(CLEAR_FIELD_JS, false)
            .await
            .map_err(backend("clearing field failed"))?;
        handle.type_str(text).await.map_err(backend("typing failed"))?;
        Ok(())
    }

    async fn press_key(&mut self, key: Key) -> Result<(), DriverError> {
        let target = match self.find(":focus").await {
            Some(element) => element,
            None => self
                .find("body")
                .await
                .ok_or_else(|| DriverError::NotFound("focus target for key press".to_string()))?,
        };
        target.press_key(key.name()).await.map_err(backend("key press failed"))?;
        Ok(())
    }

    async fn wait_for(
        &mut self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let timed_out = || DriverError::Timeout {
            what: condition.describe(),
            timeout_ms: timeout.as_millis() as u64,
        };

        match condition {
            WaitCondition::Selector(selector) => {
                if self.poll_selectors(std::slice::from_ref(selector), timeout).await {
                    Ok(())
                } else {
                    Err(timed_out())
                }
            }
            WaitCondition::AnySelector(selectors) => {
                if self.poll_selectors(selectors, timeout).await {
                    Ok(())
                } else {
                    Err(timed_out())
                }
            }
            WaitCondition::NetworkIdle => {
                match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(e)) => Err(DriverError::Navigation(e.to_string())),
                    Err(_) => Err(timed_out()),
                }
            }
        }
    }

    async fn content(&mut self) -> Result<String, DriverError> {
        self.page.content().await.map_err(backend("reading page content failed"))
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        self.page
            .url()
            .await
            .map_err(backend("reading page url failed"))?
            .ok_or_else(|| DriverError::Navigation("page has no url".to_string()))
    }

    async fn go_back(&mut self) -> Result<(), DriverError> {
        self.page
            .evaluate("history.back()")
            .await
            .map_err(|e| DriverError::Navigation(format!("history.back: {}", e)))?;
        Ok(())
    }
}

/// Lazily launched browser reused across searches
pub struct BrowserSession {
    headless: bool,
    cleanup: CleanupPolicy,
    driver: Option<ChromiumDriver>,
}

impl BrowserSession {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            headless: config.headless,
            cleanup: config.cleanup,
            driver: None,
        }
    }

    /// The live driver, launching the browser on first use
    pub async fn driver(&mut self) -> Result<&mut ChromiumDriver, DriverError> {
        if self.driver.is_none() {
            self.driver = Some(ChromiumDriver::launch(self.headless).await?);
        }
        self.driver
            .as_mut()
            .ok_or_else(|| DriverError::Backend("browser failed to start".to_string()))
    }

    /// Drop the current browser so the next search starts fresh
    pub async fn reset(&mut self) -> Result<(), DriverError> {
        if let Some(driver) = self.driver.take() {
            info!("Resetting browser session");
            driver.close().await?;
        }
        Ok(())
    }

    /// End of run: close or keep the browser according to the cleanup policy
    pub async fn shutdown(mut self) -> Result<(), DriverError> {
        match self.cleanup {
            CleanupPolicy::CloseBrowser => self.reset().await,
            CleanupPolicy::KeepOpen => {
                if let Some(driver) = self.driver.take() {
                    info!("Leaving browser open");
                    // Skipping Drop keeps the handler task and the browser alive
                    std::mem::forget(driver);
                }
                Ok(())
            }
        }
    }
}
