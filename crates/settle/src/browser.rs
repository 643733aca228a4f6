//! Chromium backend.
//!
//! With the `browser` feature the [`Browser`] and [`Page`] types drive a
//! real Chromium over the `DevTools` protocol via chromiumoxide, and `Page`
//! implements [`SettlePage`](crate::SettlePage). [`BrowserConfig`] is always
//! available so front ends can build it without the feature.

/// Browser configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Window width
    pub viewport_width: u32,
    /// Window height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

#[cfg(feature = "browser")]
mod cdp {
    use super::BrowserConfig;
    use crate::config::{DEFAULT_POLL_INTERVAL_MS, NETWORK_IDLE_THRESHOLD_MS};
    use crate::detector::wait_for_settled;
    use crate::page::{poll_network_idle, poll_ready_state, LoadState, SettlePage};
    use crate::report::SettleReport;
    use crate::result::{SettleError, SettleResult};
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::error::CdpError;
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Chrome protocol messages for a target that no longer exists.
    /// "Inspected target navigated or closed" is a navigation interrupt, not
    /// one of them.
    const TARGET_GONE_MESSAGES: &[&str] = &[
        "target closed",
        "no target with given id",
        "session with given id not found",
    ];

    fn target_gone(message: &str) -> bool {
        let lower = message.to_lowercase();
        TARGET_GONE_MESSAGES.iter().any(|gone| lower.contains(gone))
    }

    /// Map a CDP failure to `PageClosed` only when the connection or target is gone
    fn classify(err: CdpError) -> SettleError {
        let fatal = match &err {
            CdpError::Ws(_) | CdpError::NoResponse | CdpError::ChannelSendError(_) => true,
            CdpError::Chrome(chrome) => target_gone(&chrome.message),
            CdpError::ChromeMessage(message) => target_gone(message),
            _ => false,
        };
        if fatal {
            SettleError::page_closed(err.to_string())
        } else {
            SettleError::evaluation(err.to_string())
        }
    }

    /// Browser instance with real CDP connection
    #[derive(Debug)]
    pub struct Browser {
        config: BrowserConfig,
        inner: Arc<Mutex<CdpBrowser>>,
        handle: tokio::task::JoinHandle<()>,
    }

    impl Browser {
        /// Launch a new browser instance
        ///
        /// # Errors
        ///
        /// Returns error if browser cannot be launched
        pub async fn launch(config: BrowserConfig) -> SettleResult<Self> {
            let mut builder = CdpConfig::builder()
                .window_size(config.viewport_width, config.viewport_height);

            if !config.headless {
                builder = builder.with_head();
            }

            if !config.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = config.chromium_path {
                builder = builder.chrome_executable(path);
            }

            let cdp_config = builder
                .build()
                .map_err(|message| SettleError::BrowserLaunch { message })?;

            let (browser, mut handler) =
                CdpBrowser::launch(cdp_config)
                    .await
                    .map_err(|e| SettleError::BrowserLaunch {
                        message: e.to_string(),
                    })?;

            let handle = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(err) = event {
                        tracing::debug!(error = %err, "cdp handler stopped");
                        break;
                    }
                }
            });

            tracing::info!(headless = config.headless, "browser launched");
            Ok(Self {
                config,
                inner: Arc::new(Mutex::new(browser)),
                handle,
            })
        }

        /// Open a blank page
        ///
        /// # Errors
        ///
        /// Returns error if page cannot be created
        pub async fn new_page(&self) -> SettleResult<Page> {
            let browser = self.inner.lock().await;
            let cdp_page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| SettleError::BrowserLaunch {
                    message: e.to_string(),
                })?;
            Ok(Page {
                url: String::from("about:blank"),
                inner: Arc::new(Mutex::new(cdp_page)),
            })
        }

        /// Get the browser configuration
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            &self.config
        }

        /// Close the browser
        ///
        /// # Errors
        ///
        /// Returns error if the browser process does not shut down cleanly
        pub async fn close(self) -> SettleResult<()> {
            let mut browser = self.inner.lock().await;
            browser
                .close()
                .await
                .map_err(|e| SettleError::BrowserLaunch {
                    message: e.to_string(),
                })?;
            self.handle.abort();
            Ok(())
        }
    }

    /// A browser page with real CDP connection
    #[derive(Debug)]
    pub struct Page {
        /// Last navigated URL
        pub url: String,
        inner: Arc<Mutex<CdpPage>>,
    }

    impl Page {
        /// Navigate to a URL
        ///
        /// # Errors
        ///
        /// Returns error if navigation fails
        pub async fn goto(&mut self, url: &str) -> SettleResult<()> {
            let page = self.inner.lock().await;
            page.goto(url)
                .await
                .map_err(|e| SettleError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            drop(page);
            self.url = url.to_string();
            Ok(())
        }

        /// Click the first element matching `selector`
        ///
        /// # Errors
        ///
        /// Returns error if the element is missing or the click fails
        pub async fn click(&self, selector: &str) -> SettleResult<()> {
            let interaction = |e: CdpError| SettleError::Interaction {
                selector: selector.to_string(),
                message: e.to_string(),
            };
            let page = self.inner.lock().await;
            let element = page.find_element(selector).await.map_err(interaction)?;
            element.click().await.map_err(interaction)?;
            Ok(())
        }

        /// Navigate, then wait for the page to settle
        ///
        /// # Errors
        ///
        /// Returns error if navigation fails or the page closes while settling
        pub async fn goto_and_settle<S: AsRef<str>>(
            &mut self,
            url: &str,
            timeout: Duration,
            extra_loaders: &[S],
        ) -> SettleResult<SettleReport> {
            self.goto(url).await?;
            wait_for_settled(&*self, timeout, extra_loaders).await
        }

        /// Click, then wait for the page to settle
        ///
        /// # Errors
        ///
        /// Returns error if the click fails or the page closes while settling
        pub async fn click_and_settle<S: AsRef<str>>(
            &self,
            selector: &str,
            timeout: Duration,
            extra_loaders: &[S],
        ) -> SettleResult<SettleReport> {
            self.click(selector).await?;
            wait_for_settled(self, timeout, extra_loaders).await
        }

        /// Close the page
        ///
        /// # Errors
        ///
        /// Returns error if the target cannot be closed
        pub async fn close(self) -> SettleResult<()> {
            let page = self.inner.lock().await.clone();
            page.close().await.map_err(classify)
        }
    }

    #[async_trait]
    impl SettlePage for Page {
        async fn wait_for_load_state(
            &self,
            state: LoadState,
            timeout: Duration,
        ) -> SettleResult<()> {
            let poll = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);
            let wait = async {
                match state {
                    LoadState::DomContentLoaded | LoadState::Load => {
                        poll_ready_state(self, state, poll).await
                    }
                    LoadState::NetworkIdle => {
                        let quiet = Duration::from_millis(NETWORK_IDLE_THRESHOLD_MS);
                        poll_network_idle(self, poll, quiet).await
                    }
                }
            };
            tokio::time::timeout(timeout, wait)
                .await
                .map_err(|_| SettleError::Timeout {
                    ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })?
        }

        async fn evaluate(&self, script: &str) -> SettleResult<Value> {
            let page = self.inner.lock().await;
            let result = page.evaluate(script).await.map_err(classify)?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        }
    }

}

#[cfg(feature = "browser")]
pub use cdp::{Browser, Page};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.sandbox);
        assert_eq!((config.viewport_width, config.viewport_height), (1920, 1080));
    }

    #[test]
    fn test_builders() {
        let config = BrowserConfig::default()
            .with_headless(false)
            .with_no_sandbox()
            .with_viewport(1280, 720)
            .with_chromium_path("/usr/bin/chromium");
        assert!(!config.headless);
        assert!(!config.sandbox);
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.chromium_path.as_deref(), Some("/usr/bin/chromium"));
    }
}
