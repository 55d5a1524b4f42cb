//! Browser-driven PGN reader.
//!
//! A game's PGN is only reachable through the rendered game page: dismiss
//! the overlays, open the share panel, switch to the PGN tab, turn on clock
//! annotations and read the textarea.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ExtractorError;
use crate::source::{FetchFailure, FetchStage, PgnFetch, PgnSource};

const COOKIE_BANNER_SELECTOR: &str = r#"#onetrust-banner-sdk[aria-label="Cookie banner"]"#;
const COOKIE_REJECT_SELECTOR: &str = "#onetrust-reject-all-handler";
const MODAL_CLOSE_SELECTOR: &str = r#".board-modal-header-close[aria-label="Close"]"#;
const SHARE_SELECTOR: &str = ".share";
const PGN_TAB_SELECTOR: &str = ".share-menu-tab-selector-component > div:first-child";
const TIMESTAMPS_SELECTOR: &str = "span.circle-clock.icon-font-chess.share-menu-tab-pgn-icon";
const PGN_TEXTAREA_SELECTOR: &str = "textarea.share-menu-tab-pgn-textarea";

/// Timing knobs for driving the game page.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Settle delay after the first navigation of a fresh tab.
    pub first_launch_settle: Duration,
    /// Settle delay after navigating a tab that has been used before.
    pub warm_settle: Duration,
    /// Games may still be live, so the game-over modal gets a long wait.
    pub modal_wait: Duration,
    pub element_wait: Duration,
    pub navigation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            first_launch_settle: Duration::from_secs(10),
            warm_settle: Duration::from_secs(2),
            modal_wait: Duration::from_secs(120),
            element_wait: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// One browser tab.
#[derive(Debug)]
pub struct BrowserTab {
    page: Page,
}

/// A Chromium instance, either launched locally or reached over the
/// DevTools protocol.
pub struct ChessBrowser {
    browser: Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    launched: bool,
    settings: BrowserSettings,
    game_base: Url,
    screenshot_dir: Option<PathBuf>,
}

impl ChessBrowser {
    /// Connect to a running browser's DevTools endpoint.
    pub async fn connect(
        uri: &str,
        host: &str,
        settings: BrowserSettings,
    ) -> Result<Self, ExtractorError> {
        let (browser, handler) = Browser::connect(uri).await?;
        info!(%uri, "connected to browser");
        Self::from_parts(browser, handler, false, host, settings)
    }

    /// Launch a local, visible browser.
    pub async fn launch(host: &str, settings: BrowserSettings) -> Result<Self, ExtractorError> {
        let config = BrowserConfig::builder()
            .with_head()
            .build()
            .map_err(ExtractorError::BrowserError)?;
        let (browser, handler) = Browser::launch(config).await?;
        info!("launched local browser");
        Self::from_parts(browser, handler, true, host, settings)
    }

    fn from_parts(
        browser: Browser,
        mut handler: chromiumoxide::Handler,
        launched: bool,
        host: &str,
        settings: BrowserSettings,
    ) -> Result<Self, ExtractorError> {
        let game_base = Url::parse(host)
            .and_then(|base| base.join("/game/live/"))
            .map_err(|e| ExtractorError::InvalidUrl(format!("{host}: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler error");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handler_task)),
            launched,
            settings,
            game_base,
            screenshot_dir: None,
        })
    }

    /// Save a screenshot of the page into `dir` whenever a fetch fails.
    pub fn with_screenshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.screenshot_dir = dir;
        self
    }

    fn game_url(&self, game_id: &str) -> Result<Url, ExtractorError> {
        self.game_base
            .join(game_id)
            .map_err(|e| ExtractorError::InvalidUrl(format!("{game_id}: {e}")))
    }

    /// Close the browser. A launched browser is closed and reaped; a remote
    /// one is only disconnected.
    pub async fn shutdown(&self) -> Result<(), ExtractorError> {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if self.launched {
                browser.close().await?;
                browser.wait().await?;
            }
            drop(browser);
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
        info!("browser closed");
        Ok(())
    }

    async fn wait_for(
        &self,
        page: &Page,
        selector: &str,
        timeout: Duration,
        stage: FetchStage,
    ) -> Result<Element, FetchFailure> {
        let deadline = Instant::now() + timeout;
        loop {
            match page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(e) if Instant::now() >= deadline => {
                    return Err(FetchFailure::new(
                        stage,
                        format!("{selector} not found after {timeout:?}: {e}"),
                    ));
                }
                Err(_) => tokio::time::sleep(self.settings.poll_interval).await,
            }
        }
    }

    async fn click(
        &self,
        page: &Page,
        selector: &str,
        timeout: Duration,
        stage: FetchStage,
    ) -> Result<(), FetchFailure> {
        let element = self.wait_for(page, selector, timeout, stage).await?;
        element
            .click()
            .await
            .map_err(|e| FetchFailure::new(stage, e.to_string()))?;
        Ok(())
    }

    async fn read_pgn(
        &self,
        page: &Page,
        game_id: &str,
        first_launch: bool,
    ) -> Result<String, FetchFailure> {
        let url = self
            .game_url(game_id)
            .map_err(|e| FetchFailure::new(FetchStage::Navigate, e.to_string()))?;

        match tokio::time::timeout(self.settings.navigation_timeout, page.goto(url.as_str())).await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(FetchFailure::new(FetchStage::Navigate, e.to_string())),
            Err(_) => {
                return Err(FetchFailure::new(
                    FetchStage::Navigate,
                    format!("navigation timed out after {:?}", self.settings.navigation_timeout),
                ));
            }
        }

        let settle = if first_launch {
            self.settings.first_launch_settle
        } else {
            self.settings.warm_settle
        };
        tokio::time::sleep(settle).await;

        // The consent banner only shows on some sessions.
        if page.find_element(COOKIE_BANNER_SELECTOR).await.is_ok() {
            self.click(
                page,
                COOKIE_REJECT_SELECTOR,
                self.settings.element_wait,
                FetchStage::CookieBanner,
            )
            .await?;
        }

        self.click(
            page,
            MODAL_CLOSE_SELECTOR,
            self.settings.modal_wait,
            FetchStage::GameOverModal,
        )
        .await?;
        self.click(
            page,
            SHARE_SELECTOR,
            self.settings.element_wait,
            FetchStage::SharePanel,
        )
        .await?;
        self.click(
            page,
            PGN_TAB_SELECTOR,
            self.settings.element_wait,
            FetchStage::PgnTab,
        )
        .await?;
        self.click(
            page,
            TIMESTAMPS_SELECTOR,
            self.settings.element_wait,
            FetchStage::Timestamps,
        )
        .await?;

        let textarea = self
            .wait_for(
                page,
                PGN_TEXTAREA_SELECTOR,
                self.settings.element_wait,
                FetchStage::ReadPgn,
            )
            .await?;
        let value = textarea
            .property("value")
            .await
            .map_err(|e| FetchFailure::new(FetchStage::ReadPgn, e.to_string()))?;

        Ok(value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn save_failure_screenshot(&self, page: &Page, game_id: &str) {
        let Some(dir) = self.screenshot_dir.as_ref() else {
            return;
        };
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!(path = %dir.display(), error = %e, "failed to create screenshot directory");
            return;
        }
        let path = dir.join(format!(
            "{game_id}-{}.png",
            chrono::Utc::now().timestamp_millis()
        ));
        match page
            .save_screenshot(ScreenshotParams::builder().build(), &path)
            .await
        {
            Ok(_) => debug!(path = %path.display(), "saved failure screenshot"),
            Err(e) => warn!(%game_id, error = %e, "failed to save screenshot"),
        }
    }
}

#[async_trait]
impl PgnSource for ChessBrowser {
    type Session = BrowserTab;

    async fn open_session(&self) -> Result<BrowserTab, ExtractorError> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| ExtractorError::BrowserError("browser already closed".to_string()))?;
        let page = browser.new_page("about:blank").await?;
        Ok(BrowserTab { page })
    }

    async fn close_session(&self, session: BrowserTab) -> Result<(), ExtractorError> {
        session.page.close().await?;
        Ok(())
    }

    async fn fetch_pgn(
        &self,
        session: &mut BrowserTab,
        game_id: &str,
        first_launch: bool,
    ) -> PgnFetch {
        match self.read_pgn(&session.page, game_id, first_launch).await {
            Ok(text) => {
                let fetch = PgnFetch::from_text(text);
                if !fetch.is_success() {
                    self.save_failure_screenshot(&session.page, game_id).await;
                }
                fetch
            }
            Err(failure) => {
                self.save_failure_screenshot(&session.page, game_id).await;
                PgnFetch::Failure(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = BrowserSettings::default();
        assert_eq!(settings.first_launch_settle, Duration::from_secs(10));
        assert_eq!(settings.warm_settle, Duration::from_secs(2));
        assert_eq!(settings.modal_wait, Duration::from_secs(120));
        assert!(settings.poll_interval < settings.element_wait);
    }
}
