//! Secondary audio source acquisition.
//!
//! Acquisition never fails the pipeline: every problem is logged and
//! degrades to "no secondary source", so the primary feed keeps flowing.
//! A `SourceHandle` owns everything backing the source (capture subprocess,
//! browser session, scratch files) for exactly one pipeline session.

use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use tracing::{info, warn};

pub mod browser;
pub mod device;
pub mod placeholder;

#[cfg(test)]
pub(crate) mod testing;

use crate::config::{BrowserConfig, CaptureConfig, MixConfig, SourceMode, SourceParams};
use crate::graph::SecondaryInput;
use browser::{BrowserAutomation, BrowserSession, CommandBrowser};

pub struct SourceHandle {
    pub mode: SourceMode,
    pub locator: String,
    pub looped: bool,
    capture: Option<tokio::process::Child>,
    session: Option<BrowserSession>,
    scratch: Option<TempDir>,
}

impl SourceHandle {
    fn remote(mode: SourceMode, locator: String) -> Self {
        Self {
            mode,
            locator,
            looped: false,
            capture: None,
            session: None,
            scratch: None,
        }
    }

    /// How the filter graph should read this source.
    pub fn graph_input(&self) -> SecondaryInput {
        SecondaryInput {
            locator: self.locator.clone(),
            looped: self.looped,
        }
    }
}

pub struct SourceManager {
    capture: CaptureConfig,
    browser_config: BrowserConfig,
    browser: Box<dyn BrowserAutomation>,
}

impl SourceManager {
    pub fn new(capture: CaptureConfig, browser_config: BrowserConfig) -> Self {
        let browser = Box::new(CommandBrowser::new(browser_config.clone()));
        Self {
            capture,
            browser_config,
            browser,
        }
    }

    /// Swap in a different automation backend (tests, embedded drivers).
    pub fn with_browser(
        capture: CaptureConfig,
        browser_config: BrowserConfig,
        browser: Box<dyn BrowserAutomation>,
    ) -> Self {
        Self {
            capture,
            browser_config,
            browser,
        }
    }

    /// Acquire a secondary source for the session, or nothing. Never fails:
    /// every acquisition problem degrades to `None`.
    pub async fn acquire(&self, config: &MixConfig) -> Option<SourceHandle> {
        let params = &config.source_params;
        let attempt = match config.source_mode {
            SourceMode::Disabled => return None,
            SourceMode::Url => self.acquire_url(params),
            SourceMode::Device => self.acquire_device(params).await,
            SourceMode::Browser => self.acquire_browser(params).await,
        };

        match attempt {
            Ok(handle) => {
                info!(
                    "Acquired {} audio source: {}",
                    handle.mode.as_str(),
                    handle.locator
                );
                Some(handle)
            }
            Err(e) => {
                warn!(
                    "Failed to acquire {} audio source: {:#}. Streaming primary audio only.",
                    config.source_mode.as_str(),
                    e
                );
                None
            }
        }
    }

    fn acquire_url(&self, params: &SourceParams) -> Result<SourceHandle> {
        let url = params
            .audio_url
            .as_deref()
            .context("url mode requires source_params.audio_url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("audio source URL must use http or https: {url}");
        }
        Ok(SourceHandle::remote(SourceMode::Url, url.to_string()))
    }

    async fn acquire_device(&self, params: &SourceParams) -> Result<SourceHandle> {
        let device = params
            .device
            .as_deref()
            .context("device mode requires source_params.device")?;

        let scratch = tempfile::Builder::new()
            .prefix("mixcast-capture-")
            .tempdir()
            .context("failed to create capture scratch directory")?;
        let path = scratch.path().join("capture.wav");

        let child = device::spawn_capture(&self.capture, device, &path).await?;

        Ok(SourceHandle {
            mode: SourceMode::Device,
            locator: path.to_string_lossy().into_owned(),
            looped: false,
            capture: Some(child),
            session: None,
            scratch: Some(scratch),
        })
    }

    async fn acquire_browser(&self, params: &SourceParams) -> Result<SourceHandle> {
        let page_url = params
            .page_url
            .as_deref()
            .context("browser mode requires source_params.page_url")?;
        let viewport = (
            self.browser_config.viewport_width,
            self.browser_config.viewport_height,
        );
        let deadline = Duration::from_secs(self.browser_config.navigation_timeout_seconds);

        let session = timeout(
            deadline,
            self.browser.init(page_url, viewport, &params.actions),
        )
        .await
        .map_err(|_| {
            anyhow!(
                "browser navigation timed out after {}s",
                self.browser_config.navigation_timeout_seconds
            )
        })??;

        // Tab audio cannot be captured directly; a looped silent bed keeps
        // the mix wiring stable while the page plays out of band.
        let scratch = match tempfile::Builder::new()
            .prefix("mixcast-browser-")
            .tempdir()
        {
            Ok(dir) => dir,
            Err(e) => {
                let _ = self.browser.teardown(session).await;
                return Err(e).context("failed to create browser scratch directory");
            }
        };
        let path = scratch.path().join("placeholder.wav");
        if let Err(e) = placeholder::write_silence(&path) {
            let _ = self.browser.teardown(session).await;
            return Err(e);
        }

        Ok(SourceHandle {
            mode: SourceMode::Browser,
            locator: path.to_string_lossy().into_owned(),
            looped: true,
            capture: None,
            session: Some(session),
            scratch: Some(scratch),
        })
    }

    /// Tear down everything a handle owns. Safe on `None`; releasing twice
    /// is impossible because the handle is consumed.
    pub async fn release(&self, handle: Option<SourceHandle>) {
        let Some(mut handle) = handle else { return };

        if let Some(child) = handle.capture.take() {
            device::reap(child).await;
        }
        if let Some(session) = handle.session.take() {
            if let Err(e) = self.browser.teardown(session).await {
                warn!("Browser teardown failed: {:#}", e);
            }
        }
        if let Some(scratch) = handle.scratch.take() {
            if let Err(e) = scratch.close() {
                warn!("Failed to remove scratch directory: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockBrowser;
    use super::*;
    use std::sync::atomic::Ordering;

    fn manager() -> SourceManager {
        SourceManager::new(CaptureConfig::default(), BrowserConfig::default())
    }

    fn manager_with_browser(browser: MockBrowser) -> SourceManager {
        SourceManager::with_browser(
            CaptureConfig::default(),
            BrowserConfig::default(),
            Box::new(browser),
        )
    }

    fn config(mode: SourceMode, params: SourceParams) -> MixConfig {
        MixConfig {
            input_url: "rtmp://ingest.local/live".to_string(),
            output_url: "rtmp://egress.local/out".to_string(),
            source_mode: mode,
            source_params: params,
            ..MixConfig::default()
        }
    }

    #[tokio::test]
    async fn test_disabled_mode_yields_nothing() {
        let handle = manager()
            .acquire(&config(SourceMode::Disabled, SourceParams::default()))
            .await;
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_url_mode_passes_locator_verbatim() {
        let params = SourceParams {
            audio_url: Some("https://radio.example/stream".to_string()),
            ..SourceParams::default()
        };
        let handle = manager()
            .acquire(&config(SourceMode::Url, params))
            .await
            .unwrap();

        assert_eq!(handle.locator, "https://radio.example/stream");
        assert!(!handle.looped);
    }

    #[tokio::test]
    async fn test_url_mode_rejects_non_http_schemes() {
        for url in ["ftp://radio.example/a", "file:///etc/passwd", "radio"] {
            let params = SourceParams {
                audio_url: Some(url.to_string()),
                ..SourceParams::default()
            };
            let handle = manager().acquire(&config(SourceMode::Url, params)).await;
            assert!(handle.is_none(), "expected {url} to be rejected");
        }
    }

    #[tokio::test]
    async fn test_url_mode_without_url_degrades() {
        let handle = manager()
            .acquire(&config(SourceMode::Url, SourceParams::default()))
            .await;
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_device_mode_with_broken_recorder_degrades() {
        let manager = SourceManager::new(
            CaptureConfig {
                command: "/nonexistent/recorder".to_string(),
                extra_args: Vec::new(),
                ready_timeout_seconds: 1,
            },
            BrowserConfig::default(),
        );
        let params = SourceParams {
            device: Some("usb-deck".to_string()),
            ..SourceParams::default()
        };
        let handle = manager.acquire(&config(SourceMode::Device, params)).await;
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_browser_mode_produces_looped_placeholder() {
        let browser = MockBrowser::default();
        let manager = manager_with_browser(browser);

        let params = SourceParams {
            page_url: Some("https://player.example/live".to_string()),
            ..SourceParams::default()
        };
        let handle = manager
            .acquire(&config(SourceMode::Browser, params))
            .await
            .unwrap();

        assert!(handle.looped);
        assert!(handle.locator.ends_with("placeholder.wav"));
        assert!(std::path::Path::new(&handle.locator).exists());

        let input = handle.graph_input();
        assert!(input.looped);

        manager.release(Some(handle)).await;
    }

    #[tokio::test]
    async fn test_browser_init_failure_degrades() {
        let browser = MockBrowser::default();
        browser.fail.store(true, Ordering::SeqCst);
        let manager = manager_with_browser(browser);

        let params = SourceParams {
            page_url: Some("https://player.example/live".to_string()),
            ..SourceParams::default()
        };
        let handle = manager.acquire(&config(SourceMode::Browser, params)).await;
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_release_tears_down_session_and_scratch() {
        let browser = MockBrowser::default();
        let teardowns = browser.teardowns.clone();
        let manager = manager_with_browser(browser);

        let params = SourceParams {
            page_url: Some("https://player.example/live".to_string()),
            ..SourceParams::default()
        };
        let handle = manager
            .acquire(&config(SourceMode::Browser, params))
            .await
            .unwrap();
        let locator = handle.locator.clone();

        manager.release(Some(handle)).await;
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
        assert!(!std::path::Path::new(&locator).exists());

        // releasing nothing is a no-op
        manager.release(None).await;
        assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    }
}
