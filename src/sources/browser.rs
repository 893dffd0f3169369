//! Browser-automation capability.
//!
//! The core only consumes this capability: navigate to a page, run the
//! configured actions, keep the session alive, tear it down. The default
//! implementation delegates to a user-configured shell command (puppeteer
//! script, playwright runner, whatever the operator has) which receives the
//! page URL and viewport via environment variables and the action list as
//! JSON lines on stdin, and must print `ready` once the page is set up.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::BrowserConfig;

/// Environment variable names handed to the automation command.
pub mod driver_env {
    pub const PAGE_URL: &str = "MIXCAST_PAGE_URL";
    pub const VIEWPORT: &str = "MIXCAST_VIEWPORT";
    pub const SESSION_ID: &str = "MIXCAST_SESSION_ID";
}

const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// A scripted page interaction, forwarded verbatim to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserAction {
    Wait { ms: u64 },
    Click { selector: String },
    Type { selector: String, text: String },
}

/// A live automation session. Owns the driver process.
pub struct BrowserSession {
    pub id: Uuid,
    driver: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl BrowserSession {
    /// Session with no backing process — for drivers that manage their own
    /// lifetime, and for tests.
    pub fn detached() -> Self {
        Self {
            id: Uuid::new_v4(),
            driver: None,
            stdin: None,
        }
    }
}

#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Navigate to `url`, run the initial actions, and return once the page
    /// is set up. Callers bound this with their own timeout.
    async fn init(
        &self,
        url: &str,
        viewport: (u32, u32),
        actions: &[BrowserAction],
    ) -> Result<BrowserSession>;

    /// Run one more action inside an existing session.
    async fn execute(&self, session: &mut BrowserSession, action: &BrowserAction) -> Result<()>;

    async fn teardown(&self, session: BrowserSession) -> Result<()>;
}

/// Drives the operator-configured automation command.
pub struct CommandBrowser {
    config: BrowserConfig,
}

impl CommandBrowser {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserAutomation for CommandBrowser {
    async fn init(
        &self,
        url: &str,
        viewport: (u32, u32),
        actions: &[BrowserAction],
    ) -> Result<BrowserSession> {
        if self.config.command.is_empty() {
            bail!("no browser automation command configured (set [browser].command)");
        }

        let id = Uuid::new_v4();
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.config.command)
            .env(driver_env::PAGE_URL, url)
            .env(
                driver_env::VIEWPORT,
                format!("{}x{}", viewport.0, viewport.1),
            )
            .env(driver_env::SESSION_ID, id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("failed to launch browser automation command")?;

        let mut stdin = child
            .stdin
            .take()
            .context("automation command stdin was not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("automation command stdout was not captured")?;

        let payload = serde_json::to_string(actions)?;
        stdin
            .write_all(format!("{payload}\n").as_bytes())
            .await
            .context("failed to send actions to automation command")?;

        // wait for the driver's ready handshake
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await? {
                Some(line) if line.trim() == "ready" => break,
                Some(line) => debug!("browser driver: {}", line),
                None => bail!("automation command exited before signalling ready"),
            }
        }

        // keep draining driver output so it never blocks on a full pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("browser driver: {}", line);
            }
        });

        Ok(BrowserSession {
            id,
            driver: Some(child),
            stdin: Some(stdin),
        })
    }

    async fn execute(&self, session: &mut BrowserSession, action: &BrowserAction) -> Result<()> {
        let stdin = session
            .stdin
            .as_mut()
            .context("automation session has no open control channel")?;
        let payload = serde_json::to_string(&[action])?;
        stdin
            .write_all(format!("{payload}\n").as_bytes())
            .await
            .context("failed to send action to automation command")?;
        Ok(())
    }

    async fn teardown(&self, mut session: BrowserSession) -> Result<()> {
        // closing stdin tells the driver to wind down
        drop(session.stdin.take());

        if let Some(mut child) = session.driver.take() {
            match timeout(TEARDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!("Browser driver {} exited with {}", session.id, status),
                Ok(Err(e)) => warn!("Browser driver {} wait failed: {}", session.id, e),
                Err(_) => {
                    warn!("Browser driver {} ignored shutdown, killing", session.id);
                    if let Err(e) = child.start_kill() {
                        debug!("Browser driver already gone: {}", e);
                    }
                    let _ = child.wait().await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serialization() {
        let actions = vec![
            BrowserAction::Wait { ms: 500 },
            BrowserAction::Click {
                selector: "#play".to_string(),
            },
            BrowserAction::Type {
                selector: "#volume".to_string(),
                text: "80".to_string(),
            },
        ];

        let json = serde_json::to_string(&actions).unwrap();
        assert!(json.contains("\"type\":\"wait\""));
        assert!(json.contains("\"type\":\"click\""));
        assert!(json.contains("\"selector\":\"#play\""));

        let parsed: Vec<BrowserAction> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, actions);
    }

    #[tokio::test]
    async fn test_unconfigured_command_is_rejected() {
        let browser = CommandBrowser::new(BrowserConfig::default());
        let result = browser.init("https://example.com", (1280, 720), &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_init_handshake_and_teardown() {
        let browser = CommandBrowser::new(BrowserConfig {
            // reads the action batch, confirms, then waits for EOF
            command: "read actions; echo ready; cat > /dev/null".to_string(),
            ..BrowserConfig::default()
        });

        let session = browser
            .init(
                "https://player.example/live",
                (1280, 720),
                &[BrowserAction::Wait { ms: 100 }],
            )
            .await
            .unwrap();
        assert!(session.driver.is_some());

        browser.teardown(session).await.unwrap();
    }

    #[tokio::test]
    async fn test_driver_exiting_early_is_an_error() {
        let browser = CommandBrowser::new(BrowserConfig {
            command: "exit 3".to_string(),
            ..BrowserConfig::default()
        });

        let result = browser.init("https://example.com", (1280, 720), &[]).await;
        assert!(result.is_err());
    }
}
