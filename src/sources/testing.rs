//! Mock automation backend shared by source and machine tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::browser::{BrowserAction, BrowserAutomation, BrowserSession};

#[derive(Clone, Default)]
pub(crate) struct MockBrowser {
    pub fail: Arc<AtomicBool>,
    pub teardowns: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserAutomation for MockBrowser {
    async fn init(
        &self,
        _url: &str,
        _viewport: (u32, u32),
        _actions: &[BrowserAction],
    ) -> Result<BrowserSession> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("automation backend unavailable");
        }
        Ok(BrowserSession::detached())
    }

    async fn execute(&self, _session: &mut BrowserSession, _action: &BrowserAction) -> Result<()> {
        Ok(())
    }

    async fn teardown(&self, _session: BrowserSession) -> Result<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
