//! Pipeline status types and shared state handle.

use crate::config::MixConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle state of the transcoding engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        }
    }
}

/// State of the browser-automation session backing a browser-mode source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserState {
    Inactive,
    Launching,
    Active,
    Failed,
}

impl BrowserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Launching => "launching",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

/// Point-in-time view of the pipeline, readable by the control surface.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub process_state: ProcessState,
    pub browser_state: BrowserState,
    pub config: Option<MixConfig>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_error: Option<String>,
}

impl Default for PipelineSnapshot {
    fn default() -> Self {
        Self {
            process_state: ProcessState::Idle,
            browser_state: BrowserState::Inactive,
            config: None,
            started_at: None,
            last_error: None,
        }
    }
}

impl PipelineSnapshot {
    /// Seconds since the current session started streaming.
    pub fn uptime_seconds(&self) -> Option<u64> {
        self.started_at.map(|started| {
            let elapsed = chrono::Utc::now() - started;
            elapsed.num_seconds().max(0) as u64
        })
    }
}

/// Thread-safe handle shared between the machine, the supervisor, and
/// status readers.
#[derive(Clone, Default)]
pub struct PipelineStatusHandle {
    inner: Arc<Mutex<PipelineSnapshot>>,
}

impl PipelineStatusHandle {
    pub async fn get(&self) -> PipelineSnapshot {
        self.inner.lock().await.clone()
    }

    pub async fn set_process(&self, state: ProcessState) {
        let mut snapshot = self.inner.lock().await;
        snapshot.process_state = state;
    }

    pub async fn set_browser(&self, state: BrowserState) {
        let mut snapshot = self.inner.lock().await;
        snapshot.browser_state = state;
    }

    pub async fn set_failed(&self, reason: String) {
        let mut snapshot = self.inner.lock().await;
        snapshot.process_state = ProcessState::Failed;
        snapshot.last_error = Some(reason);
    }

    pub async fn session_started(&self, config: MixConfig) {
        let mut snapshot = self.inner.lock().await;
        snapshot.config = Some(config);
        snapshot.started_at = Some(chrono::Utc::now());
        snapshot.last_error = None;
    }

    pub async fn session_cleared(&self) {
        let mut snapshot = self.inner.lock().await;
        snapshot.config = None;
        snapshot.started_at = None;
        snapshot.browser_state = BrowserState::Inactive;
        snapshot.last_error = None;
    }
}
