//! Pipeline controller.
//!
//! One machine owns one pipeline: the engine supervisor, the acquired
//! secondary source, and the current config. Every externally triggered
//! operation runs under a single lock, so no two state transitions ever
//! interleave. `stop()` additionally cancels the in-flight operation's
//! token before taking the lock, which aborts a start stuck in source
//! acquisition or engine startup without leaking subprocesses.

use crate::config::{EngineConfig, LiveUpdate, MixConfig, SourceMode};
use crate::engine::EngineSpawner;
use crate::graph::FilterGraph;
use crate::sources::{SourceHandle, SourceManager};
use anyhow::{bail, Context, Result};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::status::{BrowserState, PipelineSnapshot, PipelineStatusHandle, ProcessState};
use super::supervisor::EngineSupervisor;

pub struct MixerMachine {
    inner: Mutex<PipelineInner>,
    sources: Arc<SourceManager>,
    status: PipelineStatusHandle,
    /// Token of the operation currently holding the lock.
    cancel: StdMutex<CancellationToken>,
}

struct PipelineInner {
    supervisor: EngineSupervisor,
    source: Option<SourceHandle>,
    config: Option<MixConfig>,
}

impl MixerMachine {
    pub fn new(
        sources: SourceManager,
        spawner: Box<dyn EngineSpawner>,
        engine: &EngineConfig,
    ) -> Self {
        let status = PipelineStatusHandle::default();
        let supervisor = EngineSupervisor::new(spawner, status.clone(), engine);
        Self {
            inner: Mutex::new(PipelineInner {
                supervisor,
                source: None,
                config: None,
            }),
            sources: Arc::new(sources),
            status,
            cancel: StdMutex::new(CancellationToken::new()),
        }
    }

    fn fresh_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = token.clone();
        token
    }

    pub async fn start(&self, config: MixConfig) -> Result<()> {
        config.validate()?;
        let mut inner = self.inner.lock().await;
        let cancel = self.fresh_cancel();

        let state = self.status.get().await.process_state;
        if !matches!(state, ProcessState::Idle | ProcessState::Failed) {
            bail!(
                "pipeline is {} — stop it before starting again",
                state.as_str()
            );
        }
        if let Some(stale) = inner.source.take() {
            warn!("Releasing source left over from a failed session");
            self.sources.release(Some(stale)).await;
        }

        info!(
            "Starting pipeline: {} -> {} (secondary: {})",
            config.input_url,
            config.output_url,
            config.source_mode.as_str()
        );
        self.status.set_process(ProcessState::Starting).await;
        if config.source_mode == SourceMode::Browser {
            self.status.set_browser(BrowserState::Launching).await;
        }

        let source = tokio::select! {
            source = self.sources.acquire(&config) => source,
            _ = cancel.cancelled() => {
                self.status.set_process(ProcessState::Idle).await;
                self.status.set_browser(BrowserState::Inactive).await;
                bail!("start cancelled");
            }
        };

        let browser_state = match (config.source_mode, source.is_some()) {
            (SourceMode::Browser, true) => BrowserState::Active,
            (SourceMode::Browser, false) => BrowserState::Failed,
            _ => BrowserState::Inactive,
        };
        self.status.set_browser(browser_state).await;

        let secondary = source.as_ref().map(|handle| handle.graph_input());
        let graph = FilterGraph::build(&config, secondary.as_ref());

        match inner.supervisor.start(&graph, &cancel).await {
            Ok(()) => {
                inner.source = source;
                inner.config = Some(config.clone());
                self.status.session_started(config).await;
                Ok(())
            }
            Err(e) => {
                // never hold on to an acquired source after a failed start
                self.sources.release(source).await;
                self.status.set_browser(BrowserState::Inactive).await;
                Err(e)
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        // abort an in-flight start before queueing for the lock
        self.cancel.lock().unwrap().cancel();
        let mut inner = self.inner.lock().await;

        inner.supervisor.stop().await;
        let source = inner.source.take();
        self.sources.release(source).await;
        inner.config = None;
        self.status.session_cleared().await;
        info!("Pipeline stopped");
        Ok(())
    }

    /// Apply gain/delay changes to the running pipeline. Implemented as a
    /// full engine restart with the merged config — the graph text cannot
    /// be edited on a live process — reusing the existing source handle.
    /// Callers see a brief output gap.
    pub async fn update_live_parameters(&self, update: LiveUpdate) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let cancel = self.fresh_cancel();

        let current = inner
            .config
            .clone()
            .context("no active pipeline — start one before adjusting parameters")?;
        let state = self.status.get().await.process_state;
        if state != ProcessState::Running {
            bail!(
                "pipeline is {} — live updates need a running pipeline",
                state.as_str()
            );
        }

        let merged = current.merged(&update);
        merged.validate()?;

        let secondary = inner.source.as_ref().map(|handle| handle.graph_input());
        let graph = FilterGraph::build(&merged, secondary.as_ref());

        info!(
            "Restarting engine with updated parameters (volumes {}/{}, delays {}ms/{}ms)",
            merged.primary_volume,
            merged.secondary_volume,
            merged.primary_delay_ms,
            merged.secondary_delay_ms
        );
        inner.supervisor.restart(&graph, &cancel).await?;
        inner.config = Some(merged.clone());
        self.status.session_started(merged).await;
        Ok(())
    }

    /// Pure read; no side effects.
    pub async fn status(&self) -> PipelineSnapshot {
        self.status.get().await
    }
}
