//! Engine lifecycle supervision.
//!
//! The supervisor is the single owner of the transcoding process. It drives
//! the state machine Idle -> Starting -> Running -> Stopping -> Idle, with
//! Failed reachable from Starting and Running. An unexpected exit while
//! running is reported through the status handle; the supervisor never
//! restarts the engine on its own.

use crate::config::EngineConfig;
use crate::engine::{EngineEvent, EngineProcess, EngineSpawner, SpawnedEngine};
use crate::graph::FilterGraph;
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::status::{PipelineStatusHandle, ProcessState};

pub struct EngineSupervisor {
    spawner: Box<dyn EngineSpawner>,
    process: Option<Box<dyn EngineProcess>>,
    status: PipelineStatusHandle,
    /// Bumped before every planned shutdown so a stale exit watcher cannot
    /// mark a deliberate stop as a failure.
    generation: Arc<AtomicU64>,
    startup_timeout: Duration,
    stop_grace: Duration,
}

enum StartWait {
    Ready,
    Died(String),
    Cancelled,
    TimedOut,
}

impl EngineSupervisor {
    pub fn new(
        spawner: Box<dyn EngineSpawner>,
        status: PipelineStatusHandle,
        engine: &EngineConfig,
    ) -> Self {
        Self {
            spawner,
            process: None,
            status,
            generation: Arc::new(AtomicU64::new(0)),
            startup_timeout: Duration::from_secs(engine.startup_timeout_seconds),
            stop_grace: Duration::from_secs(engine.stop_grace_seconds),
        }
    }

    /// Spawn the engine for the given graph and wait until it reports its
    /// first processed output. The wait is bounded and cancellable.
    pub async fn start(&mut self, graph: &FilterGraph, cancel: &CancellationToken) -> Result<()> {
        let state = self.status.get().await.process_state;
        if !matches!(
            state,
            ProcessState::Idle | ProcessState::Starting | ProcessState::Failed
        ) {
            bail!("engine is {} — stop it before starting again", state.as_str());
        }
        self.status.set_process(ProcessState::Starting).await;

        let args = graph.engine_args();
        let SpawnedEngine {
            process,
            mut events,
        } = match self.spawner.spawn(&args).await {
            Ok(spawned) => spawned,
            Err(e) => {
                self.status
                    .set_failed(format!("engine failed to launch: {e:#}"))
                    .await;
                return Err(e);
            }
        };
        self.process = Some(process);

        let outcome = tokio::select! {
            event = events.recv() => match event {
                Some(EngineEvent::Ready) => StartWait::Ready,
                Some(EngineEvent::Exited { status, detail }) => {
                    StartWait::Died(exit_reason(status, detail))
                }
                None => StartWait::Died("engine event stream closed".to_string()),
            },
            _ = cancel.cancelled() => StartWait::Cancelled,
            _ = tokio::time::sleep(self.startup_timeout) => StartWait::TimedOut,
        };

        match outcome {
            StartWait::Ready => {
                info!(
                    "Engine running (pid {:?})",
                    self.process.as_ref().and_then(|p| p.pid())
                );
                self.status.set_process(ProcessState::Running).await;
                self.watch_for_unexpected_exit(events);
                Ok(())
            }
            StartWait::Died(reason) => {
                self.process = None;
                warn!("Engine died during startup: {}", reason);
                self.status.set_failed(reason.clone()).await;
                bail!("engine died during startup: {reason}");
            }
            StartWait::Cancelled => {
                self.teardown().await;
                self.status.set_process(ProcessState::Idle).await;
                bail!("startup cancelled");
            }
            StartWait::TimedOut => {
                self.teardown().await;
                let reason = format!(
                    "engine produced no output within {}s",
                    self.startup_timeout.as_secs()
                );
                self.status.set_failed(reason.clone()).await;
                bail!("{reason}");
            }
        }
    }

    /// Stop whatever is running. Ends in Idle from any state; cleanup
    /// problems are logged, never propagated.
    pub async fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.process.is_some() {
            self.status.set_process(ProcessState::Stopping).await;
            self.teardown().await;
        }
        self.status.set_process(ProcessState::Idle).await;
    }

    /// Stop-then-start. The old engine has fully exited before the new one
    /// spawns, so the destination endpoint never sees two publishers.
    pub async fn restart(&mut self, graph: &FilterGraph, cancel: &CancellationToken) -> Result<()> {
        self.stop().await;
        self.start(graph, cancel).await
    }

    fn watch_for_unexpected_exit(&self, mut events: mpsc::Receiver<EngineEvent>) {
        let session = self.generation.load(Ordering::SeqCst);
        let generation = self.generation.clone();
        let status = self.status.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let EngineEvent::Exited {
                    status: code,
                    detail,
                } = event
                {
                    if generation.load(Ordering::SeqCst) == session {
                        let reason = exit_reason(code, detail);
                        warn!("Engine exited unexpectedly: {}", reason);
                        status.set_failed(reason).await;
                    }
                    break;
                }
            }
        });
    }

    async fn teardown(&mut self) {
        if let Some(mut process) = self.process.take() {
            process.shutdown(self.stop_grace).await;
        }
    }
}

fn exit_reason(status: Option<i32>, detail: Option<String>) -> String {
    let code = status
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    match detail {
        Some(detail) => format!("engine exited with status {code}: {detail}"),
        None => format!("engine exited with status {code}"),
    }
}
