//! Mock engine used by supervisor and machine tests.

use crate::engine::{EngineEvent, EngineProcess, EngineSpawner, SpawnedEngine};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::status::{PipelineStatusHandle, ProcessState};

struct SpawnedState {
    dead: Arc<AtomicBool>,
    events: mpsc::Sender<EngineEvent>,
}

/// Fake engine spawner: tracks how many processes were spawned, how many
/// are alive right now, and the historical peak, so tests can assert the
/// one-process-at-a-time invariant.
#[derive(Clone, Default)]
pub(crate) struct MockEngine {
    alive: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    spawns: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
    hold_ready: Arc<AtomicBool>,
    last_args: Arc<Mutex<Vec<String>>>,
    processes: Arc<Mutex<Vec<SpawnedState>>>,
}

impl MockEngine {
    pub fn refuse_spawns(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn hold_readiness(&self) {
        self.hold_ready.store(true, Ordering::SeqCst);
    }

    pub fn alive_now(&self) -> usize {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn peak_alive(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn spawn_total(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Vec<String> {
        self.last_args.lock().unwrap().clone()
    }

    /// Simulate the most recently spawned engine dying on its own.
    pub async fn crash_current(&self, code: i32, detail: Option<&str>) {
        let state = {
            let processes = self.processes.lock().unwrap();
            processes
                .last()
                .map(|p| (p.dead.clone(), p.events.clone()))
        };
        if let Some((dead, events)) = state {
            if !dead.swap(true, Ordering::SeqCst) {
                self.alive.fetch_sub(1, Ordering::SeqCst);
                let _ = events
                    .send(EngineEvent::Exited {
                        status: Some(code),
                        detail: detail.map(str::to_string),
                    })
                    .await;
            }
        }
    }
}

#[async_trait]
impl EngineSpawner for MockEngine {
    async fn spawn(&self, args: &[String]) -> Result<SpawnedEngine> {
        if self.refuse.load(Ordering::SeqCst) {
            bail!("mock spawner refused to launch");
        }
        self.spawns.fetch_add(1, Ordering::SeqCst);
        let now = self.alive.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = args.to_vec();

        let (events_tx, events_rx) = mpsc::channel(4);
        if !self.hold_ready.load(Ordering::SeqCst) {
            let _ = events_tx.try_send(EngineEvent::Ready);
        }

        let dead = Arc::new(AtomicBool::new(false));
        self.processes.lock().unwrap().push(SpawnedState {
            dead: dead.clone(),
            events: events_tx.clone(),
        });

        Ok(SpawnedEngine {
            process: Box::new(MockProcess {
                alive: self.alive.clone(),
                dead,
                events: events_tx,
            }),
            events: events_rx,
        })
    }
}

struct MockProcess {
    alive: Arc<AtomicUsize>,
    dead: Arc<AtomicBool>,
    events: mpsc::Sender<EngineEvent>,
}

#[async_trait]
impl EngineProcess for MockProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    async fn shutdown(&mut self, _grace: Duration) {
        if !self.dead.swap(true, Ordering::SeqCst) {
            self.alive.fetch_sub(1, Ordering::SeqCst);
            let _ = self
                .events
                .send(EngineEvent::Exited {
                    status: Some(0),
                    detail: None,
                })
                .await;
        }
    }
}

/// Poll the status handle until it reaches the wanted state or a second
/// passes (asynchronous transitions go through spawned watcher tasks).
pub(crate) async fn wait_for_state(status: &PipelineStatusHandle, wanted: ProcessState) {
    for _ in 0..100 {
        if status.get().await.process_state == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "pipeline never reached {:?}, currently {:?}",
        wanted,
        status.get().await.process_state
    );
}
