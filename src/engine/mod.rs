//! Transcoding engine process capability.
//!
//! The supervisor talks to the engine through two small traits so the
//! lifecycle logic can be exercised without ffmpeg installed. The real
//! implementation spawns ffmpeg, watches its stderr for the first progress
//! line (readiness) while keeping a short tail of log lines for failure
//! reasons, and shuts down by asking for a clean quit before force-killing.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, warn};

const STDERR_TAIL_LINES: usize = 12;

/// Lifecycle signals surfaced by a spawned engine. `Ready` fires at most
/// once; `Exited` is final.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Ready,
    Exited {
        status: Option<i32>,
        detail: Option<String>,
    },
}

/// Control side of a running engine process.
#[async_trait]
pub trait EngineProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Ask the engine to quit, wait out the grace period, force-kill if it
    /// is still alive. Resolves once the process has fully exited.
    async fn shutdown(&mut self, grace: Duration);
}

pub struct SpawnedEngine {
    pub process: Box<dyn EngineProcess>,
    pub events: mpsc::Receiver<EngineEvent>,
}

#[async_trait]
pub trait EngineSpawner: Send + Sync {
    async fn spawn(&self, args: &[String]) -> Result<SpawnedEngine>;
}

/// Spawns and monitors a real ffmpeg process.
pub struct FfmpegSpawner {
    program: PathBuf,
    progress: Regex,
}

impl FfmpegSpawner {
    pub fn new(configured_path: Option<&str>) -> Result<Self> {
        let program = match configured_path {
            Some(path) => PathBuf::from(path),
            None => which::which("ffmpeg").context("ffmpeg not found in PATH")?,
        };
        // ffmpeg stats lines start with frame= (video) or size= (audio-only)
        let progress = Regex::new(r"^(frame=\s*\d+|size=\s*\d+|time=\d)")?;
        Ok(Self { program, progress })
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl EngineSpawner for FfmpegSpawner {
    async fn spawn(&self, args: &[String]) -> Result<SpawnedEngine> {
        debug!("Launching engine: {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch {}", self.program.display()))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stderr = child
            .stderr
            .take()
            .context("engine stderr was not captured")?;

        let (events_tx, events_rx) = mpsc::channel(4);
        let (kill_tx, kill_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(false);
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        tokio::spawn(scan_engine_stderr(
            stderr,
            self.progress.clone(),
            events_tx.clone(),
            tail.clone(),
        ));
        tokio::spawn(supervise_child(child, kill_rx, done_tx, events_tx, tail));

        Ok(SpawnedEngine {
            process: Box::new(FfmpegControl {
                pid,
                stdin,
                kill: kill_tx,
                done: done_rx,
            }),
            events: events_rx,
        })
    }
}

struct FfmpegControl {
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    kill: mpsc::Sender<()>,
    done: watch::Receiver<bool>,
}

#[async_trait]
impl EngineProcess for FfmpegControl {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn shutdown(&mut self, grace: Duration) {
        if *self.done.borrow() {
            return;
        }

        // ffmpeg treats 'q' on stdin as a clean quit request
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.write_all(b"q").await;
            let _ = stdin.shutdown().await;
        }

        let mut done = self.done.clone();
        if timeout(grace, done.wait_for(|stopped| *stopped))
            .await
            .is_err()
        {
            warn!("Engine ignored quit request, force-killing");
            let _ = self.kill.send(()).await;
            let _ = timeout(grace, done.wait_for(|stopped| *stopped)).await;
        }
    }
}

/// Splits engine stderr into lines (ffmpeg ends progress lines with \r and
/// log lines with \n), reports the first progress line as readiness, and
/// keeps a tail of log lines as context for exit diagnostics.
async fn scan_engine_stderr(
    stderr: ChildStderr,
    progress: Regex,
    events: mpsc::Sender<EngineEvent>,
    tail: Arc<Mutex<VecDeque<String>>>,
) {
    let mut reader = BufReader::new(stderr);
    let mut chunk = [0u8; 4096];
    let mut line: Vec<u8> = Vec::new();
    let mut ready_sent = false;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &chunk[..n] {
            if byte != b'\n' && byte != b'\r' {
                line.push(byte);
                continue;
            }
            if line.is_empty() {
                continue;
            }
            let text = String::from_utf8_lossy(&line).trim().to_string();
            line.clear();
            if text.is_empty() {
                continue;
            }
            if progress.is_match(&text) {
                if !ready_sent {
                    ready_sent = true;
                    let _ = events.send(EngineEvent::Ready).await;
                }
            } else {
                debug!("engine: {}", text);
                let mut tail = tail.lock().unwrap();
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(text);
            }
        }
    }
}

/// Owns the child for its whole lifetime: waits for exit, honors force-kill
/// requests, then publishes the exit event and flips the done flag.
async fn supervise_child(
    mut child: Child,
    mut kill_rx: mpsc::Receiver<()>,
    done: watch::Sender<bool>,
    events: mpsc::Sender<EngineEvent>,
    tail: Arc<Mutex<VecDeque<String>>>,
) {
    let status = loop {
        tokio::select! {
            result = child.wait() => break result,
            cmd = kill_rx.recv() => {
                if let Err(e) = child.start_kill() {
                    debug!("Engine already gone on kill: {}", e);
                }
                if cmd.is_none() {
                    // control handle dropped with the child still alive
                    break child.wait().await;
                }
            }
        }
    };

    let code = status.ok().and_then(|s| s.code());
    let detail = {
        let tail = tail.lock().unwrap();
        if tail.is_empty() {
            None
        } else {
            Some(tail.iter().cloned().collect::<Vec<_>>().join(" | "))
        }
    };

    let _ = done.send(true);
    let _ = events.send(EngineEvent::Exited {
        status: code,
        detail,
    })
    .await;
}
