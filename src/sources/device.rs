//! Capture-device acquisition via an external recorder subprocess.
//!
//! The recorder (pw-record by default) writes continuous audio to a scratch
//! path; we consider the device live once the file starts filling. The wait
//! is bounded — a device that never produces audio gets its recorder killed
//! and the caller degrades to primary-only.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::debug;

use crate::config::CaptureConfig;

/// Bytes beyond a bare RIFF header before the capture counts as live.
const MIN_CAPTURE_BYTES: u64 = 44;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Spawn the recorder for `device` writing to `path` and wait (bounded)
/// until audio arrives. On timeout or early exit the recorder is reaped.
pub async fn spawn_capture(config: &CaptureConfig, device: &str, path: &Path) -> Result<Child> {
    let mut command = Command::new(&config.command);
    command
        .args(&config.extra_args)
        .arg("--target")
        .arg(device)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to launch capture command '{}'", config.command))?;

    let deadline = Duration::from_secs(config.ready_timeout_seconds);
    match timeout(deadline, wait_for_audio(&mut child, path)).await {
        Ok(Ok(())) => {
            debug!("Capture of '{}' writing to {:?}", device, path);
            Ok(child)
        }
        Ok(Err(e)) => {
            reap(child).await;
            Err(e)
        }
        Err(_) => {
            reap(child).await;
            bail!(
                "capture of '{}' produced no audio within {}s",
                device,
                config.ready_timeout_seconds
            );
        }
    }
}

async fn wait_for_audio(child: &mut Child, path: &Path) -> Result<()> {
    loop {
        if let Some(status) = child
            .try_wait()
            .context("failed to poll capture process")?
        {
            bail!("capture process exited early with {status}");
        }
        if let Ok(meta) = tokio::fs::metadata(path).await {
            if meta.len() > MIN_CAPTURE_BYTES {
                return Ok(());
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Kill and wait out a capture child. Failures only mean it was already gone.
pub async fn reap(mut child: Child) {
    if let Err(e) = child.start_kill() {
        debug!("Capture process already gone: {}", e);
    }
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shell_capture(script: &str, ready_timeout_seconds: u64) -> CaptureConfig {
        CaptureConfig {
            command: "sh".to_string(),
            // sh -c '<script>' cap --target <device> <path>: the path lands in $3
            extra_args: vec!["-c".to_string(), script.to_string(), "cap".to_string()],
            ready_timeout_seconds,
        }
    }

    #[tokio::test]
    async fn test_capture_ready_once_file_fills() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let config = shell_capture(
            "dd if=/dev/zero of=$3 bs=1024 count=1 2>/dev/null; sleep 10",
            5,
        );
        let child = spawn_capture(&config, "usb-deck", &path).await.unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() > MIN_CAPTURE_BYTES);
        reap(child).await;
    }

    #[tokio::test]
    async fn test_capture_timeout_reaps_recorder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let config = shell_capture("sleep 10", 1);
        let result = spawn_capture(&config, "usb-deck", &path).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_capture_early_exit_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let config = shell_capture("exit 3", 5);
        let result = spawn_capture(&config, "usb-deck", &path).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_capture_command_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("capture.wav");

        let config = CaptureConfig {
            command: "/nonexistent/recorder".to_string(),
            extra_args: Vec::new(),
            ready_timeout_seconds: 1,
        };
        let result = spawn_capture(&config, "usb-deck", &path).await;
        assert!(result.is_err());
    }
}
