//! Filter graph synthesis for the transcoding engine.
//!
//! A `FilterGraph` is built once per pipeline session from a `MixConfig` and
//! the acquired secondary input (if any), then rendered into the ffmpeg
//! argument vector. Building is pure and deterministic: identical inputs
//! always produce a byte-identical argument vector, which is what makes
//! restarts reproducible and the builder testable without an engine.

use crate::config::MixConfig;
use serde::{Deserialize, Serialize};

/// Seconds amix keeps fading when one input runs dry before the other.
const DROPOUT_TRANSITION_SECS: u32 = 2;

/// Audio bitrate for the mixed output stream.
const AUDIO_BITRATE: &str = "160k";

/// The secondary audio input as the graph sees it: where to read from and
/// whether the engine should loop a finite local resource indefinitely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryInput {
    pub locator: String,
    pub looped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub locator: String,
    pub looped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VideoTreatment {
    /// Pass the video stream through unmodified.
    Copy,
    /// Timestamps were shifted, so the stream must be re-encoded.
    Reencode { bitrate_kbps: u32 },
}

/// Ordered filter stages plus the input/output wiring for one engine run.
/// Immutable once built; a new `MixConfig` always yields a fresh graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGraph {
    inputs: Vec<InputSpec>,
    filters: Vec<String>,
    audio_out: String,
    video: VideoTreatment,
    output_url: String,
}

impl FilterGraph {
    pub fn build(config: &MixConfig, secondary: Option<&SecondaryInput>) -> Self {
        let mut inputs = vec![InputSpec {
            locator: config.input_url.clone(),
            looped: false,
        }];
        let mut filters = Vec::new();

        // Shifting video timestamps rules out stream copy; otherwise the
        // original encoding is preserved untouched.
        let video = if config.primary_delay_ms > 0 {
            filters.push(format!(
                "[0:v]setpts=PTS+{:.3}/TB[vout]",
                f64::from(config.primary_delay_ms) / 1000.0
            ));
            VideoTreatment::Reencode {
                bitrate_kbps: config.video_bitrate_kbps,
            }
        } else {
            VideoTreatment::Copy
        };

        // Gain is emitted even at unity so downstream stages always have a
        // labelled pad to attach to.
        let mut primary_label = "pa".to_string();
        filters.push(format!("[0:a]volume={}[pa]", gain(config.primary_volume)));
        if config.primary_delay_ms > 0 {
            filters.push(format!(
                "[pa]adelay={0}|{0}[pad]",
                config.primary_delay_ms
            ));
            primary_label = "pad".to_string();
        }

        let audio_out = match secondary {
            Some(sec) => {
                inputs.push(InputSpec {
                    locator: sec.locator.clone(),
                    looped: sec.looped,
                });

                let mut secondary_label = "sa".to_string();
                filters.push(format!(
                    "[1:a]volume={}[sa]",
                    gain(config.secondary_volume)
                ));
                if config.secondary_delay_ms > 0 {
                    filters.push(format!(
                        "[sa]adelay={0}|{0}[sad]",
                        config.secondary_delay_ms
                    ));
                    secondary_label = "sad".to_string();
                }

                filters.push(format!(
                    "[{primary_label}][{secondary_label}]amix=inputs=2:duration=longest:dropout_transition={DROPOUT_TRANSITION_SECS}[aout]"
                ));
                "aout".to_string()
            }
            None => primary_label,
        };

        Self {
            inputs,
            filters,
            audio_out,
            video,
            output_url: config.output_url.clone(),
        }
    }

    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn video(&self) -> &VideoTreatment {
        &self.video
    }

    /// Renders the complete engine argument vector (everything after the
    /// program name).
    pub fn engine_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "info".into(),
            "-stats".into(),
            "-y".into(),
        ];

        for input in &self.inputs {
            if input.looped {
                args.push("-stream_loop".into());
                args.push("-1".into());
            }
            args.push("-i".into());
            args.push(input.locator.clone());
        }

        args.push("-filter_complex".into());
        args.push(self.filters.join(";"));

        match &self.video {
            VideoTreatment::Copy => {
                args.push("-map".into());
                args.push("0:v".into());
                args.push("-c:v".into());
                args.push("copy".into());
            }
            VideoTreatment::Reencode { bitrate_kbps } => {
                args.push("-map".into());
                args.push("[vout]".into());
                args.push("-c:v".into());
                args.push("libx264".into());
                args.push("-preset".into());
                args.push("veryfast".into());
                args.push("-b:v".into());
                args.push(format!("{bitrate_kbps}k"));
            }
        }

        args.push("-map".into());
        args.push(format!("[{}]", self.audio_out));
        args.push("-c:a".into());
        args.push("aac".into());
        args.push("-b:a".into());
        args.push(AUDIO_BITRATE.into());

        args.push("-f".into());
        args.push("flv".into());
        args.push(self.output_url.clone());

        args
    }
}

fn gain(volume: u32) -> String {
    format!("{:.2}", f64::from(volume) / 100.0)
}
