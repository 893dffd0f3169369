//! Silent placeholder audio artifact.
//!
//! Browser-mode sources cannot expose real tab audio, so the mix gets a
//! fixed silent bed the engine loops for as long as the primary feed runs.
//! The artifact is byte-for-byte reproducible.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u16 = 2;
pub const DURATION_SECS: u32 = 10;

pub fn write_silence(path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create placeholder WAV at {:?}", path))?;
    for _ in 0..(SAMPLE_RATE * DURATION_SECS * u32::from(CHANNELS)) {
        writer.write_sample(0i16)?;
    }
    writer
        .finalize()
        .context("failed to finalize placeholder WAV")?;

    Ok(())
}
