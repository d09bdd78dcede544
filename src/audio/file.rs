use super::capture::{normalize_chunk, AudioChunk};
use super::unit::AudioUnit;
use crate::error::VoiceError;
use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use tracing::info;

/// WAV file loaded into memory, for batch pipeline runs and tests
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Package the file as a finalized recording unit, normalized to the
    /// target format the same way live capture is
    pub fn into_unit(
        self,
        target_sample_rate: u32,
        target_channels: u16,
    ) -> Result<AudioUnit, VoiceError> {
        let chunk = AudioChunk {
            samples: self.samples,
            sample_rate: self.sample_rate,
            channels: self.channels,
            timestamp_ms: 0,
        };

        let normalized = normalize_chunk(chunk, target_sample_rate, target_channels);

        AudioUnit::from_samples(&normalized.samples, normalized.sample_rate, normalized.channels)?
            .ok_or(VoiceError::EmptyRecording)
    }
}
