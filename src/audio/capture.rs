use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioChunk {
    /// Duration covered by this chunk in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / (self.sample_rate as u64 * self.channels as u64)
    }
}

/// Configuration for audio capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Target sample rate (device audio is decimated down to this)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    #[serde(default = "default_channels")]
    pub channels: u16,
    /// Chunk size in milliseconds (affects latency)
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u64,
    /// Finalized recordings below this many encoded bytes count as empty
    #[serde(default = "default_min_unit_bytes")]
    pub min_unit_bytes: usize,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

fn default_chunk_ms() -> u64 {
    100
}

fn default_min_unit_bytes() -> usize {
    1000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            chunk_ms: default_chunk_ms(),
            min_unit_bytes: default_min_unit_bytes(),
        }
    }
}

impl CaptureConfig {
    /// Reject zero rates and sizes before they reach the capture arithmetic
    pub fn validate(&self) -> Result<(), VoiceError> {
        if self.sample_rate == 0 {
            return Err(VoiceError::Capture(
                "audio.sample_rate must be greater than zero".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(VoiceError::Capture(
                "audio.channels must be greater than zero".to_string(),
            ));
        }
        if self.chunk_ms == 0 {
            return Err(VoiceError::Capture(
                "audio.chunk_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Microphone capture backend trait
///
/// One session owns the stream between `acquire` and `release`. A backend
/// may be re-acquired after release; auto-converse opens a fresh stream for
/// every recording.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Request the input device and start capturing
    ///
    /// Returns a channel receiver that will receive audio chunks. Fails
    /// with `PermissionDenied` or `DeviceUnavailable`, distinguished.
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioChunk>, VoiceError>;

    /// Stop capturing and free the device; safe to call repeatedly
    async fn release(&mut self) -> Result<(), VoiceError>;

    /// Check if a stream is currently held
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Normalize a chunk to the target rate and channel count
pub fn normalize_chunk(chunk: AudioChunk, target_sample_rate: u32, target_channels: u16) -> AudioChunk {
    let mut processed = chunk;

    if processed.channels != target_channels && target_channels == 1 {
        processed = stereo_to_mono(processed);
    }

    if processed.sample_rate != target_sample_rate {
        processed = downsample_chunk(processed, target_sample_rate);
    }

    processed
}

/// Downsample a chunk by decimation
pub fn downsample_chunk(chunk: AudioChunk, target_rate: u32) -> AudioChunk {
    if target_rate == 0 || chunk.sample_rate == target_rate {
        return chunk;
    }

    let ratio = chunk.sample_rate / target_rate;
    if ratio <= 1 {
        return chunk; // Can't upsample
    }

    // Decimate: keep every Nth frame, all channels of it
    let frame_width = chunk.channels.max(1) as usize;
    let decimated: Vec<i16> = chunk
        .samples
        .chunks_exact(frame_width)
        .step_by(ratio as usize)
        .flatten()
        .copied()
        .collect();

    AudioChunk {
        samples: decimated,
        sample_rate: chunk.sample_rate / ratio,
        channels: chunk.channels,
        timestamp_ms: chunk.timestamp_ms,
    }
}

/// Convert stereo to mono by summing channels
pub fn stereo_to_mono(chunk: AudioChunk) -> AudioChunk {
    if chunk.channels == 1 {
        return chunk;
    }

    if chunk.channels != 2 {
        return chunk; // Only support stereo -> mono
    }

    let mut mono_samples = Vec::with_capacity(chunk.samples.len() / 2);

    // Sum left and right channels (no division to preserve volume)
    for pair in chunk.samples.chunks_exact(2) {
        let left = pair[0] as i32;
        let right = pair[1] as i32;
        let sum = left + right;
        let mono = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        mono_samples.push(mono);
    }

    AudioChunk {
        samples: mono_samples,
        sample_rate: chunk.sample_rate,
        channels: 1,
        timestamp_ms: chunk.timestamp_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: Vec<i16>, sample_rate: u32, channels: u16) -> AudioChunk {
        AudioChunk {
            samples,
            sample_rate,
            channels,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_capture_config_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.chunk_ms, 100);
        assert_eq!(config.min_unit_bytes, 1000);
    }

    #[test]
    fn test_chunk_duration() {
        let c = chunk(vec![0; 1600], 16000, 1);
        assert_eq!(c.duration_ms(), 100);

        let stereo = chunk(vec![0; 3200], 16000, 2);
        assert_eq!(stereo.duration_ms(), 100);
    }

    #[test]
    fn test_stereo_to_mono_sums_channels() {
        let c = chunk(vec![100, 200, -50, 50], 16000, 2);
        let mono = stereo_to_mono(c);

        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![300, 0]);
    }

    #[test]
    fn test_stereo_to_mono_clamps_overflow() {
        let c = chunk(vec![i16::MAX, i16::MAX, i16::MIN, i16::MIN], 16000, 2);
        let mono = stereo_to_mono(c);

        assert_eq!(mono.samples, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_downsample_by_decimation() {
        let c = chunk((0..48).collect(), 48000, 1);
        let down = downsample_chunk(c, 16000);

        assert_eq!(down.sample_rate, 16000);
        assert_eq!(down.samples.len(), 16);
        assert_eq!(down.samples[0], 0);
        assert_eq!(down.samples[1], 3);
    }

    #[test]
    fn test_downsample_never_upsamples() {
        let c = chunk(vec![1, 2, 3], 16000, 1);
        let out = downsample_chunk(c.clone(), 48000);

        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.samples, c.samples);
    }

    #[test]
    fn test_downsample_passes_a_zero_target_through() {
        let c = chunk(vec![1, 2, 3], 16000, 1);
        let out = downsample_chunk(c.clone(), 0);

        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.samples, c.samples);
    }

    #[test]
    fn test_config_validation_rejects_zero_values() {
        assert!(CaptureConfig::default().validate().is_ok());

        let zero_rate = CaptureConfig {
            sample_rate: 0,
            ..CaptureConfig::default()
        };
        let err = zero_rate.validate().expect_err("zero rate should fail");
        assert!(err.to_string().contains("audio.sample_rate"));

        let zero_channels = CaptureConfig {
            channels: 0,
            ..CaptureConfig::default()
        };
        assert!(zero_channels.validate().is_err());

        let zero_chunk = CaptureConfig {
            chunk_ms: 0,
            ..CaptureConfig::default()
        };
        assert!(zero_chunk.validate().is_err());
    }

    #[test]
    fn test_normalize_stereo_48k_to_mono_16k() {
        let c = chunk(vec![10; 9600], 48000, 2);
        let out = normalize_chunk(c, 16000, 1);

        assert_eq!(out.channels, 1);
        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.samples.len(), 1600);
        assert!(out.samples.iter().all(|&s| s == 20));
    }
}
