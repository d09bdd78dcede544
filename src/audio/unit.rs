use super::capture::AudioChunk;
use crate::error::VoiceError;
use std::io::Cursor;

/// Finalized, immutable recording artifact
///
/// One unit is produced per recording session by concatenating the buffered
/// chunks into a single WAV container held in memory. It is consumed once
/// by the pipeline and then dropped; nothing caches it.
#[derive(Debug, Clone)]
pub struct AudioUnit {
    data: Vec<u8>,
    media_type: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: usize,
    pub duration_ms: u64,
}

impl AudioUnit {
    /// Concatenate buffered chunks into one WAV-encoded unit
    ///
    /// Returns `Ok(None)` when no samples were captured: the empty-recording
    /// signal that skips the pipeline instead of crashing it. Chunk format
    /// is taken from the first non-empty chunk; the buffer is expected to
    /// be uniformly normalized by the session.
    pub fn from_chunks(chunks: &[AudioChunk]) -> Result<Option<Self>, VoiceError> {
        let first = match chunks.iter().find(|c| !c.samples.is_empty()) {
            Some(first) => first,
            None => return Ok(None),
        };

        let sample_rate = first.sample_rate;
        let channels = first.channels;

        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in chunks {
            samples.extend_from_slice(&chunk.samples);
        }

        Self::from_samples(&samples, sample_rate, channels)
    }

    /// Encode raw samples into a WAV-backed unit
    pub fn from_samples(
        samples: &[i16],
        sample_rate: u32,
        channels: u16,
    ) -> Result<Option<Self>, VoiceError> {
        if samples.is_empty() {
            return Ok(None);
        }
        if sample_rate == 0 || channels == 0 {
            return Err(VoiceError::Capture(
                "cannot encode audio with a zero sample rate or channel count".to_string(),
            ));
        }

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| VoiceError::Capture(format!("failed to create WAV writer: {e}")))?;

            for &sample in samples {
                writer
                    .write_sample(sample)
                    .map_err(|e| VoiceError::Capture(format!("failed to write sample: {e}")))?;
            }

            writer
                .finalize()
                .map_err(|e| VoiceError::Capture(format!("failed to finalize WAV: {e}")))?;
        }

        let duration_ms = samples.len() as u64 * 1000 / (sample_rate as u64 * channels as u64);

        Ok(Some(Self {
            data: cursor.into_inner(),
            media_type: "audio/wav",
            sample_rate,
            channels,
            sample_count: samples.len(),
            duration_ms,
        }))
    }

    /// Encoded WAV bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Declared media type of the payload
    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    /// Encoded size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}
