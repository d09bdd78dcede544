pub mod capture;
pub mod cpal;
pub mod file;
pub mod unit;

pub use capture::{
    downsample_chunk, normalize_chunk, stereo_to_mono, AudioChunk, CaptureBackend, CaptureConfig,
};
pub use cpal::CpalBackend;
pub use file::AudioFile;
pub use unit::AudioUnit;
