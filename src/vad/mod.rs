pub mod monitor;

pub use monitor::{chunk_level, StopReason, VadConfig, VoiceActivityMonitor};
