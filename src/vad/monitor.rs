use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a recording session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit stop request from the caller
    Manual,
    /// The quiet window reached the configured silence duration
    Silence,
    /// The session hit the recording length ceiling
    MaxDuration,
    /// The service is shutting down
    Shutdown,
    /// The capture stream died mid-session
    Fault,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Manual => "manual",
            StopReason::Silence => "silence",
            StopReason::MaxDuration => "max_duration",
            StopReason::Shutdown => "shutdown",
            StopReason::Fault => "fault",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Voice activity settings
///
/// Levels are normalized to 0.0..=1.0. A level strictly above the
/// threshold counts as speech, so a threshold of 0.0 treats any nonzero
/// sample as speech and the session only ends at the duration ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// Loudness above this counts as speech
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,
    /// Quiet time that ends the recording
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u64,
    /// Hard ceiling on recording length
    #[serde(default = "default_max_recording_ms")]
    pub max_recording_ms: u64,
    /// How often levels are sampled
    #[serde(default = "default_analysis_interval_ms")]
    pub analysis_interval_ms: u64,
}

fn default_silence_threshold() -> f32 {
    0.01
}

fn default_silence_duration_ms() -> u64 {
    2000
}

fn default_max_recording_ms() -> u64 {
    10_000
}

fn default_analysis_interval_ms() -> u64 {
    100
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            silence_threshold: default_silence_threshold(),
            silence_duration_ms: default_silence_duration_ms(),
            max_recording_ms: default_max_recording_ms(),
            analysis_interval_ms: default_analysis_interval_ms(),
        }
    }
}

/// Tracks the sliding quiet window over observed loudness levels and
/// decides when a recording should end. Purely time-driven: the caller
/// feeds one level per analysis tick along with elapsed session time.
#[derive(Debug)]
pub struct VoiceActivityMonitor {
    config: VadConfig,
    last_loud_ms: u64,
    decided: bool,
}

impl VoiceActivityMonitor {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            last_loud_ms: 0,
            decided: false,
        }
    }

    /// Feed one analysis tick. Returns a stop decision at most once per
    /// session; later ticks return None.
    pub fn observe(&mut self, level: f32, elapsed: Duration) -> Option<StopReason> {
        if self.decided {
            return None;
        }

        let elapsed_ms = elapsed.as_millis() as u64;

        // The length ceiling applies no matter how loud the input is
        if elapsed_ms >= self.config.max_recording_ms {
            self.decided = true;
            return Some(StopReason::MaxDuration);
        }

        if level > self.config.silence_threshold {
            self.last_loud_ms = elapsed_ms;
            return None;
        }

        if elapsed_ms.saturating_sub(self.last_loud_ms) >= self.config.silence_duration_ms {
            self.decided = true;
            return Some(StopReason::Silence);
        }

        None
    }

    /// Milliseconds of session time at the most recent speech
    pub fn last_loud_ms(&self) -> u64 {
        self.last_loud_ms
    }
}

/// Normalized loudness of a sample block: mean absolute amplitude scaled
/// into 0.0..=1.0
pub fn chunk_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|s| s.unsigned_abs() as u64).sum();
    (sum as f64 / samples.len() as f64 / 32768.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_defaults() {
        let config = VadConfig::default();
        assert_eq!(config.silence_threshold, 0.01);
        assert_eq!(config.silence_duration_ms, 2000);
        assert_eq!(config.max_recording_ms, 10_000);
        assert_eq!(config.analysis_interval_ms, 100);
    }

    #[test]
    fn test_silence_fires_after_quiet_window() {
        let mut monitor = VoiceActivityMonitor::new(VadConfig::default());

        let mut decision = None;
        for tick in 1..=20 {
            decision = monitor.observe(0.0, ms(tick * 100));
            if decision.is_some() {
                assert_eq!(tick, 20, "stopped early at tick {tick}");
                break;
            }
        }
        assert_eq!(decision, Some(StopReason::Silence));
    }

    #[test]
    fn test_speech_resets_the_window() {
        let mut monitor = VoiceActivityMonitor::new(VadConfig::default());

        // Loud at 1.5s pushes the quiet window out past 3.4s
        for tick in 1..=34 {
            let level = if tick == 15 { 0.5 } else { 0.0 };
            let decision = monitor.observe(level, ms(tick * 100));
            assert_eq!(decision, None, "unexpected stop at tick {tick}");
        }
        assert_eq!(monitor.observe(0.0, ms(3500)), Some(StopReason::Silence));
    }

    #[test]
    fn test_level_at_threshold_counts_as_quiet() {
        let mut monitor = VoiceActivityMonitor::new(VadConfig::default());

        // Exactly the threshold is not speech
        for tick in 1..=19 {
            assert_eq!(monitor.observe(0.01, ms(tick * 100)), None);
        }
        assert_eq!(monitor.observe(0.01, ms(2000)), Some(StopReason::Silence));
    }

    #[test]
    fn test_zero_threshold_only_stops_at_ceiling() {
        let config = VadConfig {
            silence_threshold: 0.0,
            ..VadConfig::default()
        };
        let mut monitor = VoiceActivityMonitor::new(config);

        // Any nonzero level counts as speech, so silence never triggers
        for tick in 1..=99 {
            assert_eq!(monitor.observe(0.001, ms(tick * 100)), None);
        }
        assert_eq!(
            monitor.observe(0.001, ms(10_000)),
            Some(StopReason::MaxDuration)
        );
    }

    #[test]
    fn test_ceiling_fires_even_while_loud() {
        let mut monitor = VoiceActivityMonitor::new(VadConfig::default());

        for tick in 1..=99 {
            assert_eq!(monitor.observe(0.9, ms(tick * 100)), None);
        }
        assert_eq!(
            monitor.observe(0.9, ms(10_000)),
            Some(StopReason::MaxDuration)
        );
    }

    #[test]
    fn test_decision_is_single_shot() {
        let mut monitor = VoiceActivityMonitor::new(VadConfig::default());

        assert_eq!(monitor.observe(0.0, ms(2000)), Some(StopReason::Silence));
        assert_eq!(monitor.observe(0.0, ms(2100)), None);
        assert_eq!(monitor.observe(0.0, ms(20_000)), None);
    }

    #[test]
    fn test_chunk_level_ranges() {
        assert_eq!(chunk_level(&[]), 0.0);
        assert_eq!(chunk_level(&[0, 0, 0, 0]), 0.0);

        let full = vec![i16::MIN; 64];
        assert!((chunk_level(&full) - 1.0).abs() < 1e-6);

        let half = vec![16384i16; 64];
        let level = chunk_level(&half);
        assert!((level - 0.5).abs() < 0.01, "level {level}");
    }

    #[test]
    fn test_stop_reason_labels() {
        assert_eq!(StopReason::Silence.label(), "silence");
        assert_eq!(StopReason::MaxDuration.to_string(), "max_duration");
        assert_eq!(StopReason::Fault.label(), "fault");
    }
}
