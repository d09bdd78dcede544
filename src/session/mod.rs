//! Recording session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - Microphone acquisition and release
//! - Audio normalization and buffering
//! - Voice activity monitoring and automatic stops
//! - Session statistics and state management

mod config;
mod controller;
mod stats;

pub use config::SessionConfig;
pub use controller::{SessionController, SessionOutcome};
pub use stats::{SessionState, SessionStats};
