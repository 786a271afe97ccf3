//! Voice Assistant - spoken command loop
//!
//! This library exports core modules for testing and reuse by the binary.

/// Application launching and URL opening
pub mod actions;
/// Audio capture and phrase detection
pub mod audio;
/// Configuration management
pub mod config;
/// Intent classification and dispatch
pub mod intent;
/// Listen/recognize retry loop
pub mod listener;
/// Speech-to-text providers
pub mod recognition;
/// Top-level session loop
pub mod session;
/// Operator interrupt flag
pub mod shutdown;
/// Text-to-speech output
pub mod speech;
/// Logging setup
pub mod telemetry;
