//! Spoken output.

use std::process::Command;
use thiserror::Error;

use crate::actions::Platform;
use crate::config::SpeechConfig;

/// Errors from the speech sink
#[derive(Debug, Error)]
pub enum SpeechError {
    /// Speech command could not be started
    #[error("failed to run speech command {program}: {source}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Speech command exited with an error
    #[error("speech command {program} exited with {status}")]
    Failed {
        /// Program that was invoked
        program: String,
        /// Exit status
        status: std::process::ExitStatus,
    },
}

/// Blocking text-to-speech output
#[cfg_attr(test, mockall::automock)]
pub trait SpeechSink {
    /// Speaks `text`, returning once playback finished
    ///
    /// # Errors
    /// Returns error if the speech backend fails
    fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Speaks through the platform speech command
pub struct CommandSpeaker {
    platform: Platform,
    settings: SpeechConfig,
}

impl CommandSpeaker {
    /// Creates a speaker for `platform`
    #[must_use]
    pub const fn new(platform: Platform, settings: SpeechConfig) -> Self {
        Self { platform, settings }
    }

    /// Program and arguments that speak `text`
    #[must_use]
    pub fn command_line(&self, text: &str) -> Vec<(String, Vec<String>)> {
        let rate = self.settings.rate;
        let volume = self.settings.volume.clamp(0.0, 1.0);
        match self.platform {
            Platform::MacOs => vec![(
                "say".to_owned(),
                vec!["-r".to_owned(), rate.to_string(), text.to_owned()],
            )],
            Platform::Linux => {
                // espeak amplitude is 0..=200, 100 being normal
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let amplitude = (volume * 100.0).round() as u32;
                let args = vec![
                    "-s".to_owned(),
                    rate.to_string(),
                    "-a".to_owned(),
                    amplitude.to_string(),
                    text.to_owned(),
                ];
                vec![
                    ("espeak-ng".to_owned(), args.clone()),
                    ("espeak".to_owned(), args),
                ]
            }
            Platform::Windows => {
                // System.Speech rate runs -10..=10 with 0 at roughly 180 wpm
                let sapi_rate = ((i64::from(rate) - 180) / 20).clamp(-10, 10);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let sapi_volume = (volume * 100.0).round() as u32;
                let escaped = text.replace('\'', "''");
                let script = format!(
                    "Add-Type -AssemblyName System.Speech; \
                     $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                     $s.Rate = {sapi_rate}; $s.Volume = {sapi_volume}; $s.Speak('{escaped}')"
                );
                vec![(
                    "powershell".to_owned(),
                    vec!["-NoProfile".to_owned(), "-Command".to_owned(), script],
                )]
            }
        }
    }
}

impl SpeechSink for CommandSpeaker {
    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        tracing::info!(target: "assistant", "{text}");

        let mut last_error = None;
        for (program, args) in self.command_line(text) {
            match Command::new(&program).args(&args).status() {
                Ok(status) if status.success() => return Ok(()),
                Ok(status) => return Err(SpeechError::Failed { program, status }),
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(program = %program, "speech command not installed, trying next");
                    last_error = Some(SpeechError::Spawn { program, source });
                }
                Err(source) => return Err(SpeechError::Spawn { program, source }),
            }
        }

        match last_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
