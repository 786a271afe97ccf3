//! Listen/recognize retry loop.
//!
//! [`Listener::listen_for_command`] turns the unreliable microphone plus
//! recognition chain into "a transcript or nothing": every recoverable
//! failure is classified, announced through the speech sink and retried, up
//! to the configured number of attempts. Only an operator interrupt or a
//! broken speech sink escape as errors.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::{AudioSample, AudioSource, Calibration, CaptureError, ListenSettings};
use crate::config::ListenerConfig;
use crate::recognition::{RecognitionChain, RecognitionError, Transcript};
use crate::speech::{SpeechError, SpeechSink};

/// Spoken before the first attempt of each call
pub const READY_PROMPT: &str = "I'm ready to listen. How can I help you?";
/// Ready prompt used in echo mode
pub const ECHO_READY_PROMPT: &str = "I'm ready to listen. Please speak clearly.";

const NO_SPEECH_PROMPT: &str = "I didn't hear anything. Please try speaking again.";
const UNRECOGNIZED_PROMPT: &str = "I didn't catch that. Please speak a bit louder and clearer.";
const NETWORK_PROMPT: &str =
    "I'm having internet connection problems. Let me try offline recognition.";
const NETWORK_RETRY_PROMPT: &str = "Let me try again with a different approach.";
const UNEXPECTED_PROMPT: &str = "Something went wrong. Let me try again.";
const EXHAUSTED_PROMPT: &str = "I'm having trouble understanding. Let's try again from the beginning.";
const NO_SPEECH_EXHAUSTED_PROMPT: &str = "I'm not hearing any speech. Please check your microphone.";

/// Where the listener is in the current call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not listening
    Idle,
    /// Waiting for or capturing an utterance
    Listening,
    /// Running the recognition chain
    Recognizing,
    /// A transcript was produced
    Succeeded,
    /// The last attempt failed, another one follows
    RecoverableFailure,
    /// All attempts failed
    Exhausted,
}

/// Why a single attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Nobody started speaking before the timeout
    NoSpeechDetected,
    /// Audio was captured but no provider understood it
    UnrecognizedSpeech,
    /// Online recognition could not be reached
    ServiceUnavailable,
    /// The audio device reported an error
    UnexpectedCaptureError,
}

impl FailureKind {
    const fn prompt(self) -> &'static str {
        match self {
            Self::NoSpeechDetected => NO_SPEECH_PROMPT,
            Self::UnrecognizedSpeech => UNRECOGNIZED_PROMPT,
            Self::ServiceUnavailable => NETWORK_RETRY_PROMPT,
            Self::UnexpectedCaptureError => UNEXPECTED_PROMPT,
        }
    }
}

/// Errors that end a listen call
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Operator requested shutdown
    #[error("listening interrupted")]
    Interrupted,

    /// The speech sink failed
    #[error(transparent)]
    Speech(#[from] SpeechError),

    /// Ambient calibration could not read the device
    #[error("microphone calibration failed")]
    Calibration(#[source] anyhow::Error),
}

/// Capture/recognize orchestrator
pub struct Listener {
    config: ListenerConfig,
    source: Box<dyn AudioSource>,
    chain: RecognitionChain,
    speaker: Box<dyn SpeechSink>,
    calibration: Calibration,
    state: ListenerState,
    ready_prompt: &'static str,
    debug_dir: Option<PathBuf>,
}

impl Listener {
    /// Creates an idle listener
    #[must_use]
    pub fn new(
        config: ListenerConfig,
        source: Box<dyn AudioSource>,
        chain: RecognitionChain,
        speaker: Box<dyn SpeechSink>,
    ) -> Self {
        let calibration = Calibration::from_config(&config);
        Self {
            config,
            source,
            chain,
            speaker,
            calibration,
            state: ListenerState::Idle,
            ready_prompt: READY_PROMPT,
            debug_dir: None,
        }
    }

    /// Replaces the prompt spoken before the first attempt
    #[must_use]
    pub fn with_ready_prompt(mut self, prompt: &'static str) -> Self {
        self.ready_prompt = prompt;
        self
    }

    /// Saves every captured utterance as WAV into `dir`
    #[must_use]
    pub fn with_debug_recordings(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> ListenerState {
        self.state
    }

    /// Current energy threshold
    #[must_use]
    pub const fn energy_threshold(&self) -> f32 {
        self.calibration.energy_threshold
    }

    /// Speaks `text` through the sink
    ///
    /// # Errors
    /// Returns error if the speech sink fails
    pub fn say(&self, text: &str) -> Result<(), SpeechError> {
        self.speaker.speak(text)
    }

    /// Samples ambient noise and sets the energy threshold (never below the floor)
    ///
    /// # Errors
    /// Returns [`ListenerError::Interrupted`] on shutdown, or
    /// [`ListenerError::Calibration`] if the device fails
    pub fn calibrate(&mut self) -> Result<f32, ListenerError> {
        let duration = self.config.calibration();
        info!(seconds = duration.as_secs_f64(), "calibrating microphone, stay quiet");

        // ambient sampling uses its own ratio, listening uses the configured one
        self.calibration.dynamic_ratio = self.config.calibration_energy_ratio;
        let sampled = self.source.calibrate(duration, &mut self.calibration);
        self.calibration.dynamic_ratio = self.config.dynamic_energy_ratio;

        match sampled {
            Ok(_) => {}
            Err(CaptureError::Interrupted) => return Err(ListenerError::Interrupted),
            Err(CaptureError::Device(e)) => return Err(ListenerError::Calibration(e)),
            Err(e @ CaptureError::WaitTimeout { .. }) => {
                return Err(ListenerError::Calibration(e.into()))
            }
        }
        self.calibration.apply_floor(self.config.min_energy_threshold);

        info!(
            energy_threshold = self.calibration.energy_threshold,
            "microphone calibrated"
        );
        Ok(self.calibration.energy_threshold)
    }

    /// Listens until a transcript is produced or all attempts failed
    ///
    /// `Ok(None)` means every attempt failed; the final prompt has been spoken.
    ///
    /// # Errors
    /// Returns [`ListenerError::Interrupted`] on shutdown and
    /// [`ListenerError::Speech`] if a prompt cannot be spoken
    pub fn listen_for_command(&mut self) -> Result<Option<Transcript>, ListenerError> {
        let result = self.run_attempts();
        if result.is_err() {
            self.transition(ListenerState::Idle);
        }
        result
    }

    fn run_attempts(&mut self) -> Result<Option<Transcript>, ListenerError> {
        // floor also covers a listener that was never calibrated
        self.calibration.apply_floor(self.config.min_energy_threshold);
        let settings = ListenSettings::from(&self.config);
        let retries = self.config.retries;
        let mut last_failure = None;

        for attempt in 0..retries {
            let last = attempt + 1 == retries;
            let _span = tracing::info_span!("attempt", n = attempt + 1, of = retries).entered();

            self.transition(ListenerState::Listening);
            if attempt == 0 {
                self.say(self.ready_prompt)?;
            }

            let kind = match self.source.listen(&mut self.calibration, &settings) {
                Ok(audio) => match self.recognize(&audio, last)? {
                    Ok(transcript) => {
                        self.transition(ListenerState::Succeeded);
                        return Ok(Some(transcript));
                    }
                    Err(kind) => kind,
                },
                Err(CaptureError::Interrupted) => return Err(ListenerError::Interrupted),
                Err(CaptureError::WaitTimeout { waited }) => {
                    debug!(waited_ms = waited.as_millis(), "no speech before timeout");
                    FailureKind::NoSpeechDetected
                }
                Err(CaptureError::Device(e)) => {
                    warn!(error = %format!("{e:#}"), "capture failed");
                    FailureKind::UnexpectedCaptureError
                }
            };

            info!(failure = ?kind, "attempt failed");
            last_failure = Some(kind);
            if !last {
                self.transition(ListenerState::RecoverableFailure);
                // the network path already spoke its retry prompt
                if kind != FailureKind::ServiceUnavailable {
                    self.say(kind.prompt())?;
                    pause(self.config.retry_pause());
                }
            }
        }

        self.transition(ListenerState::Exhausted);
        // the final attempt decides which prompt closes the call
        let prompt = if last_failure == Some(FailureKind::NoSpeechDetected) {
            NO_SPEECH_EXHAUSTED_PROMPT
        } else {
            EXHAUSTED_PROMPT
        };
        self.say(prompt)?;
        Ok(None)
    }

    // Outer result carries fatal speech errors, inner one the attempt outcome
    fn recognize(
        &mut self,
        audio: &AudioSample,
        last: bool,
    ) -> Result<Result<Transcript, FailureKind>, ListenerError> {
        self.save_debug_recording(audio);
        self.transition(ListenerState::Recognizing);

        match self.chain.recognize(audio) {
            Ok(transcript) => Ok(Ok(transcript)),
            Err(RecognitionError::Unrecognized) => Ok(Err(FailureKind::UnrecognizedSpeech)),
            Err(RecognitionError::ServiceUnavailable(reason)) => {
                warn!(reason = %reason, "online recognition unavailable");
                self.say(NETWORK_PROMPT)?;
                if let Ok(transcript) = self.chain.recognize_offline(audio) {
                    return Ok(Ok(transcript));
                }
                if !last {
                    self.say(NETWORK_RETRY_PROMPT)?;
                    pause(self.config.network_retry_pause());
                }
                Ok(Err(FailureKind::ServiceUnavailable))
            }
        }
    }

    fn save_debug_recording(&self, audio: &AudioSample) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let name = format!(
            "utterance-{}.wav",
            chrono::Local::now().format("%Y%m%d-%H%M%S%.3f")
        );
        if let Err(e) = audio.save_wav(&dir.join(name)) {
            warn!(error = %e, "failed to save debug recording");
        }
    }

    fn transition(&mut self, next: ListenerState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "listener state");
            self.state = next;
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}
