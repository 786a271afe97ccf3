//! Top-level listen → handle → reply loop.

use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{error, info};

use crate::actions::{Platform, SystemBrowser, SystemLauncher};
use crate::audio::MicrophoneSource;
use crate::config::{Config, SessionMode};
use crate::intent::{CommandHandler, Dispatcher, EchoHandler, SystemClock};
use crate::listener::{Listener, ListenerError, ECHO_READY_PROMPT};
use crate::recognition::{
    download, RecognitionChain, SpeechProvider, WebSpeechProvider, WhisperProvider,
};
use crate::shutdown::Shutdown;
use crate::speech::CommandSpeaker;

const ASSISTANT_WELCOME: &str = "Voice assistant is ready! I can help you open applications, \
answer questions, and chat with you. How can I help you today?";
const ECHO_WELCOME: &str = "Voice assistant is ready! I will repeat everything you say.";
const ASSISTANT_NO_RESULT: &str =
    "I couldn't understand what you said. Please try again or say 'help' to see what I can do.";
const ECHO_NO_RESULT: &str = "I couldn't understand what you said. Please try again.";

/// Spoken when the operator interrupts the session
pub const INTERRUPT_FAREWELL: &str = "Voice assistant stopped. Goodbye!";
/// Spoken when the session dies on an unexpected error
pub const FATAL_MESSAGE: &str = "A critical error occurred. Shutting down.";

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The user asked to stop
    Exited,
    /// Operator interrupt
    Interrupted,
    /// Unrecoverable error
    Fatal,
}

/// One run of the voice assistant
pub struct Session {
    listener: Listener,
    handler: Box<dyn CommandHandler>,
    shutdown: Shutdown,
    mode: SessionMode,
    cycle_pause: Duration,
}

impl Session {
    /// Creates a session; the listener must not have been calibrated yet
    #[must_use]
    pub fn new(
        listener: Listener,
        handler: Box<dyn CommandHandler>,
        shutdown: Shutdown,
        mode: SessionMode,
        cycle_pause: Duration,
    ) -> Self {
        let listener = match mode {
            SessionMode::Assistant => listener,
            SessionMode::Echo => listener.with_ready_prompt(ECHO_READY_PROMPT),
        };
        Self {
            listener,
            handler,
            shutdown,
            mode,
            cycle_pause,
        }
    }

    /// Builds the production session: microphone, recognition chain, speaker and handler
    ///
    /// Must run on the thread that will call [`Session::run`]; the audio
    /// stream cannot move between threads.
    ///
    /// # Errors
    /// Returns error if the microphone, HTTP client or offline model cannot be set up
    pub fn from_config(config: &Config, shutdown: Shutdown) -> anyhow::Result<Self> {
        let platform = Platform::current();

        let model_path = Config::expand_path(&config.recognition.offline.path)?;
        download::ensure_model(&config.recognition.offline.name, &model_path)
            .context("failed to fetch offline model")?;
        let offline = WhisperProvider::new(&model_path, &config.recognition.offline)
            .context("failed to load offline model")?;
        let mut providers: Vec<Box<dyn SpeechProvider>> = Vec::new();
        for online in WebSpeechProvider::configured(&config.recognition)? {
            providers.push(Box::new(online));
        }
        providers.push(Box::new(offline));
        let chain = RecognitionChain::new(providers);

        let microphone =
            MicrophoneSource::new(shutdown.clone()).context("failed to open microphone")?;
        let speaker = CommandSpeaker::new(platform, config.speech);

        let debug_dir = config
            .audio
            .debug_recordings_dir
            .as_deref()
            .map(Config::expand_path)
            .transpose()?;

        let listener = Listener::new(
            config.listener.clone(),
            Box::new(microphone),
            chain,
            Box::new(speaker),
        )
        .with_debug_recordings(debug_dir);

        let handler: Box<dyn CommandHandler> = match config.session.mode {
            SessionMode::Assistant => Box::new(Dispatcher::new(
                Box::new(SystemLauncher::new(
                    platform,
                    Box::new(SystemBrowser::new(platform)),
                )),
                Box::new(SystemBrowser::new(platform)),
                Box::new(SystemClock),
                StdRng::from_entropy(),
            )),
            SessionMode::Echo => Box::new(EchoHandler),
        };

        Ok(Self::new(
            listener,
            handler,
            shutdown,
            config.session.mode,
            config.listener.cycle_pause(),
        ))
    }

    /// Runs until the user exits, the operator interrupts, or a fatal error occurs
    pub fn run(&mut self) -> SessionEnd {
        match self.run_cycles() {
            Ok(()) => {
                info!("session ended by user");
                SessionEnd::Exited
            }
            // Ctrl+C also kills the speech child process, so any error after a
            // shutdown request counts as the interrupt
            Err(e) if matches!(e, ListenerError::Interrupted) || self.shutdown.is_requested() => {
                info!(error = %e, "session interrupted");
                self.say_last(INTERRUPT_FAREWELL);
                SessionEnd::Interrupted
            }
            Err(e) => {
                error!(error = %e, "session failed");
                self.say_last(FATAL_MESSAGE);
                SessionEnd::Fatal
            }
        }
    }

    fn run_cycles(&mut self) -> Result<(), ListenerError> {
        self.listener.calibrate()?;

        let welcome = match self.mode {
            SessionMode::Assistant => ASSISTANT_WELCOME,
            SessionMode::Echo => ECHO_WELCOME,
        };
        self.listener.say(welcome)?;
        info!(mode = ?self.mode, "voice assistant is active and listening");

        loop {
            if self.shutdown.is_requested() {
                return Err(ListenerError::Interrupted);
            }

            match self.listener.listen_for_command()? {
                Some(transcript) => {
                    info!(text = transcript.text(), provider = %transcript.provider(), "heard");
                    let result = self.handler.handle(transcript.text());
                    self.listener.say(&result.response)?;
                    if !result.continue_session {
                        return Ok(());
                    }
                }
                None => {
                    let message = match self.mode {
                        SessionMode::Assistant => ASSISTANT_NO_RESULT,
                        SessionMode::Echo => ECHO_NO_RESULT,
                    };
                    self.listener.say(message)?;
                }
            }

            if !self.cycle_pause.is_zero() {
                std::thread::sleep(self.cycle_pause);
            }
        }
    }

    fn say_last(&self, text: &str) {
        if let Err(e) = self.listener.say(text) {
            error!(error = %e, "failed to speak final message");
        }
    }
}
