//! Speech-to-text providers and the fallback chain that orders them.

/// Ordered provider fallback
pub mod chain;
/// Offline model download
pub mod download;
/// Local whisper provider
pub mod offline;
/// Web speech provider
pub mod online;

use std::fmt;
use thiserror::Error;

use crate::audio::AudioSample;

pub use chain::RecognitionChain;
pub use offline::WhisperProvider;
pub use online::WebSpeechProvider;

/// Which chain entry produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Online provider, primary locale
    PrimaryOnline,
    /// Online provider, secondary locale
    SecondaryOnline,
    /// Local model, works without network
    Offline,
}

impl ProviderKind {
    /// True for providers that need the network
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::PrimaryOnline | Self::SecondaryOnline)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrimaryOnline => "primary-online",
            Self::SecondaryOnline => "secondary-online",
            Self::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// Failure of one provider call (or of the whole chain)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// Audio was processed but no text came out
    #[error("speech was not recognized")]
    Unrecognized,

    /// Provider could not be reached or refused the request
    #[error("recognition service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Non-empty recognized text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    text: String,
    provider: ProviderKind,
}

impl Transcript {
    /// Trims `text`; returns `None` if nothing is left
    #[must_use]
    pub fn new(text: &str, provider: ProviderKind) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_owned(),
            provider,
        })
    }

    /// Recognized text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Producing provider
    #[must_use]
    pub const fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Consumes the transcript, returning the text
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}

/// One speech-to-text backend
#[cfg_attr(test, mockall::automock)]
pub trait SpeechProvider {
    /// Position of this provider in the chain
    fn kind(&self) -> ProviderKind;

    /// Short label for logs
    fn name(&self) -> String;

    /// Transcribe one utterance
    ///
    /// # Errors
    /// Returns [`RecognitionError::ServiceUnavailable`] on transport failures
    /// and [`RecognitionError::Unrecognized`] when no text was produced
    fn recognize(&self, audio: &AudioSample) -> Result<String, RecognitionError>;
}
