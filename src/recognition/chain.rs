use tracing::{debug, info, warn};

use super::{ProviderKind, RecognitionError, SpeechProvider, Transcript};
use crate::audio::AudioSample;

/// Providers tried strictly in order until one returns text
pub struct RecognitionChain {
    providers: Vec<Box<dyn SpeechProvider>>,
}

impl RecognitionChain {
    /// Builds a chain; `providers` is the priority order
    #[must_use]
    pub fn new(providers: Vec<Box<dyn SpeechProvider>>) -> Self {
        let names: Vec<String> = providers.iter().map(|p| p.name()).collect();
        info!(providers = ?names, "recognition chain ready");
        Self { providers }
    }

    /// Number of providers in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True if the chain has no providers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Runs every provider in priority order
    ///
    /// # Errors
    /// [`RecognitionError::ServiceUnavailable`] if nothing matched and an online
    /// provider failed on the network, otherwise [`RecognitionError::Unrecognized`]
    pub fn recognize(&self, audio: &AudioSample) -> Result<Transcript, RecognitionError> {
        Self::first_transcript(self.providers.iter(), audio)
    }

    /// Runs only the offline providers
    ///
    /// # Errors
    /// [`RecognitionError::Unrecognized`] if no offline provider produced text
    pub fn recognize_offline(&self, audio: &AudioSample) -> Result<Transcript, RecognitionError> {
        let offline = self.providers.iter().filter(|p| !p.kind().is_online());
        Self::first_transcript(offline, audio)
    }

    fn first_transcript<'a>(
        providers: impl Iterator<Item = &'a Box<dyn SpeechProvider>>,
        audio: &AudioSample,
    ) -> Result<Transcript, RecognitionError> {
        let mut network_failure: Option<String> = None;

        for provider in providers {
            let kind = provider.kind();
            let _span = tracing::debug_span!("provider", name = %provider.name()).entered();

            match provider.recognize(audio) {
                Ok(text) => {
                    if let Some(transcript) = Transcript::new(&text, kind) {
                        info!(provider = %kind, text = transcript.text(), "speech recognized");
                        return Ok(transcript);
                    }
                    debug!(provider = %kind, "provider returned empty text");
                }
                Err(RecognitionError::Unrecognized) => {
                    debug!(provider = %kind, "provider could not recognize speech");
                }
                Err(RecognitionError::ServiceUnavailable(reason)) => {
                    warn!(provider = %kind, reason = %reason, "provider unavailable");
                    if kind.is_online() && network_failure.is_none() {
                        network_failure = Some(reason);
                    }
                }
            }
        }

        Err(network_failure.map_or(
            RecognitionError::Unrecognized,
            RecognitionError::ServiceUnavailable,
        ))
    }

    /// Kinds in priority order
    #[must_use]
    pub fn kinds(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }
}
