use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{ProviderKind, RecognitionError, SpeechProvider};
use crate::audio::AudioSample;
use crate::config::OfflineModelConfig;

/// Errors raised while loading the local model
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model file missing, invalid, or parameters out of range
    #[error("failed to load whisper model from {path}: {source}")]
    Load {
        /// Path to model file
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },
}

/// Offline recognizer backed by a local whisper model
pub struct WhisperProvider {
    ctx: Mutex<WhisperContext>,
    threads: i32,
    beam_size: i32,
    language: Option<String>,
}

impl WhisperProvider {
    const fn sampling_strategy(beam_size: i32) -> SamplingStrategy {
        if beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        }
    }

    /// Loads the model at `model_path`
    ///
    /// # Errors
    /// Returns error if the file is missing or invalid, or if `threads`/`beam_size` are zero
    pub fn new(model_path: &Path, config: &OfflineModelConfig) -> Result<Self, ModelError> {
        let load_error = |source: anyhow::Error| ModelError::Load {
            path: model_path.display().to_string(),
            source,
        };

        if config.threads == 0 {
            return Err(load_error(anyhow::anyhow!("threads must be > 0")));
        }
        if config.beam_size == 0 {
            return Err(load_error(anyhow::anyhow!("beam_size must be > 0")));
        }

        let threads = i32::try_from(config.threads)
            .map_err(|_| load_error(anyhow::anyhow!("threads value too large (max: {})", i32::MAX)))?;
        let beam_size = i32::try_from(config.beam_size).map_err(|_| {
            load_error(anyhow::anyhow!("beam_size value too large (max: {})", i32::MAX))
        })?;

        tracing::info!(
            path = %model_path.display(),
            threads = config.threads,
            beam_size = config.beam_size,
            language = ?config.language,
            "loading whisper model"
        );

        let path_str = model_path
            .to_str()
            .ok_or_else(|| load_error(anyhow::anyhow!("model path contains invalid UTF-8")))?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| load_error(anyhow::anyhow!("{e:?}")))?;

        tracing::info!("whisper model loaded");

        Ok(Self {
            ctx: Mutex::new(ctx),
            threads,
            beam_size,
            language: config.language.clone(),
        })
    }

    fn transcribe(&self, samples: &[f32]) -> anyhow::Result<String> {
        let _span = tracing::debug_span!("whisper", samples = samples.len()).entered();

        let mut state = self
            .ctx
            .lock()
            .map_err(|e| anyhow::anyhow!("mutex poisoned: {e}"))?
            .create_state()
            .map_err(|e| anyhow::anyhow!("failed to create whisper state: {e:?}"))?;

        let mut params = FullParams::new(Self::sampling_strategy(self.beam_size));
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(self.language.as_deref());
        params.set_translate(false);

        let start = std::time::Instant::now();
        state
            .full(params, samples)
            .map_err(|e| anyhow::anyhow!("whisper inference failed: {e:?}"))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
        }
        let text = strip_annotations(&text);

        tracing::info!(
            segments = state.full_n_segments(),
            text_len = text.len(),
            inference_ms = start.elapsed().as_millis(),
            "offline transcription completed"
        );

        Ok(text)
    }
}

impl SpeechProvider for WhisperProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Offline
    }

    fn name(&self) -> String {
        "whisper".to_owned()
    }

    fn recognize(&self, audio: &AudioSample) -> Result<String, RecognitionError> {
        if audio.is_empty() {
            return Err(RecognitionError::Unrecognized);
        }
        match self.transcribe(audio.samples()) {
            Ok(text) if !text.is_empty() => Ok(text),
            Ok(_) => Err(RecognitionError::Unrecognized),
            Err(e) => {
                tracing::warn!(error = %e, "offline recognition failed");
                Err(RecognitionError::Unrecognized)
            }
        }
    }
}

/// Removes non-speech markers such as `[BLANK_AUDIO]` or `(wind blowing)`
#[must_use]
pub fn strip_annotations(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0_usize;
    for c in text.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OfflineModelConfig {
        OfflineModelConfig::default()
    }

    #[test]
    fn test_model_load_nonexistent_path() {
        let result = WhisperProvider::new(Path::new("/nonexistent/ggml-base.en.bin"), &config());
        match result {
            Err(ModelError::Load { path, .. }) => assert!(path.contains("nonexistent")),
            Ok(_) => panic!("loading a missing model must fail"),
        }
    }

    #[test]
    fn test_zero_threads_rejected() {
        let bad = OfflineModelConfig {
            threads: 0,
            ..config()
        };
        let err = WhisperProvider::new(Path::new("/tmp/model.bin"), &bad)
            .err()
            .unwrap();
        assert!(err.to_string().contains("/tmp/model.bin"));
    }

    #[test]
    fn test_zero_beam_size_rejected() {
        let bad = OfflineModelConfig {
            beam_size: 0,
            ..config()
        };
        assert!(WhisperProvider::new(Path::new("/tmp/model.bin"), &bad).is_err());
    }

    #[test]
    fn test_sampling_strategy() {
        assert!(matches!(
            WhisperProvider::sampling_strategy(1),
            SamplingStrategy::Greedy { best_of: 1 }
        ));
        assert!(matches!(
            WhisperProvider::sampling_strategy(5),
            SamplingStrategy::BeamSearch { beam_size: 5, .. }
        ));
    }

    #[test]
    fn test_strip_annotations() {
        assert_eq!(strip_annotations(" [BLANK_AUDIO] "), "");
        assert_eq!(strip_annotations(" (wind blowing) open youtube"), "open youtube");
        assert_eq!(strip_annotations("what [music] time is it"), "what time is it");
        assert_eq!(strip_annotations("hello"), "hello");
        // stray closing bracket is kept
        assert_eq!(strip_annotations("a ) b"), "a ) b");
    }

    #[test]
    #[ignore = "requires actual model file"]
    fn test_silence_is_unrecognized() {
        let path = crate::config::Config::expand_path(&config().path).unwrap();
        let provider = WhisperProvider::new(&path, &config()).unwrap();
        let silence = AudioSample::new(vec![0.0; 16_000], crate::audio::SAMPLE_RATE);
        assert_eq!(provider.recognize(&silence), Err(RecognitionError::Unrecognized));
    }
}
