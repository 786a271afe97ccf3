use serde::Deserialize;
use std::time::Duration;

use super::{ProviderKind, RecognitionError, SpeechProvider};
use crate::audio::AudioSample;
use crate::config::RecognitionConfig;

/// Web speech recognizer for one locale
pub struct WebSpeechProvider {
    client: reqwest::blocking::Client,
    endpoint: String,
    locale: String,
    api_key: Option<String>,
    kind: ProviderKind,
}

#[derive(Debug, Deserialize)]
struct ResponseLine {
    #[serde(default)]
    result: Vec<ResultEntry>,
}

#[derive(Debug, Deserialize)]
struct ResultEntry {
    #[serde(default)]
    alternative: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

impl WebSpeechProvider {
    /// Creates a provider for `locale`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        config: &RecognitionConfig,
        locale: &str,
        kind: ProviderKind,
    ) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            locale: locale.to_owned(),
            api_key: config.resolved_api_key(),
            kind,
        })
    }

    /// Primary and secondary providers, or none when no API key is configured
    ///
    /// # Errors
    /// Returns error if an HTTP client cannot be built
    pub fn configured(config: &RecognitionConfig) -> anyhow::Result<Vec<Self>> {
        if config.resolved_api_key().is_none() {
            tracing::warn!("no web speech API key configured, online recognition disabled");
            return Ok(Vec::new());
        }
        Ok(vec![
            Self::new(config, &config.primary_locale, ProviderKind::PrimaryOnline)?,
            Self::new(config, &config.secondary_locale, ProviderKind::SecondaryOnline)?,
        ])
    }

    /// True if requests can be authenticated
    #[must_use]
    pub const fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_url(&self, key: &str) -> String {
        format!(
            "{}?client=chromium&lang={}&key={}&pFilter=0",
            self.endpoint,
            urlencoding::encode(&self.locale),
            urlencoding::encode(key)
        )
    }
}

impl SpeechProvider for WebSpeechProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> String {
        format!("web-speech ({})", self.locale)
    }

    fn recognize(&self, audio: &AudioSample) -> Result<String, RecognitionError> {
        // no request was made, so this is not a connectivity problem
        let Some(key) = self.api_key.as_deref() else {
            tracing::debug!(locale = %self.locale, "no API key, skipping web speech");
            return Err(RecognitionError::Unrecognized);
        };

        let _span = tracing::debug_span!("web_speech", locale = %self.locale).entered();
        let start = std::time::Instant::now();

        let response = self
            .client
            .post(self.request_url(key))
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("audio/l16; rate={}", audio.sample_rate()),
            )
            .body(audio.to_pcm16_be())
            .send()
            .map_err(|e| RecognitionError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognitionError::ServiceUnavailable(format!(
                "request failed with status {status}"
            )));
        }

        let body = response
            .text()
            .map_err(|e| RecognitionError::ServiceUnavailable(e.to_string()))?;

        tracing::debug!(
            status = %status,
            bytes = body.len(),
            request_ms = start.elapsed().as_millis(),
            "web speech response received"
        );

        parse_response(&body).ok_or(RecognitionError::Unrecognized)
    }
}

/// Extracts the first transcript from a newline-delimited JSON response
///
/// Lines that fail to parse are skipped; the service sends an empty
/// `{"result":[]}` line before the real one.
#[must_use]
pub fn parse_response(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<ResponseLine>(line).ok())
        .find_map(|line| {
            let entry = line.result.into_iter().next()?;
            let alternative = entry.alternative.into_iter().next()?;
            let text = alternative.transcript.trim().to_owned();
            (!text.is_empty()).then_some(text)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_skips_empty_first_line() {
        let body = "{\"result\":[]}\n{\"result\":[{\"alternative\":[{\"transcript\":\"open youtube\",\"confidence\":0.92},{\"transcript\":\"open you tube\"}],\"final\":true}],\"result_index\":0}\n";
        assert_eq!(parse_response(body), Some("open youtube".to_owned()));
    }

    #[test]
    fn test_parse_response_no_result() {
        assert_eq!(parse_response("{\"result\":[]}\n"), None);
        assert_eq!(parse_response(""), None);
        assert_eq!(parse_response("not json\n"), None);
    }

    #[test]
    fn test_parse_response_blank_transcript() {
        let body = "{\"result\":[{\"alternative\":[{\"transcript\":\"  \"}]}]}";
        assert_eq!(parse_response(body), None);
    }

    #[test]
    fn test_request_url_encodes_parameters() {
        let config = RecognitionConfig {
            endpoint: "http://localhost:9/recognize".to_owned(),
            api_key: Some("a key".to_owned()),
            ..RecognitionConfig::default()
        };
        let provider = WebSpeechProvider::new(&config, "en-US", ProviderKind::PrimaryOnline).unwrap();
        assert_eq!(
            provider.request_url("a key"),
            "http://localhost:9/recognize?client=chromium&lang=en-US&key=a%20key&pFilter=0"
        );
        assert_eq!(provider.name(), "web-speech (en-US)");
    }

    fn keyless(kind: ProviderKind, locale: &str) -> WebSpeechProvider {
        WebSpeechProvider {
            client: reqwest::blocking::Client::new(),
            endpoint: "http://localhost:9/recognize".to_owned(),
            locale: locale.to_owned(),
            api_key: None,
            kind,
        }
    }

    #[test]
    fn test_missing_key_is_unrecognized() {
        let provider = keyless(ProviderKind::SecondaryOnline, "en-IN");
        assert!(!provider.has_api_key());
        let audio = AudioSample::new(vec![0.0; 160], crate::audio::SAMPLE_RATE);
        assert_eq!(provider.recognize(&audio), Err(RecognitionError::Unrecognized));
    }

    #[test]
    fn test_keyless_chain_with_failing_offline_is_unrecognized() {
        let mut offline = crate::recognition::MockSpeechProvider::new();
        offline.expect_kind().return_const(ProviderKind::Offline);
        offline.expect_name().returning(|| "offline".to_owned());
        offline
            .expect_recognize()
            .times(1)
            .returning(|_| Err(RecognitionError::Unrecognized));
        let mut providers: Vec<Box<dyn SpeechProvider>> = Vec::new();
        providers.push(Box::new(keyless(ProviderKind::PrimaryOnline, "en-US")));
        providers.push(Box::new(keyless(ProviderKind::SecondaryOnline, "en-IN")));
        providers.push(Box::new(offline));
        let chain = crate::recognition::RecognitionChain::new(providers);

        let audio = AudioSample::new(vec![0.0; 160], crate::audio::SAMPLE_RATE);
        assert_eq!(chain.recognize(&audio), Err(RecognitionError::Unrecognized));
    }

    #[test]
    fn test_configured_without_key_is_empty() {
        if std::env::var(crate::config::API_KEY_ENV).is_ok() {
            return;
        }
        let config = RecognitionConfig {
            api_key: None,
            ..RecognitionConfig::default()
        };
        assert!(WebSpeechProvider::configured(&config).unwrap().is_empty());

        let config = RecognitionConfig {
            api_key: Some("key".to_owned()),
            ..RecognitionConfig::default()
        };
        let kinds: Vec<ProviderKind> = WebSpeechProvider::configured(&config)
            .unwrap()
            .iter()
            .map(SpeechProvider::kind)
            .collect();
        assert_eq!(kinds, vec![ProviderKind::PrimaryOnline, ProviderKind::SecondaryOnline]);
    }

    #[test]
    fn test_unreachable_endpoint_is_service_unavailable() {
        let config = RecognitionConfig {
            // discard port, nothing listens there
            endpoint: "http://127.0.0.1:9/recognize".to_owned(),
            api_key: Some("key".to_owned()),
            request_timeout_secs: 2,
            ..RecognitionConfig::default()
        };
        let provider = WebSpeechProvider::new(&config, "en-US", ProviderKind::PrimaryOnline).unwrap();
        let audio = AudioSample::new(vec![0.0; 160], crate::audio::SAMPLE_RATE);
        assert!(matches!(
            provider.recognize(&audio),
            Err(RecognitionError::ServiceUnavailable(_))
        ));
    }
}
