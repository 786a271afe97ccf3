/// Microphone capture via CPAL
pub mod capture;
/// Energy-threshold phrase detection
pub mod phrase;

use anyhow::Context;
use hound::{WavSpec, WavWriter};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ListenerConfig;

pub use capture::MicrophoneSource;
pub use phrase::{rms_energy, DetectorStep, PhraseDetector};

/// Sample rate every captured sample is converted to
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per analysis frame (64 ms at 16 kHz)
pub const FRAME_SAMPLES: usize = 1024;

/// Errors surfaced by an audio source
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No speech started before the onset timeout
    #[error("no speech detected within {waited:?}")]
    WaitTimeout {
        /// How long the source waited
        waited: Duration,
    },

    /// Operator requested shutdown while capturing
    #[error("capture interrupted")]
    Interrupted,

    /// Device or stream failure
    #[error("audio device error")]
    Device(#[from] anyhow::Error),
}

/// One captured utterance (16 kHz mono f32)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSample {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioSample {
    /// Wraps mono samples at the given rate
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Raw samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of the utterance
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // sample counts stay far below f64 precision
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// True if no samples were captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 16-bit big-endian PCM, as expected by `audio/l16` uploads
    #[must_use]
    pub fn to_pcm16_be(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&sample| to_i16(sample).to_be_bytes())
            .collect()
    }

    /// Save the utterance as a 16-bit WAV file for debugging
    ///
    /// # Errors
    /// Returns error if directory creation or file write fails
    pub fn save_wav(&self, path: &Path) -> anyhow::Result<()> {
        debug!("saving WAV debug file: {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create debug directory")?;
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = WavWriter::create(path, spec).context("failed to create WAV file")?;
        for &sample in &self.samples {
            writer
                .write_sample(to_i16(sample))
                .context("failed to write sample")?;
        }
        writer.finalize().context("failed to finalize WAV file")?;

        info!(
            "saved WAV debug file: {:?} ({} samples)",
            path,
            self.samples.len()
        );
        Ok(())
    }
}

// f32 → i16: clamped to the i16 range first
#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Energy threshold state, adjusted during calibration and while waiting for speech
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Energy above which audio counts as speech (RMS on the 16-bit scale)
    pub energy_threshold: f32,
    /// Target multiple of the ambient energy
    pub dynamic_ratio: f32,
    /// Fraction of the current threshold kept per second of adjustment
    pub damping: f32,
}

impl Calibration {
    /// Starting state before any ambient sampling
    #[must_use]
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self {
            energy_threshold: config.min_energy_threshold,
            dynamic_ratio: config.dynamic_energy_ratio,
            damping: config.dynamic_energy_damping,
        }
    }

    /// Moves the threshold towards `energy * dynamic_ratio`
    ///
    /// `frame_secs` is the length of the frame the energy was measured over.
    pub fn absorb(&mut self, energy: f32, frame_secs: f32) {
        let damping = self.damping.powf(frame_secs);
        let target = energy * self.dynamic_ratio;
        self.energy_threshold = self.energy_threshold.mul_add(damping, target * (1.0 - damping));
    }

    /// Raises the threshold to at least `floor`
    pub fn apply_floor(&mut self, floor: f32) {
        self.energy_threshold = self.energy_threshold.max(floor);
    }
}

/// Timing parameters for one listen call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenSettings {
    /// Maximum wait for speech onset
    pub timeout: Duration,
    /// Maximum utterance length
    pub phrase_time_limit: Duration,
    /// Silence that ends a phrase
    pub pause_threshold: Duration,
    /// Minimum speech for a phrase to count
    pub phrase_threshold: Duration,
    /// Silence kept around the phrase
    pub non_speaking: Duration,
    /// Adapt the threshold while waiting for onset
    pub dynamic_energy: bool,
}

impl From<&ListenerConfig> for ListenSettings {
    fn from(config: &ListenerConfig) -> Self {
        let secs = |value: f64| {
            if value.is_finite() && value > 0.0 {
                Duration::from_secs_f64(value)
            } else {
                Duration::ZERO
            }
        };
        Self {
            timeout: config.timeout(),
            phrase_time_limit: config.phrase_time_limit(),
            pause_threshold: secs(config.pause_threshold_secs),
            phrase_threshold: secs(config.phrase_threshold_secs),
            non_speaking: secs(config.non_speaking_secs),
            dynamic_energy: config.dynamic_energy_threshold,
        }
    }
}

/// Source of spoken audio
///
/// Both operations block the calling thread.
#[cfg_attr(test, mockall::automock)]
pub trait AudioSource {
    /// Samples ambient noise for `duration` and returns the adjusted threshold
    ///
    /// # Errors
    /// Returns error if the device fails or capture is interrupted
    fn calibrate(
        &mut self,
        duration: Duration,
        calibration: &mut Calibration,
    ) -> Result<f32, CaptureError>;

    /// Waits for speech and captures one utterance
    ///
    /// # Errors
    /// Returns [`CaptureError::WaitTimeout`] when no speech starts in time
    fn listen(
        &mut self,
        calibration: &mut Calibration,
        settings: &ListenSettings,
    ) -> Result<AudioSample, CaptureError>;
}
