use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::phrase::{rms_energy, DetectorStep, PhraseDetector};
use super::{AudioSample, AudioSource, Calibration, CaptureError, ListenSettings};
use super::{FRAME_SAMPLES, SAMPLE_RATE};
use crate::shutdown::Shutdown;

/// Ring buffer headroom in seconds of device audio
const RING_BUFFER_SECS: usize = 30;
/// Poll interval while waiting for the callback to deliver samples
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// A running stream that delivers nothing for this long is treated as dead
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Trait for controlling audio stream lifecycle
trait StreamControl {
    /// Resume audio stream (activate microphone)
    fn play(&self) -> Result<()>;
    /// Pause audio stream (deactivate microphone)
    fn pause(&self) -> Result<()>;
}

/// CPAL stream wrapper implementing `StreamControl`
struct CpalStreamControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<()> {
        self.stream.play().context("failed to resume audio stream")
    }

    fn pause(&self) -> Result<()> {
        self.stream.pause().context("failed to pause audio stream")
    }
}

/// Default microphone, read through a lock-free ring buffer
///
/// The CPAL stream is not `Send` on every platform, so the source must be
/// created on the thread that runs the session.
pub struct MicrophoneSource {
    /// Stream controller (kept alive to prevent stream drop)
    stream_control: Option<Box<dyn StreamControl>>,
    /// Ring buffer consumer for reading captured samples
    ring_buffer_consumer: HeapCons<f32>,
    /// Recording state flag, checked by the stream callback
    is_recording: Arc<AtomicBool>,
    /// Set by the stream error callback
    stream_failed: Arc<AtomicBool>,
    /// Device sample rate in Hz
    device_sample_rate: u32,
    /// Number of audio channels
    device_channels: u16,
    /// Converted samples not yet consumed as a frame
    pending: Vec<f32>,
    /// Operator interrupt flag
    shutdown: Shutdown,
}

impl MicrophoneSource {
    /// Opens the default input device (stream starts paused)
    ///
    /// # Errors
    /// Returns error if default audio device is unavailable or stream creation fails
    pub fn new(shutdown: Shutdown) -> Result<Self> {
        info!("initializing audio capture");

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("no input device available")?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        // Use the device default and convert to 16kHz mono on read
        let supported_config = device
            .default_input_config()
            .context("failed to get default input config")?;

        let device_sample_rate = supported_config.sample_rate();
        let device_channels = supported_config.channels();

        info!(
            "device config: {} Hz, {} channels",
            device_sample_rate, device_channels
        );

        let ring_buffer_capacity =
            (device_sample_rate as usize) * (device_channels as usize) * RING_BUFFER_SECS;
        let ring_buffer = HeapRb::<f32>::new(ring_buffer_capacity);
        let (ring_buffer_producer, ring_buffer_consumer) = ring_buffer.split();

        let is_recording = Arc::new(AtomicBool::new(false));
        let stream_failed = Arc::new(AtomicBool::new(false));

        let is_recording_clone = Arc::clone(&is_recording);
        let stream_failed_clone = Arc::clone(&stream_failed);
        let mut producer = ring_buffer_producer;

        let stream_config = supported_config.into();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if is_recording_clone.load(Ordering::Relaxed) {
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                        }
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                    stream_failed_clone.store(true, Ordering::Relaxed);
                },
                None,
            )
            .context("failed to build input stream")?;

        let stream_control = CpalStreamControl { stream };

        // Start and immediately pause: the microphone is only live while listening
        stream_control.play()?;
        stream_control.pause()?;
        info!("audio stream initialized (paused)");

        Ok(Self {
            stream_control: Some(Box::new(stream_control)),
            ring_buffer_consumer,
            is_recording,
            stream_failed,
            device_sample_rate,
            device_channels,
            pending: Vec::new(),
            shutdown,
        })
    }

    fn start_capture(&mut self) -> Result<()> {
        self.ring_buffer_consumer.clear();
        self.pending.clear();

        // Set recording flag BEFORE resuming stream to avoid race condition
        self.is_recording.store(true, Ordering::Relaxed);

        if let Some(stream_control) = &self.stream_control {
            stream_control.play()?;
        }
        debug!("capture started");
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.is_recording.store(false, Ordering::Relaxed);
        if let Some(stream_control) = &self.stream_control {
            if let Err(e) = stream_control.pause() {
                warn!("failed to pause audio stream: {e:#}");
            }
        }
        debug!("capture stopped");
    }

    /// Blocks until one frame of 16kHz mono audio is available
    fn read_frame(&mut self) -> Result<Vec<f32>, CaptureError> {
        let mut last_data = Instant::now();

        while self.pending.len() < FRAME_SAMPLES {
            if self.shutdown.is_requested() {
                return Err(CaptureError::Interrupted);
            }
            if self.stream_failed.load(Ordering::Relaxed) {
                return Err(CaptureError::Device(anyhow!("audio stream reported an error")));
            }

            let channels = usize::from(self.device_channels.max(1));
            let available = self.ring_buffer_consumer.occupied_len();
            let whole_frames = available - available % channels;

            if whole_frames == 0 {
                if last_data.elapsed() > STALL_TIMEOUT {
                    return Err(CaptureError::Device(anyhow!(
                        "no audio received from input device for {STALL_TIMEOUT:?}"
                    )));
                }
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }

            let mut raw = Vec::with_capacity(whole_frames);
            while raw.len() < whole_frames {
                match self.ring_buffer_consumer.try_pop() {
                    Some(sample) => raw.push(sample),
                    None => break,
                }
            }
            last_data = Instant::now();

            let converted = self.convert_to_16khz_mono(&raw);
            self.pending.extend_from_slice(&converted);
        }

        Ok(self.pending.drain(..FRAME_SAMPLES).collect())
    }

    #[allow(clippy::cast_precision_loss)]
    fn frame_secs() -> f64 {
        FRAME_SAMPLES as f64 / SAMPLE_RATE as f64
    }

    fn calibrate_inner(
        &mut self,
        duration: Duration,
        calibration: &mut Calibration,
    ) -> Result<f32, CaptureError> {
        let frame_secs = Self::frame_secs();
        let mut elapsed = 0.0;
        loop {
            elapsed += frame_secs;
            if elapsed > duration.as_secs_f64() {
                break;
            }
            let frame = self.read_frame()?;
            // frame length in seconds fits f32
            #[allow(clippy::cast_possible_truncation)]
            calibration.absorb(rms_energy(&frame), frame_secs as f32);
        }
        Ok(calibration.energy_threshold)
    }

    fn listen_inner(
        &mut self,
        calibration: &mut Calibration,
        settings: &ListenSettings,
    ) -> Result<AudioSample, CaptureError> {
        let mut detector = PhraseDetector::new(settings, Self::frame_secs());
        loop {
            let frame = self.read_frame()?;
            match detector.push(&frame, calibration) {
                DetectorStep::NeedMore => {}
                DetectorStep::TimedOut { waited } => {
                    return Err(CaptureError::WaitTimeout { waited });
                }
                DetectorStep::Complete(samples) => {
                    return Ok(AudioSample::new(samples, SAMPLE_RATE));
                }
            }
        }
    }

    fn convert_to_16khz_mono(&self, samples: &[f32]) -> Vec<f32> {
        let mono_samples = if self.device_channels <= 1 {
            samples.to_vec()
        } else {
            // Average channels (simple downmix)
            let channels_f64 = f64::from(self.device_channels);
            samples
                .chunks(self.device_channels as usize)
                .map(|frame| {
                    let sum_f64: f64 = frame.iter().map(|&s| f64::from(s)).sum();
                    // f64 → f32: audio samples are stored as f32, precision sufficient
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        (sum_f64 / channels_f64) as f32
                    }
                })
                .collect()
        };

        if self.device_sample_rate == SAMPLE_RATE || mono_samples.is_empty() {
            return mono_samples;
        }

        // Linear interpolation resampling
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        {
            let ratio = f64::from(self.device_sample_rate) / f64::from(SAMPLE_RATE);
            let output_len = ((mono_samples.len() as f64) / ratio).ceil() as usize;
            let last = mono_samples.len() - 1;

            (0..output_len)
                .map(|i| {
                    let src = (i as f64) * ratio;
                    let floor = (src.floor() as usize).min(last);
                    let ceil = (floor + 1).min(last);
                    let fract = src - src.floor();
                    let s1 = f64::from(mono_samples[floor]);
                    let s2 = f64::from(mono_samples[ceil]);
                    s1.mul_add(1.0 - fract, s2 * fract) as f32
                })
                .collect()
        }
    }
}

impl AudioSource for MicrophoneSource {
    fn calibrate(
        &mut self,
        duration: Duration,
        calibration: &mut Calibration,
    ) -> Result<f32, CaptureError> {
        let _span = tracing::debug_span!("calibrate").entered();
        self.start_capture()?;
        let result = self.calibrate_inner(duration, calibration);
        self.stop_capture();

        if let Ok(threshold) = &result {
            debug!(energy_threshold = %threshold, "ambient noise sampled");
        }
        result
    }

    fn listen(
        &mut self,
        calibration: &mut Calibration,
        settings: &ListenSettings,
    ) -> Result<AudioSample, CaptureError> {
        let _span = tracing::debug_span!("listen").entered();
        let start = Instant::now();
        self.start_capture()?;
        let result = self.listen_inner(calibration, settings);
        self.stop_capture();

        if let Ok(sample) = &result {
            info!(
                samples = sample.samples().len(),
                listen_ms = start.elapsed().as_millis(),
                "utterance captured"
            );
        }
        result
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop_capture();
        info!("audio capture closed");
    }
}
