//! Frame-by-frame phrase detection.
//!
//! The detector is fed fixed-size frames and decides, from their energy
//! relative to the calibrated threshold, when speech starts, when the phrase
//! has ended, and when the onset wait has timed out. It owns no device, so
//! the whole listen protocol can be exercised with synthetic frames.

use std::collections::VecDeque;
use std::time::Duration;

use super::{Calibration, ListenSettings};

/// Result of feeding one frame to the detector
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorStep {
    /// Keep feeding frames
    NeedMore,
    /// Speech did not start before the onset timeout
    TimedOut {
        /// Time spent waiting
        waited: Duration,
    },
    /// A complete phrase, including the leading/trailing non-speaking padding
    Complete(Vec<f32>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    WaitingForOnset,
    Recording {
        phrase_start: f64,
        pause_count: usize,
        phrase_count: usize,
    },
}

/// Energy-threshold phrase detector
#[derive(Debug)]
pub struct PhraseDetector {
    frame_secs: f64,
    timeout: f64,
    phrase_limit: f64,
    pause_frames: usize,
    phrase_frames: usize,
    non_speaking_frames: usize,
    dynamic_energy: bool,
    elapsed: f64,
    phase: Phase,
    frames: VecDeque<Vec<f32>>,
}

impl PhraseDetector {
    /// Creates a detector for frames of `frame_secs` seconds
    ///
    /// A zero timeout or phrase limit disables that bound.
    #[must_use]
    pub fn new(settings: &ListenSettings, frame_secs: f64) -> Self {
        let frame_secs = if frame_secs > 0.0 { frame_secs } else { 1.0 };
        Self {
            frame_secs,
            timeout: settings.timeout.as_secs_f64(),
            phrase_limit: settings.phrase_time_limit.as_secs_f64(),
            pause_frames: frames_for(settings.pause_threshold, frame_secs),
            phrase_frames: frames_for(settings.phrase_threshold, frame_secs),
            non_speaking_frames: frames_for(settings.non_speaking, frame_secs),
            dynamic_energy: settings.dynamic_energy,
            elapsed: 0.0,
            phase: Phase::WaitingForOnset,
            frames: VecDeque::new(),
        }
    }

    /// True once speech onset was detected and the phrase is being recorded
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        matches!(self.phase, Phase::Recording { .. })
    }

    /// Feeds one frame
    #[allow(clippy::cast_possible_truncation)] // frame length in seconds fits f32
    pub fn push(&mut self, frame: &[f32], calibration: &mut Calibration) -> DetectorStep {
        self.elapsed += self.frame_secs;

        match self.phase {
            Phase::WaitingForOnset => {
                if self.timeout > 0.0 && self.elapsed > self.timeout {
                    return DetectorStep::TimedOut {
                        waited: Duration::from_secs_f64(self.elapsed - self.frame_secs),
                    };
                }

                self.frames.push_back(frame.to_vec());
                if self.frames.len() > self.non_speaking_frames {
                    self.frames.pop_front();
                }

                let energy = rms_energy(frame);
                if energy > calibration.energy_threshold {
                    tracing::debug!(
                        energy = %energy,
                        threshold = %calibration.energy_threshold,
                        "speech onset"
                    );
                    self.phase = Phase::Recording {
                        phrase_start: self.elapsed,
                        pause_count: 0,
                        phrase_count: 0,
                    };
                } else if self.dynamic_energy {
                    calibration.absorb(energy, self.frame_secs as f32);
                }
                DetectorStep::NeedMore
            }
            Phase::Recording {
                phrase_start,
                mut pause_count,
                mut phrase_count,
            } => {
                if self.phrase_limit > 0.0 && self.elapsed - phrase_start > self.phrase_limit {
                    tracing::debug!("phrase time limit reached");
                    return self.finish(pause_count, phrase_count);
                }

                self.frames.push_back(frame.to_vec());
                phrase_count += 1;

                if rms_energy(frame) > calibration.energy_threshold {
                    pause_count = 0;
                } else {
                    pause_count += 1;
                }

                if pause_count > self.pause_frames {
                    return self.finish(pause_count, phrase_count);
                }

                self.phase = Phase::Recording {
                    phrase_start,
                    pause_count,
                    phrase_count,
                };
                DetectorStep::NeedMore
            }
        }
    }

    fn finish(&mut self, pause_count: usize, phrase_count: usize) -> DetectorStep {
        let spoken = phrase_count.saturating_sub(pause_count);
        if spoken < self.phrase_frames {
            // too short to be speech; wait for the next onset
            tracing::debug!(frames = spoken, "discarding short phrase");
            self.frames.clear();
            self.phase = Phase::WaitingForOnset;
            return DetectorStep::NeedMore;
        }

        let trailing = pause_count.saturating_sub(self.non_speaking_frames);
        for _ in 0..trailing {
            self.frames.pop_back();
        }

        let samples: Vec<f32> = self.frames.drain(..).flatten().collect();
        self.phase = Phase::WaitingForOnset;
        DetectorStep::Complete(samples)
    }
}

fn frames_for(duration: Duration, frame_secs: f64) -> usize {
    let count = (duration.as_secs_f64() / frame_secs).ceil();
    // non-negative and small
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        count.max(0.0) as usize
    }
}

/// RMS energy of a frame on the 16-bit sample scale
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn rms_energy(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame
        .iter()
        .map(|&s| {
            let scaled = f64::from(s) * 32767.0;
            scaled * scaled
        })
        .sum();
    (sum / frame.len() as f64).sqrt() as f32
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    const FRAME: usize = 1024;
    const FRAME_SECS: f64 = 0.064;

    fn settings() -> ListenSettings {
        ListenSettings {
            timeout: Duration::from_secs(1),
            phrase_time_limit: Duration::from_secs(2),
            pause_threshold: Duration::from_millis(800),
            phrase_threshold: Duration::from_millis(300),
            non_speaking: Duration::from_millis(500),
            dynamic_energy: false,
        }
    }

    fn calibration() -> Calibration {
        Calibration {
            energy_threshold: 300.0,
            dynamic_ratio: 1.5,
            damping: 0.15,
        }
    }

    fn silence() -> Vec<f32> {
        vec![0.0; FRAME]
    }

    fn speech() -> Vec<f32> {
        vec![0.5; FRAME]
    }

    #[test]
    fn test_rms_energy() {
        assert_eq!(rms_energy(&[]), 0.0);
        assert_eq!(rms_energy(&silence()), 0.0);
        let energy = rms_energy(&[0.5, -0.5]);
        assert!((energy - 16383.5).abs() < 0.01);
    }

    #[test]
    fn test_frame_counts() {
        let detector = PhraseDetector::new(&settings(), FRAME_SECS);
        assert_eq!(detector.pause_frames, 13);
        assert_eq!(detector.phrase_frames, 5);
        assert_eq!(detector.non_speaking_frames, 8);
    }

    #[test]
    fn test_silence_times_out() {
        let mut detector = PhraseDetector::new(&settings(), FRAME_SECS);
        let mut cal = calibration();

        let mut pushes = 0;
        loop {
            pushes += 1;
            match detector.push(&silence(), &mut cal) {
                DetectorStep::NeedMore => {}
                DetectorStep::TimedOut { waited } => {
                    assert!(waited <= Duration::from_secs(1));
                    break;
                }
                DetectorStep::Complete(_) => panic!("silence must not complete a phrase"),
            }
            assert!(pushes < 100);
        }
        assert_eq!(pushes, 16);
    }

    #[test]
    fn test_phrase_completes_after_pause() {
        let mut detector = PhraseDetector::new(&settings(), FRAME_SECS);
        let mut cal = calibration();

        for _ in 0..3 {
            assert_eq!(detector.push(&silence(), &mut cal), DetectorStep::NeedMore);
        }
        for _ in 0..10 {
            assert_eq!(detector.push(&speech(), &mut cal), DetectorStep::NeedMore);
        }
        assert!(detector.is_recording());

        for _ in 0..13 {
            assert_eq!(detector.push(&silence(), &mut cal), DetectorStep::NeedMore);
        }
        match detector.push(&silence(), &mut cal) {
            DetectorStep::Complete(samples) => {
                // 3 leading + 10 speech + 8 trailing padding frames
                assert_eq!(samples.len(), 21 * FRAME);
            }
            other => panic!("expected complete phrase, got {other:?}"),
        }
        assert!(!detector.is_recording());
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut detector = PhraseDetector::new(&settings(), FRAME_SECS);
        let mut cal = calibration();

        detector.push(&speech(), &mut cal);
        detector.push(&speech(), &mut cal);
        let mut result = DetectorStep::NeedMore;
        for _ in 0..30 {
            result = detector.push(&silence(), &mut cal);
            if result != DetectorStep::NeedMore {
                break;
            }
        }
        assert!(matches!(result, DetectorStep::TimedOut { .. }));
    }

    #[test]
    fn test_phrase_time_limit_cuts_recording() {
        let mut detector = PhraseDetector::new(&settings(), FRAME_SECS);
        let mut cal = calibration();

        let mut pushes = 0;
        let samples = loop {
            pushes += 1;
            if let DetectorStep::Complete(samples) = detector.push(&speech(), &mut cal) {
                break samples;
            }
            assert!(pushes < 100);
        };
        assert_eq!(pushes, 33);
        assert_eq!(samples.len(), 32 * FRAME);
    }

    #[test]
    fn test_dynamic_adjustment_raises_threshold_while_waiting() {
        let noise = vec![350.0 / 32767.0; FRAME];

        let mut dynamic = ListenSettings {
            dynamic_energy: true,
            ..settings()
        };
        let mut detector = PhraseDetector::new(&dynamic, FRAME_SECS);
        let mut cal = Calibration {
            energy_threshold: 400.0,
            ..calibration()
        };
        for _ in 0..5 {
            detector.push(&noise, &mut cal);
        }
        assert!(cal.energy_threshold > 400.0);

        dynamic.dynamic_energy = false;
        let mut detector = PhraseDetector::new(&dynamic, FRAME_SECS);
        let mut fixed = Calibration {
            energy_threshold: 400.0,
            ..calibration()
        };
        for _ in 0..5 {
            detector.push(&noise, &mut fixed);
        }
        assert_eq!(fixed.energy_threshold, 400.0);
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let unbounded = ListenSettings {
            timeout: Duration::ZERO,
            ..settings()
        };
        let mut detector = PhraseDetector::new(&unbounded, FRAME_SECS);
        let mut cal = calibration();
        for _ in 0..500 {
            assert_eq!(detector.push(&silence(), &mut cal), DetectorStep::NeedMore);
        }
    }
}
