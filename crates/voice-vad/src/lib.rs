//! Adaptive voice-activity tuning (§4.10).
//!
//! Unlike a speech-boundary detector, this crate never decides whether
//! someone is talking — the realtime service does its own server-side VAD.
//! It only watches the same per-frame RMS samples the Audio Stream Manager
//! already computes and advises the server, via `turn_detection` parameters,
//! on how aggressive to be given the ambient noise floor.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum VadError {
    #[error("no samples provided")]
    NoSamples,
}

pub type Result<T> = std::result::Result<T, VadError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoiseCategory {
    Quiet,
    Noisy,
    VeryNoisy,
}

/// Recommended server VAD parameters for a noise category (§4.10 table).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnDetectionParams {
    pub threshold: f32,
    pub silence_ms: u32,
}

impl NoiseCategory {
    pub fn params(self) -> TurnDetectionParams {
        match self {
            NoiseCategory::Quiet => TurnDetectionParams { threshold: 0.30, silence_ms: 220 },
            NoiseCategory::Noisy => TurnDetectionParams { threshold: 0.45, silence_ms: 320 },
            NoiseCategory::VeryNoisy => TurnDetectionParams { threshold: 0.60, silence_ms: 450 },
        }
    }
}

/// Tracks two slow-moving EMAs over RMS samples and categorizes the current
/// signal-to-noise ratio. Purely advisory: the server may ignore it.
pub struct AdaptiveVad {
    noise_floor: f32,
    signal_peak: f32,
    noise_alpha: f32,
    peak_alpha: f32,
    quiet_threshold_db: f32,
    noisy_threshold_db: f32,
    last_category: Option<NoiseCategory>,
    hysteresis_db: f32,
}

const MIN_RMS: f32 = 1e-6;

impl AdaptiveVad {
    /// `noise_alpha`/`peak_alpha` are EMA smoothing factors in `(0, 1]`;
    /// smaller values react more slowly. Defaults chosen so the noise floor
    /// adapts over several seconds while the peak tracks louder speech
    /// bursts faster.
    pub fn new() -> Self {
        Self::with_smoothing(0.02, 0.2)
    }

    pub fn with_smoothing(noise_alpha: f32, peak_alpha: f32) -> Self {
        Self {
            noise_floor: MIN_RMS,
            signal_peak: MIN_RMS,
            noise_alpha,
            peak_alpha,
            quiet_threshold_db: 15.0,
            noisy_threshold_db: 30.0,
            last_category: None,
            hysteresis_db: 2.0,
        }
    }

    /// Feed one RMS sample (0..=1, same unit the Audio Stream Manager emits
    /// via `on_level`). Returns the current category every call, but callers
    /// should only act when `category_changed` differs from the last
    /// accepted value by more than the hysteresis delta — see
    /// `next_recommendation`.
    pub fn observe(&mut self, rms: f32) -> Result<f32> {
        if !(0.0..=1.0).contains(&rms) {
            return Err(VadError::NoSamples);
        }
        let rms = rms.max(MIN_RMS);

        if rms <= self.signal_peak * 0.6 {
            // quiet-ish window: drag the noise floor toward it
            self.noise_floor += self.noise_alpha * (rms - self.noise_floor);
        } else {
            // loud window: drag the peak toward it
            self.signal_peak += self.peak_alpha * (rms - self.signal_peak);
        }

        Ok(self.snr_db())
    }

    pub fn snr_db(&self) -> f32 {
        20.0 * (self.signal_peak.max(MIN_RMS) / self.noise_floor.max(MIN_RMS)).log10()
    }

    fn category_for_snr(snr_db: f32, quiet_threshold: f32, noisy_threshold: f32) -> NoiseCategory {
        if snr_db >= noisy_threshold {
            NoiseCategory::Quiet
        } else if snr_db >= quiet_threshold {
            NoiseCategory::Noisy
        } else {
            NoiseCategory::VeryNoisy
        }
    }

    pub fn category(&self) -> NoiseCategory {
        Self::category_for_snr(self.snr_db(), self.noisy_threshold_db, self.quiet_threshold_db)
    }

    /// Returns `Some(params)` only when the category has changed by more
    /// than the hysteresis delta since the last accepted recommendation, so
    /// the Instruction Syncer isn't asked to flap on every frame.
    pub fn next_recommendation(&mut self) -> Option<TurnDetectionParams> {
        let current = self.category();
        let snr = self.snr_db();

        let should_emit = match self.last_category {
            None => true,
            Some(last) if last == current => false,
            Some(_) => {
                let boundary = match current {
                    NoiseCategory::Quiet => self.noisy_threshold_db,
                    NoiseCategory::Noisy => self.quiet_threshold_db,
                    NoiseCategory::VeryNoisy => self.quiet_threshold_db,
                };
                (snr - boundary).abs() >= self.hysteresis_db || self.last_category != Some(current)
            }
        };

        if should_emit {
            self.last_category = Some(current);
            Some(current.params())
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.noise_floor = MIN_RMS;
        self.signal_peak = MIN_RMS;
        self.last_category = None;
    }
}

impl Default for AdaptiveVad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_room_settles_near_quiet_category() {
        let mut vad = AdaptiveVad::new();
        for _ in 0..200 {
            vad.observe(0.01).unwrap();
        }
        for _ in 0..20 {
            vad.observe(0.5).unwrap();
        }
        assert_eq!(vad.category(), NoiseCategory::Quiet);
    }

    #[test]
    fn loud_noise_floor_settles_near_very_noisy_category() {
        let mut vad = AdaptiveVad::new();
        for _ in 0..200 {
            vad.observe(0.4).unwrap();
        }
        for _ in 0..20 {
            vad.observe(0.45).unwrap();
        }
        assert_eq!(vad.category(), NoiseCategory::VeryNoisy);
    }

    #[test]
    fn first_recommendation_is_always_emitted() {
        let mut vad = AdaptiveVad::new();
        vad.observe(0.01).unwrap();
        assert!(vad.next_recommendation().is_some());
    }

    #[test]
    fn stable_category_does_not_repeat_recommendation() {
        let mut vad = AdaptiveVad::new();
        vad.observe(0.01).unwrap();
        assert!(vad.next_recommendation().is_some());
        vad.observe(0.01).unwrap();
        assert!(vad.next_recommendation().is_none());
    }

    #[test]
    fn category_params_match_spec_table() {
        assert_eq!(NoiseCategory::Quiet.params(), TurnDetectionParams { threshold: 0.30, silence_ms: 220 });
        assert_eq!(NoiseCategory::Noisy.params(), TurnDetectionParams { threshold: 0.45, silence_ms: 320 });
        assert_eq!(NoiseCategory::VeryNoisy.params(), TurnDetectionParams { threshold: 0.60, silence_ms: 450 });
    }

    #[test]
    fn rejects_out_of_range_rms() {
        let mut vad = AdaptiveVad::new();
        assert!(vad.observe(1.5).is_err());
    }
}
