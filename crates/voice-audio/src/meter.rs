/// Windowed RMS level meter (§4.3): accumulates samples until a full window
/// is available, then reports a single `0.0..=1.0` level for it.
#[derive(Default)]
pub struct RmsMeter {
    window: Vec<f32>,
}

impl RmsMeter {
    pub fn new() -> Self {
        Self { window: Vec::with_capacity(crate::LEVEL_WINDOW) }
    }

    /// Feed samples; returns the level of every completed window, in order.
    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut levels = Vec::new();
        for &sample in samples {
            self.window.push(sample);
            if self.window.len() == crate::LEVEL_WINDOW {
                levels.push(Self::rms(&self.window));
                self.window.clear();
            }
        }
        levels
    }

    fn rms(window: &[f32]) -> f32 {
        let sum_sq: f32 = window.iter().map(|s| s * s).sum();
        (sum_sq / window.len() as f32).sqrt().clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reports_zero() {
        let mut meter = RmsMeter::new();
        let levels = meter.push(&vec![0.0; crate::LEVEL_WINDOW]);
        assert_eq!(levels, vec![0.0]);
    }

    #[test]
    fn full_scale_square_wave_reports_near_one() {
        let mut meter = RmsMeter::new();
        let levels = meter.push(&vec![1.0; crate::LEVEL_WINDOW]);
        assert_eq!(levels, vec![1.0]);
    }

    #[test]
    fn partial_window_does_not_emit_until_filled() {
        let mut meter = RmsMeter::new();
        let levels = meter.push(&vec![0.5; crate::LEVEL_WINDOW - 1]);
        assert!(levels.is_empty());
        let levels = meter.push(&[0.5]);
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let mut meter = RmsMeter::new();
        let levels = meter.push(&vec![3.0; crate::LEVEL_WINDOW]);
        assert_eq!(levels, vec![1.0]);
    }
}
