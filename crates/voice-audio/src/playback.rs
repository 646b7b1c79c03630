use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream};

use crate::device::resolve_output_device;
use crate::{AudioError, Result, FADE_IN_MS};

/// Raised-cosine gain ramp applied to the first `FADE_IN_MS` of playback
/// after a remote stream binds, per §4.3 ("so the first syllable does not
/// thump").
struct FadeRamp {
    frames_played: u64,
    ramp_len: u64,
}

impl FadeRamp {
    fn new(sample_rate: u32) -> Self {
        let ramp_len = (sample_rate as u64 * FADE_IN_MS) / 1000;
        Self { frames_played: 0, ramp_len: ramp_len.max(1) }
    }

    fn next_gain(&mut self) -> f32 {
        let gain = if self.frames_played >= self.ramp_len {
            1.0
        } else {
            let x = self.frames_played as f32 / self.ramp_len as f32;
            0.5 * (1.0 - (std::f32::consts::PI * x).cos())
        };
        self.frames_played += 1;
        gain
    }
}

/// Remote-audio playback sink (§4.3): the WebRTC Manager pushes decoded PCM
/// frames via [`push`]; the output stream drains them at the device's
/// cadence, applying the fade-in ramp and silence when the buffer underruns.
pub struct RemotePlayback {
    stream: Stream,
    buffer: Arc<Mutex<VecDeque<f32>>>,
    fade: Arc<Mutex<FadeRamp>>,
}

impl RemotePlayback {
    pub fn start(device_id: Option<&str>) -> Result<Self> {
        let device = resolve_output_device(device_id)?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::StreamError(format!("failed to get default output config: {e}")))?;

        let channels = config.channels() as usize;
        let sample_rate = config.sample_rate().0;
        let buffer = Arc::new(Mutex::new(VecDeque::<f32>::new()));
        let fade = Arc::new(Mutex::new(FadeRamp::new(sample_rate)));

        let stream = match config.sample_format() {
            SampleFormat::F32 => {
                let buffer = Arc::clone(&buffer);
                let fade = Arc::clone(&fade);
                device.build_output_stream(
                    &config.into(),
                    move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut buf = buffer.lock().unwrap();
                        let mut fade = fade.lock().unwrap();
                        for frame in out.chunks_mut(channels.max(1)) {
                            let sample = buf.pop_front().unwrap_or(0.0);
                            let gain = fade.next_gain();
                            for channel in frame.iter_mut() {
                                *channel = sample * gain;
                            }
                        }
                    },
                    |err| tracing::error!("playback stream error: {}", err),
                    None,
                )?
            }
            format => {
                return Err(AudioError::StreamError(format!("unsupported sample format: {format:?}")));
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("failed to start playback stream: {e}")))?;

        Ok(Self { stream, buffer, fade })
    }

    /// Queue decoded remote-audio frames for playback.
    pub fn push(&self, samples: &[f32]) {
        self.buffer.lock().unwrap().extend(samples.iter().copied());
    }

    /// Cleanup: drop any queued audio and reset the fade so a later
    /// reconnect ramps in again rather than jumping straight to full volume.
    pub fn clear(&self) {
        self.buffer.lock().unwrap().clear();
    }

    pub fn reset_fade(&self, sample_rate: u32) {
        *self.fade.lock().unwrap() = FadeRamp::new(sample_rate);
    }

    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamError(format!("failed to pause playback stream: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_ramp_starts_silent_and_reaches_unity() {
        let mut ramp = FadeRamp::new(48_000);
        assert!(ramp.next_gain() < 0.01);
        for _ in 0..ramp.ramp_len {
            ramp.next_gain();
        }
        assert_eq!(ramp.next_gain(), 1.0);
    }

    #[test]
    fn fade_ramp_is_monotone_increasing() {
        let mut ramp = FadeRamp::new(48_000);
        let mut last = -1.0;
        for _ in 0..20 {
            let gain = ramp.next_gain();
            assert!(gain >= last);
            last = gain;
        }
    }
}
