use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use crossbeam_channel::{Receiver, Sender};

use crate::device::resolve_input_device;
use crate::meter::RmsMeter;
use crate::resample::{to_mono, Resampler};
use crate::{AudioError, Result, TARGET_SAMPLE_RATE};

/// Live microphone capture (§4.3). Frames arrive resampled to
/// [`TARGET_SAMPLE_RATE`] on `frames()`; the running RMS level is available
/// via `level()` for a poller, or pushed to a callback via
/// [`MicStream::spawn_level_reporter`].
pub struct MicStream {
    stream: Stream,
    frames: Receiver<Vec<f32>>,
    level: Arc<Mutex<f32>>,
}

impl MicStream {
    pub fn start(device_id: Option<&str>) -> Result<Self> {
        let device = resolve_input_device(device_id)?;
        let config = device
            .default_input_config()
            .map_err(|e| AudioError::StreamError(format!("failed to get default input config: {e}")))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let (tx, rx): (Sender<Vec<f32>>, Receiver<Vec<f32>>) = crossbeam_channel::unbounded();
        let level = Arc::new(Mutex::new(0.0f32));
        let meter = Arc::new(Mutex::new(RmsMeter::new()));
        let resampler = if sample_rate != TARGET_SAMPLE_RATE {
            Resampler::new(sample_rate, TARGET_SAMPLE_RATE).map(|r| Arc::new(Mutex::new(r)))
        } else {
            None
        };

        let stream = match config.sample_format() {
            SampleFormat::F32 => {
                let resampler = resampler.clone();
                let meter = Arc::clone(&meter);
                let level = Arc::clone(&level);
                device.build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        Self::handle_frame(data, channels, sample_rate, &resampler, &meter, &level, &tx);
                    },
                    |err| tracing::error!("mic stream error: {}", err),
                    None,
                )?
            }
            SampleFormat::I16 => {
                let resampler = resampler.clone();
                let meter = Arc::clone(&meter);
                let level = Arc::clone(&level);
                device.build_input_stream(
                    &config.into(),
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        let float: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                        Self::handle_frame(&float, channels, sample_rate, &resampler, &meter, &level, &tx);
                    },
                    |err| tracing::error!("mic stream error: {}", err),
                    None,
                )?
            }
            format => {
                return Err(AudioError::StreamError(format!("unsupported sample format: {format:?}")));
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("failed to start mic stream: {e}")))?;

        Ok(Self { stream, frames: rx, level })
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_frame(
        data: &[f32],
        channels: usize,
        sample_rate: u32,
        resampler: &Option<Arc<Mutex<Resampler>>>,
        meter: &Arc<Mutex<RmsMeter>>,
        level: &Arc<Mutex<f32>>,
        tx: &Sender<Vec<f32>>,
    ) {
        let mono = to_mono(data, channels);

        if let Ok(mut meter) = meter.lock() {
            if let Some(&last) = meter.push(&mono).last() {
                if let Ok(mut level) = level.lock() {
                    *level = last;
                }
            }
        }

        let samples = match resampler {
            Some(r) if sample_rate != TARGET_SAMPLE_RATE => {
                r.lock().map(|mut r| r.process(&mono)).unwrap_or(mono)
            }
            _ => mono,
        };
        let _ = tx.send(samples);
    }

    /// Resampled mono frames, ready to hand to the WebRTC Manager's encoder.
    pub fn frames(&self) -> &Receiver<Vec<f32>> {
        &self.frames
    }

    pub fn level(&self) -> f32 {
        *self.level.lock().unwrap()
    }

    pub fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamError(format!("failed to pause mic stream: {e}")))
    }

    pub fn resume(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("failed to resume mic stream: {e}")))
    }

    /// Polls `level()` at a fixed cadence and invokes `on_level`, modeled as
    /// a periodic `tokio::time::interval` per §4.3.
    pub fn spawn_level_reporter(
        level: Arc<Mutex<f32>>,
        period_ms: u64,
        mut on_level: impl FnMut(f32) + Send + 'static,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(period_ms));
            loop {
                ticker.tick().await;
                let current = *level.lock().unwrap();
                on_level(current);
            }
        })
    }

    pub fn level_handle(&self) -> Arc<Mutex<f32>> {
        Arc::clone(&self.level)
    }
}
