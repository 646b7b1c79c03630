use rubato::{FftFixedIn, Resampler as RubatoResampler};

/// Buffers variable-size input chunks and resamples mono `f32` audio up to
/// `TARGET_SAMPLE_RATE`, grounded on the teacher's `SincResampler` wrapper
/// around `rubato::FftFixedIn`.
pub struct Resampler {
    inner: FftFixedIn<f32>,
    input_buffer: Vec<f32>,
    chunk_size: usize,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Option<Self> {
        let chunk_size = 256;
        let inner = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, chunk_size, 2, 1).ok()?;
        Some(Self { inner, input_buffer: Vec::with_capacity(chunk_size * 2), chunk_size })
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        self.input_buffer.extend_from_slice(samples);
        let mut output = Vec::new();
        while self.input_buffer.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.input_buffer.drain(..self.chunk_size).collect();
            if let Ok(resampled) = self.inner.process(&[chunk], None) {
                if !resampled.is_empty() {
                    output.extend_from_slice(&resampled[0]);
                }
            }
        }
        output
    }
}

#[inline]
pub fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let mono_len = samples.len() / channels;
    let inv_channels = 1.0 / channels as f32;
    let mut output = Vec::with_capacity(mono_len);
    for chunk in samples.chunks_exact(channels) {
        output.push(chunk.iter().sum::<f32>() * inv_channels);
    }
    output
}
