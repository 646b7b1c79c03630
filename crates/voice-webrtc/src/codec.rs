use audiopus::coder::{Decoder, Encoder};
use audiopus::{Application, Channels, MutSignals, SampleRate};

use voice_domain::{Result, VoiceError};

const MAX_OPUS_FRAME_BYTES: usize = 4000;
const MAX_DECODED_SAMPLES: usize = 5760;

/// Opus encoder/decoder pair for the WebRTC audio track, grounded on the
/// same `audiopus` wrapping idiom as the realtime-transport reference: VoIP
/// application mode, mono, matching the negotiated clock rate.
pub struct OpusCodec {
    encoder: Encoder,
    decoder: Decoder,
}

impl OpusCodec {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let rate = SampleRate::try_from(sample_rate as i32)
            .map_err(|e| VoiceError::Protocol(format!("invalid opus sample rate {sample_rate}: {e}")))?;

        let encoder = Encoder::new(rate, Channels::Mono, Application::Voip)
            .map_err(|e| VoiceError::Protocol(format!("failed to create opus encoder: {e}")))?;
        let decoder = Decoder::new(rate, Channels::Mono)
            .map_err(|e| VoiceError::Protocol(format!("failed to create opus decoder: {e}")))?;

        Ok(Self { encoder, decoder })
    }

    pub fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        let mut output = vec![0u8; MAX_OPUS_FRAME_BYTES];
        let len = self
            .encoder
            .encode(pcm, &mut output)
            .map_err(|e| VoiceError::Protocol(format!("opus encode failed: {e}")))?;
        output.truncate(len);
        Ok(output)
    }

    pub fn decode(&mut self, opus_data: &[u8]) -> Result<Vec<i16>> {
        let mut output = vec![0i16; MAX_DECODED_SAMPLES];
        let packet = audiopus::packet::Packet::try_from(opus_data)
            .map_err(|e| VoiceError::Protocol(format!("invalid opus packet: {e}")))?;
        let buf = MutSignals::try_from(output.as_mut_slice())
            .map_err(|e| VoiceError::Protocol(format!("failed to create decode buffer: {e}")))?;
        let decoded = self
            .decoder
            .decode(Some(packet), buf, false)
            .map_err(|e| VoiceError::Protocol(format!("opus decode failed: {e}")))?;
        output.truncate(decoded);
        Ok(output)
    }
}

/// Converts `f32` samples in `-1.0..=1.0` to PCM16 for Opus encoding.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).collect()
}

/// Converts decoded PCM16 back to `f32` for the Audio Stream Manager's
/// playback sink.
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_roundtrip_preserves_sign() {
        let f32_samples = vec![0.5, -0.5, 0.0, 1.0, -1.0];
        let pcm = f32_to_pcm16(&f32_samples);
        assert!(pcm[0] > 0);
        assert!(pcm[1] < 0);
        assert_eq!(pcm[2], 0);
    }
}
