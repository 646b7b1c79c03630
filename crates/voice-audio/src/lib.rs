//! Local audio I/O for the realtime voice conversation core (§4.3).
//!
//! Capture, level metering, and remote-audio playback, all built on `cpal`
//! the way the teacher's dictation pipeline drives its input devices — minus
//! the AGC and system-audio-loopback paths that pipeline needed and this one
//! doesn't.

mod device;
mod meter;
mod mic;
mod playback;
mod resample;

pub use device::{find_device_by_id, get_default_device, list_devices, AudioDevice};
pub use meter::RmsMeter;
pub use mic::MicStream;
pub use playback::RemotePlayback;

/// Sample rate the realtime service's Opus payload is negotiated at; mic
/// capture is resampled up to this and playback is assumed to arrive at it.
pub const TARGET_SAMPLE_RATE: u32 = 48000;

/// RMS meter window, in samples, per §4.3.
pub const LEVEL_WINDOW: usize = 256;

/// Fade-in ramp duration for the first remote-audio playback, per §4.3.
pub const FADE_IN_MS: u64 = 240;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("stream error: {0}")]
    StreamError(String),
    #[error("device error: {0}")]
    DeviceError(#[from] cpal::DevicesError),
    #[error("build stream error: {0}")]
    BuildStreamError(#[from] cpal::BuildStreamError),
    #[error("play stream error: {0}")]
    PlayStreamError(#[from] cpal::PlayStreamError),
}

pub type Result<T> = std::result::Result<T, AudioError>;
