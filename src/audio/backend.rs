use anyhow::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate (device output is decimated if higher)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Capacity of the frame channel between the capture thread and the
    /// recorder
    pub channel_capacity: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 44100,
            target_channels: 1,
            channel_capacity: 600,
        }
    }
}

/// Audio capture backend trait
///
/// A backend pushes frames into a bounded channel from a dedicated capture
/// thread. The recorder drains the channel; `stop` joins the thread, which
/// closes the channel, so the buffer is never flushed while a capture read
/// is still running.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. May be
    /// called again after `stop` to begin a new take.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    ///
    /// Joins the capture thread. Surfaces any device error observed while
    /// the stream was running.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create the default microphone backend for this platform.
    pub fn create(config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        use super::microphone::MicrophoneBackend;
        Ok(Box::new(MicrophoneBackend::new(config)))
    }
}
