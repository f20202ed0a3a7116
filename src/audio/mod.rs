pub mod backend;
pub mod microphone;
pub mod wav;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame};
pub use microphone::{CaptureError, MicrophoneBackend};
pub use wav::AudioFile;
