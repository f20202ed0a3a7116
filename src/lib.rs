pub mod audio;
pub mod checkpoint;
pub mod config;
pub mod recorder;
pub mod session;
pub mod source;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, CaptureError,
    MicrophoneBackend,
};
pub use checkpoint::Checkpoint;
pub use config::Config;
pub use recorder::{Recorder, RecorderError};
pub use session::{SessionInfo, SessionMetadata, SessionStats, SessionStore};
pub use source::SourceText;
