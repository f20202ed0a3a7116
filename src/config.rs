use crate::audio::AudioBackendConfig;
use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub speaker: SpeakerConfig,
    pub audio: AudioFormatConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per session
    pub audio_path: PathBuf,
    /// Directory holding one transcript file per session
    pub transcripts_path: PathBuf,
    /// Resume checkpoint, rewritten on most state transitions
    pub checkpoint_file: PathBuf,
    /// Staging file for the recording in progress
    pub temp_audio_file: PathBuf,
    /// Merged metadata CSV across all sessions
    pub global_metadata_file: PathBuf,
    /// Append-only human-readable session log
    pub session_log_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Speaker identifier used in audio file names (e.g., "spk01")
    pub id: String,
}

/// Audio format for captured and exported WAV files.
///
/// Kept in configuration rather than hard-coded so a deployment can pick
/// its own recording format.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioFormatConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Config {
    /// Load configuration from a file. A missing file, or missing
    /// sections, fall back to the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Capture backend configuration derived from the audio format.
    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: self.audio.channels,
            ..AudioBackendConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            speaker: SpeakerConfig::default(),
            audio: AudioFormatConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            audio_path: PathBuf::from("audio"),
            transcripts_path: PathBuf::from("transcripts"),
            checkpoint_file: PathBuf::from("checkpoint.txt"),
            temp_audio_file: PathBuf::from("temp.wav"),
            global_metadata_file: PathBuf::from("metadata.csv"),
            session_log_file: PathBuf::from("audio/README_audio.md"),
        }
    }
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            id: "spk01".to_string(),
        }
    }
}

impl Default for AudioFormatConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}
