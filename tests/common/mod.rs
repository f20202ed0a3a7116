#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use corpus_recorder::config::{AudioFormatConfig, Config, SpeakerConfig, StorageConfig};
use corpus_recorder::{AudioBackend, AudioFrame, Recorder};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Deterministic capture backend for tests.
///
/// Each `start` emits a fixed number of frames and then closes the
/// channel, so takes complete without real time passing. The fill value
/// changes per take (100, 200, 300, ...) which makes takes
/// distinguishable in the committed WAV files.
pub struct ScriptedBackend {
    frames_per_take: usize,
    sample_rate: u32,
    starts: usize,
    capturing: bool,
}

/// Samples per emitted frame (10ms at 44.1kHz).
pub const SAMPLES_PER_FRAME: usize = 441;

impl ScriptedBackend {
    /// Four frames per take: 1764 samples, 0.04s at 44.1kHz.
    pub fn new() -> Self {
        Self {
            frames_per_take: 4,
            sample_rate: 44100,
            starts: 0,
            capturing: false,
        }
    }

    /// A backend that captures nothing, for exercising empty-take paths.
    pub fn silent() -> Self {
        Self {
            frames_per_take: 0,
            ..Self::new()
        }
    }

    /// A backend delivering frames at a rate the configuration did not
    /// ask for, as a device without target-rate support would.
    pub fn at_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::new()
        }
    }

    /// Fill value of take number `take` (1-based).
    pub fn take_fill(take: usize) -> i16 {
        (take * 100) as i16
    }
}

#[async_trait]
impl AudioBackend for ScriptedBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        self.starts += 1;
        self.capturing = true;

        let fill = Self::take_fill(self.starts);
        let frames = self.frames_per_take;
        let sample_rate = self.sample_rate;
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for i in 0..frames {
                let frame = AudioFrame {
                    samples: vec![fill; SAMPLES_PER_FRAME],
                    sample_rate,
                    channels: 1,
                    timestamp_ms: (i * 10) as u64,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            // Dropping the sender closes the channel and ends the take.
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Configuration rooted entirely under a test directory.
pub fn test_config(root: &Path) -> Config {
    Config {
        storage: StorageConfig {
            audio_path: root.join("audio"),
            transcripts_path: root.join("transcripts"),
            checkpoint_file: root.join("checkpoint.txt"),
            temp_audio_file: root.join("temp.wav"),
            global_metadata_file: root.join("metadata.csv"),
            session_log_file: root.join("audio").join("README_audio.md"),
        },
        speaker: SpeakerConfig::default(),
        audio: AudioFormatConfig::default(),
    }
}

pub fn new_recorder(config: &Config) -> Result<Recorder> {
    Recorder::new(config, Box::new(ScriptedBackend::new()))
}

pub fn new_silent_recorder(config: &Config) -> Result<Recorder> {
    Recorder::new(config, Box::new(ScriptedBackend::silent()))
}

/// Write a source text file with one sentence per line.
pub fn write_source(root: &Path, lines: &[&str]) -> Result<PathBuf> {
    let path = root.join("source.txt");
    fs::write(&path, lines.join("\n"))?;
    Ok(path)
}
