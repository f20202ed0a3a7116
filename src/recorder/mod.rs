//! The session/line linking state machine.
//!
//! `Recorder` owns the mutable state bag (session, cursor, staged
//! recording, link/replace flags) and exposes one method per transition.
//! The decisions behind each transition live in `transitions` as pure
//! functions; this module applies their effects: capture start/stop, temp
//! staging, transcript and checkpoint writes.

pub mod transitions;

pub use transitions::{Direction, LinkOutcome, LinkTarget, NavigationPlan};

use crate::audio::{wav, AudioBackend, AudioFile};
use crate::checkpoint::Checkpoint;
use crate::config::{AudioFormatConfig, Config};
use crate::session::{SessionInfo, SessionMetadata, SessionStats, SessionStore};
use crate::source::SourceText;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Precondition violations, reported to the operator without changing any
/// state.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("no source text loaded")]
    NoSourceLoaded,

    #[error("no active session")]
    NoActiveSession,

    #[error("current line has no linked recording to replace")]
    NothingToReplace,

    #[error("session transcript not found for {0}")]
    TranscriptMissing(String),
}

/// The session currently being recorded into.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub name: String,
    pub started_at: Option<DateTime<Utc>>,
}

pub struct Recorder {
    store: SessionStore,
    backend: Box<dyn AudioBackend>,
    format: AudioFormatConfig,
    checkpoint_path: PathBuf,
    temp_audio: PathBuf,

    source: SourceText,
    cursor: usize,
    session: Option<ActiveSession>,

    /// Staged samples for the line being recorded. The drain task appends;
    /// the buffer is only read or flushed after the capture thread has
    /// been joined and the drain task has run dry.
    frames: Arc<Mutex<Vec<i16>>>,
    /// Sample rate the backend actually delivered for the staged buffer
    /// (0 = no frames seen yet). Can differ from the configured rate when
    /// the device cannot capture at it; WAV writes use this rate so the
    /// header never mislabels the audio.
    captured_rate: Arc<AtomicU32>,
    drain_task: Option<JoinHandle<()>>,

    /// Audio resolved for the current line: the staged temp file, or the
    /// linked session file.
    current_audio: Option<PathBuf>,
    /// Sentence id the current line resolved to, when already linked.
    current_sentence_id: Option<usize>,
    replacing: bool,
}

impl Recorder {
    /// Build the recorder, loading (and normalizing) the checkpoint and
    /// re-attaching to the session it names, if any.
    pub fn new(config: &Config, backend: Box<dyn AudioBackend>) -> Result<Self> {
        let store = SessionStore::new(&config.storage, &config.speaker.id)?;
        let checkpoint = Checkpoint::load(&config.storage.checkpoint_file);

        let session = match checkpoint.session {
            Some(name) => {
                let started_at = checkpoint
                    .session_start
                    .or_else(|| store.read_info(&name).and_then(|i| i.start_datetime));
                Some(ActiveSession { name, started_at })
            }
            None => None,
        };

        let recorder = Self {
            store,
            backend,
            format: config.audio.clone(),
            checkpoint_path: config.storage.checkpoint_file.clone(),
            temp_audio: config.storage.temp_audio_file.clone(),
            source: SourceText::default(),
            cursor: checkpoint.line_index,
            session,
            frames: Arc::new(Mutex::new(Vec::new())),
            captured_rate: Arc::new(AtomicU32::new(0)),
            drain_task: None,
            current_audio: None,
            current_sentence_id: None,
            replacing: false,
        };

        recorder.save_checkpoint()?;
        Ok(recorder)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn source(&self) -> &SourceText {
        &self.source
    }

    pub fn current_line(&self) -> Option<&str> {
        self.source.line(self.cursor)
    }

    pub fn session_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.name.as_str())
    }

    pub fn is_recording(&self) -> bool {
        self.drain_task.is_some()
    }

    pub fn is_replacing(&self) -> bool {
        self.replacing
    }

    /// Audio for the current line (staged temp file or linked session
    /// file), for preview by an external player.
    pub fn current_audio(&self) -> Option<&Path> {
        self.current_audio.as_deref()
    }

    pub fn current_sentence_id(&self) -> Option<usize> {
        self.current_sentence_id
    }

    /// Load a source text file. The checkpoint cursor is kept, clamped to
    /// the new line count.
    pub fn load_source(&mut self, path: &Path) -> Result<()> {
        self.source = SourceText::load(path)?;
        if self.cursor >= self.source.len() {
            self.cursor = self.source.len().saturating_sub(1);
        }
        self.replacing = false;
        self.refresh()?;
        Ok(())
    }

    /// Re-resolve the current line against the session transcript: its
    /// sentence id (first exact text match) and, when the corresponding
    /// audio file exists, the linked audio path.
    fn refresh(&mut self) -> Result<()> {
        self.current_sentence_id = None;
        self.current_audio = None;

        let Some(session) = &self.session else {
            return Ok(());
        };
        let Some(text) = self.source.line(self.cursor) else {
            return Ok(());
        };
        if text.is_empty() {
            return Ok(());
        }

        let transcript = self.store.read_transcript(&session.name)?;
        if let Some(sentence_id) = transitions::find_sentence_id(&transcript, text) {
            self.current_sentence_id = Some(sentence_id);
            let audio = self.store.audio_file_path(&session.name, sentence_id);
            if audio.exists() {
                self.current_audio = Some(audio);
            }
        }
        Ok(())
    }

    /// Start capturing into the staged buffer. No-op while already
    /// recording. A staged temp file from a previous pause on the same
    /// line is preloaded so recording appends across pause cycles.
    pub async fn start_recording(&mut self) -> Result<()> {
        if self.drain_task.is_some() {
            return Ok(());
        }

        {
            let mut frames = self.frames.lock().await;
            if self.temp_audio.exists() {
                let staged = AudioFile::open(&self.temp_audio)
                    .context("Failed to preload staged recording")?;
                self.captured_rate
                    .store(staged.sample_rate, Ordering::Relaxed);
                *frames = staged.samples;
            } else {
                self.captured_rate.store(0, Ordering::Relaxed);
                frames.clear();
            }
        }

        let mut frame_rx = self
            .backend
            .start()
            .await
            .context("Failed to start audio capture")?;

        let buffer = Arc::clone(&self.frames);
        let captured_rate = Arc::clone(&self.captured_rate);
        self.drain_task = Some(tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let previous = captured_rate.swap(frame.sample_rate, Ordering::Relaxed);
                if previous != 0 && previous != frame.sample_rate {
                    warn!(
                        "Capture rate changed mid-take: {} -> {}",
                        previous, frame.sample_rate
                    );
                }
                buffer.lock().await.extend_from_slice(&frame.samples);
            }
        }));

        info!("Recording started");
        Ok(())
    }

    /// Stop capturing. With `keep`, a non-empty buffer is flushed to the
    /// temp file and becomes the current audio; without it, nothing is
    /// written. No-op when not recording.
    pub async fn stop_recording(&mut self, keep: bool) -> Result<()> {
        let Some(drain_task) = self.drain_task.take() else {
            return Ok(());
        };

        // Stop order matters: stopping the backend joins the capture
        // thread and closes the frame channel, which lets the drain task
        // run dry before the buffer is touched.
        let stop_result = self.backend.stop().await;
        if let Err(e) = drain_task.await {
            warn!("Frame drain task failed: {}", e);
        }
        stop_result.context("Audio capture failed")?;

        if keep {
            let sample_rate = self.staged_rate();
            let frames = self.frames.lock().await;
            if !frames.is_empty() {
                wav::write_pcm16(
                    &self.temp_audio,
                    &frames,
                    sample_rate,
                    self.format.channels,
                    self.format.bits_per_sample,
                )
                .context("Failed to write staged recording")?;
                self.current_audio = Some(self.temp_audio.clone());
            }
        }

        info!("Recording stopped");
        Ok(())
    }

    /// Sample rate to stamp on the staged buffer: the rate the backend
    /// delivered, falling back to the configured rate when no frames have
    /// been seen.
    fn staged_rate(&self) -> u32 {
        match self.captured_rate.load(Ordering::Relaxed) {
            0 => self.format.sample_rate,
            rate => rate,
        }
    }

    pub async fn pause_recording(&mut self) -> Result<()> {
        self.stop_recording(true).await
    }

    pub async fn resume_recording(&mut self) -> Result<()> {
        self.start_recording().await
    }

    fn delete_temp(&self) -> Result<()> {
        if self.temp_audio.exists() {
            fs::remove_file(&self.temp_audio).context("Failed to remove staged recording")?;
        }
        Ok(())
    }

    pub async fn previous_line(&mut self) -> Result<()> {
        self.navigate(Direction::Previous).await
    }

    pub async fn next_line(&mut self) -> Result<()> {
        self.navigate(Direction::Next).await
    }

    /// Move the cursor. Any in-progress recording is discarded along with
    /// the staged temp file; inside a session, landing on an unlinked line
    /// auto-starts a new recording.
    async fn navigate(&mut self, direction: Direction) -> Result<()> {
        let Some(plan) = transitions::plan_navigation(self.cursor, self.source.len(), direction)
        else {
            return Ok(());
        };

        self.stop_recording(false).await?;
        self.delete_temp()?;
        self.current_audio = None;
        self.cursor = plan.new_index;
        self.replacing = false;
        if plan.save_checkpoint {
            self.save_checkpoint()?;
        }
        self.refresh()?;

        if transitions::should_auto_record(self.session.is_some(), self.current_audio.is_some()) {
            self.start_recording().await?;
        }
        Ok(())
    }

    /// Start a new `session_NN` session and begin recording the current
    /// line. The cursor is not reset; checkpoint resume stays intact.
    pub async fn start_new_session(&mut self) -> Result<String> {
        if self.source.is_empty() {
            bail!(RecorderError::NoSourceLoaded);
        }

        let name = self.store.next_session_name()?;
        self.store.create_session(&name)?;

        let started_at = Utc::now();
        self.store.write_info(
            &name,
            &SessionInfo {
                start_datetime: Some(started_at),
                ..SessionInfo::default()
            },
        )?;

        self.session = Some(ActiveSession {
            name: name.clone(),
            started_at: Some(started_at),
        });
        self.save_checkpoint()?;
        self.refresh()?;
        self.start_recording().await?;

        info!("New session {} started", name);
        Ok(name)
    }

    /// Commit the staged recording to the current line: write the audio
    /// file for the resolved sentence id and rewrite the transcript.
    /// Silently returns when nothing is staged.
    pub async fn link_line(&mut self) -> Result<()> {
        let Some(session) = self.session.clone() else {
            bail!(RecorderError::NoActiveSession);
        };

        self.stop_recording(true).await?;

        let staged = self.temp_audio.exists() || !self.frames.lock().await.is_empty();
        if !staged {
            return Ok(());
        }
        let Some(text) = self.source.line(self.cursor).map(str::to_string) else {
            return Ok(());
        };

        let mut transcript = self.store.read_transcript(&session.name)?;
        let target = transitions::resolve_link_target(self.current_sentence_id, transcript.len());
        transitions::apply_transcript_update(&mut transcript, target.sentence_id, &text);

        let audio_path = self.store.audio_file_path(&session.name, target.sentence_id);
        self.commit_audio(&audio_path)
            .await
            .context("Failed to save audio file")?;
        self.frames.lock().await.clear();

        self.store
            .write_transcript(&session.name, &transcript)
            .context("Failed to write session transcript")?;
        self.current_sentence_id = Some(target.sentence_id);

        let outcome = transitions::plan_link_outcome(self.replacing, self.cursor, self.source.len());
        if outcome.clear_replace {
            self.replacing = false;
        }
        if let Some(index) = outcome.advance_to {
            self.cursor = index;
        }
        if outcome.save_checkpoint {
            self.save_checkpoint()?;
        }
        self.refresh()?;
        if outcome.auto_record {
            self.start_recording().await?;
        }

        info!(
            "Linked sentence {:04} in {}",
            target.sentence_id, session.name
        );
        Ok(())
    }

    /// Move the staged audio into place: rename the temp file in (removing
    /// any existing file for the sentence id first), or synthesize a WAV
    /// from the buffered samples when no temp file exists.
    async fn commit_audio(&mut self, target: &Path) -> Result<()> {
        if self.temp_audio.exists() {
            if target.exists() {
                fs::remove_file(target)?;
            }
            fs::rename(&self.temp_audio, target)?;
        } else {
            let sample_rate = self.staged_rate();
            let frames = self.frames.lock().await;
            wav::write_pcm16(
                target,
                &frames,
                sample_rate,
                self.format.channels,
                self.format.bits_per_sample,
            )?;
        }
        Ok(())
    }

    /// Re-record an already-linked line. The existing audio file is
    /// deleted before capture starts, so two audio files never coexist for
    /// one sentence id; until the next link, the sentence id has no audio
    /// (accepted risk).
    pub async fn replace_recording(&mut self) -> Result<()> {
        let (session_name, sentence_id) = match (&self.session, self.current_sentence_id) {
            (Some(session), Some(sentence_id)) => (session.name.clone(), sentence_id),
            _ => bail!(RecorderError::NothingToReplace),
        };

        self.stop_recording(false).await?;
        self.delete_temp()?;

        let audio = self.store.audio_file_path(&session_name, sentence_id);
        if audio.exists() {
            if let Err(e) = fs::remove_file(&audio) {
                warn!("Failed to remove old audio during replace: {}", e);
            }
        }

        self.current_audio = None;
        self.frames.lock().await.clear();
        self.replacing = true;
        self.start_recording().await
    }

    /// Statistics for the active session, for pre-filling the metadata
    /// form before `end_session`.
    pub fn session_stats(&self) -> Result<SessionStats> {
        let Some(session) = &self.session else {
            bail!(RecorderError::NoActiveSession);
        };
        self.store.session_stats(&session.name)
    }

    /// End the active session: write the extended sidecar, regenerate the
    /// per-session and global metadata CSVs, append the session log, and
    /// clear the active-session state.
    pub async fn end_session(&mut self, metadata: &SessionMetadata) -> Result<SessionStats> {
        let Some(session) = self.session.clone() else {
            bail!(RecorderError::NoActiveSession);
        };

        self.stop_recording(true).await?;

        let end_datetime = Utc::now();
        let start_datetime = session
            .started_at
            .or_else(|| self.store.read_info(&session.name).and_then(|i| i.start_datetime));
        let stats = self.store.session_stats(&session.name)?;

        let sidecar = SessionInfo {
            start_datetime,
            end_datetime: Some(end_datetime),
            collector: Some(metadata.collector.clone()),
            language: Some(metadata.language.clone()),
            sensitive_flagged: Some(metadata.sensitive_flagged),
            speaking_style: Some(metadata.speaking_style.clone()),
            session_quality: Some(metadata.session_quality),
            speaker_gender: Some(metadata.speaker_gender.clone()),
            speaker_age: Some(metadata.speaker_age.clone()),
            speaker_accent: Some(metadata.speaker_accent.clone()),
        };

        self.store.write_info(&session.name, &sidecar)?;
        self.store.write_session_metadata(&session.name)?;
        self.store.merge_metadata()?;
        self.store
            .append_session_log(&session.name, &sidecar, &stats, &self.format)?;

        self.session = None;
        self.save_checkpoint()?;

        info!(
            "Session {} ended: {} lines, {:.2}s total",
            session.name, stats.line_count, stats.total_duration_secs
        );
        Ok(stats)
    }

    /// Open an existing session for review/editing: its transcript becomes
    /// the source line sequence and the session becomes active again.
    pub fn load_existing_session(&mut self, dir: &Path) -> Result<String> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("Invalid session directory")?;

        if !self.store.transcript_path(&name).exists() {
            bail!(RecorderError::TranscriptMissing(name));
        }

        let lines = self.store.read_transcript(&name)?;
        // The transcript is repurposed as the source; it gets no backing
        // source path, so save_edit cannot clobber it.
        self.source = SourceText::from_lines(lines);
        self.cursor = 0;
        self.replacing = false;

        let started_at = self.store.read_info(&name).and_then(|i| i.start_datetime);
        self.session = Some(ActiveSession {
            name: name.clone(),
            started_at,
        });
        self.refresh()?;

        info!("Session {} loaded for review", name);
        Ok(name)
    }

    /// Overwrite the current line with edited text and rewrite the backing
    /// source file (blank positions preserved).
    pub fn save_current_edit(&mut self, text: &str) -> Result<()> {
        if self.source.is_empty() {
            bail!(RecorderError::NoSourceLoaded);
        }
        self.source.set_line(self.cursor, text)?;
        self.source.save_edit()?;
        self.refresh()?;
        Ok(())
    }

    pub fn save_checkpoint(&self) -> Result<()> {
        Checkpoint {
            line_index: self.cursor,
            session: self.session.as_ref().map(|s| s.name.clone()),
            session_start: self.session.as_ref().and_then(|s| s.started_at),
        }
        .save(&self.checkpoint_path)
    }
}
