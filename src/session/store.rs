use super::info::{SessionInfo, SessionStats};
use crate::audio::wav;
use crate::config::{AudioFormatConfig, StorageConfig};
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File layout and naming for sessions: per-session audio directories,
/// transcripts, sidecars, metadata CSVs, and the running session log.
///
/// A transcript's line count is the authoritative sentence-id space:
/// sentence id N corresponds to transcript line N (1-based) and to the
/// audio file name encoding N.
pub struct SessionStore {
    audio_path: PathBuf,
    transcripts_path: PathBuf,
    global_metadata_file: PathBuf,
    session_log_file: PathBuf,
    speaker_id: String,
}

impl SessionStore {
    pub fn new(storage: &StorageConfig, speaker_id: &str) -> Result<Self> {
        fs::create_dir_all(&storage.audio_path).context("Failed to create audio directory")?;
        fs::create_dir_all(&storage.transcripts_path)
            .context("Failed to create transcripts directory")?;

        Ok(Self {
            audio_path: storage.audio_path.clone(),
            transcripts_path: storage.transcripts_path.clone(),
            global_metadata_file: storage.global_metadata_file.clone(),
            session_log_file: storage.session_log_file.clone(),
            speaker_id: speaker_id.to_string(),
        })
    }

    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.audio_path.join(session)
    }

    pub fn transcript_path(&self, session: &str) -> PathBuf {
        self.transcripts_path.join(format!("{}.txt", session))
    }

    pub fn audio_file_name(&self, session: &str, sentence_id: usize) -> String {
        format!("{}_{}_sent{:04}.wav", self.speaker_id, session, sentence_id)
    }

    pub fn audio_file_path(&self, session: &str, sentence_id: usize) -> PathBuf {
        self.session_dir(session)
            .join(self.audio_file_name(session, sentence_id))
    }

    /// Session directories under the audio path, sorted by name.
    pub fn list_sessions(&self) -> Result<Vec<String>> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.audio_path).context("Failed to scan audio directory")? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with("session_") {
                    sessions.push(name.to_string());
                }
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    /// Next unused `session_NN` name (max existing index + 1).
    pub fn next_session_name(&self) -> Result<String> {
        let mut max = 0u32;
        for name in self.list_sessions()? {
            if let Some(n) = name
                .strip_prefix("session_")
                .and_then(|s| s.parse::<u32>().ok())
            {
                max = max.max(n);
            }
        }
        Ok(format!("session_{:02}", max + 1))
    }

    /// Create the session directory and an empty transcript file.
    pub fn create_session(&self, session: &str) -> Result<()> {
        fs::create_dir_all(self.session_dir(session))
            .context("Failed to create session directory")?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.transcript_path(session))
            .context("Failed to create session transcript")?;
        Ok(())
    }

    /// Transcript lines (trimmed). A missing transcript reads as empty.
    pub fn read_transcript(&self, session: &str) -> Result<Vec<String>> {
        let path = self.transcript_path(session);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
        Ok(content.lines().map(|l| l.trim().to_string()).collect())
    }

    /// Rewrite the transcript via temp-then-replace, so a failed write
    /// never leaves a partial transcript behind.
    pub fn write_transcript(&self, session: &str, lines: &[String]) -> Result<()> {
        let path = self.transcript_path(session);
        let mut out = String::new();
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }

        let tmp_path = path.with_extension("txt.tmp");
        fs::write(&tmp_path, &out)
            .with_context(|| format!("Failed to stage transcript: {}", path.display()))?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e)
                .with_context(|| format!("Failed to replace transcript: {}", path.display()));
        }
        Ok(())
    }

    /// Read the `session_info.json` sidecar, if present and parseable.
    pub fn read_info(&self, session: &str) -> Option<SessionInfo> {
        let path = self.session_dir(session).join("session_info.json");
        if !path.exists() {
            return None;
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|data| Ok(serde_json::from_str::<SessionInfo>(&data)?))
        {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Failed to load session_info.json for {}: {}", session, e);
                None
            }
        }
    }

    pub fn write_info(&self, session: &str, sidecar: &SessionInfo) -> Result<()> {
        let path = self.session_dir(session).join("session_info.json");
        let data = serde_json::to_string_pretty(sidecar)?;
        fs::write(&path, data)
            .with_context(|| format!("Failed to write session_info.json: {}", path.display()))
    }

    /// Line count plus total and average audio duration, read from every
    /// WAV file in the session directory.
    pub fn session_stats(&self, session: &str) -> Result<SessionStats> {
        let line_count = self.read_transcript(session)?.len();

        let mut total = 0.0;
        let dir = self.session_dir(session);
        if dir.exists() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().map_or(false, |ext| ext == "wav") {
                    total += wav::duration_seconds(&path)?;
                }
            }
        }

        let average = if line_count > 0 {
            total / line_count as f64
        } else {
            0.0
        };

        Ok(SessionStats {
            line_count,
            total_duration_secs: total,
            average_duration_secs: average,
        })
    }

    /// Regenerate the per-session metadata CSV: one row per transcript
    /// line, duration 0 when the audio file is missing.
    pub fn write_session_metadata(&self, session: &str) -> Result<PathBuf> {
        let meta_path = self
            .session_dir(session)
            .join(format!("{}.metadata.csv", session));

        let mut out = String::from("sentence_id,audio_file,text,duration\n");
        for (i, text) in self.read_transcript(session)?.iter().enumerate() {
            let sentence_id = i + 1;
            let audio_name = self.audio_file_name(session, sentence_id);
            let audio_path = self.session_dir(session).join(&audio_name);
            let duration = if audio_path.exists() {
                wav::duration_seconds(&audio_path)?
            } else {
                0.0
            };
            out.push_str(&format!(
                "{},{},{},{}\n",
                sentence_id, audio_name, text, duration
            ));
        }

        fs::write(&meta_path, out)
            .with_context(|| format!("Failed to write metadata CSV: {}", meta_path.display()))?;
        info!("Session metadata written: {}", meta_path.display());
        Ok(meta_path)
    }

    /// Regenerate the global metadata CSV by concatenating every session's
    /// CSV with the session name prepended to each row.
    pub fn merge_metadata(&self) -> Result<()> {
        let mut out = String::from("session,sentence_id,audio_file,text,duration\n");
        for session in self.list_sessions()? {
            let meta_path = self
                .session_dir(&session)
                .join(format!("{}.metadata.csv", session));
            if !meta_path.exists() {
                continue;
            }
            let content = fs::read_to_string(&meta_path)
                .with_context(|| format!("Failed to read metadata CSV: {}", meta_path.display()))?;
            for row in content.lines().skip(1) {
                out.push_str(&format!("{},{}\n", session, row));
            }
        }

        fs::write(&self.global_metadata_file, out).with_context(|| {
            format!(
                "Failed to write global metadata: {}",
                self.global_metadata_file.display()
            )
        })
    }

    /// Append a human-readable summary block for an ended session.
    pub fn append_session_log(
        &self,
        session: &str,
        sidecar: &SessionInfo,
        stats: &SessionStats,
        format: &AudioFormatConfig,
    ) -> Result<()> {
        let fmt_date = |d: &Option<chrono::DateTime<chrono::Utc>>| {
            d.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default()
        };

        let mut block = String::new();
        block.push_str(&format!("\nSession {}:\n", session));
        block.push_str(&format!("Start Date: {}\n", fmt_date(&sidecar.start_datetime)));
        block.push_str(&format!("End Date: {}\n", fmt_date(&sidecar.end_datetime)));
        block.push_str(&format!(
            "Data Collector: {}\n",
            sidecar.collector.as_deref().unwrap_or("")
        ));
        block.push_str(&format!(
            "Language: {}\n",
            sidecar.language.as_deref().unwrap_or("")
        ));
        block.push_str(&format!(
            "Sensitive Information Flagged: {}\n",
            sidecar.sensitive_flagged.unwrap_or(false)
        ));
        block.push_str(&format!("Number of Audios/Lines: {}\n", stats.line_count));
        block.push_str(&format!(
            "Total Duration (seconds): {:.2}\n",
            stats.total_duration_secs
        ));
        block.push_str(&format!(
            "Average Duration (seconds): {:.2}\n",
            stats.average_duration_secs
        ));
        block.push_str(&format!(
            "Speaker Gender: {}\n",
            sidecar.speaker_gender.as_deref().unwrap_or("")
        ));
        block.push_str(&format!(
            "Speaker Age: {}\n",
            sidecar.speaker_age.as_deref().unwrap_or("")
        ));
        block.push_str(&format!(
            "Speaker Accent: {}\n",
            sidecar.speaker_accent.as_deref().unwrap_or("")
        ));
        block.push_str(&format!(
            "Speaking Style: {}\n",
            sidecar.speaking_style.as_deref().unwrap_or("")
        ));
        block.push_str(&format!(
            "Session Quality: {}\n",
            sidecar.session_quality.unwrap_or(0)
        ));
        block.push_str(&format!("Sample Rate: {}\n", format.sample_rate));
        block.push_str(&format!("Channels: {}\n", format.channels));
        block.push_str(&format!("Bit Depth: {}\n", format.bits_per_sample));

        if let Some(parent) = self.session_log_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.session_log_file)
            .with_context(|| {
                format!(
                    "Failed to open session log: {}",
                    self.session_log_file.display()
                )
            })?;
        log.write_all(block.as_bytes())
            .context("Failed to append session log")?;

        Ok(())
    }
}
