use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sidecar record stored as `session_info.json` inside a session directory.
///
/// Only `start_datetime` is written when a session begins; the remaining
/// fields are filled in when the session ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    pub start_datetime: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_datetime: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive_flagged: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaking_style: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_quality: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_gender: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_age: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_accent: Option<String>,
}

/// Operator-entered metadata captured when a session ends.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub collector: String,
    pub language: String,
    pub sensitive_flagged: bool,
    pub speaking_style: String,
    /// Overall quality score, 0-5
    pub session_quality: u8,
    pub speaker_gender: String,
    pub speaker_age: String,
    pub speaker_accent: String,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            collector: String::new(),
            language: "English".to_string(),
            sensitive_flagged: false,
            speaking_style: "narrative".to_string(),
            session_quality: 5,
            speaker_gender: "Male".to_string(),
            speaker_age: "18-24".to_string(),
            speaker_accent: String::new(),
        }
    }
}

/// Derived statistics computed when a session ends.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Number of transcript lines (= sentence ids) in the session
    pub line_count: usize,

    /// Summed playable duration of every audio file, in seconds
    pub total_duration_secs: f64,

    /// Average duration per transcript line, in seconds
    pub average_duration_secs: f64,
}
