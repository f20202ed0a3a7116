//! Session persistence
//!
//! This module covers everything a session leaves on disk:
//! - `session_NN` directory naming and scanning
//! - transcript files (one sentence per line, line N = sentence id N)
//! - the `session_info.json` sidecar
//! - per-session and global metadata CSVs
//! - the append-only human-readable session log

mod info;
mod store;

pub use info::{SessionInfo, SessionMetadata, SessionStats};
pub use store::SessionStore;
