//! Pure decision functions for the navigate/link/replace state machine.
//!
//! Each function maps the relevant slice of recorder state to a decision
//! value; the `Recorder` engine applies the file and capture effects. This
//! keeps the interplay between navigation, linking, and replace mode
//! testable without a UI or an audio device.

/// Direction of a cursor move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// What a navigation step must do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationPlan {
    pub new_index: usize,
    /// Only `Next` persists the checkpoint, after the move.
    pub save_checkpoint: bool,
}

/// Decide a navigation step. `None` means the cursor is at the boundary
/// and the step is a complete no-op (an active recording keeps running).
pub fn plan_navigation(
    cursor: usize,
    source_len: usize,
    direction: Direction,
) -> Option<NavigationPlan> {
    match direction {
        Direction::Previous if cursor > 0 => Some(NavigationPlan {
            new_index: cursor - 1,
            save_checkpoint: false,
        }),
        Direction::Next if cursor + 1 < source_len => Some(NavigationPlan {
            new_index: cursor + 1,
            save_checkpoint: true,
        }),
        _ => None,
    }
}

/// Whether to auto-start recording after landing on a line: only inside a
/// session, and never over a line that already has linked audio.
pub fn should_auto_record(in_session: bool, line_linked: bool) -> bool {
    in_session && !line_linked
}

/// Target of a link commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTarget {
    pub sentence_id: usize,
    /// True when an existing sentence id is updated in place rather than a
    /// new line appended.
    pub in_place: bool,
}

/// Resolve the sentence id a commit writes to: reuse the id already bound
/// to the current line, or append at transcript length + 1.
pub fn resolve_link_target(current_sentence_id: Option<usize>, transcript_len: usize) -> LinkTarget {
    match current_sentence_id {
        Some(sentence_id) => LinkTarget {
            sentence_id,
            in_place: true,
        },
        None => LinkTarget {
            sentence_id: transcript_len + 1,
            in_place: false,
        },
    }
}

/// What happens after a successful link commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub clear_replace: bool,
    pub advance_to: Option<usize>,
    pub save_checkpoint: bool,
    pub auto_record: bool,
}

/// Decide the post-commit step. Replace mode never advances the cursor or
/// touches the checkpoint; a normal link advances unless already on the
/// last line.
pub fn plan_link_outcome(replacing: bool, cursor: usize, source_len: usize) -> LinkOutcome {
    if replacing {
        LinkOutcome {
            clear_replace: true,
            advance_to: None,
            save_checkpoint: false,
            auto_record: false,
        }
    } else if cursor + 1 < source_len {
        LinkOutcome {
            clear_replace: false,
            advance_to: Some(cursor + 1),
            save_checkpoint: true,
            auto_record: true,
        }
    } else {
        LinkOutcome {
            clear_replace: false,
            advance_to: None,
            save_checkpoint: false,
            auto_record: false,
        }
    }
}

/// Apply the committed text at `sentence_id` to the transcript lines:
/// update in place when the id exists, otherwise pad and append so line N
/// stays sentence id N.
pub fn apply_transcript_update(lines: &mut Vec<String>, sentence_id: usize, text: &str) {
    if sentence_id <= lines.len() {
        lines[sentence_id - 1] = text.to_string();
    } else {
        while lines.len() + 1 < sentence_id {
            lines.push(String::new());
        }
        lines.push(text.to_string());
    }
}

/// Resolve the sentence id for a line by exact text match against the
/// session transcript. First match wins, so duplicate transcript lines
/// resolve to the earliest id.
pub fn find_sentence_id(transcript: &[String], text: &str) -> Option<usize> {
    transcript.iter().position(|line| line == text).map(|i| i + 1)
}
