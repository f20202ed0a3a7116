use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Ordered sequence of source lines being read against.
///
/// Loaded from a text file with blank lines skipped; indices are 0-based
/// internally and 1-based in display and file naming.
#[derive(Debug, Clone, Default)]
pub struct SourceText {
    path: Option<PathBuf>,
    lines: Vec<String>,
}

impl SourceText {
    /// Load non-blank trimmed lines from a text file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))?;

        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        info!("Source file loaded: {} ({} lines)", path.display(), lines.len());

        Ok(Self {
            path: Some(path.to_path_buf()),
            lines,
        })
    }

    /// Wrap an in-memory line sequence with no backing file (used when a
    /// session transcript is repurposed as the source).
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { path: None, lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_line(&mut self, index: usize, text: &str) -> Result<()> {
        let line = self
            .lines
            .get_mut(index)
            .with_context(|| format!("Line index {} out of range", index))?;
        *line = text.to_string();
        Ok(())
    }

    /// Rewrite the backing file from the in-memory lines.
    ///
    /// Every non-blank original line maps, in order, to successive
    /// in-memory lines; blank lines keep their positions and extra
    /// in-memory lines are appended. Written via temp-then-replace with a
    /// direct-overwrite fallback. With no backing file the edit stays in
    /// memory.
    pub fn save_edit(&self) -> Result<()> {
        let Some(path) = &self.path else {
            info!("No backing source file, edit kept in memory");
            return Ok(());
        };

        let original = fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file: {}", path.display()))?;

        let mut out = String::new();
        let mut src_idx = 0;
        for original_line in original.lines() {
            if original_line.trim().is_empty() {
                out.push_str(original_line);
            } else {
                match self.lines.get(src_idx) {
                    Some(line) => out.push_str(line),
                    None => out.push_str(original_line),
                }
                src_idx += 1;
            }
            out.push('\n');
        }
        while src_idx < self.lines.len() {
            out.push_str(&self.lines[src_idx]);
            out.push('\n');
            src_idx += 1;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let staged = fs::write(&tmp_path, &out).and_then(|_| fs::rename(&tmp_path, path));
        if let Err(e) = staged {
            warn!("Staged source write failed ({}), falling back to direct write", e);
            let _ = fs::remove_file(&tmp_path);
            fs::write(path, &out)
                .with_context(|| format!("Failed to write source file: {}", path.display()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_skips_blank_lines() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("source.txt");
        fs::write(&path, "first line\n\n  second line  \n\n\nthird\n")?;

        let source = SourceText::load(&path)?;
        assert_eq!(source.lines(), &["first line", "second line", "third"]);
        Ok(())
    }

    #[test]
    fn save_edit_preserves_blank_positions() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("source.txt");
        fs::write(&path, "one\n\ntwo\n\nthree\n")?;

        let mut source = SourceText::load(&path)?;
        source.set_line(1, "two edited")?;
        source.save_edit()?;

        let written = fs::read_to_string(&path)?;
        assert_eq!(written, "one\n\ntwo edited\n\nthree\n");
        assert!(!dir.path().join("source.txt.tmp").exists());
        Ok(())
    }

    #[test]
    fn save_edit_appends_extra_lines() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("source.txt");
        fs::write(&path, "only\n")?;

        let mut source = SourceText::load(&path)?;
        source.lines.push("appended".to_string());
        source.save_edit()?;

        let written = fs::read_to_string(&path)?;
        assert_eq!(written, "only\nappended\n");
        Ok(())
    }

    #[test]
    fn from_lines_has_no_backing_file() -> Result<()> {
        let source = SourceText::from_lines(vec!["a".to_string()]);
        assert!(source.path().is_none());
        // No file to write; edit stays in memory without error.
        source.save_edit()?;
        Ok(())
    }

    #[test]
    fn set_line_out_of_range_fails() {
        let mut source = SourceText::from_lines(vec!["a".to_string()]);
        assert!(source.set_line(3, "x").is_err());
    }
}
