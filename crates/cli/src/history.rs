//! Input history, persisted as one line per entry.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct History {
    path: PathBuf,
    max_entries: usize,
    entries: Vec<String>,
}

impl History {
    /// Load history from `path`. A missing file is an empty history.
    pub fn load(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e).with_context(|| format!("Failed to read history {:?}", path)),
        };

        let mut history = Self {
            path,
            max_entries,
            entries,
        };
        history.trim();
        Ok(history)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Record a line. Blank lines and repeats of the previous line are skipped.
    pub fn add(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || self.entries.last().map(String::as_str) == Some(line) {
            return;
        }
        // Multi-line entries would split on reload
        self.entries.push(line.replace('\n', " "));
        self.trim();
    }

    /// Write the most recent `max_entries` lines.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut contents = self.entries.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write history {:?}", self.path))
    }

    fn trim(&mut self) {
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let history = History::load(dir.path().join("none"), 10).unwrap();
        assert!(history.entries().is_empty());
    }

    #[test]
    fn test_skips_blank_and_consecutive_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut history = History::load(dir.path().join("h"), 10).unwrap();
        history.add("hello");
        history.add("hello");
        history.add("   ");
        history.add("world");
        history.add("hello");
        assert_eq!(history.entries(), ["hello", "world", "hello"]);
    }

    #[test]
    fn test_keeps_most_recent_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h");
        let mut history = History::load(&path, 3).unwrap();
        for i in 0..5 {
            history.add(&format!("line {}", i));
        }
        history.save().unwrap();

        let reloaded = History::load(&path, 3).unwrap();
        assert_eq!(reloaded.entries(), ["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_load_trims_oversized_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h");
        std::fs::write(&path, "a\nb\n\nc\nd\n").unwrap();
        let history = History::load(&path, 2).unwrap();
        assert_eq!(history.entries(), ["c", "d"]);
    }
}
