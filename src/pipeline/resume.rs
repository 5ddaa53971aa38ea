//! Append-only marker file of identifiers whose detail rows are committed.
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Identifiers already pulled, backed by a one-id-per-line file.
#[derive(Debug)]
pub struct ProcessedSet {
    path: Option<PathBuf>,
    ids: HashSet<i64>,
}

impl ProcessedSet {
    /// Load the marker file. A missing file is an empty set.
    ///
    /// Only newline-terminated lines count. A trailing fragment left by a torn
    /// write is cut off the file, so the next append starts on a fresh line.
    /// Other unparsable lines are skipped with a warning.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        if !raw.is_empty() && !raw.ends_with('\n') {
            let keep = raw.rfind('\n').map_or(0, |i| i + 1);
            warn!(
                path = %path.display(),
                fragment = &raw[keep..],
                "dropping unterminated resume marker line"
            );
            truncate_to(&path, keep)?;
            raw.truncate(keep);
        }
        let mut ids = HashSet::new();
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<i64>() {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(_) => warn!(path = %path.display(), line = lineno + 1, value = line, "skipping bad resume marker line"),
            }
        }
        info!(path = %path.display(), already_processed = ids.len(), "loaded resume marker");
        Ok(Self {
            path: Some(path),
            ids,
        })
    }

    /// Set that lives only in memory; nothing survives the process.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            ids: HashSet::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Record `ids` as processed, appending the new ones to the marker file.
    pub fn mark_all(&mut self, ids: &[i64]) -> Result<()> {
        let fresh: Vec<i64> = ids.iter().copied().filter(|id| !self.ids.contains(id)).collect();
        if fresh.is_empty() {
            return Ok(());
        }
        if let Some(path) = &self.path {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let mut buf = String::new();
            for id in &fresh {
                buf.push_str(&id.to_string());
                buf.push('\n');
            }
            file.write_all(buf.as_bytes())
                .and_then(|_| file.sync_data())
                .with_context(|| format!("failed to append to {}", path.display()))?;
        }
        self.ids.extend(fresh);
        Ok(())
    }
}

fn truncate_to(path: &Path, len: usize) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.set_len(len as u64)
        .and_then(|_| file.sync_data())
        .with_context(|| format!("failed to truncate {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_marker() -> PathBuf {
        std::env::temp_dir().join(format!("gamecard-resume-{}.txt", uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_is_empty() {
        let path = temp_marker();
        let set = ProcessedSet::load(&path).unwrap();
        assert!(set.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn marks_survive_reload() {
        let path = temp_marker();
        let mut set = ProcessedSet::load(&path).unwrap();
        set.mark_all(&[620, 400]).unwrap();
        set.mark_all(&[400, 220]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "620\n400\n220\n");

        let reloaded = ProcessedSet::load(&path).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.contains(220));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn garbage_lines_are_skipped() {
        let path = temp_marker();
        fs::write(&path, "10\n\n20\n3x\n").unwrap();
        let set = ProcessedSet::load(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(10) && set.contains(20));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unterminated_last_line_is_cut_off() {
        // "20\n" torn down to "2" by a crash mid-append
        let path = temp_marker();
        fs::write(&path, "10\n2").unwrap();
        let mut set = ProcessedSet::load(&path).unwrap();
        assert!(set.contains(10));
        assert!(!set.contains(2));
        assert_eq!(fs::read_to_string(&path).unwrap(), "10\n");

        set.mark_all(&[30]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "10\n30\n");
        let reloaded = ProcessedSet::load(&path).unwrap();
        assert!(reloaded.contains(30));
        assert!(!reloaded.contains(230));
        assert_eq!(reloaded.len(), 2);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn single_torn_line_empties_the_file() {
        let path = temp_marker();
        fs::write(&path, "62").unwrap();
        let set = ProcessedSet::load(&path).unwrap();
        assert!(set.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn ephemeral_set_writes_nothing() {
        let mut set = ProcessedSet::ephemeral();
        set.mark_all(&[1, 2]).unwrap();
        assert!(set.contains(1));
        assert!(set.path().is_none());
    }
}
