use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const CACHE_DIR: &str = "chess_archive";

/// On-disk cache of raw archive payloads, one JSON file per
/// (player, year, month). A month's archive is immutable once the month
/// has elapsed, so a cached file is never revalidated; its presence is
/// the whole contract.
#[derive(Debug, Clone)]
pub struct ArchiveCache {
    root: PathBuf,
}

impl ArchiveCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolves the default cache root, preferring XDG and falling back
    /// to `~/.cache` on linux-like systems.
    pub fn default_root() -> Option<PathBuf> {
        if let Ok(base) = std::env::var("XDG_CACHE_HOME")
            && !base.trim().is_empty()
        {
            return Some(PathBuf::from(base).join(CACHE_DIR));
        }
        let home = std::env::var("HOME").ok()?;
        if home.trim().is_empty() {
            return None;
        }
        Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, player: &str, month: &ArchiveMonth) -> PathBuf {
        self.root.join(player).join(format!(
            "{player}_games_{:04}_{:02}.json",
            month.year, month.month
        ))
    }

    /// Returns the cached raw payload for this archive month, or `None`
    /// when no artifact exists or it cannot be read.
    pub fn load(&self, player: &str, month: &ArchiveMonth) -> Option<String> {
        fs::read_to_string(self.artifact_path(player, month)).ok()
    }

    /// Persists the raw payload atomically (write-then-rename), so a
    /// crash mid-write never leaves a truncated artifact behind.
    pub fn save(&self, player: &str, month: &ArchiveMonth, body: &str) -> Result<()> {
        let path = self.artifact_path(player, month);
        let dir = path
            .parent()
            .context("archive cache path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("create cache dir {}", dir.display()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).with_context(|| format!("write cache file {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("swap cache file {}", path.display()))?;
        Ok(())
    }
}

/// Calendar month an archive covers, taken from the trailing `/YYYY/MM`
/// segments of the archive URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveMonth {
    pub year: u16,
    pub month: u8,
}

impl ArchiveMonth {
    pub fn from_archive_url(url: &str) -> Option<Self> {
        let mut parts = url.trim_end_matches('/').rsplit('/');
        let month = parts.next()?.parse::<u8>().ok()?;
        let year = parts.next()?.parse::<u16>().ok()?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some(Self { year, month })
    }
}

#[cfg(test)]
mod tests {
    use super::{ArchiveCache, ArchiveMonth};

    #[test]
    fn month_from_archive_url() {
        let month =
            ArchiveMonth::from_archive_url("https://api.chess.com/pub/player/alice/games/2022/01");
        assert_eq!(month, Some(ArchiveMonth { year: 2022, month: 1 }));
    }

    #[test]
    fn month_from_archive_url_trailing_slash() {
        let month =
            ArchiveMonth::from_archive_url("https://api.chess.com/pub/player/alice/games/2023/11/");
        assert_eq!(month, Some(ArchiveMonth { year: 2023, month: 11 }));
    }

    #[test]
    fn cache_round_trip() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock after epoch")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("chess_archive_test_{nanos}"));
        let cache = ArchiveCache::new(root.clone());
        let month = ArchiveMonth { year: 2022, month: 1 };

        assert!(cache.load("alice", &month).is_none());
        cache
            .save("alice", &month, r#"{"games":[]}"#)
            .expect("save should succeed");
        assert_eq!(
            cache.load("alice", &month).as_deref(),
            Some(r#"{"games":[]}"#)
        );

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn month_rejects_garbage() {
        assert_eq!(ArchiveMonth::from_archive_url("https://example.com/x/y"), None);
        assert_eq!(
            ArchiveMonth::from_archive_url("https://api.chess.com/pub/player/a/games/2022/13"),
            None
        );
    }
}
