//! Plugin and fact file synchronization
//!
//! Mirrors a source directory into a destination directory before the facts
//! are gathered, so that newly distributed fact files and extensions are in
//! place for this run. Files are compared by content hash; files that no
//! longer exist in the source are purged. The whole transfer is bounded by a
//! deadline.

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// What a sync changed, relative to the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub copied: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.copied.is_empty() && self.removed.is_empty()
    }
}

/// One source to destination mirror.
#[derive(Debug, Clone)]
pub struct DirectorySync {
    /// Used in log messages ("plugin", "fact").
    pub name: String,
    pub source: PathBuf,
    pub dest: PathBuf,
    pub timeout: Duration,
    ignore: GlobSet,
}

impl DirectorySync {
    /// Build a mirror that skips entries whose file name matches any of the
    /// `ignore` globs.
    pub fn new(
        name: impl Into<String>,
        source: PathBuf,
        dest: PathBuf,
        ignore: &[String],
        timeout: Duration,
    ) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ignore {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::Config(format!("ignore pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }
        let ignore = builder
            .build()
            .map_err(|e| Error::Config(format!("ignore patterns: {e}")))?;
        Ok(Self {
            name: name.into(),
            source,
            dest,
            timeout,
            ignore,
        })
    }

    /// Mirror `source` into `dest`.
    pub fn run(&self) -> Result<SyncReport> {
        log::info!("Retrieving {}s", self.name);
        if !self.source.is_dir() {
            return Err(Error::io(
                &self.source,
                std::io::Error::new(std::io::ErrorKind::NotFound, "source is not a directory"),
            ));
        }
        let deadline = Instant::now() + self.timeout;
        let mut report = SyncReport::default();
        fs::create_dir_all(&self.dest).map_err(|e| Error::io(&self.dest, e))?;

        let walker = WalkDir::new(&self.source)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.ignored(e.path()));
        for entry in walker {
            self.check_deadline(deadline)?;
            let entry = entry.map_err(|e| {
                Error::io(&self.source, std::io::Error::other(e.to_string()))
            })?;
            let Ok(relative) = entry.path().strip_prefix(&self.source) else {
                continue;
            };
            let target = self.dest.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
                continue;
            }
            if same_content(entry.path(), &target) {
                continue;
            }
            fs::copy(entry.path(), &target).map_err(|e| Error::io(&target, e))?;
            log::debug!("Copied {} to {}", entry.path().display(), target.display());
            report.copied.push(target);
        }

        self.purge(deadline, &mut report)?;
        Ok(report)
    }

    /// Remove destination files that are gone from the source.
    fn purge(&self, deadline: Instant, report: &mut SyncReport) -> Result<()> {
        let stale: Vec<PathBuf> = WalkDir::new(&self.dest)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter_map(|e| {
                let relative = e.path().strip_prefix(&self.dest).ok()?;
                (!self.source.join(relative).exists()).then(|| e.path().to_path_buf())
            })
            .collect();
        for path in stale {
            self.check_deadline(deadline)?;
            let removed = if path.is_dir() {
                fs::remove_dir(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| Error::io(&path, e))?;
            log::debug!("Purged {}", path.display());
            report.removed.push(path);
        }
        Ok(())
    }

    fn ignored(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.ignore.is_match(name)
    }

    fn check_deadline(&self, deadline: Instant) -> Result<()> {
        if Instant::now() > deadline {
            return Err(Error::timeout(
                format!("{} retrieval", self.name),
                self.timeout.as_secs(),
            ));
        }
        Ok(())
    }
}

fn same_content(a: &Path, b: &Path) -> bool {
    match (fs::read(a), fs::read(b)) {
        (Ok(left), Ok(right)) => blake3::hash(&left) == blake3::hash(&right),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_ignore(patterns: &[&str]) -> DirectorySync {
        let patterns: Vec<String> = patterns.iter().map(|p| (*p).to_string()).collect();
        DirectorySync::new(
            "plugin",
            PathBuf::from("/src"),
            PathBuf::from("/dst"),
            &patterns,
            Duration::from_secs(30),
        )
        .unwrap()
    }

    fn sync(source: &Path, dest: &Path) -> DirectorySync {
        let ignore = vec![".git".to_string(), "*.swp".to_string()];
        DirectorySync::new(
            "plugin",
            source.to_path_buf(),
            dest.to_path_buf(),
            &ignore,
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn test_mirror_copies_and_purges() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("facter")).unwrap();
        fs::write(src.path().join("facter/role.txt"), "role=web\n").unwrap();
        fs::write(src.path().join("notes.swp"), "junk").unwrap();
        fs::write(dst.path().join("old.txt"), "stale").unwrap();

        let report = sync(src.path(), dst.path()).run().unwrap();
        assert_eq!(report.copied, vec![dst.path().join("facter/role.txt")]);
        assert_eq!(report.removed, vec![dst.path().join("old.txt")]);
        assert!(!dst.path().join("notes.swp").exists());

        // Nothing changes the second time
        let again = sync(src.path(), dst.path()).run().unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_missing_source() {
        let dst = TempDir::new().unwrap();
        let result = sync(&dst.path().join("nope"), dst.path()).run();
        assert!(result.is_err());
    }

    #[test]
    fn test_ignore_globs() {
        let sync = with_ignore(&["*.sw?", "*~*", "[._]*", "tmp*", ".git"]);
        assert!(sync.ignored(Path::new("/src/a.swp")));
        assert!(sync.ignored(Path::new("/src/a.swo")));
        assert!(sync.ignored(Path::new("/src/a~b")));
        assert!(sync.ignored(Path::new("/src/.hidden")));
        assert!(sync.ignored(Path::new("/src/_build")));
        assert!(sync.ignored(Path::new("/src/tmpfile")));
        assert!(sync.ignored(Path::new("/src/nested/.git")));
        assert!(!sync.ignored(Path::new("/src/a.rb")));
        assert!(!sync.ignored(Path::new("/src/swp")));
    }

    #[test]
    fn test_exact_name_does_not_match_prefix() {
        let sync = with_ignore(&["CVS"]);
        assert!(sync.ignored(Path::new("/src/CVS")));
        assert!(!sync.ignored(Path::new("/src/CVSROOT")));
    }

    #[test]
    fn test_glob_ignored_during_mirror() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("keep.rb"), "ok").unwrap();
        fs::write(src.path().join(".hidden"), "no").unwrap();
        fs::write(src.path().join("a~b"), "no").unwrap();
        let patterns = vec!["[._]*".to_string(), "*~*".to_string()];
        let report = DirectorySync::new(
            "plugin",
            src.path().to_path_buf(),
            dst.path().to_path_buf(),
            &patterns,
            Duration::from_secs(30),
        )
        .unwrap()
        .run()
        .unwrap();
        assert_eq!(report.copied, vec![dst.path().join("keep.rb")]);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let patterns = vec!["[unclosed".to_string()];
        let err = DirectorySync::new(
            "plugin",
            PathBuf::from("/src"),
            PathBuf::from("/dst"),
            &patterns,
            Duration::from_secs(30),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
