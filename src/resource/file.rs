//! File resource - files, directories and their permissions
//!
//! Properties, in evaluation order:
//!
//! - `ensure`: `present`, `absent`, `file` or `directory`
//! - `content`: full file content, compared by checksum
//! - `mode`: permission bits, written in octal (`"644"`)
//!
//! On a directory, every read bit in `mode` implies the matching execute bit
//! (`644` becomes `755`). With `links => manage` (the default) the mode of a
//! symlink is never managed.

use anyhow::{Context, Result, bail};
use declarative::{
    Parameters, ParamSpec, PropertyContext, PropertyKind, Provider, ResourceRef, TypeDescriptor,
    Value, ValueFormat,
};
use std::fs;
use std::path::{Path, PathBuf};

pub const TYPE_NAME: &str = "file";

const ENSURE_VALUES: &[&str] = &["present", "absent", "file", "directory"];

/// Build the `file` type descriptor.
pub fn descriptor() -> TypeDescriptor {
    TypeDescriptor::builder(TYPE_NAME)
        .namevar("path")
        .property("ensure", Ensure)
        .property("content", Content)
        .property("mode", Mode)
        .parameter(
            ParamSpec::new("links")
                .values(&["manage", "follow"])
                .default_value(Value::token("manage")),
        )
        .provider("posix", |_| Box::new(FileProvider))
        .autorequire(|resource| {
            resource
                .get("path")
                .and_then(|values| values.first())
                .and_then(Value::as_str)
                .and_then(|path| Path::new(path).parent())
                .filter(|parent| parent.parent().is_some())
                .map(|parent| vec![ResourceRef::new(TYPE_NAME, &parent.to_string_lossy())])
                .unwrap_or_default()
        })
        .build()
}

/// What is on disk at a path, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Missing,
    File,
    Directory,
    Link,
}

impl Kind {
    fn of(path: &Path) -> Self {
        match fs::symlink_metadata(path) {
            Err(_) => Self::Missing,
            Ok(meta) if meta.file_type().is_symlink() => Self::Link,
            Ok(meta) if meta.is_dir() => Self::Directory,
            Ok(_) => Self::File,
        }
    }

    fn token(self) -> Value {
        match self {
            Self::Missing => Value::absent(),
            Self::File => Value::token("file"),
            Self::Directory => Value::token("directory"),
            Self::Link => Value::token("link"),
        }
    }
}

fn target(params: &Parameters) -> Result<PathBuf> {
    params
        .str("path")
        .map(PathBuf::from)
        .context("file resource has no path")
}

fn follows_links(params: &Parameters) -> bool {
    params.str("links") == Some("follow")
}

/// Content checksum as reported by `retrieve`.
pub fn checksum(content: &[u8]) -> String {
    format!("{{blake3}}{}", blake3::hash(content).to_hex())
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug)]
struct Ensure;

impl PropertyKind for Ensure {
    fn munge(&self, raw: Value) -> std::result::Result<Value, String> {
        match raw.as_str() {
            Some(s) if ENSURE_VALUES.contains(&s) => Ok(Value::token(s)),
            _ => Err(format!(
                "{raw} is not one of: {}",
                ENSURE_VALUES.join(", ")
            )),
        }
    }

    fn insync(&self, current: &Value, should: &[Value], _cx: &mut PropertyContext<'_>) -> bool {
        should.iter().any(|s| match s.as_str() {
            Some("present") => !current.is_absent(),
            _ => s == current,
        })
    }

    fn sync(
        &self,
        name: &str,
        should: &Value,
        cx: &mut PropertyContext<'_>,
    ) -> Result<Option<String>> {
        cx.provider.write(name, should, cx.params)?;
        let event = match should.as_str() {
            Some("absent") => "file_removed",
            Some("directory") => "directory_created",
            _ => "file_created",
        };
        Ok(Some(event.to_string()))
    }
}

#[derive(Debug)]
struct Content;

impl PropertyKind for Content {
    fn insync(&self, current: &Value, should: &[Value], _cx: &mut PropertyContext<'_>) -> bool {
        let Some(current) = current.as_str() else {
            return false;
        };
        should
            .iter()
            .filter_map(Value::as_str)
            .any(|s| checksum(s.as_bytes()) == current)
    }

    fn event(&self, _name: &str) -> String {
        "file_changed".to_string()
    }
}

/// Permission bits.
#[derive(Debug)]
pub struct Mode;

impl Mode {
    /// Read an octal mode string (`"644"`, `"0755"`).
    pub fn parse(text: &str) -> std::result::Result<i64, String> {
        let digits = text.trim();
        if digits.is_empty() || digits.len() > 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("{text} is not a valid file mode"));
        }
        i64::from_str_radix(digits, 8).map_err(|_| format!("{text} is not a valid file mode"))
    }

    /// Add the execute bit for every role that can read.
    pub fn directory_mode(mode: i64) -> i64 {
        let mut adjusted = mode;
        for (read, exec) in [(0o400, 0o100), (0o040, 0o010), (0o004, 0o001)] {
            if mode & read != 0 {
                adjusted |= exec;
            }
        }
        adjusted
    }
}

impl PropertyKind for Mode {
    fn munge(&self, raw: Value) -> std::result::Result<Value, String> {
        let mode = match &raw {
            // A bare number in a document is still written in octal
            Value::Integer(n) => Self::parse(&n.to_string())?,
            other => Self::parse(other.as_str().unwrap_or_default())?,
        };
        Ok(Value::Integer(mode))
    }

    fn adjust_should(
        &self,
        should: &[Value],
        cx: &mut PropertyContext<'_>,
    ) -> Result<Option<Vec<Value>>> {
        let path = target(cx.params)?;
        let is_dir = if follows_links(cx.params) {
            path.is_dir()
        } else {
            Kind::of(&path) == Kind::Directory
        };
        if !is_dir {
            return Ok(None);
        }
        Ok(Some(
            should
                .iter()
                .map(|v| match v {
                    Value::Integer(mode) => Value::Integer(Self::directory_mode(*mode)),
                    other => other.clone(),
                })
                .collect(),
        ))
    }

    fn insync(&self, current: &Value, should: &[Value], cx: &mut PropertyContext<'_>) -> bool {
        if !follows_links(cx.params) {
            if let Ok(path) = target(cx.params) {
                if Kind::of(&path) == Kind::Link {
                    log::debug!("{}: not managing symlink mode", cx.resource);
                    return true;
                }
            }
        }
        should.iter().any(|s| s == current)
    }

    fn event(&self, _name: &str) -> String {
        "file_changed".to_string()
    }

    fn format(&self) -> ValueFormat {
        ValueFormat::Octal
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Reads and writes the local filesystem.
#[derive(Debug, Default)]
pub struct FileProvider;

impl FileProvider {
    fn write_ensure(path: &Path, should: &str) -> Result<()> {
        match (should, Kind::of(path)) {
            ("absent", Kind::Missing) => Ok(()),
            ("absent", Kind::Directory) => fs::remove_dir(path)
                .with_context(|| format!("Failed to remove directory: {}", path.display())),
            ("absent", _) => fs::remove_file(path)
                .with_context(|| format!("Failed to remove: {}", path.display())),
            ("directory", Kind::Missing) => fs::create_dir(path)
                .with_context(|| format!("Failed to create directory: {}", path.display())),
            ("directory", Kind::Directory) => Ok(()),
            ("directory", kind) => bail!("Cannot replace {kind:?} at {} with a directory", path.display()),
            (_, Kind::Missing) => fs::write(path, "")
                .with_context(|| format!("Failed to create file: {}", path.display())),
            (_, Kind::Directory) => bail!("Cannot replace directory {} with a file", path.display()),
            (_, Kind::Link) => bail!("Cannot replace symlink {} with a file", path.display()),
            _ => Ok(()),
        }
    }

    fn write_content(path: &Path, content: &str) -> Result<()> {
        if let Ok(old) = fs::read_to_string(path) {
            log_diff(path, &old, content);
        }
        fs::write(path, content).with_context(|| format!("Failed to write: {}", path.display()))
    }

    #[cfg(unix)]
    fn write_mode(path: &Path, mode: i64) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mode = u32::try_from(mode).context("mode out of range")?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set mode {mode:o} on {}", path.display()))
    }

    #[cfg(not(unix))]
    fn write_mode(path: &Path, _mode: i64) -> Result<()> {
        bail!("File modes are not supported on this platform: {}", path.display())
    }

    #[cfg(unix)]
    fn read_mode(path: &Path, follow: bool) -> Value {
        use std::os::unix::fs::PermissionsExt;
        let meta = if follow {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        };
        match meta {
            Ok(meta) => Value::Integer(i64::from(meta.permissions().mode() & 0o7777)),
            Err(_) => Value::absent(),
        }
    }

    #[cfg(not(unix))]
    fn read_mode(_path: &Path, _follow: bool) -> Value {
        Value::absent()
    }
}

impl Provider for FileProvider {
    fn retrieve(&mut self, attribute: &str, params: &Parameters) -> Result<Value> {
        let path = target(params)?;
        match attribute {
            "ensure" => Ok(Kind::of(&path).token()),
            "content" => match Kind::of(&path) {
                Kind::File | Kind::Link if path.is_file() => {
                    let bytes = fs::read(&path)
                        .with_context(|| format!("Failed to read: {}", path.display()))?;
                    Ok(Value::text(checksum(&bytes)))
                }
                _ => Ok(Value::absent()),
            },
            "mode" => Ok(Self::read_mode(&path, follows_links(params))),
            other => bail!("file resources have no attribute {other}"),
        }
    }

    fn write(&mut self, attribute: &str, value: &Value, params: &Parameters) -> Result<()> {
        let path = target(params)?;
        match (attribute, value) {
            ("ensure", value) => Self::write_ensure(&path, value.as_str().unwrap_or_default()),
            ("content", value) => Self::write_content(&path, value.as_str().unwrap_or_default()),
            ("mode", Value::Integer(mode)) => Self::write_mode(&path, *mode),
            (other, value) => bail!("cannot write {value} to {other} of {}", path.display()),
        }
    }
}

/// Log a line diff of a content change.
fn log_diff(path: &Path, old: &str, new: &str) {
    if !log::log_enabled!(log::Level::Info) {
        return;
    }
    let diff = similar::TextDiff::from_lines(old, new);
    let mut lines = Vec::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => lines.push(format!("-{change}")),
            similar::ChangeTag::Insert => lines.push(format!("+{change}")),
            similar::ChangeTag::Equal => {}
        }
    }
    if !lines.is_empty() {
        log::info!("{}:\n{}", path.display(), lines.concat().trim_end());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use declarative::{ApplyOptions, Catalog, CatalogDocument, NoProgress, TypeRegistry};
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register(descriptor()).unwrap();
        registry
    }

    fn catalog(resources: serde_json::Value) -> Catalog {
        let document: CatalogDocument = serde_json::from_value(serde_json::json!({
            "name": "test",
            "resources": resources,
        }))
        .unwrap();
        Catalog::from_document(document, &registry()).unwrap()
    }

    fn apply(resources: &serde_json::Value) -> declarative::TransactionReport {
        catalog(resources.clone())
            .apply(&ApplyOptions::default(), &mut NoProgress)
            .unwrap()
    }

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o7777
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(Mode::parse("644"), Ok(0o644));
        assert_eq!(Mode::parse("0755"), Ok(0o755));
        assert!(Mode::parse("abc").is_err());
        assert!(Mode::parse("999").is_err());
        assert!(Mode::parse("").is_err());
    }

    #[test]
    fn test_directory_mode() {
        assert_eq!(Mode::directory_mode(0o644), 0o755);
        assert_eq!(Mode::directory_mode(0o640), 0o750);
        assert_eq!(Mode::directory_mode(0o600), 0o700);
        assert_eq!(Mode::directory_mode(0o000), 0o000);
    }

    #[test]
    fn test_invalid_mode_is_a_validation_error() {
        let document: CatalogDocument = serde_json::from_value(serde_json::json!({
            "name": "test",
            "resources": [{"type": "file", "title": "/tmp/x", "parameters": {"mode": "rwx"}}],
        }))
        .unwrap();
        let err = Catalog::from_document(document, &registry()).unwrap_err();
        assert_eq!(err.category(), declarative::ErrorCategory::Validation);
    }

    #[test]
    fn test_creates_file_with_content_and_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("motd");
        let resources = serde_json::json!([{
            "type": "file",
            "title": path.to_string_lossy(),
            "parameters": {"ensure": "file", "content": "hello\n", "mode": "640"},
        }]);

        let report = apply(&resources);
        assert_eq!(report.summary.changed, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert_eq!(mode_of(&path), 0o640);
        assert!(report.events.iter().any(
            |e| matches!(e, declarative::Event::Changed { name, .. } if name == "file_created")
        ));
    }

    #[test]
    fn test_mode_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf");
        fs::write(&path, "x").unwrap();
        let resources = serde_json::json!([{
            "type": "file",
            "title": path.to_string_lossy(),
            "parameters": {"mode": "600"},
        }]);

        assert_eq!(apply(&resources).summary.changed, 1);
        let again = apply(&resources);
        assert_eq!(again.summary.changed, 0);
        assert!(again.events.is_empty());
    }

    #[test]
    fn test_directory_mode_read_implies_execute() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        let resources = serde_json::json!([{
            "type": "file",
            "title": path.to_string_lossy(),
            "parameters": {"ensure": "directory", "mode": "644"},
        }]);

        apply(&resources);
        assert!(path.is_dir());
        assert_eq!(mode_of(&path), 0o755);
        assert_eq!(apply(&resources).summary.changed, 0);
    }

    #[test]
    fn test_symlink_mode_always_in_sync() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        fs::write(&real, "x").unwrap();
        fs::set_permissions(&real, fs::Permissions::from_mode(0o600)).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let resources = serde_json::json!([{
            "type": "file",
            "title": link.to_string_lossy(),
            "parameters": {"mode": "644"},
        }]);
        let report = apply(&resources);
        assert_eq!(report.summary.changed, 0);
        assert_eq!(mode_of(&real), 0o600);

        // Following links manages the target instead
        let follow = serde_json::json!([{
            "type": "file",
            "title": link.to_string_lossy(),
            "parameters": {"mode": "644", "links": "follow"},
        }]);
        assert_eq!(apply(&follow).summary.changed, 1);
        assert_eq!(mode_of(&real), 0o644);
    }

    #[test]
    fn test_content_compared_by_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.conf");
        fs::write(&path, "port = 80\n").unwrap();
        let resources = serde_json::json!([{
            "type": "file",
            "title": path.to_string_lossy(),
            "parameters": {"content": "port = 8080\n"},
        }]);

        assert_eq!(apply(&resources).summary.changed, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "port = 8080\n");
        assert_eq!(apply(&resources).summary.changed, 0);
    }

    #[test]
    fn test_parent_directory_autorequired() {
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("etc");
        let child = parent.join("app.conf");
        // Child declared first; the parent must still be created before it
        let resources = serde_json::json!([
            {"type": "file", "title": child.to_string_lossy(), "parameters": {"ensure": "file"}},
            {"type": "file", "title": parent.to_string_lossy(), "parameters": {"ensure": "directory"}},
        ]);

        let report = apply(&resources);
        assert!(report.is_success());
        assert_eq!(
            report.order,
            vec![
                format!("File[{}]", parent.display()),
                format!("File[{}]", child.display()),
            ]
        );
        assert!(child.is_file());
    }

    #[test]
    fn test_ensure_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.log");
        fs::write(&path, "x").unwrap();
        let resources = serde_json::json!([{
            "type": "file",
            "title": path.to_string_lossy(),
            "parameters": {"ensure": "absent"},
        }]);

        apply(&resources);
        assert!(!path.exists());
        assert_eq!(apply(&resources).summary.changed, 0);
    }

    #[test]
    fn test_ensure_file_over_symlink_fails_every_run() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        fs::write(&real, "x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let resources = serde_json::json!([{
            "type": "file",
            "title": link.to_string_lossy(),
            "parameters": {"ensure": "file"},
        }]);

        for _ in 0..2 {
            let report = apply(&resources);
            assert!(!report.is_success());
            assert_eq!(report.summary.failed, 1);
            assert_eq!(report.summary.changed, 0);
        }
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());

        // Any existing entry satisfies ensure => present
        let present = serde_json::json!([{
            "type": "file",
            "title": link.to_string_lossy(),
            "parameters": {"ensure": "present"},
        }]);
        assert_eq!(apply(&present).summary.changed, 0);
    }
}
