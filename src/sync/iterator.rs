//! Tree walk iterator producing one upload request per regular file.
//!
//! The tree is enumerated once, eagerly, when the iterator is built. Files
//! are only opened when their unit is popped, so the open happens as close
//! to the transfer as possible.

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::error::SyncError;

/// Content type used when the extension does not resolve to one.
pub const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

/// One pending upload: where the file is and which key it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadUnit {
    pub key: String,
    pub source: PathBuf,
}

impl UploadUnit {
    pub fn new(key: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Content type resolved from the key's extension.
    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.key)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string()
    }
}

/// A popped unit with its file open and ready to stream.
#[derive(Debug)]
pub struct UploadRequest {
    pub key: String,
    pub source: PathBuf,
    pub content_type: String,
    pub body: File,
}

/// Object key for `path` under `root`: root-relative components joined
/// with `/`, whatever the platform separator.
///
/// Returns `None` if `path` is not under `root`, is the root itself, or has
/// a component below the root that is not valid UTF-8.
pub fn object_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_str()?);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Queue of pending uploads with a sticky first-error slot.
///
/// States: `Pending(n)` until every unit is popped, then `Drained`. Walk
/// failures and files that fail to open record their error (first one wins)
/// and iteration moves on; check [`SyncIterator::err`] once the uploader is
/// done.
#[derive(Debug)]
pub struct SyncIterator {
    bucket: String,
    pending: VecDeque<UploadUnit>,
    err: Option<SyncError>,
}

impl SyncIterator {
    /// Enumerate every regular file under `root`.
    ///
    /// Directories are skipped, and so are symlinks. Entries that cannot be
    /// read, and files whose name cannot form a key, are left out and
    /// recorded as the sticky error.
    pub fn new(root: &Path, bucket: impl Into<String>) -> Self {
        let mut iter = Self::from_units(bucket, Vec::new());

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("[sync] skipping unreadable entry: {e}");
                    let path = e.path().unwrap_or(root).to_path_buf();
                    iter.record(SyncError::Walk {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match object_key(root, entry.path()) {
                Some(key) => iter
                    .pending
                    .push_back(UploadUnit::new(key, entry.into_path())),
                None => {
                    tracing::warn!("[sync] no object key for {}", entry.path().display());
                    iter.record(SyncError::InvalidKey {
                        path: entry.into_path(),
                    });
                }
            }
        }

        iter
    }

    pub fn from_units(
        bucket: impl Into<String>,
        units: impl IntoIterator<Item = UploadUnit>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            pending: units.into_iter().collect(),
            err: None,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Whether any unit remains.
    pub fn has_next(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Units not yet popped, in upload order.
    pub fn units(&self) -> impl Iterator<Item = &UploadUnit> {
        self.pending.iter()
    }

    /// Pop the next unit and open its file.
    ///
    /// Returns `None` when drained, or when the file could not be opened; in
    /// the latter case the error is recorded unless one already is.
    pub fn upload_unit(&mut self) -> Option<UploadRequest> {
        let unit = self.pending.pop_front()?;
        let opened = File::open(&unit.source);
        self.request(unit, opened)
    }

    /// Next request that could be opened, skipping failed units.
    ///
    /// Same as the [`Iterator`] impl, but the files are opened on the
    /// blocking pool so the caller's runtime thread never waits on disk.
    pub async fn next_request(&mut self) -> Option<UploadRequest> {
        while let Some(unit) = self.pending.pop_front() {
            let opened = match tokio::fs::File::open(&unit.source).await {
                Ok(file) => Ok(file.into_std().await),
                Err(e) => Err(e),
            };
            if let Some(request) = self.request(unit, opened) {
                return Some(request);
            }
        }
        None
    }

    fn request(
        &mut self,
        unit: UploadUnit,
        opened: std::io::Result<File>,
    ) -> Option<UploadRequest> {
        match opened {
            Ok(body) => Some(UploadRequest {
                content_type: unit.content_type(),
                key: unit.key,
                source: unit.source,
                body,
            }),
            Err(source) => {
                tracing::warn!("[sync] cannot open {}: {source}", unit.source.display());
                self.record(SyncError::Open {
                    path: unit.source,
                    source,
                });
                None
            }
        }
    }

    /// Keep `err` unless an earlier error is already recorded.
    fn record(&mut self, err: SyncError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    /// First error recorded while walking or popping units.
    pub fn err(&self) -> Option<&SyncError> {
        self.err.as_ref()
    }

    pub fn take_err(&mut self) -> Option<SyncError> {
        self.err.take()
    }
}

impl Iterator for SyncIterator {
    type Item = UploadRequest;

    /// Next request that could be opened, skipping failed units.
    fn next(&mut self) -> Option<Self::Item> {
        while self.has_next() {
            if let Some(request) = self.upload_unit() {
                return Some(request);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::create_dir_all(root.join("b/empty")).unwrap();
        fs::write(root.join("b/c.png"), [0x89, b'P', b'N', b'G']).unwrap();
        fs::write(root.join("d"), "no extension").unwrap();
        temp_dir
    }

    #[test]
    fn test_object_key() {
        let root = Path::new("/data/root");

        assert_eq!(
            object_key(root, Path::new("/data/root/a.txt")).as_deref(),
            Some("a.txt")
        );
        assert_eq!(
            object_key(root, Path::new("/data/root/b/c.png")).as_deref(),
            Some("b/c.png")
        );
        assert_eq!(object_key(root, root), None);
        assert_eq!(object_key(root, Path::new("/elsewhere/a.txt")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_object_key_rejects_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new("/data/root");
        let first = root.join(OsStr::from_bytes(b"card\xff"));
        let second = root.join("b").join(OsStr::from_bytes(b"card\xfe"));

        assert_eq!(object_key(root, &first), None);
        assert_eq!(object_key(root, &second), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_walk_records_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join(OsStr::from_bytes(b"card\xfe")), "one").unwrap();
        fs::write(root.join(OsStr::from_bytes(b"card\xff")), "two").unwrap();

        let iter = SyncIterator::new(root, "bucket");

        let keys: Vec<&str> = iter.units().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt"]);
        match iter.err() {
            Some(SyncError::InvalidKey { path }) => {
                assert_eq!(path, &root.join(OsStr::from_bytes(b"card\xfe")));
            }
            other => panic!("expected invalid key, got {other:?}"),
        }
    }

    #[test]
    fn test_walk_of_missing_root_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let gone = temp_dir.path().join("gone");

        let iter = SyncIterator::new(&gone, "bucket");

        assert!(!iter.has_next());
        match iter.err() {
            Some(SyncError::Walk { path, .. }) => assert_eq!(path, &gone),
            other => panic!("expected walk error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subtree_is_recorded_and_walk_continues() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = sample_tree();
        let root = temp_dir.path();
        let locked = root.join("b");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits are not enforced for privileged users
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let iter = SyncIterator::new(root, "bucket");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let keys: Vec<&str> = iter.units().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "d"]);
        match iter.err() {
            Some(SyncError::Walk { path, .. }) => assert_eq!(path, &locked),
            other => panic!("expected walk error, got {other:?}"),
        }
    }

    #[test]
    fn test_walk_collects_regular_files_only() {
        let temp_dir = sample_tree();
        let iter = SyncIterator::new(temp_dir.path(), "bucket");

        let keys: Vec<&str> = iter.units().map(|u| u.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "b/c.png", "d"]);
        assert_eq!(iter.remaining(), 3);
        assert_eq!(iter.bucket(), "bucket");
    }

    #[test]
    fn test_content_types() {
        let temp_dir = sample_tree();
        let requests: Vec<UploadRequest> = SyncIterator::new(temp_dir.path(), "bucket").collect();

        let types: Vec<(&str, &str)> = requests
            .iter()
            .map(|r| (r.key.as_str(), r.content_type.as_str()))
            .collect();

        assert_eq!(
            types,
            vec![
                ("a.txt", "text/plain"),
                ("b/c.png", "image/png"),
                ("d", DEFAULT_CONTENT_TYPE),
            ]
        );
        assert_eq!(requests[1].source, temp_dir.path().join("b/c.png"));
    }

    #[test]
    fn test_open_failure_is_sticky_and_iteration_continues() {
        let temp_dir = sample_tree();
        let root = temp_dir.path();
        let mut iter = SyncIterator::new(root, "bucket");

        // Gone between the walk and the open
        fs::remove_file(root.join("a.txt")).unwrap();
        fs::remove_file(root.join("d")).unwrap();

        let keys: Vec<String> = iter.by_ref().map(|r| r.key).collect();
        assert_eq!(keys, vec!["b/c.png"]);
        assert!(!iter.has_next());

        match iter.err() {
            Some(SyncError::Open { path, .. }) => assert_eq!(path, &root.join("a.txt")),
            other => panic!("expected open error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_next_request_skips_unopenable_files() {
        let temp_dir = sample_tree();
        let root = temp_dir.path();
        let mut iter = SyncIterator::new(root, "bucket");
        fs::remove_file(root.join("b/c.png")).unwrap();

        let mut keys = Vec::new();
        while let Some(request) = iter.next_request().await {
            keys.push(request.key);
        }

        assert_eq!(keys, vec!["a.txt", "d"]);
        assert!(!iter.has_next());
        match iter.err() {
            Some(SyncError::Open { path, .. }) => assert_eq!(path, &root.join("b/c.png")),
            other => panic!("expected open error, got {other:?}"),
        }
    }

    #[test]
    fn test_upload_unit_on_drained_iterator() {
        let mut iter = SyncIterator::from_units("bucket", Vec::new());
        assert!(!iter.has_next());
        assert!(iter.upload_unit().is_none());
        assert!(iter.err().is_none());
    }
}
