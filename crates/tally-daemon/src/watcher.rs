//! Debounced inbox watcher for receipt arrivals.
//!
//! Raw notify events are drained into a pending map and only released after
//! the settle delay has elapsed with no further writes, so a file is never
//! read mid-write and a create+modify burst for one arrival collapses into a
//! single release. A short-lived (path, mtime) seen-set then makes dispatch
//! idempotent per physical write.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime};
use tally_core::ExtractionRequest;

/// Minimum settle delay before a just-arrived file is released.
pub const MIN_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Receipt image extensions accepted by default (lowercase).
pub const RECEIPT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// How long a dispatched (path, mtime) pair is remembered.
const SEEN_TTL: Duration = Duration::from_secs(30);

/// A raw arrival waiting out the settle delay.
struct PendingArrival {
    last_seen: Instant,
}

/// Watches one inbox directory (non-recursive) and yields at most one
/// [`ExtractionRequest`] per qualifying physical file write.
pub struct ReceiptWatcher {
    watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Result<Event, notify::Error>>,
    watched_dir: Option<PathBuf>,
    pending: HashMap<PathBuf, PendingArrival>,
    settle: Duration,
    extensions: Vec<String>,
    seen: SeenSet,
}

impl ReceiptWatcher {
    /// Create a watcher. `settle` is floored at [`MIN_SETTLE_DELAY`];
    /// `extensions` defaults to [`RECEIPT_EXTENSIONS`] when empty.
    pub fn new(settle: Duration, extensions: &[String]) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let watcher =
            notify::recommended_watcher(tx).context("Failed to create filesystem watcher")?;

        let extensions = if extensions.is_empty() {
            RECEIPT_EXTENSIONS.iter().map(|ext| (*ext).to_string()).collect()
        } else {
            extensions.iter().map(|ext| ext.to_ascii_lowercase()).collect()
        };

        Ok(Self {
            watcher,
            rx,
            watched_dir: None,
            pending: HashMap::new(),
            settle: settle.max(MIN_SETTLE_DELAY),
            extensions,
            seen: SeenSet::new(SEEN_TTL),
        })
    }

    /// Start watching the inbox directory (non-recursive).
    pub fn watch(&mut self, dir: &Path) -> Result<()> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        self.watched_dir = Some(dir.to_path_buf());
        Ok(())
    }

    #[must_use]
    pub fn watched_dir(&self) -> Option<&Path> {
        self.watched_dir.as_deref()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Poll for settled arrivals that pass the receipt filter and the
    /// duplicate suppression.
    pub fn poll_arrivals(&mut self) -> Vec<ExtractionRequest> {
        self.poll_at(Instant::now())
    }

    fn poll_at(&mut self, now: Instant) -> Vec<ExtractionRequest> {
        while let Ok(result) = self.rx.try_recv() {
            match result {
                Ok(event) => self.observe(event, now),
                Err(err) => tracing::warn!("Watcher error: {}", err),
            }
        }

        let mut ready = Vec::new();
        let mut still_pending = HashMap::new();
        for (path, pending) in self.pending.drain() {
            if now.duration_since(pending.last_seen) >= self.settle {
                ready.push(path);
            } else {
                still_pending.insert(path, pending);
            }
        }
        self.pending = still_pending;

        self.seen.prune(now);
        let mut requests = Vec::new();
        for path in ready {
            if !self.accepts(&path) {
                continue;
            }
            match file_mtime(&path) {
                Some(mtime) => {
                    if self.seen.insert(path.clone(), mtime, now) {
                        requests.push(ExtractionRequest::new(path));
                    } else {
                        tracing::debug!("Suppressing duplicate trigger for {:?}", path);
                    }
                }
                None => tracing::info!("Skipping {:?}: could not stat", path),
            }
        }
        requests
    }

    /// Fold one raw notify event into the pending map.
    fn observe(&mut self, event: Event, now: Instant) {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                for path in event.paths {
                    self.pending.insert(path, PendingArrival { last_seen: now });
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    self.pending.remove(&path);
                }
            }
            _ => {}
        }
    }

    /// Receipt filter: regular file, no transient marker, accepted extension.
    /// Every rejection leaves a log line.
    fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            tracing::info!("Skipping {:?}: unreadable file name", path);
            return false;
        };
        if name.starts_with(tally_core::TRANSIENT_PREFIX) {
            tracing::info!("Skipping {}: transient file marker", name);
            return false;
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let accepted = extension
            .as_deref()
            .is_some_and(|ext| self.extensions.iter().any(|accepted| accepted == ext));
        if !accepted {
            tracing::debug!("Skipping {}: not an accepted receipt extension", name);
            return false;
        }

        // Directories and entries deleted during the settle window fail here.
        if !path.is_file() {
            tracing::info!("Skipping {}: not a regular file", name);
            return false;
        }
        true
    }
}

/// Short-lived memory of dispatched (path, mtime) pairs.
struct SeenSet {
    entries: HashMap<PathBuf, (SystemTime, Instant)>,
    ttl: Duration,
}

impl SeenSet {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Record the pair; returns true when it was not already present with the
    /// same mtime (dispatch allowed).
    fn insert(&mut self, path: PathBuf, mtime: SystemTime, now: Instant) -> bool {
        let fresh = !matches!(
            self.entries.get(&path),
            Some((seen_mtime, _)) if *seen_mtime == mtime
        );
        self.entries.insert(path, (mtime, now));
        fresh
    }

    fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, inserted)| now.duration_since(*inserted) < ttl);
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::fs;
    use std::time::UNIX_EPOCH;

    fn new_watcher() -> ReceiptWatcher {
        ReceiptWatcher::new(Duration::ZERO, &[]).unwrap()
    }

    fn create_event(path: &Path) -> Event {
        let mut event = Event::new(EventKind::Create(CreateKind::File));
        event.paths.push(path.to_path_buf());
        event
    }

    fn modify_event(path: &Path) -> Event {
        let mut event = Event::new(EventKind::Modify(ModifyKind::Any));
        event.paths.push(path.to_path_buf());
        event
    }

    fn remove_event(path: &Path) -> Event {
        let mut event = Event::new(EventKind::Remove(RemoveKind::File));
        event.paths.push(path.to_path_buf());
        event
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"jpegdata").unwrap();
        path
    }

    #[test]
    fn test_settle_delay_is_floored() {
        let watcher = ReceiptWatcher::new(Duration::from_millis(100), &[]).unwrap();
        assert_eq!(watcher.settle, MIN_SETTLE_DELAY);

        let watcher = ReceiptWatcher::new(Duration::from_secs(2), &[]).unwrap();
        assert_eq!(watcher.settle, Duration::from_secs(2));
    }

    #[test]
    fn test_default_extensions() {
        let watcher = new_watcher();
        assert_eq!(watcher.extensions, vec!["jpg", "jpeg", "png"]);

        let custom = ReceiptWatcher::new(Duration::ZERO, &["TIFF".to_string()]).unwrap();
        assert_eq!(custom.extensions, vec!["tiff"]);
    }

    #[test]
    fn test_accepts_filters() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = new_watcher();

        let good = touch(dir.path(), "r1.jpg");
        let upper = touch(dir.path(), "r2.JPG");
        let transient = touch(dir.path(), "~r3.jpg");
        let wrong_ext = touch(dir.path(), "notes.txt");

        assert!(watcher.accepts(&good));
        assert!(watcher.accepts(&upper));
        assert!(!watcher.accepts(&transient));
        assert!(!watcher.accepts(&wrong_ext));
        // Directories are rejected even with a matching suffix
        let subdir = dir.path().join("album.jpg");
        fs::create_dir(&subdir).unwrap();
        assert!(!watcher.accepts(&subdir));
        // Deleted during the settle window
        assert!(!watcher.accepts(&dir.path().join("gone.jpg")));
    }

    #[test]
    fn test_arrival_waits_out_the_settle_delay() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = touch(dir.path(), "r1.jpg");
        let mut watcher = new_watcher();

        let now = Instant::now();
        watcher.observe(create_event(&receipt), now);

        assert!(watcher.poll_at(now).is_empty());
        assert!(watcher.has_pending());

        let settled = now + MIN_SETTLE_DELAY;
        let requests = watcher.poll_at(settled);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, receipt);
        assert!(!watcher.has_pending());
    }

    #[test]
    fn test_create_modify_burst_releases_once() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = touch(dir.path(), "r1.jpg");
        let mut watcher = new_watcher();

        let now = Instant::now();
        watcher.observe(create_event(&receipt), now);
        watcher.observe(modify_event(&receipt), now + Duration::from_millis(50));

        // Still writing at the original settle deadline
        assert!(watcher.poll_at(now + MIN_SETTLE_DELAY).is_empty());

        let settled = now + Duration::from_millis(50) + MIN_SETTLE_DELAY;
        assert_eq!(watcher.poll_at(settled).len(), 1);
    }

    #[test]
    fn test_duplicate_fire_after_settle_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = touch(dir.path(), "r1.jpg");
        let mut watcher = new_watcher();

        let now = Instant::now();
        watcher.observe(create_event(&receipt), now);
        assert_eq!(watcher.poll_at(now + MIN_SETTLE_DELAY).len(), 1);

        // The platform fires modify for the same physical write after the
        // first release; mtime is unchanged, so nothing is dispatched.
        let later = now + MIN_SETTLE_DELAY + Duration::from_millis(10);
        watcher.observe(modify_event(&receipt), later);
        assert!(watcher.poll_at(later + MIN_SETTLE_DELAY).is_empty());
    }

    #[test]
    fn test_changed_content_dispatches_again() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = touch(dir.path(), "r1.jpg");
        let mut watcher = new_watcher();

        let now = Instant::now();
        watcher.observe(create_event(&receipt), now);
        assert_eq!(watcher.poll_at(now + MIN_SETTLE_DELAY).len(), 1);

        // A genuinely new write gets a new mtime.
        let file = fs::OpenOptions::new().write(true).open(&receipt).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();

        let later = now + MIN_SETTLE_DELAY + Duration::from_millis(10);
        watcher.observe(modify_event(&receipt), later);
        assert_eq!(watcher.poll_at(later + MIN_SETTLE_DELAY).len(), 1);
    }

    #[test]
    fn test_removed_arrival_is_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let receipt = touch(dir.path(), "r1.jpg");
        let mut watcher = new_watcher();

        let now = Instant::now();
        watcher.observe(create_event(&receipt), now);
        watcher.observe(remove_event(&receipt), now + Duration::from_millis(10));

        assert!(watcher.poll_at(now + MIN_SETTLE_DELAY * 2).is_empty());
        assert!(!watcher.has_pending());
    }

    #[test]
    fn test_transient_file_never_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let transient = touch(dir.path(), "~tmpfile.jpg");
        let mut watcher = new_watcher();

        let now = Instant::now();
        watcher.observe(create_event(&transient), now);
        assert!(watcher.poll_at(now + MIN_SETTLE_DELAY).is_empty());
    }

    #[test]
    fn test_seen_set_expires() {
        let mut seen = SeenSet::new(Duration::from_secs(30));
        let path = PathBuf::from("/inbox/r1.jpg");
        let mtime = UNIX_EPOCH + Duration::from_secs(1_000);

        let now = Instant::now();
        assert!(seen.insert(path.clone(), mtime, now));
        assert!(!seen.insert(path.clone(), mtime, now));

        // Same path, newer mtime: a different physical write.
        let newer = UNIX_EPOCH + Duration::from_secs(1_005);
        assert!(seen.insert(path.clone(), newer, now));

        // After the TTL the entry is pruned and the pair is fresh again.
        seen.prune(now + Duration::from_secs(31));
        assert!(seen.insert(path, newer, now + Duration::from_secs(31)));
    }

    #[test]
    fn test_watch_registers_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = new_watcher();
        assert!(watcher.watched_dir().is_none());

        watcher.watch(dir.path()).unwrap();
        assert_eq!(watcher.watched_dir(), Some(dir.path()));
    }
}
