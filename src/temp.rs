//! Request-scoped temp files with guaranteed cleanup.
//!
//! Every path created for an in-flight request is registered with a shared
//! [`TempTracker`]. The per-request [`RequestWorkspace`] guard removes its paths on
//! release or drop; `cleanup_all` drains whatever is left at shutdown.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::AppError;

pub const TEMP_DIR_PREFIX: &str = "gif-to-video-";
pub const INPUT_FILE_NAME: &str = "input.gif";
pub const OUTPUT_FILE_NAME: &str = "output.mp4";

/// Age after which an untracked `gif-to-video-*` leftover is considered abandoned.
pub const STALE_TEMP_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on workspaces kept alive by [`RequestWorkspace::retain_output`].
/// The oldest is removed first.
pub const MAX_RETAINED_OUTPUTS: usize = 16;

static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn log_cleanup_failure(path: &Path, err: io::Error) {
    let err = AppError::Cleanup {
        path: path.display().to_string(),
        reason: err.to_string(),
    };
    log::warn!(target: "gif_to_video::temp", "{}", err);
}

#[derive(Debug)]
pub struct TempTracker {
    base: PathBuf,
    tracked: Mutex<HashSet<PathBuf>>,
    /// Workspace dir and output of retained requests, oldest first.
    retained: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl Default for TempTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TempTracker {
    /// Tracker creating request dirs under the system temp dir.
    pub fn new() -> Self {
        Self::with_base(std::env::temp_dir())
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            tracked: Mutex::new(HashSet::new()),
            retained: Mutex::new(Vec::new()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Returns false when the path was already tracked.
    pub fn register(&self, path: impl Into<PathBuf>) -> bool {
        self.tracked.lock().insert(path.into())
    }

    pub fn unregister(&self, path: &Path) -> bool {
        self.tracked.lock().remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.tracked.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.tracked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.lock().is_empty()
    }

    /// Creates a fresh `gif-to-video-*` dir and registers it with its input/output paths.
    pub fn create_request_dir(self: &Arc<Self>) -> Result<RequestWorkspace, AppError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let mut attempt = 0;
        let dir = loop {
            let candidate = self.base.join(format!(
                "{}{}-{}-{}",
                TEMP_DIR_PREFIX,
                std::process::id(),
                millis,
                DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
            ));
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 8 => {
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };
        let input = dir.join(INPUT_FILE_NAME);
        let output = dir.join(OUTPUT_FILE_NAME);
        self.register(&dir);
        self.register(&input);
        self.register(&output);
        log::debug!(
            target: "gif_to_video::temp",
            "created request dir {}",
            dir.display()
        );
        Ok(RequestWorkspace {
            tracker: Arc::clone(self),
            dir,
            input,
            output,
            state: WorkspaceState::Created,
        })
    }

    /// Deletes the request's named files and its dir, then unregisters them.
    pub fn cleanup_request(&self, temp_dir: &Path, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = fs::remove_file(path)
                && e.kind() != io::ErrorKind::NotFound
            {
                log_cleanup_failure(path, e);
            }
            self.unregister(path);
        }
        if let Err(e) = fs::remove_dir_all(temp_dir)
            && e.kind() != io::ErrorKind::NotFound
        {
            log_cleanup_failure(temp_dir, e);
        }
        self.unregister(temp_dir);
    }

    pub fn retained_count(&self) -> usize {
        self.retained.lock().len()
    }

    fn retain(&self, dir: PathBuf, output: PathBuf) {
        if let Err(e) = crate::cache::set_modified(&dir, SystemTime::now()) {
            log::debug!(
                target: "gif_to_video::temp",
                "could not stamp retained dir {}: {}",
                dir.display(),
                e
            );
        }
        let evicted: Vec<(PathBuf, PathBuf)> = {
            let mut retained = self.retained.lock();
            retained.push((dir, output));
            let excess = retained.len().saturating_sub(MAX_RETAINED_OUTPUTS);
            retained.drain(..excess).collect()
        };
        for (dir, output) in evicted {
            log::debug!(
                target: "gif_to_video::temp",
                "retained output limit reached, removing {}",
                dir.display()
            );
            self.cleanup_request(&dir, &[output]);
        }
    }

    /// Removes retained workspaces whose dir is older than `max_age` or already gone.
    /// Returns how many were reaped.
    pub fn reap_retained(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let expired: Vec<(PathBuf, PathBuf)> = {
            let mut retained = self.retained.lock();
            let (expired, kept): (Vec<_>, Vec<_>) = retained.drain(..).partition(|(dir, _)| {
                fs::metadata(dir)
                    .and_then(|m| m.modified())
                    .map(|modified| {
                        now.duration_since(modified)
                            .is_ok_and(|age| age > max_age)
                    })
                    .unwrap_or(true)
            });
            *retained = kept;
            expired
        };
        for (dir, output) in &expired {
            self.cleanup_request(dir, std::slice::from_ref(output));
        }
        if !expired.is_empty() {
            log::info!(
                target: "gif_to_video::temp",
                "reaped {} retained request output(s)",
                expired.len()
            );
        }
        expired.len()
    }

    /// Removes every tracked path still on disk and any request dir left empty.
    /// Returns how many paths were removed.
    pub fn cleanup_all(&self) -> usize {
        self.retained.lock().clear();
        let mut paths: Vec<PathBuf> = self.tracked.lock().drain().collect();
        if paths.is_empty() {
            return 0;
        }
        // Children before their dirs.
        paths.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        let mut removed = 0;
        let mut parents = HashSet::new();
        for path in &paths {
            if let Some(parent) = path.parent() {
                parents.insert(parent.to_path_buf());
            }
            if !path.exists() {
                continue;
            }
            match remove_path(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log_cleanup_failure(path, e),
            }
        }
        for parent in parents {
            if self.is_request_dir(&parent) {
                // Fails harmlessly when not empty.
                let _ = fs::remove_dir(&parent);
            }
        }
        log::info!(
            target: "gif_to_video::temp",
            "drained {} tracked temp path(s), removed {}",
            paths.len(),
            removed
        );
        removed
    }

    fn is_request_dir(&self, path: &Path) -> bool {
        path.parent() == Some(self.base.as_path())
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(TEMP_DIR_PREFIX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkspaceState {
    Created,
    Populated,
    Consumed,
    Released,
}

/// Scratch dir for one request. Cleaned up on `release` or drop, whichever comes first.
#[derive(Debug)]
pub struct RequestWorkspace {
    tracker: Arc<TempTracker>,
    dir: PathBuf,
    input: PathBuf,
    output: PathBuf,
    state: WorkspaceState,
}

impl RequestWorkspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn state(&self) -> WorkspaceState {
        self.state
    }

    fn advance(&mut self, next: WorkspaceState) {
        if next > self.state {
            self.state = next;
        }
    }

    /// Source fetched into `input_path`.
    pub fn mark_populated(&mut self) {
        self.advance(WorkspaceState::Populated);
    }

    /// Output handed to the cache.
    pub fn mark_consumed(&mut self) {
        self.advance(WorkspaceState::Consumed);
    }

    pub fn release(mut self) {
        self.cleanup();
    }

    /// Ends the workspace but keeps the output file. The output and its dir stay
    /// registered; at most [`MAX_RETAINED_OUTPUTS`] are kept, and
    /// [`TempTracker::reap_retained`] or the shutdown drain removes them.
    pub fn retain_output(mut self) -> PathBuf {
        if let Err(e) = fs::remove_file(&self.input)
            && e.kind() != io::ErrorKind::NotFound
        {
            log_cleanup_failure(&self.input, e);
        }
        self.tracker.unregister(&self.input);
        self.state = WorkspaceState::Released;
        self.tracker.retain(self.dir.clone(), self.output.clone());
        self.output.clone()
    }

    fn cleanup(&mut self) {
        if self.state == WorkspaceState::Released {
            return;
        }
        let files = [self.input.clone(), self.output.clone()];
        self.tracker.cleanup_request(&self.dir, &files);
        self.state = WorkspaceState::Released;
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Removes `gif-to-video-*` entries in the system temp dir older than `max_age`.
pub fn cleanup_old_temp_files(max_age: Duration) -> usize {
    cleanup_old_temp_files_in(&std::env::temp_dir(), max_age)
}

pub fn cleanup_old_temp_files_in(base: &Path, max_age: Duration) -> usize {
    let Ok(read_dir) = fs::read_dir(base) else {
        return 0;
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in read_dir.filter_map(Result::ok) {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(TEMP_DIR_PREFIX) {
            continue;
        }
        let path = entry.path();
        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .is_some_and(|age| age > max_age);
        if !expired {
            continue;
        }
        match remove_path(&path) {
            Ok(()) => removed += 1,
            Err(e) => log_cleanup_failure(&path, e),
        }
    }
    if removed > 0 {
        log::info!(
            target: "gif_to_video::temp",
            "removed {} stale temp entr{} from {}",
            removed,
            if removed == 1 { "y" } else { "ies" },
            base.display()
        );
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_in(dir: &tempfile::TempDir) -> Arc<TempTracker> {
        Arc::new(TempTracker::with_base(dir.path()))
    }

    #[test]
    fn register_is_idempotent() {
        let tracker = TempTracker::with_base("/tmp");
        assert!(tracker.register("/tmp/a"));
        assert!(!tracker.register("/tmp/a"));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.unregister(Path::new("/tmp/a")));
        assert!(tracker.is_empty());
    }

    #[test]
    fn workspace_registers_dir_and_files() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let ws = tracker.create_request_dir().unwrap();
        assert!(ws.dir().is_dir());
        assert!(ws.dir().file_name().unwrap().to_string_lossy().starts_with(TEMP_DIR_PREFIX));
        assert_eq!(ws.input_path(), ws.dir().join("input.gif"));
        assert_eq!(ws.output_path(), ws.dir().join("output.mp4"));
        assert_eq!(tracker.len(), 3);
        assert_eq!(ws.state(), WorkspaceState::Created);
    }

    #[test]
    fn release_removes_everything() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let mut ws = tracker.create_request_dir().unwrap();
        fs::write(ws.input_path(), b"gif").unwrap();
        ws.mark_populated();
        fs::write(ws.output_path(), b"mp4").unwrap();
        ws.mark_consumed();
        let dir = ws.dir().to_path_buf();
        ws.release();
        assert!(!dir.exists());
        assert!(tracker.is_empty());
    }

    #[test]
    fn drop_on_early_failure_cleans_up() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let dir = {
            let ws = tracker.create_request_dir().unwrap();
            fs::write(ws.input_path(), b"partial").unwrap();
            ws.dir().to_path_buf()
        };
        assert!(!dir.exists());
        assert!(tracker.is_empty());
    }

    #[test]
    fn retained_output_survives_until_drain() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let ws = tracker.create_request_dir().unwrap();
        fs::write(ws.input_path(), b"gif").unwrap();
        fs::write(ws.output_path(), b"mp4").unwrap();
        let input = ws.input_path().to_path_buf();
        let output = ws.retain_output();
        assert!(output.exists());
        assert!(!input.exists());
        assert!(tracker.contains(&output));

        tracker.cleanup_all();
        assert!(!output.exists());
        assert!(!output.parent().unwrap().exists());
    }

    fn retained_workspace(tracker: &Arc<TempTracker>) -> PathBuf {
        let ws = tracker.create_request_dir().unwrap();
        fs::write(ws.output_path(), b"mp4").unwrap();
        ws.retain_output()
    }

    #[test]
    fn reap_removes_only_expired_retained_outputs() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let old = retained_workspace(&tracker);
        let young = retained_workspace(&tracker);
        let old_dir = old.parent().unwrap().to_path_buf();
        crate::cache::set_modified(&old_dir, SystemTime::now() - Duration::from_secs(120))
            .unwrap();

        assert_eq!(tracker.reap_retained(Duration::from_secs(60)), 1);
        assert!(!old_dir.exists());
        assert!(!tracker.contains(&old));
        assert!(young.exists());
        assert_eq!(tracker.retained_count(), 1);
        assert_eq!(tracker.len(), 2, "young dir and output");
    }

    #[test]
    fn retained_outputs_are_capped() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let outputs: Vec<PathBuf> = (0..MAX_RETAINED_OUTPUTS + 3)
            .map(|_| retained_workspace(&tracker))
            .collect();

        assert_eq!(tracker.retained_count(), MAX_RETAINED_OUTPUTS);
        assert!(outputs[..3].iter().all(|o| !o.exists()), "oldest evicted");
        assert!(outputs[3..].iter().all(|o| o.exists()));
        assert_eq!(fs::read_dir(base.path()).unwrap().count(), MAX_RETAINED_OUTPUTS);
    }

    #[test]
    fn state_never_moves_backwards() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let mut ws = tracker.create_request_dir().unwrap();
        ws.mark_consumed();
        ws.mark_populated();
        assert_eq!(ws.state(), WorkspaceState::Consumed);
    }

    #[test]
    fn workspaces_get_distinct_dirs() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let a = tracker.create_request_dir().unwrap();
        let b = tracker.create_request_dir().unwrap();
        assert_ne!(a.dir(), b.dir());
        assert_eq!(tracker.len(), 6);
    }

    #[test]
    fn cleanup_all_drains_leftovers() {
        let base = tempfile::tempdir().unwrap();
        let tracker = tracker_in(&base);
        let ws = tracker.create_request_dir().unwrap();
        fs::write(ws.input_path(), b"gif").unwrap();
        let dir = ws.dir().to_path_buf();
        // Simulate a task that never reached its guard's drop.
        std::mem::forget(ws);

        let stray = base.path().join("stray.txt");
        fs::write(&stray, b"x").unwrap();
        tracker.register(&stray);
        tracker.register(base.path().join("already-gone.txt"));

        let removed = tracker.cleanup_all();

        assert_eq!(removed, 3, "request dir, its input, stray file");
        assert!(!dir.exists());
        assert!(!stray.exists());
        assert!(tracker.is_empty());
        assert!(base.path().exists(), "base dir is never removed");
        assert_eq!(tracker.cleanup_all(), 0);
    }

    #[test]
    fn old_temp_entries_are_swept() {
        let base = tempfile::tempdir().unwrap();
        let old = base.path().join(format!("{}old", TEMP_DIR_PREFIX));
        let fresh = base.path().join(format!("{}fresh", TEMP_DIR_PREFIX));
        let unrelated = base.path().join("other-old");
        for dir in [&old, &fresh, &unrelated] {
            fs::create_dir(dir).unwrap();
        }
        let two_days_ago = SystemTime::now() - Duration::from_secs(48 * 3600);
        for dir in [&old, &unrelated] {
            fs::File::open(dir).unwrap().set_modified(two_days_ago).unwrap();
        }

        assert_eq!(cleanup_old_temp_files_in(base.path(), STALE_TEMP_MAX_AGE), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(unrelated.exists());
    }
}
