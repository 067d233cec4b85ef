//! On-disk artifact cache: converted clips and preview-frame sets with TTL eviction.
//!
//! Layout under the cache root:
//!   `<key>.mp4`                              converted clip
//!   `frames/<key>/<key>_frame_<index>.png`   preview frames, index from 0
//!
//! Freshness is the entry's mtime: a clip file's own mtime, or the frame
//! directory's mtime (touched after generation, contained files are not used).
//! Nothing here is durable; losing any entry only costs a reconversion.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::error::AppError;
use crate::key::CacheKey;

const VIDEO_EXT: &str = "mp4";
const FRAME_EXT: &str = "png";
const FRAMES_DIR: &str = "frames";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Video,
    Frames,
}

/// A persisted entry as seen by the sweep.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub kind: EntryKind,
    pub path: PathBuf,
    pub modified: SystemTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub videos_removed: usize,
    pub frame_sets_removed: usize,
    pub failures: usize,
}

/// Fresh iff `now - mtime <= ttl`. An mtime in the future counts as fresh.
pub fn is_fresh(modified: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age <= ttl,
        Err(_) => true,
    }
}

/// Sets a file's or directory's mtime. Opening read-only is enough for futimens on unix.
pub(crate) fn set_modified(path: &Path, time: SystemTime) -> io::Result<()> {
    fs::File::open(path)?.set_modified(time)
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Index from `<key>_frame_<index>.png`.
fn frame_index(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    let (_, index) = stem.rsplit_once("_frame_")?;
    index.parse().ok()
}

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct ArtifactCache {
    root: PathBuf,
    frames_root: PathBuf,
    ttl: Duration,
}

impl ArtifactCache {
    /// Opens (creating if needed) the cache namespace at `root`.
    pub fn open(root: impl Into<PathBuf>, ttl: Duration) -> Result<Self, AppError> {
        let root = root.into();
        let frames_root = root.join(FRAMES_DIR);
        fs::create_dir_all(&frames_root)?;
        log::debug!(
            target: "gif_to_video::cache",
            "artifact cache at {} (ttl={}s)",
            root.display(),
            ttl.as_secs()
        );
        Ok(Self {
            root,
            frames_root,
            ttl,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn video_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.{}", key, VIDEO_EXT))
    }

    pub fn frame_dir(&self, key: &CacheKey) -> PathBuf {
        self.frames_root.join(key.as_str())
    }

    pub fn frame_path(&self, key: &CacheKey, index: usize) -> PathBuf {
        self.frame_dir(key)
            .join(format!("{}_frame_{}.{}", key, index, FRAME_EXT))
    }

    fn is_entry_fresh(&self, path: &Path) -> bool {
        modified_time(path).is_some_and(|m| is_fresh(m, SystemTime::now(), self.ttl))
    }

    /// Cached clip path when present and unexpired. Expired entries are a plain miss;
    /// `sweep_expired` deletes them.
    pub fn lookup_video(&self, key: &CacheKey) -> Option<PathBuf> {
        let path = self.video_path(key);
        if path.is_file() && self.is_entry_fresh(&path) {
            log::info!(
                target: "gif_to_video::cache",
                "cache hit: {}",
                path.display()
            );
            return Some(path);
        }
        None
    }

    /// Copies `source` into the cache under the key's name. The copy lands on a
    /// staging name first and is renamed into place, so readers never see a
    /// partial clip. Any failure returns `source` unchanged: caching is best effort.
    pub fn store_video(&self, key: &CacheKey, source: &Path) -> PathBuf {
        match self.try_store_video(key, source) {
            Ok(path) => {
                log::info!(
                    target: "gif_to_video::cache",
                    "cached clip {}",
                    path.display()
                );
                path
            }
            Err(err) => {
                log::warn!(
                    target: "gif_to_video::cache",
                    "caching clip failed, using uncached path {}: {}",
                    source.display(),
                    err
                );
                source.to_path_buf()
            }
        }
    }

    fn try_store_video(&self, key: &CacheKey, source: &Path) -> Result<PathBuf, AppError> {
        let dest = self.video_path(key);
        let cache_write_err = |reason: String| AppError::CacheWrite {
            path: dest.display().to_string(),
            reason,
        };
        fs::create_dir_all(&self.root).map_err(|e| cache_write_err(e.to_string()))?;
        let staging = self.root.join(format!(
            ".{}.{}-{}.part",
            key,
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = fs::copy(source, &staging) {
            let _ = fs::remove_file(&staging);
            return Err(cache_write_err(e.to_string()));
        }
        if let Err(e) = fs::rename(&staging, &dest) {
            let _ = fs::remove_file(&staging);
            return Err(cache_write_err(e.to_string()));
        }
        // fs::copy keeps the source mtime on some platforms; the entry's age starts now.
        let _ = set_modified(&dest, SystemTime::now());
        Ok(dest)
    }

    /// Frames of an unexpired, non-empty frame set ordered by index; empty otherwise.
    pub fn lookup_frames(&self, key: &CacheKey) -> Vec<PathBuf> {
        let dir = self.frame_dir(key);
        if !dir.is_dir() || !self.is_entry_fresh(&dir) {
            return Vec::new();
        }
        let Ok(read_dir) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut frames: Vec<(usize, PathBuf)> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == FRAME_EXT) && p.is_file())
            .filter_map(|p| frame_index(&p).map(|i| (i, p)))
            .collect();
        frames.sort_by_key(|(i, _)| *i);
        if !frames.is_empty() {
            log::debug!(
                target: "gif_to_video::cache",
                "reusing {} cached preview frame(s) for {}",
                frames.len(),
                key
            );
        }
        frames.into_iter().map(|(_, p)| p).collect()
    }

    /// Creates the frame directory for `key` and returns it.
    pub fn prepare_frame_dir(&self, key: &CacheKey) -> Result<PathBuf, AppError> {
        let dir = self.frame_dir(key);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Restarts the frame set's TTL.
    pub fn touch_frames(&self, key: &CacheKey) -> Result<(), AppError> {
        set_modified(&self.frame_dir(key), SystemTime::now())?;
        Ok(())
    }

    /// Deletes frames with index `>= keep` left over from an earlier, larger set.
    pub fn prune_frames(&self, key: &CacheKey, keep: usize) {
        let Ok(read_dir) = fs::read_dir(self.frame_dir(key)) else {
            return;
        };
        for path in read_dir.filter_map(|e| e.ok().map(|e| e.path())) {
            if frame_index(&path).is_some_and(|i| i >= keep)
                && let Err(e) = fs::remove_file(&path)
                && e.kind() != io::ErrorKind::NotFound
            {
                log::debug!(
                    target: "gif_to_video::cache",
                    "failed to prune {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    pub fn remove_frames(&self, key: &CacheKey) {
        let dir = self.frame_dir(key);
        if let Err(e) = fs::remove_dir_all(&dir)
            && e.kind() != io::ErrorKind::NotFound
        {
            log::warn!(
                target: "gif_to_video::cache",
                "failed to remove frame dir {}: {}",
                dir.display(),
                e
            );
        }
    }

    /// All clip files and frame directories currently in the namespace.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries = Vec::new();
        if let Ok(read_dir) = fs::read_dir(&self.root) {
            for path in read_dir.filter_map(|e| e.ok().map(|e| e.path())) {
                let is_clip = path.extension().is_some_and(|e| e == VIDEO_EXT) && path.is_file();
                if !is_clip {
                    continue;
                }
                let (Some(key), Some(modified)) = (
                    path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
                    modified_time(&path),
                ) else {
                    continue;
                };
                entries.push(CacheEntry {
                    key,
                    kind: EntryKind::Video,
                    path,
                    modified,
                });
            }
        }
        if let Ok(read_dir) = fs::read_dir(&self.frames_root) {
            for path in read_dir.filter_map(|e| e.ok().map(|e| e.path())) {
                if !path.is_dir() {
                    continue;
                }
                let (Some(key), Some(modified)) = (
                    path.file_name().and_then(|s| s.to_str()).map(str::to_string),
                    modified_time(&path),
                ) else {
                    continue;
                };
                entries.push(CacheEntry {
                    key,
                    kind: EntryKind::Frames,
                    path,
                    modified,
                });
            }
        }
        entries
    }

    /// Deletes every expired clip and frame set. Never fails; per-entry errors are logged.
    pub fn sweep_expired(&self) -> SweepReport {
        let now = SystemTime::now();
        let mut report = SweepReport::default();
        for entry in self.entries() {
            if is_fresh(entry.modified, now, self.ttl) {
                continue;
            }
            let result = match entry.kind {
                EntryKind::Video => fs::remove_file(&entry.path),
                EntryKind::Frames => fs::remove_dir_all(&entry.path),
            };
            match result {
                Ok(()) => {
                    log::debug!(
                        target: "gif_to_video::cache",
                        "evicted expired {:?} entry {}",
                        entry.kind,
                        entry.path.display()
                    );
                    match entry.kind {
                        EntryKind::Video => report.videos_removed += 1,
                        EntryKind::Frames => report.frame_sets_removed += 1,
                    }
                }
                // Vanished between listing and removal (another request swept it).
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    report.failures += 1;
                    log::warn!(
                        target: "gif_to_video::cache",
                        "failed to evict {}: {}",
                        entry.path.display(),
                        e
                    );
                }
            }
        }
        if report.videos_removed + report.frame_sets_removed > 0 {
            log::info!(
                target: "gif_to_video::cache",
                "swept {} clip(s) and {} frame set(s)",
                report.videos_removed,
                report.frame_sets_removed
            );
        }
        report
    }
}
