//! Disk-backed stage cache.
//!
//! Every AOI gets its own directory under the results root:
//!
//! ```text
//! <root>/<id>/<id>_raw.csv          raw per-patch table, as produced remotely
//! <root>/<id>/<id>_stats.csv        aggregated zone × bin table
//! <root>/<id>/<id>_stats.meta.yaml  units, scale and bins of the stats table
//! <root>/<id>/.scratch/             remote client output during retries
//! ```
//!
//! A stage is done exactly when its artifact file exists. Artifacts are
//! published by writing a hidden temp file next to the target, syncing it
//! and renaming it into place, so an interrupted write never looks complete.
//! Temp files older than [`DEFAULT_STALE_TEMP_AGE`] are left over from a
//! crashed writer and are swept by the next write for the same AOI.

use crate::aoi::AoiId;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

const SCRATCH_DIR: &str = ".scratch";
const TEMP_SUFFIX: &str = ".tmp";

/// Age after which a temp file is considered abandoned.
pub const DEFAULT_STALE_TEMP_AGE: Duration = Duration::from_secs(3600);

/// Pipeline stage whose output is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Raw per-patch histogram table from the remote engine.
    Raw,
    /// Aggregated (and possibly area-normalized) stats table.
    Stats,
    /// Provenance of the stats table.
    StatsMeta,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Stats => "stats",
            Stage::StatsMeta => "stats_meta",
        }
    }

    /// File name suffix after `<id>_`.
    pub const fn file_suffix(&self) -> &'static str {
        match self {
            Stage::Raw => "raw.csv",
            Stage::Stats => "stats.csv",
            Stage::StatsMeta => "stats.meta.yaml",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage artifacts keyed by `(aoi, stage)`.
pub trait StageCache {
    /// Whether a complete artifact exists.
    fn has(&self, aoi: &AoiId, stage: Stage) -> bool;

    fn read(&self, aoi: &AoiId, stage: Stage) -> io::Result<Vec<u8>>;

    /// Publish an artifact atomically, replacing any previous one.
    fn write(&self, aoi: &AoiId, stage: Stage, artifact: &[u8]) -> io::Result<()>;
}

/// [`StageCache`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStageCache {
    root: PathBuf,
    stale_temp_age: Duration,
}

impl FsStageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stale_temp_age: DEFAULT_STALE_TEMP_AGE,
        }
    }

    pub fn with_stale_temp_age(mut self, age: Duration) -> Self {
        self.stale_temp_age = age;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Result directory of one AOI.
    pub fn aoi_dir(&self, aoi: &AoiId) -> PathBuf {
        self.root.join(aoi.as_str())
    }

    pub fn artifact_path(&self, aoi: &AoiId, stage: Stage) -> PathBuf {
        self.aoi_dir(aoi).join(format!("{}_{}", aoi.as_str(), stage.file_suffix()))
    }

    /// Where remote clients write during retry attempts.
    pub fn scratch_dir(&self, aoi: &AoiId) -> PathBuf {
        self.aoi_dir(aoi).join(SCRATCH_DIR)
    }

    /// Remove everything cached for an AOI. Returns whether anything existed.
    pub fn clean(&self, aoi: &AoiId) -> io::Result<bool> {
        let dir = self.aoi_dir(aoi);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Removed {}", dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove one stage's artifact. Returns whether it existed.
    pub fn invalidate(&self, aoi: &AoiId, stage: Stage) -> io::Result<bool> {
        match fs::remove_file(self.artifact_path(aoi, stage)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove abandoned temp files in an AOI directory. Returns how many went.
    pub fn sweep_stale_temps(&self, aoi: &AoiId) -> io::Result<usize> {
        let entries = match fs::read_dir(self.aoi_dir(aoi)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with('.') || !name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age < self.stale_temp_age {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("Swept stale temp file {}", entry.path().display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}

impl StageCache for FsStageCache {
    fn has(&self, aoi: &AoiId, stage: Stage) -> bool {
        self.artifact_path(aoi, stage).is_file()
    }

    fn read(&self, aoi: &AoiId, stage: Stage) -> io::Result<Vec<u8>> {
        fs::read(self.artifact_path(aoi, stage))
    }

    fn write(&self, aoi: &AoiId, stage: Stage, artifact: &[u8]) -> io::Result<()> {
        let path = self.artifact_path(aoi, stage);
        let dir = self.aoi_dir(aoi);
        fs::create_dir_all(&dir)?;
        if let Err(e) = self.sweep_stale_temps(aoi) {
            warn!("Could not sweep temp files in {}: {}", dir.display(), e);
        }

        let tmp = dir.join(format!(
            ".{}_{}.{}{}",
            aoi.as_str(),
            stage.as_str(),
            std::process::id(),
            TEMP_SUFFIX
        ));
        let published = write_synced(&tmp, artifact).and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = published {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        // Persist the rename itself.
        #[cfg(unix)]
        File::open(&dir)?.sync_all()?;

        debug!("Published {} ({} bytes)", path.display(), artifact.len());
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let cache = FsStageCache::new("/data/results");
        let aoi = AoiId::new("KEN");
        assert_eq!(cache.aoi_dir(&aoi), PathBuf::from("/data/results/KEN"));
        assert_eq!(
            cache.artifact_path(&aoi, Stage::Raw),
            PathBuf::from("/data/results/KEN/KEN_raw.csv")
        );
        assert_eq!(
            cache.artifact_path(&aoi, Stage::Stats),
            PathBuf::from("/data/results/KEN/KEN_stats.csv")
        );
        assert_eq!(
            cache.artifact_path(&aoi, Stage::StatsMeta),
            PathBuf::from("/data/results/KEN/KEN_stats.meta.yaml")
        );
        assert_eq!(cache.scratch_dir(&aoi), PathBuf::from("/data/results/KEN/.scratch"));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsStageCache::new(dir.path());
        let aoi = AoiId::new("users/me/kenya");

        assert!(!cache.has(&aoi, Stage::Raw));
        cache.write(&aoi, Stage::Raw, b"label,histogram\n").unwrap();
        assert!(cache.has(&aoi, Stage::Raw));
        assert!(!cache.has(&aoi, Stage::Stats));
        assert_eq!(cache.read(&aoi, Stage::Raw).unwrap(), b"label,histogram\n");

        cache.write(&aoi, Stage::Raw, b"replaced").unwrap();
        assert_eq!(cache.read(&aoi, Stage::Raw).unwrap(), b"replaced");

        // Only the artifact is left behind, no temp files.
        let names: Vec<_> = fs::read_dir(cache.aoi_dir(&aoi))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}_raw.csv", aoi.as_str())]);
    }

    #[test]
    fn test_leftover_temp_file_is_not_an_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsStageCache::new(dir.path());
        let aoi = AoiId::new("KEN");

        fs::create_dir_all(cache.aoi_dir(&aoi)).unwrap();
        fs::write(cache.aoi_dir(&aoi).join(".KEN_stats.4242.tmp"), b"half").unwrap();
        assert!(!cache.has(&aoi, Stage::Stats));
    }

    #[test]
    fn test_write_sweeps_abandoned_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let aoi = AoiId::new("KEN");
        let fresh = FsStageCache::new(dir.path());
        fs::create_dir_all(fresh.aoi_dir(&aoi)).unwrap();
        let leftover = fresh.aoi_dir(&aoi).join(".KEN_stats.4242.tmp");
        fs::write(&leftover, b"half").unwrap();

        // Recent temp files may belong to a live writer.
        fresh.write(&aoi, Stage::Raw, b"raw").unwrap();
        assert!(leftover.exists());

        let eager = FsStageCache::new(dir.path()).with_stale_temp_age(Duration::ZERO);
        eager.write(&aoi, Stage::Raw, b"raw").unwrap();
        assert!(!leftover.exists());
        assert!(eager.has(&aoi, Stage::Raw));
        assert_eq!(eager.sweep_stale_temps(&aoi).unwrap(), 0);
    }

    #[test]
    fn test_clean_and_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsStageCache::new(dir.path());
        let aoi = AoiId::new("KEN");

        assert!(!cache.clean(&aoi).unwrap());
        cache.write(&aoi, Stage::Raw, b"raw").unwrap();
        cache.write(&aoi, Stage::Stats, b"stats").unwrap();

        assert!(cache.invalidate(&aoi, Stage::Stats).unwrap());
        assert!(!cache.invalidate(&aoi, Stage::Stats).unwrap());
        assert!(cache.has(&aoi, Stage::Raw));

        assert!(cache.clean(&aoi).unwrap());
        assert!(!cache.has(&aoi, Stage::Raw));
        assert!(!cache.aoi_dir(&aoi).exists());
    }
}
