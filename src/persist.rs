//! Durable snapshot storage
//!
//! One snapshot file per catalog directory, written atomically via a temp
//! sibling: write, fsync, rename, fsync the directory. A crash at any
//! point leaves either the previous snapshot or the new one, never a
//! torn file.

use crate::data::Data;
use crate::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Snapshot file name inside the catalog directory.
const SNAPSHOT_FILE: &str = "catalog.db";
/// Temp sibling used by the atomic-rename write pattern.
const SNAPSHOT_TMP_FILE: &str = "catalog.db.tmp";

/// Writes and reloads catalog snapshots in a single directory
#[derive(Debug)]
pub struct Persister {
    dir: PathBuf,
    path: PathBuf,
    tmp_path: PathBuf,
}

impl Persister {
    /// Open (creating if needed) the catalog directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(SNAPSHOT_FILE),
            tmp_path: dir.join(SNAPSHOT_TMP_FILE),
            dir,
        })
    }

    /// Load the latest snapshot, or `None` when the directory holds none.
    pub fn load(&self) -> Result<Option<Data>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace the snapshot with `data`.
    pub fn save(&self, data: &Data) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;

        let mut file = File::create(&self.tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;

        // fsync the directory so the rename itself is durable.
        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    /// Verify the directory is writable.
    pub fn ping(&self) -> Result<()> {
        let probe = self.dir.join(".ping");
        fs::write(&probe, b"ok")?;
        fs::remove_file(&probe)?;
        Ok(())
    }

    /// Directory this persister writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
