//! File-per-snapshot store.
//!
//! Each snapshot is written to `<dir>/snapshot-<height>.dat` as one line of
//! JSON metadata, a newline, then the raw payload. Writes go to a temporary
//! file first and are renamed into place, so a crash mid-write never leaves
//! a half-written snapshot under its final name.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use strata_types::BlockHeight;

use crate::traits::SnapshotStore;
use crate::{Result, Snapshot, SnapshotMeta, StorageError};

const PREFIX: &str = "snapshot-";
const SUFFIX: &str = ".dat";

/// Snapshot store backed by a directory of files.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the snapshot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, height: BlockHeight) -> PathBuf {
        self.dir.join(format!("{PREFIX}{height:010}{SUFFIX}"))
    }

    fn parse_height(name: &str) -> Option<BlockHeight> {
        name.strip_prefix(PREFIX)?
            .strip_suffix(SUFFIX)?
            .parse()
            .ok()
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn put(&self, snapshot: Snapshot) -> Result<()> {
        let path = self.path_for(snapshot.height());
        let tmp = path.with_extension("tmp");

        let meta = serde_json::to_vec(&snapshot.meta)?;
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&meta)?;
        file.write_all(b"\n")?;
        file.write_all(&snapshot.payload)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;

        tracing::debug!(
            height = snapshot.height(),
            bytes = snapshot.payload.len(),
            path = %path.display(),
            "snapshot written"
        );
        Ok(())
    }

    fn get(&self, height: BlockHeight) -> Result<Option<Snapshot>> {
        let path = self.path_for(height);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let split = data.iter().position(|&b| b == b'\n').ok_or_else(|| {
            StorageError::Corruption(format!("{}: missing metadata line", path.display()))
        })?;
        let meta: SnapshotMeta = serde_json::from_slice(&data[..split]).map_err(|e| {
            StorageError::Corruption(format!("{}: bad metadata: {e}", path.display()))
        })?;
        if meta.height != height {
            return Err(StorageError::Corruption(format!(
                "{}: metadata says height {}",
                path.display(),
                meta.height
            )));
        }

        Ok(Some(Snapshot {
            meta,
            payload: data[split + 1..].to_vec().into(),
        }))
    }

    fn heights(&self) -> Result<Vec<BlockHeight>> {
        let mut heights = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(h) = entry.file_name().to_str().and_then(Self::parse_height) {
                heights.push(h);
            }
        }
        heights.sort_unstable();
        Ok(heights)
    }

    fn delete(&self, height: BlockHeight) -> Result<bool> {
        match fs::remove_file(self.path_for(height)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
