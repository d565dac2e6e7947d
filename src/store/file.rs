use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::format::DocumentFormat;
use super::{StateStore, StoreError, StoreGuard, StoreResult};
use crate::workflow::WorkflowState;

/// State document on the local filesystem, JSON or YAML by extension.
///
/// Writes go to a sibling temp file that is synced and renamed over the
/// document, so readers never observe a half-written state.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    format: DocumentFormat,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DocumentFormat::from_path(&path);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn ensure_parent(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> StoreResult<Option<WorkflowState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err)),
        };

        let state: WorkflowState = self.format.decode(&content)?;
        state.validate().map_err(StoreError::Invalid)?;
        debug!(path = %self.path.display(), epics = state.epics.len(), "loaded workflow state");
        Ok(Some(state))
    }

    fn save(&self, state: &WorkflowState) -> StoreResult<()> {
        self.ensure_parent()?;
        let encoded = self.format.encode(state)?;
        let temp_path = self.sibling(".tmp");

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(encoded.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &self.path)?;

        debug!(path = %self.path.display(), epics = state.epics.len(), "saved workflow state");
        Ok(())
    }

    fn lock(&self) -> StoreResult<StoreGuard> {
        self.ensure_parent()?;
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.sibling(".lock"))?;
        StoreGuard::exclusive(lock_file)
    }
}
