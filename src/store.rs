//! Repository state persistence. `MemoryStateStore` backs tests and
//! single-process embedding; `JsonFileStore` keeps one JSON document per
//! connection with an atomic write path and a `.prev` fallback copy.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::SqlvcError;
use crate::state::RepositoryState;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, connection_id: &str) -> Result<Option<RepositoryState>, SqlvcError>;
    async fn save(&self, state: &RepositoryState) -> Result<(), SqlvcError>;
}

#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, RepositoryState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, connection_id: &str) -> Result<Option<RepositoryState>, SqlvcError> {
        Ok(self.states.read().get(connection_id).cloned())
    }

    async fn save(&self, state: &RepositoryState) -> Result<(), SqlvcError> {
        self.states
            .write()
            .insert(state.connection_id.clone(), state.clone());
        Ok(())
    }
}

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SqlvcError> {
        let dir = dir.into();
        create_private_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Connection ids are caller-supplied and may contain path
    /// separators, so filenames are hex of the id.
    fn primary_path(&self, connection_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hex::encode(connection_id)))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self, connection_id: &str) -> Result<Option<RepositoryState>, SqlvcError> {
        let primary = self.primary_path(connection_id);
        if !primary.exists() {
            return Ok(None);
        }
        match try_read_state(&primary) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                let prev = prev_path(&primary);
                warn!(
                    connection_id,
                    error = %err,
                    "primary state file unreadable, trying fallback"
                );
                let state = try_read_state(&prev)?;
                Ok(Some(state))
            }
        }
    }

    async fn save(&self, state: &RepositoryState) -> Result<(), SqlvcError> {
        let primary = self.primary_path(&state.connection_id);
        let prev = prev_path(&primary);

        if primary.exists() {
            let data = fs::read(&primary)?;
            fs::write(&prev, data)?;
            fsync_file(&prev)?;
        }

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        let bytes =
            serde_json::to_vec_pretty(state).map_err(|e| SqlvcError::Encode(e.to_string()))?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&primary).map_err(|e| SqlvcError::Io(e.error))?;
        fsync_dir(&self.dir)?;
        Ok(())
    }
}

fn prev_path(primary: &Path) -> PathBuf {
    let mut os = primary.as_os_str().to_os_string();
    os.push(".prev");
    PathBuf::from(os)
}

fn try_read_state(path: &Path) -> Result<RepositoryState, SqlvcError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| SqlvcError::Decode(e.to_string()))
}

fn fsync_file(path: &Path) -> Result<(), SqlvcError> {
    let file = fs::OpenOptions::new().read(true).open(path)?;
    file.sync_all()?;
    Ok(())
}

fn fsync_dir(path: &Path) -> Result<(), SqlvcError> {
    let dir = fs::File::open(path)?;
    dir.sync_all()?;
    Ok(())
}

/// Creates a directory with restrictive permissions (0o700 on Unix) so
/// recorded statements are not readable by other users on the host.
fn create_private_dir_all(path: &Path) -> Result<(), SqlvcError> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;
        use std::os::unix::fs::PermissionsExt;

        DirBuilder::new().recursive(true).mode(0o700).create(path)?;
        let metadata = fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(SqlvcError::Validation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }
        let mut perms = metadata.permissions();
        if perms.mode() & 0o777 != 0o700 {
            perms.set_mode(0o700);
            fs::set_permissions(path, perms)?;
        }
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{JsonFileStore, MemoryStateStore, StateStore};
    use crate::state::RepositoryState;
    use tempfile::tempdir;

    #[tokio::test]
    async fn memory_store_round_trips_state() {
        let store = MemoryStateStore::new();
        let state = RepositoryState::new("conn-1", "main");
        store.save(&state).await.expect("save");
        let loaded = store.load("conn-1").await.expect("load").expect("present");
        assert_eq!(loaded, state);
        assert!(store.load("other").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn file_store_round_trips_state() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open");
        let state = RepositoryState::new("conn/with/slashes", "main");
        store.save(&state).await.expect("save");
        let loaded = store
            .load("conn/with/slashes")
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn file_store_falls_back_to_previous_copy() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path()).expect("open");
        let state = RepositoryState::new("conn-1", "main");
        store.save(&state).await.expect("first save");
        let mut updated = state.clone();
        updated.current_branch = "main".into();
        store.save(&updated).await.expect("second save");

        let primary = dir.path().join(format!("{}.json", hex::encode("conn-1")));
        std::fs::write(&primary, b"{ not json").expect("corrupt primary");

        let loaded = store.load("conn-1").await.expect("load").expect("present");
        assert_eq!(loaded, state, "fallback copy holds the prior save");
    }
}
