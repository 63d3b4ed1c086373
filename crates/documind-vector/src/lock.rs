//! Write locks keyed by index location.
//!
//! `save` replaces the whole index, so two ingestions into one location must
//! not interleave, whether they run in one process or several. A writer first
//! takes an in-process async mutex, then an exclusive advisory lock on
//! `<location>/.write.lock`. Readers never take these locks.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use fs4::FileExt;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use documind_core::{Error, Result};

type LockMap = HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>;

static LOCKS: OnceLock<Mutex<LockMap>> = OnceLock::new();

pub const LOCK_FILE: &str = ".write.lock";

/// Proof that the holder is the only writer for `location`.
///
/// Dropping it closes the lock file, which releases the advisory lock.
#[derive(Debug)]
pub struct WriteGuard {
    location: PathBuf,
    _file: File,
    _guard: OwnedMutexGuard<()>,
}

impl WriteGuard {
    pub fn location(&self) -> &Path {
        &self.location
    }
}

pub async fn lock_location(location: &Path) -> Result<WriteGuard> {
    let key = lock_key(location)?;
    let mutex = {
        let mut locks = LOCKS
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .map_err(|_| Error::Storage("index lock registry poisoned".into()))?;
        Arc::clone(locks.entry(key.clone()).or_default())
    };
    let guard = mutex.lock_owned().await;

    tokio::fs::create_dir_all(&key).await?;
    let lock_path = key.join(LOCK_FILE);
    let file = OpenOptions::new().create(true).truncate(false).write(true).open(&lock_path)?;
    // Blocks until any other process writing this location lets go.
    let file = tokio::task::spawn_blocking(move || file.lock_exclusive().map(|()| file))
        .await
        .map_err(|e| Error::Storage(format!("lock task failed: {}", e)))??;
    debug!(path = %lock_path.display(), "index write lock acquired");
    Ok(WriteGuard { location: key, _file: file, _guard: guard })
}

/// Absolute, lexically normalized form of `location`.
pub fn lock_key(location: &Path) -> Result<PathBuf> {
    let absolute = if location.is_absolute() {
        location.to_path_buf()
    } else {
        std::env::current_dir()?.join(location)
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}
