use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ResolveError;

struct Cached<T> {
    value: Arc<T>,
    modified: SystemTime,
}

/// Value derived from a file, rebuilt when the file's mtime changes.
///
/// There is no background watcher: staleness is checked on every
/// `get_or_reload`. The mutex covers only the stat and the optional reparse,
/// and callers get an `Arc` snapshot to use outside of it.
pub struct ModTimeCache<T> {
    path: PathBuf,
    state: Mutex<Option<Cached<T>>>,
}

impl<T> ModTimeCache<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get_or_reload<F>(&self, load: F) -> Result<Arc<T>, ResolveError>
    where
        F: FnOnce(&Path, &str) -> Result<T, ResolveError>,
    {
        let mut state = self.state.lock().await;

        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(|source| self.config_error(source))?;

        if let Some(cached) = state.as_ref() {
            if cached.modified == modified {
                return Ok(cached.value.clone());
            }
        }

        debug!(target = "reload", path = %self.path.display(), "loading config");
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| self.config_error(source))?;
        let value = Arc::new(load(&self.path, &raw)?);
        *state = Some(Cached {
            value: value.clone(),
            modified,
        });
        Ok(value)
    }

    fn config_error(&self, source: std::io::Error) -> ResolveError {
        ResolveError::Config {
            path: self.path.clone(),
            source,
        }
    }
}
