use std::collections::HashMap;
use std::io;
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};
#[cfg(not(target_arch = "wasm32"))]
use std::thread::{self, JoinHandle};

use log::{debug, error};
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("asset {0} does not exist")]
    NotFound(String),
    #[error("failed to fetch {path}: {message}")]
    Fetch { path: String, message: String },
}

/// Called exactly once when a load settles, possibly on another thread.
pub type AssetCallback = Box<dyn FnOnce(Result<Vec<u8>, AssetError>) + Send + 'static>;

/// Starts asset reads without waiting for them.
pub trait AssetLoader {
    fn load(&self, path: &str, on_complete: AssetCallback);
}

/// Reads assets from a directory, one worker thread per request.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct ThreadedAssetLoader {
    root: PathBuf,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

#[cfg(not(target_arch = "wasm32"))]
impl ThreadedAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Blocks until every load started so far has run its callback.
    pub fn wait(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                error!("asset worker panicked");
            }
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl AssetLoader for ThreadedAssetLoader {
    fn load(&self, path: &str, on_complete: AssetCallback) {
        let full_path = self.root.join(path);
        let path = path.to_string();
        debug!("loading {}", full_path.display());
        let worker = thread::spawn(move || {
            let result = std::fs::read(&full_path).map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => AssetError::NotFound(path),
                _ => AssetError::Io { path, source },
            });
            on_complete(result);
        });
        self.workers.lock().push(worker);
    }
}

/// In-memory loader whose requests stay pending until completed by hand.
///
/// Lets callers settle loads in any order, or never.
#[derive(Default)]
pub struct MemoryAssetLoader {
    files: Mutex<HashMap<String, Vec<u8>>>,
    pending: Mutex<Vec<(String, AssetCallback)>>,
}

impl MemoryAssetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().insert(path.into(), bytes.into());
    }

    pub fn pending_paths(&self) -> Vec<String> {
        self.pending
            .lock()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Settles the oldest pending request for `path`. Returns false if none.
    pub fn complete(&self, path: &str) -> bool {
        let Some(callback) = self.take_pending(path) else {
            return false;
        };
        let result = self
            .files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()));
        callback(result);
        true
    }

    /// Settles `path` with a fetch failure.
    pub fn fail(&self, path: &str, message: &str) -> bool {
        let Some(callback) = self.take_pending(path) else {
            return false;
        };
        callback(Err(AssetError::Fetch {
            path: path.to_string(),
            message: message.to_string(),
        }));
        true
    }

    pub fn complete_all(&self) -> usize {
        let mut settled = 0;
        for path in self.pending_paths() {
            if self.complete(&path) {
                settled += 1;
            }
        }
        settled
    }

    fn take_pending(&self, path: &str) -> Option<AssetCallback> {
        let mut pending = self.pending.lock();
        let index = pending.iter().position(|(pending, _)| pending == path)?;
        Some(pending.remove(index).1)
    }
}

impl AssetLoader for MemoryAssetLoader {
    fn load(&self, path: &str, on_complete: AssetCallback) {
        self.pending.lock().push((path.to_string(), on_complete));
    }
}
