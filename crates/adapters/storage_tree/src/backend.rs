//! Tree implementation of [`StorageBackend`].

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::OwnedMutexGuard;

use devreg_app::consistency::KeyedLocks;
use devreg_app::ports::StorageBackend;
use devreg_domain::error::RegistryError;

use crate::error::StorageError;
use crate::fs;
use crate::layout::Layout;

/// Directory-tree registry storage. Each repository trait is implemented in
/// its own module on this type.
#[derive(Clone)]
pub struct TreeBackend {
    pub(crate) layout: Layout,
    files: KeyedLocks,
}

impl TreeBackend {
    /// Open (creating if needed) a tree rooted at `root` and remove temp
    /// files left behind by interrupted writes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the root cannot be created or scanned.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let swept = fs::sweep_tmp(&root).await?;
        tracing::info!(root = %root.display(), swept, "tree storage opened");
        Ok(Self {
            layout: Layout::new(root),
            files: KeyedLocks::new(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Start reclaiming idle per-file lock entries in the background.
    pub fn spawn_lock_cleanup(&self) -> tokio::task::JoinHandle<()> {
        self.files.clone().spawn_cleanup_task()
    }

    /// Serialize read-modify-write cycles on one file.
    pub(crate) async fn lock_file(&self, path: &Path) -> OwnedMutexGuard<()> {
        self.files
            .get(&path.to_string_lossy())
            .lock_owned()
            .await
    }
}

impl StorageBackend for TreeBackend {
    fn name(&self) -> &'static str {
        "tree"
    }

    fn close(&self) -> impl Future<Output = Result<(), RegistryError>> + Send {
        // Every write is synced before its rename; nothing is buffered.
        tracing::debug!(root = %self.layout.root().display(), "tree storage closed");
        async { Ok(()) }
    }
}

#[cfg(test)]
pub(crate) async fn setup() -> (tempfile::TempDir, TreeBackend) {
    let dir = tempfile::tempdir().unwrap();
    let backend = TreeBackend::open(dir.path()).await.unwrap();
    (dir, backend)
}
