//! Atomic file primitives and directory walking.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;

const TMP_SUFFIX: &str = ".tmp";

/// A concurrent prune may remove a freshly created parent directory; the
/// write is retried this many times before giving up.
const MAX_WRITE_ATTEMPTS: usize = 3;

pub(crate) async fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(toml::from_str(&raw)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub(crate) async fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let raw = toml::to_string(value)?;
    write_atomic(path, raw.as_bytes()).await
}

/// Write `contents` to `<file>.<uuid>.tmp`, flush it to disk, then rename it
/// over `path`. Readers see either the old or the new file, never a mix.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("record");
    let tmp = path.with_file_name(format!(
        "{file_name}.{}{TMP_SUFFIX}",
        uuid::Uuid::new_v4()
    ));

    let mut attempt = 1;
    loop {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        match write_synced(&tmp, contents).await {
            Ok(()) => break,
            Err(err) if err.kind() == io::ErrorKind::NotFound && attempt < MAX_WRITE_ATTEMPTS => {
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

async fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

/// Remove a file; returns `false` if it did not exist.
pub(crate) async fn remove_file(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Remove `dir` and its ancestors while they are empty, stopping at `base`.
pub(crate) async fn prune_empty_dirs(dir: &Path, base: &Path) {
    let mut current = Some(dir);
    while let Some(dir) = current {
        if dir == base || !dir.starts_with(base) || fs::remove_dir(dir).await.is_err() {
            break;
        }
        current = dir.parent();
    }
}

pub(crate) async fn exists(path: &Path) -> Result<bool, StorageError> {
    Ok(fs::try_exists(path).await?)
}

/// Sorted names of the sub-directories of `dir`; empty if `dir` is missing.
pub(crate) async fn list_dirs(dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Whether some key below the partial key `partial` can start with `prefix`.
fn may_extend(partial: &str, prefix: &str) -> bool {
    let partial = format!("{partial}/");
    partial.starts_with(prefix) || prefix.starts_with(&partial)
}

/// Keys of the directories `depth` levels below `base` that start with
/// `prefix` and, when `file` is given, contain that file. Keys join the
/// directory names with `/` and come back sorted.
pub(crate) async fn list_keys(
    base: &Path,
    depth: usize,
    prefix: &str,
    file: Option<&str>,
) -> Result<Vec<String>, StorageError> {
    let mut frontier = vec![String::new()];
    for level in 1..=depth {
        let mut next = Vec::new();
        for partial in frontier {
            for child in list_dirs(&base.join(&partial)).await? {
                let key = if partial.is_empty() {
                    child
                } else {
                    format!("{partial}/{child}")
                };
                let keep = if level == depth {
                    key.starts_with(prefix)
                } else {
                    may_extend(&key, prefix)
                };
                if keep {
                    next.push(key);
                }
            }
        }
        frontier = next;
    }

    let mut keys = Vec::with_capacity(frontier.len());
    for key in frontier {
        match file {
            Some(file) if !exists(&base.join(&key).join(file)).await? => {}
            _ => keys.push(key),
        }
    }
    keys.sort();
    Ok(keys)
}

/// Delete leftover temp files from interrupted writes anywhere under `root`.
pub(crate) async fn sweep_tmp(root: &Path) -> Result<usize, StorageError> {
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
    let mut removed = 0;
    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(TMP_SUFFIX))
            {
                tracing::warn!(path = %path.display(), "removing interrupted write");
                if remove_file(&path).await? {
                    removed += 1;
                }
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_write_atomically_and_leave_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/record.toml");

        write_atomic(&path, b"first = 1\n").await.unwrap();
        write_atomic(&path, b"second = 2\n").await.unwrap();

        assert_eq!(fs::read_to_string(&path).await.unwrap(), "second = 2\n");
        let leftovers = sweep_tmp(dir.path()).await.unwrap();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn should_sweep_temp_files_from_interrupted_writes() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("devices/sys/db/1");
        fs::create_dir_all(&nested).await.unwrap();
        fs::write(nested.join("device.toml.1234.tmp"), b"partial")
            .await
            .unwrap();
        fs::write(nested.join("device.toml"), b"kept").await.unwrap();

        assert_eq!(sweep_tmp(dir.path()).await.unwrap(), 1);
        assert!(exists(&nested.join("device.toml")).await.unwrap());
        assert!(!exists(&nested.join("device.toml.1234.tmp")).await.unwrap());
    }

    #[tokio::test]
    async fn should_prune_empty_directories_up_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("devices");
        let leaf = base.join("sys/db/1");
        fs::create_dir_all(&leaf).await.unwrap();
        fs::create_dir_all(base.join("sys/other")).await.unwrap();

        prune_empty_dirs(&leaf, &base).await;

        assert!(!exists(&base.join("sys/db")).await.unwrap());
        assert!(exists(&base.join("sys/other")).await.unwrap());
        assert!(exists(&base).await.unwrap());
    }

    #[tokio::test]
    async fn should_list_keys_by_prefix_at_depth() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        for key in ["sys/tg_test/1", "sys/tg_test/2", "sys/tgxtest/1", "test/dev/1"] {
            write_atomic(&base.join(key).join("device.toml"), b"")
                .await
                .unwrap();
        }
        fs::create_dir_all(base.join("sys/tg_test/3")).await.unwrap();

        let keys = list_keys(base, 3, "sys/tg_", Some("device.toml"))
            .await
            .unwrap();
        assert_eq!(keys, vec!["sys/tg_test/1", "sys/tg_test/2"]);

        let keys = list_keys(base, 3, "", None).await.unwrap();
        assert_eq!(keys.len(), 5);

        let keys = list_keys(base, 1, "", None).await.unwrap();
        assert_eq!(keys, vec!["sys", "test"]);
    }

    #[test]
    fn should_prune_walk_only_where_prefix_can_match() {
        assert!(may_extend("sys", ""));
        assert!(may_extend("sys", "sy"));
        assert!(may_extend("sys", "sys/tg"));
        assert!(may_extend("sys/tg_test", "sys/tg_"));
        assert!(!may_extend("system", "sys/"));
        assert!(!may_extend("sys/tgxtest", "sys/tg_"));
    }
}
