//! Filesystem artifact storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::application::repos::{ArtifactError, ArtifactStore, StoredArtifact};

/// Stores artifacts under a root directory, one file per key.
///
/// Writes land in a sibling temp file first and are renamed into place, so a
/// reader sees either the previous artifact or the complete new one.
#[derive(Debug)]
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(key);
        let escapes = relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            });
        if key.is_empty() || escapes || relative.file_name().is_none() {
            return Err(ArtifactError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<StoredArtifact, ArtifactError> {
        let target = self.resolve(key)?;
        let parent = target
            .parent()
            .ok_or_else(|| ArtifactError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent).await?;

        let file_name = target
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ArtifactError::InvalidKey(key.to_string()))?;
        let staging = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let written = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&staging, &target).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&staging).await;
            return Err(err.into());
        }

        Ok(StoredArtifact {
            key: key.to_string(),
            size_bytes: bytes.len() as u64,
            checksum: hex::encode(Sha256::digest(&bytes).as_slice()),
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, ArtifactError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FilesystemArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemArtifactStore::new(dir.path().join("artifacts")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_overwrites_the_same_key() {
        let (_dir, store) = store();

        let first = store
            .put("exports/a.pdf", Bytes::from_static(b"first"))
            .await
            .unwrap();
        let second = store
            .put("exports/a.pdf", Bytes::from_static(b"second run"))
            .await
            .unwrap();

        assert_ne!(first.checksum, second.checksum);
        assert_eq!(second.size_bytes, 10);
        assert_eq!(
            store.get("exports/a.pdf").await.unwrap(),
            Bytes::from_static(b"second run")
        );

        let leftovers: Vec<_> = std::fs::read_dir(store.root().join("exports"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("a.pdf")]);
    }

    #[tokio::test]
    async fn checksum_is_sha256_hex() {
        let (_dir, store) = store();
        let stored = store.put("x.pdf", Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(
            stored.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_root() {
        let (_dir, store) = store();
        for key in ["../outside.pdf", "/etc/passwd", "exports/../../x", ""] {
            let err = store.put(key, Bytes::from_static(b"x")).await.unwrap_err();
            assert!(matches!(err, ArtifactError::InvalidKey(_)), "{key}");
        }
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let (_dir, store) = store();
        let err = store.get("exports/none.pptx").await.unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(_)));
    }
}
