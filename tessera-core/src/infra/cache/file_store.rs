use std::path::{Component, Path, PathBuf};

use directories::ProjectDirs;
use tessera_model::TaskKind;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::{StorageConfig, StorageProfile},
    error::{CacheError, Result},
};

/// Directory under the storage root that holds per-user data.
pub const USER_DATA_DIR: &str = "userData";

/// File-backed thumbnail store rooted at a platform storage directory.
///
/// Every path handed out by the store is relative to [`Self::base_root`];
/// [`Self::to_absolute`] turns it into the path callers display.
#[derive(Clone, Debug)]
pub struct ThumbnailFileStore {
    base_root: PathBuf,
    user_id: String,
}

impl ThumbnailFileStore {
    pub fn new(base_root: PathBuf, user_id: impl Into<String>) -> Self {
        Self {
            base_root,
            user_id: user_id.into(),
        }
    }

    /// Resolve the storage root for the configured platform profile.
    ///
    /// Desktop builds store next to the application resources (the directory
    /// containing the executable), mobile builds use the app-data directory.
    pub fn from_config(storage: &StorageConfig) -> Result<Self> {
        let base_root = match storage.profile {
            StorageProfile::Desktop => match &storage.resource_root {
                Some(root) => root.clone(),
                None => resource_dir()?,
            },
            StorageProfile::Mobile => match &storage.app_data_root {
                Some(root) => root.clone(),
                None => app_data_dir()?,
            },
        };
        Ok(Self::new(absolutize(base_root), storage.user_id.clone()))
    }

    pub fn base_root(&self) -> &Path {
        &self.base_root
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// `userData/{user}/{thumbnails|emojis}`, relative to the base root.
    pub fn relative_dir(&self, kind: TaskKind) -> PathBuf {
        Path::new(USER_DATA_DIR)
            .join(&self.user_id)
            .join(kind.folder())
    }

    pub fn relative_path(&self, kind: TaskKind, file_name: &str) -> PathBuf {
        self.relative_dir(kind).join(file_name)
    }

    /// Create the cache folder for `kind` if missing and return it relative
    /// to the base root.
    pub async fn ensure_dir(&self, kind: TaskKind) -> Result<PathBuf> {
        let relative = self.relative_dir(kind);
        let absolute = self.to_absolute(&relative);
        if !tokio::fs::try_exists(&absolute).await? {
            debug!(dir = %absolute.display(), "creating cache directory");
            tokio::fs::create_dir_all(&absolute).await?;
        }
        Ok(relative)
    }

    pub async fn exists(&self, relative: &Path) -> Result<bool> {
        let absolute = self.checked_absolute(relative)?;
        Ok(tokio::fs::try_exists(absolute).await?)
    }

    /// Atomic write (tmp + rename). If another writer already produced the
    /// file, our temp copy is discarded.
    pub async fn write(&self, relative: &Path, bytes: &[u8]) -> Result<()> {
        let path = self.checked_absolute(relative)?;
        let parent = path.parent().ok_or_else(|| {
            CacheError::Internal(format!(
                "cache path {:?} has no parent directory",
                path
            ))
        })?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent
            .join(format!(".{file_name}.tmp-{}", Uuid::new_v4().simple()));

        let mut file = tokio::fs::File::create(&tmp).await?;
        if let Err(err) = write_all_and_sync(&mut file, bytes).await {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        drop(file);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Ok(());
        }

        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        Ok(())
    }

    pub fn to_absolute(&self, relative: &Path) -> PathBuf {
        self.base_root.join(relative)
    }

    fn checked_absolute(&self, relative: &Path) -> Result<PathBuf> {
        let escapes = relative.is_absolute()
            || relative.components().any(|c| {
                matches!(c, Component::ParentDir | Component::Prefix(_))
            });
        if escapes {
            return Err(CacheError::Internal(format!(
                "cache path {:?} escapes the storage root",
                relative
            )));
        }
        Ok(self.to_absolute(relative))
    }
}

async fn write_all_and_sync(
    file: &mut tokio::fs::File,
    bytes: &[u8],
) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn resource_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        CacheError::Internal(format!(
            "executable path {:?} has no parent directory",
            exe
        ))
    })
}

fn app_data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "tessera", "tessera").ok_or_else(|| {
        CacheError::Internal("failed to resolve platform data directory".into())
    })?;
    Ok(dirs.data_dir().to_path_buf())
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_partitions_by_kind_under_user() {
        let store = ThumbnailFileStore::new(PathBuf::from("/base"), "u1");
        assert_eq!(
            store.relative_dir(TaskKind::Image),
            Path::new("userData/u1/thumbnails")
        );
        assert_eq!(
            store.relative_path(TaskKind::Emoji, "abc.gif"),
            Path::new("userData/u1/emojis/abc.gif")
        );
        assert_eq!(
            store.to_absolute(Path::new("userData/u1/emojis/abc.gif")),
            Path::new("/base/userData/u1/emojis/abc.gif")
        );
    }

    #[test]
    fn configured_roots_follow_the_profile() {
        let storage = StorageConfig {
            profile: StorageProfile::Mobile,
            user_id: "7".into(),
            resource_root: Some(PathBuf::from("/res")),
            app_data_root: Some(PathBuf::from("/appdata")),
        };
        let store = ThumbnailFileStore::from_config(&storage).expect("store");
        assert_eq!(store.base_root(), Path::new("/appdata"));

        let desktop = StorageConfig {
            profile: StorageProfile::Desktop,
            ..storage
        };
        let store = ThumbnailFileStore::from_config(&desktop).expect("store");
        assert_eq!(store.base_root(), Path::new("/res"));
    }

    #[tokio::test]
    async fn ensure_dir_then_write_then_exists() {
        let tmp = tempdir().expect("tempdir");
        let store = ThumbnailFileStore::new(tmp.path().to_path_buf(), "u1");

        let dir = store.ensure_dir(TaskKind::Video).await.expect("ensure dir");
        assert!(store.to_absolute(&dir).is_dir());

        let rel = dir.join("k.png");
        assert!(!store.exists(&rel).await.expect("exists"));
        store.write(&rel, b"png-bytes").await.expect("write");
        assert!(store.exists(&rel).await.expect("exists"));

        let written = tokio::fs::read(store.to_absolute(&rel))
            .await
            .expect("read back");
        assert_eq!(written, b"png-bytes");

        // Second write of the same name is a no-op and leaves no temp files.
        store.write(&rel, b"other").await.expect("rewrite");
        let written = tokio::fs::read(store.to_absolute(&rel))
            .await
            .expect("read back");
        assert_eq!(written, b"png-bytes");
        let mut entries = tokio::fs::read_dir(store.to_absolute(&dir))
            .await
            .expect("read dir");
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.expect("entry") {
            names.push(entry.file_name());
        }
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn paths_outside_the_root_are_rejected() {
        let tmp = tempdir().expect("tempdir");
        let store = ThumbnailFileStore::new(tmp.path().to_path_buf(), "u1");
        let err = store
            .write(Path::new("../escape.png"), b"x")
            .await
            .expect_err("escape rejected");
        assert!(matches!(err, CacheError::Internal(_)));
    }
}
