// Flat file backend: one JSON file per row
// <root>/players/<identity>.json and <root>/skins/<name>.json

use super::StorageAdapter;
use crate::error::{AppError, AppResult};
use crate::skins::{CustomSkin, SkinRecord};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const PLAYERS_DIR: &str = "players";
const SKINS_DIR: &str = "skins";
const EXTENSION: &str = "json";

pub struct FileStorage {
    players_dir: PathBuf,
    skins_dir: PathBuf,
}

impl FileStorage {
    /// Create the table directories under `root` if needed
    pub async fn open(root: &Path) -> AppResult<Self> {
        let players_dir = root.join(PLAYERS_DIR);
        let skins_dir = root.join(SKINS_DIR);

        for dir in [&players_dir, &skins_dir] {
            fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Storage(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        tracing::debug!("[STORAGE] File storage at {}", root.display());
        Ok(Self {
            players_dir,
            skins_dir,
        })
    }

    fn entry_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.{}", key, EXTENSION))
    }

    async fn read<T: DeserializeOwned>(path: &Path) -> AppResult<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write to a unique temp file first, then rename over the target so a
    /// crash never leaves a half written row
    async fn write<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
        let content = serde_json::to_string_pretty(value)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        if let Err(e) = fs::write(&temp_path, content).await {
            return Err(AppError::Storage(format!(
                "Failed to write {}: {}",
                temp_path.display(),
                e
            )));
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(AppError::Storage(format!(
                "Failed to replace {}: {}",
                path.display(),
                e
            )));
        }

        Ok(())
    }

    async fn remove(path: &Path) -> AppResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Sorted keys of every row in `dir`, temp files excluded
    async fn keys(dir: &Path) -> AppResult<Vec<String>> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to list {}: {}", dir.display(), e)))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    keys.push(stem.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl StorageAdapter for FileStorage {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get_record(&self, identity: &str) -> AppResult<Option<SkinRecord>> {
        Self::read(&Self::entry_path(&self.players_dir, identity)).await
    }

    async fn put_record(&self, record: &SkinRecord) -> AppResult<()> {
        Self::write(&Self::entry_path(&self.players_dir, &record.owner), record).await
    }

    async fn remove_record(&self, identity: &str) -> AppResult<bool> {
        Self::remove(&Self::entry_path(&self.players_dir, identity)).await
    }

    async fn get_custom_skin(&self, name: &str) -> AppResult<Option<CustomSkin>> {
        Self::read(&Self::entry_path(&self.skins_dir, name)).await
    }

    async fn put_custom_skin(&self, skin: &CustomSkin) -> AppResult<()> {
        Self::write(&Self::entry_path(&self.skins_dir, &skin.name), skin).await
    }

    async fn remove_custom_skin(&self, name: &str) -> AppResult<bool> {
        Self::remove(&Self::entry_path(&self.skins_dir, name)).await
    }

    async fn list_custom_skins(&self, offset: usize, limit: usize) -> AppResult<Vec<CustomSkin>> {
        let keys = Self::keys(&self.skins_dir).await?;

        let mut skins = Vec::with_capacity(limit.min(keys.len()));
        for key in keys.iter().skip(offset).take(limit) {
            // Removed between listing and reading
            if let Some(skin) = Self::read(&Self::entry_path(&self.skins_dir, key)).await? {
                skins.push(skin);
            }
        }
        Ok(skins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skins::{SkinVariant, TextureProperty};

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();

        let skin = CustomSkin::new("tidy", TextureProperty::new("V", "S").unwrap());
        storage.put_custom_skin(&skin).await.unwrap();
        storage.put_custom_skin(&skin).await.unwrap();

        let files: Vec<String> = std::fs::read_dir(dir.path().join(SKINS_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["tidy.json".to_string()]);
    }

    #[tokio::test]
    async fn test_listing_ignores_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();

        let skins_dir = dir.path().join(SKINS_DIR);
        std::fs::write(skins_dir.join(".half.json.1234.tmp"), "{").unwrap();
        std::fs::write(skins_dir.join("notes.txt"), "hello").unwrap();

        let skin = CustomSkin::new("real", TextureProperty::new("V", "S").unwrap());
        storage.put_custom_skin(&skin).await.unwrap();

        let listed = storage.list_custom_skins(0, 10).await.unwrap();
        assert_eq!(listed, vec![skin]);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join(PLAYERS_DIR).join("broken.json"), "{\"owner\":").unwrap();

        let result = storage.get_record("broken").await;
        assert!(matches!(result, Err(AppError::Json(_))));

        let record = SkinRecord::with_property(
            "broken",
            TextureProperty::new("V", "S").unwrap(),
            SkinVariant::Classic,
        );
        storage.put_record(&record).await.unwrap();
        assert_eq!(storage.get_record("broken").await.unwrap(), Some(record));
    }
}
