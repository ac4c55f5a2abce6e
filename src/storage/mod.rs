//! Durable skin storage
//!
//! One adapter is chosen at startup and used for the whole process.
//! Keys reaching an adapter are already normalized by [`SkinStore`].

pub mod file;
pub mod sql;

use crate::error::{AppError, AppResult};
use crate::skins::mojang::MojangClient;
use crate::skins::{
    validate_key, CustomSkin, CustomSkinPage, SkinRecord, SkinVariant, TextureProperty,
};
use crate::utils::url_validation::looks_like_url;
use async_trait::async_trait;
use std::sync::Arc;

/// Largest page `list_custom_skins` returns
pub const MAX_PAGE_SIZE: usize = 100;

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_record(&self, identity: &str) -> AppResult<Option<SkinRecord>>;
    async fn put_record(&self, record: &SkinRecord) -> AppResult<()>;
    /// Returns whether a record existed
    async fn remove_record(&self, identity: &str) -> AppResult<bool>;

    async fn get_custom_skin(&self, name: &str) -> AppResult<Option<CustomSkin>>;
    async fn put_custom_skin(&self, skin: &CustomSkin) -> AppResult<()>;
    /// Returns whether a skin existed
    async fn remove_custom_skin(&self, name: &str) -> AppResult<bool>;
    /// Custom skins ordered by name
    async fn list_custom_skins(&self, offset: usize, limit: usize) -> AppResult<Vec<CustomSkin>>;
}

/// Backend-agnostic entry point for skin persistence
#[derive(Clone)]
pub struct SkinStore {
    adapter: Arc<dyn StorageAdapter>,
}

impl SkinStore {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        tracing::info!("[STORAGE] Using {} backend", adapter.name());
        Self { adapter }
    }

    pub fn backend_name(&self) -> &'static str {
        self.adapter.name()
    }

    pub async fn get_record(&self, identity: &str) -> AppResult<Option<SkinRecord>> {
        let identity = validate_key(identity)?;
        self.adapter.get_record(&identity).await
    }

    pub async fn put_record(
        &self,
        identity: &str,
        property: TextureProperty,
        variant: SkinVariant,
    ) -> AppResult<SkinRecord> {
        let identity = validate_key(identity)?;
        let record = SkinRecord::with_property(&identity, property, variant);
        self.adapter.put_record(&record).await?;
        Ok(record)
    }

    /// Point a player at a custom skin instead of storing the texture twice
    pub async fn link_custom_skin(&self, identity: &str, name: &str) -> AppResult<SkinRecord> {
        let identity = validate_key(identity)?;
        let skin = self
            .get_custom_skin(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Custom skin '{}'", name.trim())))?;

        let record = SkinRecord::with_custom(&identity, &skin.name, skin.property.variant());
        self.adapter.put_record(&record).await?;
        Ok(record)
    }

    pub async fn remove_record(&self, identity: &str) -> AppResult<bool> {
        let identity = validate_key(identity)?;
        self.adapter.remove_record(&identity).await
    }

    pub async fn get_custom_skin(&self, name: &str) -> AppResult<Option<CustomSkin>> {
        let name = validate_key(name)?;
        self.adapter.get_custom_skin(&name).await
    }

    /// Create or overwrite a custom skin. Names differing only in case are
    /// the same skin.
    pub async fn put_custom_skin(&self, name: &str, property: TextureProperty) -> AppResult<CustomSkin> {
        let name = validate_key(name)?;
        let skin = CustomSkin::new(&name, property);
        self.adapter.put_custom_skin(&skin).await?;
        Ok(skin)
    }

    pub async fn remove_custom_skin(&self, name: &str) -> AppResult<bool> {
        let name = validate_key(name)?;
        self.adapter.remove_custom_skin(&name).await
    }

    pub async fn list_custom_skins(&self, offset: usize, limit: usize) -> AppResult<CustomSkinPage> {
        let limit = limit.min(MAX_PAGE_SIZE);
        if limit == 0 {
            return Ok(CustomSkinPage {
                skins: Vec::new(),
                offset,
                has_more: false,
            });
        }

        // One extra row tells whether another page exists
        let mut skins = self.adapter.list_custom_skins(offset, limit + 1).await?;
        let has_more = skins.len() > limit;
        skins.truncate(limit);

        Ok(CustomSkinPage {
            skins,
            offset,
            has_more,
        })
    }

    /// Store the configured default skins as custom skins. Player names are
    /// fetched from Mojang now, URLs are left for on-demand resolution.
    /// Returns how many skins were stored.
    pub async fn preload_defaults(&self, defaults: &[String], mojang: &MojangClient) -> usize {
        let mut stored = 0;

        for entry in defaults {
            let entry = entry.trim();
            if entry.is_empty() || looks_like_url(entry) {
                continue;
            }

            let profile = match mojang.resolve(entry).await {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::warn!("[STORAGE] Could not preload default skin '{}': {}", entry, e);
                    continue;
                }
            };

            let Some(property) = profile.property else {
                tracing::warn!("[STORAGE] Default skin '{}' has no textures, skipping", entry);
                continue;
            };

            match self.put_custom_skin(&profile.name, property).await {
                Ok(_) => stored += 1,
                Err(e) => tracing::warn!("[STORAGE] Could not store default skin '{}': {}", entry, e),
            }
        }

        tracing::info!("[STORAGE] Preloaded {} default skins", stored);
        stored
    }
}
