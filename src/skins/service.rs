// Skin change flow: cooldown -> cache -> resolver -> store
// Everything players trigger goes through SkinService

use crate::config::{Config, CooldownConfig, RestrictSkinUrlsConfig};
use crate::error::{AppError, AppResult};
use crate::skins::cache::ResolutionCache;
use crate::skins::cooldown::CooldownTracker;
use crate::skins::mineskin::MineSkinClient;
use crate::skins::mojang::{MojangClient, MojangProfile};
use crate::skins::{validate_key, CustomSkin, SkinRecord, SkinSource, SkinVariant, TextureProperty};
use crate::storage::SkinStore;
use crate::utils::url_validation::validate_skin_url;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Cooldown held while a change is in flight, replaced once it finishes
const IN_FLIGHT_HOLD_SECS: u64 = 600;

pub struct SkinService {
    mineskin: MineSkinClient,
    mojang: Arc<MojangClient>,
    store: SkinStore,
    cooldowns: Arc<CooldownTracker>,
    url_cache: ResolutionCache<TextureProperty>,
    profile_cache: ResolutionCache<Option<MojangProfile>>,
    cooldown: CooldownConfig,
    restrict_skin_urls: RestrictSkinUrlsConfig,
    cache_ttl: Duration,
}

/// Cache key for a submitted image URL
fn url_cache_key(image_url: &str, variant: Option<SkinVariant>) -> String {
    match variant {
        Some(v @ (SkinVariant::Classic | SkinVariant::Slim)) => format!("{}#{}", image_url, v),
        Some(SkinVariant::Unknown) | None => image_url.to_string(),
    }
}

impl SkinService {
    pub fn new(
        config: &Config,
        mineskin: MineSkinClient,
        mojang: Arc<MojangClient>,
        store: SkinStore,
        cooldowns: Arc<CooldownTracker>,
    ) -> Self {
        Self {
            mineskin,
            mojang,
            store,
            cooldowns,
            url_cache: ResolutionCache::new("skin urls"),
            profile_cache: ResolutionCache::new("profiles"),
            cooldown: config.cooldown.clone(),
            restrict_skin_urls: config.restrict_skin_urls.clone(),
            cache_ttl: config.cache.ttl(),
        }
    }

    pub fn store(&self) -> &SkinStore {
        &self.store
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// Set a player's skin from an image URL
    pub async fn set_skin_from_url(
        &self,
        player: Uuid,
        image_url: &str,
        variant: Option<SkinVariant>,
        bypass_cooldown: bool,
    ) -> AppResult<SkinRecord> {
        self.with_cooldown(player, bypass_cooldown, async {
            let (property, variant) = self.resolve_url(image_url, variant).await?;
            self.store.put_record(&player.to_string(), property, variant).await
        })
        .await
    }

    /// Copy the current skin of a premium account
    pub async fn set_skin_from_player(
        &self,
        player: Uuid,
        name: &str,
        bypass_cooldown: bool,
    ) -> AppResult<SkinRecord> {
        self.with_cooldown(player, bypass_cooldown, async {
            let property = self.resolve_player(name).await?.property.ok_or_else(|| {
                AppError::NotFound(format!("Player '{}' has no skin", name.trim()))
            })?;
            let variant = property.variant();
            self.store.put_record(&player.to_string(), property, variant).await
        })
        .await
    }

    pub async fn apply_custom_skin(
        &self,
        player: Uuid,
        name: &str,
        bypass_cooldown: bool,
    ) -> AppResult<SkinRecord> {
        self.with_cooldown(player, bypass_cooldown, async {
            self.store.link_custom_skin(&player.to_string(), name).await
        })
        .await
    }

    /// Generate a skin from `image_url` and save it under `name`
    pub async fn create_custom_skin(
        &self,
        name: &str,
        image_url: &str,
        variant: Option<SkinVariant>,
    ) -> AppResult<CustomSkin> {
        // Fail on a bad name before spending a MineSkin request
        let name = validate_key(name)?;
        let (property, _) = self.resolve_url(image_url, variant).await?;
        let skin = self.store.put_custom_skin(&name, property).await?;
        tracing::info!("[SKINS] Created custom skin '{}'", skin.name);
        Ok(skin)
    }

    /// Texture to show for a player, following custom skin links
    pub async fn get_skin(&self, player: Uuid) -> AppResult<Option<TextureProperty>> {
        let Some(record) = self.store.get_record(&player.to_string()).await? else {
            return Ok(None);
        };

        match record.source {
            SkinSource::Property { property } => Ok(Some(property)),
            SkinSource::Custom { name } => match self.store.get_custom_skin(&name).await? {
                Some(skin) => Ok(Some(skin.property)),
                None => {
                    tracing::warn!("[SKINS] {} points at deleted custom skin '{}'", player, name);
                    Ok(None)
                }
            },
        }
    }

    pub async fn clear_skin(&self, player: Uuid) -> AppResult<bool> {
        self.store.remove_record(&player.to_string()).await
    }

    /// Resolve an image URL through the cache, then MineSkin
    pub async fn resolve_url(
        &self,
        image_url: &str,
        variant: Option<SkinVariant>,
    ) -> AppResult<(TextureProperty, SkinVariant)> {
        let validated = validate_skin_url(image_url, &self.restrict_skin_urls)?;
        let submitted = self.mineskin.resolve_url(validated.as_str());
        let key = url_cache_key(&submitted, variant);

        let property = match self.url_cache.get(&key).await {
            Some(property) => property,
            None => {
                let generated = self.mineskin.generate(&submitted, variant).await?;
                self.url_cache
                    .put(&key, generated.property.clone(), self.cache_ttl)
                    .await;
                generated.property
            }
        };

        let variant = match variant {
            Some(v @ (SkinVariant::Classic | SkinVariant::Slim)) => v,
            Some(SkinVariant::Unknown) | None => property.variant(),
        };
        Ok((property, variant))
    }

    /// Resolve a player name through the cache, then Mojang.
    /// Unknown names are cached too.
    pub async fn resolve_player(&self, name: &str) -> AppResult<MojangProfile> {
        let key = name.trim().to_lowercase();

        let cached = match self.profile_cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let resolved = match self.mojang.resolve(&key).await {
                    Ok(profile) => Some(profile),
                    Err(AppError::NotFound(_)) => None,
                    Err(e) => return Err(e),
                };
                self.profile_cache.put(&key, resolved.clone(), self.cache_ttl).await;
                resolved
            }
        };

        cached.ok_or_else(|| AppError::NotFound(format!("Player '{}' does not exist", name.trim())))
    }

    /// Periodic housekeeping for cooldowns and caches
    pub async fn sweep(&self) {
        let cooldowns = self.cooldowns.cleanup();
        let urls = self.url_cache.cleanup_expired().await;
        let profiles = self.profile_cache.cleanup_expired().await;
        tracing::debug!(
            "[SKINS] Sweep removed {} cooldowns, {} url and {} profile cache entries",
            cooldowns,
            urls,
            profiles
        );
    }

    pub async fn clear_caches(&self) {
        self.url_cache.clear_all().await;
        self.profile_cache.clear_all().await;
    }

    /// Run a skin change under the player's cooldown. Success starts the
    /// normal cooldown, failure the short error cooldown.
    async fn with_cooldown<F>(&self, player: Uuid, bypass: bool, change: F) -> AppResult<SkinRecord>
    where
        F: Future<Output = AppResult<SkinRecord>>,
    {
        if !bypass {
            let hold = if self.cooldown.seconds == 0 && self.cooldown.error_seconds == 0 {
                0
            } else {
                IN_FLIGHT_HOLD_SECS
                    .max(self.cooldown.seconds)
                    .max(self.cooldown.error_seconds)
            };
            self.cooldowns
                .try_acquire(player, hold)
                .map_err(|remaining_seconds| AppError::Cooldown { remaining_seconds })?;
        }

        let result = change.await;

        if !bypass {
            let seconds = match &result {
                Ok(_) => self.cooldown.seconds,
                Err(_) => self.cooldown.error_seconds,
            };
            self.cooldowns.mark_used(player, seconds);
        }

        match &result {
            Ok(record) => tracing::info!("[SKINS] Updated skin of {}", record.owner),
            Err(e) => tracing::debug!("[SKINS] Skin change for {} failed: {}", player, e),
        }
        result
    }
}
