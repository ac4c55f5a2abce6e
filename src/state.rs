use crate::config::{Config, StorageBackend};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::skins::cooldown::CooldownTracker;
use crate::skins::health::ServiceChecker;
use crate::skins::mineskin::MineSkinClient;
use crate::skins::mojang::MojangClient;
use crate::skins::namemc::GalleryRewriter;
use crate::skins::service::SkinService;
use crate::storage::file::FileStorage;
use crate::storage::sql::SqlStorage;
use crate::storage::{SkinStore, StorageAdapter};
use std::sync::Arc;
use std::time::Duration;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub skins: SkinService,
    pub mojang: Arc<MojangClient>,
    pub health: ServiceChecker,
}

impl AppState {
    /// Wire every component from `config`. Must run inside a Tokio runtime
    /// since the MineSkin worker is spawned here.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let user_agent = config.http.user_agent.clone();

        // Create HTTP client, per-request timeouts are set by the resolvers
        let http_client = ReqwestTransport::build_client(
            &user_agent,
            Duration::from_secs(config.http.connect_timeout_secs),
        )?;
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(http_client));

        // Exactly one backend for the lifetime of the process
        let adapter: Arc<dyn StorageAdapter> = match config.storage.backend {
            StorageBackend::File => Arc::new(FileStorage::open(&config.storage_path()).await?),
            StorageBackend::Sqlite => Arc::new(
                SqlStorage::connect(&config.database_url(), config.storage.max_connections)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to the database: {}", e))?,
            ),
        };
        let store = SkinStore::new(adapter);

        let mojang = Arc::new(MojangClient::new(
            transport.clone(),
            config.mojang.clone(),
            &user_agent,
        ));
        let mineskin = MineSkinClient::spawn(
            transport.clone(),
            config.mineskin.clone(),
            &user_agent,
            GalleryRewriter::default(),
        );
        let health = ServiceChecker::new(
            mojang.clone(),
            transport,
            &config.mineskin.endpoint,
            &user_agent,
            &config.health,
        );
        let skins = SkinService::new(
            &config,
            mineskin,
            mojang.clone(),
            store,
            Arc::new(CooldownTracker::new()),
        );

        Ok(Self {
            config,
            skins,
            mojang,
            health,
        })
    }

    /// Store the configured default skins, if enabled
    pub async fn preload_default_skins(&self) -> usize {
        if !self.config.default_skins.enabled {
            return 0;
        }
        self.skins
            .store()
            .preload_defaults(&self.config.default_skins.skins, &self.mojang)
            .await
    }

    /// Sweep cooldowns and caches on the configured interval until the
    /// runtime shuts down
    pub fn spawn_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let state = self.clone();
        let period = Duration::from_secs(state.config.cooldown.cleanup_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                state.skins.sweep().await;
            }
        })
    }

    /// Probe the upstream services on the configured interval
    pub fn spawn_health_checks(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.health.enabled {
            return None;
        }
        let state = self.clone();
        let period = Duration::from_secs(state.config.health.interval_secs.max(60));
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                state.health.check_all().await;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skins::SkinVariant;
    use crate::skins::TextureProperty;

    fn config(dir: &std::path::Path, backend: StorageBackend) -> Config {
        let mut config = Config::default();
        config.data_dir = dir.to_path_buf();
        config.storage.backend = backend;
        config
    }

    #[tokio::test]
    async fn test_file_backend_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(config(dir.path(), StorageBackend::File)).await.unwrap();

        assert_eq!(state.skins.store().backend_name(), "file");
        assert!(dir.path().join("storage").join("players").is_dir());
    }

    #[tokio::test]
    async fn test_sqlite_backend_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(config(dir.path(), StorageBackend::Sqlite)).await.unwrap();

        assert_eq!(state.skins.store().backend_name(), "sqlite");
        state
            .skins
            .store()
            .put_record("someone", TextureProperty::new("V", "S").unwrap(), SkinVariant::Slim)
            .await
            .unwrap();
        assert!(dir.path().join("skinvault.db").exists());
    }

    #[tokio::test]
    async fn test_sqlite_connect_failure_stops_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), StorageBackend::Sqlite);
        config.storage.database_url = Some(format!(
            "sqlite:{}",
            dir.path().join("missing/dir/skinvault.db").display()
        ));

        assert!(AppState::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_preload_disabled_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(config(dir.path(), StorageBackend::File)).await.unwrap();
        assert_eq!(state.preload_default_skins().await, 0);
    }
}
