use super::StorageAdapter;
use crate::error::{AppError, AppResult};
use crate::skins::{CustomSkin, SkinRecord, SkinSource, SkinVariant, TextureProperty};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

#[derive(FromRow)]
struct PlayerRow {
    identity: String,
    value: Option<String>,
    signature: Option<String>,
    custom_skin: Option<String>,
    variant: String,
    last_updated: String,
}

#[derive(FromRow)]
struct CustomSkinRow {
    name: String,
    value: String,
    signature: String,
    last_updated: String,
}

fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Storage(format!("Bad timestamp '{}': {}", value, e)))
}

impl TryFrom<PlayerRow> for SkinRecord {
    type Error = AppError;

    fn try_from(row: PlayerRow) -> AppResult<Self> {
        let source = match (row.value, row.signature, row.custom_skin) {
            (Some(value), Some(signature), None) => SkinSource::Property {
                property: TextureProperty::new(value, signature)?,
            },
            (None, None, Some(name)) => SkinSource::Custom { name },
            _ => {
                return Err(AppError::Storage(format!(
                    "Player row '{}' is inconsistent",
                    row.identity
                )))
            }
        };

        Ok(SkinRecord {
            owner: row.identity,
            source,
            variant: SkinVariant::parse(&row.variant),
            last_updated: parse_timestamp(&row.last_updated)?,
        })
    }
}

impl TryFrom<CustomSkinRow> for CustomSkin {
    type Error = AppError;

    fn try_from(row: CustomSkinRow) -> AppResult<Self> {
        Ok(CustomSkin {
            name: row.name,
            property: TextureProperty::new(row.value, row.signature)?,
            last_updated: parse_timestamp(&row.last_updated)?,
        })
    }
}

/// SQLite backend on a pooled connection
pub struct SqlStorage {
    db: SqlitePool,
}

impl SqlStorage {
    /// Connect and create the tables. Failing here must stop startup.
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let db = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await?;

        Self::run_migrations(&db).await?;
        tracing::debug!("[STORAGE] Connected to database");

        Ok(Self { db })
    }

    async fn run_migrations(db: &SqlitePool) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sr_players (
                identity TEXT PRIMARY KEY COLLATE NOCASE,
                value TEXT,
                signature TEXT,
                custom_skin TEXT COLLATE NOCASE,
                variant TEXT NOT NULL DEFAULT 'unknown',
                last_updated TEXT NOT NULL,
                CHECK ((value IS NULL) = (signature IS NULL)),
                CHECK ((value IS NULL) <> (custom_skin IS NULL))
            );
        "#,
        )
        .execute(db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sr_custom_skins (
                name TEXT PRIMARY KEY COLLATE NOCASE,
                value TEXT NOT NULL,
                signature TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );
        "#,
        )
        .execute(db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqlStorage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get_record(&self, identity: &str) -> AppResult<Option<SkinRecord>> {
        let row = sqlx::query_as::<_, PlayerRow>(
            "SELECT identity, value, signature, custom_skin, variant, last_updated FROM sr_players WHERE identity = ?",
        )
        .bind(identity)
        .fetch_optional(&self.db)
        .await?;

        row.map(SkinRecord::try_from).transpose()
    }

    async fn put_record(&self, record: &SkinRecord) -> AppResult<()> {
        let (value, signature, custom_skin) = match &record.source {
            SkinSource::Property { property } => {
                (Some(property.value()), Some(property.signature()), None)
            }
            SkinSource::Custom { name } => (None, None, Some(name.as_str())),
        };

        sqlx::query(
            r#"
            INSERT INTO sr_players (identity, value, signature, custom_skin, variant, last_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(identity) DO UPDATE SET
                value = excluded.value,
                signature = excluded.signature,
                custom_skin = excluded.custom_skin,
                variant = excluded.variant,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&record.owner)
        .bind(value)
        .bind(signature)
        .bind(custom_skin)
        .bind(record.variant.as_str())
        .bind(record.last_updated.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn remove_record(&self, identity: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM sr_players WHERE identity = ?")
            .bind(identity)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_custom_skin(&self, name: &str) -> AppResult<Option<CustomSkin>> {
        let row = sqlx::query_as::<_, CustomSkinRow>(
            "SELECT name, value, signature, last_updated FROM sr_custom_skins WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;

        row.map(CustomSkin::try_from).transpose()
    }

    async fn put_custom_skin(&self, skin: &CustomSkin) -> AppResult<()> {
        // The stored name is replaced too so its casing follows the last write
        sqlx::query(
            r#"
            INSERT INTO sr_custom_skins (name, value, signature, last_updated)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                name = excluded.name,
                value = excluded.value,
                signature = excluded.signature,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&skin.name)
        .bind(skin.property.value())
        .bind(skin.property.signature())
        .bind(skin.last_updated.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn remove_custom_skin(&self, name: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM sr_custom_skins WHERE name = ?")
            .bind(name)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_custom_skins(&self, offset: usize, limit: usize) -> AppResult<Vec<CustomSkin>> {
        let rows = sqlx::query_as::<_, CustomSkinRow>(
            "SELECT name, value, signature, last_updated FROM sr_custom_skins ORDER BY name LIMIT ? OFFSET ?",
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(CustomSkin::try_from).collect()
    }
}
