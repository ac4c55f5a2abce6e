use crate::config::MojangConfig;
use crate::error::{AppError, AppResult};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::skins::TextureProperty;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

const MAX_TRANSPORT_TRIES: u32 = 3;

static PLAYER_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_]{1,16}$").expect("Invalid player name regex"));

/// Name lookup response from the Mojang API
#[derive(Debug, Deserialize)]
struct NameLookupResponse {
    id: String,
    name: String,
}

/// Session server profile
#[derive(Debug, Deserialize)]
struct SessionProfileResponse {
    #[serde(default)]
    properties: Vec<ProfileProperty>,
}

#[derive(Debug, Deserialize)]
struct ProfileProperty {
    name: String,
    value: String,
    signature: Option<String>,
}

/// Canonical player identity with its current skin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MojangProfile {
    pub uuid: Uuid,
    pub name: String,
    pub property: Option<TextureProperty>,
}

/// Looks up premium accounts on the official Mojang services
pub struct MojangClient {
    transport: Arc<dyn HttpTransport>,
    config: MojangConfig,
    user_agent: String,
}

impl MojangClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: MojangConfig, user_agent: &str) -> Self {
        Self {
            transport,
            config,
            user_agent: format!("{}/MojangAPI", user_agent),
        }
    }

    pub fn is_valid_name(name: &str) -> bool {
        PLAYER_NAME_REGEX.is_match(name)
    }

    /// Resolve a player name to its identity and skin
    ///
    /// Returns `AppError::NotFound` for names that do not belong to a premium
    /// account, including names that cannot exist.
    pub async fn resolve(&self, name: &str) -> AppResult<MojangProfile> {
        let name = name.trim();
        if !Self::is_valid_name(name) {
            return Err(AppError::NotFound(format!("Player '{}' does not exist", name)));
        }

        let (uuid, name) = self
            .fetch_uuid(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Player '{}' does not exist", name)))?;

        let property = self.fetch_profile(uuid).await?;

        Ok(MojangProfile {
            uuid,
            name,
            property,
        })
    }

    /// Name -> (uuid, correctly cased name)
    pub async fn fetch_uuid(&self, name: &str) -> AppResult<Option<(Uuid, String)>> {
        let url = format!("{}/{}", self.config.profile_endpoint, urlencoding::encode(name));
        let response = self.get(&url).await?;

        match response.status {
            200 => {
                let lookup: NameLookupResponse = response.body_as()?;
                let uuid = Uuid::parse_str(&lookup.id)
                    .map_err(|e| AppError::DataRequest(format!("Mojang returned a bad UUID: {}", e)))?;
                Ok(Some((uuid, lookup.name)))
            }
            204 | 404 => Ok(None),
            status => Err(AppError::DataRequest(format!(
                "Mojang name lookup failed with status {}",
                status
            ))),
        }
    }

    /// Current signed skin of an identity, `None` if it has no skin
    pub async fn fetch_profile(&self, uuid: Uuid) -> AppResult<Option<TextureProperty>> {
        let url = format!(
            "{}/{}?unsigned=false",
            self.config.session_endpoint,
            uuid.simple()
        );
        let response = self.get(&url).await?;

        match response.status {
            200 => {
                let profile: SessionProfileResponse = response.body_as()?;
                Ok(profile
                    .properties
                    .into_iter()
                    .find(|p| p.name == TextureProperty::NAME)
                    .and_then(|p| TextureProperty::new(p.value, p.signature.unwrap_or_default()).ok()))
            }
            204 | 404 => Ok(None),
            status => Err(AppError::DataRequest(format!(
                "Mojang profile lookup failed with status {}",
                status
            ))),
        }
    }

    async fn get(&self, url: &str) -> AppResult<HttpResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_TRANSPORT_TRIES {
            let request = HttpRequest::get(url, &self.user_agent, self.config.timeout());
            match self.transport.execute(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!("[MOJANG] Request failed ({}/{}): {}", attempt, MAX_TRANSPORT_TRIES, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(AppError::from)
            .unwrap_or_else(|| AppError::DataRequest("Mojang request failed".to_string())))
    }
}
