pub mod cache;
pub mod cooldown;
pub mod health;
pub mod mineskin;
pub mod mojang;
pub mod namemc;
pub mod service;

use crate::error::{AppError, AppResult};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Skin variant (Steve vs Alex arm width)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SkinVariant {
    Classic, // Steve (4px arms)
    Slim,    // Alex (3px arms)
    #[default]
    Unknown,
}

impl SkinVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinVariant::Classic => "classic",
            SkinVariant::Slim => "slim",
            SkinVariant::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "classic" | "steve" => SkinVariant::Classic,
            "slim" | "alex" => SkinVariant::Slim,
            _ => SkinVariant::Unknown,
        }
    }
}

impl std::fmt::Display for SkinVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
struct RawTextureProperty {
    value: String,
    signature: String,
}

/// Signed texture payload. Both fields are always present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTextureProperty")]
pub struct TextureProperty {
    value: String,
    signature: String,
}

impl TextureProperty {
    pub const NAME: &'static str = "textures";

    pub fn new(value: impl Into<String>, signature: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let signature = signature.into();
        if value.trim().is_empty() || signature.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "texture property needs both a value and a signature".to_string(),
            ));
        }
        Ok(Self { value, signature })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Read the arm model out of the base64 textures payload
    pub fn variant(&self) -> SkinVariant {
        #[derive(Deserialize)]
        struct Payload {
            textures: Textures,
        }
        #[derive(Deserialize)]
        struct Textures {
            #[serde(rename = "SKIN")]
            skin: Option<SkinTexture>,
        }
        #[derive(Deserialize)]
        struct SkinTexture {
            metadata: Option<Metadata>,
        }
        #[derive(Deserialize)]
        struct Metadata {
            model: Option<String>,
        }

        let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(self.value.trim()) else {
            return SkinVariant::Unknown;
        };
        let Ok(payload) = serde_json::from_slice::<Payload>(&bytes) else {
            return SkinVariant::Unknown;
        };

        match payload.textures.skin {
            Some(skin) => match skin.metadata.and_then(|m| m.model) {
                Some(model) if model.eq_ignore_ascii_case("slim") => SkinVariant::Slim,
                _ => SkinVariant::Classic,
            },
            None => SkinVariant::Unknown,
        }
    }
}

impl TryFrom<RawTextureProperty> for TextureProperty {
    type Error = AppError;

    fn try_from(raw: RawTextureProperty) -> Result<Self, Self::Error> {
        TextureProperty::new(raw.value, raw.signature)
    }
}

/// What a player record resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SkinSource {
    Property { property: TextureProperty },
    Custom { name: String },
}

/// Last skin chosen by a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinRecord {
    pub owner: String,
    pub source: SkinSource,
    pub variant: SkinVariant,
    pub last_updated: DateTime<Utc>,
}

impl SkinRecord {
    pub fn with_property(owner: &str, property: TextureProperty, variant: SkinVariant) -> Self {
        Self {
            owner: normalize_key(owner),
            source: SkinSource::Property { property },
            variant,
            last_updated: Utc::now(),
        }
    }

    pub fn with_custom(owner: &str, name: &str, variant: SkinVariant) -> Self {
        Self {
            owner: normalize_key(owner),
            source: SkinSource::Custom {
                name: normalize_key(name),
            },
            variant,
            last_updated: Utc::now(),
        }
    }

    /// Embedded property, if the record does not point at a custom skin
    pub fn property(&self) -> Option<&TextureProperty> {
        match &self.source {
            SkinSource::Property { property } => Some(property),
            SkinSource::Custom { .. } => None,
        }
    }
}

/// Named skin created by an administrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSkin {
    pub name: String,
    pub property: TextureProperty,
    pub last_updated: DateTime<Utc>,
}

impl CustomSkin {
    pub fn new(name: &str, property: TextureProperty) -> Self {
        Self {
            name: normalize_key(name),
            property,
            last_updated: Utc::now(),
        }
    }
}

/// One page of custom skins ordered by name
#[derive(Debug, Clone, Serialize)]
pub struct CustomSkinPage {
    pub skins: Vec<CustomSkin>,
    pub offset: usize,
    pub has_more: bool,
}

/// Player identities and custom skin names are case-insensitive.
/// They are stored lowercase so "Cool" and "cool" are the same entry.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Keys double as file names in the file backend
pub fn validate_key(key: &str) -> AppResult<String> {
    static KEY_REGEX: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r"^[a-z0-9_][a-z0-9_.-]{0,63}$").expect("Invalid key regex")
    });

    let key = normalize_key(key);
    if !KEY_REGEX.is_match(&key) {
        return Err(AppError::InvalidInput(format!("invalid name '{}'", key)));
    }
    Ok(key)
}
