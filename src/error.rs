use thiserror::Error;

/// Failure of a single outbound request: connect error, timeout or an
/// unreadable body. Callers decide whether to retry.
#[derive(Debug, Clone, Error)]
#[error("Transport failure: {0}")]
pub struct TransportError(pub String);

/// Why MineSkin rejected the configured API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyRejection {
    Unregistered,
    ClientNotAllowed,
    OriginNotAllowed,
    AgentNotAllowed,
    Unknown,
}

impl ApiKeyRejection {
    pub fn from_message(message: &str) -> Self {
        match message {
            "Invalid API Key" => Self::Unregistered,
            "Client not allowed" => Self::ClientNotAllowed,
            "Origin not allowed" => Self::OriginNotAllowed,
            "Agent not allowed" => Self::AgentNotAllowed,
            _ => Self::Unknown,
        }
    }

    /// Operator-facing explanation written to the log
    pub fn diagnostic(&self) -> &'static str {
        match self {
            Self::Unregistered => "The API key is not registered on MineSkin. Clear mineskin.api_key in config.json and restart",
            Self::ClientNotAllowed => "This server's IP is not on the API key's allowed IPs list",
            Self::OriginNotAllowed => "This server's origin is not on the API key's allowed origins list",
            Self::AgentNotAllowed => "The skinvault user agent is not on the API key's allowed agents list",
            Self::Unknown => "Unknown API key rejection reason",
        }
    }
}

/// Terminal MineSkin outcomes. Each one is shown to the player as is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MineSkinError {
    #[error("MineSkin has no free accounts right now, please try again later")]
    ServiceFull,
    #[error("Invalid skin URL, make sure it points directly to a skin image")]
    InvalidSource,
    #[error("The MineSkin API key is invalid")]
    CredentialInvalid(ApiKeyRejection),
    #[error("MineSkin returned an unknown error")]
    UnknownUpstreamFault,
    #[error("MineSkin failed to generate the skin")]
    ServiceExhausted,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Could not reach skin service: {0}")]
    DataRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("You can change your skin again in {remaining_seconds} seconds")]
    Cooldown { remaining_seconds: u64 },

    #[error(transparent)]
    MineSkin(#[from] MineSkinError),
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        AppError::DataRequest(e.0)
    }
}

pub type AppResult<T> = Result<T, AppError>;
