//! MineSkin image conversion
//!
//! Turns an arbitrary image URL into a signed texture. Every request goes
//! through one worker task so at most one call is in flight at a time, which
//! keeps us inside MineSkin's per-key rate limit. Backoff sleeps happen on that
//! worker and therefore also hold back queued requests.

use crate::config::MineSkinConfig;
use crate::error::{AppError, AppResult, MineSkinError};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::skins::namemc::GalleryRewriter;
use crate::skins::{SkinVariant, TextureProperty};
use crate::utils::redact::{redact_error_message, redact_token};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Outer attempts, only "empty" results consume one
const MAX_ATTEMPTS: u32 = 5;
/// Tries per upstream call when the network itself fails
const MAX_TRANSPORT_TRIES: u32 = 3;
/// Rate-limit waits allowed per generation, they do not consume attempts
const MAX_RATE_LIMIT_WAITS: u32 = 10;
const TRANSIENT_RETRY_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(2);
const QUEUE_CAPACITY: usize = 64;

/// Result of a successful generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MineSkinResponse {
    pub property: TextureProperty,
    pub mineskin_id: Option<String>,
    pub requested_variant: Option<SkinVariant>,
    pub detected_variant: SkinVariant,
}

/// What one upstream answer means for the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Generated(MineSkinResponse),
    /// Nothing usable yet, wait and try again
    Empty { wait: Duration, rate_limited: bool },
}

#[derive(Debug, Deserialize)]
struct MineSkinUrlResponse {
    #[serde(rename = "idStr")]
    id_str: Option<String>,
    uuid: Option<String>,
    data: Option<MineSkinData>,
    texture: Option<MineSkinTexture>,
}

#[derive(Debug, Deserialize)]
struct MineSkinData {
    texture: MineSkinTexture,
}

#[derive(Debug, Deserialize)]
struct MineSkinTexture {
    value: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
struct MineSkinErrorResponse {
    error: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(default)]
    errors: Vec<MineSkinErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct MineSkinErrorDetail {
    code: String,
    message: Option<String>,
}

impl MineSkinErrorResponse {
    fn code(&self) -> Option<&str> {
        self.error_code
            .as_deref()
            .or_else(|| self.errors.first().map(|e| e.code.as_str()))
    }

    fn message(&self) -> &str {
        self.error
            .as_deref()
            .or_else(|| self.errors.first().and_then(|e| e.message.as_deref()))
            .unwrap_or("")
    }
}

#[derive(Debug, Default, Deserialize)]
struct MineSkinDelayResponse {
    /// Seconds to wait
    delay: Option<u64>,
    /// Epoch second of the next allowed request
    #[serde(rename = "nextRequest")]
    next_request: Option<i64>,
}

/// Interpret one MineSkin response without doing any I/O
pub fn classify_response(
    response: &HttpResponse,
    requested_variant: Option<SkinVariant>,
    now: DateTime<Utc>,
) -> AppResult<ResolutionOutcome> {
    match response.status {
        200 => {
            let parsed: MineSkinUrlResponse = response.body_as()?;
            let texture = parsed
                .data
                .map(|d| d.texture)
                .or(parsed.texture)
                .ok_or_else(|| AppError::DataRequest("MineSkin response had no texture".to_string()))?;
            let property = TextureProperty::new(texture.value, texture.signature)
                .map_err(|e| AppError::DataRequest(format!("MineSkin returned a bad texture: {}", e)))?;
            let detected_variant = property.variant();

            Ok(ResolutionOutcome::Generated(MineSkinResponse {
                property,
                mineskin_id: parsed.id_str.or(parsed.uuid),
                requested_variant,
                detected_variant,
            }))
        }
        400 | 500 => {
            let error: MineSkinErrorResponse = response.body_as()?;
            let code = error.code().unwrap_or_default();
            tracing::debug!("[MINESKIN] Failed with status {}: {} ({})", response.status, code, error.message());

            match code {
                "failed_to_create_id" | "skin_change_failed" => Ok(ResolutionOutcome::Empty {
                    wait: TRANSIENT_RETRY_DELAY,
                    rate_limited: false,
                }),
                "no_account_available" => Err(MineSkinError::ServiceFull.into()),
                _ => Err(MineSkinError::InvalidSource.into()),
            }
        }
        403 => {
            let error: MineSkinErrorResponse = response.body_as()?;
            if error.code() == Some("invalid_api_key") {
                let reason = crate::error::ApiKeyRejection::from_message(error.message());
                return Err(MineSkinError::CredentialInvalid(reason).into());
            }
            Err(MineSkinError::UnknownUpstreamFault.into())
        }
        429 => {
            // A missing or odd body still means "slow down"
            let delay: MineSkinDelayResponse = serde_json::from_str(&response.body).unwrap_or_default();
            let wait = if let Some(seconds) = delay.delay {
                Duration::from_secs(seconds)
            } else if let Some(next_request) = delay.next_request {
                Duration::from_secs(next_request.saturating_sub(now.timestamp()).max(0) as u64)
            } else {
                DEFAULT_RATE_LIMIT_DELAY
            };

            Ok(ResolutionOutcome::Empty {
                wait,
                rate_limited: true,
            })
        }
        status => {
            tracing::debug!("[MINESKIN] Unexpected status {}", status);
            Err(MineSkinError::ServiceExhausted.into())
        }
    }
}

/// Form body for `/generate/url`
fn build_form(image_url: &str, variant: Option<SkinVariant>) -> String {
    let mut form = format!("url={}", urlencoding::encode(image_url));
    match variant {
        Some(SkinVariant::Classic) => form.push_str("&variant=classic"),
        Some(SkinVariant::Slim) => form.push_str("&variant=slim"),
        Some(SkinVariant::Unknown) | None => {}
    }
    form
}

struct GenerateJob {
    image_url: String,
    variant: Option<SkinVariant>,
    reply: oneshot::Sender<AppResult<MineSkinResponse>>,
}

/// Handle to the MineSkin worker. Cheap to clone.
#[derive(Clone)]
pub struct MineSkinClient {
    sender: mpsc::Sender<GenerateJob>,
    rewriter: GalleryRewriter,
}

impl MineSkinClient {
    /// Start the worker on the current runtime
    pub fn spawn(
        transport: Arc<dyn HttpTransport>,
        config: MineSkinConfig,
        user_agent: &str,
        rewriter: GalleryRewriter,
    ) -> Self {
        match config.api_key() {
            Some(key) => tracing::info!("[MINESKIN] Using API key {}", redact_token(key)),
            None => tracing::info!("[MINESKIN] No API key configured, requests are unauthenticated"),
        }

        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let worker = MineSkinWorker {
            transport,
            config,
            user_agent: format!("{}/MineSkinAPI", user_agent),
        };
        tokio::spawn(worker.run(receiver));

        Self { sender, rewriter }
    }

    /// URL that will actually be submitted for `image_url`
    pub fn resolve_url(&self, image_url: &str) -> String {
        self.rewriter.rewrite(image_url)
    }

    /// Generate a texture for an image URL, waiting for the worker
    pub async fn generate(
        &self,
        image_url: &str,
        variant: Option<SkinVariant>,
    ) -> AppResult<MineSkinResponse> {
        let (reply, response) = oneshot::channel();
        let job = GenerateJob {
            image_url: self.resolve_url(image_url),
            variant,
            reply,
        };

        self.sender
            .send(job)
            .await
            .map_err(|_| AppError::DataRequest("MineSkin worker is not running".to_string()))?;

        response
            .await
            .map_err(|_| AppError::DataRequest("MineSkin worker dropped the request".to_string()))?
    }
}

struct MineSkinWorker {
    transport: Arc<dyn HttpTransport>,
    config: MineSkinConfig,
    user_agent: String,
}

impl MineSkinWorker {
    async fn run(self, mut receiver: mpsc::Receiver<GenerateJob>) {
        while let Some(job) = receiver.recv().await {
            let result = self.generate(&job.image_url, job.variant).await;
            // Caller may have gone away, nothing to do then
            let _ = job.reply.send(result);
        }
        tracing::debug!("[MINESKIN] Worker stopped");
    }

    async fn generate(
        &self,
        image_url: &str,
        variant: Option<SkinVariant>,
    ) -> AppResult<MineSkinResponse> {
        let form = build_form(image_url, variant);
        let mut attempts = 0;
        let mut rate_limit_waits = 0;

        while attempts < MAX_ATTEMPTS {
            let response = self.query_url(&form).await?;
            tracing::debug!("[MINESKIN] Response {} for {}", response.status, image_url);

            match classify_response(&response, variant, Utc::now()) {
                Ok(ResolutionOutcome::Generated(generated)) => {
                    tracing::info!("[MINESKIN] Generated skin for {}", image_url);
                    return Ok(generated);
                }
                Ok(ResolutionOutcome::Empty { wait, rate_limited }) => {
                    if rate_limited {
                        rate_limit_waits += 1;
                        if rate_limit_waits > MAX_RATE_LIMIT_WAITS {
                            tracing::warn!("[MINESKIN] Still rate limited after {} waits", MAX_RATE_LIMIT_WAITS);
                            break;
                        }
                        tracing::debug!("[MINESKIN] Rate limited, waiting {:?}", wait);
                    } else {
                        attempts += 1;
                        if attempts >= MAX_ATTEMPTS {
                            break;
                        }
                        tracing::debug!("[MINESKIN] Trying again in {:?} ({}/{})", wait, attempts, MAX_ATTEMPTS);
                    }

                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                }
                Err(AppError::MineSkin(MineSkinError::CredentialInvalid(reason))) => {
                    tracing::error!("[MINESKIN] The configured API key was rejected: {}", reason.diagnostic());
                    return Err(MineSkinError::CredentialInvalid(reason).into());
                }
                Err(e) => {
                    tracing::debug!("[MINESKIN] Failed for {}: {}", image_url, e);
                    return Err(e);
                }
            }
        }

        Err(MineSkinError::ServiceExhausted.into())
    }

    async fn query_url(&self, form: &str) -> AppResult<HttpResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_TRANSPORT_TRIES {
            let mut request = HttpRequest::post_form(
                self.config.endpoint.as_str(),
                form.to_string(),
                &self.user_agent,
                self.config.timeout(),
            );
            if let Some(key) = self.config.api_key() {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match self.transport.execute(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(
                        "[MINESKIN] Request failed ({}/{}): {}",
                        attempt,
                        MAX_TRANSPORT_TRIES,
                        redact_error_message(&e.0)
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .map(AppError::from)
            .unwrap_or_else(|| AppError::DataRequest("MineSkin request failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiKeyRejection;
    use crate::http::scripted::ScriptedTransport;
    use crate::skins::namemc::GalleryRule;

    const SUCCESS: &str = r#"{"idStr":"abc","data":{"texture":{"value":"V","signature":"S"}}}"#;
    const TRANSIENT: &str = r#"{"error":"Failed to create id","errorCode":"failed_to_create_id"}"#;

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            body: body.to_string(),
        }
    }

    fn classify(status: u16, body: &str) -> AppResult<ResolutionOutcome> {
        classify_response(&response(status, body), None, Utc::now())
    }

    fn client(transport: Arc<ScriptedTransport>, api_key: &str) -> MineSkinClient {
        let config = MineSkinConfig {
            api_key: api_key.to_string(),
            ..MineSkinConfig::default()
        };
        MineSkinClient::spawn(transport, config, "skinvault/test", GalleryRewriter::default())
    }

    // ============= Classification =============

    #[test]
    fn test_classify_success() {
        let outcome = classify(200, SUCCESS).unwrap();
        let ResolutionOutcome::Generated(generated) = outcome else {
            panic!("expected a generated skin");
        };
        assert_eq!(generated.property, TextureProperty::new("V", "S").unwrap());
        assert_eq!(generated.mineskin_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_classify_success_top_level_texture() {
        let outcome = classify(200, r#"{"texture":{"value":"V","signature":"S"}}"#).unwrap();
        assert!(matches!(outcome, ResolutionOutcome::Generated(g) if g.property.value() == "V"));
    }

    #[test]
    fn test_classify_success_without_texture() {
        assert!(matches!(classify(200, r#"{"idStr":"abc"}"#), Err(AppError::DataRequest(_))));
        assert!(matches!(classify(200, "<html>"), Err(AppError::DataRequest(_))));
    }

    #[test]
    fn test_classify_transient_codes() {
        for status in [400, 500] {
            for code in ["failed_to_create_id", "skin_change_failed"] {
                let body = format!(r#"{{"errorCode":"{}"}}"#, code);
                assert_eq!(
                    classify(status, &body).unwrap(),
                    ResolutionOutcome::Empty {
                        wait: TRANSIENT_RETRY_DELAY,
                        rate_limited: false
                    }
                );
            }
        }
    }

    #[test]
    fn test_classify_terminal_codes() {
        assert!(matches!(
            classify(500, r#"{"errorCode":"no_account_available"}"#),
            Err(AppError::MineSkin(MineSkinError::ServiceFull))
        ));
        assert!(matches!(
            classify(400, r#"{"errorCode":"invalid_image"}"#),
            Err(AppError::MineSkin(MineSkinError::InvalidSource))
        ));
        assert!(matches!(
            classify(400, r#"{"errors":[{"code":"no_account_available","message":"full"}]}"#),
            Err(AppError::MineSkin(MineSkinError::ServiceFull))
        ));
        assert!(matches!(
            classify(502, ""),
            Err(AppError::MineSkin(MineSkinError::ServiceExhausted))
        ));
    }

    #[test]
    fn test_classify_forbidden() {
        assert!(matches!(
            classify(403, r#"{"errorCode":"invalid_api_key","error":"Origin not allowed"}"#),
            Err(AppError::MineSkin(MineSkinError::CredentialInvalid(ApiKeyRejection::OriginNotAllowed)))
        ));
        assert!(matches!(
            classify(403, r#"{"errorCode":"banned"}"#),
            Err(AppError::MineSkin(MineSkinError::UnknownUpstreamFault))
        ));
    }

    #[test]
    fn test_classify_rate_limit() {
        let now = Utc::now();
        let with_delay = classify_response(&response(429, r#"{"delay":7}"#), None, now).unwrap();
        assert_eq!(
            with_delay,
            ResolutionOutcome::Empty {
                wait: Duration::from_secs(7),
                rate_limited: true
            }
        );

        let next = format!(r#"{{"nextRequest":{}}}"#, now.timestamp() + 4);
        let with_next = classify_response(&response(429, &next), None, now).unwrap();
        assert!(matches!(with_next, ResolutionOutcome::Empty { wait, .. } if wait == Duration::from_secs(4)));

        let past = format!(r#"{{"nextRequest":{}}}"#, now.timestamp() - 30);
        let with_past = classify_response(&response(429, &past), None, now).unwrap();
        assert!(matches!(with_past, ResolutionOutcome::Empty { wait, .. } if wait.is_zero()));

        let fallback = classify_response(&response(429, ""), None, now).unwrap();
        assert!(matches!(fallback, ResolutionOutcome::Empty { wait, .. } if wait == DEFAULT_RATE_LIMIT_DELAY));
    }

    #[test]
    fn test_build_form() {
        assert_eq!(
            build_form("https://a.b/c d.png", None),
            "url=https%3A%2F%2Fa.b%2Fc%20d.png"
        );
        assert_eq!(
            build_form("https://a.b/c.png", Some(SkinVariant::Slim)),
            "url=https%3A%2F%2Fa.b%2Fc.png&variant=slim"
        );
        assert_eq!(
            build_form("https://a.b/c.png", Some(SkinVariant::Unknown)),
            "url=https%3A%2F%2Fa.b%2Fc.png"
        );
    }

    // ============= Worker =============

    #[tokio::test(start_paused = true)]
    async fn test_generate_success() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, SUCCESS));
        let client = client(transport.clone(), "key");

        let generated = client.generate("https://i.imgur.com/a.png", None).await.unwrap();
        assert_eq!(generated.property.signature(), "S");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.iter().all(|(name, _)| name != "Authorization"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_sends_bearer_key() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, SUCCESS));
        let client = client(transport.clone(), "abc123");

        client.generate("https://i.imgur.com/a.png", None).await.unwrap();

        let requests = transport.requests();
        assert!(requests[0]
            .headers
            .contains(&("Authorization".to_string(), "Bearer abc123".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_rewrites_gallery_page() {
        let transport = Arc::new(ScriptedTransport::new().respond(200, SUCCESS));
        let rewriter = GalleryRewriter::new(vec![GalleryRule::new(
            "https://gallery.example/skin/",
            "https://img.example/i/{id}.png",
        )]);
        let client = MineSkinClient::spawn(
            transport.clone(),
            MineSkinConfig::default(),
            "skinvault/test",
            rewriter,
        );

        client.generate("https://gallery.example/skin/ABC123", None).await.unwrap();

        let body = transport.requests()[0].body.clone().unwrap().content;
        assert_eq!(body, "url=https%3A%2F%2Fimg.example%2Fi%2FABC123.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_empty_results_exhaust() {
        let mut transport = ScriptedTransport::new();
        for _ in 0..6 {
            transport = transport.respond(500, TRANSIENT);
        }
        let transport = Arc::new(transport);
        let client = client(transport.clone(), "key");

        let result = client.generate("https://i.imgur.com/a.png", None).await;
        assert!(matches!(result, Err(AppError::MineSkin(MineSkinError::ServiceExhausted))));
        assert_eq!(transport.request_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_full_is_immediate() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(400, r#"{"errorCode":"no_account_available"}"#)
                .respond(200, SUCCESS),
        );
        let client = client(transport.clone(), "key");

        let result = client.generate("https://i.imgur.com/a.png", None).await;
        assert!(matches!(result, Err(AppError::MineSkin(MineSkinError::ServiceFull))));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_and_does_not_count() {
        let mut transport = ScriptedTransport::new();
        for _ in 0..4 {
            transport = transport.respond(500, TRANSIENT);
        }
        let transport = Arc::new(
            transport
                .respond(429, r#"{"delay":7}"#)
                .respond(200, SUCCESS),
        );
        let client = client(transport.clone(), "key");

        let started = tokio::time::Instant::now();
        let generated = client.generate("https://i.imgur.com/a.png", None).await;

        assert!(generated.is_ok());
        assert_eq!(transport.request_count(), 6);
        // 4 transient waits plus the explicit delay
        assert!(started.elapsed() >= TRANSIENT_RETRY_DELAY * 4 + Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_are_capped() {
        let mut transport = ScriptedTransport::new();
        for _ in 0..=MAX_RATE_LIMIT_WAITS {
            transport = transport.respond(429, r#"{"delay":1}"#);
        }
        let transport = Arc::new(transport.respond(200, SUCCESS));
        let client = client(transport.clone(), "key");

        let result = client.generate("https://i.imgur.com/a.png", None).await;

        assert!(matches!(result, Err(AppError::MineSkin(MineSkinError::ServiceExhausted))));
        assert_eq!(transport.request_count(), MAX_RATE_LIMIT_WAITS as usize + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_delay_is_honoured() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(429, r#"{"delay":12}"#)
                .respond(200, SUCCESS),
        );
        let client = client(transport.clone(), "key");

        let started = tokio::time::Instant::now();
        client.generate("https://i.imgur.com/a.png", None).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retried_three_times() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .fail("connection reset")
                .fail("connection reset")
                .respond(200, SUCCESS),
        );
        let client = client(transport.clone(), "key");
        assert!(client.generate("https://i.imgur.com/a.png", None).await.is_ok());
        assert_eq!(transport.request_count(), 3);

        let transport = Arc::new(
            ScriptedTransport::new()
                .fail("timeout")
                .fail("timeout")
                .fail("timeout")
                .respond(200, SUCCESS),
        );
        let client = self::client(transport.clone(), "key");
        let result = client.generate("https://i.imgur.com/a.png", None).await;
        assert!(matches!(result, Err(AppError::DataRequest(_))));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_api_key_is_terminal() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(403, r#"{"errorCode":"invalid_api_key","error":"Invalid API Key"}"#),
        );
        let client = client(transport.clone(), "abc123");

        let result = client.generate("https://i.imgur.com/a.png", None).await;
        assert!(matches!(
            result,
            Err(AppError::MineSkin(MineSkinError::CredentialInvalid(ApiKeyRejection::Unregistered)))
        ));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_serialized() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(429, r#"{"delay":10}"#)
                .respond(200, SUCCESS)
                .respond(200, SUCCESS),
        );
        let client = client(transport.clone(), "key");

        let first = client.generate("https://i.imgur.com/first.png", None);
        let second = client.generate("https://i.imgur.com/second.png", None);
        let (a, b) = tokio::join!(first, second);
        assert!(a.is_ok() && b.is_ok());

        // The second job only starts after the first one finished its backoff
        let bodies: Vec<String> = transport
            .requests()
            .into_iter()
            .map(|r| r.body.unwrap().content)
            .collect();
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0], bodies[1]);
        assert_ne!(bodies[1], bodies[2]);
    }
}
