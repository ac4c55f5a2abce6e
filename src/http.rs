//! Outbound HTTP transport
//!
//! One request in, one response out. Retrying is left to the resolvers.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// How a request or response body is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Form,
    Json,
}

impl BodyType {
    fn content_type(&self) -> &'static str {
        match self {
            BodyType::Form => "application/x-www-form-urlencoded",
            BodyType::Json => "application/json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestBody {
    pub content: String,
    pub body_type: BodyType,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub endpoint: String,
    pub body: Option<RequestBody>,
    pub accept: BodyType,
    pub user_agent: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(endpoint: impl Into<String>, user_agent: &str, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            body: None,
            accept: BodyType::Json,
            user_agent: user_agent.to_string(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            timeout,
        }
    }

    pub fn post_form(
        endpoint: impl Into<String>,
        form: String,
        user_agent: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            body: Some(RequestBody {
                content: form,
                body_type: BodyType::Form,
            }),
            accept: BodyType::Json,
            user_agent: user_agent.to_string(),
            method: HttpMethod::Post,
            headers: Vec::new(),
            timeout,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Parse the body, an unreadable body counts as a transport failure
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_str(&self.body).map_err(|e| {
            TransportError(format!(
                "Failed to parse response body (status {}): {}",
                self.status, e
            ))
        })
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// reqwest-backed transport shared by every resolver
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with connect timeout to prevent hanging requests
    pub fn build_client(user_agent: &str, connect_timeout: Duration) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.endpoint),
            HttpMethod::Post => self.client.post(&request.endpoint),
        };

        // Covers connect and the whole round trip
        builder = builder
            .timeout(request.timeout)
            .header("User-Agent", &request.user_agent)
            .header("Accept", request.accept.content_type());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body {
            builder = builder
                .header("Content-Type", body.body_type.content_type())
                .body(body.content);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(format!("Request to {} failed: {}", request.endpoint, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("Failed to read response from {}: {}", request.endpoint, e)))?;

        tracing::trace!("[HTTP] {} -> {}", request.endpoint, status);

        Ok(HttpResponse { status, body })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> ReqwestTransport {
        ReqwestTransport::new(
            ReqwestTransport::build_client("skinvault-test", Duration::from_secs(5)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_post_form_sends_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate/url"))
            .and(header("Content-Type", "application/x-www-form-urlencoded"))
            .and(header("Authorization", "Bearer secret"))
            .and(header("User-Agent", "skinvault/test"))
            .and(body_string("url=https%3A%2F%2Fexample.com%2Fa.png"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .mount(&server)
            .await;

        let request = HttpRequest::post_form(
            format!("{}/generate/url", server.uri()),
            "url=https%3A%2F%2Fexample.com%2Fa.png".to_string(),
            "skinvault/test",
            Duration::from_secs(5),
        )
        .header("Authorization", "Bearer secret");

        let response = transport().execute(request).await.unwrap();
        assert_eq!(response.status, 200);

        #[derive(serde::Deserialize)]
        struct Payload {
            ok: bool,
        }
        assert!(response.body_as::<Payload>().unwrap().ok);
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string(r#"{"delay":3}"#))
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri(), "skinvault/test", Duration::from_secs(5));
        let response = transport().execute(request).await.unwrap();
        assert_eq!(response.status, 429);
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let request = HttpRequest::get(server.uri(), "skinvault/test", Duration::from_millis(200));
        assert!(transport().execute(request).await.is_err());
    }

    #[test]
    fn test_unparseable_body() {
        let response = HttpResponse {
            status: 200,
            body: "<html>".to_string(),
        };
        assert!(response.body_as::<serde_json::Value>().is_err());
    }
}
