//! Specification fetcher
//!
//! `SpecSource` is the seam between the reload machinery and wherever the
//! OpenAPI document lives. `HttpSpecFetcher` is the production source.

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

use super::document::SpecDocument;
use crate::core::FetchError;

/// SHA-256 of the raw document body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> String {
        let mut hex = self.to_string();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// A parsed document together with the fingerprint of its bytes
#[derive(Debug, Clone)]
pub struct FetchedSpec {
    pub document: SpecDocument,
    pub fingerprint: Fingerprint,
}

impl FetchedSpec {
    /// Parse a raw body and fingerprint it
    pub fn from_body(body: &str) -> Result<Self, FetchError> {
        Ok(Self {
            fingerprint: Fingerprint::of(body.as_bytes()),
            document: SpecDocument::parse(body)?,
        })
    }
}

/// Source of OpenAPI documents
#[async_trait]
pub trait SpecSource: Send + Sync {
    /// Retrieve and parse the current document
    async fn fetch(&self) -> Result<FetchedSpec, FetchError>;

    /// Where the document comes from, for log lines
    fn location(&self) -> &str;
}

/// Fetches the document over HTTP(S)
pub struct HttpSpecFetcher {
    client: Client,
    spec_url: String,
    auth_token: Option<String>,
}

impl HttpSpecFetcher {
    pub fn new(
        spec_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            spec_url: spec_url.into(),
            auth_token,
        })
    }
}

#[async_trait]
impl SpecSource for HttpSpecFetcher {
    async fn fetch(&self) -> Result<FetchedSpec, FetchError> {
        tracing::debug!("[SpecFetcher] GET {}", self.spec_url);

        let mut request = self.client.get(&self.spec_url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            return Err(FetchError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let fetched = FetchedSpec::from_body(&body)?;

        tracing::debug!(
            "[SpecFetcher] Fetched '{}' version {} ({} operations, fingerprint {})",
            fetched.document.title,
            fetched.document.version,
            fetched.document.operations.len(),
            fetched.fingerprint.short()
        );

        Ok(fetched)
    }

    fn location(&self) -> &str {
        &self.spec_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::get,
        Router,
    };
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    const DOC: &str = r#"{
        "openapi": "3.0.0",
        "info": {"title": "Token API", "version": "2.1.0"},
        "paths": {"/health": {"get": {"responses": {"200": {"description": "ok"}}}}}
    }"#;

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_fingerprint_tracks_bytes() {
        let a = Fingerprint::of(b"abc");
        assert_eq!(
            a.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(a.short(), "ba7816bf8f01");
        assert_eq!(a, Fingerprint::of(b"abc"));
        assert_ne!(a, Fingerprint::of(b"abd"));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let seen_auth: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let recorder = seen_auth.clone();
        let addr = serve(Router::new().route(
            "/openapi",
            get(move |headers: HeaderMap| async move {
                *recorder.lock().unwrap() = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                DOC
            }),
        ))
        .await;
        let fetcher = HttpSpecFetcher::new(
            format!("http://{}/openapi", addr),
            Some("token".into()),
            Duration::from_secs(5),
        )
        .unwrap();

        let fetched = fetcher.fetch().await.unwrap();
        assert_eq!(fetched.document.version, "2.1.0");
        assert_eq!(fetched.document.operations.len(), 1);
        assert_eq!(fetched.fingerprint, Fingerprint::of(DOC.as_bytes()));
        assert_eq!(seen_auth.lock().unwrap().as_deref(), Some("Bearer token"));
    }

    #[tokio::test]
    async fn test_fetch_without_token_sends_no_authorization() {
        let seen_auth: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(Some("unset".into())));
        let recorder = seen_auth.clone();
        let addr = serve(Router::new().route(
            "/openapi",
            get(move |headers: HeaderMap| async move {
                *recorder.lock().unwrap() = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                DOC
            }),
        ))
        .await;
        let fetcher =
            HttpSpecFetcher::new(format!("http://{}/openapi", addr), None, Duration::from_secs(5))
                .unwrap();

        fetcher.fetch().await.unwrap();
        assert_eq!(*seen_auth.lock().unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_bad_status() {
        let addr = serve(Router::new().route(
            "/openapi",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        ))
        .await;
        let fetcher =
            HttpSpecFetcher::new(format!("http://{}/openapi", addr), None, Duration::from_secs(5))
                .unwrap();

        match fetcher.fetch().await.unwrap_err() {
            FetchError::BadStatus { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "down");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_malformed_document() {
        let addr = serve(Router::new().route("/openapi", get(|| async { "{not json" }))).await;
        let fetcher =
            HttpSpecFetcher::new(format!("http://{}/openapi", addr), None, Duration::from_secs(5))
                .unwrap();
        assert!(matches!(
            fetcher.fetch().await.unwrap_err(),
            FetchError::Parse(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_unreachable() {
        let fetcher =
            HttpSpecFetcher::new("http://127.0.0.1:9/openapi", None, Duration::from_secs(2))
                .unwrap();
        assert!(matches!(
            fetcher.fetch().await.unwrap_err(),
            FetchError::Network(_)
        ));
    }
}
