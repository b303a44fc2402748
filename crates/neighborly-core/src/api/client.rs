//! API client for the community-services REST backend.
//!
//! One `ApiClient` serves every domain: the collection path comes from the
//! entity's `Domain`, so `RemoteDataSource<E>` is implemented once for all
//! entity types.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::models::{Domain, Entity, EntityId};
use crate::providers::TokenProvider;

use super::{RemoteDataSource, RemoteError};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s tolerates slow mobile links while failing fast enough for pull-to-refresh.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Path segment for the signed-in user's own records.
const USER_OWNED_SEGMENT: &str = "mine";

/// API client for the community-services backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl ApiClient {
    /// Create a new API client against `base_url` (e.g. `https://api.example.org/v1`).
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            tokens: None,
        })
    }

    /// Source of the bearer token, consulted on every request.
    pub fn set_token_provider(&mut self, tokens: Arc<dyn TokenProvider>) {
        self.tokens = Some(tokens);
    }

    /// Create a new ApiClient with the given token source, sharing the connection pool.
    pub fn with_token_provider(&self, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: Arc::clone(&self.base_url),
            tokens: Some(tokens),
        }
    }

    fn collection_url(&self, domain: Domain) -> String {
        format!("{}/{}", self.base_url, domain.resource())
    }

    pub(crate) fn auth_headers(&self, required: bool) -> Result<header::HeaderMap, RemoteError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        match self.tokens.as_ref().and_then(|t| t.bearer_token()) {
            Some(token) => {
                let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| {
                        RemoteError::InvalidResponse("token is not a valid header value".into())
                    })?;
                headers.insert(header::AUTHORIZATION, value);
            }
            None if required => return Err(RemoteError::MissingCredential),
            None => {}
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, RemoteError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::from_status(status, &body))
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        auth_required: bool,
    ) -> Result<T, RemoteError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.auth_headers(auth_required)?)
                .query(query)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        RemoteError::InvalidResponse(format!(
                            "Failed to parse JSON from {}: {}",
                            url, e
                        ))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(RemoteError::RateLimited);
                    }
                    warn!(
                        url = url,
                        retry = retries,
                        backoff_ms = backoff_ms,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

#[async_trait]
impl<E: Entity> RemoteDataSource<E> for ApiClient {
    async fn list_community(&self, bbox: Option<&str>) -> Result<Vec<E>, RemoteError> {
        let url = self.collection_url(E::DOMAIN);
        let query: Vec<(&str, &str)> = bbox.map(|b| ("bbox", b)).into_iter().collect();
        let items: Vec<E> = self.get(&url, &query, false).await?;
        debug!(
            domain = %E::DOMAIN,
            count = items.len(),
            bbox = ?bbox,
            "Community listing received"
        );
        Ok(items)
    }

    async fn list_user_owned(&self) -> Result<Vec<E>, RemoteError> {
        let url = format!("{}/{}", self.collection_url(E::DOMAIN), USER_OWNED_SEGMENT);
        let items: Vec<E> = self.get(&url, &[], true).await?;
        debug!(domain = %E::DOMAIN, count = items.len(), "User listing received");
        Ok(items)
    }

    async fn get_by_id(&self, id: EntityId) -> Result<E, RemoteError> {
        let url = format!("{}/{}", self.collection_url(E::DOMAIN), id);
        self.get(&url, &[], false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Session, SessionData};
    use crate::providers::StaticToken;

    #[test]
    fn test_collection_url_strips_trailing_slash() {
        let api = ApiClient::new("https://api.example.org/v1/").unwrap();
        assert_eq!(api.collection_url(Domain::Office), "https://api.example.org/v1/offices");
    }

    #[test]
    fn test_auth_headers_require_token_for_user_requests() {
        let api = ApiClient::new("https://api.example.org").unwrap();
        assert!(matches!(api.auth_headers(true), Err(RemoteError::MissingCredential)));
        assert!(api.auth_headers(false).is_ok());

        let authed = api.with_token_provider(Arc::new(StaticToken("abc".to_string())));
        let headers = authed.auth_headers(true).unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[test]
    fn test_token_is_read_at_request_time() {
        let session = Arc::new(Session::in_memory(None));
        let mut api = ApiClient::new("https://api.example.org").unwrap();
        api.set_token_provider(session.clone());
        assert!(matches!(api.auth_headers(true), Err(RemoteError::MissingCredential)));

        session.update(SessionData::new("fresh".to_string(), 5, None));
        let headers = api.auth_headers(true).unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer fresh");

        // Signing out stops the token from being sent at all
        session.clear().unwrap();
        assert!(matches!(api.auth_headers(true), Err(RemoteError::MissingCredential)));
        assert!(api.auth_headers(false).unwrap().get(header::AUTHORIZATION).is_none());
    }
}
