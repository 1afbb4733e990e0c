//! HTTP client for the Pipes API
//!
//! One attempt per call. Retry is layered on top by [`execute_with_retry`]
//! (single resources) and the paginator (listings).

use std::marker::PhantomData;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::PipesConfig;
use crate::error::ConnectorError;
use crate::models::User;
use crate::paginate::{Page, PageRequest};
use crate::resilience::{RetryPolicy, execute_with_retry};
use crate::traits::PageSource;

const USER_AGENT: &str = concat!("pipes-connector/", env!("CARGO_PKG_VERSION"));

/// Retry-After used when a 429 response carries none
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Longest error body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Authenticated Pipes API client
#[derive(Debug, Clone)]
pub struct PipesClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl PipesClient {
    /// Create a client for `base_url` (e.g. https://pipes.turbot.com/api/v0)
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client creation fails (e.g., TLS misconfiguration)
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConnectorError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Init(format!("Pipes HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    /// Create a client from config, resolving token and host from the environment
    ///
    /// # Errors
    ///
    /// Returns error if no token is configured, the host is invalid or the
    /// HTTP client cannot be built
    pub fn from_config(config: &PipesConfig) -> Result<Self, ConnectorError> {
        Self::from_config_with(config, |name| std::env::var(name).ok())
    }

    /// Create a client from config, using `env` for variable lookups
    pub fn from_config_with(
        config: &PipesConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConnectorError> {
        let token = config.resolve_token_with(&env)?;
        let base_url = config.api_base_url_with(&env)?;
        Self::new(base_url, token, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an authenticated GET request for an API path
    fn build_request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.get(url).bearer_auth(&self.token)
    }

    /// Map a non-success response to an error
    async fn handle_error_status(response: reqwest::Response, entity: &str) -> ConnectorError {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = error_body(response).await;

        match status {
            reqwest::StatusCode::NOT_FOUND => ConnectorError::NotFound(entity.to_string()),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                ConnectorError::AuthFailed(if body.is_empty() {
                    "Invalid or missing token".to_string()
                } else {
                    body
                })
            }
            reqwest::StatusCode::TOO_MANY_REQUESTS => ConnectorError::RateLimited {
                retry_after_secs: retry_after_secs.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
                ConnectorError::InvalidRequest(format!("{}: {}", entity, body))
            }
            _ => ConnectorError::Api {
                status: status.as_u16(),
                message: body,
            },
        }
    }

    /// GET a JSON resource (single attempt)
    ///
    /// # Arguments
    /// * `path` - API path below the base URL, segments already encoded
    /// * `query` - Query string parameters
    /// * `entity` - Resource label used in errors
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        entity: &str,
    ) -> Result<T, ConnectorError> {
        let response = self.build_request(path).query(query).send().await?;

        if !response.status().is_success() {
            return Err(Self::handle_error_status(response, entity).await);
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetch one page of a listing (single attempt)
    pub async fn list_page<T: DeserializeOwned>(
        &self,
        path: &str,
        request: &PageRequest,
    ) -> Result<Page<T>, ConnectorError> {
        let mut query = vec![("limit", request.limit.to_string())];
        if let Some(ref token) = request.token {
            query.push(("next_token", token.clone()));
        }
        self.get_json(path, &query, path).await
    }

    /// GET a JSON resource under a retry policy
    pub async fn get_with_retry<T: DeserializeOwned>(
        &self,
        policy: &RetryPolicy,
        operation: &str,
        path: &str,
    ) -> Result<T, ConnectorError> {
        execute_with_retry(policy, operation, || self.get_json(path, &[], path))
            .await
            .map_err(|e| ConnectorError::from_retry(operation, e))
    }

    /// Fetch the authenticated caller
    pub async fn fetch_caller(&self, policy: &RetryPolicy) -> Result<User, ConnectorError> {
        let user: User = self.get_with_retry(policy, "get_actor", "/actor").await?;
        debug!(
            connector = "pipes",
            user_id = %user.id,
            handle = %user.handle,
            "resolved caller"
        );
        Ok(user)
    }

    /// A page source over one listing path
    pub fn listing<T>(&self, operation: impl Into<String>, path: impl Into<String>) -> ApiListing<'_, T> {
        ApiListing {
            client: self,
            operation: operation.into(),
            path: path.into(),
            _item: PhantomData,
        }
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default().trim().to_string();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

/// Percent-encode one path segment
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// A listing endpoint fetched page by page
pub struct ApiListing<'a, T> {
    client: &'a PipesClient,
    operation: String,
    path: String,
    _item: PhantomData<fn() -> T>,
}

impl<T> ApiListing<'_, T> {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<T> PageSource for ApiListing<'_, T>
where
    T: DeserializeOwned + Send,
{
    type Item = T;

    fn name(&self) -> &str {
        &self.operation
    }

    async fn fetch_page(&self, request: PageRequest) -> Result<Page<T>, ConnectorError> {
        self.client.list_page(&self.path, &request).await
    }
}
