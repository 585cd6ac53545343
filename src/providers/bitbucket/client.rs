use std::time::Duration;

use log::debug;
use reqwest::{Client, Response};
use url::Url;

use crate::auth::{ClientCredentials, Token};
use crate::error::{PulseError, Result};

/// Authenticated transport for the Bitbucket Cloud REST API.
///
/// Cloning is cheap and every clone shares the same connection pool, so a
/// single client serves all concurrent fetches of a gather cycle.
#[derive(Clone)]
pub struct BitbucketClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

impl BitbucketClient {
    pub fn new(base_url: &str, token: Option<Token>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("bbpulse/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| PulseError::Config(format!("Failed to create HTTP client: {e}")))?;

        Self::with_client(client, base_url, token)
    }

    fn with_client(client: Client, base_url: &str, token: Option<Token>) -> Result<Self> {
        let api_url = Url::parse(base_url)
            .map_err(|e| PulseError::Config(format!("Invalid API base URL: {e}")))?;

        if api_url.cannot_be_a_base() {
            return Err(PulseError::Config(format!(
                "Invalid API base URL: {base_url}"
            )));
        }

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    /// Builds a client, exchanging the OAuth consumer credentials for a token
    /// first when they are given.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the token request fails.
    pub async fn connect(
        base_url: &str,
        credentials: Option<&ClientCredentials>,
        timeout: Duration,
    ) -> Result<Self> {
        let unauthenticated = Self::new(base_url, None, timeout)?;

        let Some(credentials) = credentials else {
            debug!("No OAuth credentials configured, using anonymous access");
            return Ok(unauthenticated);
        };

        let token = credentials.fetch_token(&unauthenticated.client).await?;
        Ok(Self {
            token: Some(token),
            ..unauthenticated
        })
    }

    /// Helper to build authenticated requests
    pub fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    /// Appends percent-escaped path segments to the API base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| PulseError::Config(format!("Invalid API base URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Issues a GET and rejects any non-2xx answer.
    pub async fn perform(&self, url: Url) -> Result<Response> {
        let response = self.auth_request(self.client.get(url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        Ok(response)
    }
}
