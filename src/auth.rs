use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{PulseError, Result};

/// Bearer token presented on every API request.
#[derive(Clone)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(***)")
    }
}

/// OAuth consumer credentials for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub key: String,
    pub secret: String,
    pub token_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ClientCredentials {
    /// Exchanges the consumer key and secret for an access token.
    ///
    /// The consumer must have the "private consumer" option enabled for
    /// Bitbucket to accept the `client_credentials` grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint is unreachable, answers with a
    /// non-2xx status, or returns a body without `access_token`.
    pub async fn fetch_token(&self, client: &Client) -> Result<Token> {
        debug!("Requesting OAuth token from {}", self.token_url);

        let response = client
            .post(&self.token_url)
            .basic_auth(&self.key, Some(&self.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::Auth(format!(
                "token endpoint answered {status}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        Ok(Token(body.access_token))
    }
}
