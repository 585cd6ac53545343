use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Response from Bitbucket API: {status} {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("invalid gather_type `{0}`, must be either `team`, `user`, or `repos`")]
    InvalidGatherType(String),

    #[error("OAuth token request failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, PulseError>;
