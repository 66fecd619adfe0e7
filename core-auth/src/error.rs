use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Provider {provider} authentication failed: {reason}")]
    AuthenticationFailed { provider: String, reason: String },

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Callback state is malformed")]
    StateInvalid,

    #[error("Callback state issued {age_secs}s ago is older than the allowed window")]
    StateExpired { age_secs: i64 },

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
