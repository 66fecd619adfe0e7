use bridge_traits::provider::{ProviderError, ProviderErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebdavError {
    #[error("Relay returned {status_code}: {message}")]
    RelayError { status_code: u16, message: String },

    #[error("Failed to parse relay response: {0}")]
    ParseError(String),

    #[error("No credentials configured")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<WebdavError> for ProviderError {
    fn from(e: WebdavError) -> Self {
        let kind = match &e {
            WebdavError::RelayError { status_code, .. } => match status_code {
                401 | 403 => ProviderErrorKind::Auth,
                404 => ProviderErrorKind::NotFound,
                429 => ProviderErrorKind::RateLimited,
                500..=599 => ProviderErrorKind::Network,
                _ => ProviderErrorKind::Protocol,
            },
            WebdavError::ParseError(_) => ProviderErrorKind::Protocol,
            WebdavError::NotConnected => ProviderErrorKind::Configuration,
            WebdavError::Transport(_) => ProviderErrorKind::Network,
        };
        ProviderError::new(kind, e.to_string())
    }
}
