use bridge_traits::provider::{ProviderError, ProviderErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GoogleDriveError {
    #[error("Google Drive API error {status_code}: {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse Google Drive response: {0}")]
    ParseError(String),

    #[error("Not authenticated with Google Drive")]
    NotAuthenticated,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication flow error: {0}")]
    Auth(String),
}

impl From<GoogleDriveError> for ProviderError {
    fn from(e: GoogleDriveError) -> Self {
        let kind = match &e {
            GoogleDriveError::ApiError { status_code, .. } => match status_code {
                401 | 403 => ProviderErrorKind::Auth,
                404 => ProviderErrorKind::NotFound,
                429 => ProviderErrorKind::RateLimited,
                500..=599 => ProviderErrorKind::Network,
                _ => ProviderErrorKind::Protocol,
            },
            GoogleDriveError::ParseError(_) => ProviderErrorKind::Protocol,
            GoogleDriveError::NotAuthenticated => ProviderErrorKind::Auth,
            GoogleDriveError::Transport(_) => ProviderErrorKind::Network,
            GoogleDriveError::Auth(_) => ProviderErrorKind::Auth,
        };
        ProviderError::new(kind, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        let auth: ProviderError = GoogleDriveError::ApiError {
            status_code: 401,
            message: "invalid credentials".to_string(),
        }
        .into();
        assert_eq!(auth.kind, ProviderErrorKind::Auth);

        let missing: ProviderError = GoogleDriveError::ApiError {
            status_code: 404,
            message: "not found".to_string(),
        }
        .into();
        assert_eq!(missing.kind, ProviderErrorKind::NotFound);

        let throttled: ProviderError = GoogleDriveError::ApiError {
            status_code: 429,
            message: "rate limit".to_string(),
        }
        .into();
        assert_eq!(throttled.kind, ProviderErrorKind::RateLimited);

        let flaky: ProviderError = GoogleDriveError::ApiError {
            status_code: 503,
            message: "backend error".to_string(),
        }
        .into();
        assert_eq!(flaky.kind, ProviderErrorKind::Network);
    }
}
