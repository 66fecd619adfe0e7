//! # Authentication Core
//!
//! OAuth 2.0 plumbing for the Daybook sync core:
//!
//! - **Provider kinds** (`types`): the sealed set of supported backends
//!   and their authentication families
//! - **Token sets** (`types`): access/refresh tokens with expiry
//!   buffering and redacted debug output
//! - **Flow manager** (`oauth`): authorization URL construction with
//!   PKCE, code exchange, token refresh
//! - **Callback state** (`state`): the opaque state token validated at
//!   the OAuth redirect boundary (10-minute validity window)

pub mod error;
pub mod oauth;
pub mod state;
pub mod types;

pub use error::{AuthError, Result};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use state::{CallbackState, STATE_MAX_AGE_SECS};
pub use types::{AuthFamily, OAuthTokens, ProviderKind};
