//! Error taxonomy shared by the session manager, the provider client and the
//! message decoder.

use thiserror::Error;

/// Failures of the delegated-authorization flow.
///
/// Every variant is surfaced to the user as "please sign in again" and leaves
/// the session without a held credential.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization code or refresh token is invalid, expired or revoked.
    #[error("authorization grant rejected: {0}")]
    InvalidGrant(String),

    /// The token endpoint does not accept the configured redirect URI.
    #[error("redirect URI rejected by the authorization server: {0}")]
    RedirectUriRejected(String),

    /// The user declined consent.
    #[error("access denied by the user")]
    AccessDenied,

    /// Any other error response from the token endpoint.
    #[error("token endpoint error {code}: {description}")]
    Rejected { code: String, description: String },

    /// The token endpoint could not be reached or answered garbage.
    #[error("token request failed: {0}")]
    Transport(String),

    #[error("no authorization is pending")]
    NoPendingAuthorization,

    /// The redirect carried a `state` that does not match the pending request.
    #[error("authorization state mismatch")]
    StateMismatch,

    #[error("no authorization code received within {0} seconds")]
    CallbackTimeout(u64),

    #[error("authorization callback failed: {0}")]
    Callback(String),

    #[error("invalid OAuth configuration: {0}")]
    Config(String),

    /// The provider rejected the credential (HTTP 401).
    #[error("credential rejected by the mail provider")]
    CredentialRejected,
}

/// Failures of a provider (list/get/profile) call.
#[derive(Debug, Error)]
pub enum ProviderCallError {
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 401: the credential itself is no longer valid.
    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited by the provider")]
    RateLimited,

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for ProviderCallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Failure to decode a single MIME part. Never escapes the decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 content: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid transfer encoding: {0}")]
    TransferEncoding(#[from] mailparse::MailParseError),

    #[error("part of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),
}

/// Outcome of a failed page load, as seen by the UI.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Provider(#[from] ProviderCallError),
}

impl FetchError {
    /// Short message for the status line.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Auth(e) => format!("Please sign in again ({e})"),
            FetchError::Provider(ProviderCallError::RateLimited) => {
                "The mail provider is rate limiting requests; try again shortly".to_string()
            }
            FetchError::Provider(e) => format!("Could not load messages: {e}"),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth(_))
    }
}
