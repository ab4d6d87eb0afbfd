use std::fmt;
use std::time::{Duration, SystemTime};

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Expiry used when the token endpoint omits `expires_in`.
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3500);

/// A credential is treated as expired this long before its actual expiry.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Token material returned by the token endpoint (code exchange or refresh).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[zeroize(skip)]
    pub expires_in: Option<Duration>,
    pub scopes: Option<Vec<String>>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// In-memory credential for one interactive session. Secrets are wiped when
/// the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    access_token: String,
    refresh_token: Option<String>,
    #[zeroize(skip)]
    expiry: SystemTime,
    authorized_scopes: Vec<String>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expiry: SystemTime,
        authorized_scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry,
            authorized_scopes,
        }
    }

    /// Builds a credential from a fresh code exchange.
    pub fn from_grant(grant: &TokenGrant, now: SystemTime, requested_scope: &str) -> Self {
        let scopes = grant
            .scopes
            .clone()
            .unwrap_or_else(|| vec![requested_scope.to_string()]);
        Self::new(
            grant.access_token.clone(),
            grant.refresh_token.clone(),
            now + grant.expires_in.unwrap_or(DEFAULT_LIFETIME),
            scopes,
        )
    }

    /// Credential after a refresh. The refresh token is kept unless the
    /// endpoint rotated it.
    pub fn refreshed(&self, grant: &TokenGrant, now: SystemTime) -> Self {
        Self::new(
            grant.access_token.clone(),
            grant
                .refresh_token
                .clone()
                .or_else(|| self.refresh_token.clone()),
            now + grant.expires_in.unwrap_or(DEFAULT_LIFETIME),
            grant
                .scopes
                .clone()
                .unwrap_or_else(|| self.authorized_scopes.clone()),
        )
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expiry(&self) -> SystemTime {
        self.expiry
    }

    pub fn authorized_scopes(&self) -> &[String] {
        &self.authorized_scopes
    }

    /// True while the credential may be used for a provider call at `now`.
    pub fn is_fresh_at(&self, now: SystemTime) -> bool {
        self.expiry > now + EXPIRY_SKEW
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .field("authorized_scopes", &self.authorized_scopes)
            .finish()
    }
}
