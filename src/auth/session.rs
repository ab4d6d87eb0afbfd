//! Credential lifecycle for one interactive session.
//!
//! ```text
//! LoggedOut -> AwaitingConsent -> LoggedIn -> (expired) -> Refreshing -> LoggedIn | LoggedOut
//! ```
//!
//! `logout()` returns to `LoggedOut` from any state. The session is a plain
//! value owned by the caller and handed to handlers by `&mut`.

use std::time::SystemTime;

use log::{debug, info, warn};

use crate::auth::credential::Credential;
use crate::auth::oauth::{AuthPending, AuthorizationRequest, TokenService};
use crate::error::AuthError;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    AwaitingConsent,
    LoggedIn,
    /// A credential is held but past its expiry; the next
    /// `ensure_credential` call refreshes or discards it.
    Expired,
    Refreshing,
}

enum Phase {
    LoggedOut,
    AwaitingConsent(AuthorizationRequest),
    LoggedIn(Credential),
    Refreshing,
}

/// Result of [`Session::ensure_credential`].
#[derive(Debug)]
pub enum Access<'a> {
    Ready(&'a Credential),
    Pending(AuthPending),
}

pub struct Session<T> {
    tokens: T,
    phase: Phase,
    last_failure: Option<AuthError>,
}

impl<T: TokenService> Session<T> {
    pub fn new(tokens: T) -> Self {
        Self {
            tokens,
            phase: Phase::LoggedOut,
            last_failure: None,
        }
    }

    /// Starts a session that already holds `credential`.
    pub fn with_credential(tokens: T, credential: Credential) -> Self {
        Self {
            tokens,
            phase: Phase::LoggedIn(credential),
            last_failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state_at(SystemTime::now())
    }

    pub fn state_at(&self, now: SystemTime) -> SessionState {
        match &self.phase {
            Phase::LoggedOut => SessionState::LoggedOut,
            Phase::AwaitingConsent(_) => SessionState::AwaitingConsent,
            Phase::LoggedIn(cred) if cred.is_fresh_at(now) => SessionState::LoggedIn,
            Phase::LoggedIn(_) => SessionState::Expired,
            Phase::Refreshing => SessionState::Refreshing,
        }
    }

    /// The most recent refresh or exchange failure, cleared on read.
    pub fn take_last_failure(&mut self) -> Option<AuthError> {
        self.last_failure.take()
    }

    pub fn ensure_credential(&mut self) -> Result<Access<'_>, AuthError> {
        self.ensure_credential_at(SystemTime::now())
    }

    /// Returns a credential usable at `now`, refreshing an expired one when
    /// possible, or the authorization the user still has to complete.
    pub fn ensure_credential_at(&mut self, now: SystemTime) -> Result<Access<'_>, AuthError> {
        self.phase = match std::mem::replace(&mut self.phase, Phase::Refreshing) {
            Phase::LoggedIn(cred) if cred.is_fresh_at(now) => Phase::LoggedIn(cred),
            Phase::LoggedIn(cred) => self.refresh(&cred, now),
            other => other,
        };

        if matches!(self.phase, Phase::LoggedOut | Phase::Refreshing) {
            self.phase = Phase::LoggedOut;
            let request = self.tokens.authorization_request()?;
            info!("Authorization required; waiting for user consent");
            self.phase = Phase::AwaitingConsent(request);
        }

        match &self.phase {
            Phase::LoggedIn(cred) => Ok(Access::Ready(cred)),
            Phase::AwaitingConsent(request) => Ok(Access::Pending(request.pending().clone())),
            Phase::LoggedOut | Phase::Refreshing => Err(AuthError::NoPendingAuthorization),
        }
    }

    fn refresh(&mut self, stale: &Credential, now: SystemTime) -> Phase {
        let Some(refresh_token) = stale.refresh_token() else {
            debug!("Credential expired without a refresh token; discarding it");
            return Phase::LoggedOut;
        };

        info!("Credential expired; refreshing");
        match self.tokens.refresh(refresh_token) {
            Ok(grant) => {
                let refreshed = stale.refreshed(&grant, now);
                if refreshed.is_fresh_at(now) {
                    Phase::LoggedIn(refreshed)
                } else {
                    warn!("Token endpoint returned an already expired credential");
                    Phase::LoggedOut
                }
            }
            Err(e) => {
                warn!("Refresh failed, signing out: {e}");
                self.last_failure = Some(e);
                Phase::LoggedOut
            }
        }
    }

    pub fn complete_authorization(&mut self, code: &str) -> Result<&Credential, AuthError> {
        self.complete_authorization_at(code, SystemTime::now())
    }

    /// Redeems the authorization `code` for the pending request. Any failure
    /// leaves the session logged out.
    pub fn complete_authorization_at(
        &mut self,
        code: &str,
        now: SystemTime,
    ) -> Result<&Credential, AuthError> {
        let request = match std::mem::replace(&mut self.phase, Phase::LoggedOut) {
            Phase::AwaitingConsent(request) => request,
            other => {
                self.phase = other;
                return Err(AuthError::NoPendingAuthorization);
            }
        };

        let grant = self.tokens.exchange_code(code, &request).inspect_err(|e| {
            warn!("Authorization failed: {e}");
        })?;
        let credential = Credential::from_grant(&grant, now, self.tokens.scope());
        info!("Signed in; credential valid until {:?}", credential.expiry());

        self.phase = Phase::LoggedIn(credential);
        match &self.phase {
            Phase::LoggedIn(cred) => Ok(cred),
            _ => Err(AuthError::NoPendingAuthorization),
        }
    }

    /// Drops the credential and any pending authorization.
    pub fn logout(&mut self) {
        if !matches!(self.phase, Phase::LoggedOut) {
            info!("Signing out");
        }
        // Dropping the phase wipes the token material it owned.
        self.phase = Phase::LoggedOut;
    }

    /// Discards a credential the provider refused.
    pub fn invalidate(&mut self) {
        warn!("Provider rejected the credential; signing out");
        self.phase = Phase::LoggedOut;
        self.last_failure = Some(AuthError::CredentialRejected);
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self.phase, Phase::LoggedOut)
    }
}
