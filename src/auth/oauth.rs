use log::{debug, warn};
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::reqwest::http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
    TokenUrl,
};
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::auth::credential::TokenGrant;
use crate::config::{Config, MAIL_READONLY_SCOPE};
use crate::error::AuthError;

/// What the user has to do to finish signing in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPending {
    /// URL the user must visit to grant consent.
    pub authorize_url: Url,
    /// CSRF value the redirect must echo back.
    pub state: String,
}

/// A pending authorization plus the PKCE verifier needed to redeem its code.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AuthorizationRequest {
    #[zeroize(skip)]
    pending: AuthPending,
    pkce_verifier: String,
}

impl AuthorizationRequest {
    pub fn new(pending: AuthPending, pkce_verifier: impl Into<String>) -> Self {
        Self {
            pending,
            pkce_verifier: pkce_verifier.into(),
        }
    }

    pub fn pending(&self) -> &AuthPending {
        &self.pending
    }

    pub fn pkce_verifier(&self) -> &str {
        &self.pkce_verifier
    }
}

/// Token endpoint operations the session manager depends on.
pub trait TokenService {
    /// Scope requested during authorization.
    fn scope(&self) -> &str;

    fn authorization_request(&self) -> Result<AuthorizationRequest, AuthError>;

    fn exchange_code(
        &self,
        code: &str,
        request: &AuthorizationRequest,
    ) -> Result<TokenGrant, AuthError>;

    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// Client id, secret and endpoints for the authorization-code flow.
#[derive(Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub scope: String,
}

impl OAuthSettings {
    pub fn from_config(cfg: &Config, client_secret: Option<String>) -> Self {
        Self {
            client_id: cfg.client_id.clone(),
            client_secret,
            redirect_uri: cfg.redirect_uri().to_string(),
            auth_url: cfg.auth_url().to_string(),
            token_url: cfg.token_url().to_string(),
            scope: MAIL_READONLY_SCOPE.to_string(),
        }
    }
}

/// `TokenService` backed by the oauth2 crate's blocking reqwest client.
pub struct OAuthClient {
    client: BasicClient,
    scope: String,
}

impl OAuthClient {
    pub fn new(settings: &OAuthSettings) -> Result<Self, AuthError> {
        let auth_url = AuthUrl::new(settings.auth_url.clone())
            .map_err(|e| AuthError::Config(format!("auth_url: {e}")))?;
        let token_url = TokenUrl::new(settings.token_url.clone())
            .map_err(|e| AuthError::Config(format!("token_url: {e}")))?;
        let redirect = RedirectUrl::new(settings.redirect_uri.clone())
            .map_err(|e| AuthError::Config(format!("redirect_uri: {e}")))?;

        let client = BasicClient::new(
            ClientId::new(settings.client_id.clone()),
            settings.client_secret.clone().map(ClientSecret::new),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect);

        Ok(Self {
            client,
            scope: settings.scope.clone(),
        })
    }
}

impl TokenService for OAuthClient {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn authorization_request(&self) -> Result<AuthorizationRequest, AuthError> {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (authorize_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(self.scope.clone()))
            .set_pkce_challenge(pkce_challenge)
            // Google only issues refresh tokens for offline access with explicit consent.
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        Ok(AuthorizationRequest::new(
            AuthPending {
                authorize_url,
                state: csrf_token.secret().clone(),
            },
            pkce_verifier.secret().clone(),
        ))
    }

    fn exchange_code(
        &self,
        code: &str,
        request: &AuthorizationRequest,
    ) -> Result<TokenGrant, AuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(request.pkce_verifier().to_string()))
            .request(http_client)
            .map_err(|err| {
                warn!("Token exchange failed: {err:?}");
                token_error(err)
            })?;

        debug!("Authorization code exchanged");
        Ok(grant_from(&token))
    }

    fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let rt = RefreshToken::new(refresh_token.to_string());
        let token = self
            .client
            .exchange_refresh_token(&rt)
            .request(http_client)
            .map_err(|err| {
                warn!("Token refresh failed: {err:?}");
                token_error(err)
            })?;

        debug!("Access token refreshed");
        Ok(grant_from(&token))
    }
}

fn grant_from<T: TokenResponse<oauth2::basic::BasicTokenType>>(token: &T) -> TokenGrant {
    TokenGrant {
        access_token: token.access_token().secret().to_string(),
        refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
        expires_in: token.expires_in(),
        scopes: token
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect()),
    }
}

/// Maps a token endpoint failure onto the auth error taxonomy.
fn token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp) => {
            let description = resp
                .error_description()
                .cloned()
                .unwrap_or_else(|| resp.error().to_string());
            match resp.error() {
                BasicErrorResponseType::InvalidGrant => AuthError::InvalidGrant(description),
                BasicErrorResponseType::Extension(code) if code == "redirect_uri_mismatch" => {
                    AuthError::RedirectUriRejected(description)
                }
                BasicErrorResponseType::Extension(code) if code == "access_denied" => {
                    AuthError::AccessDenied
                }
                other => AuthError::Rejected {
                    code: other.to_string(),
                    description,
                },
            }
        }
        RequestTokenError::Request(e) => AuthError::Transport(e.to_string()),
        RequestTokenError::Parse(e, _body) => {
            AuthError::Transport(format!("unparseable token response: {e}"))
        }
        RequestTokenError::Other(msg) => AuthError::Transport(msg),
    }
}
