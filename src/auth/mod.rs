pub mod callback;
pub mod credential;
pub mod oauth;
pub mod secret_store;
pub mod session;

pub use credential::{Credential, TokenGrant};
pub use oauth::{AuthPending, AuthorizationRequest, OAuthClient, OAuthSettings, TokenService};
pub use session::{Access, Session, SessionState};
