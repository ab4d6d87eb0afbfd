use std::cell::{Cell, RefCell};
use std::time::{Duration, SystemTime};

use rs_delivery_mail::auth::{AuthPending, AuthorizationRequest, Credential, TokenGrant, TokenService};
use rs_delivery_mail::domain::email::{MessageListing, RawMessage};
use rs_delivery_mail::error::{AuthError, ProviderCallError};
use rs_delivery_mail::mail::provider::MailProvider;
use url::Url;

/// Token endpoint that hands out `code-<n>` credentials and never refreshes.
#[derive(Default)]
pub struct StaticTokens {
    pub requests: Cell<u32>,
}

impl TokenService for StaticTokens {
    fn scope(&self) -> &str {
        "https://www.googleapis.com/auth/gmail.readonly"
    }

    fn authorization_request(&self) -> Result<AuthorizationRequest, AuthError> {
        let n = self.requests.get() + 1;
        self.requests.set(n);
        let authorize_url = Url::parse(&format!("https://auth.example.com/authorize?state=st{n}"))
            .map_err(|e| AuthError::Config(e.to_string()))?;
        Ok(AuthorizationRequest::new(
            AuthPending {
                authorize_url,
                state: format!("st{n}"),
            },
            "pkce-verifier",
        ))
    }

    fn exchange_code(&self, code: &str, _request: &AuthorizationRequest) -> Result<TokenGrant, AuthError> {
        Ok(TokenGrant {
            access_token: format!("access-{code}"),
            refresh_token: None,
            expires_in: Some(Duration::from_secs(3600)),
            scopes: None,
        })
    }

    fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
        Err(AuthError::InvalidGrant("no refresh in tests".into()))
    }
}

pub fn fresh_credential() -> Credential {
    Credential::new(
        "access-fixture",
        None,
        SystemTime::now() + Duration::from_secs(3600),
        vec![],
    )
}

/// In-memory mailbox whose cursors are the offsets of the next page.
#[derive(Default)]
pub struct FakeMailbox {
    pub messages: Vec<(String, String)>,
    pub fail_next: RefCell<Option<ProviderCallError>>,
    pub duplicate_ids: bool,
    pub list_calls: Cell<u32>,
    pub get_calls: Cell<u32>,
}

impl FakeMailbox {
    pub fn with_subjects(subjects: &[&str]) -> Self {
        let messages = subjects
            .iter()
            .enumerate()
            .map(|(i, subject)| {
                (
                    format!("id{i}"),
                    format!("From: sender{i}@example.com\r\nSubject: {subject}\r\n\r\nbody {i}\r\n"),
                )
            })
            .collect();
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn fail_next_call(&self, err: ProviderCallError) {
        *self.fail_next.borrow_mut() = Some(err);
    }

    fn injected_failure(&self) -> Result<(), ProviderCallError> {
        match self.fail_next.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl MailProvider for FakeMailbox {
    fn list_page(
        &self,
        _credential: &Credential,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessageListing, ProviderCallError> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.injected_failure()?;

        let start: usize = match page_token {
            Some(t) => t
                .parse()
                .map_err(|_| ProviderCallError::Status { status: 400, body: "bad token".into() })?,
            None => 0,
        };
        let end = (start + page_size as usize).min(self.messages.len());
        let mut ids: Vec<String> = self.messages[start..end].iter().map(|(id, _)| id.clone()).collect();
        if self.duplicate_ids {
            ids.extend(ids.clone());
        }
        Ok(MessageListing {
            ids,
            next_page_token: (end < self.messages.len()).then(|| end.to_string()),
        })
    }

    fn get_message(&self, _credential: &Credential, id: &str) -> Result<RawMessage, ProviderCallError> {
        self.get_calls.set(self.get_calls.get() + 1);
        self.injected_failure()?;
        self.messages
            .iter()
            .find(|(mid, _)| mid == id)
            .map(|(mid, text)| RawMessage {
                id: mid.clone(),
                rfc822: text.clone().into_bytes(),
            })
            .ok_or(ProviderCallError::Status {
                status: 404,
                body: format!("{id} not found"),
            })
    }

    fn account_email(&self, _credential: &Credential) -> Result<String, ProviderCallError> {
        self.injected_failure()?;
        Ok("me@example.com".to_string())
    }
}
