//! Paged view over the mailbox.
//!
//! Every navigation runs the whole pipeline: credential, listing, one fetch
//! per message, decode. Nothing is cached beyond the page on screen.

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::auth::{Access, AuthPending, Credential, Session, SessionState, TokenService};
use crate::delivery;
use crate::domain::email::{MessagePage, MessageSummary};
use crate::error::{AuthError, FetchError, ProviderCallError};
use crate::mail::mime;
use crate::mail::provider::MailProvider;

/// Outcome of a navigation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLoad {
    Loaded,
    /// No usable credential; the user has to visit the authorization URL.
    SignInRequired(AuthPending),
}

enum Fetched {
    Page(MessagePage),
    SignIn(AuthPending),
}

pub struct Inbox {
    page_size: u32,
    page: MessagePage,
    /// Cursor that produced `page`; `None` for the first page.
    cursor: Option<String>,
    /// Cursors of the pages before this one, oldest first.
    history: Vec<Option<String>>,
    delivery_only: bool,
    account: Option<String>,
}

impl Inbox {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            page: MessagePage::default(),
            cursor: None,
            history: Vec::new(),
            delivery_only: false,
            account: None,
        }
    }

    pub fn load_first<T: TokenService, P: MailProvider>(
        &mut self,
        session: &mut Session<T>,
        provider: &P,
    ) -> Result<PageLoad, FetchError> {
        match fetch_page(session, provider, self.page_size, None)? {
            Fetched::Page(page) => {
                self.page = page;
                self.cursor = None;
                self.history.clear();
                Ok(PageLoad::Loaded)
            }
            Fetched::SignIn(pending) => Ok(PageLoad::SignInRequired(pending)),
        }
    }

    /// Fetches the current page again with the cursor that produced it.
    pub fn reload<T: TokenService, P: MailProvider>(
        &mut self,
        session: &mut Session<T>,
        provider: &P,
    ) -> Result<PageLoad, FetchError> {
        match fetch_page(session, provider, self.page_size, self.cursor.as_deref())? {
            Fetched::Page(page) => {
                self.page = page;
                Ok(PageLoad::Loaded)
            }
            Fetched::SignIn(pending) => Ok(PageLoad::SignInRequired(pending)),
        }
    }

    /// No-op on the last page.
    pub fn next_page<T: TokenService, P: MailProvider>(
        &mut self,
        session: &mut Session<T>,
        provider: &P,
    ) -> Result<PageLoad, FetchError> {
        let Some(next) = self.page.continuation_token.clone() else {
            debug!("Already on the last page");
            return Ok(PageLoad::Loaded);
        };

        match fetch_page(session, provider, self.page_size, Some(&next))? {
            Fetched::Page(page) => {
                let previous = std::mem::replace(&mut self.cursor, Some(next));
                self.history.push(previous);
                self.page = page;
                Ok(PageLoad::Loaded)
            }
            Fetched::SignIn(pending) => Ok(PageLoad::SignInRequired(pending)),
        }
    }

    /// No-op on the first page.
    pub fn previous_page<T: TokenService, P: MailProvider>(
        &mut self,
        session: &mut Session<T>,
        provider: &P,
    ) -> Result<PageLoad, FetchError> {
        let Some(prev) = self.history.last().cloned() else {
            debug!("Already on the first page");
            return Ok(PageLoad::Loaded);
        };

        match fetch_page(session, provider, self.page_size, prev.as_deref())? {
            Fetched::Page(page) => {
                self.history.pop();
                self.cursor = prev;
                self.page = page;
                Ok(PageLoad::Loaded)
            }
            Fetched::SignIn(pending) => Ok(PageLoad::SignInRequired(pending)),
        }
    }

    pub fn page(&self) -> &MessagePage {
        &self.page
    }

    /// 1-based position in the visited pages.
    pub fn page_number(&self) -> usize {
        self.history.len() + 1
    }

    pub fn has_next(&self) -> bool {
        self.page.continuation_token.is_some()
    }

    pub fn has_previous(&self) -> bool {
        !self.history.is_empty()
    }

    /// Messages of the current page, filtered when `delivery_only` is set.
    pub fn visible(&self) -> Vec<&MessageSummary> {
        self.page
            .messages
            .iter()
            .filter(|m| !self.delivery_only || delivery::matches_delivery(m))
            .collect()
    }

    pub fn delivery_only(&self) -> bool {
        self.delivery_only
    }

    pub fn set_delivery_only(&mut self, on: bool) {
        self.delivery_only = on;
    }

    pub fn toggle_delivery_only(&mut self) -> bool {
        self.delivery_only = !self.delivery_only;
        self.delivery_only
    }

    /// Signed-in address, looked up once per sign-in. Failures are logged
    /// and retried on the next call.
    pub fn account<T: TokenService, P: MailProvider>(
        &mut self,
        session: &mut Session<T>,
        provider: &P,
    ) -> Option<&str> {
        if self.account.is_none()
            && session.state() == SessionState::LoggedIn
            && let Ok(Access::Ready(credential)) = session.ensure_credential()
        {
            match provider.account_email(credential) {
                Ok(address) => {
                    info!("Signed in as {address}");
                    self.account = Some(address);
                }
                Err(e) => warn!("Could not look up the account address: {e}"),
            }
        }
        self.account.as_deref()
    }

    pub fn cached_account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Forgets everything tied to the signed-in account.
    pub fn reset(&mut self) {
        self.page = MessagePage::default();
        self.cursor = None;
        self.history.clear();
        self.account = None;
    }
}

fn fetch_page<T: TokenService, P: MailProvider>(
    session: &mut Session<T>,
    provider: &P,
    page_size: u32,
    cursor: Option<&str>,
) -> Result<Fetched, FetchError> {
    let result = match session.ensure_credential()? {
        Access::Ready(credential) => collect_page(provider, credential, page_size, cursor),
        Access::Pending(pending) => return Ok(Fetched::SignIn(pending)),
    };

    match result {
        Ok(page) => Ok(Fetched::Page(page)),
        Err(ProviderCallError::Unauthorized) => {
            session.invalidate();
            Err(AuthError::CredentialRejected.into())
        }
        Err(e) => {
            warn!("Page load failed: {e}");
            Err(e.into())
        }
    }
}

fn collect_page<P: MailProvider>(
    provider: &P,
    credential: &Credential,
    page_size: u32,
    cursor: Option<&str>,
) -> Result<MessagePage, ProviderCallError> {
    let listing = provider.list_page(credential, page_size, cursor)?;

    let mut seen = HashSet::new();
    let mut messages = Vec::with_capacity(listing.ids.len());
    for id in listing.ids.iter().filter(|id| seen.insert(id.as_str())) {
        let raw = provider.get_message(credential, id)?;
        messages.push(mime::decode(&raw));
    }
    debug!(
        "Loaded {} messages (next cursor: {})",
        messages.len(),
        listing.next_page_token.is_some()
    );

    Ok(MessagePage {
        messages,
        continuation_token: listing.next_page_token,
    })
}
