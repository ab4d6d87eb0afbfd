use crate::auth::Credential;
use crate::domain::email::{MessageListing, RawMessage};
use crate::error::ProviderCallError;

/// Read-only access to a hosted mailbox. Every call carries the credential
/// it should be made with; implementations hold no session state.
pub trait MailProvider {
    /// Ids of one page of messages, newest first, plus the cursor for the
    /// following page.
    fn list_page(
        &self,
        credential: &Credential,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessageListing, ProviderCallError>;

    /// Full RFC 822 content of one message.
    fn get_message(&self, credential: &Credential, id: &str) -> Result<RawMessage, ProviderCallError>;

    /// Address of the signed-in account.
    fn account_email(&self, credential: &Credential) -> Result<String, ProviderCallError>;
}
