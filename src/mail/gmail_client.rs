use std::time::Duration;

use anyhow::{Result, anyhow};
use base64::engine::DecodePaddingMode;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine as _, alphabet};
use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::Credential;
use crate::domain::email::{MessageListing, RawMessage};
use crate::error::ProviderCallError;
use crate::mail::provider::MailProvider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `raw` is base64url; Gmail usually pads it but does not promise to.
const GMAIL_RAW: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawMessageResponse {
    id: String,
    raw: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    email_address: String,
}

/// Gmail REST v1 over blocking HTTP.
pub struct GmailClient {
    http: Client,
    base_url: Url,
}

impl GmailClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| anyhow!("invalid api_base_url '{base_url}': {e}"))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("api_base_url cannot carry a path: {base_url}"));
        }
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url })
    }

    /// `{base}/gmail/v1/users/me/{segments...}` with each segment escaped.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["gmail", "v1", "users", "me"])
                .extend(segments);
        }
        url
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ProviderCallError> {
        debug!("GET {}", url.path());
        let resp = self
            .http
            .get(url)
            .bearer_auth(credential.access_token())
            .query(query)
            .send()?;

        let status = resp.status();
        match status {
            StatusCode::UNAUTHORIZED => return Err(ProviderCallError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderCallError::RateLimited),
            _ => {}
        }

        let body = resp.text()?;
        if !status.is_success() {
            return Err(ProviderCallError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ProviderCallError::MalformedResponse(e.to_string()))
    }
}

/// Listings are limited to this label so sent and archived mail stay out.
const INBOX_LABEL: &str = "INBOX";

impl MailProvider for GmailClient {
    fn list_page(
        &self,
        credential: &Credential,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessageListing, ProviderCallError> {
        let mut query = vec![
            ("maxResults", page_size.to_string()),
            ("labelIds", INBOX_LABEL.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let resp: ListMessagesResponse =
            self.get_json(credential, self.endpoint(&["messages"]), &query)?;
        Ok(MessageListing {
            ids: resp.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: resp.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    fn get_message(&self, credential: &Credential, id: &str) -> Result<RawMessage, ProviderCallError> {
        let resp: RawMessageResponse = self.get_json(
            credential,
            self.endpoint(&["messages", id]),
            &[("format", "raw".to_string())],
        )?;

        let compact: String = resp.raw.chars().filter(|c| !c.is_whitespace()).collect();
        let rfc822 = GMAIL_RAW.decode(compact).map_err(|e| {
            ProviderCallError::MalformedResponse(format!("message {id}: raw content is not base64url: {e}"))
        })?;
        Ok(RawMessage { id: resp.id, rfc822 })
    }

    fn account_email(&self, credential: &Credential) -> Result<String, ProviderCallError> {
        let resp: ProfileResponse = self.get_json(credential, self.endpoint(&["profile"]), &[])?;
        Ok(resp.email_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use std::time::SystemTime;

    fn credential() -> Credential {
        Credential::new(
            "at-123",
            None,
            SystemTime::now() + Duration::from_secs(3600),
            vec![],
        )
    }

    #[test]
    fn list_page_sends_cursor_and_collects_ids() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_header("authorization", "Bearer at-123")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("maxResults".into(), "2".into()),
                Matcher::UrlEncoded("labelIds".into(), "INBOX".into()),
                Matcher::UrlEncoded("pageToken".into(), "tok-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"messages":[{"id":"a1","threadId":"t1"},{"id":"a2","threadId":"t1"}],
                    "nextPageToken":"tok-2","resultSizeEstimate":2}"#,
            )
            .create();

        let client = GmailClient::new(&server.url()).unwrap();
        let listing = client.list_page(&credential(), 2, Some("tok-1")).unwrap();

        assert_eq!(listing.ids, vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(listing.next_page_token.as_deref(), Some("tok-2"));
    }

    #[test]
    fn empty_mailbox_lists_nothing() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/gmail/v1/users/me/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"resultSizeEstimate":0}"#)
            .create();

        let client = GmailClient::new(&server.url()).unwrap();
        let listing = client.list_page(&credential(), 10, None).unwrap();
        assert_eq!(listing, MessageListing::default());
    }

    #[test]
    fn get_message_decodes_raw_content() {
        let mut server = mockito::Server::new();
        // "Subject: hi\r\n\r\nbody?>" in base64url without padding
        let raw = GMAIL_RAW.encode(b"Subject: hi\r\n\r\nbody?>");
        let raw = raw.trim_end_matches('=');
        let _m = server
            .mock("GET", "/gmail/v1/users/me/messages/a1")
            .match_query(Matcher::UrlEncoded("format".into(), "raw".into()))
            .with_status(200)
            .with_body(format!(r#"{{"id":"a1","threadId":"t1","raw":"{raw}"}}"#))
            .create();

        let client = GmailClient::new(&server.url()).unwrap();
        let message = client.get_message(&credential(), "a1").unwrap();

        assert_eq!(message.id, "a1");
        assert_eq!(message.rfc822, b"Subject: hi\r\n\r\nbody?>".to_vec());
    }

    #[test]
    fn profile_returns_account_address() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/gmail/v1/users/me/profile")
            .with_status(200)
            .with_body(r#"{"emailAddress":"me@example.com","messagesTotal":3}"#)
            .create();

        let client = GmailClient::new(&server.url()).unwrap();
        assert_eq!(client.account_email(&credential()).unwrap(), "me@example.com");
    }

    #[test]
    fn http_statuses_are_classified() {
        let mut server = mockito::Server::new();
        let _unauth = server
            .mock("GET", "/gmail/v1/users/me/profile")
            .with_status(401)
            .with_body(r#"{"error":{"code":401}}"#)
            .create();
        let _limited = server
            .mock("GET", "/gmail/v1/users/me/messages/slow")
            .match_query(Matcher::Any)
            .with_status(429)
            .create();
        let _broken = server
            .mock("GET", "/gmail/v1/users/me/messages/gone")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("not found")
            .create();

        let client = GmailClient::new(&server.url()).unwrap();
        let cred = credential();

        assert!(matches!(
            client.account_email(&cred),
            Err(ProviderCallError::Unauthorized)
        ));
        assert!(matches!(
            client.get_message(&cred, "slow"),
            Err(ProviderCallError::RateLimited)
        ));
        match client.get_message(&cred, "gone") {
            Err(ProviderCallError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "not found");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn garbage_json_is_malformed() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/gmail/v1/users/me/profile")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create();

        let client = GmailClient::new(&server.url()).unwrap();
        assert!(matches!(
            client.account_email(&credential()),
            Err(ProviderCallError::MalformedResponse(_))
        ));
    }

    #[test]
    fn ids_are_escaped_into_one_path_segment() {
        let client = GmailClient::new("https://gmail.example.com/").unwrap();
        let url = client.endpoint(&["messages", "../profile"]);
        assert_eq!(
            url.as_str(),
            "https://gmail.example.com/gmail/v1/users/me/messages/..%2Fprofile"
        );
    }
}
