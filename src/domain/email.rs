use serde::Serialize;

/// Provider-assigned message identifier (opaque).
pub type EmailId = String;

/// How `MessageSummary::body` should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    #[default]
    Plain,
    Html,
}

/// Image part referenced from an HTML body through `cid:<content_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineImage {
    pub content_id: String,
    pub mime_type: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Placeholder used by HTML bodies to reference this image.
    pub fn placeholder(&self) -> String {
        format!("cid:{}", self.content_id)
    }
}

/// Non-body part the user may want to know about (filename and type only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    /// Decoded size in bytes; `None` when the part could not be decoded.
    pub size: Option<usize>,
}

/// Display-ready record produced by the message decoder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MessageSummary {
    pub id: EmailId,
    pub sender: String,
    pub subject: String,
    /// `Date` header as sent, empty when missing.
    pub date: String,
    /// Seconds since the epoch, when `date` parses.
    pub timestamp: Option<i64>,
    pub body: String,
    pub body_format: BodyFormat,
    pub inline_images: Vec<InlineImage>,
    pub attachments: Vec<Attachment>,
}

/// One page of decoded messages plus the cursor for the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageSummary>,
    pub continuation_token: Option<String>,
}

impl MessagePage {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|m| m.id.as_str())
    }
}

/// Undecoded message as handed over by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub id: EmailId,
    pub rfc822: Vec<u8>,
}

/// Result of a provider list call: ids only, bodies are fetched one by one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageListing {
    pub ids: Vec<EmailId>,
    pub next_page_token: Option<String>,
}
