use std::collections::HashSet;

use anyhow::Result;
use serde::Serialize;

use crate::delivery::DeliveryRule;
use crate::domain::email::EmailId;

/// One flagged delivery e-mail, remembered per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    pub message_id: EmailId,
    pub account: String,
    pub sender: String,
    pub subject: String,
    /// `Date` header of the message, as sent.
    pub date: String,
    pub timestamp: Option<i64>,
    pub rule: DeliveryRule,
    pub matched: String,
    pub carrier: Option<String>,
    /// Seconds since the epoch when the record was written.
    pub recorded_at: i64,
}

pub trait DeliveryRepository {
    /// Message ids already recorded for `account`.
    fn processed_ids(&self, account: &str) -> Result<HashSet<EmailId>>;

    /// Inserts records whose `(account, message_id)` is new. Returns how many
    /// were written.
    fn record(&self, records: &[DeliveryRecord]) -> Result<usize>;

    /// Newest message first.
    fn history(&self, account: &str) -> Result<Vec<DeliveryRecord>>;

    /// Number of records per carrier, most frequent first. Records without a
    /// carrier are counted under "Unknown".
    fn carrier_counts(&self, account: &str) -> Result<Vec<(String, usize)>>;

    /// Deletes every record of `account`. Returns how many were removed.
    fn clear(&self, account: &str) -> Result<usize>;
}
