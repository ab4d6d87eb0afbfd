//! Delivery history: flagged messages remembered per account so repeated
//! runs skip what was already seen.

pub mod repo;
pub mod sqlite;

pub use repo::{DeliveryRecord, DeliveryRepository};
pub use sqlite::SqliteRepo;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use log::debug;

use crate::delivery;
use crate::domain::email::MessageSummary;

/// Classifies the messages not yet recorded for `account` and stores the
/// delivery hits. Returns how many new records were written.
pub fn record_deliveries(
    repo: &dyn DeliveryRepository,
    account: &str,
    messages: &[MessageSummary],
    recorded_at: i64,
) -> Result<usize> {
    let seen = repo.processed_ids(account)?;
    let records: Vec<DeliveryRecord> = messages
        .iter()
        .filter(|m| !seen.contains(&m.id))
        .filter_map(|m| {
            let hint = delivery::classify(m)?;
            Some(DeliveryRecord {
                message_id: m.id.clone(),
                account: account.to_string(),
                sender: m.sender.clone(),
                subject: m.subject.clone(),
                date: m.date.clone(),
                timestamp: m.timestamp,
                rule: hint.rule,
                matched: hint.matched,
                carrier: hint.carrier.map(str::to_string),
                recorded_at,
            })
        })
        .collect();

    if records.is_empty() {
        return Ok(0);
    }
    let written = repo.record(&records)?;
    debug!("Recorded {written} delivery e-mail(s) for {account}");
    Ok(written)
}

/// Seconds since the epoch, for `DeliveryRecord::recorded_at`.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::DeliveryRule;
    use pretty_assertions::assert_eq;

    fn message(id: &str, sender: &str, subject: &str) -> MessageSummary {
        MessageSummary {
            id: id.into(),
            sender: sender.into(),
            subject: subject.into(),
            date: "Tue, 1 Jul 2003 10:52:37 +0200".into(),
            timestamp: Some(1_057_049_557),
            ..MessageSummary::default()
        }
    }

    #[test]
    fn only_new_delivery_messages_are_recorded() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let page = vec![
            message("1", "UPS <pkginfo@ups.com>", "Update"),
            message("2", "friend@example.com", "Lunch plans?"),
            message("3", "shop@example.com", "Your package has shipped"),
        ];

        assert_eq!(record_deliveries(&repo, "me@example.com", &page, 50).unwrap(), 2);
        assert_eq!(record_deliveries(&repo, "me@example.com", &page, 60).unwrap(), 0);

        let history = repo.history("me@example.com").unwrap();
        let ids: Vec<&str> = history.iter().map(|r| r.message_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);

        let ups = &history[1];
        assert_eq!(ups.rule, DeliveryRule::SenderDomain);
        assert_eq!(ups.carrier.as_deref(), Some("UPS"));
        assert_eq!(ups.date, "Tue, 1 Jul 2003 10:52:37 +0200");
        assert_eq!(ups.recorded_at, 50);
    }

    #[test]
    fn pages_without_deliveries_write_nothing() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let page = vec![message("9", "friend@example.com", "Lunch plans?")];
        assert_eq!(record_deliveries(&repo, "me@example.com", &page, 1).unwrap(), 0);
        assert!(repo.history("me@example.com").unwrap().is_empty());
    }
}
