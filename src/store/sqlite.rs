use std::collections::HashSet;
use std::path::Path;

use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row, params};

use crate::delivery::DeliveryRule;
use crate::domain::email::EmailId;
use crate::store::repo::{DeliveryRecord, DeliveryRepository};

pub struct SqliteRepo {
    conn: Connection,
}

impl SqliteRepo {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.migrate()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        let repo = Self {
            conn: Connection::open_in_memory()?,
        };
        repo.migrate()?;
        Ok(repo)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS deliveries (
                account      TEXT NOT NULL,
                message_id   TEXT NOT NULL,
                sender       TEXT NOT NULL,
                subject      TEXT NOT NULL,
                date         TEXT NOT NULL,
                timestamp    INTEGER,
                rule         TEXT NOT NULL,
                matched      TEXT NOT NULL,
                carrier      TEXT,
                recorded_at  INTEGER NOT NULL,
                PRIMARY KEY (account, message_id)
            );
            "#,
        )?;
        Ok(())
    }
}

fn record_from_row(r: &Row<'_>) -> Result<DeliveryRecord> {
    let rule: String = r.get(6)?;
    Ok(DeliveryRecord {
        account: r.get(0)?,
        message_id: r.get(1)?,
        sender: r.get(2)?,
        subject: r.get(3)?,
        date: r.get(4)?,
        timestamp: r.get(5)?,
        rule: DeliveryRule::from_name(&rule).ok_or_else(|| anyhow!("unknown delivery rule '{rule}' in history"))?,
        matched: r.get(7)?,
        carrier: r.get(8)?,
        recorded_at: r.get(9)?,
    })
}

impl DeliveryRepository for SqliteRepo {
    fn processed_ids(&self, account: &str) -> Result<HashSet<EmailId>> {
        let mut stmt = self
            .conn
            .prepare(r#"SELECT message_id FROM deliveries WHERE account=?1"#)?;
        let mut rows = stmt.query(params![account])?;
        let mut out = HashSet::new();
        while let Some(r) = rows.next()? {
            let id: String = r.get(0)?;
            out.insert(id);
        }
        Ok(out)
    }

    fn record(&self, records: &[DeliveryRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO deliveries
                  (account, message_id, sender, subject, date, timestamp, rule, matched, carrier, recorded_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;

            for it in records {
                inserted += stmt.execute(params![
                    it.account,
                    it.message_id,
                    it.sender,
                    it.subject,
                    it.date,
                    it.timestamp,
                    it.rule.as_str(),
                    it.matched,
                    it.carrier,
                    it.recorded_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn history(&self, account: &str) -> Result<Vec<DeliveryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT account, message_id, sender, subject, date, timestamp,
                   rule, matched, carrier, recorded_at
            FROM deliveries
            WHERE account=?1
            ORDER BY COALESCE(timestamp, recorded_at) DESC, message_id DESC
            "#,
        )?;

        let mut rows = stmt.query(params![account])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(record_from_row(r)?);
        }
        Ok(out)
    }

    fn carrier_counts(&self, account: &str) -> Result<Vec<(String, usize)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT COALESCE(carrier, 'Unknown') AS name, COUNT(*) AS n
            FROM deliveries
            WHERE account=?1
            GROUP BY name
            ORDER BY n DESC, name ASC
            "#,
        )?;

        let mut rows = stmt.query(params![account])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            let carrier: String = r.get(0)?;
            let count: i64 = r.get(1)?;
            out.push((carrier, count as usize));
        }
        Ok(out)
    }

    fn clear(&self, account: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute(r#"DELETE FROM deliveries WHERE account=?1"#, params![account])?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(account: &str, id: &str, timestamp: Option<i64>, carrier: Option<&str>) -> DeliveryRecord {
        DeliveryRecord {
            message_id: id.into(),
            account: account.into(),
            sender: "UPS <pkginfo@ups.com>".into(),
            subject: format!("Package {id}"),
            date: String::new(),
            timestamp,
            rule: DeliveryRule::SenderDomain,
            matched: "ups.com".into(),
            carrier: carrier.map(str::to_string),
            recorded_at: 1_700_000_000,
        }
    }

    #[test]
    fn records_are_kept_once_per_account() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let first = record("me@example.com", "a", Some(10), Some("UPS"));

        assert_eq!(repo.record(&[first.clone()]).unwrap(), 1);
        assert_eq!(repo.record(&[first.clone()]).unwrap(), 0);
        assert_eq!(repo.record(&[record("you@example.com", "a", Some(10), None)]).unwrap(), 1);

        assert_eq!(repo.history("me@example.com").unwrap(), vec![first]);
        assert_eq!(
            repo.processed_ids("me@example.com").unwrap(),
            HashSet::from(["a".to_string()])
        );
    }

    #[test]
    fn history_is_newest_first_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.sqlite3");
        {
            let repo = SqliteRepo::open(&path).unwrap();
            repo.record(&[
                record("me@example.com", "old", Some(100), Some("UPS")),
                record("me@example.com", "new", Some(300), Some("DHL")),
                record("me@example.com", "undated", None, None),
            ])
            .unwrap();
        }

        let repo = SqliteRepo::open(&path).unwrap();
        let ids: Vec<String> = repo
            .history("me@example.com")
            .unwrap()
            .into_iter()
            .map(|r| r.message_id)
            .collect();
        // Undated records sort by when they were written.
        assert_eq!(ids, vec!["undated", "new", "old"]);
    }

    #[test]
    fn carriers_are_counted_with_unknown_bucket() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.record(&[
            record("me@example.com", "1", None, Some("UPS")),
            record("me@example.com", "2", None, Some("UPS")),
            record("me@example.com", "3", None, None),
            record("me@example.com", "4", None, Some("DHL")),
        ])
        .unwrap();

        assert_eq!(
            repo.carrier_counts("me@example.com").unwrap(),
            vec![
                ("UPS".to_string(), 2),
                ("DHL".to_string(), 1),
                ("Unknown".to_string(), 1)
            ]
        );
    }

    #[test]
    fn clear_only_touches_one_account() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.record(&[
            record("me@example.com", "1", None, None),
            record("me@example.com", "2", None, None),
            record("you@example.com", "1", None, None),
        ])
        .unwrap();

        assert_eq!(repo.clear("me@example.com").unwrap(), 2);
        assert!(repo.history("me@example.com").unwrap().is_empty());
        assert_eq!(repo.history("you@example.com").unwrap().len(), 1);
    }
}
