use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};
use log::debug;

use crate::config::{APP_NAME, CLIENT_SECRET_ENV};

/// Save a client secret into the OS keyring, keyed by client_id
pub fn save_client_secret(client_id: &str, client_secret: &str) -> Result<()> {
    let entry = Entry::new(APP_NAME, client_id)?;
    entry
        .set_password(client_secret)
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Load client secret from keyring by client_id
pub fn load_client_secret(client_id: &str) -> Result<Option<String>> {
    let entry = Entry::new(APP_NAME, client_id)?;
    match entry.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

/// Remove the stored client secret. Missing entries are not an error.
pub fn delete_client_secret(client_id: &str) -> Result<()> {
    let entry = Entry::new(APP_NAME, client_id)?;
    match entry.delete_credential() {
        Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

/// Keyring first, then the environment. A broken keyring only logs, so the
/// environment fallback still works on headless machines.
pub fn resolve_client_secret(client_id: &str) -> Option<String> {
    match load_client_secret(client_id) {
        Ok(Some(secret)) => return Some(secret),
        Ok(None) => {}
        Err(e) => debug!("Keyring unavailable: {e}"),
    }
    std::env::var(CLIENT_SECRET_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
}
