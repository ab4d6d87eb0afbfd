use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "rs_delivery_mail";

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/callback";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Read-only mail access.
pub const MAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Environment fallback for the client secret when the keyring has none.
pub const CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub page_size: Option<u32>,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub api_base_url: Option<String>,
    /// SQLite file holding the delivery history.
    pub history_db: Option<String>,
}

impl Config {
    fn template() -> Self {
        Self {
            client_id: "YOUR_CLIENT_ID.apps.googleusercontent.com".to_string(),
            redirect_uri: Some(DEFAULT_REDIRECT_URI.to_string()),
            page_size: Some(DEFAULT_PAGE_SIZE),
            auth_url: None,
            token_url: None,
            api_base_url: None,
            history_db: None,
        }
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or(DEFAULT_REDIRECT_URI)
    }

    /// Page size clamped to what the Gmail list endpoint accepts.
    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 500)
    }

    pub fn auth_url(&self) -> &str {
        self.auth_url.as_deref().unwrap_or(DEFAULT_AUTH_URL)
    }

    pub fn token_url(&self) -> &str {
        self.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL)
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    pub fn history_path(&self) -> Result<PathBuf> {
        match self.history_db.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Ok(config_dir()?.join("history.sqlite3")),
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join(APP_NAME);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(format!("{APP_NAME}.log")))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

/// Loads the config at `path`, writing a template there first if it is missing.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        let tom = toml::to_string_pretty(&Config::template())?;
        fs::write(path, tom)?;
        return Err(anyhow!(
            "Created template config at {}. Edit it and run again",
            path.display()
        ));
    }
    let s = fs::read_to_string(path)?;
    let cfg: Config = toml::from_str(&s)?;
    if cfg.client_id.trim().is_empty() {
        return Err(anyhow!("client_id is empty in {}", path.display()));
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_template_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("Created template config"));

        let written = load_config_from(&path).unwrap();
        assert_eq!(written, Config::template());
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "client_id = \"abc.apps.googleusercontent.com\"\n").unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.redirect_uri(), DEFAULT_REDIRECT_URI);
        assert_eq!(cfg.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(cfg.token_url(), DEFAULT_TOKEN_URL);
        assert_eq!(cfg.api_base_url(), DEFAULT_API_BASE);
    }

    #[test]
    fn history_path_can_be_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "client_id = \"abc\"\nhistory_db = \"/var/tmp/deliveries.sqlite3\"\n",
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(
            cfg.history_path().unwrap(),
            PathBuf::from("/var/tmp/deliveries.sqlite3")
        );
    }

    #[test]
    fn page_size_is_clamped() {
        let mut cfg = Config::template();
        cfg.page_size = Some(0);
        assert_eq!(cfg.page_size(), 1);
        cfg.page_size = Some(10_000);
        assert_eq!(cfg.page_size(), 500);
    }

    #[test]
    fn blank_client_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "client_id = \"  \"\n").unwrap();
        assert!(load_config_from(&path).is_err());
    }
}
