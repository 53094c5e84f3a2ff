use crate::error::{env_error, AppResult};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Calendar the tools operate on unless configured otherwise
pub const DEFAULT_CALENDAR_ID: &str = "primary";

/// Full read/write access to the user's calendars
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Google Calendar v3 REST endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Config file picked up when `CALENDAR_CONFIG` is not set
pub const DEFAULT_CONFIG_FILE: &str = "config/calendar.toml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client secrets downloaded from Google Cloud Console
    pub credentials_path: PathBuf,
    /// Where the authorized user token is persisted
    pub token_path: PathBuf,
    /// Calendar the tools operate on
    pub calendar_id: String,
    /// Base URL of the Calendar API
    pub api_base_url: String,
    /// Scopes requested during consent and required of stored tokens
    pub scopes: Vec<String>,
    /// Port of the local redirect listener, 0 lets the OS pick one
    pub redirect_port: u16,
    /// Whether the consent flow tries to open a browser
    pub open_browser: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            calendar_id: DEFAULT_CALENDAR_ID.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scopes: vec![CALENDAR_SCOPE.to_string()],
            redirect_port: 0,
            open_browser: true,
        }
    }
}

/// Optional overrides read from the TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub credentials_path: Option<PathBuf>,
    pub token_path: Option<PathBuf>,
    pub calendar_id: Option<String>,
    pub api_base_url: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub redirect_port: Option<u16>,
    pub open_browser: Option<bool>,
}

impl Config {
    /// Load configuration from defaults, the config file and the environment
    pub fn load() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let mut config = Config::default();

        let config_file = env::var("CALENDAR_CONFIG").ok();
        let path = config_file.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);
        if config_file.is_some() || Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            config.apply_file(toml::from_str(&content)?);
        }

        config.apply_env(|key| env::var(key).ok())?;

        Ok(config)
    }

    /// Merge values from a parsed config file
    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(path) = file.credentials_path {
            self.credentials_path = path;
        }
        if let Some(path) = file.token_path {
            self.token_path = path;
        }
        if let Some(id) = file.calendar_id {
            self.calendar_id = id;
        }
        if let Some(url) = file.api_base_url {
            self.api_base_url = url;
        }
        if let Some(scopes) = file.scopes {
            self.scopes = scopes;
        }
        if let Some(port) = file.redirect_port {
            self.redirect_port = port;
        }
        if let Some(open) = file.open_browser {
            self.open_browser = open;
        }
    }

    /// Merge values from environment variables
    pub fn apply_env<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("GOOGLE_CREDENTIALS_FILE") {
            self.credentials_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("GOOGLE_TOKEN_FILE") {
            self.token_path = PathBuf::from(path);
        }
        if let Some(id) = lookup("GOOGLE_CALENDAR_ID") {
            self.calendar_id = id;
        }
        if let Some(url) = lookup("GOOGLE_CALENDAR_API_URL") {
            self.api_base_url = url;
        }
        if let Some(port) = lookup("OAUTH_REDIRECT_PORT") {
            self.redirect_port = port
                .parse::<u16>()
                .map_err(|_| env_error("Invalid OAUTH_REDIRECT_PORT format"))?;
        }
        if let Some(open) = lookup("OAUTH_OPEN_BROWSER") {
            self.open_browser = !matches!(open.to_ascii_lowercase().as_str(), "0" | "false" | "no");
        }
        Ok(())
    }
}
