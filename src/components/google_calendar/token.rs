use crate::config::Config;
use crate::error::{auth_error, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Google's OAuth token endpoint
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECS: i64 = 10;

/// Lifetime assumed when the token endpoint does not say
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Upper bound on the lifetime accepted from the token endpoint
const MAX_EXPIRES_IN_SECS: i64 = 86_400;

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// Authorized user credential, stored in the same JSON layout Google's client
/// libraries use for `token.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(alias = "access_token")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// Response body of the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    /// Space separated granted scopes
    pub scope: Option<String>,
}

impl Credential {
    /// Whether the access token has expired at `now`. Tokens without an expiry never do.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry - Duration::seconds(EXPIRY_SKEW_SECS) <= now)
    }

    /// Whether every required scope was granted
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Build a credential from a token endpoint response.
    ///
    /// `previous` supplies the refresh token and scopes the endpoint leaves out
    /// on refresh.
    pub fn from_response(
        response: TokenResponse,
        client_id: &str,
        client_secret: &str,
        token_uri: &str,
        previous: Option<&Credential>,
        requested_scopes: &[String],
    ) -> Self {
        let expires_in = response
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .clamp(0, MAX_EXPIRES_IN_SECS);
        let scopes = match response.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => previous
                .map(|c| c.scopes.clone())
                .unwrap_or_else(|| requested_scopes.to_vec()),
        };

        Self {
            token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| previous.and_then(|c| c.refresh_token.clone())),
            token_uri: token_uri.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes,
            expiry: Some(Utc::now() + Duration::seconds(expires_in)),
        }
    }
}

/// Blob storage for the serialized credential
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read the stored blob, `None` if nothing has been stored
    async fn load(&self) -> AppResult<Option<String>>;

    /// Replace the stored blob
    async fn save(&self, contents: &str) -> AppResult<()>;
}

/// Token store backed by a file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> AppResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, contents: &str) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write next to the target and rename so readers never see a partial file
        let temp = self.temp_path();
        tokio::fs::write(&temp, contents).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// In-memory token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    contents: Mutex<Option<String>>,
    saves: Mutex<usize>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a blob
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            saves: Mutex::new(0),
        }
    }

    /// Number of times `save` has been called
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }

    pub async fn contents(&self) -> Option<String> {
        self.contents.lock().await.clone()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> AppResult<Option<String>> {
        Ok(self.contents.lock().await.clone())
    }

    async fn save(&self, contents: &str) -> AppResult<()> {
        *self.contents.lock().await = Some(contents.to_string());
        *self.saves.lock().await += 1;
        Ok(())
    }
}

/// Talks to the OAuth endpoints
#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Exchange the refresh token for a new access token
    async fn refresh(&self, credential: &Credential) -> AppResult<Credential>;

    /// Run the interactive consent flow for `scopes`
    async fn authorize(&self, scopes: &[String]) -> AppResult<Credential>;
}

/// Owns the credential lifecycle: load, refresh, consent and persist
#[derive(Clone)]
pub struct TokenManager {
    config: Arc<RwLock<Config>>,
    store: Arc<dyn TokenStore>,
    oauth: Arc<dyn OAuthClient>,
    write_lock: Arc<Mutex<()>>,
}

impl TokenManager {
    pub fn new(
        config: Arc<RwLock<Config>>,
        store: Arc<dyn TokenStore>,
        oauth: Arc<dyn OAuthClient>,
    ) -> Self {
        Self {
            config,
            store,
            oauth,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load the stored credential, treating unreadable or under-scoped tokens as absent
    pub async fn load(&self) -> Option<Credential> {
        let contents = match self.store.load().await {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                debug!("No stored token found");
                return None;
            }
            Err(e) => {
                warn!("Failed to read stored token: {}", e);
                return None;
            }
        };

        let credential: Credential = match serde_json::from_str(&contents) {
            Ok(credential) => credential,
            Err(e) => {
                warn!("Ignoring malformed stored token: {}", e);
                return None;
            }
        };

        let required = self.config.read().await.scopes.clone();
        if !credential.has_scopes(&required) {
            warn!("Ignoring stored token without the required scopes");
            return None;
        }

        Some(credential)
    }

    /// Get a usable credential, refreshing or running the consent flow as needed
    pub async fn acquire(&self) -> AppResult<Credential> {
        if let Some(credential) = self.load().await {
            if !credential.is_expired(Utc::now()) {
                debug!("Using stored token");
                return Ok(credential);
            }

            if credential.refresh_token.is_some() {
                match self.refresh(&credential).await {
                    Ok(refreshed) => return Ok(refreshed),
                    Err(e) => warn!("Token refresh failed, falling back to consent: {}", e),
                }
            }
        }

        let scopes = self.config.read().await.scopes.clone();
        info!("Starting interactive authorization");
        let credential = self.oauth.authorize(&scopes).await?;
        self.persist(&credential).await?;
        info!("Authorization complete");

        Ok(credential)
    }

    /// Exchange the refresh token for a new access token without persisting it
    pub async fn exchange(&self, credential: &Credential) -> AppResult<Credential> {
        if credential.refresh_token.is_none() {
            return Err(auth_error("No refresh token in token data"));
        }

        let refreshed = self.oauth.refresh(credential).await?;
        info!("Access token refreshed");

        Ok(refreshed)
    }

    /// Refresh an expired credential and persist the result
    pub async fn refresh(&self, credential: &Credential) -> AppResult<Credential> {
        let refreshed = self.exchange(credential).await?;
        self.persist(&refreshed).await?;

        Ok(refreshed)
    }

    /// Overwrite the stored credential
    pub async fn persist(&self, credential: &Credential) -> AppResult<()> {
        let json = serde_json::to_string_pretty(credential)?;
        let _guard = self.write_lock.lock().await;
        self.store.save(&json).await
    }
}
