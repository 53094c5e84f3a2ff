use super::client::{CalendarApi, GoogleCalendarClient};
use super::consent::GoogleOAuthClient;
use super::token::{FileTokenStore, OAuthClient, TokenManager, TokenStore};
use crate::config::Config;
use crate::error::AppResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{error, info};

/// Shared, authenticated calendar client
pub type CalendarHandle = Arc<dyn CalendarApi>;

/// Source of the calendar handle used by the tools
#[async_trait]
pub trait HandleProvider: Send + Sync {
    /// The live handle, or `None` if the service could not be reached
    async fn get_handle(&self) -> Option<CalendarHandle>;
}

/// Lazily builds the calendar handle once and shares it for the life of the process.
///
/// Concurrent first callers wait on the same construction, so at most one
/// consent flow runs. A failed construction leaves the cell empty and the
/// next call tries again.
pub struct SessionManager {
    config: Arc<RwLock<Config>>,
    token_manager: TokenManager,
    handle: OnceCell<CalendarHandle>,
}

impl SessionManager {
    /// Session manager backed by the configured token file and Google's OAuth endpoints
    pub async fn new(config: Arc<RwLock<Config>>) -> Self {
        let token_path = config.read().await.token_path.clone();
        let store = Arc::new(FileTokenStore::new(token_path));
        let oauth = Arc::new(GoogleOAuthClient::new(Arc::clone(&config)));
        Self::with_parts(config, store, oauth)
    }

    /// Session manager with injected storage and OAuth client
    pub fn with_parts(
        config: Arc<RwLock<Config>>,
        store: Arc<dyn TokenStore>,
        oauth: Arc<dyn OAuthClient>,
    ) -> Self {
        Self {
            token_manager: TokenManager::new(Arc::clone(&config), store, oauth),
            config,
            handle: OnceCell::new(),
        }
    }

    /// Whether a handle has been built
    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }

    async fn connect(&self) -> AppResult<CalendarHandle> {
        let credential = self.token_manager.acquire().await?;
        let base_url = self.config.read().await.api_base_url.clone();
        let client = GoogleCalendarClient::new(&base_url, credential, self.token_manager.clone())?;

        info!("Google Calendar service initialized");
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl HandleProvider for SessionManager {
    async fn get_handle(&self) -> Option<CalendarHandle> {
        match self.handle.get_or_try_init(|| self.connect()).await {
            Ok(handle) => Some(Arc::clone(handle)),
            Err(e) => {
                error!("Calendar service could not be initialized: {}", e);
                None
            }
        }
    }
}
