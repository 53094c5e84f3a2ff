use super::models::{Event, EventList, ListQuery};
use super::token::{Credential, TokenManager};
use crate::error::{google_calendar_error, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

/// Remote calendar operations used by the tools
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// `events.list`
    async fn list_events(&self, calendar_id: &str, query: &ListQuery) -> AppResult<EventList>;

    /// `events.insert`, returns the created event
    async fn insert_event(&self, calendar_id: &str, event: &Event) -> AppResult<Event>;

    /// `events.delete`
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> AppResult<()>;

    /// `events.patch`, returns the updated event
    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &Event,
    ) -> AppResult<Event>;
}

/// Authenticated Google Calendar REST client bound to one credential
pub struct GoogleCalendarClient {
    base_url: Url,
    client: Client,
    credential: RwLock<Credential>,
    token_manager: TokenManager,
}

impl GoogleCalendarClient {
    pub fn new(
        base_url: &str,
        credential: Credential,
        token_manager: TokenManager,
    ) -> AppResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| google_calendar_error(&format!("Failed to parse URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(google_calendar_error("API base URL cannot have path segments"));
        }

        Ok(Self {
            base_url,
            client: Client::new(),
            credential: RwLock::new(credential),
            token_manager,
        })
    }

    /// `{base}/calendars/{calendar_id}/events[/{event_id}]` with each segment escaped
    pub fn events_url(&self, calendar_id: &str, event_id: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["calendars", calendar_id, "events"]);
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        url
    }

    /// Current access token, refreshed first if it has expired
    async fn access_token(&self) -> AppResult<String> {
        {
            let credential = self.credential.read().await;
            if !credential.is_expired(Utc::now()) || credential.refresh_token.is_none() {
                return Ok(credential.token.clone());
            }
        }

        let mut credential = self.credential.write().await;
        // Another request may have refreshed while we waited for the lock
        if credential.is_expired(Utc::now()) {
            match self.token_manager.exchange(&credential).await {
                Ok(refreshed) => {
                    *credential = refreshed;
                    // The in-memory token stays usable even if the file cannot be written
                    if let Err(e) = self.token_manager.persist(&credential).await {
                        warn!("Failed to save refreshed token: {}", e);
                    }
                }
                Err(e) => warn!("Access token refresh failed: {}", e),
            }
        }
        Ok(credential.token.clone())
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> AppResult<Response> {
        let token = self.access_token().await?;
        debug!("{} {}", method, url);

        let request = build(self.client.request(method, url).bearer_auth(token));
        let response = request
            .send()
            .await
            .map_err(|e| google_calendar_error(&format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(google_calendar_error(&format!(
                "HTTP {} - {}",
                status, error_body
            )));
        }

        Ok(response)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> AppResult<T> {
        response
            .json()
            .await
            .map_err(|e| google_calendar_error(&format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_events(&self, calendar_id: &str, query: &ListQuery) -> AppResult<EventList> {
        let mut url = self.events_url(calendar_id, None);
        for (key, value) in query.to_pairs() {
            url.query_pairs_mut().append_pair(key, &value);
        }

        let response = self.send(Method::GET, url, |r| r).await?;
        Self::json(response).await
    }

    async fn insert_event(&self, calendar_id: &str, event: &Event) -> AppResult<Event> {
        let url = self.events_url(calendar_id, None);
        let response = self.send(Method::POST, url, |r| r.json(event)).await?;
        Self::json(response).await
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> AppResult<()> {
        let url = self.events_url(calendar_id, Some(event_id));
        self.send(Method::DELETE, url, |r| r).await?;
        Ok(())
    }

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &Event,
    ) -> AppResult<Event> {
        let url = self.events_url(calendar_id, Some(event_id));
        let response = self.send(Method::PATCH, url, |r| r.json(patch)).await?;
        Self::json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::google_calendar::token::{MemoryTokenStore, OAuthClient, TokenStore};
    use crate::config::Config;
    use crate::error::Error;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Refreshes to `fresh` after a short delay, counting calls
    #[derive(Default)]
    struct CountingOAuth {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl OAuthClient for CountingOAuth {
        async fn refresh(&self, credential: &Credential) -> AppResult<Credential> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(Credential {
                token: "fresh".to_string(),
                expiry: Some(Utc::now() + Duration::hours(1)),
                ..credential.clone()
            })
        }

        async fn authorize(&self, _scopes: &[String]) -> AppResult<Credential> {
            Err(google_calendar_error("offline"))
        }
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl TokenStore for ReadOnlyStore {
        async fn load(&self) -> AppResult<Option<String>> {
            Ok(None)
        }

        async fn save(&self, _contents: &str) -> AppResult<()> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            )))
        }
    }

    fn credential(token: &str, expiry: Option<chrono::DateTime<Utc>>) -> Credential {
        Credential {
            token: token.to_string(),
            refresh_token: Some("refresh".to_string()),
            token_uri: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: Vec::new(),
            expiry,
        }
    }

    fn client_with(
        credential: Credential,
        store: Arc<dyn TokenStore>,
        oauth: Arc<dyn OAuthClient>,
    ) -> GoogleCalendarClient {
        let manager = TokenManager::new(Arc::new(RwLock::new(Config::default())), store, oauth);
        GoogleCalendarClient::new("https://www.googleapis.com/calendar/v3", credential, manager)
            .unwrap()
    }

    fn expired(token: &str) -> Credential {
        credential(token, Some(Utc::now() - Duration::hours(1)))
    }

    fn client(base: &str) -> GoogleCalendarClient {
        let manager = TokenManager::new(
            Arc::new(RwLock::new(Config::default())),
            Arc::new(MemoryTokenStore::new()),
            Arc::new(CountingOAuth::default()),
        );
        GoogleCalendarClient::new(base, credential("access", None), manager).unwrap()
    }

    #[test]
    fn event_urls_escape_segments() {
        let client = client("https://www.googleapis.com/calendar/v3");
        assert_eq!(
            client.events_url("primary", None).as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/primary/events"
        );
        assert_eq!(
            client.events_url("team@example.com", Some("a b/c")).as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team@example.com/events/a%20b%2Fc"
        );
    }

    #[test]
    fn trailing_slash_in_base_is_tolerated() {
        let client = client("http://127.0.0.1:9000/calendar/v3/");
        assert_eq!(
            client.events_url("primary", Some("x")).as_str(),
            "http://127.0.0.1:9000/calendar/v3/calendars/primary/events/x"
        );
    }

    #[tokio::test]
    async fn unexpired_token_is_used_as_is() {
        let client = client("https://www.googleapis.com/calendar/v3");
        assert_eq!(client.access_token().await.unwrap(), "access");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_saved() {
        let store = Arc::new(MemoryTokenStore::new());
        let oauth = Arc::new(CountingOAuth::default());
        let client = client_with(expired("stale"), store.clone(), oauth.clone());

        assert_eq!(client.access_token().await.unwrap(), "fresh");
        assert_eq!(client.access_token().await.unwrap(), "fresh");
        assert_eq!(oauth.refreshes.load(Ordering::SeqCst), 1);

        let saved: Credential = serde_json::from_str(&store.contents().await.unwrap()).unwrap();
        assert_eq!(saved.token, "fresh");
    }

    #[tokio::test]
    async fn refreshed_token_is_kept_when_saving_fails() {
        let oauth = Arc::new(CountingOAuth::default());
        let client = client_with(expired("stale"), Arc::new(ReadOnlyStore), oauth.clone());

        assert_eq!(client.access_token().await.unwrap(), "fresh");
        assert_eq!(client.access_token().await.unwrap(), "fresh");
        assert_eq!(oauth.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_refresh() {
        let store = Arc::new(MemoryTokenStore::new());
        let oauth = Arc::new(CountingOAuth::default());
        let client = client_with(expired("stale"), store.clone(), oauth.clone());

        let tokens = futures::future::join_all((0..8).map(|_| client.access_token())).await;

        assert!(tokens.into_iter().all(|t| t.unwrap() == "fresh"));
        assert_eq!(oauth.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(store.save_count().await, 1);
    }
}
