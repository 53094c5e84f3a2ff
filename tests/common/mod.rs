#![allow(dead_code)]

use async_trait::async_trait;
use calendar_mcp::components::google_calendar::token::{Credential, OAuthClient};
use calendar_mcp::components::google_calendar::{
    CalendarApi, CalendarHandle, Event, EventDateTime, EventList, HandleProvider, ListQuery,
};
use calendar_mcp::components::GoogleCalendar;
use calendar_mcp::config::CALENDAR_SCOPE;
use calendar_mcp::error::{auth_error, google_calendar_error, AppResult};
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Remote call recorded by the mock API
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(String, ListQuery),
    Insert(String, Event),
    Delete(String, String),
    Patch(String, String, Event),
}

/// Mock implementation of the Calendar API for testing
#[derive(Default)]
pub struct MockCalendarApi {
    pub events: Vec<Event>,
    pub fail: bool,
    calls: Mutex<Vec<Call>>,
}

impl MockCalendarApi {
    /// Create a new mock with predefined events
    pub fn new() -> Self {
        let events = vec![
            Event {
                id: Some("event1".to_string()),
                summary: Some("Test Event 1".to_string()),
                description: Some("Test Description 1".to_string()),
                location: Some("Room 1".to_string()),
                start: Some(EventDateTime {
                    date_time: Some("2023-01-01T10:00:00Z".to_string()),
                    ..Default::default()
                }),
                end: Some(EventDateTime {
                    date_time: Some("2023-01-01T11:00:00Z".to_string()),
                    ..Default::default()
                }),
            },
            Event {
                id: Some("event2".to_string()),
                summary: Some("Test Event 2".to_string()),
                start: Some(EventDateTime {
                    date: Some("2023-01-02".to_string()),
                    ..Default::default()
                }),
                end: Some(EventDateTime {
                    date: Some("2023-01-03".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];

        Self {
            events,
            ..Default::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> AppResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail {
            return Err(google_calendar_error("HTTP 500 - backend error"));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarApi for MockCalendarApi {
    async fn list_events(&self, calendar_id: &str, query: &ListQuery) -> AppResult<EventList> {
        self.record(Call::List(calendar_id.to_string(), query.clone()))?;
        Ok(EventList {
            items: self.events.clone(),
        })
    }

    async fn insert_event(&self, calendar_id: &str, event: &Event) -> AppResult<Event> {
        self.record(Call::Insert(calendar_id.to_string(), event.clone()))?;
        Ok(Event {
            id: Some("created123".to_string()),
            ..event.clone()
        })
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> AppResult<()> {
        self.record(Call::Delete(calendar_id.to_string(), event_id.to_string()))
    }

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &Event,
    ) -> AppResult<Event> {
        self.record(Call::Patch(
            calendar_id.to_string(),
            event_id.to_string(),
            patch.clone(),
        ))?;
        Ok(Event {
            id: Some(event_id.to_string()),
            ..patch.clone()
        })
    }
}

/// Handle provider that always returns the same mock, or nothing
pub struct MockProvider {
    pub api: Option<Arc<MockCalendarApi>>,
    pub requests: AtomicUsize,
}

#[async_trait]
impl HandleProvider for MockProvider {
    async fn get_handle(&self) -> Option<CalendarHandle> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.api.clone().map(|api| api as CalendarHandle)
    }
}

/// Handle provider that holds every caller until the gate is opened
pub struct GatedProvider {
    pub api: Arc<MockCalendarApi>,
    pub gate: Arc<Notify>,
}

#[async_trait]
impl HandleProvider for GatedProvider {
    async fn get_handle(&self) -> Option<CalendarHandle> {
        self.gate.notified().await;
        Some(Arc::clone(&self.api) as CalendarHandle)
    }
}

/// Calendar tools whose handle arrives only after `gate` is notified
pub fn gated_calendar(api: MockCalendarApi) -> (GoogleCalendar, Arc<Notify>) {
    let gate = Arc::new(Notify::new());
    let provider = GatedProvider {
        api: Arc::new(api),
        gate: Arc::clone(&gate),
    };
    (GoogleCalendar::new(Arc::new(provider), "primary"), gate)
}

/// Calendar tools over a mock API on the primary calendar
pub fn calendar_with(api: MockCalendarApi) -> (GoogleCalendar, Arc<MockCalendarApi>) {
    let api = Arc::new(api);
    let provider = MockProvider {
        api: Some(Arc::clone(&api)),
        requests: AtomicUsize::new(0),
    };
    (GoogleCalendar::new(Arc::new(provider), "primary"), api)
}

/// Calendar tools whose session never comes up
pub fn disconnected_calendar() -> GoogleCalendar {
    let provider = MockProvider {
        api: None,
        requests: AtomicUsize::new(0),
    };
    GoogleCalendar::new(Arc::new(provider), "primary")
}

/// Credential that is valid for another hour
pub fn fresh_credential(token: &str) -> Credential {
    Credential {
        token: token.to_string(),
        refresh_token: Some("refresh-token".to_string()),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        scopes: vec![CALENDAR_SCOPE.to_string()],
        expiry: Some(Utc::now() + Duration::hours(1)),
    }
}

/// Credential that expired an hour ago
pub fn expired_credential(token: &str) -> Credential {
    Credential {
        expiry: Some(Utc::now() - Duration::hours(1)),
        ..fresh_credential(token)
    }
}

/// OAuth client that counts calls instead of talking to Google
#[derive(Default)]
pub struct FakeOAuth {
    pub refresh_fails: bool,
    pub authorize_fails: bool,
    pub refreshes: AtomicUsize,
    pub authorizations: AtomicUsize,
}

impl FakeOAuth {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn authorizations(&self) -> usize {
        self.authorizations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthClient for FakeOAuth {
    async fn refresh(&self, credential: &Credential) -> AppResult<Credential> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_fails {
            return Err(auth_error("invalid_grant"));
        }
        Ok(Credential {
            token: "refreshed".to_string(),
            expiry: Some(Utc::now() + Duration::hours(1)),
            ..credential.clone()
        })
    }

    async fn authorize(&self, _scopes: &[String]) -> AppResult<Credential> {
        self.authorizations.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if self.authorize_fails {
            return Err(auth_error("access_denied"));
        }
        Ok(fresh_credential("consented"))
    }
}
