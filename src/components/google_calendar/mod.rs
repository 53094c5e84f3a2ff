mod client;
pub mod consent;
pub mod models;
pub mod operations;
mod session;
mod time;
pub mod token;

pub use client::{CalendarApi, GoogleCalendarClient};
pub use models::{Event, EventDateTime, EventList, ListQuery};
pub use operations::{
    CreateEventRequest, DeleteEventRequest, ListEventsRequest, ToolError, UpdateEventRequest,
};
pub use session::{CalendarHandle, HandleProvider, SessionManager};
pub use time::parse_iso8601;

use crate::config::Config;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Google Calendar tools: list, create, delete and update events on one calendar
#[derive(Clone)]
pub struct GoogleCalendar {
    provider: Arc<dyn HandleProvider>,
    calendar_id: String,
}

impl GoogleCalendar {
    /// Create the tools on top of any handle provider
    pub fn new(provider: Arc<dyn HandleProvider>, calendar_id: impl Into<String>) -> Self {
        Self {
            provider,
            calendar_id: calendar_id.into(),
        }
    }

    /// Create the tools backed by a session on the configured token file
    pub async fn from_config(config: Arc<RwLock<Config>>) -> Self {
        let calendar_id = config.read().await.calendar_id.clone();
        let session = SessionManager::new(config).await;
        Self::new(Arc::new(session), calendar_id)
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }
}
