use super::models::{Event, EventDateTime, ListQuery};
use super::session::CalendarHandle;
use super::time::{format_local, now_local_iso, parse_iso8601, to_local_iso};
use super::GoogleCalendar;
use crate::error::Error;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::error;

/// Result count used when `maxResults` is missing or not a number
pub const DEFAULT_MAX_RESULTS: i64 = 10;

const NOT_AVAILABLE: &str = "N/A";

/// Why a tool call did not succeed. `Display` is the message handed back to the caller.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unable to communicate with the Google Calendar Service.")]
    Unavailable,

    #[error("timeMin in incorrect format. It should be in ISO format")]
    InvalidTimeMin,

    #[error("timeMax in incorrect format. It should be in ISO format")]
    InvalidTimeMax,

    #[error("Event start time not in ISO format")]
    InvalidStart,

    #[error("Event end time not in ISO format")]
    InvalidEnd,

    #[error("Events could not be retrieved.")]
    ListFailed(#[source] Error),

    #[error("Event could not be created.")]
    CreateFailed(#[source] Error),

    #[error("Event could not be deleted.")]
    DeleteFailed(#[source] Error),

    #[error("Event could not be updated.")]
    UpdateFailed(#[source] Error),
}

/// Arguments of `list_events`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListEventsRequest {
    /// Filter events by their summary (title or subject).
    pub summary: Option<String>,
    /// Filter events by text found in the event description.
    pub description: Option<String>,
    /// Filter events based on their location.
    pub location: Option<String>,
    /// ISO 8601 lower bound (exclusive) for an event's end time.
    /// Must be in local time and have a timezone offset.
    #[serde(rename = "timeMin")]
    pub time_min: Option<String>,
    /// ISO 8601 upper bound (exclusive) for an event's start time.
    /// Must be in local time and have a timezone offset.
    #[serde(rename = "timeMax")]
    pub time_max: Option<String>,
    /// Maximum number of events to return. Defaults to 10.
    #[serde(rename = "maxResults", default)]
    #[schemars(with = "Option<i64>")]
    pub max_results: Option<Value>,
}

/// Arguments of `create_event`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateEventRequest {
    /// Event start time in ISO 8601 format (e.g. '2025-04-06T10:00:00-04:00').
    pub start: String,
    /// Event end time in ISO 8601 format (e.g. '2025-04-06T11:00:00-04:00').
    pub end: String,
    /// User timezone as an IANA Time Zone Database name (e.g. "Europe/Zurich").
    #[serde(rename = "timeZone")]
    pub time_zone: String,
    /// Short title or subject of the event.
    pub summary: Option<String>,
    /// Detailed description or notes for the event.
    pub description: Option<String>,
    /// Physical or virtual location of the event.
    pub location: Option<String>,
}

/// Arguments of `delete_event`
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteEventRequest {
    /// Event identifier.
    pub event_id: String,
}

/// Arguments of `update_event`. Fields left out keep their current values.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct UpdateEventRequest {
    /// Event identifier.
    pub event_id: String,
    /// New start time in ISO 8601 format (e.g. '2025-04-06T10:00:00-04:00').
    pub start: Option<String>,
    /// New end time in ISO 8601 format (e.g. '2025-04-06T11:00:00-04:00').
    pub end: Option<String>,
    /// User timezone as an IANA Time Zone Database name (e.g. "Europe/Zurich").
    #[serde(rename = "timeZone")]
    pub time_zone: Option<String>,
    /// Short title or subject of the event.
    pub summary: Option<String>,
    /// Detailed description or notes for the event.
    pub description: Option<String>,
    /// Physical or virtual location of the event.
    pub location: Option<String>,
}

/// Events returned by `list_events`
#[derive(Debug, Clone, PartialEq)]
pub struct EventListing(pub Vec<Event>);

/// Event created by `create_event`
#[derive(Debug, Clone, PartialEq)]
pub struct Created(pub Event);

/// Event removed by `delete_event`
#[derive(Debug, Clone, PartialEq)]
pub struct Deleted {
    pub event_id: String,
}

/// Patch applied by `update_event`
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    pub event_id: String,
    pub fields: BTreeSet<&'static str>,
}

impl fmt::Display for EventListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("No upcoming events found.");
        }

        let blocks: Vec<String> = self
            .0
            .iter()
            .enumerate()
            .map(|(i, event)| render_event(i + 1, event))
            .collect();
        f.write_str(&blocks.join("\n--\n"))
    }
}

impl fmt::Display for Created {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event created with id {}",
            self.0.id.as_deref().unwrap_or(NOT_AVAILABLE)
        )
    }
}

impl fmt::Display for Deleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event with id {} is deleted.", self.event_id)
    }
}

impl fmt::Display for Updated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.fields.iter().copied().collect();
        write!(
            f,
            "Event with id {} updated with [{}]",
            self.event_id,
            fields.join(",")
        )
    }
}

/// Render either arm of a tool result as the caller-facing message
pub fn render<T: fmt::Display>(result: Result<T, ToolError>) -> String {
    match result {
        Ok(outcome) => outcome.to_string(),
        Err(e) => e.to_string(),
    }
}

fn render_event(index: usize, event: &Event) -> String {
    let time = |value: Option<&EventDateTime>| {
        value
            .and_then(EventDateTime::value)
            .map(format_local)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };
    let text = |value: &Option<String>| value.as_deref().unwrap_or(NOT_AVAILABLE).to_string();

    format!(
        "\nindex: {}\nstart: {}\nend: {}\nsummary: {}\ndescription: {}\nlocation: {}\nevent_id: {}\n",
        index,
        time(event.start.as_ref()),
        time(event.end.as_ref()),
        text(&event.summary),
        text(&event.description),
        text(&event.location),
        text(&event.id),
    )
}

/// Coerce a loosely typed `maxResults` to an integer, falling back to the default
pub fn coerce_max_results(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(DEFAULT_MAX_RESULTS),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_MAX_RESULTS),
        Some(Value::Bool(b)) => i64::from(*b),
        _ => DEFAULT_MAX_RESULTS,
    }
}

/// Validate the list arguments and turn them into an `events.list` query
pub fn build_list_query(request: &ListEventsRequest) -> Result<ListQuery, ToolError> {
    let time_min = match &request.time_min {
        Some(value) => {
            to_local_iso(&parse_iso8601(value).map_err(|_| ToolError::InvalidTimeMin)?)
        }
        None => now_local_iso(),
    };
    let time_max = request
        .time_max
        .as_deref()
        .map(|value| parse_iso8601(value).map(|dt| to_local_iso(&dt)))
        .transpose()
        .map_err(|_| ToolError::InvalidTimeMax)?;

    let q = [&request.summary, &request.description, &request.location]
        .into_iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");

    Ok(ListQuery {
        time_min,
        time_max,
        max_results: coerce_max_results(request.max_results.as_ref()),
        q: (!q.is_empty()).then_some(q),
        single_events: true,
        order_by: "startTime",
    })
}

/// Validate the create arguments and build the insert body
pub fn build_new_event(request: &CreateEventRequest) -> Result<Event, ToolError> {
    parse_iso8601(&request.start).map_err(|_| ToolError::InvalidStart)?;
    parse_iso8601(&request.end).map_err(|_| ToolError::InvalidEnd)?;

    let endpoint = |date_time: &str| EventDateTime {
        date_time: Some(date_time.to_string()),
        date: None,
        time_zone: Some(request.time_zone.clone()),
    };

    Ok(Event {
        id: None,
        start: Some(endpoint(&request.start)),
        end: Some(endpoint(&request.end)),
        summary: request.summary.clone(),
        description: request.description.clone(),
        location: request.location.clone(),
    })
}

/// Validate the update arguments and build the sparse patch body.
///
/// A time zone on its own is applied to both endpoints, so `start` and `end`
/// are sent with only `timeZone` and the server keeps their `dateTime`.
pub fn build_patch(
    request: &UpdateEventRequest,
) -> Result<(Event, BTreeSet<&'static str>), ToolError> {
    let mut patch = Event::default();
    let mut fields = BTreeSet::new();

    if let Some(start) = &request.start {
        parse_iso8601(start).map_err(|_| ToolError::InvalidStart)?;
        patch.start.get_or_insert_with(Default::default).date_time = Some(start.clone());
        fields.insert("start");
    }

    if let Some(end) = &request.end {
        parse_iso8601(end).map_err(|_| ToolError::InvalidEnd)?;
        patch.end.get_or_insert_with(Default::default).date_time = Some(end.clone());
        fields.insert("end");
    }

    if let Some(time_zone) = &request.time_zone {
        patch.start.get_or_insert_with(Default::default).time_zone = Some(time_zone.clone());
        patch.end.get_or_insert_with(Default::default).time_zone = Some(time_zone.clone());
        fields.insert("start");
        fields.insert("end");
    }

    for (name, value, slot) in [
        ("summary", &request.summary, &mut patch.summary),
        ("description", &request.description, &mut patch.description),
        ("location", &request.location, &mut patch.location),
    ] {
        if let Some(value) = value {
            *slot = Some(value.clone());
            fields.insert(name);
        }
    }

    Ok((patch, fields))
}

impl GoogleCalendar {
    async fn handle(&self) -> Result<CalendarHandle, ToolError> {
        self.provider.get_handle().await.ok_or(ToolError::Unavailable)
    }

    /// List upcoming events matching the request
    pub async fn try_list_events(
        &self,
        request: &ListEventsRequest,
    ) -> Result<EventListing, ToolError> {
        let query = build_list_query(request)?;
        let handle = self.handle().await?;

        let events = handle
            .list_events(&self.calendar_id, &query)
            .await
            .map_err(|e| {
                error!("Failed to list events: {}", e);
                ToolError::ListFailed(e)
            })?;

        Ok(EventListing(events.items))
    }

    /// Create an event
    pub async fn try_create_event(
        &self,
        request: &CreateEventRequest,
    ) -> Result<Created, ToolError> {
        let event = build_new_event(request)?;
        let handle = self.handle().await?;

        let created = handle
            .insert_event(&self.calendar_id, &event)
            .await
            .map_err(|e| {
                error!("Failed to create event: {}", e);
                ToolError::CreateFailed(e)
            })?;

        Ok(Created(created))
    }

    /// Delete an event by id
    pub async fn try_delete_event(
        &self,
        request: &DeleteEventRequest,
    ) -> Result<Deleted, ToolError> {
        let handle = self.handle().await?;

        handle
            .delete_event(&self.calendar_id, &request.event_id)
            .await
            .map_err(|e| {
                error!("Failed to delete event {}: {}", request.event_id, e);
                ToolError::DeleteFailed(e)
            })?;

        Ok(Deleted {
            event_id: request.event_id.clone(),
        })
    }

    /// Patch the supplied fields of an event
    pub async fn try_update_event(
        &self,
        request: &UpdateEventRequest,
    ) -> Result<Updated, ToolError> {
        let (patch, fields) = build_patch(request)?;
        let handle = self.handle().await?;

        handle
            .patch_event(&self.calendar_id, &request.event_id, &patch)
            .await
            .map_err(|e| {
                error!("Failed to update event {}: {}", request.event_id, e);
                ToolError::UpdateFailed(e)
            })?;

        Ok(Updated {
            event_id: request.event_id.clone(),
            fields,
        })
    }

    pub async fn list_events(&self, request: &ListEventsRequest) -> String {
        render(self.try_list_events(request).await)
    }

    pub async fn create_event(&self, request: &CreateEventRequest) -> String {
        render(self.try_create_event(request).await)
    }

    pub async fn delete_event(&self, request: &DeleteEventRequest) -> String {
        render(self.try_delete_event(request).await)
    }

    pub async fn update_event(&self, request: &UpdateEventRequest) -> String {
        render(self.try_update_event(request).await)
    }
}
