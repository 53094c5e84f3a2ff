use super::{CommandError, CommandResult, ToolDefinition};
use crate::components::google_calendar::{
    CreateEventRequest, DeleteEventRequest, ListEventsRequest, UpdateEventRequest,
};
use crate::components::GoogleCalendar;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::info;

pub const LIST_EVENTS: &str = "list_events";
pub const CREATE_EVENT: &str = "create_event";
pub const DELETE_EVENT: &str = "delete_event";
pub const UPDATE_EVENT: &str = "update_event";

/// Calendar tool descriptions
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new::<ListEventsRequest>(
            LIST_EVENTS,
            "Retrieve a list of calendar events based on specified filters. \
             All filters are optional and can be combined to narrow down the results.",
        ),
        ToolDefinition::new::<CreateEventRequest>(
            CREATE_EVENT,
            "Creates a calendar event using the provided details.",
        ),
        ToolDefinition::new::<DeleteEventRequest>(
            DELETE_EVENT,
            "Deletes an event from the calendar.",
        ),
        ToolDefinition::new::<UpdateEventRequest>(
            UPDATE_EVENT,
            "Updates an event by replacing specified fields with new values. \
             Any fields not included in the request will retain their existing values.",
        ),
    ]
}

fn parse_args<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, CommandError> {
    // Missing arguments mean "no arguments"
    let arguments = match arguments {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };

    serde_json::from_value(arguments).map_err(|e| CommandError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Dispatch a calendar tool call
pub async fn call(calendar: &GoogleCalendar, name: &str, arguments: Value) -> CommandResult {
    info!("Running tool {}", name);

    let message = match name {
        LIST_EVENTS => {
            calendar
                .list_events(&parse_args::<ListEventsRequest>(name, arguments)?)
                .await
        }
        CREATE_EVENT => {
            calendar
                .create_event(&parse_args::<CreateEventRequest>(name, arguments)?)
                .await
        }
        DELETE_EVENT => {
            calendar
                .delete_event(&parse_args::<DeleteEventRequest>(name, arguments)?)
                .await
        }
        UPDATE_EVENT => {
            calendar
                .update_event(&parse_args::<UpdateEventRequest>(name, arguments)?)
                .await
        }
        other => return Err(CommandError::UnknownTool(other.to_string())),
    };

    Ok(message)
}
