use serde::{Deserialize, Serialize};

/// Start or end of an event: either a timestamp or an all-day date
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    /// The timestamp if present, otherwise the all-day date
    pub fn value(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }
}

/// Calendar event as sent to and received from the API.
///
/// Every field is optional and skipped when unset, so the same type serves
/// as an insert body and as a sparse patch body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One page of `events.list`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub items: Vec<Event>,
}

/// Query parameters of `events.list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub time_min: String,
    pub time_max: Option<String>,
    pub max_results: i64,
    /// Free-text search, omitted when empty
    pub q: Option<String>,
    pub single_events: bool,
    pub order_by: &'static str,
}

impl ListQuery {
    /// Query pairs in the form the REST endpoint expects
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("timeMin", self.time_min.clone())];
        if let Some(time_max) = &self.time_max {
            pairs.push(("timeMax", time_max.clone()));
        }
        pairs.push(("maxResults", self.max_results.to_string()));
        pairs.push(("singleEvents", self.single_events.to_string()));
        pairs.push(("orderBy", self.order_by.to_string()));
        if let Some(q) = &self.q {
            pairs.push(("q", q.clone()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_fields_are_not_serialized() {
        let event = Event {
            summary: Some("Standup".to_string()),
            start: Some(EventDateTime {
                time_zone: Some("Europe/Zurich".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"summary": "Standup", "start": {"timeZone": "Europe/Zurich"}})
        );
    }

    #[test]
    fn all_day_events_fall_back_to_date() {
        let event: Event = serde_json::from_value(json!({
            "id": "abc",
            "start": {"date": "2025-04-06"},
            "end": {"dateTime": "2025-04-07T00:00:00Z", "timeZone": "UTC"},
            "status": "confirmed"
        }))
        .unwrap();
        assert_eq!(event.start.unwrap().value(), Some("2025-04-06"));
        assert_eq!(event.end.unwrap().value(), Some("2025-04-07T00:00:00Z"));
    }

    #[test]
    fn list_query_skips_empty_bounds() {
        let query = ListQuery {
            time_min: "2025-04-06T10:00:00+00:00".to_string(),
            time_max: None,
            max_results: 10,
            q: None,
            single_events: true,
            order_by: "startTime",
        };
        let pairs = query.to_pairs();
        assert!(pairs.iter().all(|(k, _)| *k != "timeMax" && *k != "q"));
        assert!(pairs.contains(&("singleEvents", "true".to_string())));
        assert!(pairs.contains(&("orderBy", "startTime".to_string())));
    }
}
