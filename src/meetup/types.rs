use serde::{Deserialize, Deserializer, Serialize};

/// A single event as returned by the meetup events listing. Unknown fields in
/// the upstream payload are ignored; missing or `null` fields take their zero
/// value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: EventStatus,
    #[serde(deserialize_with = "null_as_default")]
    pub visibility: Visibility,
    /// Start time in milliseconds since the epoch.
    #[serde(deserialize_with = "null_as_default")]
    pub time: i64,
    /// Offset of the event's local time from UTC, in milliseconds.
    #[serde(deserialize_with = "null_as_default")]
    pub utc_offset: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub updated: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub waitlist_count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub yes_rsvp_count: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub link: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<Venue>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Event {
    /// Only upcoming, public events are ever announced.
    pub fn is_announceable(&self) -> bool {
        self.status == EventStatus::Upcoming && self.visibility == Visibility::Public
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Past,
    #[serde(alias = "canceled")]
    Cancelled,
    Proposed,
    Suggested,
    Draft,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    PublicLimited,
    Members,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Venue {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub lat: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub lon: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub repinned: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub address_1: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address_2: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub zip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
    #[serde(deserialize_with = "null_as_default")]
    pub localized_country_name: String,
}

#[cfg(test)]
pub(crate) fn test_event(id: &str, status: EventStatus, visibility: Visibility) -> Event {
    Event {
        id: id.to_string(),
        name: format!("Event {id}"),
        status,
        visibility,
        time: 1_700_000_000_000,
        utc_offset: 0,
        updated: 1_690_000_000_000,
        waitlist_count: 0,
        yes_rsvp_count: 12,
        link: format!("https://www.meetup.com/acme-hikers/events/{id}/"),
        description: "<p>Bring water.</p>".to_string(),
        venue: None,
    }
}
