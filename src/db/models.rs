use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry holding the bound meetup group urlname.
pub const URLNAME_KEY: &str = "urlname";
/// Entry holding the last resolved event, serialized as JSON.
pub const NEXT_EVENT_KEY: &str = "nextevent";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
