use async_trait::async_trait;

use super::DatabaseError;
use super::models::RoomEntry;
use crate::meetup::Event;

/// Per-room settings partition: the bound meetup group and the cached next
/// event. Every write touches exactly one partition and is atomic.
#[async_trait]
pub trait RoomStateStore: Send + Sync {
    /// Creates the room's partition if it does not exist yet. Existing data
    /// is left untouched.
    async fn ensure_room(&self, room_id: &str) -> Result<(), DatabaseError>;

    /// Binds the room to `urlname`. Rebinding to a different group drops the
    /// cached event in the same transaction.
    async fn set_group(&self, room_id: &str, urlname: &str) -> Result<(), DatabaseError>;

    async fn get_group(&self, room_id: &str) -> Result<Option<String>, DatabaseError>;

    async fn set_event_snapshot(&self, room_id: &str, event: &Event) -> Result<(), DatabaseError>;

    async fn get_event_snapshot(&self, room_id: &str) -> Result<Option<Event>, DatabaseError>;

    /// Every entry of the room's partition, ordered by key.
    async fn room_entries(&self, room_id: &str) -> Result<Vec<RoomEntry>, DatabaseError>;

    async fn remove_room(&self, room_id: &str) -> Result<(), DatabaseError>;

    async fn count_rooms(&self) -> Result<i64, DatabaseError>;
}
