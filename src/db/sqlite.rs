use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::db::schema_sqlite::{room_entries, room_partitions};
use crate::meetup::Event;

use super::{
    DatabaseError,
    models::{NEXT_EVENT_KEY, RoomEntry, URLNAME_KEY},
};

const BUSY_TIMEOUT_MS: u32 = 5000;

// Helper function to convert DateTime to ISO string for SQLite
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

// Helper function to parse ISO string to DateTime
fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = room_entries)]
struct DbRoomEntry {
    #[allow(dead_code)]
    room_id: String,
    entry_key: String,
    entry_value: String,
    updated_at: String,
}

impl DbRoomEntry {
    fn to_room_entry(&self) -> Result<RoomEntry, DatabaseError> {
        Ok(RoomEntry {
            key: self.entry_key.clone(),
            value: self.entry_value.clone(),
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = room_partitions)]
struct NewRoomPartition<'a> {
    room_id: &'a str,
    created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = room_entries)]
struct NewRoomEntry<'a> {
    room_id: &'a str,
    entry_key: &'a str,
    entry_value: &'a str,
    updated_at: String,
}

#[derive(AsChangeset)]
#[diesel(table_name = room_entries)]
struct UpdateRoomEntry<'a> {
    entry_value: &'a str,
    updated_at: String,
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    conn.batch_execute(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"))
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

fn require_partition(conn: &mut SqliteConnection, room: &str) -> Result<(), DatabaseError> {
    let exists: bool = diesel::select(diesel::dsl::exists(
        room_partitions::table.filter(room_partitions::room_id.eq(room)),
    ))
    .get_result(conn)?;

    if exists {
        Ok(())
    } else {
        Err(DatabaseError::RoomNotFound(room.to_string()))
    }
}

fn read_entry(
    conn: &mut SqliteConnection,
    room: &str,
    key: &str,
) -> Result<Option<String>, DatabaseError> {
    Ok(room_entries::table
        .filter(room_entries::room_id.eq(room))
        .filter(room_entries::entry_key.eq(key))
        .select(room_entries::entry_value)
        .first::<String>(conn)
        .optional()?)
}

fn write_entry(
    conn: &mut SqliteConnection,
    room: &str,
    key: &str,
    value: &str,
) -> Result<(), DatabaseError> {
    let now = datetime_to_string(&Utc::now());
    let new_entry = NewRoomEntry {
        room_id: room,
        entry_key: key,
        entry_value: value,
        updated_at: now.clone(),
    };
    let changes = UpdateRoomEntry {
        entry_value: value,
        updated_at: now,
    };

    diesel::insert_into(room_entries::table)
        .values(&new_entry)
        .on_conflict((room_entries::room_id, room_entries::entry_key))
        .do_update()
        .set(&changes)
        .execute(conn)?;
    Ok(())
}

fn delete_entry(conn: &mut SqliteConnection, room: &str, key: &str) -> Result<(), DatabaseError> {
    diesel::delete(
        room_entries::table
            .filter(room_entries::room_id.eq(room))
            .filter(room_entries::entry_key.eq(key)),
    )
    .execute(conn)?;
    Ok(())
}

/// Hands out one async lock per room so writes to the same partition queue
/// up inside the process instead of contending on the SQLite write lock.
#[derive(Default)]
struct PartitionLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PartitionLocks {
    async fn acquire(&self, room_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry(room_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    fn forget(&self, room_id: &str) {
        self.locks.lock().remove(room_id);
    }
}

pub struct SqliteRoomStateStore {
    db_path: Arc<String>,
    partition_locks: Arc<PartitionLocks>,
}

impl SqliteRoomStateStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self {
            db_path,
            partition_locks: Arc::new(PartitionLocks::default()),
        }
    }
}

#[async_trait]
impl super::RoomStateStore for SqliteRoomStateStore {
    async fn ensure_room(&self, room_id: &str) -> Result<(), DatabaseError> {
        let _guard = self.partition_locks.acquire(room_id).await;
        let room_id = room_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), DatabaseError> {
            let mut conn = establish_connection(&db_path)?;
            let created = diesel::insert_or_ignore_into(room_partitions::table)
                .values(&NewRoomPartition {
                    room_id: &room_id,
                    created_at: datetime_to_string(&Utc::now()),
                })
                .execute(&mut conn)?;
            if created > 0 {
                debug!("created settings partition room_id={}", room_id);
            }
            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn set_group(&self, room_id: &str, urlname: &str) -> Result<(), DatabaseError> {
        if urlname.trim().is_empty() {
            return Err(DatabaseError::EmptyGroup);
        }

        let _guard = self.partition_locks.acquire(room_id).await;
        let room_id = room_id.to_string();
        let urlname = urlname.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
                require_partition(conn, &room_id)?;
                let previous = read_entry(conn, &room_id, URLNAME_KEY)?;
                write_entry(conn, &room_id, URLNAME_KEY, &urlname)?;
                if previous.is_some_and(|previous| previous != urlname) {
                    delete_entry(conn, &room_id, NEXT_EVENT_KEY)?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn get_group(&self, room_id: &str) -> Result<Option<String>, DatabaseError> {
        let room_id = room_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            read_entry(&mut conn, &room_id, URLNAME_KEY)
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn set_event_snapshot(&self, room_id: &str, event: &Event) -> Result<(), DatabaseError> {
        let serialized =
            serde_json::to_string(event).map_err(|e| DatabaseError::Serialization {
                room_id: room_id.to_string(),
                key: NEXT_EVENT_KEY,
                message: e.to_string(),
            })?;

        let _guard = self.partition_locks.acquire(room_id).await;
        let room_id = room_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
                require_partition(conn, &room_id)?;
                if read_entry(conn, &room_id, URLNAME_KEY)?.is_none() {
                    return Err(DatabaseError::Unbound(room_id.clone()));
                }
                write_entry(conn, &room_id, NEXT_EVENT_KEY, &serialized)
            })
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn get_event_snapshot(&self, room_id: &str) -> Result<Option<Event>, DatabaseError> {
        let room_id = room_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            read_entry(&mut conn, &room_id, NEXT_EVENT_KEY)?
                .map(|value| {
                    serde_json::from_str::<Event>(&value).map_err(|e| {
                        DatabaseError::Serialization {
                            room_id: room_id.clone(),
                            key: NEXT_EVENT_KEY,
                            message: e.to_string(),
                        }
                    })
                })
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn room_entries(&self, room_id: &str) -> Result<Vec<RoomEntry>, DatabaseError> {
        let room_id = room_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let results = room_entries::table
                .filter(room_entries::room_id.eq(&room_id))
                .order(room_entries::entry_key.asc())
                .select(DbRoomEntry::as_select())
                .load::<DbRoomEntry>(&mut conn)?;
            results.iter().map(DbRoomEntry::to_room_entry).collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn remove_room(&self, room_id: &str) -> Result<(), DatabaseError> {
        let guard = self.partition_locks.acquire(room_id).await;
        let room = room_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            conn.immediate_transaction::<_, DatabaseError, _>(|conn| {
                diesel::delete(room_entries::table.filter(room_entries::room_id.eq(&room)))
                    .execute(conn)?;
                diesel::delete(room_partitions::table.filter(room_partitions::room_id.eq(&room)))
                    .execute(conn)?;
                Ok(())
            })
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))??;

        drop(guard);
        self.partition_locks.forget(room_id);
        Ok(())
    }

    async fn count_rooms(&self) -> Result<i64, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            Ok(room_partitions::table
                .count()
                .get_result::<i64>(&mut conn)?)
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}
