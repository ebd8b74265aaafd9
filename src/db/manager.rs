use std::sync::Arc;

use diesel::connection::SimpleConnection;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::db::sqlite::{SqliteRoomStateStore, establish_connection};
use crate::db::{DatabaseError, RoomStateStore};

#[derive(Clone)]
pub struct DatabaseManager {
    sqlite_path: String,
    room_store: Arc<dyn RoomStateStore>,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let path = config.sqlite_path();
        if path.is_empty() {
            return Err(DatabaseError::Connection(
                "sqlite database path is empty".to_string(),
            ));
        }

        let room_store = Arc::new(SqliteRoomStateStore::new(Arc::new(path.clone())));

        Ok(Self {
            sqlite_path: path,
            room_store,
        })
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)?;

            let statements = [
                "PRAGMA journal_mode = WAL",
                r#"
                CREATE TABLE IF NOT EXISTS room_partitions (
                    room_id TEXT PRIMARY KEY NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS room_entries (
                    room_id TEXT NOT NULL REFERENCES room_partitions(room_id) ON DELETE CASCADE,
                    entry_key TEXT NOT NULL,
                    entry_value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (room_id, entry_key)
                )
                "#,
            ];

            for statement in statements {
                conn.batch_execute(statement)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            info!("sqlite settings store ready at {}", path);
            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn room_store(&self) -> Arc<dyn RoomStateStore> {
        self.room_store.clone()
    }

    pub fn sqlite_path(&self) -> &str {
        &self.sqlite_path
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tempfile::NamedTempFile;

    use super::DatabaseManager;
    use crate::config::DatabaseConfig;
    use crate::db::{DatabaseError, NEXT_EVENT_KEY, URLNAME_KEY};
    use crate::meetup::types::test_event;
    use crate::meetup::{EventStatus, Venue, Visibility};

    async fn manager_for(file: &NamedTempFile) -> DatabaseManager {
        let config = DatabaseConfig {
            filename: file.path().to_string_lossy().to_string(),
        };
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");
        manager
    }

    #[tokio::test]
    async fn group_is_absent_until_set_then_last_write_wins() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();

        store.ensure_room("guild-1").await.expect("ensure room");
        assert_eq!(store.get_group("guild-1").await.expect("read"), None);

        store.set_group("guild-1", "acme-hikers").await.expect("bind");
        store.set_group("guild-1", "acme-climbers").await.expect("rebind");

        assert_eq!(
            store.get_group("guild-1").await.expect("read"),
            Some("acme-climbers".to_string())
        );
    }

    #[tokio::test]
    async fn set_group_requires_an_ensured_room() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();

        let err = store
            .set_group("guild-unknown", "acme-hikers")
            .await
            .expect_err("must fail");

        assert!(matches!(err, DatabaseError::RoomNotFound(ref room) if room == "guild-unknown"));
        assert_eq!(store.count_rooms().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn set_group_rejects_empty_names() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();
        store.ensure_room("guild-1").await.expect("ensure room");

        let err = store.set_group("guild-1", "  ").await.expect_err("must fail");

        assert!(matches!(err, DatabaseError::EmptyGroup));
        assert_eq!(store.get_group("guild-1").await.expect("read"), None);
    }

    #[tokio::test]
    async fn ensure_room_is_idempotent_and_keeps_bindings() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();

        store.ensure_room("guild-1").await.expect("ensure room");
        store.set_group("guild-1", "acme-hikers").await.expect("bind");
        store.ensure_room("guild-1").await.expect("ensure room again");

        assert_eq!(
            store.get_group("guild-1").await.expect("read"),
            Some("acme-hikers".to_string())
        );
        assert_eq!(store.count_rooms().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn event_snapshot_roundtrip() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();
        store.ensure_room("guild-1").await.expect("ensure room");
        store.set_group("guild-1", "acme-hikers").await.expect("bind");

        let mut event = test_event("42", EventStatus::Upcoming, Visibility::Public);
        event.venue = Some(Venue {
            id: 9,
            name: "Trailhead".to_string(),
            lat: 45.5,
            lon: -122.25,
            address_1: "1 Forest Rd".to_string(),
            city: "Portland".to_string(),
            state: "OR".to_string(),
            zip: "97201".to_string(),
            ..Venue::default()
        });

        assert_eq!(store.get_event_snapshot("guild-1").await.expect("read"), None);
        store
            .set_event_snapshot("guild-1", &event)
            .await
            .expect("write snapshot");

        let cached = store
            .get_event_snapshot("guild-1")
            .await
            .expect("read")
            .expect("snapshot exists");
        assert_eq!(cached, event);
    }

    #[tokio::test]
    async fn event_snapshot_requires_a_binding() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();
        store.ensure_room("guild-1").await.expect("ensure room");
        let event = test_event("42", EventStatus::Upcoming, Visibility::Public);

        let err = store
            .set_event_snapshot("guild-1", &event)
            .await
            .expect_err("must fail");

        assert!(matches!(err, DatabaseError::Unbound(_)));
        assert_eq!(store.get_event_snapshot("guild-1").await.expect("read"), None);
    }

    #[tokio::test]
    async fn rebinding_to_another_group_drops_the_snapshot() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();
        store.ensure_room("guild-1").await.expect("ensure room");
        store.set_group("guild-1", "acme-hikers").await.expect("bind");
        let event = test_event("42", EventStatus::Upcoming, Visibility::Public);
        store
            .set_event_snapshot("guild-1", &event)
            .await
            .expect("write snapshot");

        store.set_group("guild-1", "acme-hikers").await.expect("same group");
        assert!(store.get_event_snapshot("guild-1").await.expect("read").is_some());

        store.set_group("guild-1", "acme-climbers").await.expect("rebind");
        assert!(store.get_event_snapshot("guild-1").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn remove_room_drops_the_whole_partition_only() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();
        for room in ["guild-1", "guild-2"] {
            store.ensure_room(room).await.expect("ensure room");
            store.set_group(room, "acme-hikers").await.expect("bind");
        }

        store.remove_room("guild-1").await.expect("remove");

        assert_eq!(store.get_group("guild-1").await.expect("read"), None);
        assert_eq!(
            store.get_group("guild-2").await.expect("read"),
            Some("acme-hikers".to_string())
        );
        assert_eq!(store.count_rooms().await.expect("count"), 1);
        let err = store
            .set_group("guild-1", "acme-hikers")
            .await
            .expect_err("partition is gone");
        assert!(matches!(err, DatabaseError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn room_entries_lists_both_fields_in_key_order() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();
        store.ensure_room("guild-1").await.expect("ensure room");
        store.set_group("guild-1", "acme-hikers").await.expect("bind");
        let event = test_event("42", EventStatus::Upcoming, Visibility::Public);
        store
            .set_event_snapshot("guild-1", &event)
            .await
            .expect("write snapshot");

        let entries = store.room_entries("guild-1").await.expect("entries");

        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec![NEXT_EVENT_KEY, URLNAME_KEY]);
        assert_eq!(entries[1].value, "acme-hikers");
    }

    #[tokio::test]
    async fn bindings_survive_reopening_the_database() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        {
            let store = manager_for(&file).await.room_store();
            store.ensure_room("guild-1").await.expect("ensure room");
            store.set_group("guild-1", "acme-hikers").await.expect("bind");
        }

        let reopened = manager_for(&file).await.room_store();

        assert_eq!(
            reopened.get_group("guild-1").await.expect("read"),
            Some("acme-hikers".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_room_are_not_lost() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let store = manager_for(&file).await.room_store();
        store.ensure_room("guild-1").await.expect("ensure room");

        let names: Vec<String> = (0..12).map(|i| format!("group-{i}")).collect();
        let mut handles = Vec::new();
        for name in names.clone() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set_group("guild-1", &name).await
            }));
        }
        for handle in handles {
            handle.await.expect("task joins").expect("write succeeds");
        }

        let stored = store
            .get_group("guild-1")
            .await
            .expect("read")
            .expect("a binding exists");
        let names: HashSet<String> = names.into_iter().collect();
        assert!(names.contains(&stored));
    }
}
