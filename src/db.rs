pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{NEXT_EVENT_KEY, RoomEntry, URLNAME_KEY};
pub use self::stores::RoomStateStore;

pub mod error;
pub mod manager;
pub mod models;
pub mod schema_sqlite;
pub mod sqlite;
pub mod stores;
