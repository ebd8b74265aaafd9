use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database connection error: {0}")]
    Connection(String),

    #[error("database query error: {0}")]
    Query(String),

    #[error("database migration error: {0}")]
    Migration(String),

    #[error("failed to (de)serialize {key} for room {room_id}: {message}")]
    Serialization {
        room_id: String,
        key: &'static str,
        message: String,
    },

    #[error("no settings exist for room {0}")]
    RoomNotFound(String),

    #[error("room {0} has no meetup group bound")]
    Unbound(String),

    #[error("meetup group name cannot be empty")]
    EmptyGroup,
}

impl From<diesel::result::Error> for DatabaseError {
    fn from(err: diesel::result::Error) -> Self {
        DatabaseError::Query(err.to_string())
    }
}
