use thiserror::Error;

use crate::db::DatabaseError;
use crate::meetup::MeetupError;

pub const INVALID_GROUP_REPLY: &str = "Invalid group urlname";
pub const NO_BINDING_REPLY: &str = "Run !setgroup first";

/// Everything that can stop a command. Rendered to chat text only at the
/// reply boundary, see [`CommandError::user_message`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("could not reach meetup: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("meetup group not found: {group:?}")]
    NotFound { group: String },

    #[error("unexpected response from meetup: {0}")]
    Decode(String),

    #[error("room {room_id} has no meetup group bound")]
    NoBinding { room_id: String },

    #[error("settings store error: {0}")]
    Store(#[from] DatabaseError),
}

impl CommandError {
    pub fn user_message(&self) -> String {
        match self {
            CommandError::NotFound { .. } => INVALID_GROUP_REPLY.to_string(),
            CommandError::NoBinding { .. } => NO_BINDING_REPLY.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<MeetupError> for CommandError {
    fn from(err: MeetupError) -> Self {
        match err {
            MeetupError::GroupNotFound { group } => CommandError::NotFound { group },
            MeetupError::InvalidGroup(group) => CommandError::NotFound { group },
            MeetupError::Decode { .. } => CommandError::Decode(err.to_string()),
            MeetupError::Api { status, .. } => CommandError::Transport {
                status: Some(status),
                message: err.to_string(),
            },
            MeetupError::Network(_) | MeetupError::InvalidBaseUrl(_) => CommandError::Transport {
                status: None,
                message: err.to_string(),
            },
        }
    }
}
