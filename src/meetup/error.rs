use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeetupError>;

#[derive(Debug, Error)]
pub enum MeetupError {
    #[error("network error: {0}")]
    Network(String),

    #[error("meetup group not found: {group}")]
    GroupNotFound { group: String },

    #[error("meetup api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode meetup response at {path}: {message}")]
    Decode { path: String, message: String },

    #[error("invalid meetup group name: {0:?}")]
    InvalidGroup(String),

    #[error("invalid meetup base url: {0}")]
    InvalidBaseUrl(String),
}

impl From<reqwest::Error> for MeetupError {
    fn from(err: reqwest::Error) -> Self {
        MeetupError::Network(err.to_string())
    }
}
