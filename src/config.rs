pub use self::parser::{
    AuthConfig, Config, DatabaseConfig, LimitsConfig, LoggingConfig, MeetupConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
