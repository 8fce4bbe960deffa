// ============================================================================
// Logging Configuration
// ============================================================================

use crate::env_or;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Log raw user ids instead of salted hashes
    pub enable_user_identifiers: bool,
    pub hash_salt: String,
}

impl LoggingConfig {
    pub(crate) fn from_env() -> Self {
        let format = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Self {
            format,
            enable_user_identifiers: env_or("LOG_USER_IDENTIFIERS", false),
            hash_salt: std::env::var("LOG_HASH_SALT").unwrap_or_default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            enable_user_identifiers: false,
            hash_salt: String::new(),
        }
    }
}
