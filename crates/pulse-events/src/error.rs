use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("Event bus connection failed: {0}")]
    Connect(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Invalid routing pattern '{0}'")]
    InvalidPattern(String),

    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
