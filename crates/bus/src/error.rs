use thiserror::Error;

/// Errors that can occur when talking to the bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker (or this subscription's channel) has shut down.
    #[error("bus closed for topic {0}")]
    Closed(String),

    /// The payload could not be serialized for publishing.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Publishing kept failing after the configured retry budget.
    #[error("publish to {topic} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        topic: String,
        attempts: u32,
        #[source]
        source: Box<BusError>,
    },
}
