use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One event on the wire: a WebSocket text message `{"event": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame has an empty event name")]
    MissingEvent,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let frame: Frame = serde_json::from_str(text)?;
        if frame.event.is_empty() {
            return Err(FrameError::MissingEvent);
        }
        Ok(frame)
    }
}
