use serde_json::Value;

use super::types::Message;

/// Event names on the shared socket.
pub mod names {
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const NEW_MESSAGE: &str = "newMessage";
    pub const CONNECT: &str = "connect";
    pub const CONNECT_ERROR: &str = "connect_error";
    pub const DISCONNECT: &str = "disconnect";

    /// Events the socket raises itself; never taken from the wire.
    pub fn is_lifecycle(event: &str) -> bool {
        matches!(event, CONNECT | CONNECT_ERROR | DISCONNECT)
    }
}

/// Socket events as one chat view sees them, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    NewMessage(Message),
    Connected,
    ConnectError(String),
}

impl InboundEvent {
    /// Decodes a `newMessage` payload; `None` when it is not a message record.
    pub fn new_message(payload: &Value) -> Option<Self> {
        match serde_json::from_value::<Message>(payload.clone()) {
            Ok(message) => Some(Self::NewMessage(message)),
            Err(err) => {
                log::warn!("Dropping malformed newMessage payload: {err}");
                None
            }
        }
    }

    pub fn connect_error(payload: &Value) -> Self {
        let reason = match payload {
            Value::String(reason) => reason.clone(),
            Value::Null => "connection failed".to_string(),
            other => other.to_string(),
        };
        Self::ConnectError(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifecycle_names_are_reserved() {
        assert!(names::is_lifecycle(names::CONNECT));
        assert!(names::is_lifecycle(names::CONNECT_ERROR));
        assert!(names::is_lifecycle(names::DISCONNECT));
        assert!(!names::is_lifecycle(names::NEW_MESSAGE));
        assert!(!names::is_lifecycle(names::JOIN));
    }

    #[test]
    fn connect_error_reason_falls_back_for_null() {
        assert_eq!(
            InboundEvent::connect_error(&json!("refused")),
            InboundEvent::ConnectError("refused".into())
        );
        assert_eq!(
            InboundEvent::connect_error(&Value::Null),
            InboundEvent::ConnectError("connection failed".into())
        );
    }
}
