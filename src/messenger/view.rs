use std::collections::BTreeSet;

use tokio::time::Instant;

use crate::common::{Message, MessageId, ParticipantId};

pub const SENT: &str = "Message sent!";
pub const SEND_FAILED: &str = "Failed to send message";
pub const DELETED: &str = "Message deleted";
pub const DELETE_FAILED: &str = "Failed to delete message";
pub const HISTORY_FAILED: &str = "Failed to load messages. Please check your connection.";
pub const SOCKET_FAILED: &str = "WebSocket connection failed. Trying to reconnect...";
pub const SOCKET_GAVE_UP: &str = "WebSocket connection lost. Restart the app to reconnect.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Short-lived, operation-local status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
    pub expires_at: Instant,
}

/// The one error the chat view should surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    /// History could not be loaded; render instead of the conversation.
    Fatal(String),
    /// Socket trouble; show as a banner above the conversation.
    Transient(String),
}

/// Snapshot the chat UI renders. Published by the session after every
/// change.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub local: ParticipantId,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub is_sending: bool,
    pub deleting: BTreeSet<MessageId>,
    pub fetch_error: Option<String>,
    pub socket_error: Option<String>,
    pub notice: Option<Notice>,
    /// Bumped for every accepted send so the UI knows when to clear input.
    pub sent_count: u64,
}

impl ViewState {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            messages: Vec::new(),
            is_loading: true,
            is_sending: false,
            deleting: BTreeSet::new(),
            fetch_error: None,
            socket_error: None,
            notice: None,
            sent_count: 0,
        }
    }

    /// Fetch failure wins over socket trouble.
    pub fn critical_error(&self) -> Option<ViewError> {
        if let Some(error) = &self.fetch_error {
            return Some(ViewError::Fatal(error.clone()));
        }
        self.socket_error.clone().map(ViewError::Transient)
    }

    pub fn is_mine(&self, message: &Message) -> bool {
        message.is_from(&self.local)
    }

    pub fn is_deleting(&self, id: &MessageId) -> bool {
        self.deleting.contains(id)
    }

    /// Whether the delete action should be offered for `message`.
    pub fn can_delete(&self, message: &Message) -> bool {
        self.is_mine(message) && !self.is_sending && !self.is_deleting(&message.id)
    }

    pub fn can_send(&self, draft: &str) -> bool {
        !draft.trim().is_empty() && !self.is_sending && self.deleting.is_empty()
    }
}
