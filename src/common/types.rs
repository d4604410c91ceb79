use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a user or trainer as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chat item as the backend stores it. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", alias = "id")]
    pub id: MessageId,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn is_from(&self, participant: &ParticipantId) -> bool {
        &self.sender_id == participant
    }
}

/// Body of a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub content: String,
}

/// The unordered participant pair scoping one thread.
///
/// `local` is the participant this client represents; it is the only id used
/// for room membership. `remote` is the other side of the open view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conversation {
    pub local: ParticipantId,
    pub remote: ParticipantId,
}

impl Conversation {
    pub fn new(local: ParticipantId, remote: ParticipantId) -> Self {
        Self { local, remote }
    }

    /// True when `{sender, receiver}` equals this pair, in either direction.
    pub fn matches(&self, sender: &ParticipantId, receiver: &ParticipantId) -> bool {
        (sender == &self.local && receiver == &self.remote)
            || (sender == &self.remote && receiver == &self.local)
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.matches(&message.sender_id, &message.receiver_id)
    }

    /// Builds the create request for `content` sent by the local participant.
    pub fn outgoing(&self, content: impl Into<String>) -> OutgoingMessage {
        OutgoingMessage {
            sender_id: self.local.clone(),
            receiver_id: self.remote.clone(),
            content: content.into(),
        }
    }
}
