use crate::common::{Conversation, Message};

use super::store::{Applied, MessageStore};

/// Outcome of routing one live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted(Applied),
    /// Belongs to another conversation on the same connection.
    Dropped,
}

/// The pair filter. Room membership is per local participant, so the
/// connection carries events for every thread that participant is in; only
/// `local <-> remote` traffic, in either direction, belongs to the open view.
pub fn belongs_to(conversation: &Conversation, message: &Message) -> bool {
    conversation.contains(message)
}

/// Gates one inbound `newMessage` and merges it into the store if accepted.
pub fn reconcile(store: &mut MessageStore, message: Message) -> Delivery {
    if !belongs_to(store.conversation(), &message) {
        log::debug!(
            "Dropping message {} for {} -> {}",
            message.id,
            message.sender_id,
            message.receiver_id
        );
        return Delivery::Dropped;
    }
    Delivery::Accepted(store.apply_incoming(message))
}
