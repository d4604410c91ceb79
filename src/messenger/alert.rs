use tokio::sync::mpsc;

use crate::common::{Conversation, InboundEvent, Message};
use crate::network::Socket;

use super::membership::Membership;

/// Raises a badge when the trainer writes while the chat view is closed.
///
/// Lives for the whole dashboard session and shares the socket with any
/// mounted chat view.
pub struct NewMessageAlert {
    conversation: Conversation,
    events: mpsc::UnboundedReceiver<InboundEvent>,
    chat_open: bool,
    unread: usize,
    _membership: Membership,
}

/// A message from the remote participant to the local one.
pub fn is_incoming(conversation: &Conversation, message: &Message) -> bool {
    message.sender_id == conversation.remote && message.receiver_id == conversation.local
}

impl NewMessageAlert {
    pub fn watch(socket: &Socket, conversation: Conversation) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let membership = Membership::join(socket, conversation.local.clone(), tx);
        Self {
            conversation,
            events,
            chat_open: false,
            unread: 0,
            _membership: membership,
        }
    }

    /// Opening the chat clears the badge; the view shows the messages itself.
    pub fn set_chat_open(&mut self, open: bool) {
        self.chat_open = open;
        if open {
            self.unread = 0;
        }
    }

    /// Drains pending socket events. Returns how many new alerts were raised.
    pub fn poll(&mut self) -> usize {
        let mut raised = 0;
        while let Ok(event) = self.events.try_recv() {
            let InboundEvent::NewMessage(message) = event else {
                continue;
            };
            if self.chat_open || !is_incoming(&self.conversation, &message) {
                continue;
            }
            log::info!("New message from {} while chat is closed", message.sender_id);
            raised += 1;
        }
        self.unread += raised;
        raised
    }

    pub fn unread(&self) -> usize {
        self.unread
    }
}
