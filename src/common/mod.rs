pub mod commands;
pub mod events;
pub mod types;

pub use commands::ChatCommand;
pub use events::InboundEvent;
pub use types::{Conversation, Message, MessageId, OutgoingMessage, ParticipantId};
