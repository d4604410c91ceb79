use super::types::MessageId;

/// Actions the chat view sends to its messenger session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send(String),
    Delete(MessageId),
    /// Fetch history again, e.g. after it failed to load.
    Reload,
    /// Unmount the view. Dropping the command sender has the same effect.
    Close,
}
