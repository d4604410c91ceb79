use std::collections::{BTreeSet, HashSet};

use crate::common::{Conversation, Message, MessageId};

/// Where the initial history load stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryState {
    Loading,
    Ready,
    /// The view is unusable until a reload succeeds.
    Failed,
}

/// What `apply_incoming` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Duplicate,
    /// Held until history arrives.
    Buffered,
    /// History failed; live events are not merged into an unusable view.
    Discarded,
}

/// Ordered, deduplicated messages of the open conversation plus the
/// bookkeeping for requests in flight.
///
/// Invariants: every message belongs to `conversation`, each id appears once,
/// timestamps are non-decreasing with ties in insertion order.
#[derive(Debug)]
pub struct MessageStore {
    conversation: Conversation,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    history: HistoryState,
    early: Vec<Message>,
    deleting: BTreeSet<MessageId>,
    sends_in_flight: usize,
}

impl MessageStore {
    pub fn new(conversation: Conversation) -> Self {
        Self {
            conversation,
            messages: Vec::new(),
            ids: HashSet::new(),
            history: HistoryState::Loading,
            early: Vec::new(),
            deleting: BTreeSet::new(),
            sends_in_flight: 0,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn history(&self) -> &HistoryState {
        &self.history
    }

    pub fn is_loading(&self) -> bool {
        self.history == HistoryState::Loading
    }

    /// Replaces the contents with a fetched history, then merges whatever
    /// live events were buffered while the fetch was outstanding.
    pub fn replace_history(&mut self, history: Vec<Message>) {
        self.messages.clear();
        self.ids.clear();

        for message in history {
            if !self.conversation.contains(&message) {
                log::debug!("History contains foreign message {}; skipping", message.id);
                continue;
            }
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }
        // Stable: equal timestamps keep the server's order.
        self.messages.sort_by_key(|message| message.timestamp);
        self.history = HistoryState::Ready;

        let early = std::mem::take(&mut self.early);
        if !early.is_empty() {
            log::debug!("Flushing {} events received before history", early.len());
        }
        for message in early {
            self.insert_sorted(message);
        }
    }

    /// Adds the messages of a re-fetched history that the view missed,
    /// keeping everything already shown. Returns how many were new.
    pub fn merge_history(&mut self, history: Vec<Message>) -> usize {
        if self.history != HistoryState::Ready {
            return 0;
        }
        let mut added = 0;
        for message in history {
            if self.conversation.contains(&message) && self.insert_sorted(message) == Applied::Inserted
            {
                added += 1;
            }
        }
        added
    }

    /// Marks history as failed. The store is left empty and buffered events
    /// are dropped.
    pub fn fail_history(&mut self) {
        self.messages.clear();
        self.ids.clear();
        self.early.clear();
        self.history = HistoryState::Failed;
    }

    /// Starts over for a manual reload.
    pub fn reset_history(&mut self) {
        self.history = HistoryState::Loading;
    }

    /// Merges one accepted live message.
    pub fn apply_incoming(&mut self, message: Message) -> Applied {
        match self.history {
            HistoryState::Loading => {
                if self.early.iter().any(|held| held.id == message.id) {
                    Applied::Duplicate
                } else {
                    self.early.push(message);
                    Applied::Buffered
                }
            }
            HistoryState::Failed => Applied::Discarded,
            HistoryState::Ready => self.insert_sorted(message),
        }
    }

    fn insert_sorted(&mut self, message: Message) -> Applied {
        if !self.ids.insert(message.id.clone()) {
            return Applied::Duplicate;
        }
        let at = self
            .messages
            .partition_point(|existing| existing.timestamp <= message.timestamp);
        self.messages.insert(at, message);
        Applied::Inserted
    }

    /// Removes a message; returns it the one time it was present.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        if !self.ids.remove(id) {
            return None;
        }
        let index = self.messages.iter().position(|message| &message.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Claims the delete slot for `id`. False if a delete for it is already
    /// in flight.
    pub fn begin_delete(&mut self, id: &MessageId) -> bool {
        self.deleting.insert(id.clone())
    }

    pub fn finish_delete(&mut self, id: &MessageId) {
        self.deleting.remove(id);
    }

    pub fn deleting(&self) -> &BTreeSet<MessageId> {
        &self.deleting
    }

    pub fn begin_send(&mut self) {
        self.sends_in_flight += 1;
    }

    pub fn finish_send(&mut self) {
        self.sends_in_flight = self.sends_in_flight.saturating_sub(1);
    }

    pub fn is_sending(&self) -> bool {
        self.sends_in_flight > 0
    }
}
