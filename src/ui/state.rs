/// UI-local state of the dashboard's messenger panel.
pub struct AppState {
    pub input_text: String,
    pub chat_open: bool,
    /// Last `sent_count` seen from the mounted view.
    sent_seen: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            input_text: String::new(),
            chat_open: false,
            sent_seen: 0,
        }
    }

    /// Called when a fresh chat view mounts; its counter starts from zero.
    pub fn reset_sent(&mut self) {
        self.sent_seen = 0;
    }

    /// Clears the draft once the view reports a new accepted send.
    pub fn observe_sent(&mut self, sent_count: u64) {
        if sent_count != self.sent_seen {
            self.sent_seen = sent_count;
            self.input_text.clear();
        }
    }
}
