use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use tokio::runtime::Handle;

use crate::common::{ChatCommand, Conversation};
use crate::messenger::{Messenger, MessengerHandle, NewMessageAlert, ViewError};
use crate::network::{HttpMessageApi, Socket};

use super::components::{chat_area, header, input_bar, status};
use super::state::AppState;

const REPAINT_INTERVAL: Duration = Duration::from_millis(200);

/// Trainer page of the dashboard: connection header, new-message badge and
/// the chat view when it is open.
pub struct ChatApp {
    state: AppState,
    runtime: Handle,
    socket: Socket,
    api: Arc<HttpMessageApi>,
    conversation: Conversation,
    notice_ttl: Duration,
    alert: NewMessageAlert,
    chat: Option<MessengerHandle>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        runtime: Handle,
        socket: Socket,
        api: Arc<HttpMessageApi>,
        conversation: Conversation,
        notice_ttl: Duration,
    ) -> Self {
        let alert = NewMessageAlert::watch(&socket, conversation.clone());
        Self {
            state: AppState::new(),
            runtime,
            socket,
            api,
            conversation,
            notice_ttl,
            alert,
            chat: None,
        }
    }

    fn open_chat(&mut self) {
        if self.chat.is_some() {
            return;
        }
        let (messenger, handle) = Messenger::new(
            Arc::clone(&self.api),
            self.socket.clone(),
            self.conversation.clone(),
            self.notice_ttl,
        );
        self.runtime.spawn(messenger.run());
        self.alert.set_chat_open(true);
        self.state.reset_sent();
        self.state.chat_open = true;
        self.chat = Some(handle);
        log::info!("Opened chat with {}", self.conversation.remote);
    }

    fn close_chat(&mut self) {
        if let Some(handle) = self.chat.take() {
            // Dropping the sender ends the session too; Close just says so.
            let _ = handle.commands.try_send(ChatCommand::Close);
        }
        self.alert.set_chat_open(false);
        self.state.chat_open = false;
        log::info!("Closed chat with {}", self.conversation.remote);
    }

    fn send_command(&self, command: ChatCommand) {
        let Some(handle) = &self.chat else {
            return;
        };
        if let Err(err) = handle.commands.try_send(command) {
            log::warn!("Failed to send command to messenger: {err}");
        }
    }

    fn render_chat(&mut self, ui: &mut egui::Ui) {
        let Some(handle) = &self.chat else {
            return;
        };
        let view = handle.view.borrow().clone();
        self.state.observe_sent(view.sent_count);

        match view.critical_error() {
            Some(ViewError::Fatal(text)) => {
                if status::fatal(ui, &text) {
                    self.send_command(ChatCommand::Reload);
                }
                return;
            }
            Some(ViewError::Transient(text)) => status::banner(ui, &text),
            None => {}
        }

        if let Some(notice) = &view.notice {
            status::notice(ui, notice);
        }

        let can_send = view.can_send(&self.state.input_text);
        let input_text = &mut self.state.input_text;
        let submitted = egui::TopBottomPanel::bottom("composer")
            .show_inside(ui, |ui| {
                ui.add_space(4.0);
                let submitted = input_bar::render(ui, input_text, can_send);
                ui.add_space(4.0);
                submitted
            })
            .inner;
        if let Some(content) = submitted {
            self.send_command(ChatCommand::Send(content));
        }

        if let Some(id) = chat_area::render(ui, &view) {
            self.send_command(ChatCommand::Delete(id));
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.alert.poll();

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            let toggled = header::render(
                ui,
                self.socket.state(),
                self.state.chat_open,
                self.alert.unread(),
            );
            if toggled {
                if self.state.chat_open {
                    self.close_chat();
                } else {
                    self.open_chat();
                }
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.state.chat_open {
                self.render_chat(ui);
            } else {
                ui.vertical_centered(|ui| {
                    ui.add_space(40.0);
                    ui.label(egui::RichText::new("Open the messenger to chat with your trainer.").weak());
                });
            }
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }
}
