use eframe::egui;

use crate::network::ConnectionState;

/// Title row with the connection dot and the chat toggle. Returns true when
/// the toggle was clicked.
pub fn render(ui: &mut egui::Ui, connection: ConnectionState, chat_open: bool, unread: usize) -> bool {
    let mut toggled = false;
    ui.horizontal(|ui| {
        ui.heading("Trainer");

        let (color, label) = match connection {
            ConnectionState::Open => (egui::Color32::GREEN, "online"),
            ConnectionState::Connecting => (egui::Color32::YELLOW, "connecting"),
            ConnectionState::Degraded => (egui::Color32::from_rgb(255, 165, 0), "reconnecting"),
            ConnectionState::Failed => (egui::Color32::RED, "disconnected"),
            ConnectionState::Closed => (egui::Color32::GRAY, "offline"),
        };
        ui.colored_label(color, "●");
        ui.label(egui::RichText::new(label).weak());

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            let title = if chat_open { "Close chat" } else { "💬 Messenger" };
            if ui.button(title).clicked() {
                toggled = true;
            }
            if unread > 0 && !chat_open {
                ui.colored_label(
                    egui::Color32::from_rgb(77, 114, 237),
                    format!("📩 New message from your trainer! ({unread})"),
                );
            }
        });
    });
    toggled
}
