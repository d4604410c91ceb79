use chrono::Local;
use eframe::egui;

use crate::common::{Message, MessageId};
use crate::messenger::ViewState;

pub const EMPTY: &str = "No messages yet. Start the conversation!";

/// Sender label as shown on a bubble.
pub fn sender_label(view: &ViewState, message: &Message) -> &'static str {
    if view.is_mine(message) { "You" } else { "Trainer" }
}

/// Local wall-clock `HH:MM` of a message.
pub fn time_label(message: &Message) -> String {
    message.timestamp.with_timezone(&Local).format("%H:%M").to_string()
}

/// Renders the conversation. Returns the id whose delete button was clicked.
pub fn render(ui: &mut egui::Ui, view: &ViewState) -> Option<MessageId> {
    if view.is_loading {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.spinner();
        });
        return None;
    }

    if view.messages.is_empty() {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.label(egui::RichText::new(EMPTY).weak());
        });
        return None;
    }

    let mut clicked = None;
    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .auto_shrink([false, false])
        .show(ui, |ui| {
            for message in &view.messages {
                if let Some(id) = bubble(ui, view, message) {
                    clicked = Some(id);
                }
                ui.add_space(4.0);
            }
        });
    clicked
}

fn bubble(ui: &mut egui::Ui, view: &ViewState, message: &Message) -> Option<MessageId> {
    let mine = view.is_mine(message);
    let (layout, fill) = if mine {
        (
            egui::Layout::right_to_left(egui::Align::TOP),
            egui::Color32::from_rgb(77, 114, 237),
        )
    } else {
        (
            egui::Layout::left_to_right(egui::Align::TOP),
            egui::Color32::from_gray(60),
        )
    };

    let mut delete = false;
    ui.with_layout(layout, |ui| {
        egui::Frame::new()
            .fill(fill)
            .corner_radius(egui::CornerRadius::same(8))
            .inner_margin(egui::Margin::same(8))
            .show(ui, |ui| {
                ui.set_max_width(ui.available_width() * 0.7);
                ui.vertical(|ui| {
                    ui.horizontal(|ui| {
                        ui.label(egui::RichText::new(sender_label(view, message)).strong());
                        ui.label(egui::RichText::new(time_label(message)).small().weak());
                    });
                    ui.label(egui::RichText::new(&message.content).color(egui::Color32::WHITE));
                });
            });

        if mine {
            if view.is_deleting(&message.id) {
                ui.spinner();
            } else if ui
                .add_enabled(view.can_delete(message), egui::Button::new("🗑").small())
                .on_hover_text("Delete message")
                .clicked()
            {
                delete = true;
            }
        }
    });

    delete.then(|| message.id.clone())
}
