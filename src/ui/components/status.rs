use eframe::egui;

use crate::messenger::view::Notice;
use crate::messenger::NoticeKind;

/// Blocking error in place of the conversation. Returns true on "Retry".
pub fn fatal(ui: &mut egui::Ui, text: &str) -> bool {
    let mut retry = false;
    ui.vertical_centered(|ui| {
        ui.add_space(40.0);
        ui.colored_label(egui::Color32::RED, text);
        ui.add_space(8.0);
        retry = ui.button("Retry").clicked();
    });
    retry
}

/// Non-fatal connection banner above the conversation.
pub fn banner(ui: &mut egui::Ui, text: &str) {
    egui::Frame::new()
        .fill(egui::Color32::from_rgb(255, 243, 205))
        .inner_margin(egui::Margin::same(6))
        .show(ui, |ui| {
            ui.colored_label(egui::Color32::from_rgb(133, 100, 4), text);
        });
}

pub fn notice(ui: &mut egui::Ui, notice: &Notice) {
    let color = match notice.kind {
        NoticeKind::Success => egui::Color32::from_rgb(46, 139, 87),
        NoticeKind::Error => egui::Color32::RED,
    };
    ui.vertical_centered(|ui| {
        ui.colored_label(color, egui::RichText::new(&notice.text).strong());
    });
}
