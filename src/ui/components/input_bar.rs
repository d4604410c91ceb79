use eframe::egui;

/// Draft line plus Send button. Returns the draft when the user submits and
/// sending is allowed; the caller clears it once the send is accepted.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, can_send: bool) -> Option<String> {
    let mut send = false;
    ui.horizontal(|ui| {
        let response = ui.add(
            egui::TextEdit::singleline(input_text)
                .hint_text("Type your message...")
                .desired_width(ui.available_width() - 70.0),
        );
        if ui.add_enabled(can_send, egui::Button::new("Send")).clicked() {
            send = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
        }
    });

    if send && can_send {
        return Some(input_text.clone());
    }

    None
}
