//! File transport bar: load, play/stop, loop and time display

use egui::{RichText, Ui};
use impulse_services::PlayerHandle;

/// Actions that can be triggered from the header
pub enum PlayerHeaderAction {
    None,
    LoadFile,
    TogglePlay,
    SetLooping(bool),
}

pub struct PlayerHeaderPanel;

impl PlayerHeaderPanel {
    pub fn new() -> Self {
        Self
    }

    pub fn ui(
        &mut self,
        ui: &mut Ui,
        player: &PlayerHandle,
        sample_rate: f64,
    ) -> PlayerHeaderAction {
        let mut action = PlayerHeaderAction::None;

        ui.horizontal(|ui| {
            ui.spacing_mut().item_spacing.x = 8.0;

            if ui.button("Load...").clicked() {
                action = PlayerHeaderAction::LoadFile;
            }

            let file = player.current_file();
            let is_playing = player.is_playing();
            let play_text = if is_playing { "\u{23F9}" } else { "\u{25B6}" };
            let play_btn = ui.add_enabled(file.is_some(), egui::Button::new(RichText::new(play_text).size(20.0)));
            if play_btn.clicked() {
                action = PlayerHeaderAction::TogglePlay;
            }
            play_btn.on_hover_text(if is_playing { "Stop" } else { "Play" });

            let mut looping = player.is_looping();
            if ui.checkbox(&mut looping, "Loop").changed() {
                action = PlayerHeaderAction::SetLooping(looping);
            }

            ui.separator();

            let secs = player.position() as f64 / sample_rate.max(1.0);
            let mins = (secs / 60.0) as u32;
            ui.label(RichText::new(format!("{:02}:{:06.3}", mins, secs % 60.0)).monospace());

            ui.separator();

            match file {
                Some(file) => ui.label(file.file_name()),
                None => ui.weak("No file loaded"),
            };
        });

        action
    }
}
