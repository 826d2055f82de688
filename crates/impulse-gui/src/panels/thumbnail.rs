//! Waveform overview with playhead; click to seek

use egui::{Color32, Rect, Sense, Stroke, Ui, Vec2};
use impulse_services::LoadedFile;

const PEAK_BUCKETS: usize = 1024;

pub struct ThumbnailPanel {
    peaks: Vec<(f32, f32)>,
    height: f32,
}

impl ThumbnailPanel {
    pub fn new() -> Self {
        Self { peaks: Vec::new(), height: 140.0 }
    }

    pub fn set_file(&mut self, file: &LoadedFile) {
        self.peaks = file.peaks(PEAK_BUCKETS);
    }

    /// Draw the waveform. Returns the 0..1 position clicked, if any.
    pub fn ui(&mut self, ui: &mut Ui, progress: f32) -> Option<f32> {
        let (rect, response) =
            ui.allocate_exact_size(Vec2::new(ui.available_width(), self.height), Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 2.0, Color32::from_gray(30));

        if self.peaks.is_empty() {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Drop a WAV file here",
                egui::FontId::proportional(14.0),
                Color32::from_gray(120),
            );
            return None;
        }

        let mid = rect.center().y;
        let half = rect.height() * 0.5 - 2.0;
        let column = rect.width() / self.peaks.len() as f32;
        let wave = Color32::from_rgb(90, 170, 230);
        for (i, &(lo, hi)) in self.peaks.iter().enumerate() {
            let x = rect.left() + i as f32 * column;
            let column_rect = Rect::from_min_max(
                egui::pos2(x, mid - hi.clamp(-1.0, 1.0) * half),
                egui::pos2(x + column.max(1.0), mid - lo.clamp(-1.0, 1.0) * half),
            );
            painter.rect_filled(column_rect, 0.0, wave);
        }

        let playhead_x = rect.left() + progress.clamp(0.0, 1.0) * rect.width();
        painter.line_segment(
            [egui::pos2(playhead_x, rect.top()), egui::pos2(playhead_x, rect.bottom())],
            Stroke::new(1.5, Color32::from_rgb(255, 200, 60)),
        );

        if response.clicked() || response.dragged() {
            let pos = response.interact_pointer_pos()?;
            return Some(((pos.x - rect.left()) / rect.width()).clamp(0.0, 1.0));
        }
        None
    }
}
