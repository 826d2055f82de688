//! Main application state

mod config;

use std::path::{Path, PathBuf};
use std::time::Duration;

use eframe::CreationContext;
use egui::Context;
use impulse_core::ProcessSpec;
use impulse_services::{
    convolution_demo, file_player, AssetLocator, PlayerHandle, PositionControl, RealtimeOutputStream,
};

use config::{load_config, save_config, AppConfig};

use crate::panels::{ParametersPanel, PlayerHeaderAction, PlayerHeaderPanel, ThumbnailPanel};

/// Rate files are decoded at when no output device is available
const FALLBACK_SAMPLE_RATE: f64 = 44100.0;

pub struct ConvolutionDemoApp {
    control: PositionControl,
    player: PlayerHandle,
    _stream: Option<RealtimeOutputStream>,
    output_rate: f64,
    config: AppConfig,

    // Panels
    header_panel: PlayerHeaderPanel,
    thumbnail_panel: ThumbnailPanel,
    parameters_panel: ParametersPanel,

    status: Option<String>,
}

impl ConvolutionDemoApp {
    pub fn new(_cc: &CreationContext<'_>) -> Self {
        let config = load_config();

        let locator = AssetLocator::with_default_dirs(config.assets.dirs.iter().map(PathBuf::from));
        tracing::info!(dirs = ?locator.search_dirs(), "Impulse response search path");

        let (dsp, mut control) = convolution_demo(locator);
        let (mut player, handle) = file_player(dsp, config.player.looping);

        let mut status = None;
        let (stream, output_rate) = match RealtimeOutputStream::default_format() {
            Ok(format) => {
                let spec = ProcessSpec::new(
                    format.sample_rate as f64,
                    config.audio.block_size.max(1),
                    format.channels as usize,
                );
                player.prepare(&spec);

                let channels = format.channels as usize;
                match RealtimeOutputStream::start(format, move |data| player.render(data, channels)) {
                    Ok(stream) => (Some(stream), spec.sample_rate),
                    Err(e) => {
                        tracing::error!("Failed to start audio output: {}", e);
                        status = Some(format!("Audio output unavailable: {}", e));
                        (None, spec.sample_rate)
                    }
                }
            }
            Err(e) => {
                tracing::error!("No audio output: {}", e);
                status = Some(format!("Audio output unavailable: {}", e));
                (None, FALLBACK_SAMPLE_RATE)
            }
        };

        if !control.select(config.effect.position) {
            tracing::warn!("Could not restore position {:?}", config.effect.position);
        }

        let startup_file = config.startup_file();
        let mut app = Self {
            control,
            player: handle,
            _stream: stream,
            output_rate,
            config,
            header_panel: PlayerHeaderPanel::new(),
            thumbnail_panel: ThumbnailPanel::new(),
            parameters_panel: ParametersPanel::new(),
            status,
        };

        if let Some(path) = startup_file {
            app.load_file(&path);
        }
        app
    }

    fn load_file(&mut self, path: &Path) {
        match self.player.load(path, self.output_rate) {
            Ok(file) => {
                self.thumbnail_panel.set_file(&file);
                self.player.play();
                self.config.player.last_file = Some(path.display().to_string());
                self.status = None;
                save_config(&self.config);
            }
            Err(e) => {
                tracing::error!("Failed to load {}: {}", path.display(), e);
                self.status = Some(format!("Could not load {}: {}", path.display(), e));
            }
        }
    }

    fn handle_header_action(&mut self, action: PlayerHeaderAction) {
        match action {
            PlayerHeaderAction::LoadFile => {
                if let Some(path) = rfd::FileDialog::new().add_filter("WAV audio", &["wav"]).pick_file() {
                    self.load_file(&path);
                }
            }
            PlayerHeaderAction::TogglePlay => self.player.toggle_play(),
            PlayerHeaderAction::SetLooping(looping) => {
                self.player.set_looping(looping);
                self.config.player.looping = looping;
                save_config(&self.config);
            }
            PlayerHeaderAction::None => {}
        }
    }

    fn select_position(&mut self, id: u32) {
        if self.control.select_id(id) {
            self.config.effect.position = self.control.selected();
            self.status = None;
            save_config(&self.config);
        } else {
            self.status = Some("Could not load the impulse response for that position".into());
        }
    }
}

impl eframe::App for ConvolutionDemoApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        // Handle dropped files
        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|file| file.path.clone())
                .filter(|path| path.extension().is_some_and(|e| e.eq_ignore_ascii_case("wav")))
                .collect()
        });
        if let Some(path) = dropped.last() {
            self.load_file(path);
        }

        // Global spacebar → toggle playback
        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.player.toggle_play();
        }

        let header_action = egui::TopBottomPanel::top("player_header")
            .show(ctx, |ui| self.header_panel.ui(ui, &self.player, self.output_rate))
            .inner;
        self.handle_header_action(header_action);

        if let Some(status) = &self.status {
            egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
                ui.colored_label(egui::Color32::from_rgb(230, 120, 100), status.as_str());
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(fraction) = self.thumbnail_panel.ui(ui, self.player.progress()) {
                let length = self.player.current_file().map_or(0, |f| f.num_frames());
                self.player.seek((fraction as f64 * length as f64) as u64);
            }

            ui.add_space(12.0);
            ui.heading("Convolution");
            ui.separator();

            let bypassed = self.control.is_bypassed();
            if let Some(id) = self.parameters_panel.ui(ui, self.control.parameter(), bypassed) {
                self.select_position(id);
            }
        });

        if self.player.is_playing() {
            ctx.request_repaint_after(Duration::from_millis(30));
        }
    }
}
