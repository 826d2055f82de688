//! Looping file playback through an audio processor

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use impulse_core::{AudioBuffer, BufferWithSampleRate, ImpulseError, ProcessSpec};
use thiserror::Error;
use tracing::info;

use crate::buffer_transfer::BufferTransfer;
use crate::dsp::AudioProcessor;
use crate::resample::{resample, ResampleError};
use crate::wav_reader;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Failed to read file: {0}")]
    Read(#[from] ImpulseError),
    #[error(transparent)]
    Resample(#[from] ResampleError),
}

/// An audio file decoded and converted to the output rate
#[derive(Debug)]
pub struct LoadedFile {
    path: PathBuf,
    audio: AudioBuffer,
    sample_rate: f64,
    source_rate: f64,
}

impl LoadedFile {
    /// Decode the WAV file at `path` and resample it to `target_rate`
    pub fn open(path: &Path, target_rate: f64) -> Result<Self, PlayerError> {
        let decoded = wav_reader::read_wav(path)?;
        Self::from_decoded(path.to_path_buf(), decoded, target_rate)
    }

    pub fn from_decoded(
        path: PathBuf,
        decoded: BufferWithSampleRate,
        target_rate: f64,
    ) -> Result<Self, PlayerError> {
        let audio = resample(&decoded.buffer, decoded.sample_rate, target_rate)?;
        if audio.is_empty() {
            return Err(ImpulseError::EmptyImpulse.into());
        }

        info!(
            path = %path.display(),
            channels = audio.num_channels(),
            frames = audio.num_samples(),
            source_rate = decoded.sample_rate,
            target_rate,
            "Loaded audio file"
        );

        Ok(Self {
            path,
            audio,
            sample_rate: target_rate,
            source_rate: decoded.sample_rate,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn audio(&self) -> &AudioBuffer {
        &self.audio
    }

    pub fn num_frames(&self) -> usize {
        self.audio.num_samples()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn source_rate(&self) -> f64 {
        self.source_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate
    }

    /// Min/max of all channels over `buckets` equal slices, for drawing
    pub fn peaks(&self, buckets: usize) -> Vec<(f32, f32)> {
        let frames = self.num_frames();
        if buckets == 0 || frames == 0 {
            return Vec::new();
        }
        (0..buckets)
            .map(|b| {
                let start = b * frames / buckets;
                let end = ((b + 1) * frames / buckets).max(start + 1).min(frames);
                self.audio
                    .channels()
                    .iter()
                    .flat_map(|ch| &ch[start..end])
                    .fold((0.0f32, 0.0f32), |(lo, hi), &s| (lo.min(s), hi.max(s)))
            })
            .collect()
    }
}

/// Transport state shared between UI and audio thread
#[derive(Debug, Default)]
pub struct TransportState {
    /// Playback position in frames
    pub position: AtomicU64,
    pub playing: AtomicBool,
    pub looping: AtomicBool,
    /// Length of the current file in frames
    pub length: AtomicU64,
}

/// Create the audio-thread player around `processor` and its control handle
pub fn file_player<P: AudioProcessor>(processor: P, looping: bool) -> (FilePlayer<P>, PlayerHandle) {
    let state = Arc::new(TransportState::default());
    state.looping.store(looping, Ordering::SeqCst);
    let incoming = Arc::new(BufferTransfer::new());

    let player = FilePlayer {
        processor,
        state: state.clone(),
        incoming: incoming.clone(),
        file: None,
        block: AudioBuffer::default(),
        spec: None,
    };
    let handle = PlayerHandle { state, incoming, current: None };
    (player, handle)
}

/// Renders the current file through the processor (audio thread)
pub struct FilePlayer<P> {
    processor: P,
    state: Arc<TransportState>,
    incoming: Arc<BufferTransfer<Option<Arc<LoadedFile>>>>,
    file: Option<Arc<LoadedFile>>,
    block: AudioBuffer,
    spec: Option<ProcessSpec>,
}

impl<P: AudioProcessor> FilePlayer<P> {
    /// Allocate the block buffer and prepare the processor. Call before streaming.
    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.block = AudioBuffer::new(spec.num_channels, spec.maximum_block_size.max(1));
        self.processor.prepare(spec);
        self.spec = Some(*spec);
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Fill an interleaved device buffer with `out_channels` channels.
    ///
    /// The processor runs even while stopped so its tails ring out.
    pub fn render(&mut self, out: &mut [f32], out_channels: usize) {
        let Some(spec) = self.spec else {
            out.fill(0.0);
            return;
        };
        if out_channels == 0 {
            return;
        }

        self.take_new_file();

        let frames = out.len() / out_channels;
        let max_block = spec.maximum_block_size.max(1);
        let mut frame = 0;
        while frame < frames {
            let len = (frames - frame).min(max_block);
            self.block.set_num_samples(len);
            fill_block(&mut self.block, self.file.as_deref(), &self.state);
            self.processor.process(&mut self.block);
            self.block
                .write_interleaved(&mut out[frame * out_channels..(frame + len) * out_channels], out_channels);
            frame += len;
        }
        out[frames * out_channels..].fill(0.0);
    }

    /// Swap in a newly loaded file. The previous one is left in the slot for
    /// the control thread to drop.
    fn take_new_file(&mut self) {
        let swapped = self
            .incoming
            .try_consume(|file| {
                std::mem::swap(&mut self.file, file);
                true
            });
        if swapped {
            self.processor.reset();
        }
    }
}

/// Copy the next `block.num_samples()` frames of `file` into `block`,
/// advancing the transport. Silence when stopped or without a file.
fn fill_block(block: &mut AudioBuffer, file: Option<&LoadedFile>, state: &TransportState) {
    let Some(file) = file.filter(|_| state.playing.load(Ordering::SeqCst)) else {
        block.clear();
        return;
    };

    let len = block.num_samples();
    let total = file.num_frames();
    let last_channel = file.audio.num_channels() - 1;
    let looping = state.looping.load(Ordering::SeqCst);
    let start = state.position.load(Ordering::SeqCst);
    let mut pos = (start as usize).min(total);
    let mut written = 0;

    while written < len {
        if pos >= total {
            if !looping {
                state.playing.store(false, Ordering::SeqCst);
                break;
            }
            pos = 0;
        }
        let n = (len - written).min(total - pos);
        for c in 0..block.num_channels() {
            let source = file.audio.channel(c.min(last_channel));
            block.channel_mut(c)[written..written + n].copy_from_slice(&source[pos..pos + n]);
        }
        written += n;
        pos += n;
    }
    for channel in block.channels_mut() {
        channel[written..].fill(0.0);
    }

    // A seek from the UI since `start` was read wins
    let _ = state
        .position
        .compare_exchange(start, pos as u64, Ordering::SeqCst, Ordering::SeqCst);
}

/// Control-side transport for a `FilePlayer`
pub struct PlayerHandle {
    state: Arc<TransportState>,
    incoming: Arc<BufferTransfer<Option<Arc<LoadedFile>>>>,
    current: Option<Arc<LoadedFile>>,
}

impl PlayerHandle {
    /// Decode `path` at `target_rate` and hand it to the player, rewound
    pub fn load(&mut self, path: &Path, target_rate: f64) -> Result<Arc<LoadedFile>, PlayerError> {
        let file = Arc::new(LoadedFile::open(path, target_rate)?);
        self.set_file(file.clone());
        Ok(file)
    }

    pub fn set_file(&mut self, file: Arc<LoadedFile>) {
        self.state.length.store(file.num_frames() as u64, Ordering::SeqCst);
        self.state.position.store(0, Ordering::SeqCst);
        self.incoming.publish(Some(file.clone()));
        self.current = Some(file);
    }

    pub fn current_file(&self) -> Option<&Arc<LoadedFile>> {
        self.current.as_ref()
    }

    /// Start playback, from the top if the previous run reached the end
    pub fn play(&self) {
        if self.current.is_none() {
            return;
        }
        if self.position() >= self.state.length.load(Ordering::SeqCst) {
            self.state.position.store(0, Ordering::SeqCst);
        }
        self.state.playing.store(true, Ordering::SeqCst);
    }

    /// Pause at the current position
    pub fn stop(&self) {
        self.state.playing.store(false, Ordering::SeqCst);
    }

    pub fn toggle_play(&self) {
        if self.is_playing() {
            self.stop();
        } else {
            self.play();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    pub fn set_looping(&self, looping: bool) {
        self.state.looping.store(looping, Ordering::SeqCst);
    }

    pub fn is_looping(&self) -> bool {
        self.state.looping.load(Ordering::SeqCst)
    }

    /// Jump to `frame`, clamped to the file length
    pub fn seek(&self, frame: u64) {
        let length = self.state.length.load(Ordering::SeqCst);
        self.state.position.store(frame.min(length), Ordering::SeqCst);
    }

    /// Playback position in frames
    pub fn position(&self) -> u64 {
        self.state.position.load(Ordering::SeqCst)
    }

    /// Playback position as a 0..1 fraction of the file
    pub fn progress(&self) -> f32 {
        let length = self.state.length.load(Ordering::SeqCst);
        if length == 0 {
            return 0.0;
        }
        (self.position() as f64 / length as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::sync::atomic::AtomicUsize;

    /// Records calls and doubles the signal
    #[derive(Default)]
    struct Doubler {
        max_block: usize,
        processed: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
    }

    impl AudioProcessor for Doubler {
        fn prepare(&mut self, spec: &ProcessSpec) {
            self.max_block = spec.maximum_block_size;
        }

        fn process(&mut self, block: &mut AudioBuffer) {
            assert!(block.num_samples() <= self.max_block);
            self.processed.fetch_add(1, Ordering::SeqCst);
            block.apply_gain(2.0);
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ramp_file(frames: usize) -> Arc<LoadedFile> {
        let left: Vec<f32> = (0..frames).map(|i| i as f32 / 100.0).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let decoded = BufferWithSampleRate::new(AudioBuffer::from_channels(vec![left, right]), 48000.0);
        Arc::new(LoadedFile::from_decoded("ramp.wav".into(), decoded, 48000.0).unwrap())
    }

    fn prepared(block: usize, looping: bool) -> (FilePlayer<Doubler>, PlayerHandle) {
        let (mut player, handle) = file_player(Doubler::default(), looping);
        player.prepare(&ProcessSpec::new(48000.0, block, 2));
        (player, handle)
    }

    #[test]
    fn test_silent_without_file() {
        let (mut player, handle) = prepared(64, true);
        handle.play();
        assert!(!handle.is_playing(), "nothing to play");

        let mut out = vec![1.0; 128];
        player.render(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(player.processor().processed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unprepared_render_is_silent() {
        let (mut player, _handle) = file_player(Doubler::default(), true);
        let mut out = vec![1.0; 32];
        player.render(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_plays_through_processor_in_chunks() {
        let (mut player, mut handle) = prepared(16, true);
        handle.set_file(ramp_file(100));
        handle.play();

        let mut out = vec![0.0; 40 * 2];
        player.render(&mut out, 2);
        assert_eq!(player.processor().resets.load(Ordering::SeqCst), 1);
        assert_eq!(player.processor().processed.load(Ordering::SeqCst), 3);
        for frame in 0..40 {
            let expected = frame as f32 / 100.0 * 2.0;
            assert!((out[frame * 2] - expected).abs() < 1e-6);
            assert!((out[frame * 2 + 1] + expected).abs() < 1e-6);
        }
        assert_eq!(handle.position(), 40);
    }

    #[test]
    fn test_looping_wraps_around() {
        let (mut player, mut handle) = prepared(64, true);
        handle.set_file(ramp_file(10));
        handle.play();

        let mut out = vec![0.0; 25];
        player.render(&mut out, 1);
        assert!((out[9] - 0.18).abs() < 1e-6);
        assert_eq!(out[10], 0.0);
        assert!((out[11] - 0.02).abs() < 1e-6);
        assert_eq!(handle.position(), 5);
        assert!(handle.is_playing());
    }

    #[test]
    fn test_stops_at_end_without_looping() {
        let (mut player, mut handle) = prepared(64, false);
        handle.set_file(ramp_file(10));
        handle.play();

        let mut out = vec![1.0; 16];
        player.render(&mut out, 1);
        assert!(out[10..].iter().all(|&s| s == 0.0));
        assert!(!handle.is_playing());

        // Playing again starts over
        handle.play();
        assert_eq!(handle.position(), 0);
    }

    #[test]
    fn test_processor_runs_while_stopped() {
        let (mut player, mut handle) = prepared(32, true);
        handle.set_file(ramp_file(100));

        let mut out = vec![0.0; 64];
        player.render(&mut out, 1);
        assert_eq!(player.processor().processed.load(Ordering::SeqCst), 2);
        assert_eq!(handle.position(), 0);
    }

    #[test]
    fn test_seek_and_toggle() {
        let (mut player, mut handle) = prepared(32, true);
        handle.set_file(ramp_file(100));
        handle.seek(500);
        assert_eq!(handle.position(), 100);
        handle.seek(50);
        assert!((handle.progress() - 0.5).abs() < 1e-6);

        handle.toggle_play();
        assert!(handle.is_playing());
        let mut out = vec![0.0; 4];
        player.render(&mut out, 1);
        assert!((out[0] - 1.0).abs() < 1e-6);

        handle.toggle_play();
        assert!(!handle.is_playing());
    }

    #[test]
    fn test_open_resamples_to_output_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for i in 0..2400 {
            writer.write_sample(((i as f32 * 0.1).sin() * 10000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let file = LoadedFile::open(&path, 48000.0).unwrap();
        assert_eq!(file.num_frames(), 4800);
        assert_eq!(file.source_rate(), 24000.0);
        assert!((file.duration_secs() - 0.1).abs() < 1e-9);
        assert_eq!(file.file_name(), "tone.wav");
        assert_eq!(file.peaks(8).len(), 8);
    }

    #[test]
    fn test_open_rejects_non_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"not audio").unwrap();
        assert!(matches!(LoadedFile::open(&path, 48000.0), Err(PlayerError::Read(_))));
    }
}
