//! Partitioned FFT convolution with off-thread impulse response preparation
//!
//! The audio thread never builds an engine. `load_impulse_response` queues the
//! raw IR to a loader thread, which trims, resamples, normalises and
//! partitions it, then hands a ready `ConvolutionEngine` back. `process` picks
//! it up with `try_recv` and crossfades from the previous engine, and retired
//! engines travel back to the loader so their memory is freed off the audio
//! thread. `reset` works the same way: the dirty engine is retired and a clean
//! one is rebuilt from the same source.

use std::fmt;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use fft_convolver::FFTConvolver;
use fundsp::hacker::db_amp;
use impulse_core::{AudioBuffer, BufferWithSampleRate, Normalise, ProcessSpec, Stereo, Trim};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::resample::{resample, ResampleError};

/// Samples quieter than this are stripped from both ends when trimming
pub const TRIM_THRESHOLD_DB: f32 = -80.0;

const CROSSFADE_SECS: f64 = 0.05;
const QUEUE_CAPACITY: usize = 8;

#[derive(Debug, Error)]
pub enum ConvolutionError {
    #[error("Impulse response contains no samples")]
    EmptyImpulse,
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error("Convolver init error: {0}")]
    Init(String),
}

/// How an impulse response is conditioned before use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub stereo: Stereo,
    pub trim: Trim,
    pub normalise: Normalise,
}

/// Raw IR kept alongside an engine so it can be rebuilt for a new format
struct ImpulseSource {
    ir: BufferWithSampleRate,
    options: LoadOptions,
    /// Counts `load_impulse_response` calls; engines from older loads are discarded
    generation: u64,
}

enum LoadRequest {
    Load {
        ir: BufferWithSampleRate,
        options: LoadOptions,
        generation: u64,
        spec: ProcessSpec,
    },
    Rebuild {
        source: Arc<ImpulseSource>,
        spec: ProcessSpec,
    },
}

/// One FFT convolver per output channel, ready to run
pub struct ConvolutionEngine {
    source: Arc<ImpulseSource>,
    spec: ProcessSpec,
    convolvers: Vec<FFTConvolver<f32>>,
    output: Vec<f32>,
    ir_len: usize,
}

impl ConvolutionEngine {
    fn build(source: Arc<ImpulseSource>, spec: &ProcessSpec) -> Result<Self, ConvolutionError> {
        let prepared = prepare_impulse(&source.ir, source.options, spec.sample_rate)?;
        let block_size = spec.maximum_block_size.max(1);
        let last_channel = prepared.num_channels() - 1;

        let mut convolvers = Vec::with_capacity(spec.num_channels);
        for channel in 0..spec.num_channels {
            let ir_channel = match source.options.stereo {
                Stereo::Yes => channel.min(last_channel),
                Stereo::No => 0,
            };
            let mut convolver = FFTConvolver::<f32>::default();
            convolver
                .init(block_size, prepared.channel(ir_channel))
                .map_err(|e| ConvolutionError::Init(format!("{e:?}")))?;
            convolvers.push(convolver);
        }

        Ok(Self {
            source,
            spec: *spec,
            convolvers,
            output: vec![0.0; block_size],
            ir_len: prepared.num_samples(),
        })
    }

    /// Length of the conditioned IR at the engine's sample rate
    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    /// Convolve `len` samples starting at `start`, in place. `len` must not
    /// exceed the prepared block size.
    fn process_range(&mut self, block: &mut AudioBuffer, start: usize, len: usize) {
        let output = &mut self.output[..len];
        for (channel, convolver) in self.convolvers.iter_mut().enumerate().take(block.num_channels()) {
            let input = &block.channel(channel)[start..start + len];
            if convolver.process(input, output).is_err() {
                continue;
            }
            block.channel_mut(channel)[start..start + len].copy_from_slice(output);
        }
    }

}

impl fmt::Debug for ConvolutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvolutionEngine")
            .field("channels", &self.convolvers.len())
            .field("ir_len", &self.ir_len)
            .field("sample_rate", &self.spec.sample_rate)
            .finish()
    }
}

struct Crossfade {
    /// Path being faded out; `None` is the dry signal
    from: Option<ConvolutionEngine>,
    position: usize,
    length: usize,
}

/// Convolution stage with glitch-free impulse response swaps
pub struct Convolution {
    spec: Option<ProcessSpec>,
    current: Option<ConvolutionEngine>,
    fade: Option<Crossfade>,
    fade_length: usize,
    scratch: AudioBuffer,
    generation: u64,
    /// Source of an engine retired by `reset`, waiting for a queue slot
    pending_rebuild: Option<Arc<ImpulseSource>>,
    request_tx: Sender<LoadRequest>,
    ready_rx: Receiver<ConvolutionEngine>,
    retire_tx: Sender<ConvolutionEngine>,
}

impl Convolution {
    pub fn new() -> Self {
        let (request_tx, request_rx) = bounded(QUEUE_CAPACITY);
        let (ready_tx, ready_rx) = bounded(QUEUE_CAPACITY);
        let (retire_tx, retire_rx) = bounded(QUEUE_CAPACITY);

        thread::spawn(move || loader_loop(request_rx, retire_rx, ready_tx));

        Self {
            spec: None,
            current: None,
            fade: None,
            fade_length: 1,
            scratch: AudioBuffer::default(),
            generation: 0,
            pending_rebuild: None,
            request_tx,
            ready_rx,
            retire_tx,
        }
    }

    /// Set up for `spec` (control thread). A loaded IR is rebuilt for the new format.
    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.spec = Some(*spec);
        self.scratch = AudioBuffer::new(spec.num_channels, spec.maximum_block_size.max(1));
        self.fade_length = ((spec.sample_rate * CROSSFADE_SECS) as usize).max(1);
        self.fade = None;

        let Some(engine) = self.current.take() else {
            return;
        };
        if engine.spec == *spec {
            self.current = Some(engine);
            return;
        }
        match ConvolutionEngine::build(engine.source.clone(), spec) {
            Ok(rebuilt) => self.current = Some(rebuilt),
            Err(e) => error!("Failed to rebuild impulse response: {}", e),
        }
    }

    /// Queue `ir` for loading. The buffer is moved out of `ir` without
    /// allocating; if the loader queue is full it is handed back untouched.
    ///
    /// Returns true when the IR was queued.
    pub fn load_impulse_response(
        &mut self,
        ir: &mut BufferWithSampleRate,
        stereo: Stereo,
        trim: Trim,
        normalise: Normalise,
    ) -> bool {
        debug_assert!(self.spec.is_some(), "load_impulse_response called before prepare");
        let Some(spec) = self.spec else {
            return false;
        };

        let generation = self.generation + 1;
        let request = LoadRequest::Load {
            ir: std::mem::take(ir),
            options: LoadOptions { stereo, trim, normalise },
            generation,
            spec,
        };
        match self.request_tx.try_send(request) {
            Ok(()) => {
                self.generation = generation;
                true
            }
            Err(TrySendError::Full(request) | TrySendError::Disconnected(request)) => {
                if let LoadRequest::Load { ir: returned, .. } = request {
                    *ir = returned;
                }
                false
            }
        }
    }

    pub fn process(&mut self, block: &mut AudioBuffer) {
        debug_assert!(self.spec.is_some(), "process called before prepare");
        let Some(spec) = self.spec else {
            return;
        };

        self.collect_ready(&spec);

        let max_block = spec.maximum_block_size.max(1);
        let total = block.num_samples();
        let mut start = 0;
        while start < total {
            let len = (total - start).min(max_block);
            self.process_range(block, start, len);
            start += len;
        }
    }

    /// Drop convolution tails and finish any crossfade immediately.
    ///
    /// Constant time: the active engine is retired and a clean copy is
    /// rebuilt on the loader thread. The dry signal passes until it arrives,
    /// then the clean engine fades in.
    pub fn reset(&mut self) {
        if let Some(fade) = self.fade.take() {
            if let Some(engine) = fade.from {
                self.retire(engine);
            }
        }
        if let Some(engine) = self.current.take() {
            self.pending_rebuild = Some(Arc::clone(&engine.source));
            self.retire(engine);
        }
        self.request_pending_rebuild();
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn is_crossfading(&self) -> bool {
        self.fade.is_some()
    }

    /// Length of the active IR in samples at the processing rate
    #[cfg(test)]
    pub(crate) fn current_ir_len(&self) -> Option<usize> {
        self.current.as_ref().map(ConvolutionEngine::ir_len)
    }

    /// Take the newest engine from the loader and start fading to it
    fn collect_ready(&mut self, spec: &ProcessSpec) {
        self.request_pending_rebuild();

        let mut newest = None;
        while let Ok(engine) = self.ready_rx.try_recv() {
            if engine.source.generation < self.generation {
                self.retire(engine);
                continue;
            }
            if let Some(stale) = newest.replace(engine) {
                self.retire(stale);
            }
        }
        let Some(engine) = newest else {
            return;
        };

        // Built for a format we've since left: ask for a rebuild
        if engine.spec != *spec {
            let _ = self.request_tx.try_send(LoadRequest::Rebuild {
                source: engine.source.clone(),
                spec: *spec,
            });
            self.retire(engine);
            return;
        }

        if let Some(interrupted) = self.fade.take() {
            if let Some(old) = interrupted.from {
                self.retire(old);
            }
        }
        let from = self.current.replace(engine);
        self.fade = Some(Crossfade { from, position: 0, length: self.fade_length });
    }

    fn process_range(&mut self, block: &mut AudioBuffer, start: usize, len: usize) {
        let Self { current, fade, scratch, .. } = self;

        let Some(crossfade) = fade.as_mut() else {
            if let Some(engine) = current.as_mut() {
                engine.process_range(block, start, len);
            }
            return;
        };

        let channels = block.num_channels().min(scratch.num_channels());
        for c in 0..channels {
            scratch.channel_mut(c)[..len].copy_from_slice(&block.channel(c)[start..start + len]);
        }
        if let Some(old) = crossfade.from.as_mut() {
            old.process_range(scratch, 0, len);
        }
        if let Some(engine) = current.as_mut() {
            engine.process_range(block, start, len);
        }

        let length = crossfade.length as f32;
        for c in 0..channels {
            let faded_out = &scratch.channel(c)[..len];
            let faded_in = &mut block.channel_mut(c)[start..start + len];
            for (i, (new, old)) in faded_in.iter_mut().zip(faded_out).enumerate() {
                let gain = ((crossfade.position + i) as f32 / length).min(1.0);
                *new = *new * gain + *old * (1.0 - gain);
            }
        }
        crossfade.position += len;

        if crossfade.position >= crossfade.length {
            if let Some(old) = self.fade.take().and_then(|done| done.from) {
                self.retire(old);
            }
        }
    }

    fn request_pending_rebuild(&mut self) {
        let (Some(source), Some(spec)) = (self.pending_rebuild.take(), self.spec) else {
            return;
        };
        if let Err(TrySendError::Full(request) | TrySendError::Disconnected(request)) =
            self.request_tx.try_send(LoadRequest::Rebuild { source, spec })
        {
            if let LoadRequest::Rebuild { source, .. } = request {
                self.pending_rebuild = Some(source);
            }
        }
    }

    /// Send an engine back to the loader thread to be dropped there
    fn retire(&mut self, engine: ConvolutionEngine) {
        // Only dropped here if the loader's queue is full
        let _ = self.retire_tx.try_send(engine);
    }
}

impl Default for Convolution {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Convolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Convolution")
            .field("spec", &self.spec)
            .field("current", &self.current)
            .field("crossfading", &self.fade.is_some())
            .finish()
    }
}

fn loader_loop(
    requests: Receiver<LoadRequest>,
    retired: Receiver<ConvolutionEngine>,
    ready: Sender<ConvolutionEngine>,
) {
    loop {
        let running = select! {
            recv(requests) -> msg => match msg {
                Ok(request) => build_newest(request, &requests, &ready),
                Err(_) => false,
            },
            recv(retired) -> msg => msg.is_ok(),
        };
        if !running {
            break;
        }
    }
    debug!("Convolution loader stopped");
}

/// Build the newest pending request, skipping any that were superseded.
/// Returns false once the audio side has gone away.
fn build_newest(
    mut request: LoadRequest,
    requests: &Receiver<LoadRequest>,
    ready: &Sender<ConvolutionEngine>,
) -> bool {
    while let Ok(newer) = requests.try_recv() {
        request = supersede(request, newer);
    }

    let (source, spec) = match request {
        LoadRequest::Load { ir, options, generation, spec } => {
            (Arc::new(ImpulseSource { ir, options, generation }), spec)
        }
        LoadRequest::Rebuild { source, spec } => (source, spec),
    };

    match ConvolutionEngine::build(source, &spec) {
        Ok(engine) => {
            info!(
                ir_len = engine.ir_len(),
                channels = spec.num_channels,
                sample_rate = spec.sample_rate,
                "Impulse response ready"
            );
            ready.send(engine).is_ok()
        }
        Err(e) => {
            error!("Failed to prepare impulse response: {}", e);
            true
        }
    }
}

/// Merge a queued request into the one that follows it. A rebuild of an
/// older IR never replaces a pending load; the load takes its format instead.
fn supersede(pending: LoadRequest, newer: LoadRequest) -> LoadRequest {
    match (pending, newer) {
        (LoadRequest::Load { ir, options, generation, .. }, LoadRequest::Rebuild { source, spec })
            if source.generation < generation =>
        {
            LoadRequest::Load { ir, options, generation, spec }
        }
        (_, newer) => newer,
    }
}

/// Trim, resample, normalise and select channels
fn prepare_impulse(
    ir: &BufferWithSampleRate,
    options: LoadOptions,
    target_rate: f64,
) -> Result<AudioBuffer, ConvolutionError> {
    let trimmed = match options.trim {
        Trim::Yes => trim_silence(&ir.buffer, db_amp(TRIM_THRESHOLD_DB) as f32),
        Trim::No => ir.buffer.clone(),
    };
    if trimmed.is_empty() {
        return Err(ConvolutionError::EmptyImpulse);
    }

    let mut buffer = resample(&trimmed, ir.sample_rate, target_rate)?;
    if buffer.is_empty() {
        return Err(ConvolutionError::EmptyImpulse);
    }

    if options.normalise == Normalise::Yes {
        normalise(&mut buffer);
    }

    if options.stereo == Stereo::No && buffer.num_channels() > 1 {
        buffer = AudioBuffer::from_channels(vec![buffer.channel(0).to_vec()]);
    }
    Ok(buffer)
}

/// Drop samples below `threshold` from both ends, across all channels
fn trim_silence(buffer: &AudioBuffer, threshold: f32) -> AudioBuffer {
    let audible = |i: usize| buffer.channels().iter().any(|ch| ch[i].abs() > threshold);
    let Some(first) = (0..buffer.num_samples()).find(|&i| audible(i)) else {
        return AudioBuffer::default();
    };
    let last = (first..buffer.num_samples()).rev().find(|&i| audible(i)).unwrap_or(first);

    AudioBuffer::from_channels(
        buffer
            .channels()
            .iter()
            .map(|ch| ch[first..=last].to_vec())
            .collect(),
    )
}

/// Scale so the loudest channel has unit energy
fn normalise(buffer: &mut AudioBuffer) {
    let max_energy = buffer
        .channels()
        .iter()
        .map(|ch| ch.iter().map(|s| s * s).sum::<f32>())
        .fold(0.0f32, f32::max);
    if max_energy <= 0.0 {
        return;
    }
    buffer.apply_gain(1.0 / max_energy.sqrt());
}
