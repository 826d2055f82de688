//! Convolution reverb effect: position selector, IR handoff and the
//! convolution → reverb chain

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use impulse_core::{
    AudioBuffer, BufferWithSampleRate, Choice, ChoiceParameter, Normalise, Position, ProcessSpec,
    ReverbParameters, Stereo, Trim,
};
use tracing::{error, info, warn};

use crate::assets::AssetLocator;
use crate::buffer_transfer::BufferTransfer;
use crate::dsp::{AudioProcessor, Convolution, Reverb};
use crate::resolver::ImpulseResolver;

/// State visible to both halves of the effect
struct DemoShared {
    bypass: AtomicBool,
    transfer: BufferTransfer<BufferWithSampleRate>,
}

/// Create the audio-thread processor and its control-thread handle
pub fn convolution_demo(locator: AssetLocator) -> (ConvolutionDemoDsp, PositionControl) {
    let shared = Arc::new(DemoShared {
        bypass: AtomicBool::new(true),
        transfer: BufferTransfer::new(),
    });

    let dsp = ConvolutionDemoDsp {
        shared: Arc::clone(&shared),
        sample_rate: 0.0,
        convolution: Convolution::new(),
        reverb: Reverb::new(),
    };
    let control = PositionControl {
        position: ChoiceParameter::new("Position", Position::Bypass),
        resolver: ImpulseResolver::new(locator),
        shared,
    };
    (dsp, control)
}

/// Audio-thread half. Owned by the host and driven through `AudioProcessor`.
pub struct ConvolutionDemoDsp {
    shared: Arc<DemoShared>,
    sample_rate: f64,
    convolution: Convolution,
    reverb: Reverb,
}

impl ConvolutionDemoDsp {
    /// Rate passed to the last `prepare`, 0 before that
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn is_bypassed(&self) -> bool {
        self.shared.bypass.load(Ordering::Acquire)
    }
}

impl AudioProcessor for ConvolutionDemoDsp {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        self.convolution.prepare(spec);
        self.reverb.prepare(spec);
        self.reverb.set_parameters(ReverbParameters::CONVOLUTION_DEMO);
    }

    fn process(&mut self, block: &mut AudioBuffer) {
        // One attempt per block; a busy slot or full loader queue is retried next time
        self.shared.transfer.try_consume(|ir| {
            self.convolution
                .load_impulse_response(ir, Stereo::Yes, Trim::Yes, Normalise::Yes)
        });

        if self.shared.bypass.load(Ordering::Acquire) {
            return;
        }

        self.convolution.process(block);
        self.reverb.process(block);
    }

    fn reset(&mut self) {
        self.convolution.reset();
        self.reverb.reset();
    }
}

/// Control-thread half: owns the position parameter and loads IRs for it
pub struct PositionControl {
    position: ChoiceParameter<Position>,
    resolver: ImpulseResolver,
    shared: Arc<DemoShared>,
}

impl PositionControl {
    pub fn parameter(&self) -> &ChoiceParameter<Position> {
        &self.position
    }

    pub fn selected(&self) -> Position {
        self.position.selected()
    }

    pub fn is_bypassed(&self) -> bool {
        self.shared.bypass.load(Ordering::Acquire)
    }

    /// Switch to `position`. Loading happens here, on the calling thread.
    ///
    /// Returns false if the impulse response could not be loaded, in which
    /// case the selection, bypass state and active IR stay as they were.
    pub fn select(&mut self, position: Position) -> bool {
        match self.resolver.resolve(position) {
            Ok(None) => {
                self.shared.bypass.store(true, Ordering::Release);
                self.position.set(position);
                info!("Convolution bypassed");
                true
            }
            Ok(Some(ir)) => {
                self.shared.transfer.publish(ir);
                self.shared.bypass.store(false, Ordering::Release);
                self.position.set(position);
                info!(position = position.label(), "Impulse response selected");
                true
            }
            Err(e) => {
                error!(position = position.label(), "Failed to load impulse response: {}", e);
                false
            }
        }
    }

    /// Switch by 1-based selection id, as reported by a dropdown
    pub fn select_id(&mut self, id: u32) -> bool {
        match Position::from_id(id) {
            Some(position) => self.select(position),
            None => {
                warn!(id, "Ignoring unknown position id");
                false
            }
        }
    }

    /// Re-apply the current selection, e.g. after asset directories changed
    pub fn update_parameters(&mut self) -> bool {
        self.select(self.position.selected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::path::Path;
    use std::thread;
    use std::time::{Duration, Instant};

    const SPEC: ProcessSpec = ProcessSpec {
        sample_rate: 48000.0,
        maximum_block_size: 256,
        num_channels: 2,
    };

    fn write_impulse(dir: &Path, name: &str) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(dir.join(name), spec).unwrap();
        for i in 0..64 {
            let s = if i == 0 { i16::MAX } else { (i16::MAX as f32 * 0.5f32.powi(i)) as i16 };
            writer.write_sample(s).unwrap();
            writer.write_sample(s / 2).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn test_block() -> AudioBuffer {
        AudioBuffer::from_channels(vec![
            (0..256).map(|i| (i as f32 * 0.05).sin() * 0.5).collect(),
            (0..256).map(|i| (i as f32 * 0.03).cos() * 0.25).collect(),
        ])
    }

    fn demo_in(dir: &Path) -> (ConvolutionDemoDsp, PositionControl) {
        let (mut dsp, control) = convolution_demo(AssetLocator::new(vec![dir.to_path_buf()]));
        dsp.prepare(&SPEC);
        (dsp, control)
    }

    /// Run silent blocks until the published IR is active and faded in
    fn settle(dsp: &mut ConvolutionDemoDsp) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !dsp.convolution.is_loaded() || dsp.convolution.is_crossfading() {
            assert!(Instant::now() < deadline, "impulse response never became active");
            let mut block = AudioBuffer::new(2, 256);
            dsp.process(&mut block);
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Output of a freshly settled demo for `test_block()` with `position` selected
    fn reference_output(dir: &Path, position: Position) -> AudioBuffer {
        let (mut dsp, mut control) = demo_in(dir);
        assert!(control.select(position));
        settle(&mut dsp);
        let mut block = test_block();
        dsp.process(&mut block);
        block
    }

    /// Select Front, then fail to switch to Back; the Front IR must stay active
    fn assert_failed_switch_keeps_front(dir: &Path) {
        let expected = reference_output(dir, Position::Front);

        let (mut dsp, mut control) = demo_in(dir);
        assert!(control.select(Position::Front));
        settle(&mut dsp);

        assert!(!control.select(Position::Back));
        assert_eq!(control.selected(), Position::Front);
        assert!(!control.is_bypassed());
        assert!(!dsp.is_bypassed());
        assert!(!control.shared.transfer.has_pending());

        let mut block = test_block();
        dsp.process(&mut block);
        assert_eq!(block, expected);
        assert!(!dsp.convolution.is_crossfading());
    }

    #[test]
    fn test_starts_bypassed_and_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let (mut dsp, control) = demo_in(dir.path());
        assert_eq!(control.selected(), Position::Bypass);
        assert_eq!(control.parameter().name(), "Position");
        assert_eq!(control.parameter().selected_id(), 1);
        assert!(dsp.is_bypassed());
        assert_eq!(dsp.sample_rate(), 48000.0);

        let input = test_block();
        let mut block = input.clone();
        dsp.process(&mut block);
        assert_eq!(block, input);
    }

    #[test]
    fn test_missing_asset_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let (mut dsp, mut control) = demo_in(dir.path());

        assert!(!control.select(Position::Front));
        assert_eq!(control.selected(), Position::Bypass);
        assert!(control.is_bypassed());
        assert!(!control.shared.transfer.has_pending());

        let input = test_block();
        let mut block = input.clone();
        dsp.process(&mut block);
        assert_eq!(block, input);
    }

    #[test]
    fn test_missing_asset_keeps_active_impulse() {
        let dir = tempfile::tempdir().unwrap();
        write_impulse(dir.path(), "front.wav");
        assert_failed_switch_keeps_front(dir.path());
    }

    #[test]
    fn test_corrupt_asset_keeps_active_impulse() {
        let dir = tempfile::tempdir().unwrap();
        write_impulse(dir.path(), "front.wav");
        std::fs::write(dir.path().join("back.wav"), b"RIFF\0\0\0\0WAVEjunk").unwrap();
        assert_failed_switch_keeps_front(dir.path());
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (_dsp, mut control) = demo_in(dir.path());
        assert!(!control.select_id(0));
        assert!(!control.select_id(14));
        assert_eq!(control.selected(), Position::Bypass);
        assert!(control.is_bypassed());
    }

    #[test]
    fn test_selecting_position_loads_and_processes() {
        let dir = tempfile::tempdir().unwrap();
        write_impulse(dir.path(), "front.wav");
        let (mut dsp, mut control) = demo_in(dir.path());

        assert!(control.select_id(Position::Front.id()));
        assert_eq!(control.selected(), Position::Front);
        assert!(!control.is_bypassed());
        assert!(control.shared.transfer.has_pending());

        let mut block = test_block();
        dsp.process(&mut block);
        assert!(!control.shared.transfer.has_pending(), "first block should take the IR");

        settle(&mut dsp);

        let input = test_block();
        let mut wet = input.clone();
        dsp.process(&mut wet);
        assert_ne!(wet, input);
        assert!(wet.channels().iter().flatten().all(|s| s.is_finite()));

        // Back to bypass: untouched again
        assert!(control.select(Position::Bypass));
        let mut dry = input.clone();
        dsp.process(&mut dry);
        assert_eq!(dry, input);
    }

    #[test]
    fn test_update_parameters_republishes_selection() {
        let dir = tempfile::tempdir().unwrap();
        write_impulse(dir.path(), "up.wav");
        let (mut dsp, mut control) = demo_in(dir.path());
        assert!(control.select(Position::Up));

        let mut block = test_block();
        dsp.process(&mut block);
        assert!(!control.shared.transfer.has_pending());

        assert!(control.update_parameters());
        assert!(control.shared.transfer.has_pending());
        assert_eq!(control.selected(), Position::Up);
    }

    #[test]
    fn test_reset_silences_tails() {
        let dir = tempfile::tempdir().unwrap();
        write_impulse(dir.path(), "left.wav");
        let (mut dsp, mut control) = demo_in(dir.path());
        assert!(control.select(Position::Left));
        settle(&mut dsp);

        let mut block = test_block();
        dsp.process(&mut block);
        dsp.reset();

        let mut silent = AudioBuffer::new(2, 256);
        dsp.process(&mut silent);
        assert!(silent.peak() < 1e-6);
    }
}
