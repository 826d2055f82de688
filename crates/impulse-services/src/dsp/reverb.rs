//! Freeverb-style stereo reverb

use std::fmt;

use impulse_core::{AudioBuffer, ProcessSpec, ReverbParameters};

const NUM_COMBS: usize = 8;
const NUM_ALLPASSES: usize = 4;
const COMB_TUNINGS: [usize; NUM_COMBS] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNINGS: [usize; NUM_ALLPASSES] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const TUNING_SAMPLE_RATE: f64 = 44100.0;

const INPUT_GAIN: f32 = 0.015;
const WET_SCALE: f32 = 3.0;
const DRY_SCALE: f32 = 2.0;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;

/// Flush values that would decay into denormals
#[inline]
fn undenormalise(x: f32) -> f32 {
    if x.abs() < 1.0e-15 { 0.0 } else { x }
}

#[derive(Default)]
struct CombFilter {
    buffer: Vec<f32>,
    index: usize,
    last: f32,
}

impl CombFilter {
    fn set_size(&mut self, size: usize) {
        self.buffer = vec![0.0; size.max(1)];
        self.index = 0;
        self.last = 0.0;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.last = 0.0;
    }

    #[inline]
    fn process(&mut self, input: f32, damp: f32, feedback: f32) -> f32 {
        let output = self.buffer[self.index];
        self.last = undenormalise(output * (1.0 - damp) + self.last * damp);
        self.buffer[self.index] = undenormalise(input + self.last * feedback);
        self.index = (self.index + 1) % self.buffer.len();
        output
    }
}

#[derive(Default)]
struct AllPassFilter {
    buffer: Vec<f32>,
    index: usize,
}

impl AllPassFilter {
    fn set_size(&mut self, size: usize) {
        self.buffer = vec![0.0; size.max(1)];
        self.index = 0;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.index];
        self.buffer[self.index] = undenormalise(input + buffered * 0.5);
        self.index = (self.index + 1) % self.buffer.len();
        buffered - input
    }
}

/// Per-channel filter bank
#[derive(Default)]
struct Tank {
    combs: [CombFilter; NUM_COMBS],
    allpasses: [AllPassFilter; NUM_ALLPASSES],
}

impl Tank {
    fn set_sample_rate(&mut self, sample_rate: f64, spread: usize) {
        let scale = sample_rate / TUNING_SAMPLE_RATE;
        for (comb, tuning) in self.combs.iter_mut().zip(COMB_TUNINGS) {
            comb.set_size(((tuning + spread) as f64 * scale) as usize);
        }
        for (allpass, tuning) in self.allpasses.iter_mut().zip(ALLPASS_TUNINGS) {
            allpass.set_size(((tuning + spread) as f64 * scale) as usize);
        }
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllPassFilter::clear);
    }

    #[inline]
    fn process(&mut self, input: f32, damp: f32, feedback: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, damp, feedback);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }
}

/// Stereo reverb: eight damped combs into four allpasses per channel.
///
/// Mono blocks run the left tank only. Blocks with more than two channels
/// have their first two processed as a stereo pair.
pub struct Reverb {
    params: ReverbParameters,
    tanks: [Tank; 2],
    sample_rate: f64,
    gain: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
    damping: f32,
    feedback: f32,
}

impl Reverb {
    pub fn new() -> Self {
        let mut reverb = Self {
            params: ReverbParameters::default(),
            tanks: [Tank::default(), Tank::default()],
            sample_rate: 0.0,
            gain: 0.0,
            wet1: 0.0,
            wet2: 0.0,
            dry: 0.0,
            damping: 0.0,
            feedback: 0.0,
        };
        reverb.set_sample_rate(TUNING_SAMPLE_RATE);
        reverb.set_parameters(ReverbParameters::default());
        reverb
    }

    pub fn parameters(&self) -> &ReverbParameters {
        &self.params
    }

    pub fn set_parameters(&mut self, params: ReverbParameters) {
        let wet = params.wet_level * WET_SCALE;
        self.dry = params.dry_level * DRY_SCALE;
        self.wet1 = 0.5 * wet * (1.0 + params.width);
        self.wet2 = 0.5 * wet * (1.0 - params.width);
        self.gain = if params.is_frozen() { 0.0 } else { INPUT_GAIN };
        self.damping = if params.is_frozen() { 0.0 } else { params.damping * DAMP_SCALE };
        self.feedback = if params.is_frozen() { 1.0 } else { params.room_size * ROOM_SCALE + ROOM_OFFSET };
        self.params = params;
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if (sample_rate - self.sample_rate).abs() < 1.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.tanks[0].set_sample_rate(sample_rate, 0);
        self.tanks[1].set_sample_rate(sample_rate, STEREO_SPREAD);
    }

    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.set_sample_rate(spec.sample_rate);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.tanks.iter_mut().for_each(Tank::clear);
    }

    pub fn process(&mut self, block: &mut AudioBuffer) {
        match block.num_channels() {
            0 => {}
            1 => self.process_mono(block.channel_mut(0)),
            _ => {
                let mut channels = block.channels_mut();
                if let (Some(left), Some(right)) = (channels.next(), channels.next()) {
                    self.process_stereo(left, right);
                }
            }
        }
    }

    fn process_mono(&mut self, samples: &mut [f32]) {
        let (damp, feedback) = (self.damping, self.feedback);
        for sample in samples.iter_mut() {
            let input = *sample * self.gain;
            let wet = self.tanks[0].process(input, damp, feedback);
            *sample = wet * self.wet1 + *sample * self.dry;
        }
    }

    fn process_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        let (damp, feedback) = (self.damping, self.feedback);
        let [tank_l, tank_r] = &mut self.tanks;
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let input = (*l + *r) * self.gain;
            let out_l = tank_l.process(input, damp, feedback);
            let out_r = tank_r.process(input, damp, feedback);
            let (dry_l, dry_r) = (*l, *r);
            *l = out_l * self.wet1 + out_r * self.wet2 + dry_l * self.dry;
            *r = out_r * self.wet1 + out_l * self.wet2 + dry_r * self.dry;
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reverb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reverb")
            .field("params", &self.params)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_block(channels: usize, len: usize) -> AudioBuffer {
        let mut block = AudioBuffer::new(channels, len);
        for c in 0..channels {
            block.channel_mut(c)[0] = 1.0;
        }
        block
    }

    #[test]
    fn test_dry_only_is_identity() {
        let mut reverb = Reverb::new();
        reverb.prepare(&ProcessSpec::new(48000.0, 256, 2));
        reverb.set_parameters(ReverbParameters { wet_level: 0.0, dry_level: 0.5, ..Default::default() });

        let input = AudioBuffer::from_channels(vec![vec![0.25, -0.5, 0.75], vec![0.1, 0.2, 0.3]]);
        let mut block = input.clone();
        reverb.process(&mut block);
        assert_eq!(block, input);
    }

    #[test]
    fn test_tail_rings_and_reset_silences() {
        let mut reverb = Reverb::new();
        reverb.prepare(&ProcessSpec::new(44100.0, 4096, 2));
        reverb.set_parameters(ReverbParameters { dry_level: 0.0, ..ReverbParameters::CONVOLUTION_DEMO });

        let mut block = impulse_block(2, 4096);
        reverb.process(&mut block);
        let energy: f32 = block.channel(0).iter().map(|s| s * s).sum();
        assert!(energy > 0.0, "no reverb tail");

        reverb.reset();
        let mut silence = AudioBuffer::new(2, 4096);
        reverb.process(&mut silence);
        assert_eq!(silence.peak(), 0.0);
    }

    #[test]
    fn test_mono_block() {
        let mut reverb = Reverb::new();
        reverb.prepare(&ProcessSpec::new(48000.0, 2048, 1));
        reverb.set_parameters(ReverbParameters::CONVOLUTION_DEMO);

        let mut block = impulse_block(1, 2048);
        reverb.process(&mut block);
        // dry path is scaled by 2
        assert!((block.channel(0)[0] - 2.0).abs() < 1e-6);
        assert!(block.channel(0).iter().all(|s| s.is_finite()));
    }
}
