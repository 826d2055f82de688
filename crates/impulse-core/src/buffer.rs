//! Multichannel sample buffers

/// Non-interleaved f32 audio, one `Vec` per channel, all the same length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    num_samples: usize,
}

impl AudioBuffer {
    /// Silent buffer of the given size
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            channels: vec![vec![0.0; num_samples]; num_channels],
            num_samples,
        }
    }

    /// Build from per-channel vectors. Longer channels are truncated to the shortest.
    pub fn from_channels(mut channels: Vec<Vec<f32>>) -> Self {
        let num_samples = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            channel.truncate(num_samples);
        }
        Self { channels, num_samples }
    }

    /// Split interleaved frames into channels. A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], num_channels: usize) -> Self {
        if num_channels == 0 {
            return Self::default();
        }
        let num_samples = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(num_samples); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self { channels, num_samples }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples == 0 || self.channels.is_empty()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Change the length of every channel. New samples are silent.
    ///
    /// Does not reallocate while `num_samples` stays within the capacity the
    /// buffer was created with, so it is safe to call on the audio thread.
    pub fn set_num_samples(&mut self, num_samples: usize) {
        for channel in &mut self.channels {
            channel.resize(num_samples, 0.0);
        }
        self.num_samples = num_samples;
    }

    /// Zero every sample
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Multiply every sample by `gain`
    pub fn apply_gain(&mut self, gain: f32) {
        for sample in self.channels.iter_mut().flatten() {
            *sample *= gain;
        }
    }

    /// Largest absolute sample value across all channels
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Write frames into an interleaved buffer with `out_channels` channels.
    ///
    /// Output channels beyond the buffer's last channel repeat that channel,
    /// so a mono buffer fills every output channel.
    pub fn write_interleaved(&self, out: &mut [f32], out_channels: usize) {
        if out_channels == 0 {
            return;
        }
        if self.channels.is_empty() {
            out.fill(0.0);
            return;
        }
        let last = self.channels.len() - 1;
        for (i, frame) in out.chunks_mut(out_channels).enumerate() {
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = self.channels[c.min(last)].get(i).copied().unwrap_or(0.0);
            }
        }
    }
}

/// Decoded audio together with the rate it was recorded at
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferWithSampleRate {
    pub buffer: AudioBuffer,
    pub sample_rate: f64,
}

impl BufferWithSampleRate {
    pub fn new(buffer: AudioBuffer, sample_rate: f64) -> Self {
        Self { buffer, sample_rate }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.buffer.num_samples() as f64 / self.sample_rate
    }
}
