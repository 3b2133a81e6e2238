use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Shared, immutable PCM sample data for one clip.
///
/// Samples are stored interleaved in an `Arc<[f32]>` so that the clip store,
/// render plans and the realtime mixer can all hold the same decoded audio
/// without copying it. Cloning only bumps the reference count.
///
/// # Examples
///
/// ```
/// use sfx_timeline::ClipAudio;
///
/// let audio = ClipAudio::from_channels(vec![vec![0.0, 0.5], vec![1.0, -0.5]], 44100);
/// assert_eq!(audio.frames(), 2);
/// assert_eq!(audio.samples(), &[0.0, 1.0, 0.5, -0.5]);
/// ```
#[derive(Clone)]
pub struct ClipAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl ClipAudio {
    /// Create clip audio from interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    pub fn interleaved(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    /// Create clip audio from one sample array per channel.
    ///
    /// # Panics
    ///
    /// Panics if no channel is given or the channels differ in length.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        assert!(!channels.is_empty(), "channels must be greater than 0");
        let frames = channels[0].len();
        assert!(
            channels.iter().all(|c| c.len() == frames),
            "all channels must have the same length"
        );

        let mut samples = Vec::with_capacity(frames * channels.len());
        for frame in 0..frames {
            for channel in &channels {
                samples.push(channel[frame]);
            }
        }

        Self::interleaved(samples, sample_rate, channels.len() as u16)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nominal duration in seconds: frames / sample rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Iterate over one channel's samples.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is >= `self.channels()`.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        assert!(
            channel < self.channels as usize,
            "channel index out of bounds"
        );
        let channels = self.channels as usize;
        (0..self.frames()).map(move |frame| self.samples[frame * channels + channel])
    }

    /// Whether two clips share the same underlying sample allocation.
    pub fn shares_samples(&self, other: &ClipAudio) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }

    /// Conform this audio to a target rate and channel count.
    ///
    /// Channels are remixed first (mono is duplicated, anything folded to mono
    /// is averaged, other layouts wrap around the source channels), then the
    /// result is resampled. Audio already in the target format is returned as
    /// a cheap clone.
    pub fn conform(&self, sample_rate: u32, channels: u16) -> anyhow::Result<Self> {
        let remixed = self.remix(channels);
        remixed.resample(sample_rate)
    }

    /// Remix to `channels` output channels.
    pub fn remix(&self, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        if channels == self.channels {
            return self.clone();
        }

        let src_channels = self.channels as usize;
        let dst_channels = channels as usize;
        let mut samples = Vec::with_capacity(self.frames() * dst_channels);

        for frame in self.samples.chunks_exact(src_channels) {
            if dst_channels == 1 {
                let sum: f32 = frame.iter().sum();
                samples.push(sum / src_channels as f32);
            } else {
                for ch in 0..dst_channels {
                    samples.push(frame[ch % src_channels]);
                }
            }
        }

        Self::interleaved(samples, self.sample_rate, channels)
    }

    /// Resample to a target sample rate using sinc interpolation.
    ///
    /// # Errors
    ///
    /// Returns an error if the resampler rejects its parameters.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate || self.is_empty() {
            return Ok(Self {
                samples: self.samples.clone(),
                sample_rate: target_sample_rate,
                channels: self.channels,
            });
        }
        anyhow::ensure!(self.sample_rate > 0, "source sample rate is zero");
        anyhow::ensure!(target_sample_rate > 0, "target sample rate is zero");

        let channels = self.channels as usize;
        let input_frames = self.frames();
        let ratio = target_sample_rate as f64 / self.sample_rate as f64;

        let input: Vec<Vec<f32>> = (0..channels).map(|ch| self.channel(ch).collect()).collect();

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, input_frames, channels)?;
        let delay = resampler.output_delay();
        let output_frames = (input_frames as f64 * ratio).round() as usize;

        let mut output = resampler.process(&input, None)?;
        // Flush with silence until the delayed tail has come out.
        while output.first().map_or(0, Vec::len) < delay + output_frames {
            let tail = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
            if tail.first().is_none_or(Vec::is_empty) {
                break;
            }
            for (channel, rest) in output.iter_mut().zip(tail) {
                channel.extend(rest);
            }
        }

        let mut samples = Vec::with_capacity(output_frames * channels);
        for frame in delay..delay + output_frames {
            for channel in &output {
                samples.push(channel.get(frame).copied().unwrap_or(0.0));
            }
        }

        Ok(Self::interleaved(samples, target_sample_rate, self.channels))
    }
}

impl std::fmt::Debug for ClipAudio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipAudio")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}
