use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use sfx_timeline::{ClipSource, Timeline};
use tracing::debug;

use crate::{MAX_SAMPLES, RenderError, RenderPlan, RenderSettings, mix_into};

/// Frames mixed per work item. Blocks cover disjoint output ranges.
const BLOCK_FRAMES: usize = 4096;

/// Cooperative cancellation flag shared between a caller and a render.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Interleaved float samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SampleBuffer {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        assert!(
            channel < self.channels as usize,
            "channel index out of bounds"
        );
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels as usize)
            .copied()
    }
}

/// Mix a plan down to a single buffer of exactly `plan.total_frames()` frames.
///
/// Output is split into blocks mixed in parallel; every block sums the tracks
/// in plan order, so the result does not depend on scheduling. Summed samples
/// are hard-clamped to [-1.0, 1.0]. When `cancel` fires the partial buffer is
/// dropped and [`RenderError::Cancelled`] is returned. A mix longer than a WAV
/// file can hold fails with [`RenderError::TooLong`] before anything is allocated.
pub fn render(plan: &RenderPlan, cancel: Option<&CancelToken>) -> Result<SampleBuffer, RenderError> {
    let settings = plan.settings();
    let channels = settings.channels as usize;
    let total_frames = plan.total_frames();
    let too_long = || RenderError::TooLong {
        frames: total_frames,
    };
    let len = total_frames
        .checked_mul(channels as u64)
        .filter(|&len| len <= MAX_SAMPLES)
        .ok_or_else(too_long)?;
    let len = usize::try_from(len).map_err(|_| too_long())?;

    let gains = plan.gains();
    let is_cancelled = || cancel.is_some_and(CancelToken::is_cancelled);

    let mut samples = vec![0.0f32; len];
    samples
        .par_chunks_mut(BLOCK_FRAMES * channels)
        .enumerate()
        .try_for_each(|(block, out)| {
            if is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            let first_frame = (block * BLOCK_FRAMES) as u64;
            mix_into(plan.tracks(), &gains, first_frame, channels, out);
            for sample in out.iter_mut() {
                *sample = sample.clamp(-1.0, 1.0);
            }
            Ok(())
        })?;

    if is_cancelled() {
        return Err(RenderError::Cancelled);
    }

    debug!(frames = total_frames, channels, "offline render finished");

    Ok(SampleBuffer {
        samples,
        sample_rate: settings.sample_rate,
        channels: settings.channels,
    })
}

/// Build a plan from the current timeline and render it.
pub fn render_timeline<S: ClipSource + ?Sized>(
    timeline: &Timeline,
    clips: &S,
    settings: RenderSettings,
    cancel: Option<&CancelToken>,
) -> Result<SampleBuffer, RenderError> {
    let plan = RenderPlan::build(timeline, clips, settings)?;
    render(&plan, cancel)
}
