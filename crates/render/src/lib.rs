//! Mixdown of a [`Timeline`] into a single PCM buffer and WAV bytes.

mod offline;
mod plan;
mod wav;

pub use offline::{CancelToken, SampleBuffer, render, render_timeline};
pub use plan::{
    DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, PlannedTrack, RenderPlan, RenderSettings, mix_into,
    seconds_to_frames, start_frame,
};
pub use wav::{HEADER_LEN, MAX_SAMPLES, encode, float_to_pcm16, write_wav};

use sfx_timeline::{ClipSource, Timeline};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("timeline is empty")]
    EmptyTimeline,

    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("{frames} frames do not fit in a 16-bit WAV file")]
    TooLong { frames: u64 },

    #[error("render cancelled")]
    Cancelled,

    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),
}

/// Render a timeline and encode the mix as a 16-bit PCM WAV file in memory.
///
/// This is the export entry point: a cancelled render never reaches the encoder.
pub fn render_and_encode<S: ClipSource + ?Sized>(
    timeline: &Timeline,
    clips: &S,
    settings: RenderSettings,
    cancel: Option<&CancelToken>,
) -> Result<Vec<u8>, RenderError> {
    let buffer = render_timeline(timeline, clips, settings, cancel)?;
    encode(&buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfx_timeline::{Clip, ClipAudio, ClipStore};

    #[test]
    fn test_render_and_encode_sizes() {
        let mut clips = ClipStore::new();
        let clip = Clip::new("a", "a", ClipAudio::interleaved(vec![0.5; 1000], 1000, 1));
        clips.insert(clip.clone());
        let mut timeline = Timeline::new();
        timeline.add_track(&clip).unwrap();

        let bytes =
            render_and_encode(&timeline, &clips, RenderSettings::new(1000, 2), None).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 1000 * 2 * 2);
    }

    #[test]
    fn test_render_and_encode_cancelled() {
        let mut clips = ClipStore::new();
        let clip = Clip::new("a", "a", ClipAudio::interleaved(vec![0.5; 1000], 1000, 1));
        clips.insert(clip.clone());
        let mut timeline = Timeline::new();
        timeline.add_track(&clip).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let result = render_and_encode(&timeline, &clips, RenderSettings::default(), Some(&cancel));
        assert!(matches!(result, Err(RenderError::Cancelled)));
    }
}
