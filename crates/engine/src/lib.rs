//! Realtime playback of a timeline.
//!
//! [`play`] snapshots the timeline into a render plan, hands a mixer to an
//! [`OutputSink`] and returns a [`Transport`] that owns the running stream.

mod cpal_sink;
mod mixer;
mod sink;
mod transport;

pub use cpal_sink::CpalSink;
pub use sink::{ManualSink, OutputFormat, OutputSink, OutputStream, RenderCallback};
pub use transport::{Transport, TransportState};

use sfx_render::{RenderError, RenderPlan, RenderSettings};
use sfx_timeline::{ClipSource, Timeline, TimelineError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("timeline is empty")]
    EmptyTimeline,

    #[error("audio engine unavailable: {0}")]
    Unavailable(String),

    #[error("output stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

/// Start playing `timeline` through `sink`.
///
/// The timeline is read once; edits made afterwards reach the returned
/// transport only through [`Transport::reschedule`]. Tracks whose clips
/// cannot be resolved play as silence and are reported by
/// [`Transport::missing_tracks`].
pub fn play<S: ClipSource + ?Sized>(
    timeline: &Timeline,
    clips: &S,
    sink: &dyn OutputSink,
) -> Result<Transport, EngineError> {
    if timeline.is_empty() {
        return Err(EngineError::EmptyTimeline);
    }

    let format = sink.format();
    if format.sample_rate == 0 || format.channels == 0 {
        return Err(EngineError::Unavailable(format!(
            "output reports {} Hz, {} channels",
            format.sample_rate, format.channels
        )));
    }

    // Mix in mono or stereo; the mixer spreads that over the device channels.
    let settings = RenderSettings::new(format.sample_rate, format.channels.min(2));
    let plan = build_plan(timeline, clips, settings)?;

    Transport::start(plan, sink)
}

pub(crate) fn build_plan<S: ClipSource + ?Sized>(
    timeline: &Timeline,
    clips: &S,
    settings: RenderSettings,
) -> Result<RenderPlan, EngineError> {
    RenderPlan::build(timeline, clips, settings).map_err(|err| match err {
        RenderError::EmptyTimeline => EngineError::EmptyTimeline,
        other => EngineError::Unavailable(other.to_string()),
    })
}
