use std::fmt;

use crate::{Clip, ClipId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Longest track name derived from a clip name before it gets an ellipsis.
const NAME_LIMIT: usize = 20;

/// A placement of one clip on the timeline.
///
/// Fields are only mutated through [`crate::Timeline`], which keeps the
/// derived total duration in step with start offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub(crate) id: TrackId,
    pub(crate) name: String,
    pub(crate) clip_id: ClipId,
    /// Clip duration captured when the track was created, in seconds.
    pub(crate) clip_duration: f64,
    pub(crate) start: f64,
    pub(crate) gain: f32,
    pub(crate) muted: bool,
}

impl Track {
    /// A track at offset 0, full gain, unmuted.
    pub fn new(id: TrackId, name: impl Into<String>, clip_id: ClipId, clip_duration: f64) -> Self {
        Self {
            id,
            name: name.into(),
            clip_id,
            clip_duration,
            start: 0.0,
            gain: 1.0,
            muted: false,
        }
    }

    pub fn for_clip(id: TrackId, clip: &Clip) -> Self {
        Self::new(id, display_name(&clip.name), clip.id.clone(), clip.duration_secs())
    }

    pub fn with_start(mut self, start: f64) -> Self {
        self.start = start;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clip_id(&self) -> &ClipId {
        &self.clip_id
    }

    pub fn clip_duration(&self) -> f64 {
        self.clip_duration
    }

    /// Start offset in seconds.
    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Gain actually applied to the clip: 0 while muted.
    pub fn effective_gain(&self) -> f32 {
        if self.muted { 0.0 } else { self.gain }
    }

    pub fn end(&self) -> f64 {
        self.start + self.clip_duration
    }
}

/// Shorten a clip name for display on a track header.
pub fn display_name(clip_name: &str) -> String {
    let mut chars = clip_name.chars();
    let head: String = chars.by_ref().take(NAME_LIMIT).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
