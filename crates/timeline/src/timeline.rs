use crate::{Clip, Track, TrackId};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("invalid clip: {reason}")]
    InvalidClip { reason: String },

    #[error("track '{0}' not found")]
    NotFound(TrackId),

    #[error("{what} {value} is out of range")]
    OutOfRange { what: &'static str, value: f64 },

    #[error("track '{0}' already exists")]
    DuplicateTrack(TrackId),
}

/// Ordered-by-insertion tracks plus the derived total duration.
///
/// Total duration is recomputed on every insertion, removal and start change;
/// it cannot be set directly.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    tracks: Vec<Track>,
    total_duration: f64,
    next_track_id: u64,
    revision: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track for `clip` at offset 0 with full gain.
    pub fn add_track(&mut self, clip: &Clip) -> Result<&Track, TimelineError> {
        self.add_track_with(clip, 0.0, 1.0)
    }

    pub fn add_track_with(
        &mut self,
        clip: &Clip,
        start: f64,
        gain: f32,
    ) -> Result<&Track, TimelineError> {
        validate_clip(clip)?;
        let id = self.generate_id();
        let track = Track::for_clip(id, clip).with_start(start).with_gain(gain);
        self.insert(track)
    }

    /// Insert a fully specified track, e.g. one restored from a project file.
    pub fn insert(&mut self, mut track: Track) -> Result<&Track, TimelineError> {
        if track.id.0.is_empty() {
            return Err(TimelineError::InvalidClip {
                reason: "track id is empty".to_string(),
            });
        }
        if track.clip_id.is_empty() {
            return Err(TimelineError::InvalidClip {
                reason: "clip id is empty".to_string(),
            });
        }
        if self.position(&track.id).is_some() {
            return Err(TimelineError::DuplicateTrack(track.id));
        }
        check_gain(track.gain)?;
        track.start = clamp_start(track.start)?;
        if !track.clip_duration.is_finite() || track.clip_duration < 0.0 {
            return Err(TimelineError::InvalidClip {
                reason: format!("clip duration {} is not valid", track.clip_duration),
            });
        }

        debug!(track = %track.id, clip = %track.clip_id, start = track.start, "track added");
        self.tracks.push(track);
        self.touch();
        let last = self.tracks.len() - 1;
        Ok(&self.tracks[last])
    }

    /// Move a track. Negative offsets clamp to 0.
    pub fn set_start(&mut self, id: &TrackId, seconds: f64) -> Result<(), TimelineError> {
        let start = clamp_start(seconds)?;
        let track = self.track_mut(id)?;
        track.start = start;
        self.touch();
        Ok(())
    }

    /// Set a track's gain. Values outside [0.0, 1.0] are rejected and leave the track untouched.
    pub fn set_gain(&mut self, id: &TrackId, gain: f32) -> Result<(), TimelineError> {
        let track = self.track_mut(id)?;
        check_gain(gain)?;
        track.gain = gain;
        self.revision += 1;
        Ok(())
    }

    pub fn set_muted(&mut self, id: &TrackId, muted: bool) -> Result<(), TimelineError> {
        let track = self.track_mut(id)?;
        track.muted = muted;
        self.revision += 1;
        Ok(())
    }

    /// Flip a track's mute state, returning the new state.
    pub fn toggle_muted(&mut self, id: &TrackId) -> Result<bool, TimelineError> {
        let track = self.track_mut(id)?;
        track.muted = !track.muted;
        let muted = track.muted;
        self.revision += 1;
        Ok(muted)
    }

    /// Adopt `clip`'s length on every track that plays it, e.g. after the
    /// clip was replaced in the store. Returns the number of tracks updated.
    pub fn sync_clip(&mut self, clip: &Clip) -> usize {
        let duration = clip.duration_secs();
        let mut updated = 0;
        for track in self.tracks.iter_mut().filter(|t| t.clip_id == clip.id) {
            if track.clip_duration != duration {
                track.clip_duration = duration;
                updated += 1;
            }
        }
        if updated > 0 {
            self.touch();
            debug!(clip = %clip.id, tracks = updated, duration, "clip length changed");
        }
        updated
    }

    /// Remove a track. Removing an absent track is a no-op.
    pub fn remove_track(&mut self, id: &TrackId) -> Option<Track> {
        let index = self.position(id)?;
        let track = self.tracks.remove(index);
        self.touch();
        debug!(track = %track.id, total_duration = self.total_duration, "track removed");
        Some(track)
    }

    /// Latest end over all tracks, in seconds. 0 when empty.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| &t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Counter bumped by every successful mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn position(&self, id: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| &t.id == id)
    }

    fn track_mut(&mut self, id: &TrackId) -> Result<&mut Track, TimelineError> {
        self.tracks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| TimelineError::NotFound(id.clone()))
    }

    fn generate_id(&mut self) -> TrackId {
        loop {
            self.next_track_id += 1;
            let id = TrackId(format!("track-{}", self.next_track_id));
            if self.position(&id).is_none() {
                return id;
            }
        }
    }

    fn touch(&mut self) {
        self.total_duration = self.tracks.iter().map(Track::end).fold(0.0, f64::max);
        self.revision += 1;
    }
}

fn validate_clip(clip: &Clip) -> Result<(), TimelineError> {
    let reason = if clip.id.is_empty() {
        "clip id is empty".to_string()
    } else if clip.audio.is_empty() {
        format!("clip '{}' has no samples", clip.id)
    } else if !matches!(clip.audio.channels(), 1 | 2) {
        format!("clip '{}' has {} channels", clip.id, clip.audio.channels())
    } else if clip.audio.sample_rate() == 0 {
        format!("clip '{}' has a zero sample rate", clip.id)
    } else {
        return Ok(());
    };
    Err(TimelineError::InvalidClip { reason })
}

fn check_gain(gain: f32) -> Result<(), TimelineError> {
    if (0.0..=1.0).contains(&gain) {
        Ok(())
    } else {
        Err(TimelineError::OutOfRange {
            what: "gain",
            value: gain as f64,
        })
    }
}

/// Latest start offset whose frame index fits in a `u64` at any `u32` sample rate.
pub const MAX_START_SECS: f64 = (u64::MAX / u32::MAX as u64) as f64;

fn clamp_start(seconds: f64) -> Result<f64, TimelineError> {
    if seconds > MAX_START_SECS {
        return Err(TimelineError::OutOfRange {
            what: "start offset",
            value: seconds,
        });
    }
    // f64::max drops NaN, so NaN lands on 0 along with negatives.
    Ok(seconds.max(0.0))
}
