use rayon::prelude::*;
use sfx_timeline::{ClipAudio, ClipSource, Timeline, Track, TrackId};
use tracing::{debug, warn};

use crate::RenderError;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_CHANNELS: u16 = 2;

/// Slack for float error when turning seconds into a frame count.
const FRAME_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub sample_rate: u32,
    pub channels: u16,
}

impl RenderSettings {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.sample_rate == 0 {
            return Err(RenderError::UnsupportedFormat(
                "sample rate must be positive".to_string(),
            ));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(RenderError::UnsupportedFormat(format!(
                "{} channels (expected 1 or 2)",
                self.channels
            )));
        }
        Ok(())
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS)
    }
}

/// Frames needed to hold `seconds` of audio (rounded up).
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    let exact = seconds * sample_rate as f64;
    (exact - FRAME_EPSILON).ceil().max(0.0) as u64
}

/// Frame at which audio placed at `seconds` begins (rounded to nearest).
pub fn start_frame(seconds: f64, sample_rate: u32) -> u64 {
    (seconds * sample_rate as f64).round().max(0.0) as u64
}

/// One track of a render plan, with its clip already in the output format.
#[derive(Debug, Clone)]
pub struct PlannedTrack {
    pub track_id: TrackId,
    pub audio: ClipAudio,
    pub start_frame: u64,
    pub gain: f32,
    pub muted: bool,
}

impl PlannedTrack {
    pub fn effective_gain(&self) -> f32 {
        if self.muted { 0.0 } else { self.gain }
    }

    pub fn frames(&self) -> u64 {
        self.audio.frames() as u64
    }

    pub fn end_frame(&self) -> u64 {
        self.start_frame.saturating_add(self.frames())
    }
}

/// Sample-accurate schedule for one render or playback of a timeline.
///
/// Built fresh from a timeline snapshot for every call; it owns everything it
/// needs, so later edits to the timeline cannot affect it.
#[derive(Debug, Clone)]
pub struct RenderPlan {
    settings: RenderSettings,
    tracks: Vec<PlannedTrack>,
    missing: Vec<TrackId>,
    duration: f64,
    total_frames: u64,
}

impl RenderPlan {
    /// Resolve and conform every track's clip.
    ///
    /// Clip lookups run in parallel and are all joined before the plan is
    /// returned. A track whose clip is missing or cannot be conformed is left
    /// out of the plan (it renders as silence) and listed in [`Self::missing`].
    pub fn build<S: ClipSource + ?Sized>(
        timeline: &Timeline,
        clips: &S,
        settings: RenderSettings,
    ) -> Result<Self, RenderError> {
        settings.validate()?;
        if timeline.is_empty() {
            return Err(RenderError::EmptyTimeline);
        }

        let duration = timeline.total_duration();
        let total_frames = seconds_to_frames(duration, settings.sample_rate);
        if total_frames == 0 {
            return Err(RenderError::EmptyTimeline);
        }

        let resolved: Vec<Result<PlannedTrack, TrackId>> = timeline
            .tracks()
            .par_iter()
            .map(|track| resolve(track, clips, settings))
            .collect();

        let mut tracks = Vec::with_capacity(resolved.len());
        let mut missing = Vec::new();
        for result in resolved {
            match result {
                Ok(track) => tracks.push(track),
                Err(id) => missing.push(id),
            }
        }

        debug!(
            tracks = tracks.len(),
            missing = missing.len(),
            total_frames,
            sample_rate = settings.sample_rate,
            "built render plan"
        );

        Ok(Self {
            settings,
            tracks,
            missing,
            duration,
            total_frames,
        })
    }

    pub fn settings(&self) -> RenderSettings {
        self.settings
    }

    pub fn tracks(&self) -> &[PlannedTrack] {
        &self.tracks
    }

    /// Tracks whose clips could not be resolved.
    pub fn missing(&self) -> &[TrackId] {
        &self.missing
    }

    /// Timeline duration at the time the plan was built, in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Output length in frames: `ceil(duration * sample_rate)`.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frame after which nothing is audible: the later of the timeline end
    /// and the last track's end.
    pub fn end_frame(&self) -> u64 {
        self.tracks
            .iter()
            .map(PlannedTrack::end_frame)
            .fold(self.total_frames, u64::max)
    }

    pub fn gains(&self) -> Vec<f32> {
        self.tracks.iter().map(PlannedTrack::effective_gain).collect()
    }
}

fn resolve<S: ClipSource + ?Sized>(
    track: &Track,
    clips: &S,
    settings: RenderSettings,
) -> Result<PlannedTrack, TrackId> {
    let clip = clips.fetch(track.clip_id()).map_err(|err| {
        warn!(track = %track.id(), %err, "clip unavailable, track will be silent");
        track.id().clone()
    })?;

    let audio = clip
        .audio
        .conform(settings.sample_rate, settings.channels)
        .map_err(|err| {
            warn!(track = %track.id(), clip = %clip.id, %err, "failed to conform clip, track will be silent");
            track.id().clone()
        })?;

    Ok(PlannedTrack {
        track_id: track.id().clone(),
        audio,
        start_frame: start_frame(track.start(), settings.sample_rate),
        gain: track.gain(),
        muted: track.is_muted(),
    })
}

/// Add every track's contribution for frames `[first_frame, first_frame + n)` into `out`.
///
/// `out` holds `n` interleaved frames of `channels` channels and `gains[i]` is
/// applied to `tracks[i]`. Nothing is clamped here.
pub fn mix_into(
    tracks: &[PlannedTrack],
    gains: &[f32],
    first_frame: u64,
    channels: usize,
    out: &mut [f32],
) {
    let last_frame = first_frame + (out.len() / channels) as u64;

    for (track, &gain) in tracks.iter().zip(gains) {
        if gain == 0.0 {
            continue;
        }
        debug_assert_eq!(track.audio.channels() as usize, channels);

        let begin = track.start_frame.max(first_frame);
        let end = track.end_frame().min(last_frame);
        if begin >= end {
            continue;
        }

        let src_start = (begin - track.start_frame) as usize * channels;
        let dst_start = (begin - first_frame) as usize * channels;
        let len = (end - begin) as usize * channels;

        let src = &track.audio.samples()[src_start..src_start + len];
        for (dst, &sample) in out[dst_start..dst_start + len].iter_mut().zip(src) {
            *dst += sample * gain;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfx_timeline::{Clip, ClipStore};

    fn setup(clips: &[(&str, Vec<f32>, u32, u16)]) -> (Timeline, ClipStore, Vec<TrackId>) {
        let mut timeline = Timeline::new();
        let mut store = ClipStore::new();
        let mut ids = Vec::new();
        for (id, samples, rate, channels) in clips {
            let clip = Clip::new(*id, *id, ClipAudio::interleaved(samples.clone(), *rate, *channels));
            ids.push(timeline.add_track(&clip).unwrap().id().clone());
            store.insert(clip);
        }
        (timeline, store, ids)
    }

    #[test]
    fn test_seconds_to_frames_absorbs_float_error() {
        assert_eq!(seconds_to_frames(2.0, 44100), 88200);
        assert_eq!(seconds_to_frames(4410.0 / 44100.0, 44100), 4410);
        assert_eq!(seconds_to_frames(0.5 + 1.0 / 88200.0, 44100), 22051);
        assert_eq!(seconds_to_frames(0.0, 44100), 0);
    }

    #[test]
    fn test_start_frame_rounds() {
        assert_eq!(start_frame(0.0, 1000), 0);
        assert_eq!(start_frame(0.0014, 1000), 1);
        assert_eq!(start_frame(0.0016, 1000), 2);
    }

    #[test]
    fn test_settings_validation() {
        assert!(RenderSettings::default().validate().is_ok());
        assert!(RenderSettings::new(0, 2).validate().is_err());
        assert!(RenderSettings::new(44100, 6).validate().is_err());
    }

    #[test]
    fn test_build_empty_timeline() {
        let result = RenderPlan::build(&Timeline::new(), &ClipStore::new(), RenderSettings::default());
        assert!(matches!(result, Err(RenderError::EmptyTimeline)));
    }

    #[test]
    fn test_build_preserves_track_order_and_offsets() {
        let (mut timeline, store, ids) = setup(&[
            ("a", vec![0.1; 100], 1000, 1),
            ("b", vec![0.2; 100], 1000, 1),
            ("c", vec![0.3; 100], 1000, 1),
        ]);
        timeline.set_start(&ids[1], 0.25).unwrap();
        timeline.set_gain(&ids[2], 0.5).unwrap();
        timeline.set_muted(&ids[0], true).unwrap();

        let plan = RenderPlan::build(&timeline, &store, RenderSettings::new(1000, 2)).unwrap();
        let order: Vec<_> = plan.tracks().iter().map(|t| t.track_id.clone()).collect();
        assert_eq!(order, ids);
        assert_eq!(plan.tracks()[1].start_frame, 250);
        assert_eq!(plan.tracks()[0].audio.channels(), 2);
        assert_eq!(plan.gains(), vec![0.0, 1.0, 0.5]);
        assert_eq!(plan.total_frames(), 350);
        assert_eq!(plan.end_frame(), 350);
    }

    #[test]
    fn test_end_frame_covers_audio_past_recorded_duration() {
        // A track restored with a shorter recorded length than its clip.
        let clip = Clip::new("a", "a", ClipAudio::interleaved(vec![0.1; 100], 1000, 1));
        let mut store = ClipStore::new();
        store.insert(clip);
        let mut timeline = Timeline::new();
        timeline
            .insert(Track::new("track-1".into(), "a", "a".into(), 0.05).with_start(0.01))
            .unwrap();

        let plan = RenderPlan::build(&timeline, &store, RenderSettings::new(1000, 1)).unwrap();
        assert_eq!(plan.total_frames(), 60);
        assert_eq!(plan.tracks()[0].end_frame(), 110);
        assert_eq!(plan.end_frame(), 110);
    }

    #[test]
    fn test_build_skips_missing_clip() {
        let (timeline, mut store, ids) = setup(&[
            ("a", vec![0.1; 100], 1000, 1),
            ("b", vec![0.2; 100], 1000, 1),
        ]);
        store.evict(&"a".into());

        let plan = RenderPlan::build(&timeline, &store, RenderSettings::new(1000, 1)).unwrap();
        assert_eq!(plan.missing(), &[ids[0].clone()]);
        assert_eq!(plan.tracks().len(), 1);
        assert_eq!(plan.tracks()[0].track_id, ids[1]);
    }

    #[test]
    fn test_plan_is_a_snapshot() {
        let (mut timeline, store, ids) = setup(&[("a", vec![0.1; 100], 1000, 1)]);
        let plan = RenderPlan::build(&timeline, &store, RenderSettings::new(1000, 1)).unwrap();

        timeline.set_start(&ids[0], 5.0).unwrap();
        timeline.set_gain(&ids[0], 0.1).unwrap();

        assert_eq!(plan.tracks()[0].start_frame, 0);
        assert_eq!(plan.tracks()[0].gain, 1.0);
        assert_eq!(plan.total_frames(), 100);
    }

    #[test]
    fn test_mix_into_window() {
        let (mut timeline, store, ids) = setup(&[("a", vec![1.0, 2.0, 3.0, 4.0], 1000, 1)]);
        timeline.set_start(&ids[0], 0.002).unwrap();
        let plan = RenderPlan::build(&timeline, &store, RenderSettings::new(1000, 1)).unwrap();

        // Window of frames 3..6 sees clip frames 1..4.
        let mut out = vec![0.0; 3];
        mix_into(plan.tracks(), &[0.5], 3, 1, &mut out);
        assert_eq!(out, vec![1.0, 1.5, 2.0]);

        // Window entirely before the clip stays silent.
        let mut out = vec![0.0; 2];
        mix_into(plan.tracks(), &[0.5], 0, 1, &mut out);
        assert_eq!(out, vec![0.0, 0.0]);
    }
}
