use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use sfx_decode::decode_clip;
use sfx_engine::{EngineError, OutputSink, Transport};
use sfx_project::{ClipData, OfflineClip, Project, load_project, save_project};
use sfx_render::{CancelToken, RenderError, SampleBuffer, render_and_encode, render_timeline};
use sfx_timeline::{Clip, ClipId, ClipStore, Timeline, TimelineError, Track, TrackId};
use tracing::{debug, info};

use crate::Config;

/// A timeline, the clips it can draw on and the settings used to play and
/// export it.
pub struct Session {
    name: String,
    timeline: Timeline,
    clips: ClipStore,
    clip_files: Vec<ClipData>,
    offline_clips: Vec<OfflineClip>,
    config: Config,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            name: "Untitled".to_string(),
            timeline: Timeline::new(),
            clips: ClipStore::new(),
            clip_files: Vec::new(),
            offline_clips: Vec::new(),
            config,
        }
    }

    pub fn from_project(path: &Path, config: Config) -> anyhow::Result<Self> {
        let project =
            load_project(path).with_context(|| format!("loading project {}", path.display()))?;

        Ok(Self {
            name: project.name,
            timeline: project.timeline,
            clips: project.clips,
            clip_files: project.clip_files,
            offline_clips: project.offline_clips,
            config,
        })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let project = Project::from_timeline(self.name.clone(), &self.timeline, &self.clip_files);
        save_project(path, &project).with_context(|| format!("saving project {}", path.display()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn clips(&self) -> &ClipStore {
        &self.clips
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clips named by the project whose audio could not be loaded.
    pub fn offline_clips(&self) -> &[OfflineClip] {
        &self.offline_clips
    }

    /// Make `clip` available to tracks. Replaces any clip with the same id;
    /// tracks already using that id take on the new clip's length.
    pub fn insert_clip(&mut self, clip: Clip) {
        debug!(clip = %clip.id, name = %clip.name, "clip stored");
        self.offline_clips.retain(|offline| offline.clip_id != clip.id);
        self.timeline.sync_clip(&clip);
        self.clips.insert(clip);
    }

    /// Decode an audio file and store it as a clip named after the file.
    pub fn import_clip(&mut self, path: &Path) -> anyhow::Result<ClipId> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("{} has no file name", path.display()))?;
        let id = self.unique_clip_id(stem);

        let clip = decode_clip(id.clone(), stem, path)?;
        self.clip_files.retain(|entry| entry.id != id.as_str());
        self.clip_files.push(ClipData {
            id: id.to_string(),
            name: stem.to_string(),
            path: path.to_path_buf(),
        });
        self.insert_clip(clip);
        Ok(id)
    }

    /// Drop a clip from the store. Tracks using it play as silence.
    pub fn evict_clip(&mut self, id: &ClipId) -> Option<Clip> {
        self.clip_files.retain(|entry| entry.id != id.as_str());
        self.clips.evict(id)
    }

    pub fn add_track(&mut self, clip_id: &ClipId) -> Result<TrackId, TimelineError> {
        self.add_track_with(clip_id, 0.0, 1.0)
    }

    pub fn add_track_with(
        &mut self,
        clip_id: &ClipId,
        start: f64,
        gain: f32,
    ) -> Result<TrackId, TimelineError> {
        let clip = self
            .clips
            .get(clip_id)
            .ok_or_else(|| TimelineError::InvalidClip {
                reason: format!("clip '{clip_id}' is not loaded"),
            })?;
        let track = self.timeline.add_track_with(clip, start, gain)?;
        Ok(track.id().clone())
    }

    pub fn set_start(&mut self, id: &TrackId, seconds: f64) -> Result<(), TimelineError> {
        self.timeline.set_start(id, seconds)
    }

    pub fn set_gain(&mut self, id: &TrackId, gain: f32) -> Result<(), TimelineError> {
        self.timeline.set_gain(id, gain)
    }

    pub fn set_muted(&mut self, id: &TrackId, muted: bool) -> Result<(), TimelineError> {
        self.timeline.set_muted(id, muted)
    }

    pub fn toggle_muted(&mut self, id: &TrackId) -> Result<bool, TimelineError> {
        self.timeline.toggle_muted(id)
    }

    pub fn remove_track(&mut self, id: &TrackId) -> Option<Track> {
        self.timeline.remove_track(id)
    }

    /// Start realtime playback of the current timeline.
    pub fn play(&self, sink: &dyn OutputSink) -> Result<Transport, EngineError> {
        sfx_engine::play(&self.timeline, &self.clips, sink)
    }

    /// Push the current timeline to a transport started by [`Session::play`].
    pub fn reschedule(&self, transport: &mut Transport) -> Result<(), EngineError> {
        transport.reschedule(&self.timeline, &self.clips)
    }

    pub fn render(&self, cancel: Option<&CancelToken>) -> Result<SampleBuffer, RenderError> {
        render_timeline(
            &self.timeline,
            &self.clips,
            self.config.render_settings(),
            cancel,
        )
    }

    /// Render the timeline to WAV bytes with the configured format.
    pub fn render_and_encode(&self, cancel: Option<&CancelToken>) -> Result<Vec<u8>, RenderError> {
        render_and_encode(
            &self.timeline,
            &self.clips,
            self.config.render_settings(),
            cancel,
        )
    }

    /// Directory exports go to when none is given.
    pub fn export_dir(&self) -> PathBuf {
        self.config
            .export
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Render the timeline and write it to `dir` as
    /// `<file_prefix>_<unix millis>.wav`. Returns the written path.
    pub fn export(&self, dir: &Path, cancel: Option<&CancelToken>) -> anyhow::Result<PathBuf> {
        let bytes = self.render_and_encode(cancel)?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = dir.join(format!("{}_{millis}.wav", self.config.export.file_prefix));

        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;

        info!(path = %path.display(), bytes = bytes.len(), "exported mix");
        Ok(path)
    }

    fn unique_clip_id(&self, stem: &str) -> ClipId {
        let mut id = ClipId::new(stem);
        let mut n = 1;
        while self.clips.contains(&id) {
            n += 1;
            id = ClipId::new(format!("{stem}-{n}"));
        }
        id
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
