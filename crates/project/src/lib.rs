//! JSON project files describing a timeline and the clip files it uses.

mod load;
mod save;

use serde::{Deserialize, Serialize};
use sfx_timeline::{Timeline, TimelineError, Track};
use std::path::PathBuf;

pub use load::{LoadedProject, OfflineClip, load_project};
pub use save::save_project;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub clips: Vec<ClipData>,
    #[serde(default)]
    pub tracks: Vec<TrackData>,
}

/// A clip file. Relative paths are resolved against the project file's directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub id: String,
    pub name: String,
    pub clip_id: String,
    /// Seconds; used when the clip file cannot be decoded.
    #[serde(default)]
    pub clip_duration: f64,
    #[serde(default)]
    pub start: f64,
    #[serde(default = "unity_gain")]
    pub gain: f32,
    #[serde(default)]
    pub muted: bool,
}

fn unity_gain() -> f32 {
    1.0
}

impl From<&Track> for TrackData {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id().to_string(),
            name: track.name().to_string(),
            clip_id: track.clip_id().to_string(),
            clip_duration: track.clip_duration(),
            start: track.start(),
            gain: track.gain(),
            muted: track.is_muted(),
        }
    }
}

impl Project {
    /// Describe `timeline`, keeping only the clips its tracks reference.
    pub fn from_timeline(name: impl Into<String>, timeline: &Timeline, clips: &[ClipData]) -> Self {
        let tracks: Vec<TrackData> = timeline.tracks().iter().map(TrackData::from).collect();
        let clips = clips
            .iter()
            .filter(|clip| tracks.iter().any(|t| t.clip_id == clip.id))
            .cloned()
            .collect();

        Self {
            name: name.into(),
            clips,
            tracks,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid project file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid track in project: {0}")]
    Timeline(#[from] TimelineError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfx_timeline::{Clip, ClipAudio};

    fn sample_project() -> Project {
        Project {
            name: "Storm".to_string(),
            clips: vec![ClipData {
                id: "thunder".to_string(),
                name: "rolling thunder".to_string(),
                path: PathBuf::from("clips/thunder.wav"),
            }],
            tracks: vec![TrackData {
                id: "track-1".to_string(),
                name: "rolling thunder".to_string(),
                clip_id: "thunder".to_string(),
                clip_duration: 3.0,
                start: 1.5,
                gain: 0.8,
                muted: true,
            }],
        }
    }

    #[test]
    fn test_project_json_roundtrip() {
        let project = sample_project();
        let json = serde_json::to_string(&project).expect("serialize");
        let decoded: Project = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, project);
    }

    #[test]
    fn test_track_defaults() {
        let json = r#"{"id": "t", "name": "t", "clip_id": "c"}"#;
        let track: TrackData = serde_json::from_str(json).expect("deserialize");
        assert_eq!(track.start, 0.0);
        assert_eq!(track.gain, 1.0);
        assert!(!track.muted);
    }

    #[test]
    fn test_from_timeline_drops_unused_clips() {
        let clip = Clip::new("rain", "rain", ClipAudio::interleaved(vec![0.0; 100], 100, 1));
        let mut timeline = Timeline::new();
        let id = timeline.add_track(&clip).unwrap().id().clone();
        timeline.set_gain(&id, 0.5).unwrap();

        let clips = vec![
            ClipData {
                id: "rain".to_string(),
                name: "rain".to_string(),
                path: PathBuf::from("rain.wav"),
            },
            ClipData {
                id: "unused".to_string(),
                name: "unused".to_string(),
                path: PathBuf::from("unused.wav"),
            },
        ];

        let project = Project::from_timeline("Weather", &timeline, &clips);
        assert_eq!(project.clips.len(), 1);
        assert_eq!(project.tracks.len(), 1);
        assert_eq!(project.tracks[0].gain, 0.5);
        assert_eq!(project.tracks[0].clip_duration, 1.0);
    }
}
