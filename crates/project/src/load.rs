use crate::{ClipData, Project, ProjectError};
use rayon::prelude::*;
use sfx_decode::{decode_clip, resolve_clip_path};
use sfx_timeline::{ClipId, ClipStore, Timeline, Track, TrackId};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A clip whose audio file could not be loaded. Its tracks stay on the
/// timeline and render as silence.
#[derive(Debug, Clone)]
pub struct OfflineClip {
    pub clip_id: ClipId,
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug)]
pub struct LoadedProject {
    pub name: String,
    pub timeline: Timeline,
    pub clips: ClipStore,
    /// Clip entries with paths resolved against the project directory.
    pub clip_files: Vec<ClipData>,
    pub offline_clips: Vec<OfflineClip>,
}

fn load_project_data(path: &Path) -> Result<Project, ProjectError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

pub fn load_project(path: &Path) -> Result<LoadedProject, ProjectError> {
    let project = load_project_data(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    let clip_files: Vec<ClipData> = project
        .clips
        .iter()
        .map(|clip| ClipData {
            path: resolve_clip_path(base, &clip.path),
            ..clip.clone()
        })
        .collect();

    let decoded: Vec<_> = clip_files
        .par_iter()
        .map(|entry| (entry, decode_clip(entry.id.as_str(), entry.name.as_str(), &entry.path)))
        .collect();

    let mut clips = ClipStore::new();
    let mut offline_clips = Vec::new();
    for (entry, result) in decoded {
        match result {
            Ok(clip) => {
                clips.insert(clip);
            }
            Err(err) => {
                warn!(clip = %entry.id, error = %format!("{err:#}"), "clip is offline");
                offline_clips.push(OfflineClip {
                    clip_id: ClipId::new(entry.id.as_str()),
                    path: entry.path.clone(),
                    error: format!("{err:#}"),
                });
            }
        }
    }

    let mut timeline = Timeline::new();
    for data in &project.tracks {
        let clip_id = ClipId::new(data.clip_id.as_str());
        let clip_duration = clips
            .get(&clip_id)
            .map(|clip| clip.duration_secs())
            .unwrap_or(data.clip_duration);

        let track = Track::new(TrackId::new(data.id.as_str()), data.name.as_str(), clip_id, clip_duration)
            .with_start(data.start)
            .with_gain(data.gain)
            .with_muted(data.muted);
        timeline.insert(track)?;
    }

    debug!(
        name = %project.name,
        tracks = timeline.len(),
        clips = clips.len(),
        offline = offline_clips.len(),
        "loaded project"
    );

    Ok(LoadedProject {
        name: project.name,
        timeline,
        clips,
        clip_files,
        offline_clips,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackData;
    use tempfile::tempdir;

    fn write_test_wav(path: &Path, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).expect("create wav");
        for _ in 0..frames {
            writer.write_sample(8192i16).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    fn write_project(path: &Path, project: &Project) {
        let file = File::create(path).expect("create");
        serde_json::to_writer(std::io::BufWriter::new(file), project).expect("encode");
    }

    fn track(id: &str, clip_id: &str, start: f64) -> TrackData {
        TrackData {
            id: id.to_string(),
            name: clip_id.to_string(),
            clip_id: clip_id.to_string(),
            clip_duration: 2.0,
            start,
            gain: 0.5,
            muted: false,
        }
    }

    #[test]
    fn test_load_project_file_not_found() {
        let result = load_project(Path::new("/nonexistent/project.json"));
        assert!(matches!(result, Err(ProjectError::Io(_))));
    }

    #[test]
    fn test_load_project_invalid_format() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("invalid.json");
        std::fs::write(&path, b"not a project").expect("write");

        assert!(matches!(load_project(&path), Err(ProjectError::Json(_))));
    }

    #[test]
    fn test_load_project_with_relative_clip() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("clips")).expect("mkdir");
        write_test_wav(&dir.path().join("clips/rain.wav"), 8000);

        let project_path = dir.path().join("storm.json");
        write_project(
            &project_path,
            &Project {
                name: "Storm".to_string(),
                clips: vec![ClipData {
                    id: "rain".to_string(),
                    name: "rain".to_string(),
                    path: PathBuf::from("clips/rain.wav"),
                }],
                tracks: vec![track("track-1", "rain", 1.5)],
            },
        );

        let loaded = load_project(&project_path).expect("load");
        assert_eq!(loaded.name, "Storm");
        assert!(loaded.offline_clips.is_empty());
        assert!(loaded.clips.contains(&"rain".into()));
        assert_eq!(loaded.clip_files[0].path, dir.path().join("clips/rain.wav"));

        let track = &loaded.timeline.tracks()[0];
        assert_eq!(track.start(), 1.5);
        assert_eq!(track.gain(), 0.5);
        // Decoded length wins over the recorded one.
        assert!((track.clip_duration() - 1.0).abs() < 1e-9);
        assert!((loaded.timeline.total_duration() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_clip_goes_offline() {
        let dir = tempdir().expect("tempdir");
        write_test_wav(&dir.path().join("wind.wav"), 800);

        let project_path = dir.path().join("storm.json");
        write_project(
            &project_path,
            &Project {
                name: "Storm".to_string(),
                clips: vec![
                    ClipData {
                        id: "wind".to_string(),
                        name: "wind".to_string(),
                        path: PathBuf::from("wind.wav"),
                    },
                    ClipData {
                        id: "thunder".to_string(),
                        name: "thunder".to_string(),
                        path: PathBuf::from("missing.wav"),
                    },
                ],
                tracks: vec![track("track-1", "wind", 0.0), track("track-2", "thunder", 1.0)],
            },
        );

        let loaded = load_project(&project_path).expect("load");
        assert_eq!(loaded.clips.len(), 1);
        assert_eq!(loaded.offline_clips.len(), 1);
        assert_eq!(loaded.offline_clips[0].clip_id.as_str(), "thunder");
        assert!(loaded.offline_clips[0].error.contains("missing.wav"));

        // The offline track keeps its recorded duration.
        assert_eq!(loaded.timeline.len(), 2);
        assert_eq!(loaded.timeline.tracks()[1].clip_duration(), 2.0);
        assert_eq!(loaded.timeline.total_duration(), 3.0);
    }

    #[test]
    fn test_invalid_track_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let project_path = dir.path().join("bad.json");
        let mut bad = track("track-1", "rain", 0.0);
        bad.gain = 3.0;
        write_project(
            &project_path,
            &Project {
                name: "Bad".to_string(),
                clips: vec![],
                tracks: vec![bad],
            },
        );

        assert!(matches!(
            load_project(&project_path),
            Err(ProjectError::Timeline(_))
        ));
    }
}
