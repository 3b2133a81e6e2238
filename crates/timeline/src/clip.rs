use std::collections::HashMap;
use std::fmt;

use crate::ClipAudio;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClipId(pub String);

impl ClipId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClipId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ClipId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A generated sound: immutable decoded audio plus the prompt it came from.
#[derive(Debug, Clone)]
pub struct Clip {
    pub id: ClipId,
    /// Display name, usually the text prompt that produced the sound.
    pub name: String,
    pub audio: ClipAudio,
}

impl Clip {
    pub fn new(id: impl Into<ClipId>, name: impl Into<String>, audio: ClipAudio) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            audio,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.audio.duration_secs()
    }
}

/// A clip could not be resolved for a track.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("clip '{clip_id}' is not available")]
pub struct MissingClipError {
    pub clip_id: ClipId,
}

/// Anything that can hand out clips by id.
///
/// Render and playback resolve every track through this trait, fanning the
/// lookups out across threads, so implementations must be `Sync`.
pub trait ClipSource: Sync {
    fn fetch(&self, id: &ClipId) -> Result<Clip, MissingClipError>;
}

/// Decoded clips keyed by id.
///
/// The store owns the sample data. Entries live until the owner evicts them;
/// tracks only hold a [`ClipId`].
#[derive(Debug, Default, Clone)]
pub struct ClipStore {
    clips: HashMap<ClipId, Clip>,
}

impl ClipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a clip, returning the one it replaced.
    pub fn insert(&mut self, clip: Clip) -> Option<Clip> {
        self.clips.insert(clip.id.clone(), clip)
    }

    pub fn get(&self, id: &ClipId) -> Option<&Clip> {
        self.clips.get(id)
    }

    pub fn contains(&self, id: &ClipId) -> bool {
        self.clips.contains_key(id)
    }

    pub fn evict(&mut self, id: &ClipId) -> Option<Clip> {
        self.clips.remove(id)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }
}

impl ClipSource for ClipStore {
    fn fetch(&self, id: &ClipId) -> Result<Clip, MissingClipError> {
        self.clips.get(id).cloned().ok_or_else(|| MissingClipError {
            clip_id: id.clone(),
        })
    }
}
