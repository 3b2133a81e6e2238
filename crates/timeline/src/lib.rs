//! Timeline model for arranging generated sound clips.
//!
//! Clips are immutable decoded audio held in a [`ClipStore`]. A [`Timeline`]
//! places clips on [`Track`]s with a start offset, gain and mute flag.

mod audio;
mod clip;
mod timeline;
mod track;

pub use audio::ClipAudio;
pub use clip::{Clip, ClipId, ClipSource, ClipStore, MissingClipError};
pub use timeline::{MAX_START_SECS, Timeline, TimelineError};
pub use track::{Track, TrackId, display_name};
