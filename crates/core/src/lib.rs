mod config;
pub mod session;

pub use config::{Config, ExportConfig, PlaybackConfig, RenderConfig};
pub use session::Session;

pub use sfx_decode::{decode_clip, decode_file};
pub use sfx_engine::{CpalSink, EngineError, ManualSink, OutputSink, Transport, TransportState};
pub use sfx_project::{ClipData, OfflineClip, Project, ProjectError, TrackData, load_project, save_project};
pub use sfx_render::{CancelToken, RenderError, RenderSettings, SampleBuffer, write_wav};
pub use sfx_timeline::{Clip, ClipAudio, ClipId, ClipStore, Timeline, TimelineError, Track, TrackId};
