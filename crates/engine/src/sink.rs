use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::EngineError;

/// Fills an interleaved output buffer. Called from the audio thread.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A realtime destination for mixed audio.
pub trait OutputSink {
    fn format(&self) -> OutputFormat;

    /// Start pulling audio from `callback`. Audio flows until the returned
    /// stream is dropped.
    fn open(&self, callback: RenderCallback) -> Result<Box<dyn OutputStream>, EngineError>;
}

/// A running output stream. Dropping it releases the device.
pub trait OutputStream {
    /// Stop requesting audio.
    fn halt(&self) -> Result<(), EngineError>;
}

type Slot = Arc<Mutex<Option<RenderCallback>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<RenderCallback>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A sink pulled by the caller instead of a sound card.
///
/// Each [`ManualSink::pull`] runs the open callback for the requested number
/// of frames, which makes playback deterministic for headless use and tests.
/// Clones share the same stream slot.
#[derive(Clone)]
pub struct ManualSink {
    format: OutputFormat,
    slot: Slot,
}

impl ManualSink {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            format: OutputFormat {
                sample_rate,
                channels,
            },
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Pull `frames` frames of interleaved audio; silence when no stream is open.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * self.format.channels as usize];
        if let Some(callback) = lock(&self.slot).as_mut() {
            callback(&mut out);
        }
        out
    }

    pub fn is_open(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

impl OutputSink for ManualSink {
    fn format(&self) -> OutputFormat {
        self.format
    }

    fn open(&self, callback: RenderCallback) -> Result<Box<dyn OutputStream>, EngineError> {
        let mut slot = lock(&self.slot);
        if slot.is_some() {
            return Err(EngineError::Unavailable("sink is already playing".to_string()));
        }
        *slot = Some(callback);
        Ok(Box::new(ManualStream {
            slot: self.slot.clone(),
        }))
    }
}

struct ManualStream {
    slot: Slot,
}

impl OutputStream for ManualStream {
    fn halt(&self) -> Result<(), EngineError> {
        lock(&self.slot).take();
        Ok(())
    }
}

impl Drop for ManualStream {
    fn drop(&mut self) {
        lock(&self.slot).take();
    }
}
