use std::sync::Arc;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Shared};
use sfx_render::{RenderPlan, RenderSettings};
use sfx_timeline::{ClipSource, Timeline, TimelineError, TrackId};
use tracing::{debug, warn};

use crate::mixer::{Clock, Command, Mixer, SharedPlan};
use crate::{EngineError, OutputSink, OutputStream, build_plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Playing,
    /// Every scheduled track has played out.
    Finished,
    /// Stopped by the caller.
    Stopped,
}

/// A live playback session for one timeline snapshot.
///
/// Owns the output stream and the handles to every scheduled track. The
/// stream is released by [`Transport::stop`], by [`Transport::poll`] once
/// playback has finished, or on drop. Timeline edits reach a running
/// transport only through [`Transport::reschedule`].
pub struct Transport {
    clock: Arc<Clock>,
    commands: rtrb::Producer<Command>,
    plans: rtrb::Producer<SharedPlan>,
    stream: Option<Box<dyn OutputStream>>,
    collector: Collector,
    track_ids: Vec<TrackId>,
    missing: Vec<TrackId>,
    settings: RenderSettings,
    duration: f64,
    stopped: bool,
}

impl Transport {
    pub(crate) fn start(plan: RenderPlan, sink: &dyn OutputSink) -> Result<Self, EngineError> {
        let collector = Collector::new();
        let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(64);
        let (plan_tx, plan_rx) = rtrb::RingBuffer::<SharedPlan>::new(4);
        let clock = Arc::new(Clock::default());

        let track_ids = plan.tracks().iter().map(|t| t.track_id.clone()).collect();
        let missing = plan.missing().to_vec();
        let settings = plan.settings();
        let duration = plan.duration();

        let plan = Shared::new(&collector.handle(), plan);
        let mut mixer = Mixer::new(
            plan,
            sink.format().channels,
            plan_rx,
            command_rx,
            clock.clone(),
        );
        let stream = sink.open(Box::new(move |out: &mut [f32]| mixer.process(out)))?;

        debug!(duration, sample_rate = settings.sample_rate, "transport started");

        Ok(Self {
            clock,
            commands: command_tx,
            plans: plan_tx,
            stream: Some(stream),
            collector,
            track_ids,
            missing,
            settings,
            duration,
            stopped: false,
        })
    }

    /// Seconds of audio played so far. Never decreases.
    pub fn elapsed(&self) -> f64 {
        self.clock.frames() as f64 / self.settings.sample_rate as f64
    }

    /// Timeline duration captured when playback started or last rescheduled.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn state(&self) -> TransportState {
        if self.stopped {
            TransportState::Stopped
        } else if self.clock.is_finished() {
            TransportState::Finished
        } else {
            TransportState::Playing
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    /// Check on playback, releasing the output stream once it has finished.
    pub fn poll(&mut self) -> TransportState {
        let state = self.state();
        if state == TransportState::Finished && self.stream.is_some() {
            debug!(elapsed = self.elapsed(), "transport finished");
            self.release();
        }
        self.collector.collect();
        state
    }

    /// Replace the playing schedule with a fresh snapshot of `timeline`.
    ///
    /// Playback continues from the current position with the new offsets,
    /// gains and end frame. Ignored once playback has finished or stopped.
    pub fn reschedule<S: ClipSource + ?Sized>(
        &mut self,
        timeline: &Timeline,
        clips: &S,
    ) -> Result<(), EngineError> {
        if self.poll() != TransportState::Playing {
            return Ok(());
        }
        if self.plans.slots() == 0 || self.commands.slots() == 0 {
            return Err(EngineError::Stream("transport is busy, try again".to_string()));
        }

        let plan = build_plan(timeline, clips, self.settings)?;
        let track_ids = plan.tracks().iter().map(|t| t.track_id.clone()).collect();
        let missing = plan.missing().to_vec();
        let duration = plan.duration();

        let plan = Shared::new(&self.collector.handle(), plan);
        if self.plans.push(plan).is_err() || self.commands.push(Command::Reschedule).is_err() {
            return Err(EngineError::Stream("transport is busy, try again".to_string()));
        }

        self.track_ids = track_ids;
        self.missing = missing;
        self.duration = duration;
        debug!(duration, elapsed = self.elapsed(), "transport rescheduled");
        Ok(())
    }

    /// Halt every scheduled track. Safe to call repeatedly or after playback finished.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let _ = self.commands.push(Command::Stop);
        self.release();
    }

    /// Block until playback ends, reporting progress every `interval`.
    pub fn wait(&mut self, interval: Duration, mut on_progress: impl FnMut(f64)) -> TransportState {
        loop {
            let state = self.poll();
            on_progress(self.elapsed());
            if state != TransportState::Playing {
                return state;
            }
            thread::sleep(interval);
        }
    }

    /// Change a playing track's gain.
    pub fn set_gain(&mut self, id: &TrackId, gain: f32) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&gain) {
            return Err(TimelineError::OutOfRange {
                what: "gain",
                value: gain as f64,
            }
            .into());
        }
        if let Some(index) = self.index_of(id)? {
            self.send(Command::SetGain { index, gain });
        }
        Ok(())
    }

    /// Mute or unmute a playing track.
    pub fn set_muted(&mut self, id: &TrackId, muted: bool) -> Result<(), EngineError> {
        if let Some(index) = self.index_of(id)? {
            self.send(Command::SetMuted { index, muted });
        }
        Ok(())
    }

    /// Tracks playing as silence because their clips could not be resolved.
    pub fn missing_tracks(&self) -> &[TrackId] {
        &self.missing
    }

    /// Index of a scheduled track; `None` for tracks without a clip.
    fn index_of(&self, id: &TrackId) -> Result<Option<usize>, EngineError> {
        if let Some(index) = self.track_ids.iter().position(|t| t == id) {
            return Ok(Some(index));
        }
        if self.missing.contains(id) {
            return Ok(None);
        }
        Err(TimelineError::NotFound(id.clone()).into())
    }

    fn send(&mut self, command: Command) {
        if self.commands.push(command).is_err() {
            warn!(?command, "transport command queue full, dropping command");
        }
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.halt() {
                warn!(%err, "failed to halt output stream");
            }
            drop(stream);
        }
        self.collector.collect();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.stop();
    }
}
