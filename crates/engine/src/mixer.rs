use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use basedrop::Shared;
use sfx_render::{RenderPlan, mix_into};

/// Messages from the control thread to the audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Command {
    SetGain { index: usize, gain: f32 },
    SetMuted { index: usize, muted: bool },
    /// Take the next plan from the plan queue. Track indices in later
    /// commands refer to that plan.
    Reschedule,
    Stop,
}

pub(crate) type SharedPlan = Shared<RenderPlan>;

/// Playback position published by the audio thread.
#[derive(Debug, Default)]
pub(crate) struct Clock {
    frames: AtomicU64,
    finished: AtomicBool,
}

impl Clock {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Audio-thread side of a transport.
///
/// Walks the plan one callback at a time, starting at frame 0 on the first
/// callback. Once the end frame is reached it marks the clock finished and
/// outputs silence from then on. A rescheduled plan takes over at the current
/// position; the replaced one is handed back to the collector when dropped.
pub(crate) struct Mixer {
    plan: SharedPlan,
    plans: rtrb::Consumer<SharedPlan>,
    gains: Vec<f32>,
    muted: Vec<bool>,
    effective: Vec<f32>,
    position: u64,
    end_frame: u64,
    plan_channels: usize,
    output_channels: usize,
    scratch: Vec<f32>,
    commands: rtrb::Consumer<Command>,
    clock: Arc<Clock>,
    halted: bool,
}

impl Mixer {
    pub fn new(
        plan: SharedPlan,
        output_channels: u16,
        plans: rtrb::Consumer<SharedPlan>,
        commands: rtrb::Consumer<Command>,
        clock: Arc<Clock>,
    ) -> Self {
        let gains: Vec<f32> = plan.tracks().iter().map(|t| t.gain).collect();
        let muted: Vec<bool> = plan.tracks().iter().map(|t| t.muted).collect();
        let effective = plan.gains();
        let end_frame = plan.end_frame();
        let plan_channels = plan.settings().channels as usize;

        Self {
            plan,
            plans,
            gains,
            muted,
            effective,
            position: 0,
            end_frame,
            plan_channels,
            output_channels: output_channels as usize,
            scratch: Vec::new(),
            commands,
            clock,
            halted: false,
        }
    }

    pub fn process(&mut self, out: &mut [f32]) {
        while let Ok(command) = self.commands.pop() {
            self.apply(command);
        }

        out.fill(0.0);
        if self.halted {
            return;
        }

        let requested = (out.len() / self.output_channels) as u64;
        let frames = requested.min(self.end_frame.saturating_sub(self.position)) as usize;

        self.scratch.clear();
        self.scratch.resize(frames * self.plan_channels, 0.0);
        mix_into(
            self.plan.tracks(),
            &self.effective,
            self.position,
            self.plan_channels,
            &mut self.scratch,
        );

        for (frame_out, frame_in) in out
            .chunks_exact_mut(self.output_channels)
            .zip(self.scratch.chunks_exact(self.plan_channels))
        {
            for (ch, sample) in frame_out.iter_mut().enumerate() {
                *sample = frame_in[ch % self.plan_channels].clamp(-1.0, 1.0);
            }
        }

        self.position += frames as u64;
        self.clock.frames.store(self.position, Ordering::Release);

        if self.position >= self.end_frame {
            self.halted = true;
            self.clock.finished.store(true, Ordering::Release);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetGain { index, gain } => {
                if let Some(slot) = self.gains.get_mut(index) {
                    *slot = gain;
                }
            }
            Command::SetMuted { index, muted } => {
                if let Some(slot) = self.muted.get_mut(index) {
                    *slot = muted;
                }
            }
            Command::Reschedule => {
                if let Ok(plan) = self.plans.pop() {
                    self.swap(plan);
                }
                return;
            }
            Command::Stop => {
                self.halted = true;
                return;
            }
        }

        for ((effective, &gain), &muted) in self
            .effective
            .iter_mut()
            .zip(&self.gains)
            .zip(&self.muted)
        {
            *effective = if muted { 0.0 } else { gain };
        }
    }

    fn swap(&mut self, plan: SharedPlan) {
        self.gains.clear();
        self.gains.extend(plan.tracks().iter().map(|t| t.gain));
        self.muted.clear();
        self.muted.extend(plan.tracks().iter().map(|t| t.muted));
        self.effective.clear();
        self.effective
            .extend(plan.tracks().iter().map(|t| t.effective_gain()));
        self.end_frame = plan.end_frame();
        self.plan = plan;
    }
}
