//! Layer-reveal playback.
//!
//! The controller owns no timer.  `start` and `tick` hand back a
//! [`PlaybackStep`]; the shell arms whatever timer it has with the returned
//! handle and calls [`PlaybackController::tick`] with that handle when it
//! fires.  A tick whose handle is not the pending one is dropped, so a
//! cancelled timer that still fires can never advance the run.
//!
//! While running, exactly one layer (the one in the reveal slot, second from
//! the end) is visible.  Layers are moved into the slot by position swaps,
//! from `count - 2` down to 0, and the last-index layer is revealed last.
//! Finishing or stopping restores the start-of-run snapshot verbatim.

use std::time::{Duration, Instant};

use crate::canvas::LayerStack;
use crate::components::history::StackSnapshot;
use crate::error::{EditorError, Result};

/// Minimum stack size for a run.
pub const MIN_PLAYBACK_LAYERS: usize = 3;

/// Identifies one scheduled tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickHandle(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackStep {
    /// Call `tick(handle)` after `delay`.
    Scheduled { handle: TickHandle, delay: Duration },
    /// The run ended and the stack was restored.
    Finished,
}

enum PlaybackState {
    Idle,
    Running {
        step: usize,
        pending: TickHandle,
        restore: StackSnapshot,
    },
}

pub struct PlaybackController {
    state: PlaybackState,
    interval: Duration,
    next_handle: u64,
}

impl PlaybackController {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: PlaybackState::Idle,
            interval,
            next_handle: 1,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes effect from the next scheduled tick.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, PlaybackState::Running { .. })
    }

    pub fn step(&self) -> Option<usize> {
        match &self.state {
            PlaybackState::Running { step, .. } => Some(*step),
            PlaybackState::Idle => None,
        }
    }

    /// The tick the shell should currently have armed.
    pub fn pending(&self) -> Option<TickHandle> {
        match &self.state {
            PlaybackState::Running { pending, .. } => Some(*pending),
            PlaybackState::Idle => None,
        }
    }

    /// The stack as it was when the run started.
    pub fn original(&self) -> Option<&LayerStack> {
        match &self.state {
            PlaybackState::Running { restore, .. } => Some(restore.stack()),
            PlaybackState::Idle => None,
        }
    }

    pub fn reveal_slot(count: usize) -> usize {
        count.saturating_sub(2)
    }

    /// Begin a run.  A run already in progress is stopped (and its stack
    /// restored) first; the returned step carries a fresh handle, so the old
    /// timer is stale from here on.
    pub fn start(&mut self, stack: &mut LayerStack) -> Result<PlaybackStep> {
        self.stop(stack);

        if stack.len() < MIN_PLAYBACK_LAYERS {
            return Err(EditorError::precondition(format!(
                "playback needs at least {} layers, the stack has {}",
                MIN_PLAYBACK_LAYERS,
                stack.len()
            )));
        }

        let restore = StackSnapshot::capture(stack);
        reveal_only(stack, Self::reveal_slot(stack.len()));
        let pending = self.fresh_handle();
        self.state = PlaybackState::Running { step: 2, pending, restore };
        Ok(self.scheduled(pending))
    }

    /// Advance one step.  Returns `None` for a stale or unexpected handle
    /// (nothing changes).
    pub fn tick(&mut self, handle: TickHandle, stack: &mut LayerStack) -> Option<PlaybackStep> {
        let (step, restore_len) = match &self.state {
            PlaybackState::Running { step, pending, restore } if *pending == handle => {
                (*step, restore.stack().len())
            }
            _ => return None,
        };

        let count = stack.len();
        let slot = Self::reveal_slot(count);

        // The stack must not change shape under a run.
        if count != restore_len {
            return Some(self.finish(stack));
        }

        let next = if step == 2 {
            // The first reveal stays up for one more interval
            step + 1
        } else if step <= count {
            let source = count - step;
            stack.swap(source, slot);
            reveal_only(stack, slot);
            step + 1
        } else if step == count + 1 {
            // The last-index layer never passes through the slot above
            stack.swap(count - 1, slot);
            reveal_only(stack, slot);
            step + 1
        } else {
            return Some(self.finish(stack));
        };

        let pending = self.fresh_handle();
        if let PlaybackState::Running { step, pending: p, .. } = &mut self.state {
            *step = next;
            *p = pending;
        }
        Some(self.scheduled(pending))
    }

    /// Cancel a run and restore the stack.  Returns the handle whose timer
    /// the shell must cancel, or `None` if nothing was running.
    pub fn stop(&mut self, stack: &mut LayerStack) -> Option<TickHandle> {
        match std::mem::replace(&mut self.state, PlaybackState::Idle) {
            PlaybackState::Running { pending, restore, .. } => {
                restore.restore_into(stack);
                Some(pending)
            }
            PlaybackState::Idle => None,
        }
    }

    fn finish(&mut self, stack: &mut LayerStack) -> PlaybackStep {
        self.stop(stack);
        PlaybackStep::Finished
    }

    fn fresh_handle(&mut self) -> TickHandle {
        let h = TickHandle(self.next_handle);
        self.next_handle += 1;
        h
    }

    fn scheduled(&self, handle: TickHandle) -> PlaybackStep {
        PlaybackStep::Scheduled { handle, delay: self.interval }
    }
}

/// Only `slot` is visible and opaque.
fn reveal_only(stack: &mut LayerStack, slot: usize) {
    for (i, layer) in stack.layers_mut().iter_mut().enumerate() {
        if i == slot {
            layer.alpha = 1.0;
            layer.hidden = false;
        } else {
            layer.alpha = 0.0;
            layer.hidden = true;
        }
    }
}

// ============================================================================
// DEADLINE TIMER: single-shot timer for loop-driven shells
// ============================================================================

/// One pending deadline.  Arming replaces whatever was pending.
#[derive(Default, Debug)]
pub struct DeadlineTimer {
    pending: Option<(TickHandle, Instant)>,
}

impl DeadlineTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, handle: TickHandle, delay: Duration, now: Instant) {
        self.pending = Some((handle, now + delay));
    }

    /// Arm for a `Scheduled` step, clear for `Finished`.
    pub fn follow(&mut self, step: PlaybackStep, now: Instant) {
        match step {
            PlaybackStep::Scheduled { handle, delay } => self.arm(handle, delay, now),
            PlaybackStep::Finished => self.pending = None,
        }
    }

    /// Returns whether `handle` was the pending one.
    pub fn cancel(&mut self, handle: TickHandle) -> bool {
        if matches!(self.pending, Some((h, _)) if h == handle) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Fires (and disarms) once `now` reaches the deadline.
    pub fn poll(&mut self, now: Instant) -> Option<TickHandle> {
        match self.pending {
            Some((handle, deadline)) if now >= deadline => {
                self.pending = None;
                Some(handle)
            }
            _ => None,
        }
    }

    /// Time left until the deadline, zero if already due.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.pending.map(|(_, deadline)| deadline.saturating_duration_since(now))
    }
}
