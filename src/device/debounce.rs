//! Debounce raw orientation readings into stable face events

use std::time::Duration;
use tokio::time::Instant;

use crate::models::{Face, StableFaceEvent};

/// Turns a jittery stream of readings into at most one event per settled face
///
/// A face becomes stable once it has been the only reading for at least
/// `window`. Any different reading restarts the clock for the new face, so a
/// tumbling cube never produces an event.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    candidate: Option<Candidate>,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    face: Face,
    since: Instant,
    emitted: bool,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            candidate: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Feed one raw reading taken at `now`
    pub fn observe(&mut self, face: Face, now: Instant) -> Option<StableFaceEvent> {
        match self.candidate {
            Some(candidate) if candidate.face == face => self.poll(now),
            _ => {
                self.candidate = Some(Candidate {
                    face,
                    since: now,
                    emitted: false,
                });
                // A zero window makes the first reading stable immediately
                self.poll(now)
            }
        }
    }

    /// Check whether the current candidate has become stable without a new reading
    pub fn poll(&mut self, now: Instant) -> Option<StableFaceEvent> {
        let candidate = self.candidate.as_mut()?;
        if candidate.emitted || now.duration_since(candidate.since) < self.window {
            return None;
        }
        candidate.emitted = true;
        Some(StableFaceEvent::new(candidate.face, candidate.since))
    }

    /// When the pending candidate will become stable, if one is pending
    pub fn deadline(&self) -> Option<Instant> {
        self.candidate
            .filter(|c| !c.emitted)
            .map(|c| c.since + self.window)
    }

    /// Forget the candidate (after a disconnect the old reading is stale)
    pub fn reset(&mut self) {
        self.candidate = None;
    }
}
