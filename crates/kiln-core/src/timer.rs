// SPDX-License-Identifier: CEPL-1.0
//! Game timer: delta time between ticks and total running time, with pause
//! support. Time spent stopped never shows up in [`Timer::total_time`].

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Timer {
    base: Instant,
    prev: Instant,
    stop: Option<Instant>,
    paused: Duration,
    delta: Duration,
}

impl Timer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            base: now,
            prev: now,
            stop: None,
            paused: Duration::ZERO,
            delta: Duration::ZERO,
        }
    }

    /// Seconds since the last tick. Zero while stopped.
    pub fn delta_time(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Seconds since [`Timer::reset`], not counting stopped spans.
    pub fn total_time(&self) -> f32 {
        let end = self.stop.unwrap_or(self.prev);
        end.saturating_duration_since(self.base)
            .saturating_sub(self.paused)
            .as_secs_f32()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_some()
    }

    /// Call before the message loop starts.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    /// Call once per frame.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn reset_at(&mut self, now: Instant) {
        self.base = now;
        self.prev = now;
        self.stop = None;
        self.paused = Duration::ZERO;
        self.delta = Duration::ZERO;
    }

    fn start_at(&mut self, now: Instant) {
        if let Some(stopped) = self.stop.take() {
            self.paused += now.saturating_duration_since(stopped);
            self.prev = now;
        }
    }

    fn stop_at(&mut self, now: Instant) {
        if self.stop.is_none() {
            self.stop = Some(now);
        }
    }

    fn tick_at(&mut self, now: Instant) {
        if self.stop.is_some() {
            self.delta = Duration::ZERO;
            return;
        }
        // Instant is monotonic, but keep the delta non-negative regardless.
        self.delta = now.saturating_duration_since(self.prev);
        self.prev = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
