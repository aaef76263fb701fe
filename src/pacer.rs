/*
 *  pacer.rs
 *
 *  Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Time source and frame pacing for the render loop
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source. Everything time based in the engine (animations,
/// long presses, sleep timer, frame budget) reads time through this.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by `Instant::now`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when told to. Sleeping advances it instantly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Mutex::new(Instant::now()) }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn advance_secs(&self, secs: f32) {
        self.advance(Duration::from_secs_f32(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Frame time for a target rate, floored so a zero rate cannot stall
pub fn frame_time(fps: f32) -> Duration {
    Duration::from_secs_f32(1.0 / fps.max(0.1))
}

/// Sleeps away whatever is left of a frame budget.
///
/// I²C panels manage roughly 30fps, plugins ask for less and slide
/// transitions for more, so the budget is decided per frame by the caller.
pub struct Pacer {
    clock: SharedClock,
    frame_start: Instant,
    overruns: u64,
}

impl Pacer {
    pub fn new(clock: SharedClock) -> Self {
        let frame_start = clock.now();
        Self { clock, frame_start, overruns: 0 }
    }

    /// Mark the beginning of a frame
    #[inline]
    pub fn start_frame(&mut self) {
        self.frame_start = self.clock.now();
    }

    /// Time spent since `start_frame`
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.frame_start)
    }

    /// Sleep for the remainder of `budget`. Returns the time the frame took.
    pub fn finish_frame(&mut self, budget: Duration) -> Duration {
        let elapsed = self.elapsed();
        match budget.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => self.clock.sleep(remaining),
            _ => {
                self.overruns += 1;
                debug!(
                    "frame overran budget: {:.2}ms > {:.2}ms",
                    elapsed.as_secs_f32() * 1000.0,
                    budget.as_secs_f32() * 1000.0
                );
            }
        }
        elapsed
    }

    /// Frames that took longer than their budget
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}
