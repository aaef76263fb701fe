/*
 *  animation.rs
 *
 *  Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Time based tweening of numeric values
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

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::pacer::SharedClock;

/// Maps normalized progress `t` in [0, 1] to eased progress
pub type Easing = fn(f32) -> f32;

/// A numeric value that an [`Animation`] can drive.
///
/// Clones share the same cell, so the owner keeps one handle and hands
/// another to the animation when a track starts.
#[derive(Debug, Clone, Default)]
pub struct Animated(Rc<Cell<f32>>);

impl Animated {
    pub fn new(value: f32) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.0.get()
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.set(value);
    }
}

struct Track {
    from: f32,
    target: f32,
    current: f32,
    duration: Duration,
    started: Option<Instant>,
    binding: Animated,
    easing: Easing,
}

impl Track {
    /// Recompute the value for `now`, snapping to the target once the
    /// duration has elapsed.
    fn step(&mut self, now: Instant) {
        let Some(started) = self.started else { return };
        let elapsed = now.saturating_duration_since(started);
        if elapsed >= self.duration {
            self.current = self.target;
            self.started = None;
        } else {
            let t = (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0);
            let p = (self.easing)(t);
            self.current = self.from + (self.target - self.from) * p;
        }
        self.binding.set(self.current);
    }
}

/// Named tracks, each moving one [`Animated`] value towards a target.
///
/// Starting a track with an id that is already running replaces it and
/// snapshots the value's current position as the new start point.
pub struct Animation {
    tracks: HashMap<String, Track>,
    default_duration: Duration,
    default_easing: Easing,
    clock: SharedClock,
}

impl Animation {
    pub fn new(clock: SharedClock, default_duration: Duration) -> Self {
        Self {
            tracks: HashMap::new(),
            default_duration,
            default_easing: easing::ease_in_quad,
            clock,
        }
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.default_easing = easing;
        self
    }

    /// Start animating `value` towards `target`.
    ///
    /// # Arguments
    /// * `id` - track name, reusing one replaces the running track
    /// * `value` - handle the track writes through on every update
    /// * `target` - final value, written exactly once the duration elapses
    /// * `duration` / `easing` - None uses the animation's defaults
    pub fn start(
        &mut self,
        id: &str,
        value: &Animated,
        target: f32,
        duration: Option<Duration>,
        easing: Option<Easing>,
    ) {
        let from = value.get();
        self.tracks.insert(
            id.to_string(),
            Track {
                from,
                target,
                current: from,
                duration: duration.unwrap_or(self.default_duration),
                started: Some(self.clock.now()),
                binding: value.clone(),
                easing: easing.unwrap_or(self.default_easing),
            },
        );
    }

    /// Advance every running track to the current time
    pub fn update(&mut self) {
        let now = self.clock.now();
        for track in self.tracks.values_mut() {
            track.step(now);
        }
    }

    /// True while the track's duration has not yet elapsed. A finished
    /// track is snapped to its target on the way out.
    pub fn is_running(&mut self, id: &str) -> bool {
        let now = self.clock.now();
        match self.tracks.get_mut(id) {
            Some(track) if track.started.is_some() => {
                if let Some(started) = track.started {
                    if now.saturating_duration_since(started) >= track.duration {
                        track.step(now);
                        return false;
                    }
                }
                true
            }
            _ => false,
        }
    }

    /// Last value written by the track, None for unknown ids
    pub fn value(&self, id: &str) -> Option<f32> {
        self.tracks.get(id).map(|t| t.current)
    }
}

/// Easing curves. Each maps t in [0, 1] with f(0) = 0 and f(1) = 1.
pub mod easing {
    use std::f32::consts::PI;

    pub fn linear(t: f32) -> f32 {
        t
    }

    pub fn ease_in_quad(t: f32) -> f32 {
        t * t
    }

    pub fn ease_out_quad(t: f32) -> f32 {
        t * (2.0 - t)
    }

    pub fn ease_in_out_quad(t: f32) -> f32 {
        if t < 0.5 {
            2.0 * t * t
        } else {
            -1.0 + (4.0 - 2.0 * t) * t
        }
    }

    pub fn ease_in_cubic(t: f32) -> f32 {
        t * t * t
    }

    pub fn ease_out_cubic(t: f32) -> f32 {
        let u = t - 1.0;
        u * u * u + 1.0
    }

    pub fn ease_in_out_cubic(t: f32) -> f32 {
        if t < 0.5 {
            4.0 * t * t * t
        } else {
            let u = 2.0 * t - 2.0;
            (t - 1.0) * u * u + 1.0
        }
    }

    pub fn ease_in_elastic(t: f32) -> f32 {
        if t <= 0.0 || t >= 1.0 {
            return t.clamp(0.0, 1.0);
        }
        let c4 = (2.0 * PI) / 3.0;
        -(2f32.powf(10.0 * t - 10.0)) * ((t * 10.0 - 10.75) * c4).sin()
    }

    pub fn ease_out_elastic(t: f32) -> f32 {
        if t <= 0.0 || t >= 1.0 {
            return t.clamp(0.0, 1.0);
        }
        let c4 = (2.0 * PI) / 3.0;
        2f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
    }

    pub fn ease_in_out_elastic(t: f32) -> f32 {
        if t <= 0.0 || t >= 1.0 {
            return t.clamp(0.0, 1.0);
        }
        let c5 = (2.0 * PI) / 4.5;
        if t < 0.5 {
            -(2f32.powf(20.0 * t - 10.0) * ((20.0 * t - 11.125) * c5).sin()) / 2.0
        } else {
            (2f32.powf(-20.0 * t + 10.0) * ((20.0 * t - 11.125) * c5).sin()) / 2.0 + 1.0
        }
    }

    pub fn ease_out_bounce(t: f32) -> f32 {
        const N1: f32 = 7.5625;
        const D1: f32 = 2.75;
        if t < 1.0 / D1 {
            N1 * t * t
        } else if t < 2.0 / D1 {
            let t = t - 1.5 / D1;
            N1 * t * t + 0.75
        } else if t < 2.5 / D1 {
            let t = t - 2.25 / D1;
            N1 * t * t + 0.9375
        } else {
            let t = t - 2.625 / D1;
            N1 * t * t + 0.984375
        }
    }

    pub fn ease_in_bounce(t: f32) -> f32 {
        1.0 - ease_out_bounce(1.0 - t)
    }

    pub fn ease_in_out_bounce(t: f32) -> f32 {
        if t < 0.5 {
            (1.0 - ease_out_bounce(1.0 - 2.0 * t)) / 2.0
        } else {
            (1.0 + ease_out_bounce(2.0 * t - 1.0)) / 2.0
        }
    }

    /// Every curve by name, used for lookups from configuration
    pub const ALL: [(&str, super::Easing); 13] = [
        ("linear", linear),
        ("ease_in_quad", ease_in_quad),
        ("ease_out_quad", ease_out_quad),
        ("ease_in_out_quad", ease_in_out_quad),
        ("ease_in_cubic", ease_in_cubic),
        ("ease_out_cubic", ease_out_cubic),
        ("ease_in_out_cubic", ease_in_out_cubic),
        ("ease_in_elastic", ease_in_elastic),
        ("ease_out_elastic", ease_out_elastic),
        ("ease_in_out_elastic", ease_in_out_elastic),
        ("ease_in_bounce", ease_in_bounce),
        ("ease_out_bounce", ease_out_bounce),
        ("ease_in_out_bounce", ease_in_out_bounce),
    ];

    pub fn by_name(name: &str) -> Option<super::Easing> {
        ALL.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::ManualClock;
    use std::sync::Arc;

    fn setup() -> (Arc<ManualClock>, Animation) {
        let clock = ManualClock::shared();
        let anim = Animation::new(clock.clone(), Duration::from_millis(300));
        (clock, anim)
    }

    #[test]
    fn test_easing_endpoints() {
        for (name, f) in easing::ALL {
            assert!(f(0.0).abs() < 1e-4, "{} at 0 = {}", name, f(0.0));
            assert!((f(1.0) - 1.0).abs() < 1e-4, "{} at 1 = {}", name, f(1.0));
        }
    }

    #[test]
    fn test_non_overshooting_curves_stay_in_range() {
        let bounded = [
            "linear",
            "ease_in_quad",
            "ease_out_quad",
            "ease_in_out_quad",
            "ease_in_cubic",
            "ease_out_cubic",
            "ease_in_out_cubic",
            "ease_in_bounce",
            "ease_out_bounce",
            "ease_in_out_bounce",
        ];
        for name in bounded {
            let f = easing::by_name(name).unwrap();
            for i in 0..=100 {
                let v = f(i as f32 / 100.0);
                assert!((-1e-4..=1.0 + 1e-4).contains(&v), "{} out of range: {}", name, v);
            }
        }
    }

    #[test]
    fn test_converges_to_target() {
        let (clock, mut anim) = setup();
        let v = Animated::new(128.0);
        anim.start("slide", &v, 0.0, None, None);
        assert!(anim.is_running("slide"));

        clock.advance(Duration::from_millis(150));
        anim.update();
        assert!(v.get() > 0.0 && v.get() < 128.0);

        clock.advance(Duration::from_millis(151));
        anim.update();
        assert_eq!(v.get(), 0.0);
        assert!(!anim.is_running("slide"));
    }

    #[test]
    fn test_is_running_snaps_without_update() {
        let (clock, mut anim) = setup();
        let v = Animated::new(0.0);
        anim.start("y", &v, -7.0, Some(Duration::from_millis(100)), Some(easing::ease_in_cubic));
        clock.advance(Duration::from_millis(101));
        assert!(!anim.is_running("y"));
        assert_eq!(v.get(), -7.0);
        assert_eq!(anim.value("y"), Some(-7.0));
    }

    #[test]
    fn test_restart_snapshots_current_value() {
        let (clock, mut anim) = setup();
        let v = Animated::new(0.0);
        anim.start("x", &v, 100.0, None, Some(easing::linear));
        clock.advance(Duration::from_millis(150));
        anim.update();
        let mid = v.get();
        assert!((mid - 50.0).abs() < 0.5);

        anim.start("x", &v, 0.0, None, Some(easing::linear));
        anim.update();
        assert!((v.get() - mid).abs() < 1e-3);
        clock.advance(Duration::from_millis(300));
        anim.update();
        assert_eq!(v.get(), 0.0);
    }

    #[test]
    fn test_zero_duration_completes_immediately() {
        let (_clock, mut anim) = setup();
        let v = Animated::new(5.0);
        anim.start("z", &v, 9.0, Some(Duration::ZERO), None);
        assert!(!anim.is_running("z"));
        assert_eq!(v.get(), 9.0);
    }

    #[test]
    fn test_unknown_track_is_idle() {
        let (_clock, mut anim) = setup();
        assert!(!anim.is_running("nope"));
        assert_eq!(anim.value("nope"), None);
    }
}
