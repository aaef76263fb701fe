/*
 *  display/overlays/mod.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Transient notifications that slide in over the active screen
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

pub mod manager;
pub mod volume;

pub use manager::OverlayManager;
pub use volume::VolumeOverlay;

use std::any::Any;
use std::time::{Duration, Instant};

use crate::animation::{easing, Animated, Animation};
use crate::canvas::Canvas;
use crate::pacer::SharedClock;

/// Slide in/out time
pub const SLIDE_DURATION: Duration = Duration::from_millis(300);

/// How long an overlay stays up before sliding away
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3);

const SLIDE: &str = "slide";

/// Overlay types; at most one of each kind is on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Volume,
}

/// Lifecycle shared by every overlay.
///
/// An overlay starts above the screen (`y = -height`), eases down to 0 when
/// shown, stays for its lifetime, eases back up and is then expired.
pub struct OverlayState {
    width: u32,
    height: u32,
    lifetime: Duration,
    y_offset: Animated,
    anim: Animation,
    created_at: Instant,
    showing: bool,
    hiding: bool,
    expired: bool,
    clock: SharedClock,
}

impl OverlayState {
    pub fn new(width: u32, height: u32, lifetime: Duration, clock: SharedClock) -> Self {
        Self {
            width,
            height,
            lifetime,
            y_offset: Animated::new(-(height as f32)),
            anim: Animation::new(clock.clone(), SLIDE_DURATION),
            created_at: clock.now(),
            showing: false,
            hiding: false,
            expired: false,
            clock,
        }
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }

    /// Slide in from above and restart the lifetime
    pub fn show(&mut self) {
        self.showing = true;
        self.hiding = false;
        self.created_at = self.clock.now();
        self.anim.start(SLIDE, &self.y_offset, 0.0, None, Some(easing::ease_out_cubic));
    }

    /// Slide back out above the screen
    pub fn hide(&mut self) {
        self.hiding = true;
        self.showing = false;
        let target = -(self.height as f32);
        self.anim.start(SLIDE, &self.y_offset, target, None, Some(easing::ease_in_cubic));
    }

    /// Restart the lifetime of an overlay that is already up, bringing it
    /// back if it had started to leave
    pub fn touch(&mut self) {
        self.created_at = self.clock.now();
        self.expired = false;
        if self.hiding {
            self.show();
        }
    }

    pub fn update(&mut self) {
        let age = self.clock.now().saturating_duration_since(self.created_at);
        if !self.hiding && age > self.lifetime {
            self.hide();
        }

        self.anim.update();
        if self.showing {
            if !self.anim.is_running(SLIDE) {
                self.showing = false;
            }
        } else if self.hiding && !self.anim.is_running(SLIDE) {
            self.hiding = false;
            self.expired = true;
        }
    }

    /// Current vertical position, negative while partly above the screen
    pub fn y_offset(&self) -> i32 {
        self.y_offset.get().round() as i32
    }

    pub fn is_showing(&self) -> bool { self.showing }
    pub fn is_hiding(&self) -> bool { self.hiding }
    pub fn is_expired(&self) -> bool { self.expired }
}

/// A notification the overlay manager can composite over the screen
pub trait Overlay {
    fn kind(&self) -> OverlayKind;

    fn state(&self) -> &OverlayState;
    fn state_mut(&mut self) -> &mut OverlayState;

    /// Draw the overlay's content. Lit pixels are composited, dark ones
    /// let the screen underneath show through.
    fn draw(&self, canvas: &mut Canvas);

    /// Take over the content of a newer overlay of the same kind
    fn refresh_from(&mut self, newer: &dyn Overlay) {
        let _ = newer;
        self.state_mut().touch();
    }

    fn as_any(&self) -> &dyn Any;

    fn show(&mut self) {
        self.state_mut().show();
    }

    fn update(&mut self) {
        self.state_mut().update();
    }

    /// Freshly drawn overlay image
    fn image(&self) -> Canvas {
        let state = self.state();
        let mut canvas = Canvas::new(state.width(), state.height());
        self.draw(&mut canvas);
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacer::ManualClock;
    use std::sync::Arc;

    fn state(clock: &Arc<ManualClock>) -> OverlayState {
        OverlayState::new(32, 7, DEFAULT_LIFETIME, clock.clone())
    }

    #[test]
    fn test_starts_above_screen() {
        let clock = ManualClock::shared();
        let s = state(&clock);
        assert_eq!(s.y_offset(), -7);
        assert!(!s.is_showing() && !s.is_expired());
    }

    #[test]
    fn test_full_lifecycle() {
        let clock = ManualClock::shared();
        let mut s = state(&clock);
        s.show();
        clock.advance(Duration::from_millis(150));
        s.update();
        assert!(s.is_showing());
        assert!(s.y_offset() > -7 && s.y_offset() <= 0);

        clock.advance(Duration::from_millis(200));
        s.update();
        assert_eq!(s.y_offset(), 0);
        assert!(!s.is_showing());

        clock.advance(Duration::from_secs(3));
        s.update();
        assert!(s.is_hiding());

        clock.advance(Duration::from_millis(301));
        s.update();
        assert!(s.is_expired());
        assert_eq!(s.y_offset(), -7);
    }

    #[test]
    fn test_touch_while_hiding_slides_back() {
        let clock = ManualClock::shared();
        let mut s = state(&clock);
        s.show();
        clock.advance(Duration::from_millis(3100));
        s.update();
        assert!(s.is_hiding());

        s.touch();
        assert!(s.is_showing());
        assert!(!s.is_hiding());
        clock.advance(Duration::from_millis(400));
        s.update();
        assert_eq!(s.y_offset(), 0);
        assert!(!s.is_expired());
    }
}
