/*
 *  display/overlays/manager.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Keeps the live overlays and composites them over a frame
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

use std::borrow::Cow;

use log::debug;

use super::{Overlay, VolumeOverlay, DEFAULT_LIFETIME};
use crate::canvas::Canvas;
use crate::constants::{VOLUME_OVERLAY_HEIGHT, VOLUME_OVERLAY_WIDTH};
use crate::pacer::SharedClock;

pub struct OverlayManager {
    width: u32,
    height: u32,
    overlays: Vec<Box<dyn Overlay>>,
    clock: SharedClock,
}

impl OverlayManager {
    pub fn new(width: u32, height: u32, clock: SharedClock) -> Self {
        Self { width, height, overlays: Vec::new(), clock }
    }

    /// Add an overlay. A live overlay of the same kind takes over the new
    /// one's content instead of stacking a second copy.
    pub fn add(&mut self, mut overlay: Box<dyn Overlay>) {
        if let Some(existing) = self.overlays.iter_mut().find(|o| o.kind() == overlay.kind()) {
            existing.refresh_from(overlay.as_ref());
            return;
        }
        debug!("overlay {:?} added", overlay.kind());
        overlay.show();
        self.overlays.push(overlay);
    }

    /// Advance every overlay and drop the expired ones
    pub fn update(&mut self) {
        for overlay in self.overlays.iter_mut() {
            overlay.update();
        }
        self.overlays.retain(|o| !o.state().is_expired());
    }

    /// Composite the live overlays onto `base`, right aligned at their
    /// current vertical offset. Borrows `base` untouched when nothing is up.
    pub fn render<'a>(&self, base: &'a Canvas) -> Cow<'a, Canvas> {
        if self.overlays.is_empty() {
            return Cow::Borrowed(base);
        }

        let mut out = base.clone();
        let screen_h = self.height as i32;
        for overlay in &self.overlays {
            let state = overlay.state();
            let (ow, oh) = (state.width() as i32, state.height() as i32);
            let y = state.y_offset();
            if y >= screen_h || y + oh <= 0 {
                continue;
            }

            let top = (-y).max(0);
            let bottom = oh.min(screen_h - y);
            if top >= bottom {
                continue;
            }
            let visible = overlay.image().crop(top as u32, bottom as u32);
            out.paste_masked(&visible, self.width as i32 - ow, y.max(0));
        }
        Cow::Owned(out)
    }

    pub fn has_active(&self) -> bool {
        !self.overlays.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Volume toast, reusing the one on screen if there is one
    pub fn show_volume(&mut self, percent: u8) {
        self.add(Box::new(VolumeOverlay::new(
            VOLUME_OVERLAY_WIDTH,
            VOLUME_OVERLAY_HEIGHT,
            percent,
            DEFAULT_LIFETIME,
            self.clock.clone(),
        )));
    }

    /// Level shown by the live volume toast, if any
    pub fn volume(&self) -> Option<u8> {
        self.overlays
            .iter()
            .find_map(|o| o.as_any().downcast_ref::<VolumeOverlay>())
            .map(VolumeOverlay::volume)
    }
}
