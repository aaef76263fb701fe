/*
 *  display/overlays/volume.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Volume level toast
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

use std::any::Any;
use std::time::Duration;

use embedded_graphics::{
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
};

use super::{Overlay, OverlayKind, OverlayState};
use crate::canvas::Canvas;
use crate::pacer::SharedClock;

/// A thin outlined bar in the top right corner, filled to the volume level
pub struct VolumeOverlay {
    state: OverlayState,
    percent: u8,
}

impl VolumeOverlay {
    pub fn new(width: u32, height: u32, percent: u8, lifetime: Duration, clock: SharedClock) -> Self {
        Self {
            state: OverlayState::new(width, height, lifetime, clock),
            percent: percent.min(100),
        }
    }

    pub fn volume(&self) -> u8 {
        self.percent
    }

    /// New level; keeps the toast up for another full lifetime
    pub fn set_volume(&mut self, percent: u8) {
        self.percent = percent.min(100);
        self.state.touch();
    }
}

impl Overlay for VolumeOverlay {
    fn kind(&self) -> OverlayKind {
        OverlayKind::Volume
    }

    fn state(&self) -> &OverlayState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OverlayState {
        &mut self.state
    }

    fn draw(&self, canvas: &mut Canvas) {
        let (w, h) = (self.state.width(), self.state.height());
        if w < 6 || h < 5 {
            return;
        }

        // background stays dark so it composites as transparent
        let frame_w = w - 2;
        let frame_h = h - 2;
        let frame = Rectangle::new(Point::new(2, 1), Size::new(frame_w, frame_h));
        let _ = frame
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(canvas);

        let fill_max = frame_w - 2;
        let fill = (fill_max * self.percent as u32 / 100).saturating_sub(2);
        if fill > 0 {
            let y = 1 + (frame_h as i32 - 1) / 2;
            let _ = Rectangle::new(Point::new(4, y), Size::new(fill, 1))
                .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
                .draw(canvas);
        }
    }

    fn refresh_from(&mut self, newer: &dyn Overlay) {
        match newer.as_any().downcast_ref::<VolumeOverlay>() {
            Some(v) => self.set_volume(v.percent),
            None => self.state.touch(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
