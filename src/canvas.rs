/*
 *  canvas.rs
 *
 *  Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	1-bit canvas shared by plugins, overlays and the compositor
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

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;

/// A runtime-sized monochrome image that embedded-graphics can draw into.
///
/// Plugins draw into one of these each frame, the engine composites them
/// into the main screen and the driver pushes the result to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    buf: Vec<BinaryColor>,
    w: usize,
    h: usize,
}

impl Canvas {
    /// Create a canvas with every pixel off
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        Self { buf: vec![BinaryColor::Off; w * h], w, h }
    }

    pub fn width(&self) -> u32 { self.w as u32 }
    pub fn height(&self) -> u32 { self.h as u32 }

    /// Immutable raw access, row major
    pub fn as_slice(&self) -> &[BinaryColor] { &self.buf }

    pub fn as_mut_slice(&mut self) -> &mut [BinaryColor] { &mut self.buf }

    /// Fill with a color
    pub fn fill(&mut self, color: BinaryColor) {
        self.buf.fill(color);
    }

    /// Turn every pixel off
    pub fn blank(&mut self) {
        self.fill(BinaryColor::Off);
    }

    /// Pixel at (x, y), None when outside the canvas
    pub fn pixel(&self, x: i32, y: i32) -> Option<BinaryColor> {
        self.idx(Point::new(x, y)).map(|i| self.buf[i])
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: BinaryColor) {
        if let Some(i) = self.idx(Point::new(x, y)) {
            self.buf[i] = color;
        }
    }

    /// Number of lit pixels
    pub fn count_on(&self) -> usize {
        self.buf.iter().filter(|c| c.is_on()).count()
    }

    /// Lit pixels as embedded-graphics pixels, handy for pushing to a panel
    pub fn on_pixels(&self) -> impl Iterator<Item = Pixel<BinaryColor>> + '_ {
        let w = self.w;
        self.buf
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_on())
            .map(move |(i, c)| Pixel(Point::new((i % w) as i32, (i / w) as i32), *c))
    }

    /// Replace the contents with `other`; mismatched sizes paste at the origin
    pub fn copy_from(&mut self, other: &Canvas) {
        if self.w == other.w && self.h == other.h {
            self.buf.copy_from_slice(&other.buf);
        } else {
            self.blank();
            self.paste(other, 0, 0);
        }
    }

    /// Paste `src` with its top-left corner at (x, y). Every source pixel
    /// overwrites the destination; anything outside the canvas is clipped.
    pub fn paste(&mut self, src: &Canvas, x: i32, y: i32) {
        self.blit(src, x, y, false);
    }

    /// Paste `src` at (x, y) using its lit pixels as the mask, so dark
    /// source pixels leave the destination untouched.
    pub fn paste_masked(&mut self, src: &Canvas, x: i32, y: i32) {
        self.blit(src, x, y, true);
    }

    /// Rows `top..bottom` as a new canvas of the same width
    pub fn crop(&self, top: u32, bottom: u32) -> Canvas {
        let top = (top as usize).min(self.h);
        let bottom = (bottom as usize).clamp(top, self.h);
        Canvas {
            buf: self.buf[top * self.w..bottom * self.w].to_vec(),
            w: self.w,
            h: bottom - top,
        }
    }

    /// Pack into 1 bit per pixel, 8 pixels per byte, LSB first
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.buf.len().div_ceil(8)];
        for (i, pixel) in self.buf.iter().enumerate() {
            if pixel.is_on() {
                bytes[i / 8] |= 1 << (i % 8);
            }
        }
        bytes
    }

    fn blit(&mut self, src: &Canvas, x: i32, y: i32, masked: bool) {
        for sy in 0..src.h {
            let dy = y + sy as i32;
            if dy < 0 || dy >= self.h as i32 {
                continue;
            }
            let row = dy as usize * self.w;
            for sx in 0..src.w {
                let dx = x + sx as i32;
                if dx < 0 || dx >= self.w as i32 {
                    continue;
                }
                let c = src.buf[sy * src.w + sx];
                if masked && c.is_off() {
                    continue;
                }
                self.buf[row + dx as usize] = c;
            }
        }
    }

    /// Map (x,y) to linear index; returns None if out of bounds
    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as usize, p.y as usize);
            if x < self.w && y < self.h {
                return Some(y * self.w + x);
            }
        }
        None
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl DrawTarget for Canvas {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.fill(color);
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        // colors arrive row major over the unclipped area
        for (p, c) in area.points().zip(colors) {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }
}
