/*
 *  display/traits.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Core trait definitions for display driver abstraction
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

use crate::canvas::Canvas;
use crate::display::error::DisplayError;

/// Display capabilities and metadata
#[derive(Debug, Clone)]
pub struct DisplayCapabilities {
    /// Display width in pixels
    pub width: u32,

    /// Display height in pixels
    pub height: u32,

    /// Whether the display supports hardware rotation
    pub supports_rotation: bool,

    /// Maximum recommended frame rate
    pub max_fps: u32,

    /// Whether the display supports contrast control
    pub supports_contrast: bool,
}

/// Minimal hardware abstraction - all display drivers must implement this trait
///
/// The engine hands a finished monochrome frame to `display` once per tick
/// and uses `show` / `hide` to wake and sleep the panel.
pub trait DisplayDriver: Send {
    /// Returns the capabilities of this display
    fn capabilities(&self) -> &DisplayCapabilities;

    /// Returns the display dimensions as (width, height)
    fn dimensions(&self) -> (u32, u32) {
        let caps = self.capabilities();
        (caps.width, caps.height)
    }

    /// Initialize the display hardware
    fn init(&mut self) -> Result<(), DisplayError>;

    /// Push a complete frame to the panel
    ///
    /// The frame must match the display dimensions.
    fn display(&mut self, frame: &Canvas) -> Result<(), DisplayError>;

    /// Switch the panel on
    fn show(&mut self) -> Result<(), DisplayError>;

    /// Switch the panel off, contents are kept
    fn hide(&mut self) -> Result<(), DisplayError>;

    /// Clear the display to blank/off state
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Set display contrast (0-255)
    fn set_contrast(&mut self, level: u8) -> Result<(), DisplayError>;

    /// Set display rotation (if supported)
    ///
    /// Rotation angle should be 0, 90, 180, or 270 degrees.
    fn set_rotation(&mut self, degrees: u16) -> Result<(), DisplayError> {
        if !self.capabilities().supports_rotation {
            return Err(DisplayError::UnsupportedOperation);
        }
        if degrees != 0 && degrees != 90 && degrees != 180 && degrees != 270 {
            return Err(DisplayError::InvalidRotation(degrees));
        }
        // Default implementation returns error; drivers should override
        Err(DisplayError::UnsupportedOperation)
    }
}

/// Owned driver as the engine holds it
pub type BoxedDriver = Box<dyn DisplayDriver>;
