/*
 *  display/drivers/ssd1306.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  SSD1306 OLED display driver implementation
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

use linux_embedded_hal::I2cdev;
use ssd1306::{
    mode::BufferedGraphicsMode,
    prelude::*,
    size::{DisplaySize, DisplaySize128x64, DisplaySize128x32},
    I2CDisplayInterface,
    Ssd1306,
};

use embedded_graphics::prelude::*;
use embedded_graphics::pixelcolor::BinaryColor;

use crate::canvas::Canvas;
use crate::config::DisplayConfig as PanelConfig;
use crate::display::error::DisplayError;
use crate::display::traits::{DisplayDriver, DisplayCapabilities};

use log::{debug, info};

type Panel<SIZE> = Ssd1306<I2CInterface<I2cdev>, SIZE, BufferedGraphicsMode<SIZE>>;

/// Enum to handle different SSD1306 display sizes
enum Ssd1306Variants {
    Size128x64(Panel<DisplaySize128x64>),
    Size128x32(Panel<DisplaySize128x32>),
}

/// Run the same expression against whichever panel size is wired up
macro_rules! with_panel {
    ($variants:expr, $d:ident => $body:expr) => {
        match $variants {
            Ssd1306Variants::Size128x64($d) => $body,
            Ssd1306Variants::Size128x32($d) => $body,
        }
    };
}

/// SSD1306 display driver wrapper
pub struct Ssd1306Driver {
    /// The underlying ssd1306 driver
    display: Ssd1306Variants,

    /// Display capabilities
    capabilities: DisplayCapabilities,
}

impl Ssd1306Driver {
    /// Create a new SSD1306 driver using I2C
    ///
    /// # Arguments
    ///
    /// * `i2c_bus_path` - Path to I2C device (e.g., "/dev/i2c-1")
    /// * `address` - I2C address (typically 0x3C or 0x3D)
    /// * `config` - Display configuration
    ///
    /// # Returns
    ///
    /// A configured SSD1306 driver or an error
    pub fn new_i2c(
        i2c_bus_path: &str,
        address: u8,
        config: &PanelConfig,
    ) -> Result<Self, DisplayError> {
        info!("Initializing SSD1306 on {} at address 0x{:02X}", i2c_bus_path, address);

        let i2c = I2cdev::new(i2c_bus_path)
            .map_err(|e| DisplayError::I2cError(format!("Failed to open {}: {}", i2c_bus_path, e)))?;

        let width = config.width.unwrap_or(128);
        let height = config.height.unwrap_or(64);

        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let display = match (width, height) {
            (128, 64) => Ssd1306Variants::Size128x64(
                Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
                    .into_buffered_graphics_mode(),
            ),
            (128, 32) => Ssd1306Variants::Size128x32(
                Ssd1306::new(interface, DisplaySize128x32, DisplayRotation::Rotate0)
                    .into_buffered_graphics_mode(),
            ),
            _ => {
                return Err(DisplayError::InvalidConfiguration(
                    format!("Unsupported SSD1306 size: {}x{}", width, height)
                ));
            }
        };

        let capabilities = DisplayCapabilities {
            width,
            height,
            supports_rotation: true,
            max_fps: 30, // I2C is slower
            supports_contrast: true,
        };

        // the engine calls init() before the first frame
        let mut driver = Self { display, capabilities };
        if let Some(rotation) = config.rotate_deg.filter(|r| *r != 0) {
            driver.set_rotation(rotation)?;
        }

        info!("SSD1306 ready ({}x{})", width, height);
        Ok(driver)
    }
}

/// Copy the lit pixels of a frame into the panel buffer and flush it
fn push_frame<SIZE: DisplaySize>(display: &mut Panel<SIZE>, frame: &Canvas) -> Result<(), DisplayError> {
    DrawTarget::clear(display, BinaryColor::Off)?;
    display.draw_iter(frame.on_pixels())?;
    display.flush()?;
    Ok(())
}

impl DisplayDriver for Ssd1306Driver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        with_panel!(&mut self.display, d => d.init())
            .map_err(|e| DisplayError::InitializationFailed(format!("{:?}", e)))
    }

    fn display(&mut self, frame: &Canvas) -> Result<(), DisplayError> {
        let expected = self.dimensions();
        let actual = (frame.width(), frame.height());
        if expected != actual {
            return Err(DisplayError::FrameSizeMismatch { expected, actual });
        }
        with_panel!(&mut self.display, d => push_frame(d, frame))
    }

    fn show(&mut self) -> Result<(), DisplayError> {
        debug!("panel on");
        with_panel!(&mut self.display, d => d.set_display_on(true))?;
        Ok(())
    }

    fn hide(&mut self) -> Result<(), DisplayError> {
        debug!("panel off");
        with_panel!(&mut self.display, d => d.set_display_on(false))?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        with_panel!(&mut self.display, d => {
            DrawTarget::clear(d, BinaryColor::Off)?;
            d.flush()?;
        });
        Ok(())
    }

    fn set_contrast(&mut self, level: u8) -> Result<(), DisplayError> {
        // the controller exposes a handful of preset levels
        let brightness = match level {
            0..=63 => Brightness::DIMMEST,
            64..=127 => Brightness::DIM,
            128..=191 => Brightness::NORMAL,
            _ => Brightness::BRIGHTEST,
        };
        with_panel!(&mut self.display, d => d.set_brightness(brightness))?;
        Ok(())
    }

    /// Quarter turns stand the panel on its side, so the frame size the
    /// engine composes swaps with them.
    fn set_rotation(&mut self, degrees: u16) -> Result<(), DisplayError> {
        let rotation = match degrees {
            0 => DisplayRotation::Rotate0,
            90 => DisplayRotation::Rotate90,
            180 => DisplayRotation::Rotate180,
            270 => DisplayRotation::Rotate270,
            _ => return Err(DisplayError::InvalidRotation(degrees)),
        };
        with_panel!(&mut self.display, d => d.set_rotation(rotation))?;
        let (width, height) = rotated_size(self.capabilities.width, self.capabilities.height, degrees);
        self.capabilities.width = width;
        self.capabilities.height = height;
        Ok(())
    }
}

/// Frame size for a rotation, given the current size in any orientation.
/// SSD1306 modules are always wider than tall when unrotated.
fn rotated_size(width: u32, height: u32, degrees: u16) -> (u32, u32) {
    let (long, short) = (width.max(height), width.min(height));
    if degrees % 180 == 90 { (short, long) } else { (long, short) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_turns_swap_the_frame() {
        assert_eq!(rotated_size(128, 64, 0), (128, 64));
        assert_eq!(rotated_size(128, 64, 90), (64, 128));
        assert_eq!(rotated_size(64, 128, 180), (128, 64));
        assert_eq!(rotated_size(128, 32, 270), (32, 128));
        assert_eq!(rotated_size(32, 128, 270), (32, 128));
    }
}
