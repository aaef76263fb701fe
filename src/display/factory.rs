/*
 *  display/factory.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Builds the configured display driver
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

use crate::config::{DisplayConfig, DriverKind, BusConfig};
use crate::display::drivers::mock::MockDriver;
use crate::display::error::DisplayFactoryError;
use crate::display::traits::BoxedDriver;
use log::info;

#[cfg(feature = "driver-ssd1306")]
use crate::display::drivers::ssd1306::Ssd1306Driver;

/// Factory for creating display drivers from configuration
pub struct DisplayDriverFactory;

impl DisplayDriverFactory {
    /// Create a display driver from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Display configuration containing driver and bus settings
    ///
    /// # Returns
    ///
    /// A boxed trait object implementing DisplayDriver, or an error if the
    /// configuration is invalid or the driver was not compiled in.
    pub fn create_from_config(
        config: &DisplayConfig
    ) -> Result<BoxedDriver, DisplayFactoryError> {
        Self::validate_config(config)?;

        match config.driver.unwrap_or(DriverKind::Ssd1306) {
            DriverKind::Mock => {
                info!("Using mock display driver (headless)");
                Ok(Box::new(MockDriver::new(config)))
            }
            DriverKind::Ssd1306 => Self::create_ssd1306(config),
        }
    }

    #[cfg(feature = "driver-ssd1306")]
    fn create_ssd1306(config: &DisplayConfig) -> Result<BoxedDriver, DisplayFactoryError> {
        match config.bus.as_ref() {
            Some(BusConfig::I2c { bus, address, .. }) => {
                Ok(Box::new(Ssd1306Driver::new_i2c(bus, *address, config)?))
            }
            None => Err(DisplayFactoryError::NoBusConfiguration),
        }
    }

    #[cfg(not(feature = "driver-ssd1306"))]
    fn create_ssd1306(_config: &DisplayConfig) -> Result<BoxedDriver, DisplayFactoryError> {
        Err(DisplayFactoryError::DriverNotEnabled("driver-ssd1306"))
    }

    /// Validate a configuration without creating a driver
    ///
    /// This is useful for checking configuration at startup before attempting
    /// to initialize hardware.
    pub fn validate_config(config: &DisplayConfig) -> Result<(), DisplayFactoryError> {
        if config.driver != Some(DriverKind::Mock) && config.bus.is_none() {
            return Err(DisplayFactoryError::NoBusConfiguration);
        }

        if let Some(rotation) = config.rotate_deg {
            if rotation != 0 && rotation != 90 && rotation != 180 && rotation != 270 {
                return Err(DisplayFactoryError::ConfigError(
                    format!("Invalid rotation angle: {} (must be 0, 90, 180, or 270)", rotation)
                ));
            }
        }

        match (config.width, config.height) {
            (Some(0), _) | (_, Some(0)) => Err(DisplayFactoryError::ConfigError(
                "display width/height must be > 0".to_string()
            )),
            _ => Ok(()),
        }
    }
}
