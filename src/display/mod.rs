/*
 *  display/mod.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - panel drivers, overlays and the screen engine
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

// Core trait definitions
pub mod traits;
pub mod error;
pub mod factory;

// Display drivers, the hardware ones behind feature flags
pub mod drivers;

// Transient notifications composited over the screen
pub mod overlays;

// Welcome / goodbye bitmaps
pub mod splash;

// Display manager
pub mod manager;

// Re-exports for convenience
pub use traits::{BoxedDriver, DisplayCapabilities, DisplayDriver};
pub use error::{DisplayError, DisplayFactoryError};
pub use factory::DisplayDriverFactory;
pub use manager::{DisplayManager, ManagerOptions, PluginRegistration, SlideDirection};
pub use overlays::{Overlay, OverlayKind, OverlayManager, VolumeOverlay};
pub use drivers::mock::{MockDriver, MockDriverState};

#[cfg(feature = "driver-ssd1306")]
pub use drivers::ssd1306::Ssd1306Driver;
