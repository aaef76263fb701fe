//! This module contains global constants used across the display, plugins and engine.

/// Product name shown on the welcome screen and in logs.
pub const PRODUCT_NAME: &str = "Muspi";

/// The total width of the OLED display in pixels.
pub const DISPLAY_WIDTH: u32 = 128;
/// The total height of the OLED display in pixels.
pub const DISPLAY_HEIGHT: u32 = 64;

/// Panel contrast applied once at startup.
pub const DEFAULT_CONTRAST: u8 = 128;

pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";
pub const DEFAULT_I2C_ADDRESS: u8 = 0x3C;

/// Idle seconds before the panel sleeps (10 minutes).
pub const DEFAULT_SLEEP_SECS: u64 = 600;

pub const WELCOME_MESSAGE: &str = "Muspi";
pub const GOODBYE_MESSAGE: &str = "Bye";

// config locations, relative to the working directory unless overridden
pub const KEYMAP_FILE: &str = "config/keymap.json";
pub const PLUGINS_FILE: &str = "config/plugins.json";
pub const USER_DIR: &str = "~/.config/muspi";
pub const USER_PLUGINS_FILE: &str = "plugins.json";

/// Default plugin frame rate.
pub const DEFAULT_PLUGIN_FPS: f32 = 8.0;

/// Volume overlay geometry, right-aligned along the top edge.
pub const VOLUME_OVERLAY_WIDTH: u32 = 32;
pub const VOLUME_OVERLAY_HEIGHT: u32 = 7;

/// Cap on events consumed per tick so rendering is never starved.
pub const MAX_EVENTS_PER_TICK: usize = 64;
