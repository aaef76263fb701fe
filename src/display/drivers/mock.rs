/*
 *  display/drivers/mock.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock display driver for headless runs and tests
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

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::canvas::Canvas;
use crate::config::DisplayConfig;
use crate::constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
use crate::display::error::DisplayError;
use crate::display::traits::{DisplayCapabilities, DisplayDriver};

/// Frames kept by default; older ones are dropped
pub const DEFAULT_HISTORY: usize = 64;

/// Mock display driver
///
/// Simulates a panel without hardware. Every operation is recorded in a
/// shared [`MockDriverState`] so tests can keep a handle after the driver
/// has been boxed and handed to the engine.
#[derive(Debug, Clone)]
pub struct MockDriver {
    /// Display capabilities
    capabilities: DisplayCapabilities,

    /// Shared state for testing
    state: Arc<Mutex<MockDriverState>>,
}

/// Internal state for the mock driver (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockDriverState {
    /// Number of times init() was called
    pub init_count: usize,

    /// Number of frames accepted by display()
    pub display_count: usize,

    pub show_count: usize,
    pub hide_count: usize,

    /// Number of times clear() was called, failed calls included
    pub clear_count: usize,

    /// Last contrast value set
    pub last_contrast: Option<u8>,

    /// Last rotation set
    pub last_rotation: Option<u16>,

    /// Panel power as the engine last left it
    pub is_on: bool,

    /// Most recent frames, oldest first
    pub frames: VecDeque<Canvas>,

    /// Cap on `frames`
    pub history: usize,

    /// Simulate failures (for error testing)
    pub simulate_display_failure: bool,
    pub simulate_init_failure: bool,
    pub simulate_clear_failure: bool,
}

impl MockDriverState {
    pub fn last_frame(&self) -> Option<&Canvas> {
        self.frames.back()
    }
}

impl MockDriver {
    /// Create a new mock driver
    ///
    /// # Arguments
    ///
    /// * `config` - Display configuration, only the geometry is used
    pub fn new(config: &DisplayConfig) -> Self {
        Self::new_with_size(
            config.width.unwrap_or(DISPLAY_WIDTH),
            config.height.unwrap_or(DISPLAY_HEIGHT),
        )
    }

    /// Create a mock driver with specific dimensions
    pub fn new_with_size(width: u32, height: u32) -> Self {
        let capabilities = DisplayCapabilities {
            width,
            height,
            supports_rotation: true,
            max_fps: 120,
            supports_contrast: true,
        };
        let state = MockDriverState { history: DEFAULT_HISTORY, ..Default::default() };
        Self { capabilities, state: Arc::new(Mutex::new(state)) }
    }

    /// Get reference to state for inspection in tests
    pub fn state(&self) -> Arc<Mutex<MockDriverState>> {
        Arc::clone(&self.state)
    }

    fn lock(&self) -> MutexGuard<'_, MockDriverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write the last frame as a plain PBM image (for visual debugging)
    pub fn save_to_pbm(&self, path: &Path) -> std::io::Result<()> {
        use std::fmt::Write as _;

        let state = self.lock();
        let Some(frame) = state.last_frame() else {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no frame displayed yet"));
        };
        let mut out = format!("P1\n{} {}\n", frame.width(), frame.height());
        for y in 0..frame.height() as i32 {
            let row: Vec<&str> = (0..frame.width() as i32)
                .map(|x| match frame.pixel(x, y) {
                    Some(c) if c.is_on() => "1",
                    _ => "0",
                })
                .collect();
            let _ = writeln!(out, "{}", row.join(" "));
        }
        std::fs::write(path, out)
    }
}

impl DisplayDriver for MockDriver {
    fn capabilities(&self) -> &DisplayCapabilities {
        &self.capabilities
    }

    fn init(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock();
        if state.simulate_init_failure {
            return Err(DisplayError::InitializationFailed("Simulated init failure".to_string()));
        }
        state.init_count += 1;
        state.is_on = true;
        Ok(())
    }

    fn display(&mut self, frame: &Canvas) -> Result<(), DisplayError> {
        let expected = (self.capabilities.width, self.capabilities.height);
        let actual = (frame.width(), frame.height());
        if expected != actual {
            return Err(DisplayError::FrameSizeMismatch { expected, actual });
        }

        let mut state = self.lock();
        if state.simulate_display_failure {
            return Err(DisplayError::Other("Simulated display failure".to_string()));
        }
        state.display_count += 1;
        state.frames.push_back(frame.clone());
        while state.frames.len() > state.history.max(1) {
            state.frames.pop_front();
        }
        Ok(())
    }

    fn show(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock();
        state.show_count += 1;
        state.is_on = true;
        Ok(())
    }

    fn hide(&mut self) -> Result<(), DisplayError> {
        let mut state = self.lock();
        state.hide_count += 1;
        state.is_on = false;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        let blank = Canvas::new(self.capabilities.width, self.capabilities.height);
        let mut state = self.lock();
        state.clear_count += 1;
        if state.simulate_clear_failure {
            return Err(DisplayError::Other("Simulated clear failure".to_string()));
        }
        state.frames.push_back(blank);
        while state.frames.len() > state.history.max(1) {
            state.frames.pop_front();
        }
        Ok(())
    }

    fn set_contrast(&mut self, level: u8) -> Result<(), DisplayError> {
        self.lock().last_contrast = Some(level);
        Ok(())
    }

    fn set_rotation(&mut self, degrees: u16) -> Result<(), DisplayError> {
        if degrees % 90 != 0 || degrees >= 360 {
            return Err(DisplayError::InvalidRotation(degrees));
        }
        self.lock().last_rotation = Some(degrees);
        Ok(())
    }
}
