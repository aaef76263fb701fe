/*
 *	plugin/mod.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Screen plugin contract shared by every screen the engine can show
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

//! Screen plugins
//!
//! A plugin owns a private canvas the size of the panel and draws into it
//! when the engine asks. The engine owns every plugin; plugins never hold
//! a reference back to the engine. Instead each hook receives a
//! [`PluginContext`] with read access to the key map and clock, plus a
//! request queue for the things a screen may ask of the engine
//! (become active, keep the panel awake, receive key events, show the
//! volume toast). Requests are applied as soon as the hook returns.
//!
//! ## Lifecycle
//!
//! 1. Built once at load time by a factory from the [`registry`]
//! 2. `event_listener` every tick, active or not, awake or asleep
//! 3. `update` (clear + `render` by default) while active
//! 4. `on_active_changed` when the engine switches screens
//! 5. Dropped at process exit

pub mod loader;
pub mod registry;

pub use loader::{LoadSummary, PluginManager};
pub use registry::{PluginFactory, PluginRegistry};

use std::time::{Duration, Instant};

use anyhow::Result;
use log::info;

use crate::canvas::Canvas;
use crate::constants::DEFAULT_PLUGIN_FPS;
use crate::input::KeyEvent;
use crate::keymap::KeyMap;
use crate::mixer::VolumeDirection;
use crate::pacer::{frame_time, SharedClock};

/// What a factory gets to build a plugin with
#[derive(Clone)]
pub struct PluginSetup {
    pub width: u32,
    pub height: u32,
    pub clock: SharedClock,
}

/// State every plugin carries: identity, geometry, canvas and frame rate
#[derive(Debug)]
pub struct PluginBase {
    name: String,
    id: usize,
    width: u32,
    height: u32,
    canvas: Canvas,
    is_active: bool,
    fps: f32,
}

impl PluginBase {
    pub fn new(name: &str, setup: &PluginSetup) -> Self {
        info!("[{}] initialized.", name);
        Self {
            name: name.to_string(),
            id: 0,
            width: setup.width,
            height: setup.height,
            canvas: Canvas::new(setup.width, setup.height),
            is_active: false,
            fps: DEFAULT_PLUGIN_FPS,
        }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn id(&self) -> usize { self.id }
    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn is_active(&self) -> bool { self.is_active }

    /// Registration order, assigned by the engine
    pub(crate) fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    pub(crate) fn set_active_flag(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn canvas(&self) -> &Canvas { &self.canvas }
    pub fn canvas_mut(&mut self) -> &mut Canvas { &mut self.canvas }

    pub fn clear(&mut self) {
        self.canvas.blank();
    }

    pub fn framerate(&self) -> f32 { self.fps }

    pub fn set_framerate(&mut self, fps: f32) {
        self.fps = fps;
    }

    /// Seconds per frame at the current rate
    pub fn frame_time(&self) -> Duration {
        frame_time(self.fps)
    }
}

/// Something a plugin asks the engine to do on its behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginRequest {
    /// Activate or deactivate a screen
    SetActive { id: usize, active: bool },
    /// Restart the idle timer
    KeepAwake,
    /// Subscribe a screen to key events, or drop the subscription
    ListenKeys { id: usize, listen: bool },
    /// Show the volume toast at a level
    ShowVolume(u8),
}

/// Handed to every plugin hook
pub struct PluginContext<'a> {
    id: usize,
    keymap: &'a KeyMap,
    clock: &'a SharedClock,
    sleeping: bool,
    requests: Vec<PluginRequest>,
}

impl<'a> PluginContext<'a> {
    pub fn new(id: usize, keymap: &'a KeyMap, clock: &'a SharedClock, sleeping: bool) -> Self {
        Self { id, keymap, clock, sleeping, requests: Vec::new() }
    }

    /// Registration id of the plugin being called
    pub fn id(&self) -> usize { self.id }

    pub fn keymap(&self) -> &KeyMap { self.keymap }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn clock(&self) -> &SharedClock { self.clock }

    /// Panel state at the time of the call
    pub fn is_sleeping(&self) -> bool { self.sleeping }

    /// Ask to be shown (`true`) or to give the screen up (`false`)
    pub fn set_active(&mut self, active: bool) {
        self.requests.push(PluginRequest::SetActive { id: self.id, active });
    }

    pub fn reset_sleep_timer(&mut self) {
        self.requests.push(PluginRequest::KeepAwake);
    }

    /// Start or stop receiving `on_key` calls
    pub fn listen_keys(&mut self, listen: bool) {
        self.requests.push(PluginRequest::ListenKeys { id: self.id, listen });
    }

    pub fn show_volume(&mut self, percent: u8) {
        self.requests.push(PluginRequest::ShowVolume(percent));
    }

    pub fn requests(&self) -> &[PluginRequest] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<PluginRequest> {
        self.requests
    }
}

/// A screen the engine can multiplex onto the panel.
///
/// Only `base`, `base_mut` and `render` are required, every other hook has
/// a default that does nothing.
pub trait Plugin {
    fn base(&self) -> &PluginBase;
    fn base_mut(&mut self) -> &mut PluginBase;

    /// Draw the current state into the plugin's canvas. Only called while
    /// the plugin is active.
    fn render(&mut self, ctx: &mut PluginContext) -> Result<()>;

    /// Per frame entry point. Clears the canvas then renders; override to
    /// keep the previous frame's pixels.
    fn update(&mut self, ctx: &mut PluginContext) -> Result<()> {
        self.base_mut().clear();
        self.render(ctx)
    }

    /// Background bookkeeping, called every tick whether shown or not
    fn event_listener(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// None when the plugin has no notion of playback
    fn is_playing(&self) -> Option<bool> {
        None
    }

    /// While active, keep the engine's left/right navigation away
    fn wants_exclusive_input(&self) -> bool {
        false
    }

    /// Called after the engine changed this plugin's active state
    fn on_active_changed(&mut self, _active: bool, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Key delivery for subscribed plugins, see [`PluginContext::listen_keys`]
    fn on_key(&mut self, _event: &KeyEvent, _ctx: &mut PluginContext) -> Result<()> {
        Ok(())
    }

    /// Return true to take over the volume keys while active
    fn adjust_volume(&mut self, _direction: VolumeDirection, _ctx: &mut PluginContext) -> bool {
        false
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn id(&self) -> usize {
        self.base().id()
    }

    fn is_active(&self) -> bool {
        self.base().is_active()
    }

    fn image(&self) -> &Canvas {
        self.base().canvas()
    }

    fn frame_time(&self) -> Duration {
        self.base().frame_time()
    }
}
