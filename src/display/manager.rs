/*
 *  display/manager.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display manager - multiplexes screen plugins onto the panel
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
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};

use crate::animation::{Animated, Animation};
use crate::canvas::Canvas;
use crate::constants::{
    DEFAULT_CONTRAST, DEFAULT_SLEEP_SECS, GOODBYE_MESSAGE, MAX_EVENTS_PER_TICK, WELCOME_MESSAGE,
};
use crate::display::error::DisplayError;
use crate::display::overlays::OverlayManager;
use crate::display::splash;
use crate::display::traits::BoxedDriver;
use crate::input::{EventKind, InputSource, KeyEvent};
use crate::keymap::{KeyMap, LongPress};
use crate::mixer::{Mixer, VolumeDirection};
use crate::pacer::{Pacer, SharedClock};
use crate::plugin::{Plugin, PluginContext, PluginRequest, PluginSetup};

/// Screen slide length
pub const SLIDE_DURATION: Duration = Duration::from_millis(300);

/// Frame budget while a slide is running (~120fps)
pub const TRANSITION_FRAME_TIME: Duration = Duration::from_micros(8_333);

/// Frame budget after a failed frame
pub const ERROR_FRAME_TIME: Duration = Duration::from_millis(100);

/// Poll interval while the panel sleeps
pub const SLEEP_POLL_TIME: Duration = Duration::from_millis(500);

const SLIDE: &str = "main_screen";

/// One loaded plugin
pub struct PluginRegistration {
    pub plugin: Box<dyn Plugin>,
    /// Skip this screen when cycling unless it reports playing
    pub auto_hide: bool,
    pub id: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideDirection {
    /// New screen enters from the right
    Next,
    /// New screen enters from the left
    Previous,
}

/// Engine settings that come from configuration
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Idle time before the panel sleeps, zero never sleeps
    pub sleep_timeout: Duration,
    pub contrast: u8,
    pub welcome_message: String,
    /// Small print under the welcome message
    pub caption: Option<String>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            sleep_timeout: Duration::from_secs(DEFAULT_SLEEP_SECS),
            contrast: DEFAULT_CONTRAST,
            welcome_message: WELCOME_MESSAGE.to_string(),
            caption: None,
        }
    }
}

/// The render and input scheduling core.
///
/// Owns the panel driver, every registered plugin, the slide animation,
/// the overlays, the key map and the idle timer. Everything runs on the
/// thread that calls [`DisplayManager::run`]; input arrives through an
/// [`InputSource`] polled at the top of every frame.
///
/// # Frame
///
/// 1. idle check, possibly putting the panel to sleep
/// 2. `event_listener` on every plugin
/// 3. asleep: nothing else, poll again in [`SLEEP_POLL_TIME`]
/// 4. no active plugin: activate the first one
/// 5. `update` the active plugin (once per slide while sliding)
/// 6. composite the outgoing and incoming screens at the slide offset
/// 7. overlays on top, then the panel
///
/// The frame budget is the active plugin's frame time, [`TRANSITION_FRAME_TIME`]
/// while sliding, or [`ERROR_FRAME_TIME`] after a failure. Plugin errors and
/// panics are logged and the panel keeps its previous frame.
pub struct DisplayManager {
    driver: BoxedDriver,
    width: u32,
    height: u32,

    plugins: Vec<PluginRegistration>,
    last_active: Option<usize>,
    active_id: usize,

    anim: Animation,
    slide_offset: Animated,
    slide_direction: SlideDirection,
    last_screen_image: Option<Canvas>,
    transition_rendered: bool,

    sleep: bool,
    sleep_time: Duration,
    sleep_count: Instant,

    overlays: OverlayManager,
    keymap: KeyMap,
    mixer: Box<dyn Mixer>,
    key_listeners: Vec<usize>,
    /// Press event of every key still down, sampled each tick for long presses
    held_keys: HashMap<(EventKind, u16), KeyEvent>,

    /// Last composed frame, reused every tick
    main_screen: Canvas,

    clock: SharedClock,
    options: ManagerOptions,
    shutdown: Arc<AtomicBool>,
}

impl DisplayManager {
    /// Initialise the panel and show the welcome screen
    ///
    /// # Arguments
    ///
    /// * `driver` - panel driver, not yet initialised
    /// * `keymap` - logical key bindings
    /// * `mixer` - system volume for the volume and mute keys
    /// * `clock` - time source for animation, idle and pacing
    /// * `options` - idle timeout, contrast and welcome text
    pub fn new(
        mut driver: BoxedDriver,
        keymap: KeyMap,
        mixer: Box<dyn Mixer>,
        clock: SharedClock,
        options: ManagerOptions,
    ) -> Result<Self, DisplayError> {
        let (width, height) = driver.dimensions();
        info!("Display manager on a {}x{} panel", width, height);

        driver.init()?;
        if let Err(e) = driver.set_contrast(options.contrast) {
            warn!("contrast not applied: {}", e);
        }
        driver.show()?;

        let now = clock.now();
        let mut manager = Self {
            driver,
            width,
            height,
            plugins: Vec::new(),
            last_active: None,
            active_id: 0,
            anim: Animation::new(clock.clone(), SLIDE_DURATION),
            slide_offset: Animated::new(0.0),
            slide_direction: SlideDirection::Next,
            last_screen_image: None,
            transition_rendered: true,
            sleep: false,
            sleep_time: options.sleep_timeout,
            sleep_count: now,
            overlays: OverlayManager::new(width, height, clock.clone()),
            keymap,
            mixer,
            key_listeners: Vec::new(),
            held_keys: HashMap::new(),
            main_screen: Canvas::new(width, height),
            clock,
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        manager.welcome();
        Ok(manager)
    }

    /// Build a plugin with the panel geometry and register it
    ///
    /// Returns the registration id, which is also the cycling order.
    pub fn add_plugin<F>(&mut self, factory: F, auto_hide: bool) -> usize
    where
        F: FnOnce(&PluginSetup) -> Box<dyn Plugin>,
    {
        let id = self.plugins.len();
        let mut plugin = factory(&self.plugin_setup());
        plugin.base_mut().set_id(id);
        debug!("[{}] registered as {} (auto_hide: {})", plugin.name(), id, auto_hide);
        self.plugins.push(PluginRegistration { plugin, auto_hide, id });
        id
    }

    pub fn plugin_setup(&self) -> PluginSetup {
        PluginSetup { width: self.width, height: self.height, clock: self.clock.clone() }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn plugins(&self) -> &[PluginRegistration] {
        &self.plugins
    }

    pub fn plugin(&self, id: usize) -> Option<&dyn Plugin> {
        self.plugins.get(id).map(|r| r.plugin.as_ref())
    }

    /// Id of the plugin on screen, if any
    pub fn active(&self) -> Option<usize> {
        self.last_active
    }

    /// Id of the most recently activated plugin
    pub fn active_id(&self) -> usize {
        self.active_id
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn keymap_mut(&mut self) -> &mut KeyMap {
        &mut self.keymap
    }

    pub fn overlays(&self) -> &OverlayManager {
        &self.overlays
    }

    pub fn main_screen(&self) -> &Canvas {
        &self.main_screen
    }

    /// Plugins currently subscribed to key events
    pub fn key_listeners(&self) -> &[usize] {
        &self.key_listeners
    }

    pub fn is_transitioning(&mut self) -> bool {
        self.anim.is_running(SLIDE)
    }

    pub fn slide_direction(&self) -> SlideDirection {
        self.slide_direction
    }

    /// Flag that ends [`DisplayManager::run`] when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Use an externally owned flag, e.g. one wired to signal handlers
    pub fn set_shutdown_flag(&mut self, flag: Arc<AtomicBool>) {
        self.shutdown = flag;
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Activate or deactivate a plugin.
    ///
    /// At most one plugin is active: activating one first deactivates the
    /// current one. Activation wakes a sleeping panel. The plugin's
    /// `on_active_changed` hook runs only when its state actually changes.
    pub fn set_active(&mut self, id: usize, active: bool) {
        if id >= self.plugins.len() {
            warn!("set_active on unknown plugin id {}", id);
            return;
        }

        if active && self.last_active != Some(id) {
            if let Some(previous) = self.last_active {
                self.set_active(previous, false);
            }
            self.last_active = Some(id);
            self.active_id = id;
            info!("[{}] set active. register id: {}", self.plugins[id].plugin.name(), id);
            if self.sleep {
                self.turn_on_screen();
            }
        }

        if !active && self.last_active == Some(id) {
            self.last_active = None;
        }

        let plugin = &mut self.plugins[id].plugin;
        let changed = plugin.is_active() != active;
        plugin.base_mut().set_active_flag(active);
        if changed {
            if let Err(e) = self.call_plugin(id, |p, ctx| p.on_active_changed(active, ctx)) {
                error!("[{}] activation hook failed: {:?}", self.plugins[id].plugin.name(), e);
            }
        }
    }

    /// Slide to the next screen, skipping hidden auto-hide plugins
    pub fn active_next(&mut self) {
        self.switch(SlideDirection::Next);
    }

    /// Slide to the previous screen, skipping hidden auto-hide plugins
    pub fn active_prev(&mut self) {
        self.switch(SlideDirection::Previous);
    }

    // auto-hide screens only count while they report playing
    fn is_hidden(&self, id: usize) -> bool {
        let reg = &self.plugins[id];
        reg.auto_hide && reg.plugin.is_playing() != Some(true)
    }

    fn switch(&mut self, direction: SlideDirection) {
        let count = self.plugins.len();
        if count == 0 {
            return;
        }
        let step = |i: usize| match direction {
            SlideDirection::Next => (i + 1) % count,
            SlideDirection::Previous => (i + count - 1) % count,
        };

        let current = self.last_active.unwrap_or(self.active_id);
        let mut candidate = step(current);
        let mut examined = 1;
        while self.is_hidden(candidate) && examined < count {
            candidate = step(candidate);
            examined += 1;
        }
        if self.is_hidden(candidate) {
            debug!("no visible screen to switch to");
            return;
        }
        if self.last_active == Some(candidate) {
            return;
        }

        if let Some(previous) = self.last_active {
            self.last_screen_image = Some(self.plugins[previous].plugin.image().clone());
            self.slide_direction = direction;
            self.slide_offset.set(self.width as f32);
            self.anim.start(SLIDE, &self.slide_offset, 0.0, Some(SLIDE_DURATION), None);
            self.transition_rendered = false;
        }
        self.set_active(candidate, true);
    }

    /// Restart the idle timer
    pub fn reset_sleep_timer(&mut self) {
        self.sleep_count = self.clock.now();
    }

    /// Restart the idle timer and wake the panel if it sleeps
    pub fn keep_awake(&mut self) {
        self.reset_sleep_timer();
        if self.sleep {
            self.turn_on_screen();
        }
    }

    pub fn turn_on_screen(&mut self) {
        info!("Turn on screen");
        self.reset_sleep_timer();
        if let Err(e) = self.driver.show() {
            warn!("panel on failed: {}", e);
        }
        self.sleep = false;
    }

    pub fn turn_off_screen(&mut self) {
        if self.sleep {
            return;
        }
        info!("Turn off screen");
        if let Err(e) = self.driver.hide() {
            warn!("panel off failed: {}", e);
        }
        self.sleep = true;
    }

    fn sleep_check(&mut self) {
        if self.sleep || self.sleep_time.is_zero() {
            return;
        }
        let idle = self.clock.now().saturating_duration_since(self.sleep_count);
        if idle > self.sleep_time {
            debug!("idle for {:.0}s", idle.as_secs_f32());
            self.turn_off_screen();
        }
    }

    fn welcome(&mut self) {
        let image = splash::render(
            self.width,
            self.height,
            &self.options.welcome_message,
            self.options.caption.as_deref(),
        );
        if let Err(e) = self.driver.display(&image) {
            warn!("welcome screen failed: {}", e);
        }
    }

    /// Run one plugin hook with a fresh context, catching panics, then
    /// apply whatever the plugin asked for.
    fn call_plugin<R>(
        &mut self,
        id: usize,
        hook: impl FnOnce(&mut dyn Plugin, &mut PluginContext) -> Result<R>,
    ) -> Result<R> {
        let mut ctx = PluginContext::new(id, &self.keymap, &self.clock, self.sleep);
        let plugin = self.plugins[id].plugin.as_mut();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook(plugin, &mut ctx)));
        let requests = ctx.into_requests();
        self.apply_requests(requests);

        match outcome {
            Ok(result) => result,
            Err(payload) => Err(anyhow!(
                "[{}] panicked: {}",
                self.plugins[id].plugin.name(),
                panic_message(payload.as_ref())
            )),
        }
    }

    fn apply_requests(&mut self, requests: Vec<PluginRequest>) {
        for request in requests {
            match request {
                PluginRequest::SetActive { id, active } => self.set_active(id, active),
                PluginRequest::KeepAwake => self.keep_awake(),
                PluginRequest::ListenKeys { id, listen } => self.listen_keys(id, listen),
                PluginRequest::ShowVolume(percent) => self.overlays.show_volume(percent),
            }
        }
    }

    fn listen_keys(&mut self, id: usize, listen: bool) {
        if listen {
            if !self.key_listeners.contains(&id) {
                self.key_listeners.push(id);
            }
        } else {
            self.key_listeners.retain(|&l| l != id);
        }
    }

    /// One engine frame. Returns the frame budget to sleep out.
    pub fn tick(&mut self) -> Duration {
        self.sleep_check();
        if !self.sleep {
            self.sample_held_keys();
        }

        let mut listener_failed = false;
        for id in 0..self.plugins.len() {
            if let Err(e) = self.call_plugin(id, |p, ctx| p.event_listener(ctx)) {
                error!("[{}] event listener failed: {:?}", self.plugins[id].plugin.name(), e);
                listener_failed = true;
            }
        }

        if self.sleep || self.plugins.is_empty() {
            return SLEEP_POLL_TIME;
        }

        if self.last_active.is_none() {
            self.set_active(0, true);
        }

        match self.render_frame() {
            Ok(budget) if listener_failed => budget.max(ERROR_FRAME_TIME),
            Ok(budget) => budget,
            Err(e) => {
                error!("frame failed: {:?}", e);
                ERROR_FRAME_TIME
            }
        }
    }

    fn render_frame(&mut self) -> Result<Duration> {
        let Some(id) = self.last_active else {
            return Ok(SLEEP_POLL_TIME);
        };

        self.anim.update();
        let sliding = self.anim.is_running(SLIDE) && self.last_screen_image.is_some();
        if !sliding || !self.transition_rendered {
            self.call_plugin(id, |p, ctx| p.update(ctx))?;
            self.transition_rendered = true;
        }

        let image = self.plugins[id].plugin.image();
        if sliding {
            if let Some(previous) = self.last_screen_image.as_ref() {
                let w = self.width as i32;
                let offset = self.slide_offset.get().round() as i32;
                let (new_x, old_x) = match self.slide_direction {
                    SlideDirection::Next => (offset, offset - w),
                    SlideDirection::Previous => (-offset, w - offset),
                };
                self.main_screen.blank();
                self.main_screen.paste(previous, old_x, 0);
                self.main_screen.paste(image, new_x, 0);
            }
        } else {
            self.main_screen.copy_from(image);
            self.last_screen_image = None;
        }

        self.overlays.update();
        let frame = self.overlays.render(&self.main_screen);
        self.driver.display(&frame)?;

        Ok(if sliding { TRANSITION_FRAME_TIME } else { self.plugins[id].plugin.frame_time() })
    }

    /// Drain pending input, at most [`MAX_EVENTS_PER_TICK`] events
    pub fn poll_input(&mut self, input: &mut dyn InputSource) {
        for _ in 0..MAX_EVENTS_PER_TICK {
            match input.try_next() {
                Some(event) => self.handle_key(&event),
                None => break,
            }
        }
    }

    /// Dispatch one key event: engine handling first, then every plugin
    /// that was subscribed when the event arrived and still is.
    pub fn handle_key(&mut self, event: &KeyEvent) {
        debug!("key {} value {}", event.name(), event.value);
        let listeners = self.key_listeners.clone();
        let consumed = self.key_callback(event);
        self.track_held(event, consumed);

        if !consumed {
            for id in listeners {
                if !self.key_listeners.contains(&id) {
                    continue;
                }
                if let Err(e) = self.call_plugin(id, |p, ctx| p.on_key(event, ctx)) {
                    error!("[{}] key handler failed: {:?}", self.plugins[id].plugin.name(), e);
                }
            }
        }

        self.keymap.release(event);
    }

    /// Engine key handling. Returns true when the event must not reach
    /// plugins (it only woke the panel).
    fn key_callback(&mut self, event: &KeyEvent) -> bool {
        if self.sleep {
            if event.is_press() {
                self.turn_on_screen();
            }
            return true;
        }
        if event.is_press() {
            self.reset_sleep_timer();
        }

        let exclusive = self
            .last_active
            .is_some_and(|id| self.plugins[id].plugin.wants_exclusive_input());

        let km = &self.keymap;
        // always evaluated, it also starts the hold timer for the sleep long press
        let menu = km.down(event, "action", "menu");
        let next = !exclusive
            && (menu || km.down(event, "action", "next_screen") || km.down(event, "navigation", "right"));
        let previous = !exclusive
            && (km.down(event, "action", "previous_screen") || km.down(event, "navigation", "left"));
        let volume_up = km.down(event, "media", "volume_up");
        let volume_down = km.down(event, "media", "volume_down");
        let mute = km.down(event, "media", "mute");

        if next {
            self.active_next();
        } else if previous {
            self.active_prev();
        }
        if volume_up {
            self.adjust_volume(VolumeDirection::Up);
        }
        if volume_down {
            self.adjust_volume(VolumeDirection::Down);
        }
        if mute {
            self.toggle_mute();
        }
        if !event.is_press() {
            self.hold_callback(event);
        }
        false
    }

    /// Long press handling for a key that is still down: menu sleeps the
    /// panel, volume keys repeat.
    fn hold_callback(&mut self, event: &KeyEvent) {
        let km = &self.keymap;
        let go_to_sleep = km.longpress(event, "action", "menu", LongPress::once());
        let repeat = km.repeat_timing();
        let volume_up = km.longpress(event, "media", "volume_up", repeat);
        let volume_down = km.longpress(event, "media", "volume_down", repeat);

        if volume_up {
            self.adjust_volume(VolumeDirection::Up);
        }
        if volume_down {
            self.adjust_volume(VolumeDirection::Down);
        }
        if go_to_sleep {
            self.turn_off_screen();
        }
    }

    fn track_held(&mut self, event: &KeyEvent, consumed: bool) {
        let key = (event.kind, event.code);
        if event.is_release() {
            self.held_keys.remove(&key);
        } else if event.is_press() && !consumed {
            self.held_keys.insert(key, *event);
        }
    }

    /// Buttons without autorepeat and hats report nothing while held, so
    /// holds are checked every tick as well as on repeat events.
    fn sample_held_keys(&mut self) {
        let held: Vec<KeyEvent> = self.held_keys.values().copied().collect();
        for event in held {
            if self.sleep {
                break;
            }
            self.hold_callback(&event);
        }
    }

    /// Volume step. The active plugin may take it over, otherwise the
    /// mixer is unmuted, stepped and the toast shown.
    pub fn adjust_volume(&mut self, direction: VolumeDirection) {
        if let Some(id) = self.last_active {
            match self.call_plugin(id, |p, ctx| Ok(p.adjust_volume(direction, ctx))) {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => error!("[{}] volume handler failed: {:?}", self.plugins[id].plugin.name(), e),
            }
        }

        if self.mixer.is_muted() == Some(true) {
            self.mixer.set_muted(false);
        }
        match self.mixer.adjust(direction) {
            Some(percent) => {
                debug!("volume {:?} -> {}%", direction, percent);
                self.overlays.show_volume(percent);
            }
            None => warn!("volume {:?} failed", direction),
        }
    }

    pub fn toggle_mute(&mut self) {
        match self.mixer.toggle_mute() {
            Some(true) => {
                info!("muted");
                self.overlays.show_volume(0);
            }
            Some(false) => {
                info!("unmuted");
                let percent = self.mixer.volume().unwrap_or(0);
                self.overlays.show_volume(percent);
            }
            None => warn!("mute toggle failed"),
        }
    }

    /// Render loop. Returns once the shutdown flag is set, after clearing
    /// the panel and showing the goodbye screen. A panic inside the loop
    /// is logged and the panel is cleared and switched off instead.
    pub fn run(&mut self, input: &mut dyn InputSource) {
        info!("display loop started with {} plugins", self.plugins.len());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_loop(input)));
        match outcome {
            Ok(()) => {
                info!("shutting down, cleaning up...");
                self.cleanup(true);
            }
            Err(payload) => {
                error!("display loop panicked: {}", panic_message(payload.as_ref()));
                self.cleanup(false);
            }
        }
    }

    fn run_loop(&mut self, input: &mut dyn InputSource) {
        let mut pacer = Pacer::new(self.clock.clone());
        while !self.shutdown.load(Ordering::SeqCst) {
            pacer.start_frame();
            self.poll_input(input);
            let budget = self.tick();
            pacer.finish_frame(budget);
        }
        if pacer.overruns() > 0 {
            debug!("{} frames overran their budget", pacer.overruns());
        }
    }

    /// Run a fixed number of paced frames, returning each frame's budget
    pub fn run_ticks(&mut self, input: &mut dyn InputSource, ticks: usize) -> Vec<Duration> {
        let mut pacer = Pacer::new(self.clock.clone());
        let mut budgets = Vec::with_capacity(ticks);
        for _ in 0..ticks {
            pacer.start_frame();
            self.poll_input(input);
            let budget = self.tick();
            pacer.finish_frame(budget);
            budgets.push(budget);
        }
        budgets
    }

    /// Best effort, every step is attempted even if an earlier one failed
    pub fn cleanup(&mut self, goodbye: bool) {
        if let Err(e) = self.driver.clear() {
            warn!("clear on shutdown failed: {}", e);
        }
        if goodbye {
            let image = splash::render(self.width, self.height, GOODBYE_MESSAGE, None);
            if let Err(e) = self.driver.display(&image) {
                warn!("goodbye screen failed: {}", e);
            }
        } else if let Err(e) = self.driver.hide() {
            warn!("panel off on shutdown failed: {}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::MockDriver;
    use crate::input::{ScriptedInput, KEY_PRESS};
    use crate::keycodes::key_code;
    use crate::keymap::KeyMapConfig;
    use crate::mixer::SoftMixer;
    use crate::pacer::{Clock, ManualClock};
    use crate::plugin::PluginBase;
    use embedded_graphics::pixelcolor::BinaryColor;

    /// Fills its canvas so frames are easy to tell apart
    struct Solid {
        base: PluginBase,
        lit: bool,
    }

    impl Plugin for Solid {
        fn base(&self) -> &PluginBase { &self.base }
        fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

        fn render(&mut self, _ctx: &mut PluginContext) -> Result<()> {
            if self.lit {
                self.base.canvas_mut().fill(BinaryColor::On);
            }
            Ok(())
        }
    }

    fn solid(name: &'static str, lit: bool) -> impl FnOnce(&PluginSetup) -> Box<dyn Plugin> {
        move |setup| Box::new(Solid { base: PluginBase::new(name, setup), lit })
    }

    fn manager(clock: &Arc<ManualClock>) -> (DisplayManager, MockDriver) {
        let driver = MockDriver::new_with_size(16, 8);
        let handle = driver.clone();
        let keymap = KeyMap::with_config(KeyMapConfig::default(), clock.clone());
        let options = ManagerOptions { sleep_timeout: Duration::from_secs(60), ..Default::default() };
        let mgr = DisplayManager::new(
            Box::new(driver),
            keymap,
            Box::new(SoftMixer::default()),
            clock.clone(),
            options,
        )
        .unwrap();
        (mgr, handle)
    }

    #[test]
    fn test_new_initialises_panel() {
        let clock = ManualClock::shared();
        let (_mgr, driver) = manager(&clock);
        let state = driver.state();
        let s = state.lock().unwrap();
        assert_eq!(s.init_count, 1);
        assert_eq!(s.last_contrast, Some(DEFAULT_CONTRAST));
        assert_eq!(s.display_count, 1, "welcome screen");
    }

    #[test]
    fn test_first_plugin_becomes_active() {
        let clock = ManualClock::shared();
        let (mut mgr, _) = manager(&clock);
        mgr.add_plugin(solid("a", false), false);
        mgr.add_plugin(solid("b", true), false);
        assert_eq!(mgr.active(), None);

        mgr.tick();
        assert_eq!(mgr.active(), Some(0));
        assert!(mgr.plugin(0).unwrap().is_active());
    }

    #[test]
    fn test_set_active_keeps_one_active() {
        let clock = ManualClock::shared();
        let (mut mgr, _) = manager(&clock);
        for name in ["a", "b", "c"] {
            mgr.add_plugin(solid(name, false), false);
        }
        mgr.set_active(1, true);
        mgr.set_active(2, true);
        mgr.set_active(0, true);
        let active: Vec<usize> = mgr.plugins().iter().filter(|r| r.plugin.is_active()).map(|r| r.id).collect();
        assert_eq!(active, vec![0]);
        assert_eq!(mgr.active(), Some(0));

        mgr.set_active(0, false);
        assert_eq!(mgr.active(), None);
        assert!(mgr.plugins().iter().all(|r| !r.plugin.is_active()));
    }

    #[test]
    fn test_slide_uses_transition_budget() {
        let clock = ManualClock::shared();
        let (mut mgr, _) = manager(&clock);
        mgr.add_plugin(solid("dark", false), false);
        mgr.add_plugin(solid("lit", true), false);
        mgr.tick();

        mgr.active_next();
        assert_eq!(mgr.active(), Some(1));
        let mut input = ScriptedInput::new();
        let budgets = mgr.run_ticks(&mut input, 60);
        assert_eq!(budgets[0], TRANSITION_FRAME_TIME);
        assert_eq!(*budgets.last().unwrap(), mgr.plugin(1).unwrap().frame_time());
        assert_eq!(mgr.main_screen().count_on(), 16 * 8);
    }

    #[test]
    fn test_wake_press_is_consumed() {
        let clock = ManualClock::shared();
        let (mut mgr, _) = manager(&clock);
        mgr.add_plugin(solid("a", false), false);
        mgr.add_plugin(solid("b", false), false);
        mgr.tick();
        mgr.turn_off_screen();

        let right = key_code("KEY_RIGHT").unwrap();
        mgr.handle_key(&KeyEvent::button(right, KEY_PRESS, clock.now()));
        assert!(!mgr.is_sleeping());
        assert_eq!(mgr.active(), Some(0));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
