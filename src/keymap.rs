/*
 *  keymap.rs
 *
 *  Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Named actions bound to keys, buttons and hat axes
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

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::{EventKind, KeyEvent};
use crate::keycodes;
use crate::pacer::SharedClock;

#[derive(Debug, Error)]
pub enum KeyMapError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid keymap in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Keymap was not loaded from a file, nowhere to save it")]
    NoPath,
}

/// One binding: a key name such as `KEY_ENTER`, or a hat/stick direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Key(String),
    Axis { axis: String, value: i32 },
}

/// An action accepts a single binding or a list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bindings {
    Many(Vec<Binding>),
    One(Binding),
}

impl Bindings {
    pub fn iter(&self) -> std::slice::Iter<'_, Binding> {
        match self {
            Bindings::Many(list) => list.iter(),
            Bindings::One(one) => std::slice::from_ref(one).iter(),
        }
    }
}

/// A category of actions. Anything else (comment strings, notes) is kept
/// verbatim and ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section {
    Actions(BTreeMap<String, Bindings>),
    Note(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    /// Seconds a key must be held before a long press fires
    pub longpress_threshold: f32,
    /// Seconds before a held volume key starts repeating
    pub repeat_delay: f32,
    /// Seconds between repeats once repeating
    pub repeat_interval: f32,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            longpress_threshold: 3.0,
            repeat_delay: 0.4,
            repeat_interval: 0.06,
            extra: BTreeMap::new(),
        }
    }
}

/// On-disk keymap document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMapConfig {
    #[serde(default)]
    pub settings: KeySettings,
    #[serde(default)]
    pub keymap: BTreeMap<String, Section>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn key(name: &str) -> Binding {
    Binding::Key(name.to_string())
}

fn hat(axis: &str, value: i32) -> Binding {
    Binding::Axis { axis: axis.to_string(), value }
}

fn section(actions: Vec<(&str, Vec<Binding>)>) -> Section {
    Section::Actions(
        actions
            .into_iter()
            .map(|(name, list)| (name.to_string(), Bindings::Many(list)))
            .collect(),
    )
}

impl Default for KeyMapConfig {
    fn default() -> Self {
        let mut keymap = BTreeMap::new();
        keymap.insert(
            "navigation".to_string(),
            section(vec![
                ("up", vec![key("KEY_UP"), hat("ABS_HAT0Y", -1)]),
                ("down", vec![key("KEY_DOWN"), hat("ABS_HAT0Y", 1)]),
                ("left", vec![key("KEY_LEFT"), hat("ABS_HAT0X", -1)]),
                ("right", vec![key("KEY_RIGHT"), hat("ABS_HAT0X", 1)]),
            ]),
        );
        keymap.insert(
            "action".to_string(),
            section(vec![
                ("select", vec![key("KEY_ENTER"), key("KEY_KP1")]),
                ("cancel", vec![key("KEY_ESC"), key("KEY_KP2")]),
                ("menu", vec![key("KEY_FORWARD"), key("KEY_M")]),
            ]),
        );
        keymap.insert(
            "media".to_string(),
            section(vec![
                ("play_pause", vec![key("KEY_PLAYPAUSE"), key("KEY_KP1")]),
                ("next", vec![key("KEY_NEXTSONG"), key("KEY_KP2")]),
                ("previous", vec![key("KEY_PREVIOUSSONG")]),
                ("stop", vec![key("KEY_STOP")]),
                ("volume_up", vec![key("KEY_VOLUMEUP")]),
                ("volume_down", vec![key("KEY_VOLUMEDOWN")]),
                ("mute", vec![key("KEY_MUTE")]),
            ]),
        );
        Self { settings: KeySettings::default(), keymap, extra: BTreeMap::new() }
    }
}

/// Long press options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LongPress {
    /// Hold time before firing, None uses the configured threshold
    pub threshold: Option<Duration>,
    /// Fire again every interval while held, None fires once per hold
    pub repeat: Option<Duration>,
}

impl LongPress {
    pub fn once() -> Self {
        Self::default()
    }

    pub fn after(threshold: Duration) -> Self {
        Self { threshold: Some(threshold), repeat: None }
    }

    pub fn repeating(mut self, interval: Duration) -> Self {
        self.repeat = Some(interval);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum PhysicalKey {
    Button(u16),
    Axis(u16),
}

impl PhysicalKey {
    fn of(event: &KeyEvent) -> Option<Self> {
        match event.kind {
            EventKind::Button => Some(PhysicalKey::Button(event.code)),
            EventKind::Axis => Some(PhysicalKey::Axis(event.code)),
            EventKind::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PressState {
    pressed_at: Instant,
    fired: bool,
    last_repeat: Option<Instant>,
}

impl PressState {
    fn new(pressed_at: Instant) -> Self {
        Self { pressed_at, fired: false, last_repeat: None }
    }
}

type AxisIndex = HashMap<(u16, i32), Vec<(String, String)>>;

/// Resolves `(category, action)` pairs against incoming key events and
/// tracks per-key press state for long presses.
///
/// Query methods take `&self`; caches and press timers live behind
/// `RefCell` so plugins can share one keymap through their context.
pub struct KeyMap {
    path: Option<PathBuf>,
    config: KeyMapConfig,
    clock: SharedClock,
    codes: RefCell<HashMap<String, Option<u16>>>,
    axis_index: RefCell<Option<AxisIndex>>,
    presses: RefCell<HashMap<PhysicalKey, PressState>>,
}

macro_rules! binding_accessors {
    ($($fn_name:ident => $category:literal / $action:literal;)*) => {
        $(
            pub fn $fn_name(&self) -> Vec<u16> {
                self.resolve($category, $action)
            }
        )*
    };
}

impl KeyMap {
    /// Load from a JSON file. A missing or invalid file is logged and the
    /// built-in defaults are used.
    pub fn load(path: impl Into<PathBuf>, clock: SharedClock) -> Self {
        let path = path.into();
        let config = match Self::read(&path) {
            Ok(config) => {
                info!("keymap config loaded: {}", path.display());
                config
            }
            Err(e) => {
                error!("{}, using built-in keymap", e);
                KeyMapConfig::default()
            }
        };
        Self::build(Some(path), config, clock)
    }

    /// Keymap that is not backed by a file
    pub fn with_config(config: KeyMapConfig, clock: SharedClock) -> Self {
        Self::build(None, config, clock)
    }

    fn build(path: Option<PathBuf>, config: KeyMapConfig, clock: SharedClock) -> Self {
        Self {
            path,
            config,
            clock,
            codes: RefCell::new(HashMap::new()),
            axis_index: RefCell::new(None),
            presses: RefCell::new(HashMap::new()),
        }
    }

    fn read(path: &Path) -> Result<KeyMapConfig, KeyMapError> {
        let text = fs::read_to_string(path)
            .map_err(|source| KeyMapError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text).map_err(|source| KeyMapError::Parse { path: path.to_path_buf(), source })
    }

    /// Re-read the backing file. On failure the current bindings stay.
    pub fn reload(&mut self) {
        let Some(path) = self.path.clone() else {
            warn!("reload requested for a keymap without a file");
            return;
        };
        info!("reload keymap config...");
        match Self::read(&path) {
            Ok(config) => {
                self.config = config;
                self.codes.borrow_mut().clear();
                *self.axis_index.borrow_mut() = None;
                self.presses.borrow_mut().clear();
            }
            Err(e) => error!("{}, keeping current keymap", e),
        }
    }

    /// Write the current bindings back to the backing file
    pub fn save(&self) -> Result<(), KeyMapError> {
        let path = self.path.as_deref().ok_or(KeyMapError::NoPath)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| KeyMapError::Io { path: dir.to_path_buf(), source })?;
        }
        let text = serde_json::to_string_pretty(&self.config)
            .map_err(|source| KeyMapError::Parse { path: path.to_path_buf(), source })?;
        fs::write(path, text).map_err(|source| KeyMapError::Io { path: path.to_path_buf(), source })?;
        info!("keymap config saved: {}", path.display());
        Ok(())
    }

    pub fn config(&self) -> &KeyMapConfig {
        &self.config
    }

    pub fn settings(&self) -> &KeySettings {
        &self.config.settings
    }

    pub fn longpress_threshold(&self) -> Duration {
        Duration::from_secs_f32(self.config.settings.longpress_threshold.max(0.0))
    }

    /// Delay and interval for held volume keys
    pub fn repeat_timing(&self) -> LongPress {
        let s = &self.config.settings;
        LongPress::after(Duration::from_secs_f32(s.repeat_delay.max(0.0)))
            .repeating(Duration::from_secs_f32(s.repeat_interval.max(0.0)))
    }

    fn bindings(&self, category: &str, action: &str) -> Option<&Bindings> {
        match self.config.keymap.get(category)? {
            Section::Actions(actions) => actions.get(action),
            Section::Note(_) => None,
        }
    }

    /// Key codes bound to an action. Unknown names and names starting
    /// with `_` are skipped.
    pub fn resolve(&self, category: &str, action: &str) -> Vec<u16> {
        let Some(bindings) = self.bindings(category, action) else {
            return Vec::new();
        };
        bindings
            .iter()
            .filter_map(|b| match b {
                Binding::Key(name) if !name.starts_with('_') => self.code_for(name),
                _ => None,
            })
            .collect()
    }

    fn code_for(&self, name: &str) -> Option<u16> {
        if let Some(code) = self.codes.borrow().get(name) {
            return *code;
        }
        let code = keycodes::key_code(name);
        if code.is_none() {
            warn!("unknown key name in keymap: {}", name);
        }
        self.codes.borrow_mut().insert(name.to_string(), code);
        code
    }

    fn build_axis_index(&self) -> AxisIndex {
        let mut index: AxisIndex = HashMap::new();
        for (category, section) in &self.config.keymap {
            let Section::Actions(actions) = section else { continue };
            for (action, bindings) in actions {
                for binding in bindings.iter() {
                    let Binding::Axis { axis, value } = binding else { continue };
                    if axis.starts_with('_') {
                        continue;
                    }
                    let Some(code) = keycodes::axis_code(axis) else {
                        warn!("unknown axis name in keymap: {}", axis);
                        continue;
                    };
                    // the rest position is registered too so releases match
                    for v in [*value, 0] {
                        let entry = index.entry((code, v)).or_default();
                        let pair = (category.clone(), action.clone());
                        if !entry.contains(&pair) {
                            entry.push(pair);
                        }
                    }
                }
            }
        }
        debug!("axis index built with {} entries", index.len());
        index
    }

    fn axis_matches(&self, code: u16, value: i32, category: &str, action: &str) -> bool {
        let mut slot = self.axis_index.borrow_mut();
        let index = slot.get_or_insert_with(|| self.build_axis_index());
        index
            .get(&(code, value))
            .is_some_and(|pairs| pairs.iter().any(|(c, a)| c == category && a == action))
    }

    /// True when the event's key or axis position is bound to the action
    pub fn matches(&self, event: &KeyEvent, category: &str, action: &str) -> bool {
        match event.kind {
            EventKind::Button => self.resolve(category, action).contains(&event.code),
            EventKind::Axis => self.axis_matches(event.code, event.value, category, action),
            EventKind::Other => false,
        }
    }

    /// Match a button event against any of several pre-resolved code lists
    pub fn matches_any(&self, event: &KeyEvent, lists: &[&[u16]]) -> bool {
        event.kind == EventKind::Button && lists.iter().any(|codes| codes.contains(&event.code))
    }

    /// Initial press of a bound key. Starts the hold timer for long presses.
    pub fn down(&self, event: &KeyEvent, category: &str, action: &str) -> bool {
        if !event.is_press() || !self.matches(event, category, action) {
            return false;
        }
        if let Some(key) = PhysicalKey::of(event) {
            let mut presses = self.presses.borrow_mut();
            let restart = presses.get(&key).is_none_or(|s| s.pressed_at != event.time);
            if restart {
                // the press itself counts as the first step of a repeat
                let state = PressState { last_repeat: Some(event.time), ..PressState::new(event.time) };
                presses.insert(key, state);
            }
        }
        true
    }

    /// Release of a bound key. Clears its hold timer.
    pub fn up(&self, event: &KeyEvent, category: &str, action: &str) -> bool {
        if !event.is_release() || !self.matches(event, category, action) {
            return false;
        }
        self.release(event);
        true
    }

    /// Clear the hold timer for whatever key this release belongs to
    pub fn release(&self, event: &KeyEvent) -> bool {
        if !event.is_release() {
            return false;
        }
        PhysicalKey::of(event).is_some_and(|key| self.presses.borrow_mut().remove(&key).is_some())
    }

    /// True once a bound key has been held past the threshold.
    ///
    /// Without repeat this fires at most once per hold. With repeat it
    /// fires again every interval for as long as the key stays down.
    pub fn longpress(&self, event: &KeyEvent, category: &str, action: &str, opts: LongPress) -> bool {
        if !event.is_held() || !self.matches(event, category, action) {
            return false;
        }
        let Some(key) = PhysicalKey::of(event) else {
            return false;
        };
        let now = self.clock.now();
        let threshold = opts.threshold.unwrap_or_else(|| self.longpress_threshold());

        let mut presses = self.presses.borrow_mut();
        let state = presses.entry(key).or_insert_with(|| PressState::new(event.time));
        if now.saturating_duration_since(state.pressed_at) < threshold {
            return false;
        }
        match opts.repeat {
            None => {
                if state.fired {
                    false
                } else {
                    state.fired = true;
                    true
                }
            }
            Some(interval) => {
                let due = state
                    .last_repeat
                    .is_none_or(|t| now.saturating_duration_since(t) >= interval);
                if due {
                    state.last_repeat = Some(now);
                }
                due
            }
        }
    }

    binding_accessors! {
        nav_up => "navigation" / "up";
        nav_down => "navigation" / "down";
        nav_left => "navigation" / "left";
        nav_right => "navigation" / "right";
        select => "action" / "select";
        cancel => "action" / "cancel";
        menu => "action" / "menu";
        play_pause => "media" / "play_pause";
        next_track => "media" / "next";
        previous_track => "media" / "previous";
        stop => "media" / "stop";
        volume_up => "media" / "volume_up";
        volume_down => "media" / "volume_down";
        mute => "media" / "mute";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KEY_PRESS, KEY_RELEASE, KEY_REPEAT};
    use crate::pacer::{Clock, ManualClock};
    use std::sync::Arc;

    const KEY_ENTER: u16 = 28;
    const KEY_M: u16 = 50;
    const KEY_FORWARD: u16 = 159;
    const ABS_HAT0X: u16 = 0x10;

    fn setup() -> (Arc<ManualClock>, KeyMap) {
        let clock = ManualClock::shared();
        let km = KeyMap::with_config(KeyMapConfig::default(), clock.clone());
        (clock, km)
    }

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("muspi-keymap-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir.join("keymap.json")
    }

    #[test]
    fn test_default_bindings() {
        let (_clock, km) = setup();
        assert_eq!(km.select(), vec![KEY_ENTER, 79]);
        assert_eq!(km.menu(), vec![KEY_FORWARD, KEY_M]);
        assert!(km.resolve("action", "next_screen").is_empty());
        assert!(km.resolve("nope", "nope").is_empty());
        assert_eq!(km.longpress_threshold(), Duration::from_secs(3));
    }

    #[test]
    fn test_skips_comments_and_unknown_names() {
        let clock = ManualClock::shared();
        let config: KeyMapConfig = serde_json::from_str(
            r#"{
                "_about": "remote control layout",
                "keymap": {
                    "_note": "comments are ignored",
                    "action": { "select": ["_KEY_ENTER", "KEY_BOGUS", "KEY_OK"], "menu": "KEY_M" }
                }
            }"#,
        )
        .unwrap();
        let km = KeyMap::with_config(config, clock);
        assert_eq!(km.select(), vec![352]);
        assert_eq!(km.menu(), vec![KEY_M]);
        assert_eq!(km.settings().longpress_threshold, 3.0);
    }

    #[test]
    fn test_missing_and_invalid_files_fall_back_to_defaults() {
        let clock = ManualClock::shared();
        let path = temp_file("invalid");
        let km = KeyMap::load(&path, clock.clone());
        assert_eq!(km.config(), &KeyMapConfig::default());

        fs::write(&path, "{ not json").unwrap();
        let km = KeyMap::load(&path, clock);
        assert_eq!(km.menu(), vec![KEY_FORWARD, KEY_M]);
    }

    #[test]
    fn test_save_then_reload_picks_up_edits() {
        let clock = ManualClock::shared();
        let path = temp_file("save");
        let km = KeyMap::load(&path, clock.clone());
        km.save().unwrap();

        let text = fs::read_to_string(&path).unwrap().replace("KEY_FORWARD", "KEY_TAB");
        fs::write(&path, text).unwrap();

        let mut km = KeyMap::load(&path, clock);
        assert_eq!(km.menu(), vec![15, KEY_M]);
        fs::write(&path, "broken").unwrap();
        km.reload();
        assert_eq!(km.menu(), vec![15, KEY_M]);
    }

    #[test]
    fn test_axis_matches_direction_and_release() {
        let (clock, km) = setup();
        let now = clock.now();
        let left = KeyEvent::axis(ABS_HAT0X, -1, now);
        let right = KeyEvent::axis(ABS_HAT0X, 1, now);
        let rest = KeyEvent::axis(ABS_HAT0X, 0, now);

        assert!(km.matches(&left, "navigation", "left"));
        assert!(!km.matches(&left, "navigation", "right"));
        assert!(km.down(&right, "navigation", "right"));
        assert!(km.up(&rest, "navigation", "right"));
        assert!(km.up(&rest, "navigation", "left"));
        assert!(!km.down(&rest, "navigation", "left"));
    }

    #[test]
    fn test_down_and_up_only_fire_on_matching_edges() {
        let (clock, km) = setup();
        let now = clock.now();
        assert!(km.down(&KeyEvent::button(KEY_ENTER, KEY_PRESS, now), "action", "select"));
        assert!(!km.down(&KeyEvent::button(KEY_ENTER, KEY_REPEAT, now), "action", "select"));
        assert!(!km.down(&KeyEvent::button(KEY_M, KEY_PRESS, now), "action", "select"));
        assert!(km.up(&KeyEvent::button(KEY_ENTER, KEY_RELEASE, now), "action", "select"));
        assert!(!km.up(&KeyEvent::button(KEY_ENTER, KEY_PRESS, now), "action", "select"));
    }

    #[test]
    fn test_longpress_fires_once_per_hold() {
        let (clock, km) = setup();
        let press = KeyEvent::button(KEY_M, KEY_PRESS, clock.now());
        assert!(km.down(&press, "action", "menu"));

        let mut fired = 0;
        for _ in 0..60 {
            clock.advance(Duration::from_millis(100));
            let held = KeyEvent::button(KEY_M, KEY_REPEAT, clock.now());
            if km.longpress(&held, "action", "menu", LongPress::once()) {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);

        // a new hold after release may fire again
        assert!(km.release(&KeyEvent::button(KEY_M, KEY_RELEASE, clock.now())));
        assert!(km.down(&KeyEvent::button(KEY_M, KEY_PRESS, clock.now()), "action", "menu"));
        clock.advance(Duration::from_secs(4));
        let held = KeyEvent::button(KEY_M, KEY_REPEAT, clock.now());
        assert!(km.longpress(&held, "action", "menu", LongPress::once()));
    }

    #[test]
    fn test_longpress_repeat_spacing() {
        let (clock, km) = setup();
        let threshold = Duration::from_millis(400);
        let interval = Duration::from_millis(100);
        let vol_up = 115;
        assert!(km.down(&KeyEvent::button(vol_up, KEY_PRESS, clock.now()), "media", "volume_up"));

        let mut fired_at = Vec::new();
        for step in 1..=70 {
            clock.advance(Duration::from_millis(10));
            let held = KeyEvent::button(vol_up, KEY_REPEAT, clock.now());
            if km.longpress(&held, "media", "volume_up", LongPress::after(threshold).repeating(interval)) {
                fired_at.push(step * 10);
            }
        }
        assert!((3..=4).contains(&fired_at.len()), "fired at {:?}", fired_at);
        assert!(fired_at[0] >= 400);
        for pair in fired_at.windows(2) {
            assert!(pair[1] - pair[0] >= 100);
        }
    }

    #[test]
    fn test_zero_delay_repeat_waits_one_interval() {
        let (clock, km) = setup();
        let vol_up = 115;
        let opts = LongPress::after(Duration::ZERO).repeating(Duration::from_millis(60));
        let press = KeyEvent::button(vol_up, KEY_PRESS, clock.now());
        assert!(km.down(&press, "media", "volume_up"));
        assert!(!km.longpress(&press, "media", "volume_up", opts));

        clock.advance(Duration::from_millis(60));
        let held = KeyEvent::button(vol_up, KEY_REPEAT, clock.now());
        assert!(km.longpress(&held, "media", "volume_up", opts));
    }

    #[test]
    fn test_matches_any_legacy_lists() {
        let (clock, km) = setup();
        let ev = KeyEvent::button(KEY_M, KEY_PRESS, clock.now());
        let menu = km.menu();
        let select = km.select();
        assert!(km.matches_any(&ev, &[&select, &menu]));
        assert!(!km.matches_any(&ev, &[&select]));
    }
}
