/*
 *  tests/engine_integration.rs
 *
 *  Engine behaviour driven through the public API
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 */

use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use embedded_graphics::pixelcolor::BinaryColor;

use muspi::display::manager::{ERROR_FRAME_TIME, SLEEP_POLL_TIME, TRANSITION_FRAME_TIME};
use muspi::constants::GOODBYE_MESSAGE;
use muspi::display::{splash, DisplayManager, ManagerOptions, MockDriver, MockDriverState};
use muspi::input::{InputSource, KeyEvent, ScriptedInput, KEY_PRESS, KEY_RELEASE, KEY_REPEAT};
use muspi::keycodes::key_code;
use muspi::keymap::{Binding, Bindings, KeyMap, KeyMapConfig, Section};
use muspi::mixer::SoftMixer;
use muspi::pacer::{Clock, ManualClock};
use muspi::plugin::{Plugin, PluginBase, PluginContext, PluginSetup};
use muspi::plugins::airplay::{AirplayPlugin, Metadata, PlayState};

const W: u32 = 32;
const H: u32 = 16;

#[derive(Default, Clone, Copy)]
struct Behaviour {
    lit: bool,
    exclusive: bool,
    listens: bool,
    fails: bool,
    panics: bool,
}

#[derive(Default, Clone)]
struct Counters {
    updates: Rc<Cell<usize>>,
    keys: Rc<Cell<usize>>,
    playing: Rc<Cell<Option<bool>>>,
}

struct TestScreen {
    base: PluginBase,
    behaviour: Behaviour,
    counters: Counters,
}

impl Plugin for TestScreen {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn render(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        self.counters.updates.set(self.counters.updates.get() + 1);
        if self.behaviour.panics {
            panic!("screen exploded");
        }
        if self.behaviour.fails {
            bail!("screen failed");
        }
        if self.behaviour.lit {
            self.base.canvas_mut().fill(BinaryColor::On);
        }
        Ok(())
    }

    fn is_playing(&self) -> Option<bool> {
        self.counters.playing.get()
    }

    fn wants_exclusive_input(&self) -> bool {
        self.behaviour.exclusive
    }

    fn on_active_changed(&mut self, active: bool, ctx: &mut PluginContext) -> Result<()> {
        if self.behaviour.listens {
            ctx.listen_keys(active);
        }
        Ok(())
    }

    fn on_key(&mut self, _event: &KeyEvent, _ctx: &mut PluginContext) -> Result<()> {
        self.counters.keys.set(self.counters.keys.get() + 1);
        Ok(())
    }
}

fn screen(name: &'static str, behaviour: Behaviour) -> (impl FnOnce(&PluginSetup) -> Box<dyn Plugin>, Counters) {
    let counters = Counters::default();
    let handed = counters.clone();
    let factory = move |setup: &PluginSetup| -> Box<dyn Plugin> {
        Box::new(TestScreen { base: PluginBase::new(name, setup), behaviour, counters: handed })
    };
    (factory, counters)
}

struct Rig {
    mgr: DisplayManager,
    panel: Arc<Mutex<MockDriverState>>,
    clock: Arc<ManualClock>,
    input: ScriptedInput,
}

impl Rig {
    fn new(sleep_timeout: Duration) -> Self {
        Self::with_keys(sleep_timeout, KeyMapConfig::default())
    }

    fn with_keys(sleep_timeout: Duration, keys: KeyMapConfig) -> Self {
        let clock = ManualClock::shared();
        let driver = MockDriver::new_with_size(W, H);
        let panel = driver.state();
        let keymap = KeyMap::with_config(keys, clock.clone());
        let options = ManagerOptions { sleep_timeout, ..Default::default() };
        let mgr = DisplayManager::new(
            Box::new(driver),
            keymap,
            Box::new(SoftMixer::new(50, 2)),
            clock.clone(),
            options,
        )
        .unwrap();
        Self { mgr, panel, clock, input: ScriptedInput::new() }
    }

    fn add(&mut self, name: &'static str, behaviour: Behaviour, auto_hide: bool) -> Counters {
        let (factory, counters) = screen(name, behaviour);
        self.mgr.add_plugin(factory, auto_hide);
        counters
    }

    fn event(&self, key: &str, value: i32) -> KeyEvent {
        KeyEvent::button(key_code(key).unwrap(), value, self.clock.now())
    }

    fn press(&mut self, key: &str) {
        let event = self.event(key, KEY_PRESS);
        self.mgr.handle_key(&event);
    }

    fn release(&mut self, key: &str) {
        let event = self.event(key, KEY_RELEASE);
        self.mgr.handle_key(&event);
    }

    fn ticks(&mut self, n: usize) -> Vec<Duration> {
        self.mgr.run_ticks(&mut self.input, n)
    }

    /// Bare engine frames spaced `step` apart, no input
    fn hold_for(&mut self, step: Duration, n: usize) {
        for _ in 0..n {
            self.clock.advance(step);
            self.mgr.tick();
        }
    }

    fn panel(&self) -> std::sync::MutexGuard<'_, MockDriverState> {
        self.panel.lock().unwrap()
    }

    fn active_flags(&self) -> Vec<usize> {
        self.mgr.plugins().iter().filter(|r| r.plugin.is_active()).map(|r| r.id).collect()
    }
}

#[test]
fn at_most_one_plugin_is_active() {
    let mut rig = Rig::new(Duration::from_secs(60));
    for name in ["a", "b", "c", "d"] {
        rig.add(name, Behaviour::default(), false);
    }
    rig.ticks(1);
    assert_eq!(rig.active_flags(), vec![0]);

    for id in [2, 1, 3, 3, 0] {
        rig.mgr.set_active(id, true);
        assert_eq!(rig.active_flags(), vec![id]);
        assert_eq!(rig.mgr.active(), Some(id));
    }
    for _ in 0..5 {
        rig.mgr.active_next();
        assert_eq!(rig.active_flags().len(), 1);
    }
}

#[test]
fn navigation_skips_hidden_auto_hide_screens() {
    let mut rig = Rig::new(Duration::from_secs(60));
    rig.add("a", Behaviour::default(), false);
    let b = rig.add("b", Behaviour::default(), true);
    rig.add("c", Behaviour::default(), false);
    rig.ticks(1);
    assert_eq!(rig.mgr.active(), Some(0));

    rig.mgr.active_next();
    assert_eq!(rig.mgr.active(), Some(2), "b is not playing");
    rig.mgr.active_next();
    assert_eq!(rig.mgr.active(), Some(0));
    rig.mgr.active_prev();
    assert_eq!(rig.mgr.active(), Some(2));

    b.playing.set(Some(true));
    rig.mgr.active_prev();
    assert_eq!(rig.mgr.active(), Some(1));
}

#[test]
fn switching_with_everything_else_hidden_is_a_no_op() {
    let mut rig = Rig::new(Duration::from_secs(60));
    rig.add("a", Behaviour::default(), false);
    rig.add("b", Behaviour::default(), true);
    rig.ticks(1);
    rig.mgr.active_next();
    assert_eq!(rig.mgr.active(), Some(0));
    assert!(!rig.mgr.is_transitioning());
}

#[test]
fn slide_renders_incoming_screen_once_then_every_frame() {
    let mut rig = Rig::new(Duration::from_secs(60));
    rig.add("dark", Behaviour::default(), false);
    let lit = rig.add("lit", Behaviour { lit: true, ..Default::default() }, false);
    rig.ticks(1);

    rig.mgr.active_next();
    let budgets = rig.ticks(10);
    assert!(budgets.iter().all(|&b| b == TRANSITION_FRAME_TIME));
    assert_eq!(lit.updates.get(), 1);
    {
        let panel = rig.panel();
        let frame = panel.last_frame().unwrap();
        let on = frame.count_on();
        assert!(on > 0 && on < (W * H) as usize, "part way across: {on}");
    }

    rig.ticks(60);
    assert!(lit.updates.get() > 10);
    assert!(!rig.mgr.is_transitioning());
    assert_eq!(rig.panel().last_frame().unwrap().count_on(), (W * H) as usize);
}

#[test]
fn idle_panel_sleeps_and_a_key_only_wakes_it() {
    let mut rig = Rig::new(Duration::from_secs(10));
    let a = rig.add("a", Behaviour { listens: true, ..Default::default() }, false);
    rig.add("b", Behaviour::default(), false);
    rig.ticks(1);

    rig.clock.advance(Duration::from_secs(11));
    let budgets = rig.ticks(3);
    assert!(rig.mgr.is_sleeping());
    assert!(budgets.iter().all(|&b| b == SLEEP_POLL_TIME));
    let (hides, frames) = {
        let panel = rig.panel();
        (panel.hide_count, panel.display_count)
    };
    assert_eq!(hides, 1);
    let updates = a.updates.get();
    rig.ticks(5);
    assert_eq!(rig.panel().display_count, frames, "nothing drawn while asleep");
    assert_eq!(a.updates.get(), updates);

    let shows = rig.panel().show_count;
    rig.press("KEY_RIGHT");
    assert!(!rig.mgr.is_sleeping());
    assert_eq!(rig.panel().show_count, shows + 1);
    assert_eq!(rig.mgr.active(), Some(0), "wake press does not navigate");
    assert_eq!(a.keys.get(), 0, "wake press is not delivered");
}

#[test]
fn zero_timeout_never_sleeps() {
    let mut rig = Rig::new(Duration::ZERO);
    rig.add("a", Behaviour::default(), false);
    rig.ticks(1);
    rig.clock.advance(Duration::from_secs(3600));
    rig.ticks(2);
    assert!(!rig.mgr.is_sleeping());
}

#[test]
fn holding_menu_turns_the_panel_off() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.add("b", Behaviour::default(), false);
    rig.ticks(1);

    rig.press("KEY_M");
    assert_eq!(rig.mgr.active(), Some(1));
    rig.clock.advance(Duration::from_secs(1));
    let held = rig.event("KEY_M", KEY_REPEAT);
    rig.mgr.handle_key(&held);
    assert!(!rig.mgr.is_sleeping());

    rig.clock.advance(Duration::from_millis(2100));
    let held = rig.event("KEY_M", KEY_REPEAT);
    rig.mgr.handle_key(&held);
    assert!(rig.mgr.is_sleeping());
}

#[test]
fn failing_plugin_keeps_the_previous_frame() {
    let mut rig = Rig::new(Duration::from_secs(600));
    let bad = rig.add("bad", Behaviour { fails: true, ..Default::default() }, false);
    let frames = rig.panel().display_count;

    let budgets = rig.ticks(100);
    assert!(budgets.iter().all(|&b| b == ERROR_FRAME_TIME));
    assert_eq!(bad.updates.get(), 100);
    assert_eq!(rig.panel().display_count, frames);
}

#[test]
fn panicking_plugin_does_not_stop_the_engine() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("boom", Behaviour { panics: true, ..Default::default() }, false);
    let fine = rig.add("fine", Behaviour { lit: true, ..Default::default() }, false);

    let budgets = rig.ticks(5);
    assert!(budgets.iter().all(|&b| b == ERROR_FRAME_TIME));

    rig.mgr.set_active(1, true);
    rig.ticks(1);
    assert!(fine.updates.get() >= 1);
    assert_eq!(rig.panel().last_frame().unwrap().count_on(), (W * H) as usize);
}

#[test]
fn volume_keys_reuse_one_overlay() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.ticks(1);

    rig.press("KEY_VOLUMEUP");
    rig.release("KEY_VOLUMEUP");
    assert_eq!(rig.mgr.overlays().len(), 1);
    assert_eq!(rig.mgr.overlays().volume(), Some(52));

    rig.clock.advance(Duration::from_secs(1));
    rig.press("KEY_VOLUMEDOWN");
    rig.release("KEY_VOLUMEDOWN");
    assert_eq!(rig.mgr.overlays().len(), 1);
    assert_eq!(rig.mgr.overlays().volume(), Some(50));

    // lifetime restarted by the second key, so still up 2.5s later
    rig.clock.advance(Duration::from_millis(2500));
    rig.mgr.tick();
    assert_eq!(rig.mgr.overlays().len(), 1);

    // then slides away
    rig.clock.advance(Duration::from_secs(2));
    rig.ticks(5);
    assert!(rig.mgr.overlays().is_empty());
}

#[test]
fn mute_shows_zero_and_volume_keys_unmute() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.ticks(1);

    rig.press("KEY_MUTE");
    assert_eq!(rig.mgr.overlays().volume(), Some(0));
    rig.press("KEY_MUTE");
    assert_eq!(rig.mgr.overlays().volume(), Some(50));

    rig.press("KEY_MUTE");
    rig.press("KEY_VOLUMEUP");
    assert_eq!(rig.mgr.overlays().volume(), Some(52));
}

#[test]
fn held_volume_key_repeats() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.ticks(1);

    rig.press("KEY_VOLUMEUP");
    rig.clock.advance(Duration::from_millis(100));
    let held = rig.event("KEY_VOLUMEUP", KEY_REPEAT);
    rig.mgr.handle_key(&held);
    assert_eq!(rig.mgr.overlays().volume(), Some(52), "not yet repeating");

    rig.clock.advance(Duration::from_millis(400));
    for _ in 0..3 {
        let held = rig.event("KEY_VOLUMEUP", KEY_REPEAT);
        rig.mgr.handle_key(&held);
        rig.clock.advance(Duration::from_millis(100));
    }
    assert_eq!(rig.mgr.overlays().volume(), Some(58));
}

#[test]
fn held_menu_without_autorepeat_still_sleeps() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.add("b", Behaviour::default(), false);
    rig.ticks(1);

    // gamepad buttons report the press and nothing else until release
    rig.press("KEY_M");
    rig.hold_for(Duration::from_millis(100), 29);
    assert!(!rig.mgr.is_sleeping());
    rig.hold_for(Duration::from_millis(100), 51);
    assert!(rig.mgr.is_sleeping());
    assert_eq!(rig.panel().hide_count, 1);

    rig.release("KEY_M");
    assert!(rig.mgr.is_sleeping());
}

#[test]
fn held_volume_without_autorepeat_repeats_until_release() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.ticks(1);

    rig.press("KEY_VOLUMEUP");
    rig.hold_for(Duration::from_millis(100), 3);
    assert_eq!(rig.mgr.overlays().volume(), Some(52), "not yet repeating");

    rig.hold_for(Duration::from_millis(100), 7);
    let held = rig.mgr.overlays().volume().unwrap();
    assert!(held >= 60, "volume {held}");

    rig.release("KEY_VOLUMEUP");
    rig.hold_for(Duration::from_millis(100), 10);
    assert_eq!(rig.mgr.overlays().volume(), Some(held));
}

#[test]
fn zero_repeat_delay_steps_once_per_press() {
    let mut keys = KeyMapConfig::default();
    keys.settings.repeat_delay = 0.0;
    let mut rig = Rig::with_keys(Duration::from_secs(600), keys);
    rig.add("a", Behaviour::default(), false);
    rig.ticks(1);

    rig.press("KEY_VOLUMEUP");
    rig.mgr.tick();
    rig.release("KEY_VOLUMEUP");
    assert_eq!(rig.mgr.overlays().volume(), Some(52));
}

#[test]
fn exclusive_screen_keeps_every_switching_key() {
    let mut keys = KeyMapConfig::default();
    if let Some(Section::Actions(actions)) = keys.keymap.get_mut("action") {
        actions.insert("next_screen".to_string(), Bindings::One(Binding::Key("KEY_TAB".to_string())));
    }
    let mut rig = Rig::with_keys(Duration::from_secs(600), keys);
    rig.add("game", Behaviour { exclusive: true, ..Default::default() }, false);
    rig.add("b", Behaviour::default(), false);
    rig.ticks(1);

    for key in ["KEY_RIGHT", "KEY_LEFT", "KEY_M", "KEY_TAB"] {
        rig.press(key);
        rig.release(key);
        assert_eq!(rig.mgr.active(), Some(0), "{key} left the game");
    }

    // volume and the menu long press stay with the engine
    rig.press("KEY_VOLUMEUP");
    rig.release("KEY_VOLUMEUP");
    assert_eq!(rig.mgr.overlays().volume(), Some(52));
    rig.press("KEY_M");
    rig.hold_for(Duration::from_millis(100), 31);
    assert!(rig.mgr.is_sleeping());
    rig.release("KEY_M");

    rig.press("KEY_ENTER");
    rig.mgr.set_active(1, true);
    rig.press("KEY_TAB");
    assert_eq!(rig.mgr.active(), Some(0), "others still switch");
}

#[test]
fn keys_reach_subscribed_screens_only() {
    let mut rig = Rig::new(Duration::from_secs(600));
    let a = rig.add("a", Behaviour { listens: true, ..Default::default() }, false);
    let b = rig.add("b", Behaviour::default(), false);
    rig.ticks(1);
    assert_eq!(rig.mgr.key_listeners(), &[0]);

    rig.press("KEY_ENTER");
    assert_eq!(a.keys.get(), 1);

    rig.mgr.active_next();
    assert!(rig.mgr.key_listeners().is_empty());
    rig.press("KEY_ENTER");
    assert_eq!(a.keys.get(), 1);
    assert_eq!(b.keys.get(), 0);
}

#[test]
fn airplay_session_takes_the_screen() {
    let mut rig = Rig::new(Duration::from_secs(10));
    rig.add("a", Behaviour::default(), false);
    let (tx, rx) = mpsc::channel();
    rig.mgr.add_plugin(move |setup| Box::new(AirplayPlugin::with_source(setup, rx)), true);
    rig.ticks(1);
    assert_eq!(rig.mgr.active(), Some(0));

    rig.mgr.active_next();
    assert_eq!(rig.mgr.active(), Some(0), "hidden while nothing plays");

    tx.send(Metadata::Session(true)).unwrap();
    tx.send(Metadata::PlayState(PlayState::Play)).unwrap();
    rig.ticks(1);
    assert_eq!(rig.mgr.active(), Some(1));
    assert_eq!(rig.mgr.plugin(1).unwrap().is_playing(), Some(true));

    // playback holds the panel awake past the idle timeout
    let hides = rig.panel().hide_count;
    for _ in 0..30 {
        rig.clock.advance(Duration::from_secs(1));
        rig.ticks(1);
        assert!(!rig.mgr.is_sleeping());
    }
    assert_eq!(rig.panel().hide_count, hides);

    tx.send(Metadata::Session(false)).unwrap();
    rig.ticks(1);
    assert_ne!(rig.mgr.active(), Some(1));
}

struct PanickingInput;

impl InputSource for PanickingInput {
    fn try_next(&mut self) -> Option<KeyEvent> {
        panic!("input device vanished");
    }
}

#[test]
fn clean_shutdown_clears_and_says_goodbye() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour { lit: true, ..Default::default() }, false);
    rig.ticks(1);
    let (clears, hides) = {
        let panel = rig.panel();
        (panel.clear_count, panel.hide_count)
    };

    rig.mgr.request_shutdown();
    rig.mgr.run(&mut rig.input);

    let panel = rig.panel();
    assert_eq!(panel.clear_count, clears + 1);
    assert_eq!(panel.hide_count, hides);
    let goodbye = splash::render(W, H, GOODBYE_MESSAGE, None);
    assert_eq!(panel.last_frame(), Some(&goodbye));
}

#[test]
fn goodbye_is_still_shown_when_clear_fails() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.ticks(1);
    rig.panel().simulate_clear_failure = true;
    let (clears, frames) = {
        let panel = rig.panel();
        (panel.clear_count, panel.display_count)
    };

    rig.mgr.request_shutdown();
    rig.mgr.run(&mut rig.input);

    let panel = rig.panel();
    assert_eq!(panel.clear_count, clears + 1);
    assert_eq!(panel.display_count, frames + 1);
}

#[test]
fn panic_in_the_loop_clears_and_powers_off() {
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.ticks(1);
    {
        let mut panel = rig.panel();
        panel.simulate_clear_failure = true;
        panel.simulate_display_failure = true;
    }
    let (clears, hides) = {
        let panel = rig.panel();
        (panel.clear_count, panel.hide_count)
    };

    rig.mgr.run(&mut PanickingInput);

    let panel = rig.panel();
    assert_eq!(panel.clear_count, clears + 1);
    assert_eq!(panel.hide_count, hides + 1);
    assert!(!panel.is_on);
}

#[test]
fn shutdown_flag_raised_before_the_engine_exists_stops_the_loop() {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut rig = Rig::new(Duration::from_secs(600));
    rig.add("a", Behaviour::default(), false);
    rig.mgr.set_shutdown_flag(shutdown.clone());

    shutdown.store(true, Ordering::SeqCst);
    rig.mgr.run(&mut rig.input);
    assert_eq!(rig.panel().clear_count, 1);
}
