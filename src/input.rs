/*
 *  input.rs
 *
 *  Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Key and axis events from evdev devices
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

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use evdev::{Device, EventType};
use log::{debug, error, info, warn};

use crate::keycodes;
use crate::pacer::SharedClock;

/// How often the device scanner looks for hot-plugged devices
pub const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

/// Button values as the kernel reports them
pub const KEY_RELEASE: i32 = 0;
pub const KEY_PRESS: i32 = 1;
pub const KEY_REPEAT: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// EV_KEY: keys and buttons
    Button,
    /// EV_ABS: hats and sticks
    Axis,
    Other,
}

/// One input event, stamped with the time it was read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: EventKind,
    pub code: u16,
    /// 0 release, 1 press, 2 autorepeat for buttons; signed position for axes
    pub value: i32,
    pub time: Instant,
}

impl KeyEvent {
    pub fn button(code: u16, value: i32, time: Instant) -> Self {
        Self { kind: EventKind::Button, code, value, time }
    }

    pub fn axis(code: u16, value: i32, time: Instant) -> Self {
        Self { kind: EventKind::Axis, code, value, time }
    }

    /// Initial press of a button, or an axis leaving its rest position
    pub fn is_press(&self) -> bool {
        match self.kind {
            EventKind::Button => self.value == KEY_PRESS,
            EventKind::Axis => self.value != 0,
            EventKind::Other => false,
        }
    }

    /// Held: press or autorepeat for buttons, any deflection for axes
    pub fn is_held(&self) -> bool {
        match self.kind {
            EventKind::Button => self.value == KEY_PRESS || self.value == KEY_REPEAT,
            EventKind::Axis => self.value != 0,
            EventKind::Other => false,
        }
    }

    pub fn is_release(&self) -> bool {
        matches!(self.kind, EventKind::Button | EventKind::Axis) && self.value == KEY_RELEASE
    }

    /// Symbolic name for logging
    pub fn name(&self) -> String {
        let known = match self.kind {
            EventKind::Button => keycodes::key_name(self.code),
            EventKind::Axis => keycodes::axis_name(self.code),
            EventKind::Other => None,
        };
        match known {
            Some(n) => n.to_string(),
            None => format!("{:?}({})", self.kind, self.code),
        }
    }
}

/// Anything the engine can pull key events from
pub trait InputSource {
    /// Next pending event without blocking
    fn try_next(&mut self) -> Option<KeyEvent>;
}

/// Reads every evdev device under /dev/input on background threads.
///
/// A scanner thread enumerates devices every [`RESCAN_INTERVAL`] and starts
/// a reader per newly seen device, so remotes and keypads can be plugged in
/// at any time. Events reach the engine through a channel.
pub struct KeyListener {
    rx: Receiver<KeyEvent>,
    running: Arc<AtomicBool>,
    scanner: Option<thread::JoinHandle<()>>,
}

impl KeyListener {
    pub fn start(clock: SharedClock) -> Self {
        let (tx, rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let scanner = thread::Builder::new()
            .name("input-scan".into())
            .spawn(move || scan_devices(tx, flag, clock))
            .map_err(|e| error!("Failed to start input scanner: {}", e))
            .ok();
        Self { rx, running, scanner }
    }

    /// Stop scanning. Readers exit when their device next reports.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.scanner.take() {
            if handle.join().is_err() {
                warn!("Input scanner panicked");
            }
        }
    }
}

impl InputSource for KeyListener {
    fn try_next(&mut self) -> Option<KeyEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn scan_devices(tx: Sender<KeyEvent>, running: Arc<AtomicBool>, clock: SharedClock) {
    let known: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));
    info!("Scanning for input devices...");

    while running.load(Ordering::SeqCst) {
        for (path, device) in evdev::enumerate() {
            let fresh = known
                .lock()
                .map(|mut set| set.insert(path.clone()))
                .unwrap_or(false);
            if !fresh {
                continue;
            }
            info!("Listening on {} ({})", path.display(), device.name().unwrap_or("unnamed"));

            let tx = tx.clone();
            let known = known.clone();
            let running = running.clone();
            let clock = clock.clone();
            let spawned = thread::Builder::new()
                .name("input-read".into())
                .spawn(move || {
                    read_device(device, &tx, &running, &clock);
                    if let Ok(mut set) = known.lock() {
                        set.remove(&path);
                    }
                    info!("Stopped listening on {}", path.display());
                });
            if let Err(e) = spawned {
                error!("Failed to start reader thread: {}", e);
            }
        }
        clock.sleep(RESCAN_INTERVAL);
    }
    debug!("Input scanner stopped");
}

fn read_device(mut device: Device, tx: &Sender<KeyEvent>, running: &AtomicBool, clock: &SharedClock) {
    let name = device.name().unwrap_or("unnamed").to_string();
    while running.load(Ordering::SeqCst) {
        let events = match device.fetch_events() {
            Ok(events) => events,
            Err(e) => {
                warn!("Input device {} went away: {}", name, e);
                return;
            }
        };
        for event in events {
            let kind = if event.event_type() == EventType::KEY {
                EventKind::Button
            } else if event.event_type() == EventType::ABSOLUTE {
                EventKind::Axis
            } else {
                continue;
            };
            let ev = KeyEvent { kind, code: event.code(), value: event.value(), time: clock.now() };
            debug!("input {} = {}", ev.name(), ev.value);
            if tx.send(ev).is_err() {
                return;
            }
        }
    }
}

/// Queue of prepared events, for headless runs and tests
#[derive(Debug, Default)]
pub struct ScriptedInput {
    queue: VecDeque<KeyEvent>,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: KeyEvent) {
        self.queue.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl InputSource for ScriptedInput {
    fn try_next(&mut self) -> Option<KeyEvent> {
        self.queue.pop_front()
    }
}
