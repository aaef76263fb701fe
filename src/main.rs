/*
 *	main.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Startup, signal handling and shutdown
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use env_logger::Env;
use log::{error, info};
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use muspi::config;
use muspi::display::{DisplayDriverFactory, DisplayManager, ManagerOptions};
use muspi::input::KeyListener;
use muspi::keymap::KeyMap;
use muspi::mixer;
use muspi::pacer::{SharedClock, SystemClock};
use muspi::plugin::{PluginManager, PluginRegistry};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Raise `shutdown` on SIGINT, SIGTERM or SIGHUP
fn signal_handler(shutdown: Arc<AtomicBool>) -> Result<(), Box<dyn std::error::Error>> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;
    thread::Builder::new().name("signals".into()).spawn(move || {
        for signal in signals.forever() {
            let name = match signal {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                _ => "SIGHUP",
            };
            info!("{} received. Initiating graceful shutdown.", name);
            shutdown.store(true, Ordering::SeqCst);
        }
    })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::load()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    info!("{} - now playing", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    // installed before the panel powers up
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_handler(shutdown.clone())?;

    let clock: SharedClock = Arc::new(SystemClock);
    let display_config = cfg.display_config();
    let driver = DisplayDriverFactory::create_from_config(&display_config)?;
    let keymap = KeyMap::load(cfg.keymap_path(), clock.clone());
    let mixer = mixer::open(cfg.mixer_backend(), &cfg.mixer_card(), cfg.mixer_step_db());

    let options = ManagerOptions {
        sleep_timeout: cfg.sleep_timeout(),
        contrast: display_config.contrast.unwrap_or(muspi::constants::DEFAULT_CONTRAST),
        welcome_message: cfg.welcome_message(),
        caption: Some(format!("v{}", env!("CARGO_PKG_VERSION"))),
    };
    let mut manager = DisplayManager::new(driver, keymap, mixer, clock.clone(), options)?;
    manager.set_shutdown_flag(shutdown);

    let mut plugins = PluginManager::new(cfg.plugins_template(), cfg.user_dir(), PluginRegistry::builtin());
    let summary = plugins.load(&mut manager);
    if summary.loaded == 0 {
        error!("no plugins loaded, the panel will only show the welcome screen");
    }

    let mut listener = KeyListener::start(clock);
    manager.run(&mut listener);
    listener.stop();

    info!("Bye");
    Ok(())
}
