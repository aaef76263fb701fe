/*
 *  config.rs
 *
 *  Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	YAML configuration layered with command line overrides
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

use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::constants;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. Every field is optional so files, defaults
/// and the command line can be layered.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// e.g. "info" | "debug"
    pub log_level: Option<String>,
    pub display: Option<DisplayConfig>,
    pub screen: Option<ScreenConfig>,
    pub paths: Option<PathsConfig>,
    pub mixer: Option<MixerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DisplayConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub rotate_deg: Option<u16>,
    /// 0-255, applied once at startup
    pub contrast: Option<u8>,
    pub driver: Option<DriverKind>,
    pub bus: Option<BusConfig>,
}

/// Screen behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ScreenConfig {
    /// Idle seconds before the panel is switched off
    pub sleep_timeout_secs: Option<u64>,
    /// Text on the welcome and goodbye screens
    pub welcome_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PathsConfig {
    pub keymap: Option<PathBuf>,
    /// Shipped plugin template
    pub plugins: Option<PathBuf>,
    /// Where the user's copy of the plugin list lives
    pub user_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MixerConfig {
    pub backend: Option<MixerBackend>,
    /// ALSA card, "default" uses amixer's default
    pub card: Option<String>,
    pub step_db: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusConfig {
    I2c {
        bus: String,        // e.g. "/dev/i2c-1"
        address: u8,        // e.g. 0x3C (I2C addresses are 7-bit, stored in u8)
        speed_hz: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    Ssd1306,
    /// Headless, frames are kept in memory
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MixerBackend {
    /// amixer on an ALSA card
    Alsa,
    /// in-memory volume
    Soft,
    None,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "muspi", about = "Muspi now playing display", version)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Shorthand for --log-level debug
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub display_width: Option<u32>,
    #[arg(long)]
    pub display_height: Option<u32>,
    #[arg(long)]
    pub display_rotate_deg: Option<u16>,
    #[arg(long)]
    pub display_contrast: Option<u8>,
    #[arg(long, value_enum)]
    pub driver: Option<DriverKind>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub keymap: Option<PathBuf>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub plugins: Option<PathBuf>,
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub user_dir: Option<PathBuf>,
    #[arg(long)]
    pub sleep_timeout_secs: Option<u64>,
    #[arg(long, value_enum)]
    pub mixer: Option<MixerBackend>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Config, ConfigError> {
    let cli = Cli::parse();
    let cfg = resolve(&cli)?;

    if cli.dump_config {
        // Pretty YAML of effective config (nice for debugging)
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    Ok(cfg)
}

/// Defaults, then the YAML file, then the command line.
pub fn resolve(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    apply_cli_overrides(&mut cfg, cli);
    validate(&cfg)?;
    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/muspi/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/muspi/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/muspi.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["muspi.yaml", "config/muspi.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

pub fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Replace a leading `~/` with the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some()      { dst.log_level = src.log_level; }
    match (&mut dst.display, src.display) {
        (None, Some(c)) => dst.display = Some(c),
        (Some(d), Some(s)) => merge_display(d, s),
        _ => {}
    }
    match (&mut dst.screen, src.screen) {
        (None, Some(c)) => dst.screen = Some(c),
        (Some(d), Some(s)) => {
            if s.sleep_timeout_secs.is_some() { d.sleep_timeout_secs = s.sleep_timeout_secs; }
            if s.welcome_message.is_some()    { d.welcome_message = s.welcome_message; }
        }
        _ => {}
    }
    match (&mut dst.paths, src.paths) {
        (None, Some(c)) => dst.paths = Some(c),
        (Some(d), Some(s)) => {
            if s.keymap.is_some()   { d.keymap = s.keymap; }
            if s.plugins.is_some()  { d.plugins = s.plugins; }
            if s.user_dir.is_some() { d.user_dir = s.user_dir; }
        }
        _ => {}
    }
    match (&mut dst.mixer, src.mixer) {
        (None, Some(c)) => dst.mixer = Some(c),
        (Some(d), Some(s)) => {
            if s.backend.is_some() { d.backend = s.backend; }
            if s.card.is_some()    { d.card = s.card; }
            if s.step_db.is_some() { d.step_db = s.step_db; }
        }
        _ => {}
    }
}

fn merge_display(dst: &mut DisplayConfig, src: DisplayConfig) {
    if src.width.is_some()       { dst.width = src.width; }
    if src.height.is_some()      { dst.height = src.height; }
    if src.rotate_deg.is_some()  { dst.rotate_deg = src.rotate_deg; }
    if src.contrast.is_some()    { dst.contrast = src.contrast; }
    if src.driver.is_some()      { dst.driver = src.driver; }
    if src.bus.is_some()         { dst.bus = src.bus; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()       { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                     { cfg.log_level = Some("debug".into()); }

    let display = cfg.display.get_or_insert_with(DisplayConfig::default);
    if cli.display_width.is_some()       { display.width = cli.display_width; }
    if cli.display_height.is_some()      { display.height = cli.display_height; }
    if cli.display_rotate_deg.is_some()  { display.rotate_deg = cli.display_rotate_deg; }
    if cli.display_contrast.is_some()    { display.contrast = cli.display_contrast; }
    if cli.driver.is_some()              { display.driver = cli.driver; }

    let paths = cfg.paths.get_or_insert_with(PathsConfig::default);
    if cli.keymap.is_some()   { paths.keymap = cli.keymap.clone(); }
    if cli.plugins.is_some()  { paths.plugins = cli.plugins.clone(); }
    if cli.user_dir.is_some() { paths.user_dir = cli.user_dir.clone(); }

    if cli.sleep_timeout_secs.is_some() {
        cfg.screen.get_or_insert_with(ScreenConfig::default).sleep_timeout_secs = cli.sleep_timeout_secs;
    }
    if cli.mixer.is_some() {
        cfg.mixer.get_or_insert_with(MixerConfig::default).backend = cli.mixer;
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(display) = cfg.display.as_ref() {
        if display.width == Some(0) || display.height == Some(0) {
            return Err(ConfigError::Validation("display width/height must be > 0".into()));
        }
        if let Some(rot) = display.rotate_deg {
            match rot {
                0 | 90 | 180 | 270 => {},
                _ => return Err(ConfigError::Validation("display rotate_deg must be 0|90|180|270".into()))
            }
        }
    }
    if let Some(screen) = cfg.screen.as_ref() {
        if screen.sleep_timeout_secs == Some(0) {
            return Err(ConfigError::Validation("screen sleep_timeout_secs must be > 0".into()));
        }
    }
    if let Some(step) = cfg.mixer.as_ref().and_then(|m| m.step_db) {
        if !(step > 0.0 && step <= 20.0) {
            return Err(ConfigError::Validation("mixer step_db must be in (0, 20]".into()));
        }
    }
    Ok(())
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Display settings with defaults filled in
    pub fn display_config(&self) -> DisplayConfig {
        let d = self.display.clone().unwrap_or_default();
        DisplayConfig {
            width: Some(d.width.unwrap_or(constants::DISPLAY_WIDTH)),
            height: Some(d.height.unwrap_or(constants::DISPLAY_HEIGHT)),
            rotate_deg: Some(d.rotate_deg.unwrap_or(0)),
            contrast: Some(d.contrast.unwrap_or(constants::DEFAULT_CONTRAST)),
            driver: Some(d.driver.unwrap_or(DriverKind::Ssd1306)),
            bus: Some(d.bus.unwrap_or(BusConfig::I2c {
                bus: constants::DEFAULT_I2C_BUS.to_string(),
                address: constants::DEFAULT_I2C_ADDRESS,
                speed_hz: None,
            })),
        }
    }

    pub fn sleep_timeout(&self) -> Duration {
        let secs = self
            .screen
            .as_ref()
            .and_then(|s| s.sleep_timeout_secs)
            .unwrap_or(constants::DEFAULT_SLEEP_SECS);
        Duration::from_secs(secs)
    }

    pub fn welcome_message(&self) -> String {
        self.screen
            .as_ref()
            .and_then(|s| s.welcome_message.clone())
            .unwrap_or_else(|| constants::WELCOME_MESSAGE.to_string())
    }

    pub fn keymap_path(&self) -> PathBuf {
        let p = self.paths.as_ref().and_then(|p| p.keymap.clone());
        expand_home(&p.unwrap_or_else(|| PathBuf::from(constants::KEYMAP_FILE)))
    }

    pub fn plugins_template(&self) -> PathBuf {
        let p = self.paths.as_ref().and_then(|p| p.plugins.clone());
        expand_home(&p.unwrap_or_else(|| PathBuf::from(constants::PLUGINS_FILE)))
    }

    pub fn user_dir(&self) -> PathBuf {
        let p = self.paths.as_ref().and_then(|p| p.user_dir.clone());
        expand_home(&p.unwrap_or_else(|| PathBuf::from(constants::USER_DIR)))
    }

    pub fn mixer_backend(&self) -> MixerBackend {
        self.mixer.as_ref().and_then(|m| m.backend).unwrap_or(MixerBackend::Alsa)
    }

    pub fn mixer_card(&self) -> String {
        self.mixer
            .as_ref()
            .and_then(|m| m.card.clone())
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn mixer_step_db(&self) -> f32 {
        self.mixer.as_ref().and_then(|m| m.step_db).unwrap_or(1.0)
    }
}
