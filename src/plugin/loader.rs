/*
 *	plugin/loader.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Declarative plugin list, user copy synchronisation and loading
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

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::registry::PluginRegistry;
use crate::constants::USER_PLUGINS_FILE;
use crate::display::DisplayManager;

#[derive(Debug, Error)]
pub enum PluginLoadError {
    #[error("cannot access plugin list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid plugin list {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The plugin list file. Entries are kept as raw JSON so per-plugin keys
/// the loader does not know about survive synchronisation untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginList {
    #[serde(default)]
    pub plugins: Vec<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One entry of the plugin list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Registry class, defaults to `name`
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub auto_hide: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn enabled_by_default() -> bool {
    true
}

impl PluginEntry {
    pub fn class(&self) -> &str {
        self.class_name.as_deref().unwrap_or(&self.name)
    }
}

/// Outcome of [`PluginManager::load`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("name").and_then(Value::as_str)
}

/// Bring a user list in line with the template: template entries the user
/// copy lacks are appended, user entries the template no longer has are
/// dropped. Everything else in the user copy is left as is.
///
/// Returns true when the user list changed.
pub fn synchronize(template: &PluginList, user: &mut PluginList) -> bool {
    let template_names: HashSet<&str> = template.plugins.iter().filter_map(entry_name).collect();
    let user_names: HashSet<String> =
        user.plugins.iter().filter_map(entry_name).map(str::to_string).collect();
    let mut updated = false;

    for entry in &template.plugins {
        if let Some(name) = entry_name(entry) {
            if !user_names.contains(name) {
                info!("New plugin detected: {}, adding to user config", name);
                user.plugins.push(entry.clone());
                updated = true;
            }
        }
    }

    let before = user.plugins.len();
    user.plugins.retain(|entry| match entry_name(entry) {
        Some(name) if template_names.contains(name) => true,
        name => {
            info!("Plugin removed from system: {}, removing from user config", name.unwrap_or("<unnamed>"));
            false
        }
    });
    updated || user.plugins.len() != before
}

pub fn read_list(path: &Path) -> Result<PluginList, PluginLoadError> {
    let text = fs::read_to_string(path)
        .map_err(|source| PluginLoadError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&text).map_err(|source| PluginLoadError::Parse { path: path.to_path_buf(), source })
}

pub fn write_list(path: &Path, list: &PluginList) -> Result<(), PluginLoadError> {
    let io = |source| PluginLoadError::Io { path: path.to_path_buf(), source };
    let mut text = serde_json::to_string_pretty(list)
        .map_err(|source| PluginLoadError::Parse { path: path.to_path_buf(), source })?;
    text.push('\n');
    fs::write(path, text).map_err(io)
}

/// Reads the plugin list and registers the enabled screens with the engine.
///
/// The system template is never written. A user copy in the user directory
/// is created from it on first run and synchronised with it on every load,
/// so users keep their own `enabled` choices across upgrades.
pub struct PluginManager {
    template: PathBuf,
    user_dir: PathBuf,
    registry: PluginRegistry,
    config: PluginList,
    loaded: Vec<String>,
}

impl PluginManager {
    pub fn new(template: impl Into<PathBuf>, user_dir: impl Into<PathBuf>, registry: PluginRegistry) -> Self {
        let mut manager = Self {
            template: template.into(),
            user_dir: user_dir.into(),
            registry,
            config: PluginList::default(),
            loaded: Vec::new(),
        };
        manager.reload_list();
        manager
    }

    pub fn user_config_path(&self) -> PathBuf {
        self.user_dir.join(USER_PLUGINS_FILE)
    }

    pub fn config(&self) -> &PluginList {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Names of the plugins registered by [`PluginManager::load`]
    pub fn loaded_plugins(&self) -> &[String] {
        &self.loaded
    }

    /// Create or synchronise the user copy. Returns true when it was written.
    pub fn init_user_config(&self) -> Result<bool, PluginLoadError> {
        let user_file = self.user_config_path();
        fs::create_dir_all(&self.user_dir)
            .map_err(|source| PluginLoadError::Io { path: self.user_dir.clone(), source })?;

        let template = read_list(&self.template)?;
        if !user_file.exists() {
            info!("User plugin config not found, copying from {}", self.template.display());
            fs::copy(&self.template, &user_file)
                .map_err(|source| PluginLoadError::Io { path: user_file.clone(), source })?;
            info!("User plugin config created: {}", user_file.display());
            return Ok(true);
        }

        let mut user = read_list(&user_file)?;
        if synchronize(&template, &mut user) {
            write_list(&user_file, &user)?;
            info!("User plugin config synchronized");
            return Ok(true);
        }
        Ok(false)
    }

    /// Re-read the plugin list from disk. Already registered plugins are
    /// not affected; the new list applies to the next `load`.
    pub fn reload_config(&mut self) {
        info!("Reloading plugin configuration...");
        self.reload_list();
        info!("Configuration reloaded");
    }

    fn reload_list(&mut self) {
        if let Err(e) = self.init_user_config() {
            error!("{}", e);
        }
        self.config = match read_list(&self.user_config_path()) {
            Ok(list) => list,
            Err(e) => {
                warn!("{}, falling back to the system list", e);
                read_list(&self.template).unwrap_or_else(|e| {
                    error!("{}", e);
                    PluginList::default()
                })
            }
        };
    }

    /// Register every enabled entry with the engine, in list order.
    /// A bad entry is logged and counted, it never stops the rest.
    pub fn load(&mut self, display: &mut DisplayManager) -> LoadSummary {
        info!("Loading plugins from config...");
        let mut summary = LoadSummary::default();

        for raw in &self.config.plugins {
            let entry: PluginEntry = match serde_json::from_value(raw.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    error!("Invalid plugin entry {}: {}", raw, e);
                    summary.failed += 1;
                    continue;
                }
            };

            if !entry.enabled {
                info!("Plugin '{}' is disabled, skipping", entry.name);
                summary.skipped += 1;
                continue;
            }

            let Some(factory) = self.registry.get(entry.class()) else {
                error!("Plugin class '{}' not found for '{}'", entry.class(), entry.name);
                summary.failed += 1;
                continue;
            };

            let added = panic::catch_unwind(AssertUnwindSafe(|| display.add_plugin(factory, entry.auto_hide)));
            match added {
                Ok(id) => {
                    info!("Loaded plugin: {} (auto_hide={}, id={})", entry.name, entry.auto_hide, id);
                    self.loaded.push(entry.name.clone());
                    summary.loaded += 1;
                }
                Err(_) => {
                    error!("Failed to load plugin '{}': constructor panicked", entry.name);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Plugin loading complete: {} loaded, {} skipped, {} failed",
            summary.loaded, summary.skipped, summary.failed
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{ManagerOptions, MockDriver};
    use crate::keymap::{KeyMap, KeyMapConfig};
    use crate::mixer::NullMixer;
    use crate::pacer::ManualClock;
    use serde_json::json;

    fn scratch(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("muspi-loader-{}-{}", std::process::id(), tag));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn list(value: Value) -> PluginList {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_synchronize_adds_and_prunes() {
        let template = list(json!({"plugins": [
            {"name": "clock", "enabled": true},
            {"name": "life", "enabled": true},
        ]}));
        let mut user = list(json!({"plugins": [
            {"name": "clock", "enabled": false, "brightness": 3},
            {"name": "retired", "enabled": true},
        ]}));

        assert!(synchronize(&template, &mut user));
        let names: Vec<&str> = user.plugins.iter().filter_map(entry_name).collect();
        assert_eq!(names, vec!["clock", "life"]);
        // user choices survive
        assert_eq!(user.plugins[0]["enabled"], json!(false));
        assert_eq!(user.plugins[0]["brightness"], json!(3));

        assert!(!synchronize(&template, &mut user));
    }

    #[test]
    fn test_first_run_copies_template() {
        let dir = scratch("copy");
        let template = dir.join("plugins.json");
        fs::write(&template, r#"{"plugins": [{"name": "clock", "enabled": true}]}"#).unwrap();

        let user_dir = dir.join("user");
        let manager = PluginManager::new(&template, &user_dir, PluginRegistry::builtin());
        assert!(manager.user_config_path().exists());
        assert_eq!(manager.config().plugins.len(), 1);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_existing_user_copy_is_synchronised() {
        let dir = scratch("sync");
        let template = dir.join("plugins.json");
        fs::write(&template, r#"{"plugins": [{"name": "clock"}, {"name": "dino"}]}"#).unwrap();
        let user_dir = dir.join("user");
        fs::create_dir_all(&user_dir).unwrap();
        fs::write(user_dir.join(USER_PLUGINS_FILE), r#"{"plugins": [{"name": "clock", "enabled": false}]}"#)
            .unwrap();

        let manager = PluginManager::new(&template, &user_dir, PluginRegistry::builtin());
        let on_disk = read_list(&manager.user_config_path()).unwrap();
        assert_eq!(on_disk.plugins.len(), 2);
        assert_eq!(on_disk.plugins[0]["enabled"], json!(false));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_counts_outcomes() {
        let dir = scratch("load");
        let template = dir.join("plugins.json");
        fs::write(
            &template,
            r#"{"plugins": [
                {"name": "clock", "enabled": true},
                {"name": "life", "enabled": false},
                {"name": "radio", "enabled": true},
                {"name": "game", "class_name": "dino", "auto_hide": false}
            ]}"#,
        )
        .unwrap();

        let clock = ManualClock::shared();
        let keymap = KeyMap::with_config(KeyMapConfig::default(), clock.clone());
        let mut display = DisplayManager::new(
            Box::new(MockDriver::new_with_size(128, 64)),
            keymap,
            Box::new(NullMixer),
            clock,
            ManagerOptions::default(),
        )
        .unwrap();

        let mut manager = PluginManager::new(&template, dir.join("user"), PluginRegistry::builtin());
        let summary = manager.load(&mut display);
        assert_eq!(summary, LoadSummary { loaded: 2, skipped: 1, failed: 1 });
        assert_eq!(manager.loaded_plugins(), ["clock".to_string(), "game".to_string()]);
        assert_eq!(display.plugins().len(), 2);
        assert_eq!(display.plugin(1).unwrap().name(), "dino");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_template_loads_nothing() {
        let dir = scratch("missing");
        let manager = PluginManager::new(dir.join("nope.json"), dir.join("user"), PluginRegistry::builtin());
        assert!(manager.config().plugins.is_empty());
        let _ = fs::remove_dir_all(&dir);
    }
}
