/*
 *	plugin/registry.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Static table of the screens this build knows how to construct
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

use std::collections::BTreeMap;

use log::debug;

use super::{Plugin, PluginSetup};
use crate::plugins;

/// Builds one plugin instance
pub type PluginFactory = fn(&PluginSetup) -> Box<dyn Plugin>;

/// Maps the class names used in the plugin list to factories
#[derive(Default, Clone)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The screens shipped with muspi
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("clock", plugins::clock::create);
        registry.register("life", plugins::life::create);
        registry.register("dino", plugins::dino::create);
        registry.register("airplay", plugins::airplay::create);
        registry
    }

    /// Add or replace a factory under `class_name`
    pub fn register(&mut self, class_name: &str, factory: PluginFactory) {
        debug!("registered plugin class {}", class_name);
        self.factories.insert(class_name.to_string(), factory);
    }

    pub fn get(&self, class_name: &str) -> Option<PluginFactory> {
        self.factories.get(class_name).copied()
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Registered class names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
