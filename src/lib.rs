/*
 *	lib.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Screen engine, plugins and their collaborators
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

pub mod animation;
pub mod canvas;
pub mod config;
pub mod constants;
pub mod display;
pub mod input;
pub mod keycodes;
pub mod keymap;
pub mod mixer;
pub mod pacer;
pub mod plugin;
pub mod plugins;
