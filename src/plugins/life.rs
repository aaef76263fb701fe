/*
 *	plugins/life.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Conway's game of life on a toroidal grid
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

use anyhow::Result;
use embedded_graphics::{
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
};
use log::debug;
use rand::Rng;

use crate::input::KeyEvent;
use crate::plugin::{Plugin, PluginBase, PluginContext, PluginSetup};

const GAME_FPS: f32 = 30.0;
const CELL_SIZE: u32 = 2;

pub fn create(setup: &PluginSetup) -> Box<dyn Plugin> {
    Box::new(LifePlugin::new(setup))
}

/// Cell grid, row major, wrapping at the edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<bool>,
    width: usize,
    height: usize,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        Self { cells: vec![false; width * height], width, height }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, alive: bool) {
        self.cells[y * self.width + x] = alive;
    }

    pub fn population(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn randomize(&mut self, rng: &mut impl Rng) {
        for cell in self.cells.iter_mut() {
            *cell = rng.random_bool(0.5);
        }
    }

    fn neighbours(&self, x: usize, y: usize) -> usize {
        let mut count = 0;
        for dy in [self.height - 1, 0, 1] {
            for dx in [self.width - 1, 0, 1] {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = (x + dx) % self.width;
                let ny = (y + dy) % self.height;
                count += self.get(nx, ny) as usize;
            }
        }
        count
    }

    /// One generation: survive on 2 or 3, birth on 3
    pub fn step(&self) -> Grid {
        let mut next = Grid::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let n = self.neighbours(x, y);
                let alive = matches!((self.get(x, y), n), (true, 2) | (_, 3));
                next.set(x, y, alive);
            }
        }
        next
    }
}

pub struct LifePlugin {
    base: PluginBase,
    grid: Grid,
}

impl LifePlugin {
    pub fn new(setup: &PluginSetup) -> Self {
        let mut base = PluginBase::new("life", setup);
        base.set_framerate(GAME_FPS);
        let mut grid = Grid::new(
            (setup.width / CELL_SIZE).max(1) as usize,
            (setup.height / CELL_SIZE).max(1) as usize,
        );
        grid.randomize(&mut rand::rng());
        Self { base, grid }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn reseed(&mut self) {
        self.grid.randomize(&mut rand::rng());
        debug!("[life] reseeded, {} cells alive", self.grid.population());
    }
}

impl Plugin for LifePlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn render(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        self.grid = self.grid.step();

        let style = PrimitiveStyle::with_fill(BinaryColor::On);
        let canvas = self.base.canvas_mut();
        for y in 0..self.grid.height() {
            for x in 0..self.grid.width() {
                if self.grid.get(x, y) {
                    let origin = Point::new((x as u32 * CELL_SIZE) as i32, (y as u32 * CELL_SIZE) as i32);
                    Rectangle::new(origin, Size::new(CELL_SIZE, CELL_SIZE))
                        .into_styled(style)
                        .draw(canvas)?;
                }
            }
        }
        Ok(())
    }

    fn on_active_changed(&mut self, active: bool, ctx: &mut PluginContext) -> Result<()> {
        if active {
            self.reseed();
        }
        ctx.listen_keys(active);
        Ok(())
    }

    fn on_key(&mut self, event: &KeyEvent, ctx: &mut PluginContext) -> Result<()> {
        let keymap = ctx.keymap();
        if keymap.down(event, "action", "select") || keymap.down(event, "action", "cancel") {
            self.reseed();
        }
        Ok(())
    }
}
