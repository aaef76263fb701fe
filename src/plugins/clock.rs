/*
 *	plugins/clock.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Date and time screen
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

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use anyhow::Result;
use arrayvec::ArrayString;
use chrono::{Local, NaiveDateTime};
use embedded_graphics::{
    mono_font::{ascii::{FONT_10X20, FONT_6X10}, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::plugin::{Plugin, PluginBase, PluginContext, PluginSetup};

const COLON_BLINK: Duration = Duration::from_millis(500);
const DATE_Y: i32 = 2;
const TIME_Y: i32 = 14;

pub fn create(setup: &PluginSetup) -> Box<dyn Plugin> {
    Box::new(ClockPlugin::new(setup))
}

/// Clock display state
pub struct ClockPlugin {
    base: PluginBase,
    /// Whether colon is currently shown (for blinking)
    colon_on: bool,
    last_colon_toggle: Instant,
}

impl ClockPlugin {
    pub fn new(setup: &PluginSetup) -> Self {
        Self {
            base: PluginBase::new("clock", setup),
            colon_on: true,
            last_colon_toggle: setup.clock.now(),
        }
    }

    pub fn colon_on(&self) -> bool {
        self.colon_on
    }

    /// Toggle colon for blinking effect
    fn blink(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_colon_toggle) >= COLON_BLINK {
            self.colon_on = !self.colon_on;
            self.last_colon_toggle = now;
        }
    }

    /// Draw a given wall-clock time
    pub fn draw_time(&mut self, time: NaiveDateTime) -> Result<()> {
        let separator = if self.colon_on { ':' } else { ' ' };
        let mut clock: ArrayString<8> = ArrayString::new();
        write!(clock, "{}", time.format(&format!("%H{0}%M{0}%S", separator)))?;
        let mut date: ArrayString<10> = ArrayString::new();
        write!(date, "{}", time.format("%Y-%m-%d"))?;

        let centre_x = self.base.width() as i32 / 2;
        let top = TextStyleBuilder::new().alignment(Alignment::Center).baseline(Baseline::Top).build();
        let canvas = self.base.canvas_mut();

        Text::with_text_style(
            &date,
            Point::new(centre_x, DATE_Y),
            MonoTextStyle::new(&FONT_6X10, BinaryColor::On),
            top,
        )
        .draw(canvas)?;
        Text::with_text_style(
            &clock,
            Point::new(centre_x, TIME_Y),
            MonoTextStyle::new(&FONT_10X20, BinaryColor::On),
            top,
        )
        .draw(canvas)?;
        Ok(())
    }
}

impl Plugin for ClockPlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn render(&mut self, ctx: &mut PluginContext) -> Result<()> {
        self.blink(ctx.now());
        self.draw_time(Local::now().naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{KeyMap, KeyMapConfig};
    use crate::pacer::{ManualClock, SharedClock};
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap().and_hms_opt(12, 34, 56).unwrap()
    }

    #[test]
    fn test_draws_date_and_time() {
        let clock = ManualClock::shared();
        let mut plugin = ClockPlugin::new(&PluginSetup { width: 128, height: 64, clock });
        plugin.draw_time(noon()).unwrap();

        let canvas = plugin.image();
        assert!(canvas.count_on() > 0);
        // date band above the time band
        let lit_rows: Vec<i32> = (0..64).filter(|&y| (0..128).any(|x| canvas.pixel(x, y) == Some(BinaryColor::On))).collect();
        assert!(lit_rows.first().copied().unwrap_or(99) >= DATE_Y);
        assert!(lit_rows.iter().any(|&y| y >= TIME_Y + 10));
    }

    #[test]
    fn test_colon_blinks_every_half_second() {
        let manual = ManualClock::shared();
        let clock: SharedClock = manual.clone();
        let mut plugin = ClockPlugin::new(&PluginSetup { width: 128, height: 64, clock: clock.clone() });
        let keymap = KeyMap::with_config(KeyMapConfig::default(), clock.clone());

        let mut colon = Vec::new();
        for _ in 0..3 {
            let mut ctx = PluginContext::new(0, &keymap, &clock, false);
            plugin.update(&mut ctx).unwrap();
            colon.push(plugin.colon_on());
            manual.advance(COLON_BLINK);
        }
        assert_eq!(colon, vec![true, false, true]);
    }

    #[test]
    fn test_colon_changes_pixels() {
        let clock = ManualClock::shared();
        let mut plugin = ClockPlugin::new(&PluginSetup { width: 128, height: 64, clock });
        plugin.draw_time(noon()).unwrap();
        let with_colon = plugin.image().clone();

        plugin.colon_on = false;
        plugin.base_mut().clear();
        plugin.draw_time(noon()).unwrap();
        assert!(plugin.image().count_on() < with_colon.count_on());
    }
}
