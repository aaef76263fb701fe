/*
 *	plugins/dino.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	Endless runner, plays itself until someone presses a key
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
use embedded_graphics::{
    mono_font::{ascii::{FONT_5X8, FONT_6X10}, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use log::info;
use rand::Rng;

use crate::canvas::Canvas;
use crate::input::KeyEvent;
use crate::plugin::{Plugin, PluginBase, PluginContext, PluginSetup};

const GAME_FPS: f32 = 30.0;

pub const DINO_WIDTH: u32 = 20;
pub const DINO_HEIGHT: u32 = 22;
const DINO_X: f32 = 10.0;
const OBSTACLE_WIDTH: u32 = 4;
const OBSTACLE_SPEED: f32 = 3.0;
const OBSTACLE_MIN_GAP: f32 = 50.0;
const SPAWN_CHANCE: f64 = 0.03;
const GRAVITY: f32 = 0.6;
const JUMP_FORCE: f32 = -6.0;
const LEG_FRAMES: u32 = 4;
/// AI jumps when the next cactus is closer than this
const SAFE_DISTANCE: f32 = 20.0;
const JUMP_COOLDOWN: Duration = Duration::from_millis(300);
const SCORE_TICK: Duration = Duration::from_millis(100);
pub const RESTART_AFTER: Duration = Duration::from_secs(5);

// sprites are rows of bits, most significant bit leftmost
const DINO_HEAD_OPEN: [u32; 8] = [
    0b00000000000111111110,
    0b00000000001111111111,
    0b00000000001101111111,
    0b00000000001111111111,
    0b00000000001111111111,
    0b00000000001111111111,
    0b00000000001111100000,
    0b00000000001111111100,
];

const DINO_HEAD_HIT: [u32; 8] = [
    0b00000000000111111110,
    0b00000000001111111111,
    0b00000000001100011111,
    0b00000000001111111111,
    0b00000000001111111111,
    0b00000000001111111111,
    0b00000000001111111100,
    0b00000000001111111100,
];

const DINO_BODY: [u32; 10] = [
    0b10000000011111000000,
    0b10000000111111000000,
    0b11000011111111110000,
    0b11100111111111010000,
    0b11111111111111000000,
    0b11111111111111000000,
    0b01111111111110000000,
    0b00111111111110000000,
    0b00011111111100000000,
    0b00001111111000000000,
];

const DINO_LEGS: [[u32; 4]; 3] = [
    [
        0b00000111001110000000,
        0b00000110000000000000,
        0b00000100000000000000,
        0b00000110000000000000,
    ],
    [
        0b00000110011000000000,
        0b00000011001000000000,
        0b00000000001000000000,
        0b00000000001100000000,
    ],
    [
        0b00000111011000000000,
        0b00000110001000000000,
        0b00000100001000000000,
        0b00000110001100000000,
    ],
];

const CACTUS_TALL: [u32; 12] = [
    0b0010, 0b1010, 0b1010, 0b1110, 0b0111, 0b0111, 0b0110, 0b1110, 0b1110, 0b0111, 0b0110, 0b0110,
];
const CACTUS_MEDIUM: [u32; 9] = [0b0010, 0b0010, 0b1010, 0b1110, 0b0100, 0b0101, 0b0111, 0b0110, 0b0110];
const CACTUS_SHORT: [u32; 6] = [0b0010, 0b0011, 0b1010, 0b0110, 0b0010, 0b0010];

fn draw_bits(canvas: &mut Canvas, rows: &[u32], width: u32, x: i32, y: i32) {
    for (dy, row) in rows.iter().enumerate() {
        for dx in 0..width {
            if row & (1 << (width - 1 - dx)) != 0 {
                canvas.set_pixel(x + dx as i32, y + dy as i32, BinaryColor::On);
            }
        }
    }
}

pub fn create(setup: &PluginSetup) -> Box<dyn Plugin> {
    Box::new(DinoPlugin::new(setup))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    /// Attract mode
    Ai,
    Human,
}

#[derive(Debug, Clone)]
pub struct Dino {
    pub x: f32,
    pub y: f32,
    velocity: f32,
    pub jumping: bool,
    leg_state: usize,
    leg_timer: u32,
    pub crashed: bool,
}

impl Dino {
    fn new(ground_y: f32) -> Self {
        Self {
            x: DINO_X,
            y: ground_y - DINO_HEIGHT as f32,
            velocity: 0.0,
            jumping: false,
            leg_state: 0,
            leg_timer: 0,
            crashed: false,
        }
    }

    pub fn jump(&mut self) {
        if !self.jumping && !self.crashed {
            self.velocity = JUMP_FORCE;
            self.jumping = true;
        }
    }

    fn step(&mut self, ground_y: f32) {
        if self.crashed {
            return;
        }
        self.velocity += GRAVITY;
        self.y += self.velocity;
        let floor = ground_y - DINO_HEIGHT as f32;
        if self.y > floor {
            self.y = floor;
            self.velocity = 0.0;
            self.jumping = false;
        }
        if !self.jumping {
            self.leg_timer += 1;
            if self.leg_timer >= LEG_FRAMES {
                self.leg_state = 1 - self.leg_state;
                self.leg_timer = 0;
            }
        }
    }

    fn draw(&self, canvas: &mut Canvas) {
        let (head, legs) = if self.crashed {
            (&DINO_HEAD_HIT, &DINO_LEGS[2])
        } else {
            (&DINO_HEAD_OPEN, &DINO_LEGS[self.leg_state])
        };
        let x = self.x.round() as i32;
        let y = self.y.round() as i32;
        draw_bits(canvas, head, DINO_WIDTH, x, y);
        draw_bits(canvas, &DINO_BODY, DINO_WIDTH, x, y + head.len() as i32);
        draw_bits(canvas, legs, DINO_WIDTH, x, y + (head.len() + DINO_BODY.len()) as i32);
    }
}

#[derive(Debug, Clone)]
pub struct Obstacle {
    pub x: f32,
    pub y: f32,
    sprite: &'static [u32],
}

impl Obstacle {
    /// Cactus sized from a 6..=12 pixel roll
    pub fn new(x: f32, ground_y: f32, height_roll: u32) -> Self {
        let sprite: &'static [u32] = match height_roll {
            11..=u32::MAX => &CACTUS_TALL,
            8..=10 => &CACTUS_MEDIUM,
            _ => &CACTUS_SHORT,
        };
        Self { x, y: ground_y - sprite.len() as f32, sprite }
    }

    pub fn height(&self) -> f32 {
        self.sprite.len() as f32
    }

    fn draw(&self, canvas: &mut Canvas) {
        draw_bits(canvas, self.sprite, OBSTACLE_WIDTH, self.x as i32, self.y as i32);
    }
}

/// Everything that changes frame to frame
#[derive(Debug, Clone)]
pub struct Game {
    width: f32,
    ground_y: f32,
    pub dino: Dino,
    pub obstacles: Vec<Obstacle>,
    pub score: u32,
    pub player: Player,
    game_over_at: Option<Instant>,
    last_jump: Option<Instant>,
    last_score: Instant,
}

impl Game {
    pub fn new(width: u32, height: u32, player: Player, now: Instant) -> Self {
        let ground_y = height.saturating_sub(1) as f32;
        Self {
            width: width as f32,
            ground_y,
            dino: Dino::new(ground_y),
            obstacles: Vec::new(),
            score: 0,
            player,
            game_over_at: None,
            last_jump: None,
            last_score: now,
        }
    }

    pub fn is_over(&self) -> bool {
        self.game_over_at.is_some()
    }

    /// Seconds left before an automatic restart
    pub fn restart_countdown(&self, now: Instant) -> Option<u64> {
        self.game_over_at
            .map(|at| RESTART_AFTER.saturating_sub(now.saturating_duration_since(at)).as_secs())
    }

    /// Advance one frame. `roll` in 0..1 decides whether a cactus spawns,
    /// `height_roll` sizes it. Returns a fresh attract-mode game once the
    /// game over screen has been shown long enough.
    pub fn step(&mut self, now: Instant, roll: f64, height_roll: u32) -> Option<Game> {
        if let Some(at) = self.game_over_at {
            if now.saturating_duration_since(at) >= RESTART_AFTER {
                return Some(Game::new(self.width as u32, self.ground_y as u32 + 1, Player::Ai, now));
            }
            return None;
        }

        if now.saturating_duration_since(self.last_score) >= SCORE_TICK {
            self.score += 1;
            self.last_score = now;
        }

        self.dino.step(self.ground_y);
        self.spawn(roll, height_roll);
        if !self.dino.crashed && self.player == Player::Ai {
            self.ai_decision(now);
        }

        for obstacle in self.obstacles.iter_mut() {
            obstacle.x -= OBSTACLE_SPEED;
        }
        self.obstacles.retain(|o| o.x >= -(OBSTACLE_WIDTH as f32));

        if self.collides() {
            self.dino.crashed = true;
            self.game_over_at = Some(now);
        }
        None
    }

    fn spawn(&mut self, roll: f64, height_roll: u32) {
        let room = self.obstacles.last().is_none_or(|o| o.x < self.width - OBSTACLE_MIN_GAP);
        if roll < SPAWN_CHANCE && room {
            self.obstacles.push(Obstacle::new(self.width, self.ground_y, height_roll));
        }
    }

    fn ai_decision(&mut self, now: Instant) {
        if self.last_jump.is_some_and(|t| now.saturating_duration_since(t) < JUMP_COOLDOWN) {
            return;
        }
        let front = self.dino.x + DINO_WIDTH as f32;
        let nearest = self
            .obstacles
            .iter()
            .map(|o| o.x - front)
            .filter(|&d| d > 0.0)
            .fold(f32::INFINITY, f32::min);
        if nearest < SAFE_DISTANCE && !self.dino.jumping {
            self.dino.jump();
            self.last_jump = Some(now);
        }
    }

    fn collides(&self) -> bool {
        let d = &self.dino;
        let (dl, dt) = (d.x, d.y);
        let (dr, db) = (d.x + DINO_WIDTH as f32, d.y + DINO_HEIGHT as f32);
        self.obstacles.iter().any(|o| {
            dl < o.x + OBSTACLE_WIDTH as f32 && dr > o.x && dt < o.y + o.height() && db > o.y
        })
    }
}

pub struct DinoPlugin {
    base: PluginBase,
    game: Game,
}

impl DinoPlugin {
    pub fn new(setup: &PluginSetup) -> Self {
        let mut base = PluginBase::new("dino", setup);
        base.set_framerate(GAME_FPS);
        let game = Game::new(setup.width, setup.height, Player::Ai, setup.clock.now());
        Self { base, game }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    fn reset(&mut self, player: Player, now: Instant) {
        if player == Player::Human {
            info!("[dino] new game");
        }
        self.game = Game::new(self.base.width(), self.base.height(), player, now);
    }

    fn draw(&mut self, now: Instant) -> Result<()> {
        let width = self.base.width() as i32;
        let height = self.base.height() as i32;
        let ground = height - 1;
        let canvas = self.base.canvas_mut();
        canvas.blank();

        Line::new(Point::new(0, ground), Point::new(width - 1, ground))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(canvas)?;
        self.game.dino.draw(canvas);
        for obstacle in &self.game.obstacles {
            obstacle.draw(canvas);
        }

        let small = MonoTextStyle::new(&FONT_5X8, BinaryColor::On);
        let text = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        let centred = TextStyleBuilder::new().alignment(Alignment::Center).baseline(Baseline::Middle).build();

        match self.game.player {
            Player::Human => {
                let mut score: ArrayString<10> = ArrayString::new();
                write!(score, "{}", self.game.score)?;
                let right = TextStyleBuilder::new().alignment(Alignment::Right).baseline(Baseline::Top).build();
                Text::with_text_style(&score, Point::new(width - 4, 2), small, right).draw(canvas)?;
            }
            Player::Ai => {
                Text::with_text_style("press to start", Point::new(width / 2 + 8, height / 2 - 6), text, centred)
                    .draw(canvas)?;
            }
        }

        if let Some(remaining) = self.game.restart_countdown(now) {
            let label = "GAME OVER";
            let box_w = (label.len() as u32) * FONT_6X10.character_size.width + 8;
            let top_left = Point::new(width / 2 - box_w as i32 / 2, height / 2 - 12);
            Rectangle::new(top_left, Size::new(box_w, 12))
                .into_styled(PrimitiveStyle::with_fill(BinaryColor::Off))
                .draw(canvas)?;
            Text::with_text_style(label, Point::new(width / 2, height / 2 - 6), text, centred).draw(canvas)?;

            if remaining > 0 {
                let mut countdown: ArrayString<4> = ArrayString::new();
                write!(countdown, "{}s", remaining)?;
                Text::with_text_style(&countdown, Point::new(width / 2, height / 2 + 5), small, centred)
                    .draw(canvas)?;
            }
        }
        Ok(())
    }
}

impl Plugin for DinoPlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn render(&mut self, ctx: &mut PluginContext) -> Result<()> {
        let now = ctx.now();
        let mut rng = rand::rng();
        let roll = rng.random::<f64>();
        let height_roll = rng.random_range(6..=12);
        if let Some(fresh) = self.game.step(now, roll, height_roll) {
            self.game = fresh;
        }
        self.draw(now)
    }

    // render repaints the whole canvas, no separate clear
    fn update(&mut self, ctx: &mut PluginContext) -> Result<()> {
        self.render(ctx)
    }

    fn wants_exclusive_input(&self) -> bool {
        true
    }

    fn on_active_changed(&mut self, active: bool, ctx: &mut PluginContext) -> Result<()> {
        if active {
            self.reset(Player::Ai, ctx.now());
        }
        ctx.listen_keys(active);
        Ok(())
    }

    fn on_key(&mut self, event: &KeyEvent, ctx: &mut PluginContext) -> Result<()> {
        let keymap = ctx.keymap();
        let start_or_jump = keymap.down(event, "action", "select") || keymap.down(event, "action", "cancel");
        let jump = keymap.down(event, "navigation", "up");

        if start_or_jump {
            if self.game.player != Player::Human || self.game.is_over() {
                self.reset(Player::Human, ctx.now());
            } else {
                self.game.dino.jump();
            }
        } else if jump && self.game.player == Player::Human {
            self.game.dino.jump();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::KEY_PRESS;
    use crate::keycodes::key_code;
    use crate::keymap::{KeyMap, KeyMapConfig};
    use crate::pacer::{Clock, ManualClock, SharedClock};

    const NO_SPAWN: f64 = 1.0;

    #[test]
    fn test_dino_lands_after_jump() {
        let now = Instant::now();
        let mut game = Game::new(128, 32, Player::Human, now);
        let floor = game.dino.y;
        game.dino.jump();
        assert!(game.dino.jumping);

        game.step(now, NO_SPAWN, 6);
        assert!(game.dino.y < floor);
        for _ in 0..40 {
            game.step(now, NO_SPAWN, 6);
        }
        assert!(!game.dino.jumping);
        assert_eq!(game.dino.y, floor);
    }

    #[test]
    fn test_cactus_heights() {
        assert_eq!(Obstacle::new(0.0, 31.0, 12).height(), 12.0);
        assert_eq!(Obstacle::new(0.0, 31.0, 9).height(), 9.0);
        assert_eq!(Obstacle::new(0.0, 31.0, 6).height(), 6.0);
        assert_eq!(Obstacle::new(0.0, 31.0, 6).y, 25.0);
    }

    #[test]
    fn test_spawn_keeps_a_gap() {
        let now = Instant::now();
        let mut game = Game::new(128, 32, Player::Human, now);
        game.step(now, 0.0, 12);
        game.step(now, 0.0, 12);
        assert_eq!(game.obstacles.len(), 1);
    }

    #[test]
    fn test_ai_jumps_over_near_cactus() {
        let now = Instant::now();
        let mut game = Game::new(128, 32, Player::Ai, now);
        game.obstacles.push(Obstacle::new(DINO_X + DINO_WIDTH as f32 + 15.0, 31.0, 12));
        game.step(now, NO_SPAWN, 6);
        assert!(game.dino.jumping);
    }

    #[test]
    fn test_crash_then_restart() {
        let clock = ManualClock::shared();
        let start = clock.now();
        let mut game = Game::new(128, 32, Player::Human, start);
        game.obstacles.push(Obstacle::new(DINO_X + 5.0, 31.0, 12));
        assert!(game.step(start, NO_SPAWN, 6).is_none());
        assert!(game.is_over());
        assert!(game.dino.crashed);
        assert_eq!(game.restart_countdown(start), Some(5));

        clock.advance(Duration::from_secs(2));
        assert!(game.step(clock.now(), NO_SPAWN, 6).is_none());
        clock.advance(Duration::from_secs(3));
        let fresh = game.step(clock.now(), NO_SPAWN, 6).unwrap();
        assert_eq!(fresh.player, Player::Ai);
        assert!(!fresh.is_over());
    }

    #[test]
    fn test_press_starts_a_human_game() {
        let clock: SharedClock = ManualClock::shared();
        let setup = PluginSetup { width: 128, height: 32, clock: clock.clone() };
        let mut plugin = DinoPlugin::new(&setup);
        assert!(plugin.wants_exclusive_input());
        assert_eq!(plugin.game().player, Player::Ai);

        let keymap = KeyMap::with_config(KeyMapConfig::default(), clock.clone());
        let mut ctx = PluginContext::new(0, &keymap, &clock, false);
        let enter = key_code("KEY_ENTER").unwrap();
        plugin.on_key(&KeyEvent::button(enter, KEY_PRESS, clock.now()), &mut ctx).unwrap();
        assert_eq!(plugin.game().player, Player::Human);
        assert!(!plugin.game().dino.jumping);

        plugin.on_key(&KeyEvent::button(enter, KEY_PRESS, clock.now()), &mut ctx).unwrap();
        assert!(plugin.game().dino.jumping);
    }

    #[test]
    fn test_frame_keeps_ground_line() {
        let clock: SharedClock = ManualClock::shared();
        let setup = PluginSetup { width: 128, height: 32, clock: clock.clone() };
        let mut plugin = DinoPlugin::new(&setup);
        plugin.draw(clock.now()).unwrap();
        assert!((0..128).all(|x| plugin.image().pixel(x, 31) == Some(BinaryColor::On)));
        // dino standing on the ground
        assert!(plugin.image().count_on() > 128);
    }
}
