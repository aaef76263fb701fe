/*
 *	plugins/airplay.rs
 *
 *	Muspi - now playing on a tiny screen
 *	(c) 2020-26 Stuart Hunter
 *
 *	AirPlay now playing, fed by shairport-sync metadata
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

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use embedded_graphics::{
    mono_font::{ascii::{FONT_5X8, FONT_6X10}, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};
use log::{debug, info, warn};

use crate::plugin::{Plugin, PluginBase, PluginContext, PluginSetup};

/// Shell pipeline producing one human readable line per metadata item
pub const READER_COMMAND: &str = "shairport-sync-metadata-reader < /tmp/shairport-sync-metadata";
/// Give the screen up after this long paused
pub const PAUSE_TIMEOUT: Duration = Duration::from_secs(30);
const RESPAWN_DELAY: Duration = Duration::from_secs(1);
const VU_WIDTH: u32 = 6;
const TEXT_X: i32 = VU_WIDTH as i32 + 4;

pub fn create(setup: &PluginSetup) -> Box<dyn Plugin> {
    Box::new(AirplayPlugin::new(setup))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Play,
    Pause,
}

/// One decoded line of reader output
#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    Title(String),
    Artist(String),
    Album(String),
    /// Raw `left,right,min,max` dB string
    Volume(String),
    Session(bool),
    PlayState(PlayState),
    Client(String),
}

fn quoted(line: &str) -> Option<String> {
    line.split('"').nth(1).map(|s| s.trim().to_string())
}

/// Decode a reader line. Most lines carry nothing of interest.
pub fn parse_line(line: &str) -> Vec<Metadata> {
    let line = line.trim();
    let quoted_as = |wrap: fn(String) -> Metadata| -> Vec<Metadata> { quoted(line).map(wrap).into_iter().collect() };

    if line.contains("Artist") {
        quoted_as(Metadata::Artist)
    } else if line.contains("Album") {
        quoted_as(Metadata::Album)
    } else if line.contains("Title") {
        quoted_as(Metadata::Title)
    } else if line.contains("Volume") {
        quoted_as(Metadata::Volume)
    } else if line.contains("Play Session End.") {
        vec![Metadata::Session(false)]
    } else if line.contains("Play Session Begin.") {
        vec![Metadata::Session(true)]
    } else if line.contains("Resume.") {
        vec![Metadata::Session(true), Metadata::PlayState(PlayState::Play)]
    } else if line.contains("Pause.") {
        vec![Metadata::PlayState(PlayState::Pause)]
    } else if line.contains("The name of the AirPlay client is") {
        quoted_as(Metadata::Client)
    } else {
        Vec::new()
    }
}

/// Stream volume as 0..=1 from the quieter channel, -100dB and below is 0
pub fn volume_level(raw: &str) -> Option<f32> {
    let mut parts = raw.split(',').map(|p| p.trim().parse::<f32>());
    let left = parts.next()?.ok()?;
    let right = parts.next()?.ok()?;
    Some(((left.min(right) + 100.0) / 100.0).clamp(0.0, 1.0))
}

/// Run the reader pipeline forever, restarting it whenever it ends.
/// Returns once the plugin side of the channel is gone.
fn read_metadata(tx: Sender<Metadata>) {
    loop {
        let child = Command::new("sh")
            .arg("-c")
            .arg(READER_COMMAND)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        match child {
            Ok(mut child) => {
                if let Some(stdout) = child.stdout.take() {
                    for line in BufReader::new(stdout).lines() {
                        let Ok(line) = line else { break };
                        for item in parse_line(&line) {
                            if tx.send(item).is_err() {
                                let _ = child.kill();
                                return;
                            }
                        }
                    }
                }
                let _ = child.wait();
                debug!("[airplay] metadata reader ended, restarting");
            }
            Err(e) => warn!("[airplay] cannot start metadata reader: {}", e),
        }
        thread::sleep(RESPAWN_DELAY);
    }
}

fn spawn_reader() -> Receiver<Metadata> {
    let (tx, rx) = mpsc::channel();
    if let Err(e) = thread::Builder::new()
        .name("airplay-metadata".into())
        .spawn(move || read_metadata(tx))
    {
        warn!("[airplay] metadata thread not started: {}", e);
    }
    rx
}

pub struct AirplayPlugin {
    base: PluginBase,
    rx: Receiver<Metadata>,
    title: String,
    artist: String,
    album: String,
    client: String,
    play_state: PlayState,
    stream_volume: Option<f32>,
    last_play_time: Instant,
    source_closed: bool,
}

impl AirplayPlugin {
    pub fn new(setup: &PluginSetup) -> Self {
        Self::with_source(setup, spawn_reader())
    }

    /// Build with metadata coming from `rx` instead of the reader process
    pub fn with_source(setup: &PluginSetup, rx: Receiver<Metadata>) -> Self {
        Self {
            base: PluginBase::new("airplay", setup),
            rx,
            title: "play next".to_string(),
            artist: "show info".to_string(),
            album: String::new(),
            client: String::new(),
            play_state: PlayState::Pause,
            stream_volume: None,
            last_play_time: setup.clock.now(),
            source_closed: false,
        }
    }

    pub fn title(&self) -> &str { &self.title }
    pub fn artist(&self) -> &str { &self.artist }
    pub fn album(&self) -> &str { &self.album }
    pub fn client(&self) -> &str { &self.client }
    pub fn play_state(&self) -> PlayState { self.play_state }
    pub fn stream_volume(&self) -> Option<f32> { self.stream_volume }

    fn apply(&mut self, item: Metadata, ctx: &mut PluginContext) {
        match item {
            Metadata::Title(title) => self.title = title,
            Metadata::Artist(artist) => self.artist = artist,
            Metadata::Album(album) => self.album = album,
            Metadata::Client(client) => self.client = client,
            Metadata::Volume(raw) => {
                self.stream_volume = volume_level(&raw).or(self.stream_volume);
            }
            Metadata::Session(started) => {
                info!("[airplay] play session {}", if started { "begin" } else { "end" });
                ctx.set_active(started);
                if started {
                    self.last_play_time = ctx.now();
                }
            }
            Metadata::PlayState(state) => {
                if state != self.play_state {
                    self.last_play_time = ctx.now();
                }
                self.play_state = state;
            }
        }
    }

    fn draw_vu(&mut self) -> Result<()> {
        let height = self.base.height();
        let level = match self.play_state {
            PlayState::Play => self.stream_volume.unwrap_or(0.5),
            PlayState::Pause => 0.0,
        };
        let filled = ((height as f32 - 2.0) * level).round() as u32;
        let canvas = self.base.canvas_mut();
        Rectangle::new(Point::zero(), Size::new(VU_WIDTH, height))
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(canvas)?;
        if filled > 0 {
            Rectangle::new(Point::new(1, (height - 1 - filled) as i32), Size::new(VU_WIDTH - 2, filled))
                .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
                .draw(canvas)?;
        }
        Ok(())
    }
}

impl Plugin for AirplayPlugin {
    fn base(&self) -> &PluginBase { &self.base }
    fn base_mut(&mut self) -> &mut PluginBase { &mut self.base }

    fn event_listener(&mut self, ctx: &mut PluginContext) -> Result<()> {
        while !self.source_closed {
            match self.rx.try_recv() {
                Ok(item) => self.apply(item, ctx),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("[airplay] metadata source closed");
                    self.source_closed = true;
                }
            }
        }

        if !self.is_active() {
            return Ok(());
        }
        match self.play_state {
            PlayState::Play => ctx.reset_sleep_timer(),
            PlayState::Pause => {
                if ctx.now().saturating_duration_since(self.last_play_time) > PAUSE_TIMEOUT {
                    info!("[airplay] paused for {}s, giving up the screen", PAUSE_TIMEOUT.as_secs());
                    ctx.set_active(false);
                }
            }
        }
        Ok(())
    }

    fn render(&mut self, _ctx: &mut PluginContext) -> Result<()> {
        self.draw_vu()?;

        let width = self.base.width() as i32;
        let height = self.base.height() as i32;
        let centre_x = TEXT_X + (width - TEXT_X) / 2;
        let top = TextStyleBuilder::new().alignment(Alignment::Center).baseline(Baseline::Top).build();
        let small = MonoTextStyle::new(&FONT_5X8, BinaryColor::On);

        let icon = match self.play_state {
            PlayState::Play => ">",
            PlayState::Pause => "||",
        };
        let status = format!("{} {}", icon, self.client);
        let subtitle = if self.album.is_empty() {
            self.artist.clone()
        } else {
            format!("{} - {}", self.artist, self.album)
        };

        let canvas = self.base.canvas_mut();
        Text::with_text_style(&status, Point::new(centre_x, 0), small, top).draw(canvas)?;
        Text::with_text_style(
            &self.title,
            Point::new(centre_x, height / 2 - 6),
            MonoTextStyle::new(&FONT_6X10, BinaryColor::On),
            top,
        )
        .draw(canvas)?;
        Text::with_text_style(&subtitle, Point::new(centre_x, height - 9), small, top).draw(canvas)?;
        Ok(())
    }

    fn is_playing(&self) -> Option<bool> {
        Some(self.play_state == PlayState::Play)
    }

    fn on_active_changed(&mut self, active: bool, ctx: &mut PluginContext) -> Result<()> {
        if active {
            self.last_play_time = ctx.now();
        }
        Ok(())
    }
}
