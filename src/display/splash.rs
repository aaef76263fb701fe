/*
 *  display/splash.rs
 *
 *  Muspi - now playing on a tiny screen
 *  (c) 2020-26 Stuart Hunter
 *
 *  Welcome and goodbye screens
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use embedded_graphics::{
    mono_font::{ascii::{FONT_5X8, FONT_6X10, FONT_9X15_BOLD}, MonoFont, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Alignment, Baseline, Text, TextStyleBuilder},
};

use crate::canvas::Canvas;

/// Bordered frame with `message` centred, and an optional small caption
/// along the bottom edge (version, build date).
pub fn render(width: u32, height: u32, message: &str, caption: Option<&str>) -> Canvas {
    let mut canvas = Canvas::new(width, height);

    let _ = Rectangle::new(Point::zero(), Size::new(width, height))
        .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
        .draw(&mut canvas);

    let font = headline_font(width, message);
    let centred = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Middle)
        .build();
    let mid_y = if caption.is_some() && height > 24 { height as i32 / 2 - 3 } else { height as i32 / 2 };
    let _ = Text::with_text_style(
        message,
        Point::new(width as i32 / 2, mid_y),
        MonoTextStyle::new(font, BinaryColor::On),
        centred,
    )
    .draw(&mut canvas);

    if let Some(caption) = caption.filter(|_| height > 24) {
        let bottom = TextStyleBuilder::new()
            .alignment(Alignment::Center)
            .baseline(Baseline::Bottom)
            .build();
        let _ = Text::with_text_style(
            caption,
            Point::new(width as i32 / 2, height as i32 - 3),
            MonoTextStyle::new(&FONT_5X8, BinaryColor::On),
            bottom,
        )
        .draw(&mut canvas);
    }

    canvas
}

// fall back to a narrower face when the message would not fit
fn headline_font(width: u32, message: &str) -> &'static MonoFont<'static> {
    let chars = message.chars().count() as u32;
    if chars * FONT_9X15_BOLD.character_size.width + 4 <= width {
        &FONT_9X15_BOLD
    } else {
        &FONT_6X10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_border_and_text() {
        let img = render(128, 64, "Muspi", None);
        assert_eq!(img.pixel(0, 0), Some(BinaryColor::On));
        assert_eq!(img.pixel(127, 63), Some(BinaryColor::On));
        // border is 2 * (128 + 64) - 4 pixels, the message adds more
        assert!(img.count_on() > 2 * (128 + 64) - 4);
    }

    #[test]
    fn test_caption_is_drawn() {
        let plain = render(128, 64, "Muspi", None).count_on();
        let with_caption = render(128, 64, "Muspi", Some("v0.3.0")).count_on();
        assert!(with_caption > plain);
    }

    #[test]
    fn test_long_message_uses_narrow_font() {
        let long = "a fairly long welcome line";
        assert!(std::ptr::eq(headline_font(128, long), &FONT_6X10));
        assert!(std::ptr::eq(headline_font(128, "Bye"), &FONT_9X15_BOLD));
    }
}
