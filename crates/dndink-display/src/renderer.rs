//! Layout composition.
//!
//! FREE: black outline inset from the edges with the word `FREE` centred.
//! BUSY: a red no-entry glyph (filled disc, white inner disc, red bar).
//! Both get an `Updated: ...` line in the bottom-left corner.

use chrono::{DateTime, TimeZone};
use dndink_core::ObservedState;
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{
    Circle, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle, StrokeAlignment,
};
use embedded_graphics::text::{Baseline, Text};

use crate::errors::{RenderError, Result};
use crate::frame::{DisplayStatus, Frame, HEIGHT, Plane, WIDTH};

/// Default timestamp format (`chrono` strftime syntax).
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "Updated: %H:%M %d/%m/%Y";

const MARGIN: i32 = 40;
const BORDER_WIDTH: u32 = 8;
const HEADLINE_SCALE: u32 = 8;
/// Layout centre sits this far above the panel's vertical middle.
const CENTRE_LIFT: i32 = 20;
const OUTER_RADIUS: u32 = 180;
const INNER_RADIUS: u32 = OUTER_RADIUS - 35;
const BAR_HEIGHT: u32 = 60;
const TIMESTAMP_ORIGIN: Point = Point::new(10, HEIGHT as i32 - 30);

/// Composes frames for a status.
#[derive(Clone, Debug)]
pub struct Renderer {
    timestamp_format: String,
}

impl Default for Renderer {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl Renderer {
    /// Renderer with a custom timestamp format.
    pub fn with_timestamp_format(format: impl Into<String>) -> Self {
        Self {
            timestamp_format: format.into(),
        }
    }

    /// Status for `state` stamped with `now`.
    pub fn status<Tz>(&self, state: ObservedState, now: &DateTime<Tz>) -> DisplayStatus
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        DisplayStatus {
            state,
            updated: now.format(&self.timestamp_format).to_string(),
        }
    }

    /// Draw both planes for `status`.
    pub fn compose(&self, status: &DisplayStatus) -> Result<Frame> {
        let mut black = Plane::new();
        let mut red = Plane::new();

        let drawn = match status.state {
            ObservedState::Free => draw_free(&mut black),
            ObservedState::Busy => draw_busy(&mut black, &mut red),
            ObservedState::Unknown => {
                return Err(RenderError::Draw("no layout for unknown state".to_string()));
            }
        };
        drawn
            .and_then(|()| draw_timestamp(&mut black, &status.updated))
            .map_err(|e| RenderError::Draw(format!("{e:?}")))?;

        Ok(Frame::new(status.clone(), black, red))
    }
}

fn layout_centre() -> Point {
    Point::new(WIDTH as i32 / 2, HEIGHT as i32 / 2 - CENTRE_LIFT)
}

fn draw_free<D>(black: &mut D) -> std::result::Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let border = PrimitiveStyleBuilder::new()
        .stroke_color(BinaryColor::On)
        .stroke_width(BORDER_WIDTH)
        .stroke_alignment(StrokeAlignment::Inside)
        .build();
    Rectangle::with_corners(
        Point::new(MARGIN, MARGIN),
        Point::new(WIDTH as i32 - MARGIN, HEIGHT as i32 - MARGIN),
    )
    .into_styled(border)
    .draw(black)?;

    let text = "FREE";
    let glyph = FONT_10X20.character_size;
    let text_size = Size::new(glyph.width * text.len() as u32, glyph.height) * HEADLINE_SCALE;
    let centre = layout_centre();
    let origin = Point::new(
        centre.x - text_size.width as i32 / 2,
        centre.y - text_size.height as i32 / 2,
    );

    let mut headline = crate::frame::Scaled::new(black, HEADLINE_SCALE, origin);
    let style = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
    let _ = Text::with_baseline(text, Point::zero(), style, Baseline::Top).draw(&mut headline)?;
    Ok(())
}

fn draw_busy<D>(black: &mut D, red: &mut D) -> std::result::Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let centre = layout_centre();
    let ink = PrimitiveStyle::with_fill(BinaryColor::On);
    let clear = PrimitiveStyle::with_fill(BinaryColor::Off);

    Circle::with_center(centre, OUTER_RADIUS * 2 + 1)
        .into_styled(ink)
        .draw(red)?;

    // Inner disc is cleared on both planes so it reads as white paper.
    let inner = Circle::with_center(centre, INNER_RADIUS * 2 + 1);
    inner.into_styled(clear).draw(red)?;
    inner.into_styled(clear).draw(black)?;

    let half_bar = (INNER_RADIUS * 2 - 20) as i32 / 2;
    let half_height = BAR_HEIGHT as i32 / 2;
    Rectangle::with_corners(
        centre - Point::new(half_bar, half_height),
        centre + Point::new(half_bar, half_height),
    )
    .into_styled(ink)
    .draw(red)
}

fn draw_timestamp<D>(black: &mut D, text: &str) -> std::result::Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let style = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);
    let _ = Text::with_baseline(text, TIMESTAMP_ORIGIN, style, Baseline::Top).draw(black)?;
    Ok(())
}
