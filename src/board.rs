//! # Departure Board Layout
//!
//! Paints one frame: the departures grouped by stop, then the local clock in
//! the top right corner.
//!
//! ```text
//! Eberswalder Str.                                 14:32
//! M10          Warschauer Str.                       3m
//! M10          Warschauer Str.                      11m
//! ────────────────────────────────────────────────────────
//! Schönhauser Allee
//! U2           Pankow                              now
//! ```
//!
//! Line names and times use the regular font, stop names, directions, and
//! the clock the condensed one. Six departure rows fit the panel, split
//! evenly between the configured stops.

use chrono::DateTime;

use crate::departures::format_time_left;
use crate::font::{Align, FontEngine, FontError};
use crate::platform::Display;
use crate::Departure;

const MARGIN: i32 = 5;
const DESTINATION_X: i32 = 130 + MARGIN;
/// The condensed face sits higher to share a baseline with the regular one
const CONDENSED_Y_OFFSET: i32 = -5;
const ROW_HEIGHT: i32 = 100;
const MAX_ROWS: usize = 6;
const SEPARATOR_GAP: i32 = 12;
const SEPARATOR_THICKNESS: u32 = 2;
const CLOCK_MARGIN_RIGHT: i32 = 3;
const CLOCK_Y: i32 = 10;
/// Departures closer than this read "now"
const NOW_THRESHOLD_SECS: i32 = 30;

/// The two faces the board is drawn with.
pub struct BoardFonts {
    pub regular: FontEngine,
    pub condensed: FontEngine,
}

/// Draw every stop group. Returns the y coordinate below the last separator.
pub fn draw_departures(
    display: &mut dyn Display,
    fonts: &mut BoardFonts,
    groups: &[(String, Vec<Departure>)],
) -> Result<i32, FontError> {
    let right_edge = display.width() as i32;
    let mut y = MARGIN;
    if groups.is_empty() {
        return Ok(y);
    }
    let per_stop = (MAX_ROWS / groups.len()).max(1);

    for (stop, departures) in groups {
        fonts
            .condensed
            .draw(display, stop, 0, y, Align::Left, false)?;
        y += i32::from(fonts.condensed.line_height());

        for departure in departures.iter().take(per_stop) {
            fonts
                .regular
                .draw(display, &departure.line_name, 0, y, Align::Left, false)?;
            fonts.condensed.draw(
                display,
                &departure.direction,
                DESTINATION_X,
                y + CONDENSED_Y_OFFSET,
                Align::Left,
                false,
            )?;

            let label = format_time_left(departure.time_left_seconds, NOW_THRESHOLD_SECS);
            let (width, height) = fonts.regular.measure(&label)?;
            let background = fonts.regular.background();
            display.fill_rect(right_edge - width, y, width as u32, height as u32, background);
            fonts
                .regular
                .draw(display, &label, right_edge, y, Align::Right, false)?;

            y += ROW_HEIGHT;
        }

        y += SEPARATOR_GAP;
        let ink = fonts.regular.foreground();
        display.fill_rect(0, y, right_edge as u32, SEPARATOR_THICKNESS, ink);
        y += SEPARATOR_GAP;
    }

    Ok(y)
}

/// `HH:MM` for a UTC epoch shifted by `utc_offset_seconds`.
pub fn clock_label(now_epoch: i64, utc_offset_seconds: i32) -> String {
    DateTime::from_timestamp(now_epoch + i64::from(utc_offset_seconds), 0)
        .map(|local| local.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

pub fn draw_clock(
    display: &mut dyn Display,
    fonts: &mut BoardFonts,
    now_epoch: i64,
    utc_offset_seconds: i32,
) -> Result<(), FontError> {
    let label = clock_label(now_epoch, utc_offset_seconds);
    let x = display.width() as i32 - CLOCK_MARGIN_RIGHT;
    fonts
        .condensed
        .draw(display, &label, x, CLOCK_Y, Align::Right, false)?;
    Ok(())
}
