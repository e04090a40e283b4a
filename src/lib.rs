//! # Departure Board Core Library
//!
//! Control core for a battery-powered e-paper board that shows upcoming
//! public transport departures for a handful of stops, plus the local time.
//!
//! ## Design Philosophy
//!
//! ### Minute-aligned frames
//! Every frame should appear right after a minute boundary, so the clock in
//! the corner is never wrong by more than the panel refresh. Between frames
//! the device deep-sleeps whenever the remaining time allows it.
//!
//! ### Durable state
//! Deep sleep wipes RAM. The only thing that survives is the JSON
//! [`cache::CacheState`], which is reloaded at the start of every cycle and
//! written back atomically after every successful render.
//!
//! ### Degrade, don't stop
//! A failing transport or timezone API never blanks the board. The cached
//! departures and the cached timezone keep being shown until the next cycle
//! succeeds.
//!
//! ## Modules
//! - [`font`] and [`escape`]: bitmap font engine with `{{NAME}}` glyph escapes
//! - [`departures`] and [`board`]: filtering and laying out departures
//! - [`controller`]: the wake cycle scheduler
//! - [`platform`]: collaborator traits, with [`http`] and [`host`]
//!   implementations and an in-memory [`framebuffer`] panel

use serde::{Deserialize, Serialize};

pub mod board;
pub mod cache;
pub mod config;
pub mod controller;
pub mod departures;
pub mod escape;
pub mod font;
pub mod framebuffer;
pub mod host;
pub mod http;
pub mod platform;
pub mod timezone;

#[cfg(test)]
mod tests;

/// One departure as shown on the board.
///
/// `time_left_seconds` is a snapshot taken when the departures were fetched,
/// it is not recomputed while the departure sits in the cache.
///
/// # Example
/// ```
/// use departure_board_lib::Departure;
///
/// let departure = Departure {
///     line_name: "M10".to_string(),
///     direction: "Warschauer Str.".to_string(),
///     time_left_seconds: 240,
///     stop_name: "Eberswalder Str.".to_string(),
/// };
///
/// assert_eq!(departure.time_left_seconds / 60, 4);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    pub line_name: String,
    /// Direction with cleanup phrases removed
    pub direction: String,
    pub time_left_seconds: i32,
    /// Stop name with cleanup phrases removed
    pub stop_name: String,
}
