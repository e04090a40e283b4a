//! # Collaborator Interfaces
//!
//! Everything the schedule controller needs from the outside world goes
//! through one of these traits. The controller owns boxed instances, so the
//! real hardware/network implementations and the recording doubles used in
//! tests are interchangeable.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::font::Canvas;
use crate::timezone::TimezoneInfo;

/// Failure talking to a remote data source.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("bad timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("could not associate with {ssid:?}: {reason}")]
    Association { ssid: String, reason: String },

    #[error("clock sync failed: {0}")]
    ClockSync(String),
}

#[derive(Error, Debug)]
#[error("display: {0}")]
pub struct DisplayError(pub String);

/// One departure as reported by the transport API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportDeparture {
    pub line_name: String,
    pub direction: String,
    /// UTC epoch seconds, `None` when the trip is cancelled.
    pub scheduled_time: Option<i64>,
    pub stop_name: String,
}

pub trait TransportSource {
    /// All departures from `stop_id` within the next `duration_minutes`.
    fn departures(
        &mut self,
        stop_id: &str,
        duration_minutes: u32,
    ) -> Result<Vec<TransportDeparture>, FetchError>;
}

pub trait TimezoneSource {
    /// Timezone information for the network the device is on.
    fn fetch(&mut self) -> Result<TimezoneInfo, FetchError>;
}

pub trait Network {
    fn is_connected(&self) -> bool;
    fn connect(&mut self, ssid: &str, key: &str) -> Result<IpAddr, NetworkError>;
    /// Set the wall clock from a time server.
    fn sync_clock(&mut self) -> Result<(), NetworkError>;
}

/// The e-paper panel. Glyphs reach it through [`Canvas::blit`].
pub trait Display: Canvas {
    /// Wake the panel controller and start a fresh frame.
    fn begin(&mut self) -> Result<(), DisplayError>;
    fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: u8);
    /// Push the frame to the panel.
    fn flush(&mut self) -> Result<(), DisplayError>;
    fn power_off(&mut self) -> Result<(), DisplayError>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

pub trait Clock {
    /// Current UTC time in epoch seconds.
    fn now_epoch(&self) -> i64;
}

/// Why the process is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WakeReason {
    ColdBoot,
    DeepSleep,
    HardReset,
}

pub trait Power {
    fn wake_reason(&self) -> WakeReason;
    /// Suspend with volatile state kept.
    fn light_sleep(&mut self, duration: Duration);
    /// Suspend with volatile state discarded. Execution resumes at boot.
    fn deep_sleep(&mut self, duration: Duration);
    fn hard_reset(&mut self);
}
