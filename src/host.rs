//! Collaborators for running the board on a regular Linux host.
//!
//! The operating system already keeps the network up and the clock in sync,
//! so those collaborators only report. Power management is emulated: light
//! sleep blocks the thread, deep sleep blocks and then hands control back to
//! the boot loop in `main`, which rebuilds every volatile object from
//! scratch exactly like a real wake from deep sleep would.
//!
//! [`power_up`] is one such power-up. Anything failing before the schedule
//! controller takes over is treated like the controller's own fatal errors:
//! logged to the error log, followed by a reset.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use log::{info, warn};

use crate::board::BoardFonts;
use crate::config::Config;
use crate::controller::{append_error_log, Collaborators, ScheduleController};
use crate::font::{FontEngine, FontTable, Preload};
use crate::framebuffer::{FrameSink, HostPanel};
use crate::http::{VbbClient, WorldTimeClient};
use crate::platform::{Clock, Network, NetworkError, Power, WakeReason};

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Uses whatever network the host is on.
pub struct HostNetwork;

impl HostNetwork {
    /// Local address of the default route, found without sending anything.
    fn local_addr() -> Option<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
        socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    }
}

impl Network for HostNetwork {
    fn is_connected(&self) -> bool {
        Self::local_addr().is_some()
    }

    fn connect(&mut self, ssid: &str, _key: &str) -> Result<IpAddr, NetworkError> {
        Self::local_addr().ok_or_else(|| NetworkError::Association {
            ssid: ssid.to_string(),
            reason: "host has no route to the internet".to_string(),
        })
    }

    fn sync_clock(&mut self) -> Result<(), NetworkError> {
        info!("host clock is managed by the operating system");
        Ok(())
    }
}

pub struct HostPower {
    wake: WakeReason,
}

impl HostPower {
    pub fn new(wake: WakeReason) -> Self {
        Self { wake }
    }
}

impl Power for HostPower {
    fn wake_reason(&self) -> WakeReason {
        self.wake
    }

    fn light_sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }

    fn deep_sleep(&mut self, duration: Duration) {
        info!("emulating deep sleep for {}s", duration.as_secs());
        thread::sleep(duration);
    }

    fn hard_reset(&mut self) {
        warn!("emulating hard reset");
    }
}

/// Glyphs every frame needs: digits and the time-left units.
fn label_glyphs() -> Vec<String> {
    "0123456789:hmnow".chars().map(String::from).collect()
}

fn load_fonts(config: &Config) -> anyhow::Result<BoardFonts> {
    let regular = FontTable::load(&config.paths.regular_font)
        .with_context(|| format!("loading {}", config.paths.regular_font.display()))?;
    let condensed = FontTable::load(&config.paths.condensed_font)
        .with_context(|| format!("loading {}", config.paths.condensed_font.display()))?;

    Ok(BoardFonts {
        regular: FontEngine::new(regular, Preload::Glyphs(label_glyphs()), 1, 0),
        condensed: FontEngine::new(condensed, Preload::None, 1, 0),
    })
}

fn assemble(
    config: Config,
    development_mode: bool,
    wake: WakeReason,
) -> anyhow::Result<ScheduleController> {
    let fonts = load_fonts(&config)?;
    let sink = if development_mode {
        FrameSink::Stdout
    } else {
        FrameSink::Pbm(config.display.frame_output.clone())
    };
    let io = Collaborators {
        network: Box::new(HostNetwork),
        transport: Box::new(VbbClient::new()?),
        timezone: Box::new(WorldTimeClient::new()?),
        display: Box::new(HostPanel::new(
            config.display.width,
            config.display.height,
            sink,
        )),
        clock: Box::new(SystemClock),
        power: Box::new(HostPower::new(wake)),
    };
    Ok(ScheduleController::new(config, fonts, io))
}

fn reset_after(error_log: &Path, e: &anyhow::Error) -> WakeReason {
    append_error_log(error_log, SystemClock.now_epoch(), e);
    HostPower::new(WakeReason::HardReset).hard_reset();
    WakeReason::HardReset
}

/// Build everything from the configuration file and run until the board
/// sleeps or resets. `fallback_error_log` is used when the configuration
/// itself can't be loaded.
pub fn power_up(
    config_path: &Path,
    fallback_error_log: &Path,
    development_mode: bool,
    wake: WakeReason,
) -> WakeReason {
    let config = match Config::load_from_path(config_path) {
        Ok(config) => config,
        Err(e) => {
            let e = anyhow::Error::new(e).context("loading configuration");
            return reset_after(fallback_error_log, &e);
        }
    };

    let error_log = config.paths.error_log.clone();
    match assemble(config, development_mode, wake) {
        Ok(controller) => controller.run(),
        Err(e) => reset_after(&error_log, &e.context("starting up")),
    }
}
