//! # Departure Board Entry Point
//!
//! Runs the board on a regular Linux host. The panel is an in-memory
//! framebuffer written to a PBM file after every frame, or printed as ASCII
//! art with `--stdout`.
//!
//! ```text
//! departure-board [--stdout] [CONFIG]
//! ```
//!
//! Each pass through the boot loop below stands in for one power-up of the
//! device: configuration, fonts, and every collaborator are built from
//! scratch, and only the cache and error log files carry over.

use std::env;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use departure_board_lib::config::{PathsConfig, CONFIG_FILE};
use departure_board_lib::host::power_up;
use departure_board_lib::platform::WakeReason;
use log::info;

/// Pause before booting again after a reset
const RESET_DELAY: Duration = Duration::from_secs(5);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Development mode: print frames to the terminal instead of a file
    let development_mode = env::args().any(|arg| arg == "--stdout");
    let config_path = env::args()
        .skip(1)
        .find(|arg| !arg.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let fallback_error_log = PathsConfig::default().error_log;

    let mut wake = WakeReason::ColdBoot;
    loop {
        wake = power_up(&config_path, &fallback_error_log, development_mode, wake);
        info!("restarting after {wake:?}");
        if wake == WakeReason::HardReset {
            thread::sleep(RESET_DELAY);
        }
    }
}
