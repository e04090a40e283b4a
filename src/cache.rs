//! # Durable Board State
//!
//! Deep sleep wipes RAM, so everything a wake cycle wants to remember from
//! the previous one lives in [`CacheState`], stored as one flat JSON object.
//!
//! ## Failure Policy
//! - **Loading never fails**: an unreadable, truncated, or mistyped file is
//!   logged and replaced by [`CacheState::default()`]. The worst outcome is
//!   one extra NTP sync and one extra fetch.
//! - **Missing keys default**: the format is versionless, an older file
//!   without a newer key still loads.
//! - **Persisting is atomic**: the state is written to `<path>.tmp`, synced,
//!   and renamed over the old file, so a power cut mid-write leaves the
//!   previous state intact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::timezone::TimezoneInfo;
use crate::Departure;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheState {
    /// Last successful clock sync, 0 if never
    pub last_time_sync_epoch: i64,
    pub departures: Vec<Departure>,
    /// When `departures` was fetched, 0 if never
    pub last_departure_update_epoch: i64,
    pub last_timezone_response: Option<TimezoneInfo>,
    pub last_connected_ssid: String,
}

impl CacheState {
    /// Load the state stored at `path`, or a fresh default state.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(state) => {
                debug!(
                    "loaded cache from {} ({} departures)",
                    path.display(),
                    state.departures.len()
                );
                state
            }
            Err(e) => {
                warn!("failed to load cache from {}: {e}", path.display());
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> io::Result<Self> {
        let data = fs::read(path)?;
        let state = serde_json::from_slice(&data)?;
        Ok(state)
    }

    /// Write the state to `path`, replacing the previous file atomically.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let tmp_path = tmp_path(path);
        let data = serde_json::to_vec(self)?;

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        debug!("saved cache to {}", path.display());
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
