//! # Wake Cycle Scheduling
//!
//! One wake cycle walks through these stages:
//!
//! ```text
//! Boot → EnsureConnectivity → EnsureTimeSync → ObtainDepartures → ObtainTimezone
//!      → AlignToMinuteBoundary → Render → Persist → Sleep
//! ```
//!
//! `Sleep` either deep-sleeps, which wipes RAM and comes back at `Boot`, or
//! loops straight back to `EnsureConnectivity` when the time left until the
//! next minute is too short to be worth powering down for.
//!
//! ## Timing
//! The board shows a clock with minute resolution, so every frame should hit
//! the panel right after a minute boundary. Refreshing the panel takes
//! noticeably longer after a cold boot than after a deep-sleep wake, so the
//! sleep budget subtracts a per-wake-reason estimate of the time between
//! waking up and the frame being visible.
//!
//! ## Failure Handling
//! - Transport or timezone API failures degrade to the cached data and the
//!   cycle continues; the next cycle is the retry.
//! - Anything else aborts the cycle. [`ScheduleController::run`] appends the
//!   error to the durable error log and hard-resets, since volatile state
//!   can't be trusted afterwards.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{debug, error, info};

use crate::board::{draw_clock, draw_departures, BoardFonts};
use crate::cache::CacheState;
use crate::config::Config;
use crate::departures::{group_by_stop, select_departures};
use crate::platform::{
    Clock, Display, FetchError, Network, Power, TimezoneSource, TransportSource, WakeReason,
};
use crate::timezone::{needs_refresh, TimezoneInfo};
use crate::Departure;

/// Resync the clock when the last sync is older than this
pub const TIME_SYNC_MAX_AGE_SECS: i64 = 60 * 60;
/// Reuse cached departures up to this age
pub const DEPARTURES_MAX_AGE_SECS: i64 = 30;
/// Wait for the minute boundary if it is closer than this
pub const MINUTE_RENDEZVOUS_SECS: i64 = 10;
/// Wake-to-visible-frame time after a deep-sleep wake
pub const REFRESH_AFTER_DEEP_SLEEP_SECS: i64 = 16;
/// Wake-to-visible-frame time after a cold boot
pub const REFRESH_AFTER_COLD_BOOT_SECS: i64 = 22;
/// Deep sleep only pays off above this
pub const MIN_DEEP_SLEEP_SECS: i64 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Boot,
    EnsureConnectivity,
    EnsureTimeSync,
    ObtainDepartures,
    ObtainTimezone,
    AlignToMinuteBoundary,
    Render,
    Persist,
    Sleep,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {self:?}")
    }
}

/// Where this cycle's departures came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepartureOutcome {
    /// Cache was young enough, no fetch made.
    Fresh { age_secs: i64 },
    /// Fetched from the transport API.
    Refetched { count: usize },
    /// The fetch failed, the cached departures are shown.
    Stale { reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SleepDecision {
    DeepSleep(Duration),
    /// Start the next cycle right away.
    NoSleep,
}

/// Seconds until the next full minute, in `1..=60`.
pub fn seconds_until_next_minute(now: i64) -> i64 {
    60 - now.rem_euclid(60)
}

pub fn should_sync_time(last_sync: i64, now: i64) -> bool {
    last_sync == 0 || (now - last_sync).abs() > TIME_SYNC_MAX_AGE_SECS
}

/// A negative age means the clock stepped backwards, the cache is not trusted.
pub fn departures_fresh(last_update: i64, now: i64) -> bool {
    (0..=DEPARTURES_MAX_AGE_SECS).contains(&(now - last_update))
}

/// Decide how to wait for the next frame.
pub fn plan_sleep(seconds_to_boundary: i64, wake: WakeReason) -> SleepDecision {
    let refresh_estimate = match wake {
        WakeReason::DeepSleep => REFRESH_AFTER_DEEP_SLEEP_SECS,
        WakeReason::ColdBoot | WakeReason::HardReset => REFRESH_AFTER_COLD_BOOT_SECS,
    };
    let deep_budget = seconds_to_boundary - refresh_estimate;
    if deep_budget > MIN_DEEP_SLEEP_SECS {
        SleepDecision::DeepSleep(Duration::from_secs(deep_budget as u64))
    } else {
        SleepDecision::NoSleep
    }
}

fn status(message: &str) {
    info!(target: "status", "{message}");
}

/// Everything the controller talks to.
pub struct Collaborators {
    pub network: Box<dyn Network>,
    pub transport: Box<dyn TransportSource>,
    pub timezone: Box<dyn TimezoneSource>,
    pub display: Box<dyn Display>,
    pub clock: Box<dyn Clock>,
    pub power: Box<dyn Power>,
}

pub struct ScheduleController {
    config: Config,
    fonts: BoardFonts,
    io: Collaborators,
}

impl ScheduleController {
    pub fn new(config: Config, fonts: BoardFonts, io: Collaborators) -> Self {
        Self { config, fonts, io }
    }

    /// Work done once per boot, before the first cycle. A cold boot starts
    /// from an unknown panel state, so the panel is cleared once.
    pub fn boot(&mut self) -> anyhow::Result<()> {
        let wake = self.io.power.wake_reason();
        info!("booting after {wake:?}");
        if wake != WakeReason::DeepSleep {
            self.io.display.begin().context(Stage::Boot)?;
            self.io.display.flush().context(Stage::Boot)?;
        }
        Ok(())
    }

    /// Run cycles until the device sleeps or resets. Returns the reason the
    /// next boot will see.
    pub fn run(mut self) -> WakeReason {
        let outcome = self.boot().and_then(|()| loop {
            let mut cache = CacheState::load(&self.config.paths.cache);
            match self.run_cycle(&mut cache)? {
                SleepDecision::NoSleep => continue,
                SleepDecision::DeepSleep(duration) => break Ok(duration),
            }
        });

        match outcome {
            Ok(duration) => {
                info!("going into deep sleep for {} seconds", duration.as_secs());
                self.io.power.deep_sleep(duration);
                WakeReason::DeepSleep
            }
            Err(e) => {
                self.record_fatal(&e);
                self.io.power.hard_reset();
                WakeReason::HardReset
            }
        }
    }

    /// One pass from `EnsureConnectivity` to the sleep decision.
    pub fn run_cycle(&mut self, cache: &mut CacheState) -> anyhow::Result<SleepDecision> {
        let started = Instant::now();

        self.ensure_connectivity()
            .context(Stage::EnsureConnectivity)?;
        self.ensure_time_sync(cache)
            .context(Stage::EnsureTimeSync)?;

        let outcome = self.obtain_departures(cache);
        debug!("{}: {outcome:?}", Stage::ObtainDepartures);
        let timezone = self.obtain_timezone(cache);
        info!("{}: detected {}", Stage::ObtainTimezone, timezone.timezone_name);

        self.align_to_minute_boundary();

        self.render(&cache.departures, &timezone)
            .context(Stage::Render)?;
        cache
            .persist(&self.config.paths.cache)
            .with_context(|| format!("{} ({})", Stage::Persist, self.config.paths.cache.display()))?;

        info!("cycle done in {} ms", started.elapsed().as_millis());
        self.choose_sleep().context(Stage::Sleep)
    }

    fn ensure_connectivity(&mut self) -> anyhow::Result<()> {
        let credentials = &self.config.network;
        if !self.io.network.is_connected() {
            status(&format!("Connecting to WiFi '{}'", credentials.ssid));
            let ip = self
                .io
                .network
                .connect(&credentials.ssid, &credentials.key)?;
            status(&format!("Connected to {} ({ip})", credentials.ssid));
        }
        Ok(())
    }

    fn ensure_time_sync(&mut self, cache: &mut CacheState) -> anyhow::Result<()> {
        let now = self.io.clock.now_epoch();
        if !should_sync_time(cache.last_time_sync_epoch, now) {
            return Ok(());
        }

        status("Setting time from NTP...");
        self.io.network.sync_clock()?;
        cache.last_time_sync_epoch = self.io.clock.now_epoch();
        // a sync is worth keeping even if this cycle dies later
        cache.persist(&self.config.paths.cache)?;
        Ok(())
    }

    fn obtain_departures(&mut self, cache: &mut CacheState) -> DepartureOutcome {
        let now = self.io.clock.now_epoch();
        let age = now - cache.last_departure_update_epoch;
        if departures_fresh(cache.last_departure_update_epoch, now) {
            status(&format!(
                "Using cached departures, got the last update {age} sec ago"
            ));
            return DepartureOutcome::Fresh { age_secs: age };
        }

        match self.fetch_departures(now) {
            Ok(departures) => {
                let count = departures.len();
                cache.departures = departures;
                cache.last_departure_update_epoch = now;
                DepartureOutcome::Refetched { count }
            }
            Err(e) => {
                status(&format!("Could not connect to transport API: {e}"));
                status("Using cached departures");
                DepartureOutcome::Stale {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn fetch_departures(&mut self, started: i64) -> Result<Vec<Departure>, FetchError> {
        let mut departures = Vec::new();
        for stop_id in &self.config.stop_ids {
            info!("getting departures from api for {stop_id}");
            let records = self
                .io
                .transport
                .departures(stop_id, self.config.max_fetch_duration_minutes)?;
            info!("got {} departures from {stop_id}", records.len());
            departures.extend(select_departures(
                &records,
                &self.config.line_direction_rules,
                &self.config.text_cleanup_phrases,
                started,
            ));
        }
        Ok(departures)
    }

    /// The SSID is only recorded once the timezone for that network is known,
    /// so a failed refresh is retried on the next wake.
    fn obtain_timezone(&mut self, cache: &mut CacheState) -> TimezoneInfo {
        let now = self.io.clock.now_epoch();
        let ssid = &self.config.network.ssid;
        let cached = cache.last_timezone_response.as_ref();
        if !needs_refresh(cached, &cache.last_connected_ssid, ssid, now) {
            if let Some(info) = cached {
                return info.clone();
            }
        }

        info!("fetching TZ info from current IP");
        match self.io.timezone.fetch() {
            Ok(info) => {
                cache.last_timezone_response = Some(info.clone());
                cache.last_connected_ssid = self.config.network.ssid.clone();
                info
            }
            Err(e) => {
                status(&format!("Could not fetch timezone: {e}"));
                cache
                    .last_timezone_response
                    .clone()
                    .unwrap_or_else(TimezoneInfo::utc)
            }
        }
    }

    fn align_to_minute_boundary(&mut self) {
        let wait = seconds_until_next_minute(self.io.clock.now_epoch());
        if wait < MINUTE_RENDEZVOUS_SECS {
            debug!("{}: light sleep for {wait} seconds", Stage::AlignToMinuteBoundary);
            self.io.power.light_sleep(Duration::from_secs(wait as u64));
        }
    }

    fn render(&mut self, departures: &[Departure], timezone: &TimezoneInfo) -> anyhow::Result<()> {
        let display = self.io.display.as_mut();
        display.begin()?;

        let groups = group_by_stop(departures);
        draw_departures(display, &mut self.fonts, &groups)?;
        draw_clock(
            display,
            &mut self.fonts,
            self.io.clock.now_epoch(),
            timezone.utc_offset_seconds(),
        )?;

        display.flush()?;
        Ok(())
    }

    fn choose_sleep(&mut self) -> anyhow::Result<SleepDecision> {
        self.io.display.power_off()?;
        let to_boundary = seconds_until_next_minute(self.io.clock.now_epoch());
        let decision = plan_sleep(to_boundary, self.io.power.wake_reason());
        if decision == SleepDecision::NoSleep {
            debug!("{to_boundary}s to the next minute, not worth sleeping");
        }
        Ok(decision)
    }

    fn record_fatal(&self, e: &anyhow::Error) {
        append_error_log(&self.config.paths.error_log, self.io.clock.now_epoch(), e);
    }
}

/// Append an unhandled error to the durable error log: a blank line, the
/// epoch timestamp, then the full error chain.
pub fn append_error_log(path: &Path, now_epoch: i64, e: &anyhow::Error) {
    error!("unhandled error, resetting: {e:#}");
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut log| write!(log, "\n{now_epoch}\n{e:?}\n"));
    if let Err(io_err) = written {
        error!("could not write {}: {io_err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_minute_countdown() {
        assert_eq!(seconds_until_next_minute(1_700_000_000), 40);
        assert_eq!(seconds_until_next_minute(1_699_999_980), 60);
        assert_eq!(seconds_until_next_minute(1_699_999_979), 1);
    }

    #[test]
    fn deep_sleep_when_budget_is_large() {
        assert_eq!(
            plan_sleep(50, WakeReason::DeepSleep),
            SleepDecision::DeepSleep(Duration::from_secs(34))
        );
    }

    #[test]
    fn no_sleep_when_budget_is_negative() {
        assert_eq!(plan_sleep(12, WakeReason::ColdBoot), SleepDecision::NoSleep);
    }

    #[test]
    fn cold_boot_uses_longer_estimate() {
        assert_eq!(
            plan_sleep(50, WakeReason::ColdBoot),
            SleepDecision::DeepSleep(Duration::from_secs(28))
        );
        assert_eq!(
            plan_sleep(50, WakeReason::HardReset),
            SleepDecision::DeepSleep(Duration::from_secs(28))
        );
    }

    #[test]
    fn budget_must_exceed_minimum() {
        assert_eq!(plan_sleep(24, WakeReason::DeepSleep), SleepDecision::NoSleep);
        assert_eq!(
            plan_sleep(25, WakeReason::DeepSleep),
            SleepDecision::DeepSleep(Duration::from_secs(9))
        );
    }

    #[test]
    fn time_sync_staleness() {
        assert!(should_sync_time(0, 1_700_000_000));
        assert!(!should_sync_time(1_700_000_000, 1_700_003_600));
        assert!(should_sync_time(1_700_000_000, 1_700_003_601));
        // clock jumped backwards
        assert!(should_sync_time(1_700_003_601, 1_700_000_000));
    }

    #[test]
    fn departure_freshness() {
        assert!(departures_fresh(1000, 1010));
        assert!(departures_fresh(1000, 1030));
        assert!(!departures_fresh(1000, 1031));
        assert!(!departures_fresh(1000, 1045));
        assert!(!departures_fresh(0, 1_700_000_000));
    }

    #[test]
    fn departures_from_the_future_are_stale() {
        assert!(!departures_fresh(1001, 1000));
        assert!(!departures_fresh(1_700_003_600, 1_700_000_000));
    }
}
