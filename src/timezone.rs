//! Timezone information and the policy for refreshing it.
//!
//! The board shows local wall-clock time but keeps everything else in UTC.
//! The offset comes from an IP-geolocated timezone service and is cached in
//! [`crate::cache::CacheState`]; it only needs refreshing when the device
//! moved networks, the cached answer is old, or a DST transition passed.

use serde::{Deserialize, Serialize};

/// Cached timezone answers older than this are refreshed.
pub const TIMEZONE_MAX_AGE_SECS: i64 = 12 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimezoneInfo {
    pub timezone_name: String,
    pub raw_offset_seconds: i32,
    pub dst_offset_seconds: i32,
    pub is_dst: bool,
    /// End of the current DST period, epoch seconds.
    pub dst_until: Option<i64>,
    /// Start of the next DST period, epoch seconds.
    pub dst_from: Option<i64>,
    /// When the service produced this answer, epoch seconds.
    pub response_time: i64,
}

impl TimezoneInfo {
    pub fn utc() -> Self {
        Self {
            timezone_name: "UTC".to_string(),
            raw_offset_seconds: 0,
            dst_offset_seconds: 0,
            is_dst: false,
            dst_until: None,
            dst_from: None,
            response_time: 0,
        }
    }

    /// Seconds to add to UTC for local time.
    pub fn utc_offset_seconds(&self) -> i32 {
        if self.is_dst {
            self.raw_offset_seconds + self.dst_offset_seconds
        } else {
            self.raw_offset_seconds
        }
    }

    /// Whether the next DST switch relevant to the current state has passed.
    fn transition_passed(&self, now: i64) -> bool {
        let boundary = if self.is_dst {
            self.dst_until
        } else {
            self.dst_from
        };
        boundary.is_some_and(|at| now > at)
    }
}

/// Decide whether the cached timezone needs to be fetched again.
pub fn needs_refresh(
    cached: Option<&TimezoneInfo>,
    last_connected_ssid: &str,
    configured_ssid: &str,
    now: i64,
) -> bool {
    if last_connected_ssid != configured_ssid {
        return true;
    }

    let Some(info) = cached else {
        return true;
    };

    now - info.response_time > TIMEZONE_MAX_AGE_SECS || info.transition_passed(now)
}
