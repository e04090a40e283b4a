//! # HTTP Data Sources
//!
//! Thin clients for the two web services the board talks to:
//!
//! - **Departures**: the VBB `transport.rest` API,
//!   `GET https://v6.vbb.transport.rest/stops/{id}/departures?duration=N`
//! - **Timezone**: worldtimeapi.org, `GET http://worldtimeapi.org/api/ip`,
//!   which geolocates the caller's public IP
//!
//! Both are used synchronously by the schedule controller. Each client owns
//! a current-thread tokio runtime and blocks on every request; requests time
//! out after [`REQUEST_TIMEOUT`]. There is no retry here, the next wake cycle
//! is the retry.

use std::time::Duration;

use chrono::DateTime;
use log::debug;
use serde::Deserialize;
use tokio::runtime::{Builder, Runtime};

use crate::platform::{FetchError, TimezoneSource, TransportDeparture, TransportSource};
use crate::timezone::TimezoneInfo;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const VBB_BASE_URL: &str = "https://v6.vbb.transport.rest";
const WORLDTIME_IP_URL: &str = "http://worldtimeapi.org/api/ip";

fn runtime() -> Result<Runtime, FetchError> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

fn client() -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Parse an ISO-8601 timestamp with offset into UTC epoch seconds.
pub fn parse_timestamp(value: &str) -> Result<i64, FetchError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp())
        .map_err(|source| FetchError::Timestamp {
            value: value.to_string(),
            source,
        })
}

fn parse_optional(value: Option<&str>) -> Result<Option<i64>, FetchError> {
    value.map(parse_timestamp).transpose()
}

#[derive(Debug, Deserialize)]
struct DeparturesResponse {
    departures: Option<Vec<ApiDeparture>>,
}

#[derive(Debug, Deserialize)]
struct ApiDeparture {
    when: Option<String>,
    direction: Option<String>,
    line: ApiNamed,
    stop: ApiNamed,
}

#[derive(Debug, Deserialize)]
struct ApiNamed {
    name: String,
}

impl ApiDeparture {
    fn into_record(self) -> Result<TransportDeparture, FetchError> {
        Ok(TransportDeparture {
            scheduled_time: parse_optional(self.when.as_deref())?,
            line_name: self.line.name,
            direction: self.direction.unwrap_or_default(),
            stop_name: self.stop.name,
        })
    }
}

/// Parse a `/stops/{id}/departures` response body.
pub fn parse_departures(body: &str) -> Result<Vec<TransportDeparture>, FetchError> {
    let response: DeparturesResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Response(e.to_string()))?;
    let departures = response
        .departures
        .ok_or_else(|| FetchError::Response("missing departures in response".into()))?;
    departures.into_iter().map(ApiDeparture::into_record).collect()
}

pub struct VbbClient {
    runtime: Runtime,
    client: reqwest::Client,
    base_url: String,
}

impl VbbClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(VBB_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        Ok(Self {
            runtime: runtime()?,
            client: client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn departures_url(&self, stop_id: &str) -> String {
        format!("{}/stops/{}/departures", self.base_url, stop_id)
    }
}

impl TransportSource for VbbClient {
    fn departures(
        &mut self,
        stop_id: &str,
        duration_minutes: u32,
    ) -> Result<Vec<TransportDeparture>, FetchError> {
        let url = self.departures_url(stop_id);
        debug!("GET {url} (duration {duration_minutes} min)");

        let request = self
            .client
            .get(&url)
            .query(&[("duration", duration_minutes.to_string())]);
        let body = self.runtime.block_on(async {
            request
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        })?;
        parse_departures(&body)
    }
}

#[derive(Debug, Deserialize)]
struct WorldTimeResponse {
    timezone: String,
    raw_offset: i32,
    dst_offset: i32,
    dst: bool,
    dst_until: Option<String>,
    dst_from: Option<String>,
    datetime: String,
}

/// Parse a worldtimeapi.org `/api/ip` response body.
pub fn parse_timezone(body: &str) -> Result<TimezoneInfo, FetchError> {
    let response: WorldTimeResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Response(e.to_string()))?;
    Ok(TimezoneInfo {
        timezone_name: response.timezone,
        raw_offset_seconds: response.raw_offset,
        dst_offset_seconds: response.dst_offset,
        is_dst: response.dst,
        dst_until: parse_optional(response.dst_until.as_deref())?,
        dst_from: parse_optional(response.dst_from.as_deref())?,
        response_time: parse_timestamp(&response.datetime)?,
    })
}

pub struct WorldTimeClient {
    runtime: Runtime,
    client: reqwest::Client,
    url: String,
}

impl WorldTimeClient {
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            runtime: runtime()?,
            client: client()?,
            url: WORLDTIME_IP_URL.to_string(),
        })
    }
}

impl TimezoneSource for WorldTimeClient {
    fn fetch(&mut self) -> Result<TimezoneInfo, FetchError> {
        debug!("GET {}", self.url);
        let request = self.client.get(&self.url);
        let body = self.runtime.block_on(async {
            request
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        })?;
        parse_timezone(&body)
    }
}
