use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

use crate::{distance::DistanceMeasurement, pump::PumpStats};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PumpStatusPayload {
    pub pumping: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DistancePayload {
    pub distance: f64,
    pub timeout: bool,
}

impl From<DistanceMeasurement> for DistancePayload {
    fn from(measurement: DistanceMeasurement) -> Self {
        Self {
            distance: measurement.distance_cm,
            timeout: measurement.timed_out,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsPayload {
    #[serde(rename = "lastPump")]
    pub last_pump: String,
    #[serde(rename = "pumpCount")]
    pub pump_count: u64,
}

impl From<PumpStats> for StatsPayload {
    fn from(stats: PumpStats) -> Self {
        Self {
            last_pump: format_timestamp(stats.last_activated),
            pump_count: stats.pump_count,
        }
    }
}

/// RFC 3339, or the zero timestamp `0001-01-01T00:00:00Z` before the first
/// activation.
pub fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .or_else(zero_timestamp)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_default()
}

fn zero_timestamp() -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
