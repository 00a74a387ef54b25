//! Scheduled-event records polled by the notifiers.
//!
//! Dates and times are local wall-clock values as entered by staff.

use crate::types::RecordId;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize};

/// A personal reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: RecordId,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(deserialize_with = "lenient_date")]
    pub date: NaiveDate,
    #[serde(deserialize_with = "lenient_time")]
    pub time: NaiveTime,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl Reminder {
    pub fn event_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// A scheduled duty assignment ("suguan").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuguanAssignment {
    pub id: RecordId,
    #[serde(alias = "title")]
    pub name: String,
    #[serde(deserialize_with = "lenient_date")]
    pub date: NaiveDate,
    #[serde(deserialize_with = "lenient_time")]
    pub time: NaiveTime,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl SuguanAssignment {
    pub fn event_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// `YYYY-MM-DD`, or an ISO-8601 datetime whose first ten characters are the date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// `HH:MM:SS` or `HH:MM`.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

fn lenient_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {raw}")))
}

fn lenient_time<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_time(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time: {raw}")))
}
