//! Trip cost aggregation
//!
//! `total = flight + nightly rate × nights + Σ activities`. Currencies are
//! assumed uniform and are never converted.

use crate::protocol::CollectedInfo;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

const SECONDS_PER_DAY: i64 = 86_400;

/// Cost breakdown for the current selections
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSummary {
    pub flight: f64,
    pub hotel_per_night: f64,
    pub nights: u32,
    pub hotel: f64,
    pub activities: f64,
    pub total: f64,
    pub currency: Option<String>,
    pub budget: Option<f64>,
    /// `budget - total`, when a budget is known
    pub remaining: Option<f64>,
    pub over_budget: bool,
}

impl PriceSummary {
    pub fn from_info(info: &CollectedInfo) -> Self {
        let flight = info.selected_flight.as_ref().map_or(0.0, |f| f.price);
        let hotel_per_night = info.selected_hotel.as_ref().map_or(0.0, |h| h.price_per_night);
        let nights = nights(info.start_date.as_deref(), info.end_date.as_deref());
        let hotel = hotel_per_night * f64::from(nights);
        let activities = info.selected_activities.iter().map(|a| a.price).sum::<f64>();
        let total = flight + hotel + activities;
        let remaining = info.budget.map(|b| b - total);

        Self {
            flight,
            hotel_per_night,
            nights,
            hotel,
            activities,
            total,
            currency: currency(info),
            budget: info.budget,
            remaining,
            over_budget: remaining.is_some_and(|r| r < 0.0),
        }
    }
}

/// Total cost of the selections in `info`
pub fn total(info: &CollectedInfo) -> f64 {
    PriceSummary::from_info(info).total
}

/// Hotel nights between two dates, rounded up to whole days.
///
/// Falls back to 1 when either date is missing or unparseable, or when the
/// span is not positive.
pub fn nights(start: Option<&str>, end: Option<&str>) -> u32 {
    let (Some(start), Some(end)) = (start.and_then(parse_instant), end.and_then(parse_instant))
    else {
        return 1;
    };

    let seconds = (end - start).num_seconds();
    if seconds <= 0 {
        return 1;
    }
    let days = (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Accepts `YYYY-MM-DD`, naive `YYYY-MM-DDTHH:MM:SS` and RFC 3339
fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc())
}

/// First currency found on a selected item
fn currency(info: &CollectedInfo) -> Option<String> {
    info.selected_flight
        .as_ref()
        .map(|f| f.currency.clone())
        .filter(|c| !c.is_empty())
        .or_else(|| {
            info.selected_hotel
                .as_ref()
                .map(|h| h.currency.clone())
                .filter(|c| !c.is_empty())
        })
        .or_else(|| {
            info.selected_activities
                .iter()
                .find_map(|a| a.currency.clone())
        })
}
