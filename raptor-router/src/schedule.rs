//! JSON schedule documents.
//!
//! A small, self-contained input format for the command line tool and for
//! tests: stops, routes with their trips, walking transfers and optional
//! service calendars. Stop times are `"HH:MM"` or `"HH:MM:SS"` strings in
//! the route's local time and may run past `24:00` for trips continuing
//! after midnight.
//!
//! ```json
//! {
//!   "stops": ["A", "B"],
//!   "routes": [{
//!     "id": "R1",
//!     "zone": "Europe/Zurich",
//!     "mode": "rail",
//!     "stops": ["A", "B"],
//!     "trips": [{ "id": "R1-1", "times": [{ "departure": "08:00" }, { "arrival": "08:10" }] }]
//!   }],
//!   "transfers": [{ "from": "A", "to": "B", "duration": 600 }]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info};

use crate::calendar::{CalendarMaskProvider, ServiceCalendar, TripService};
use crate::config::{RaptorConfig, TravelMode};
use crate::error::{BuildError, ConfigError};
use crate::mask::{NoMaskProvider, TripMaskProvider};
use crate::network::{Network, NetworkBuilder};
use crate::router::RaptorRouter;

/// Errors raised while reading a schedule document.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Schedule file could not be read
    #[error("failed to read schedule: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not valid schedule JSON
    #[error("failed to parse schedule: {0}")]
    Parse(#[from] serde_json::Error),

    /// Route names a time zone that does not exist
    #[error("route {route} has unknown time zone {zone}")]
    UnknownZone { route: String, zone: String },

    /// Trip references a calendar that is not defined
    #[error("trip {trip} references unknown calendar {service}")]
    UnknownService { trip: String, service: String },

    /// Stop time is not `HH:MM` or `HH:MM:SS`
    #[error("trip {trip} has invalid time {value}")]
    InvalidTime { trip: String, value: String },

    /// Stop time has neither arrival nor departure
    #[error("trip {trip} has no time at position {position}")]
    MissingTime { trip: String, position: usize },

    /// Trip lists a different number of times than its route has stops
    #[error("trip {trip} has {times} times but its route has {stops} stops")]
    TimeCountMismatch {
        trip: String,
        times: usize,
        stops: usize,
    },

    /// Schedule data is inconsistent
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Router configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Top-level schedule document.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleDocument {
    /// Same-stop transfer time for stops without an explicit one (seconds).
    /// Falls back to the router configuration when absent.
    #[serde(default)]
    pub same_stop_transfer_time: Option<i32>,
    pub stops: Vec<String>,
    pub routes: Vec<RouteDocument>,
    #[serde(default)]
    pub transfers: Vec<TransferDocument>,
    /// Service calendars by id. Without calendars every trip runs daily.
    #[serde(default)]
    pub calendars: BTreeMap<String, CalendarDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteDocument {
    pub id: String,
    /// IANA time zone of the route's stop times.
    pub zone: String,
    #[serde(default = "default_mode")]
    pub mode: TravelMode,
    pub stops: Vec<String>,
    pub trips: Vec<TripDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripDocument {
    pub id: String,
    /// Calendar the trip runs on. Required when the document has calendars.
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub wheelchair_accessible: bool,
    #[serde(default)]
    pub bikes_allowed: bool,
    /// One entry per route stop.
    pub times: Vec<StopTimeDocument>,
}

/// Either time may be omitted; it then equals the other one.
#[derive(Debug, Clone, Deserialize)]
pub struct StopTimeDocument {
    #[serde(default)]
    pub arrival: Option<String>,
    #[serde(default)]
    pub departure: Option<String>,
}

/// Directed walking transfer; `duration` in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferDocument {
    pub from: String,
    pub to: String,
    pub duration: i32,
    /// Also add the transfer from `to` to `from`.
    #[serde(default)]
    pub bidirectional: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarDocument {
    /// Monday first. Defaults to every day.
    #[serde(default = "every_day")]
    pub weekdays: [bool; 7],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub added_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub removed_dates: BTreeSet<NaiveDate>,
}

fn default_mode() -> TravelMode {
    TravelMode::Bus
}

fn every_day() -> [bool; 7] {
    [true; 7]
}

/// Network and trip masking of a loaded schedule.
pub struct Schedule {
    pub network: Network,
    pub trip_mask_provider: Box<dyn TripMaskProvider>,
}

impl Schedule {
    /// Create a router over this schedule. The schedule's trip mask
    /// provider replaces the one in `config`.
    pub fn into_router(self, config: RaptorConfig) -> Result<RaptorRouter, ConfigError> {
        let config = RaptorConfig {
            trip_mask_provider: self.trip_mask_provider,
            ..config
        };
        RaptorRouter::new(self.network, config)
    }
}

impl ScheduleDocument {
    pub fn from_json(json: &str) -> Result<Self, ScheduleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScheduleError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Build the network and, if the document defines calendars, a
    /// calendar-backed trip mask provider.
    pub fn build(&self, default_same_stop_transfer_time: i32) -> Result<Schedule, ScheduleError> {
        let same_stop = self
            .same_stop_transfer_time
            .unwrap_or(default_same_stop_transfer_time);
        let mut builder = NetworkBuilder::new(same_stop);

        for stop in &self.stops {
            builder.add_stop(stop)?;
        }
        for route in &self.routes {
            add_route(&mut builder, route)?;
        }
        for transfer in &self.transfers {
            builder.add_transfer(&transfer.from, &transfer.to, transfer.duration)?;
            if transfer.bidirectional {
                builder.add_transfer(&transfer.to, &transfer.from, transfer.duration)?;
            }
        }

        let trip_mask_provider = self.mask_provider()?;
        let network = builder.build()?;
        info!(
            stops = network.stops().len(),
            routes = network.routes().len(),
            calendars = self.calendars.len(),
            "Schedule loaded"
        );
        Ok(Schedule {
            network,
            trip_mask_provider,
        })
    }

    fn mask_provider(&self) -> Result<Box<dyn TripMaskProvider>, ScheduleError> {
        if self.calendars.is_empty() {
            return Ok(Box::new(NoMaskProvider::default()));
        }

        let mut provider = CalendarMaskProvider::new();
        for (service_id, calendar) in &self.calendars {
            let mut service = ServiceCalendar::new(calendar.weekdays, calendar.start_date, calendar.end_date);
            for date in &calendar.added_dates {
                service = service.with_added_date(*date);
            }
            for date in &calendar.removed_dates {
                service = service.with_removed_date(*date);
            }
            provider.add_calendar(service_id.clone(), service);
        }

        for route in &self.routes {
            for trip in &route.trips {
                // trips without a calendar never run
                let Some(service_id) = &trip.service else {
                    debug!(trip = %trip.id, "Trip has no calendar");
                    continue;
                };
                if !self.calendars.contains_key(service_id) {
                    return Err(ScheduleError::UnknownService {
                        trip: trip.id.clone(),
                        service: service_id.clone(),
                    });
                }
                let service = TripService::new(service_id.clone(), route.mode)
                    .accessible(trip.wheelchair_accessible, trip.bikes_allowed);
                provider.add_trip(trip.id.clone(), service);
            }
        }
        Ok(Box::new(provider))
    }
}

fn add_route(builder: &mut NetworkBuilder, route: &RouteDocument) -> Result<(), ScheduleError> {
    let zone: Tz = route.zone.parse().map_err(|_| ScheduleError::UnknownZone {
        route: route.id.clone(),
        zone: route.zone.clone(),
    })?;
    builder.add_route(&route.id, zone, &route.stops)?;

    for trip in &route.trips {
        if trip.times.len() != route.stops.len() {
            return Err(ScheduleError::TimeCountMismatch {
                trip: trip.id.clone(),
                times: trip.times.len(),
                stops: route.stops.len(),
            });
        }
        builder.add_trip(&trip.id, &route.id)?;
        for (position, (stop_id, time)) in route.stops.iter().zip(&trip.times).enumerate() {
            let (arrival, departure) = stop_time(&trip.id, position, time)?;
            builder.add_stop_time(&route.id, &trip.id, position, stop_id, arrival, departure)?;
        }
    }
    Ok(())
}

fn stop_time(trip: &str, position: usize, time: &StopTimeDocument) -> Result<(i32, i32), ScheduleError> {
    let parse = |value: &String| {
        parse_service_time(value).ok_or_else(|| ScheduleError::InvalidTime {
            trip: trip.to_string(),
            value: value.clone(),
        })
    };
    match (&time.arrival, &time.departure) {
        (Some(arrival), Some(departure)) => Ok((parse(arrival)?, parse(departure)?)),
        (Some(only), None) | (None, Some(only)) => {
            let seconds = parse(only)?;
            Ok((seconds, seconds))
        }
        (None, None) => Err(ScheduleError::MissingTime {
            trip: trip.to_string(),
            position,
        }),
    }
}

/// Seconds after the start of the service day for `"HH:MM"` or
/// `"HH:MM:SS"`. Hours may exceed 23.
fn parse_service_time(value: &str) -> Option<i32> {
    let mut parts = value.split(':');
    let hours: i32 = parts.next()?.parse().ok()?;
    let minutes: i32 = parts.next()?.parse().ok()?;
    let seconds: i32 = match parts.next() {
        Some(seconds) => seconds.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some()
        || hours < 0
        || !(0..60).contains(&minutes)
        || !(0..60).contains(&seconds)
    {
        return None;
    }
    hours.checked_mul(3600)?.checked_add(minutes * 60 + seconds)
}

/// Read a schedule file and create a router over it.
pub fn load_router(path: impl AsRef<Path>, config: RaptorConfig) -> Result<RaptorRouter, ScheduleError> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading schedule");
    let document = ScheduleDocument::from_path(path)?;
    let schedule = document.build(config.default_same_stop_transfer_time)?;
    Ok(schedule.into_router(config)?)
}
