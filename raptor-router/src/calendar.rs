//! Calendar-driven trip masking.
//!
//! Each trip belongs to one service calendar: a weekly pattern valid between
//! two dates, with explicit exceptions. Dates on which the same set of
//! calendars is active share one service id, so their stop-time arrays are
//! built once.

use std::collections::{BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};

use crate::config::{QueryConfig, TravelMode};
use crate::mask::{DayTripMask, RouteTripMask, TripMaskProvider};

/// Service id for dates on which no calendar is active.
const NO_SERVICE: &str = "NoService";

/// When a service operates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCalendar {
    /// Monday first.
    pub weekdays: [bool; 7],
    /// First date of validity (inclusive).
    pub start_date: NaiveDate,
    /// Last date of validity (inclusive).
    pub end_date: NaiveDate,
    /// Extra dates on which the service runs.
    pub added_dates: BTreeSet<NaiveDate>,
    /// Dates on which the service does not run.
    pub removed_dates: BTreeSet<NaiveDate>,
}

impl ServiceCalendar {
    pub fn new(weekdays: [bool; 7], start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            weekdays,
            start_date,
            end_date,
            added_dates: BTreeSet::new(),
            removed_dates: BTreeSet::new(),
        }
    }

    /// Every day between the two dates.
    pub fn daily(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self::new([true; 7], start_date, end_date)
    }

    pub fn with_added_date(mut self, date: NaiveDate) -> Self {
        self.removed_dates.remove(&date);
        self.added_dates.insert(date);
        self
    }

    pub fn with_removed_date(mut self, date: NaiveDate) -> Self {
        self.added_dates.remove(&date);
        self.removed_dates.insert(date);
        self
    }

    /// Exceptions take precedence over the weekly pattern.
    pub fn is_active(&self, date: NaiveDate) -> bool {
        if self.removed_dates.contains(&date) {
            return false;
        }
        if self.added_dates.contains(&date) {
            return true;
        }
        let weekday = date.weekday().num_days_from_monday() as usize;
        date >= self.start_date && date <= self.end_date && self.weekdays[weekday]
    }
}

/// Service and vehicle properties of one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripService {
    pub service_id: String,
    pub wheelchair_accessible: bool,
    pub bikes_allowed: bool,
    pub travel_mode: TravelMode,
}

impl TripService {
    pub fn new(service_id: impl Into<String>, travel_mode: TravelMode) -> Self {
        Self {
            service_id: service_id.into(),
            wheelchair_accessible: false,
            bikes_allowed: false,
            travel_mode,
        }
    }

    pub fn accessible(mut self, wheelchair: bool, bikes: bool) -> Self {
        self.wheelchair_accessible = wheelchair;
        self.bikes_allowed = bikes;
        self
    }

    fn usable(&self, config: &QueryConfig) -> bool {
        (!config.wheelchair_accessible || self.wheelchair_accessible)
            && (!config.bike_accessible || self.bikes_allowed)
            && config.allows_travel_mode(self.travel_mode)
    }
}

/// Trip mask provider backed by service calendars.
///
/// Trips without a registered [`TripService`] never run.
#[derive(Debug, Default, Clone)]
pub struct CalendarMaskProvider {
    calendars: HashMap<String, ServiceCalendar>,
    trips: HashMap<String, TripService>,
    route_trip_ids: HashMap<String, Vec<String>>,
}

impl CalendarMaskProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_calendar(&mut self, service_id: impl Into<String>, calendar: ServiceCalendar) -> &mut Self {
        self.calendars.insert(service_id.into(), calendar);
        self
    }

    pub fn add_trip(&mut self, trip_id: impl Into<String>, service: TripService) -> &mut Self {
        self.trips.insert(trip_id.into(), service);
        self
    }

    fn active_services(&self, date: NaiveDate) -> BTreeSet<&str> {
        self.calendars
            .iter()
            .filter(|(_, calendar)| calendar.is_active(date))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

impl TripMaskProvider for CalendarMaskProvider {
    fn set_trip_ids(&mut self, route_trip_ids: HashMap<String, Vec<String>>) {
        self.route_trip_ids = route_trip_ids;
    }

    fn service_id_for(&self, date: NaiveDate) -> String {
        let active = self.active_services(date);
        if active.is_empty() {
            NO_SERVICE.to_string()
        } else {
            active.into_iter().collect::<Vec<_>>().join("+")
        }
    }

    fn day_trip_mask(&self, date: NaiveDate, config: &QueryConfig) -> DayTripMask {
        let active = self.active_services(date);

        let route_masks = self
            .route_trip_ids
            .iter()
            .map(|(route_id, trip_ids)| {
                let mask = trip_ids
                    .iter()
                    .map(|trip_id| {
                        self.trips.get(trip_id).is_some_and(|service| {
                            active.contains(service.service_id.as_str()) && service.usable(config)
                        })
                    })
                    .collect();
                (route_id.clone(), RouteTripMask(mask))
            })
            .collect();

        DayTripMask {
            service_id: self.service_id_for(date),
            date,
            route_masks,
        }
    }
}
