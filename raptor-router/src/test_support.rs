//! Reference network for router tests.
//!
//! ```text
//!                      M
//!                      |
//!        I ---- J ---- K ---- L #### R
//!        |             |             |
//!        |             N ---- O ---- P ---- Q
//!        |             #             |
//! A ---- B ---- C ---- D ---- E ---- F ---- G
//!        |                           |
//!        H                           S
//! ```
//!
//! Every route is added twice, forward as `{id}-F` and reversed as
//! `{id}-R`, with trips `{id}-F-{n}` / `{id}-R-{n}`. Trip times are local
//! service-day seconds, so the same fixture serves any query date.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use chrono_tz::Tz;

use crate::config::{QueryConfig, RaptorConfig};
use crate::mask::{DayTripMask, NoMaskProvider, RouteTripMask, TripMaskProvider};
use crate::network::{Network, NetworkBuilder};
use crate::router::RaptorRouter;

pub(crate) const R1: [&str; 7] = ["A", "B", "C", "D", "E", "F", "G"];
pub(crate) const R2: [&str; 6] = ["H", "B", "I", "J", "K", "L"];
pub(crate) const R3: [&str; 6] = ["M", "K", "N", "O", "P", "Q"];
pub(crate) const R4: [&str; 4] = ["R", "P", "F", "S"];
pub(crate) const R5: [&str; 14] = [
    "A", "B", "C", "D", "E", "F", "P", "O", "N", "K", "J", "I", "B", "H",
];

pub(crate) const ZURICH: Tz = chrono_tz::Europe::Zurich;

pub(crate) fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
}

/// Local wall-clock time in `zone` on `date`; the earlier instant when the
/// time occurs twice.
pub(crate) fn local_time(zone: Tz, date: NaiveDate, hour: u32, minute: u32) -> DateTime<FixedOffset> {
    let naive = date.and_hms_opt(hour, minute, 0).unwrap();
    zone.from_local_datetime(&naive).earliest().unwrap().fixed_offset()
}

/// Zurich time on the reference date.
pub(crate) fn zurich(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    local_time(ZURICH, reference_date(), hour, minute)
}

/// Trip pattern of a fixture route, all in minutes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timing {
    pub offset: i32,
    pub headway: i32,
    pub travel: i32,
    pub dwell: i32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            offset: 0,
            headway: 15,
            travel: 5,
            dwell: 1,
        }
    }
}

impl Timing {
    pub(crate) fn new(offset: i32, headway: i32, travel: i32, dwell: i32) -> Self {
        Self {
            offset,
            headway,
            travel,
            dwell,
        }
    }
}

#[derive(Debug, Clone)]
struct FixtureRoute {
    id: String,
    zone: Tz,
    stops: Vec<String>,
    timing: Timing,
}

pub(crate) struct RouterFixture {
    routes: Vec<FixtureRoute>,
    /// (source, target, minutes), added in both directions.
    transfers: Vec<(String, String, i32)>,
    day_start_hour: i32,
    day_end_hour: i32,
    days_to_scan: u32,
    raptor_range: i32,
    same_stop_transfer_time: i32,
    mask_provider: Box<dyn TripMaskProvider>,
}

impl Default for RouterFixture {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            transfers: Vec::new(),
            day_start_hour: 5,
            day_end_hour: 25,
            days_to_scan: 1,
            raptor_range: -1,
            same_stop_transfer_time: 120,
            mask_provider: Box::new(NoMaskProvider::default()),
        }
    }
}

impl RouterFixture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// R1 to R4 with the N-D (60 min) and L-R (30 min) footpaths.
    pub(crate) fn with_defaults(self) -> Self {
        self.route("R1", &R1)
            .route("R2", &R2)
            .route("R3", &R3)
            .route("R4", &R4)
            .transfer("N", "D", 60)
            .transfer("L", "R", 30)
    }

    pub(crate) fn route(self, id: &str, stops: &[&str]) -> Self {
        self.timed_route(id, stops, Timing::default())
    }

    pub(crate) fn timed_route(self, id: &str, stops: &[&str], timing: Timing) -> Self {
        self.zoned_route(id, ZURICH, stops, timing)
    }

    pub(crate) fn zoned_route(mut self, id: &str, zone: Tz, stops: &[&str], timing: Timing) -> Self {
        self.routes.push(FixtureRoute {
            id: id.to_string(),
            zone,
            stops: stops.iter().map(|stop| stop.to_string()).collect(),
            timing,
        });
        self
    }

    pub(crate) fn transfer(mut self, source: &str, target: &str, minutes: i32) -> Self {
        self.transfers
            .push((source.to_string(), target.to_string(), minutes));
        self
    }

    pub(crate) fn service_day(mut self, start_hour: i32, end_hour: i32) -> Self {
        self.day_start_hour = start_hour;
        self.day_end_hour = end_hour;
        self
    }

    pub(crate) fn same_stop_transfer_time(mut self, seconds: i32) -> Self {
        self.same_stop_transfer_time = seconds;
        self
    }

    pub(crate) fn days_to_scan(mut self, days: u32) -> Self {
        self.days_to_scan = days;
        self
    }

    pub(crate) fn raptor_range(mut self, seconds: i32) -> Self {
        self.raptor_range = seconds;
        self
    }

    pub(crate) fn mask_provider(mut self, provider: impl TripMaskProvider + 'static) -> Self {
        self.mask_provider = Box::new(provider);
        self
    }

    pub(crate) fn network(&self) -> Network {
        let mut builder = NetworkBuilder::new(self.same_stop_transfer_time);
        let mut added = HashSet::new();
        let mut add_stop = |builder: &mut NetworkBuilder, stop: &str| {
            if added.insert(stop.to_string()) {
                builder.add_stop(stop).unwrap();
            }
        };

        for route in &self.routes {
            for stop in &route.stops {
                add_stop(&mut builder, stop);
            }
        }
        for (source, target, _) in &self.transfers {
            add_stop(&mut builder, source);
            add_stop(&mut builder, target);
        }

        for route in &self.routes {
            self.add_route(&mut builder, route);
        }
        for (source, target, minutes) in &self.transfers {
            builder.add_transfer(source, target, minutes * 60).unwrap();
            builder.add_transfer(target, source, minutes * 60).unwrap();
        }

        builder.build().unwrap()
    }

    fn add_route(&self, builder: &mut NetworkBuilder, route: &FixtureRoute) {
        let forward = format!("{}-F", route.id);
        let reverse = format!("{}-R", route.id);
        let reversed: Vec<&str> = route.stops.iter().rev().map(String::as_str).collect();
        builder.add_route(&forward, route.zone, &route.stops).unwrap();
        builder.add_route(&reverse, route.zone, &reversed).unwrap();

        let Timing {
            offset,
            headway,
            travel,
            dwell,
        } = route.timing;
        let day_end = self.day_end_hour * 3600;
        let mut start = self.day_start_hour * 3600 + offset * 60;
        let mut trip = 0;
        while start < day_end {
            let forward_trip = format!("{}-F-{trip}", route.id);
            let reverse_trip = format!("{}-R-{trip}", route.id);
            builder.add_trip(&forward_trip, &forward).unwrap();
            builder.add_trip(&reverse_trip, &reverse).unwrap();

            let mut arrival = start;
            let mut departure = start;
            let last = route.stops.len() - 1;
            for position in 0..=last {
                if position == last {
                    departure = arrival;
                }
                builder
                    .add_stop_time(&forward, &forward_trip, position, &route.stops[position], arrival, departure)
                    .unwrap();
                builder
                    .add_stop_time(&reverse, &reverse_trip, position, reversed[position], arrival, departure)
                    .unwrap();
                arrival = departure + travel * 60;
                departure = arrival + dwell * 60;
            }

            start += headway * 60;
            trip += 1;
        }
    }

    pub(crate) fn build(self) -> RaptorRouter {
        let network = self.network();
        let config = RaptorConfig {
            days_to_scan: self.days_to_scan,
            default_same_stop_transfer_time: self.same_stop_transfer_time,
            raptor_range: self.raptor_range,
            stop_time_cache_size: u64::from(self.days_to_scan),
            trip_mask_provider: self.mask_provider,
            ..RaptorConfig::default()
        };
        RaptorRouter::new(network, config).unwrap()
    }
}

/// Runs every trip except those of routes blocked on a given date.
#[derive(Debug, Default, Clone)]
pub(crate) struct RouteBlocker {
    blocked: HashMap<NaiveDate, HashSet<String>>,
    trip_counts: HashMap<String, usize>,
}

impl RouteBlocker {
    /// Blocks both directions of fixture route `id` on `date`.
    pub(crate) fn block(mut self, id: &str, date: NaiveDate) -> Self {
        let blocked = self.blocked.entry(date).or_default();
        blocked.insert(format!("{id}-F"));
        blocked.insert(format!("{id}-R"));
        self
    }
}

impl TripMaskProvider for RouteBlocker {
    fn set_trip_ids(&mut self, route_trip_ids: HashMap<String, Vec<String>>) {
        self.trip_counts = route_trip_ids
            .into_iter()
            .map(|(route_id, trip_ids)| (route_id, trip_ids.len()))
            .collect();
    }

    fn service_id_for(&self, date: NaiveDate) -> String {
        date.to_string()
    }

    fn day_trip_mask(&self, date: NaiveDate, _config: &QueryConfig) -> DayTripMask {
        let blocked = self.blocked.get(&date);
        let route_masks = self
            .trip_counts
            .iter()
            .map(|(route_id, trips)| {
                let mask = if blocked.is_some_and(|routes| routes.contains(route_id)) {
                    RouteTripMask::none_active(*trips)
                } else {
                    RouteTripMask::all_active(*trips)
                };
                (route_id.clone(), mask)
            })
            .collect();
        DayTripMask {
            service_id: self.service_id_for(date),
            date,
            route_masks,
        }
    }
}
