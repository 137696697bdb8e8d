//! Immutable, array-based transit network.
//!
//! The network is built once by [`NetworkBuilder`] and then shared by every
//! query. Entities reference each other by index into flat vectors: a stop
//! owns a contiguous slice of `stop_routes` and of `transfers`, a route owns
//! a contiguous slice of `route_stops` and a block of the flat stop-time
//! array.
//!
//! Stop-time layout: slots `[0]` and `[1]` hold the earliest and latest time
//! of the whole day. Each route block starts with two header slots (earliest
//! and latest time of the route) followed by `(arrival, departure)` pairs for
//! every trip and stop, trip-major.

mod builder;
mod route_builder;

use std::collections::HashMap;

use chrono_tz::Tz;

pub use builder::NetworkBuilder;

/// A stop with the slices of routes and transfers touching it.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: String,
    pub stop_route_idx: usize,
    pub number_of_routes: usize,
    /// Minimum time to change between two trips at this stop (seconds).
    pub same_stop_transfer_time: i32,
    pub transfer_idx: usize,
    pub number_of_transfers: usize,
}

/// One direction of a line: a fixed stop sequence served by sorted trips.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub zone: Tz,
    pub first_route_stop_idx: usize,
    pub number_of_stops: usize,
    pub first_stop_time_idx: usize,
    pub number_of_trips: usize,
    /// Trip ids ordered by departure at the first stop.
    pub trip_ids: Vec<String>,
}

impl Route {
    /// Index of the arrival slot of `trip_offset` at `stop_offset`; the
    /// departure slot follows directly.
    pub fn stop_time_idx(&self, trip_offset: usize, stop_offset: usize) -> usize {
        self.first_stop_time_idx + 2 * (trip_offset * self.number_of_stops + stop_offset) + 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteStop {
    pub stop_idx: usize,
    pub route_idx: usize,
}

/// Directed walking connection to another stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub target_stop_idx: usize,
    /// Walking duration in seconds.
    pub duration: i32,
}

/// Arrival and departure at one stop of one trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTime {
    pub arrival: i32,
    pub departure: i32,
}

/// The routable network.
#[derive(Debug, Clone)]
pub struct Network {
    stops: Vec<Stop>,
    stop_routes: Vec<usize>,
    transfers: Vec<Transfer>,
    routes: Vec<Route>,
    route_stops: Vec<RouteStop>,
    /// Local service-day seconds of all trips, before date masking.
    stop_times: Vec<i32>,
    stop_lookup: HashMap<String, usize>,
    route_lookup: HashMap<String, usize>,
}

impl Network {
    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn stop_times(&self) -> &[i32] {
        &self.stop_times
    }

    pub fn stop_index(&self, id: &str) -> Option<usize> {
        self.stop_lookup.get(id).copied()
    }

    pub fn route_index(&self, id: &str) -> Option<usize> {
        self.route_lookup.get(id).copied()
    }

    /// Routes serving a stop, each listed once.
    pub fn routes_of_stop(&self, stop_idx: usize) -> &[usize] {
        let stop = &self.stops[stop_idx];
        &self.stop_routes[stop.stop_route_idx..stop.stop_route_idx + stop.number_of_routes]
    }

    /// Outgoing transfers of a stop.
    pub fn transfers_of_stop(&self, stop_idx: usize) -> &[Transfer] {
        let stop = &self.stops[stop_idx];
        &self.transfers[stop.transfer_idx..stop.transfer_idx + stop.number_of_transfers]
    }

    pub fn transfer(&self, transfer_idx: usize) -> &Transfer {
        &self.transfers[transfer_idx]
    }

    /// Ordered stop sequence of a route.
    pub fn route_stops(&self, route_idx: usize) -> &[RouteStop] {
        let route = &self.routes[route_idx];
        &self.route_stops
            [route.first_route_stop_idx..route.first_route_stop_idx + route.number_of_stops]
    }

    /// Trip ids of every route, keyed by route id.
    pub fn route_trip_ids(&self) -> HashMap<String, Vec<String>> {
        self.routes
            .iter()
            .map(|route| (route.id.clone(), route.trip_ids.clone()))
            .collect()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }
}

/// Reads the stop time of `trip_offset` at `stop_offset` of `route` from a
/// (possibly date-specific) stop-time array.
pub fn stop_time_at(stop_times: &[i32], route: &Route, trip_offset: usize, stop_offset: usize) -> StopTime {
    let idx = route.stop_time_idx(trip_offset, stop_offset);
    StopTime {
        arrival: stop_times[idx],
        departure: stop_times[idx + 1],
    }
}
