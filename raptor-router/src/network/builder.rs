//! Incremental, validating construction of a [`Network`].

use std::collections::{BTreeSet, HashMap};

use chrono_tz::Tz;
use tracing::{debug, info};

use super::route_builder::{RouteBuilder, RouteContainer};
use super::{Network, Route, RouteStop, Stop, StopTime, Transfer};
use crate::error::BuildError;
use crate::mask::NO_TRIP;

/// Collects stops, routes, trips, stop times and transfers, failing fast on
/// the first inconsistency.
///
/// Stops that no route serves are kept; they can still be reached and left
/// on foot.
#[derive(Debug)]
pub struct NetworkBuilder {
    default_same_stop_transfer_time: i32,
    stops: HashMap<String, usize>,
    stop_order: Vec<String>,
    stop_routes: Vec<BTreeSet<String>>,
    route_builders: HashMap<String, RouteBuilder>,
    transfers: Vec<Vec<Transfer>>,
    same_stop_transfers: HashMap<usize, i32>,
    route_stop_count: usize,
    stop_time_count: usize,
}

impl NetworkBuilder {
    /// Create an empty builder. Stops without an explicit same-stop transfer
    /// get `default_same_stop_transfer_time` seconds.
    pub fn new(default_same_stop_transfer_time: i32) -> Self {
        Self {
            default_same_stop_transfer_time,
            stops: HashMap::new(),
            stop_order: Vec::new(),
            stop_routes: Vec::new(),
            route_builders: HashMap::new(),
            transfers: Vec::new(),
            same_stop_transfers: HashMap::new(),
            route_stop_count: 0,
            stop_time_count: 0,
        }
    }

    pub fn has_stop(&self, id: &str) -> bool {
        self.stops.contains_key(id)
    }

    pub fn add_stop(&mut self, id: &str) -> Result<&mut Self, BuildError> {
        if self.stops.contains_key(id) {
            return Err(BuildError::DuplicateStop(id.to_string()));
        }

        self.stops.insert(id.to_string(), self.stop_order.len());
        self.stop_order.push(id.to_string());
        self.stop_routes.push(BTreeSet::new());
        self.transfers.push(Vec::new());
        Ok(self)
    }

    /// Add a route visiting `stop_ids` in order. Times of its trips are local
    /// service-day seconds in `zone`.
    pub fn add_route<S: AsRef<str>>(
        &mut self,
        id: &str,
        zone: Tz,
        stop_ids: &[S],
    ) -> Result<&mut Self, BuildError> {
        if self.route_builders.contains_key(id) {
            return Err(BuildError::DuplicateRoute(id.to_string()));
        }
        if stop_ids.len() < 2 {
            return Err(BuildError::EmptyRoute {
                route: id.to_string(),
                reason: "route needs at least two stops",
            });
        }

        let mut stop_indices = Vec::with_capacity(stop_ids.len());
        for stop_id in stop_ids {
            let stop_id = stop_id.as_ref();
            let stop_idx = self
                .stops
                .get(stop_id)
                .copied()
                .ok_or_else(|| BuildError::UnknownStop(stop_id.to_string()))?;
            stop_indices.push(stop_idx);
        }
        for stop_idx in stop_indices {
            self.stop_routes[stop_idx].insert(id.to_string());
        }

        debug!(route = id, stops = stop_ids.len(), "Adding route");
        let stop_ids: Vec<String> = stop_ids.iter().map(|s| s.as_ref().to_string()).collect();
        self.route_stop_count += stop_ids.len();
        self.route_builders
            .insert(id.to_string(), RouteBuilder::new(id.to_string(), zone, stop_ids));
        Ok(self)
    }

    pub fn add_trip(&mut self, trip_id: &str, route_id: &str) -> Result<&mut Self, BuildError> {
        self.route_builder(route_id)?.add_trip(trip_id)?;
        Ok(self)
    }

    /// Set the arrival and departure (local service-day seconds) of a trip at
    /// the stop at `position` of its route.
    pub fn add_stop_time(
        &mut self,
        route_id: &str,
        trip_id: &str,
        position: usize,
        stop_id: &str,
        arrival: i32,
        departure: i32,
    ) -> Result<&mut Self, BuildError> {
        self.route_builder(route_id)?.add_stop_time(
            trip_id,
            position,
            stop_id,
            StopTime { arrival, departure },
        )?;
        self.stop_time_count += 1;
        Ok(self)
    }

    /// Add a directed walking transfer. A transfer from a stop to itself sets
    /// that stop's same-stop transfer time. Adding the same pair again
    /// replaces the earlier duration.
    pub fn add_transfer(
        &mut self,
        source_stop_id: &str,
        target_stop_id: &str,
        duration: i32,
    ) -> Result<&mut Self, BuildError> {
        let source = self.stop_idx(source_stop_id)?;
        let target = self.stop_idx(target_stop_id)?;
        if duration < 0 {
            return Err(BuildError::NegativeDuration {
                source_stop: source_stop_id.to_string(),
                target_stop: target_stop_id.to_string(),
                duration,
            });
        }

        if source == target {
            self.same_stop_transfers.insert(source, duration);
            return Ok(self);
        }

        let transfers = &mut self.transfers[source];
        match transfers.iter_mut().find(|t| t.target_stop_idx == target) {
            Some(existing) => existing.duration = duration,
            None => transfers.push(Transfer {
                target_stop_idx: target,
                duration,
            }),
        }
        Ok(self)
    }

    /// Validate all routes and flatten everything into a [`Network`].
    pub fn build(self) -> Result<Network, BuildError> {
        let transfer_count: usize = self.transfers.iter().map(Vec::len).sum();
        info!(
            stops = self.stop_order.len(),
            routes = self.route_builders.len(),
            route_stops = self.route_stop_count,
            stop_times = self.stop_time_count,
            transfers = transfer_count,
            "Building network"
        );

        let mut containers = self
            .route_builders
            .into_values()
            .map(RouteBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;
        containers.sort_by(|a, b| {
            a.first_departure()
                .cmp(&b.first_departure())
                .then_with(|| a.id.cmp(&b.id))
        });

        let route_lookup: HashMap<String, usize> = containers
            .iter()
            .enumerate()
            .map(|(idx, container)| (container.id.clone(), idx))
            .collect();

        let (routes, route_stops, stop_times) = flatten_routes(&containers, &self.stops);

        let mut stops = Vec::with_capacity(self.stop_order.len());
        let mut stop_routes = Vec::new();
        let mut transfers = Vec::with_capacity(transfer_count);
        for (stop_idx, id) in self.stop_order.into_iter().enumerate() {
            let mut served_by: Vec<usize> = self.stop_routes[stop_idx]
                .iter()
                .filter_map(|route_id| route_lookup.get(route_id).copied())
                .collect();
            served_by.sort_unstable();

            let stop_transfers = &self.transfers[stop_idx];
            stops.push(Stop {
                id,
                stop_route_idx: stop_routes.len(),
                number_of_routes: served_by.len(),
                same_stop_transfer_time: self
                    .same_stop_transfers
                    .get(&stop_idx)
                    .copied()
                    .unwrap_or(self.default_same_stop_transfer_time),
                transfer_idx: transfers.len(),
                number_of_transfers: stop_transfers.len(),
            });
            stop_routes.extend(served_by);
            transfers.extend_from_slice(stop_transfers);
        }

        debug!(
            routes = routes.len(),
            stop_time_slots = stop_times.len(),
            "Network flattened"
        );

        Ok(Network {
            stops,
            stop_routes,
            transfers,
            routes,
            route_stops,
            stop_times,
            stop_lookup: self.stops,
            route_lookup,
        })
    }

    fn stop_idx(&self, id: &str) -> Result<usize, BuildError> {
        self.stops
            .get(id)
            .copied()
            .ok_or_else(|| BuildError::UnknownStop(id.to_string()))
    }

    fn route_builder(&mut self, route_id: &str) -> Result<&mut RouteBuilder, BuildError> {
        self.route_builders
            .get_mut(route_id)
            .ok_or_else(|| BuildError::UnknownRoute(route_id.to_string()))
    }
}

/// Lay out routes, route stops and the stop-time array in route order.
fn flatten_routes(
    containers: &[RouteContainer],
    stop_lookup: &HashMap<String, usize>,
) -> (Vec<Route>, Vec<RouteStop>, Vec<i32>) {
    let stop_time_slots: usize = containers
        .iter()
        .map(|c| 2 + 2 * c.trips.len() * c.stop_ids.len())
        .sum();

    let mut routes = Vec::with_capacity(containers.len());
    let mut route_stops = Vec::new();
    let mut stop_times = Vec::with_capacity(2 + stop_time_slots);
    stop_times.extend([NO_TRIP, NO_TRIP]);

    for (route_idx, container) in containers.iter().enumerate() {
        routes.push(Route {
            id: container.id.clone(),
            zone: container.zone,
            first_route_stop_idx: route_stops.len(),
            number_of_stops: container.stop_ids.len(),
            first_stop_time_idx: stop_times.len(),
            number_of_trips: container.trips.len(),
            trip_ids: container.trips.iter().map(|(id, _)| id.clone()).collect(),
        });

        route_stops.extend(container.stop_ids.iter().filter_map(|stop_id| {
            stop_lookup.get(stop_id).map(|&stop_idx| RouteStop {
                stop_idx,
                route_idx,
            })
        }));

        // route header, filled per date by the stop-time provider
        stop_times.extend([NO_TRIP, NO_TRIP]);
        for (_, times) in &container.trips {
            for time in times {
                stop_times.extend([time.arrival, time.departure]);
            }
        }
    }

    (routes, route_stops, stop_times)
}
