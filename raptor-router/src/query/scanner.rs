//! Route scanning.
//!
//! Every route touching a stop marked in the previous round is traversed in
//! query direction (forward for departure queries, backward for arrival
//! queries). Once a trip can be boarded, each later stop on the route is
//! improved if the trip reaches it earlier (later) than its best time.
//!
//! Trips can come from any of the scanned service days; a day's times are
//! shifted onto the reference day's time line before they are compared.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::DayStopTimes;
use super::state::{Label, LabelId, LabelKind, MarkedStops, QueryState};
use crate::config::{QueryConfig, TimeType};
use crate::mask::NO_TRIP;
use crate::network::{Network, Route, stop_time_at};

/// Trip boarded while scanning a route.
#[derive(Debug, Clone, Copy)]
struct ActiveTrip {
    trip_offset: usize,
    day_idx: usize,
    entry_time: i32,
    previous: LabelId,
}

pub(crate) struct RouteScanner<'a> {
    network: &'a Network,
    days: &'a [DayStopTimes],
    time_type: TimeType,
    min_transfer_duration: i32,
}

impl<'a> RouteScanner<'a> {
    pub fn new(
        network: &'a Network,
        days: &'a [DayStopTimes],
        config: &QueryConfig,
        time_type: TimeType,
    ) -> Self {
        Self {
            network,
            days,
            time_type,
            min_transfer_duration: config.min_transfer_duration,
        }
    }

    /// Scans all routes serving a stop in `marked` and writes improved labels
    /// into `round`. Returns the improved stops.
    pub fn scan(&self, state: &mut QueryState, round: usize, marked: &MarkedStops) -> MarkedStops {
        let routes: BTreeSet<usize> = marked
            .stops()
            .iter()
            .flat_map(|&stop_idx| self.network.routes_of_stop(stop_idx).iter().copied())
            .collect();
        debug!(round, routes = routes.len(), "Scanning routes");

        let mut marked_next = MarkedStops::new(self.network.stops().len());
        for route_idx in routes {
            self.scan_route(state, route_idx, round, marked, &mut marked_next);
        }
        marked_next
    }

    fn scan_route(
        &self,
        state: &mut QueryState,
        route_idx: usize,
        round: usize,
        marked: &MarkedStops,
        marked_next: &mut MarkedStops,
    ) {
        let route = &self.network.routes()[route_idx];
        let route_stops = self.network.route_stops(route_idx);
        let last_round = round - 1;
        trace!(route = %route.id, direction = ?self.time_type, "Scanning route");

        let stop_offsets: Vec<usize> = match self.time_type {
            TimeType::Departure => (0..route_stops.len()).collect(),
            TimeType::Arrival => (0..route_stops.len()).rev().collect(),
        };

        let mut active_trip: Option<ActiveTrip> = None;
        for stop_offset in stop_offsets {
            let stop_idx = route_stops[stop_offset].stop_idx;
            let best_time = state.comparable_best_time(stop_idx);

            match active_trip {
                None => {
                    if !self.can_enter_at_stop(best_time, marked, stop_idx, stop_offset, route) {
                        continue;
                    }
                }
                Some(trip) => {
                    let check = TripCheck {
                        trip,
                        route_idx,
                        stop_offset,
                        stop_idx,
                        best_time,
                    };
                    if !self.update_or_recheck(state, &check, round, last_round, marked_next) {
                        continue;
                    }
                }
            }

            active_trip = self.find_possible_trip(state, stop_idx, stop_offset, route, last_round);
        }
    }

    fn can_enter_at_stop(
        &self,
        best_time: i32,
        marked: &MarkedStops,
        stop_idx: usize,
        stop_offset: usize,
        route: &Route,
    ) -> bool {
        if best_time == self.time_type.unreachable() || !marked.contains(stop_idx) {
            return false;
        }
        // no point boarding at the end of the route
        match self.time_type {
            TimeType::Departure => stop_offset + 1 != route.number_of_stops,
            TimeType::Arrival => stop_offset != 0,
        }
    }

    /// Improves the stop with the active trip if possible. Returns true when
    /// the stop was reached better in the previous round, so a better trip
    /// may be boarded here.
    fn update_or_recheck(
        &self,
        state: &mut QueryState,
        check: &TripCheck,
        round: usize,
        last_round: usize,
        marked_next: &mut MarkedStops,
    ) -> bool {
        let trip = check.trip;
        let route = &self.network.routes()[check.route_idx];
        let day = &self.days[trip.day_idx];
        let stop_time = stop_time_at(&day.stop_times, route, trip.trip_offset, check.stop_offset);
        let target_time = match self.time_type {
            TimeType::Departure => stop_time.arrival + day.shift(),
            TimeType::Arrival => stop_time.departure + day.shift(),
        };

        if self.time_type.improves(target_time, check.best_time) {
            trace!(stop = %self.network.stops()[check.stop_idx].id, target_time, "Stop improved by route");
            state.set_best_time(check.stop_idx, target_time);
            state.set_label(
                round,
                Label {
                    source_time: trip.entry_time,
                    target_time,
                    kind: LabelKind::Route {
                        route_idx: check.route_idx,
                        trip_offset: trip.trip_offset,
                        day_idx: trip.day_idx,
                    },
                    stop_idx: check.stop_idx,
                    previous: Some(trip.previous),
                },
            );
            marked_next.mark(check.stop_idx);
            return false;
        }

        state
            .label_at(last_round, check.stop_idx)
            .is_some_and(|previous| self.time_type.improves(previous.target_time, target_time))
    }

    /// First trip (last for arrival queries) over all scanned days that can
    /// be boarded at the stop given its label of the previous round.
    fn find_possible_trip(
        &self,
        state: &QueryState,
        stop_idx: usize,
        stop_offset: usize,
        route: &Route,
        last_round: usize,
    ) -> Option<ActiveTrip> {
        let previous = state.label_id_at(last_round, stop_idx)?;
        let previous_label = state.label(previous);

        let mut reference_time = previous_label.target_time;
        if previous_label.is_route() {
            let stop = &self.network.stops()[stop_idx];
            let change = stop.same_stop_transfer_time.max(self.min_transfer_duration);
            reference_time = reference_time.saturating_add(self.time_type.direction() * change);
        }

        let mut best: Option<ActiveTrip> = None;
        for (day_idx, day) in self.days.iter().enumerate() {
            let Some((trip_offset, entry_time)) = self.find_trip_on_day(day, route, stop_offset, reference_time)
            else {
                continue;
            };
            if best.is_none_or(|best| self.time_type.improves(entry_time, best.entry_time)) {
                best = Some(ActiveTrip {
                    trip_offset,
                    day_idx,
                    entry_time,
                    previous,
                });
            }
        }

        if best.is_none() {
            trace!(route = %route.id, reference_time, "No trip found");
        }
        best
    }

    fn find_trip_on_day(
        &self,
        day: &DayStopTimes,
        route: &Route,
        stop_offset: usize,
        reference_time: i32,
    ) -> Option<(usize, i32)> {
        let stop_times = &day.stop_times;
        let earliest = stop_times[route.first_stop_time_idx];
        let latest = stop_times[route.first_stop_time_idx + 1];
        if stop_times[0] == NO_TRIP || earliest == NO_TRIP {
            return None;
        }

        match self.time_type {
            TimeType::Departure => {
                if latest + day.shift() < reference_time {
                    return None;
                }
                (0..route.number_of_trips).find_map(|trip_offset| {
                    let time = stop_time_at(stop_times, route, trip_offset, stop_offset);
                    (time.departure != NO_TRIP && time.departure + day.shift() >= reference_time)
                        .then_some((trip_offset, time.departure + day.shift()))
                })
            }
            TimeType::Arrival => {
                if earliest + day.shift() > reference_time {
                    return None;
                }
                (0..route.number_of_trips).rev().find_map(|trip_offset| {
                    let time = stop_time_at(stop_times, route, trip_offset, stop_offset);
                    (time.arrival != NO_TRIP && time.arrival + day.shift() <= reference_time)
                        .then_some((trip_offset, time.arrival + day.shift()))
                })
            }
        }
    }
}

/// Position of the active trip on the route being scanned.
struct TripCheck {
    trip: ActiveTrip,
    route_idx: usize,
    stop_offset: usize,
    stop_idx: usize,
    best_time: i32,
}
