//! Turns the labels of a finished query into connections.
//!
//! Labels are followed back from a target to the source and converted into
//! legs. Two corrections are applied on the way:
//!
//! - a route followed by a walk to the target is collapsed into one route leg
//!   when the trip itself reaches the walk's destination at least as well;
//! - a walk from the source followed by a route is collapsed the same way,
//!   and otherwise moved as close to the route departure as possible so the
//!   connection does not start with idle time.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use tracing::warn;

use crate::config::TimeType;
use crate::connection::{Connection, Leg, LegType};
use crate::mask::NO_TRIP;
use crate::network::{Network, StopTime, stop_time_at};
use crate::query::DayStopTimes;
use crate::query::state::{Label, LabelId, LabelKind, QueryState};
use crate::time::to_offset_datetime;

/// Zone a leg's instants are expressed in.
#[derive(Debug, Clone, Copy)]
enum LegZone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl LegZone {
    fn datetime(self, seconds: i32, reference_date: NaiveDate) -> DateTime<FixedOffset> {
        match self {
            LegZone::Named(zone) => to_offset_datetime(seconds, reference_date, &zone),
            LegZone::Fixed(offset) => to_offset_datetime(seconds, reference_date, &offset),
        }
    }
}

/// Leg in internal seconds, before zones are attached.
#[derive(Debug)]
struct RawLeg {
    route_idx: Option<usize>,
    trip_offset: usize,
    from_stop_idx: usize,
    to_stop_idx: usize,
    departure: i32,
    arrival: i32,
}

pub(crate) struct LabelPostprocessor<'a> {
    network: &'a Network,
    days: &'a [DayStopTimes],
    time_type: TimeType,
    reference_date: NaiveDate,
    /// Offset used for connections without any route leg.
    reference_offset: FixedOffset,
}

impl<'a> LabelPostprocessor<'a> {
    pub fn new(
        network: &'a Network,
        days: &'a [DayStopTimes],
        time_type: TimeType,
        reference_date: NaiveDate,
        reference_offset: FixedOffset,
    ) -> Self {
        Self {
            network,
            days,
            time_type,
            reference_date,
            reference_offset,
        }
    }

    /// One connection per round that improved the best time over all
    /// targets (including the walk handicap of each target).
    pub fn pareto_optimal_connections(
        &self,
        state: &QueryState,
        targets: &[(usize, i32)],
    ) -> Vec<Connection> {
        let direction = self.time_type.direction();
        let mut best_time = self.time_type.unreachable();
        let mut connections = Vec::new();

        for round in state.rounds() {
            let mut best_label = None;
            for &(stop_idx, walk) in targets {
                let Some(label_id) = round[stop_idx] else {
                    continue;
                };
                let time = state
                    .label(label_id)
                    .target_time
                    .saturating_add(direction * walk);
                if self.time_type.improves(time, best_time) {
                    best_time = time;
                    best_label = Some(label_id);
                }
            }

            if let Some(connection) = best_label.and_then(|id| self.reconstruct(state, id)) {
                connections.push(connection);
            }
        }

        connections
    }

    /// Connection to every stop reached by the query, using the label of
    /// the last round that reached it.
    pub fn isolines(&self, state: &QueryState) -> HashMap<String, Connection> {
        let rounds = state.rounds();
        self.network
            .stops()
            .iter()
            .enumerate()
            .filter_map(|(stop_idx, stop)| {
                let label_id = rounds.iter().rev().find_map(|round| round[stop_idx])?;
                if state.label(label_id).kind == LabelKind::Initial {
                    return None;
                }
                let connection = self.reconstruct(state, label_id)?;
                Some((stop.id.clone(), connection))
            })
            .collect()
    }

    fn reconstruct(&self, state: &QueryState, label_id: LabelId) -> Option<Connection> {
        // target first, in query direction
        let mut labels = Vec::new();
        let mut current = Some(label_id);
        while let Some(id) = current {
            let label = *state.label(id);
            if label.kind == LabelKind::Initial {
                break;
            }
            labels.push(label);
            current = label.previous;
        }

        self.maybe_combine(state, &mut labels, true);
        self.maybe_combine(state, &mut labels, false);

        let mut raw_legs: Vec<RawLeg> = labels
            .iter()
            .filter_map(|label| self.raw_leg(state, label))
            .collect();
        if raw_legs.is_empty() {
            return None;
        }
        // labels run from the query's end back to its start
        if self.time_type == TimeType::Departure {
            raw_legs.reverse();
        }

        let legs = self.attach_zones(&raw_legs);
        match Connection::new(legs) {
            Ok(connection) => Some(connection),
            Err(err) => {
                warn!(error = %err, "Discarding inconsistent connection");
                None
            }
        }
    }

    fn raw_leg(&self, state: &QueryState, label: &Label) -> Option<RawLeg> {
        let previous_stop = state.label(label.previous?).stop_idx;
        let (from_stop_idx, to_stop_idx, departure, arrival) = match self.time_type {
            TimeType::Departure => (previous_stop, label.stop_idx, label.source_time, label.target_time),
            TimeType::Arrival => (label.stop_idx, previous_stop, label.target_time, label.source_time),
        };
        let (route_idx, trip_offset) = match label.kind {
            LabelKind::Route {
                route_idx,
                trip_offset,
                ..
            } => (Some(route_idx), trip_offset),
            LabelKind::Transfer { .. } => (None, 0),
            LabelKind::Initial => return None,
        };
        Some(RawLeg {
            route_idx,
            trip_offset,
            from_stop_idx,
            to_stop_idx,
            departure,
            arrival,
        })
    }

    /// Route legs use their route's zone. Walks borrow the zone of the
    /// adjacent route legs; connections without route legs use the
    /// reference offset.
    fn attach_zones(&self, raw_legs: &[RawLeg]) -> Vec<Leg> {
        let routes = self.network.routes();
        let stops = self.network.stops();
        let route_zone = |leg: &RawLeg| leg.route_idx.map(|idx| LegZone::Named(routes[idx].zone));
        let fallback = LegZone::Fixed(self.reference_offset);

        raw_legs
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let from_stop_id = stops[raw.from_stop_idx].id.clone();
                let to_stop_id = stops[raw.to_stop_idx].id.clone();

                let (departure_zone, arrival_zone) = match route_zone(raw) {
                    Some(zone) => (zone, zone),
                    None => {
                        let before = raw_legs[..i].iter().rev().find_map(route_zone);
                        let after = raw_legs[i + 1..].iter().find_map(route_zone);
                        (
                            before.or(after).unwrap_or(fallback),
                            after.or(before).unwrap_or(fallback),
                        )
                    }
                };

                let (route_id, trip_id, leg_type) = match raw.route_idx {
                    Some(route_idx) => {
                        let route = &routes[route_idx];
                        (
                            route.id.clone(),
                            route.trip_ids.get(raw.trip_offset).cloned(),
                            LegType::Route,
                        )
                    }
                    None => (
                        format!("transfer_{from_stop_id}_{to_stop_id}"),
                        None,
                        LegType::WalkTransfer,
                    ),
                };

                Leg {
                    route_id,
                    trip_id,
                    from_stop_id,
                    to_stop_id,
                    departure_time: departure_zone.datetime(raw.departure, self.reference_date),
                    arrival_time: arrival_zone.datetime(raw.arrival, self.reference_date),
                    leg_type,
                }
            })
            .collect()
    }

    /// Collapses a (transfer, route) pair at the target end (`from_target`)
    /// or at the source end of `labels` into one route label if the trip
    /// serves the transfer's far stop at least as well.
    fn maybe_combine(&self, state: &QueryState, labels: &mut Vec<Label>, from_target: bool) {
        if labels.len() < 2 {
            return;
        }
        let (transfer_pos, route_pos) = if from_target {
            (0, 1)
        } else {
            (labels.len() - 1, labels.len() - 2)
        };
        let transfer = labels[transfer_pos];
        let route = labels[route_pos];

        let LabelKind::Route {
            route_idx,
            trip_offset,
            day_idx,
        } = route.kind
        else {
            return;
        };
        if !transfer.is_transfer() {
            return;
        }

        let stop_idx = if from_target {
            transfer.stop_idx
        } else {
            match transfer.previous {
                Some(previous) => state.label(previous).stop_idx,
                None => return,
            }
        };

        let usable = self
            .trip_stop_time(stop_idx, route_idx, trip_offset, day_idx)
            .filter(|stop_time| {
                if from_target {
                    self.can_stop_time_be_target(stop_time, &route, &transfer)
                } else {
                    self.can_stop_time_be_source(stop_time, &route, &transfer)
                }
            });
        let Some(stop_time) = usable else {
            if !from_target {
                let idle_time = route.source_time - transfer.target_time;
                if idle_time != 0 {
                    labels[transfer_pos] = Label {
                        source_time: transfer.source_time + idle_time,
                        target_time: transfer.target_time + idle_time,
                        ..transfer
                    };
                }
            }
            return;
        };

        let departure_query = self.time_type == TimeType::Departure;
        let direction = self.time_type.direction();
        let route_time = match (from_target, departure_query) {
            (true, true) | (false, false) => stop_time.arrival,
            (true, false) | (false, true) => stop_time.departure,
        };

        if from_target {
            if direction * route_time > direction * transfer.target_time {
                return;
            }
            let combined = Label {
                source_time: route.source_time,
                target_time: route_time,
                kind: route.kind,
                stop_idx: transfer.stop_idx,
                previous: route.previous,
            };
            labels.remove(0);
            labels[0] = combined;
        } else {
            if direction * route_time < direction * transfer.source_time {
                return;
            }
            let combined = Label {
                source_time: route_time,
                target_time: route.target_time,
                kind: route.kind,
                stop_idx: route.stop_idx,
                previous: transfer.previous,
            };
            labels.truncate(labels.len() - 2);
            labels.push(combined);
        }
    }

    fn can_stop_time_be_source(&self, stop_time: &StopTime, route: &Label, transfer: &Label) -> bool {
        match self.time_type {
            TimeType::Departure => {
                stop_time.departure <= route.target_time && stop_time.departure >= transfer.source_time
            }
            TimeType::Arrival => {
                stop_time.arrival >= route.target_time && stop_time.arrival <= transfer.source_time
            }
        }
    }

    fn can_stop_time_be_target(&self, stop_time: &StopTime, route: &Label, transfer: &Label) -> bool {
        match self.time_type {
            TimeType::Departure => {
                stop_time.arrival >= route.source_time && stop_time.arrival <= transfer.target_time
            }
            TimeType::Arrival => {
                stop_time.departure <= route.source_time && stop_time.departure >= transfer.target_time
            }
        }
    }

    /// Shifted stop time of the trip at the first visit of `stop_idx`, if
    /// the route serves that stop.
    fn trip_stop_time(
        &self,
        stop_idx: usize,
        route_idx: usize,
        trip_offset: usize,
        day_idx: usize,
    ) -> Option<StopTime> {
        let stop_offset = self
            .network
            .route_stops(route_idx)
            .iter()
            .position(|route_stop| route_stop.stop_idx == stop_idx)?;
        let day = &self.days[day_idx];
        let route = &self.network.routes()[route_idx];
        let stop_time = stop_time_at(&day.stop_times, route, trip_offset, stop_offset);
        if stop_time.arrival == NO_TRIP {
            return None;
        }
        Some(StopTime {
            arrival: stop_time.arrival + day.shift(),
            departure: stop_time.departure + day.shift(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::QueryConfig;
    use crate::mask::{NoMaskProvider, TripMaskProvider};
    use crate::network::NetworkBuilder;
    use crate::stop_times::StopTimeProvider;

    fn reference_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
    }

    /// R1: A-B-C (Zurich), one trip at 08:00 local, 10 minutes between stops.
    /// Walks B-D and A-B.
    fn network() -> Arc<Network> {
        let mut builder = NetworkBuilder::new(0);
        for stop in ["A", "B", "C", "D"] {
            builder.add_stop(stop).unwrap();
        }
        builder
            .add_route("R1", chrono_tz::Europe::Zurich, &["A", "B", "C"])
            .unwrap()
            .add_trip("t0", "R1")
            .unwrap();
        for (position, stop) in ["A", "B", "C"].into_iter().enumerate() {
            let time = 8 * 3600 + 600 * position as i32;
            builder
                .add_stop_time("R1", "t0", position, stop, time, time)
                .unwrap();
        }
        builder
            .add_transfer("B", "D", 300)
            .unwrap()
            .add_transfer("A", "B", 900)
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    fn days(network: &Arc<Network>) -> Vec<DayStopTimes> {
        let mut masker = NoMaskProvider::default();
        masker.set_trip_ids(network.route_trip_ids());
        let provider = StopTimeProvider::new(network.clone(), Box::new(masker), 1);
        vec![DayStopTimes {
            day_offset: 0,
            stop_times: provider.stop_times_for_date(reference_date(), &QueryConfig::default()),
        }]
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn idx(network: &Network, stop: &str) -> usize {
        network.stop_index(stop).unwrap()
    }

    fn initial(state: &mut QueryState, stop_idx: usize, time: i32) -> LabelId {
        state.set_label(
            0,
            Label {
                source_time: 0,
                target_time: time,
                kind: LabelKind::Initial,
                stop_idx,
                previous: None,
            },
        )
    }

    fn route_label(stop_idx: usize, source: i32, target: i32, previous: LabelId) -> Label {
        Label {
            source_time: source,
            target_time: target,
            kind: LabelKind::Route {
                route_idx: 0,
                trip_offset: 0,
                day_idx: 0,
            },
            stop_idx,
            previous: Some(previous),
        }
    }

    fn transfer_label(stop_idx: usize, source: i32, target: i32, previous: LabelId) -> Label {
        Label {
            source_time: source,
            target_time: target,
            kind: LabelKind::Transfer { transfer_idx: 0 },
            stop_idx,
            previous: Some(previous),
        }
    }

    // 08:00 Zurich is 07:00 UTC
    const DEP: i32 = 7 * 3600;

    #[test]
    fn route_then_walk_becomes_connection() {
        let network = network();
        let days = days(&network);
        let mut state = QueryState::new(network.stops().len(), TimeType::Departure);
        let start = initial(&mut state, idx(&network, "A"), DEP);
        let round = state.add_round();
        let ride = state.set_label(round, route_label(idx(&network, "B"), DEP, DEP + 600, start));
        state.set_label(round, transfer_label(idx(&network, "D"), DEP + 600, DEP + 900, ride));

        let postprocessor =
            LabelPostprocessor::new(&network, &days, TimeType::Departure, reference_date(), offset());
        let connections = postprocessor.pareto_optimal_connections(&state, &[(idx(&network, "D"), 0)]);

        assert_eq!(connections.len(), 1);
        let connection = &connections[0];
        assert_eq!(connection.route_legs(), 1);
        assert_eq!(connection.walk_transfers(), 1);
        assert_eq!(connection.legs()[1].route_id, "transfer_B_D");
        assert_eq!(connection.departure_time().to_rfc3339(), "2021-01-01T08:00:00+01:00");
        // walk arrival takes the zone of the preceding route leg
        assert_eq!(connection.arrival_time().to_rfc3339(), "2021-01-01T08:15:00+01:00");
    }

    #[test]
    fn walk_to_stop_on_trip_is_collapsed() {
        let network = network();
        let days = days(&network);
        let mut state = QueryState::new(network.stops().len(), TimeType::Departure);
        let start = initial(&mut state, idx(&network, "A"), DEP);
        let round = state.add_round();
        // rode to B, then walked to C arriving 08:25 although the trip is there at 08:20
        let ride = state.set_label(round, route_label(idx(&network, "B"), DEP, DEP + 600, start));
        state.set_label(round, transfer_label(idx(&network, "C"), DEP + 600, DEP + 1500, ride));

        let postprocessor =
            LabelPostprocessor::new(&network, &days, TimeType::Departure, reference_date(), offset());
        let connections = postprocessor.pareto_optimal_connections(&state, &[(idx(&network, "C"), 0)]);

        let connection = &connections[0];
        assert_eq!(connection.legs().len(), 1);
        assert_eq!(connection.to_stop_id(), "C");
        assert_eq!(connection.arrival_time().to_rfc3339(), "2021-01-01T08:20:00+01:00");
    }

    #[test]
    fn source_walk_is_moved_next_to_route() {
        let network = network();
        let days = days(&network);
        let mut state = QueryState::new(network.stops().len(), TimeType::Departure);
        // walk D->B is not in the network, but labels only need consistent stops
        let start = initial(&mut state, idx(&network, "D"), DEP);
        let walk = state.set_label(0, transfer_label(idx(&network, "B"), DEP, DEP + 300, start));
        let round = state.add_round();
        state.set_label(round, route_label(idx(&network, "C"), DEP + 600, DEP + 1200, walk));

        let postprocessor =
            LabelPostprocessor::new(&network, &days, TimeType::Departure, reference_date(), offset());
        let connections = postprocessor.pareto_optimal_connections(&state, &[(idx(&network, "C"), 0)]);

        let connection = &connections[0];
        assert_eq!(connection.legs().len(), 2);
        assert_eq!(connection.departure_time().to_rfc3339(), "2021-01-01T08:05:00+01:00");
        assert_eq!(connection.legs()[0].arrival_time, connection.legs()[1].departure_time);
    }

    #[test]
    fn pareto_keeps_only_improving_rounds() {
        let network = network();
        let days = days(&network);
        let mut state = QueryState::new(network.stops().len(), TimeType::Departure);
        let start = initial(&mut state, idx(&network, "A"), DEP);
        let c = idx(&network, "C");
        let round = state.add_round();
        state.set_label(round, route_label(c, DEP, DEP + 1200, start));
        // a later round reaching C no better is not reported
        let round = state.add_round();
        state.set_label(round, route_label(c, DEP, DEP + 1200, start));

        let postprocessor =
            LabelPostprocessor::new(&network, &days, TimeType::Departure, reference_date(), offset());
        assert_eq!(postprocessor.pareto_optimal_connections(&state, &[(c, 0)]).len(), 1);
    }

    #[test]
    fn isolines_skip_sources() {
        let network = network();
        let days = days(&network);
        let mut state = QueryState::new(network.stops().len(), TimeType::Departure);
        let start = initial(&mut state, idx(&network, "A"), DEP);
        let round = state.add_round();
        state.set_label(round, route_label(idx(&network, "B"), DEP, DEP + 600, start));
        state.set_label(round, route_label(idx(&network, "C"), DEP, DEP + 1200, start));

        let postprocessor =
            LabelPostprocessor::new(&network, &days, TimeType::Departure, reference_date(), offset());
        let isolines = postprocessor.isolines(&state);

        assert_eq!(isolines.len(), 2);
        assert!(!isolines.contains_key("A"));
        assert_eq!(isolines["C"].from_stop_id(), "A");
    }

    #[test]
    fn walk_only_connection_uses_reference_offset() {
        let network = network();
        let days = days(&network);
        let mut state = QueryState::new(network.stops().len(), TimeType::Departure);
        let start = initial(&mut state, idx(&network, "A"), DEP);
        state.set_label(0, transfer_label(idx(&network, "B"), DEP, DEP + 900, start));

        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let postprocessor =
            LabelPostprocessor::new(&network, &days, TimeType::Departure, reference_date(), tokyo);
        let connections = postprocessor.pareto_optimal_connections(&state, &[(idx(&network, "B"), 0)]);

        assert_eq!(connections[0].departure_time().to_rfc3339(), "2021-01-01T16:00:00+09:00");
        assert_eq!(connections[0].legs()[0].leg_type, LegType::WalkTransfer);
    }
}
