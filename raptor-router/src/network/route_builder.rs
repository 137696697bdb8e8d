//! Accumulates the trips of a single route and checks them.

use std::collections::HashMap;

use chrono_tz::Tz;

use super::StopTime;
use crate::error::BuildError;

/// Trips of a route, validated and sorted by first departure.
#[derive(Debug)]
pub(super) struct RouteContainer {
    pub id: String,
    pub zone: Tz,
    pub stop_ids: Vec<String>,
    /// (trip id, stop times) in departure order.
    pub trips: Vec<(String, Vec<StopTime>)>,
}

impl RouteContainer {
    /// Departure of the first trip at the first stop.
    pub fn first_departure(&self) -> i32 {
        self.trips
            .first()
            .and_then(|(_, times)| times.first())
            .map_or(i32::MAX, |time| time.departure)
    }
}

#[derive(Debug)]
pub(super) struct RouteBuilder {
    id: String,
    zone: Tz,
    stop_ids: Vec<String>,
    trip_index: HashMap<String, usize>,
    trips: Vec<(String, Vec<Option<StopTime>>)>,
}

impl RouteBuilder {
    pub fn new(id: String, zone: Tz, stop_ids: Vec<String>) -> Self {
        Self {
            id,
            zone,
            stop_ids,
            trip_index: HashMap::new(),
            trips: Vec::new(),
        }
    }

    pub fn add_trip(&mut self, trip_id: &str) -> Result<(), BuildError> {
        if self.trip_index.contains_key(trip_id) {
            return Err(BuildError::DuplicateTrip {
                route: self.id.clone(),
                trip: trip_id.to_string(),
            });
        }
        self.trip_index.insert(trip_id.to_string(), self.trips.len());
        self.trips
            .push((trip_id.to_string(), vec![None; self.stop_ids.len()]));
        Ok(())
    }

    pub fn add_stop_time(
        &mut self,
        trip_id: &str,
        position: usize,
        stop_id: &str,
        stop_time: StopTime,
    ) -> Result<(), BuildError> {
        if position >= self.stop_ids.len() {
            return Err(BuildError::PositionOutOfBounds {
                route: self.id.clone(),
                position,
                stops: self.stop_ids.len(),
            });
        }

        let Some(&trip_idx) = self.trip_index.get(trip_id) else {
            return Err(BuildError::UnknownTrip {
                route: self.id.clone(),
                trip: trip_id.to_string(),
            });
        };

        if self.stop_ids[position] != stop_id {
            return Err(BuildError::StopMismatch {
                route: self.id.clone(),
                position,
                stop: stop_id.to_string(),
                expected: self.stop_ids[position].clone(),
            });
        }

        let times = &mut self.trips[trip_idx].1;
        if times[position].is_some() {
            return Err(BuildError::StopTimeAlreadySet {
                trip: trip_id.to_string(),
                position,
            });
        }

        if stop_time.arrival > stop_time.departure {
            return Err(BuildError::ArrivalAfterDeparture {
                trip: trip_id.to_string(),
                position,
                arrival: stop_time.arrival,
                departure: stop_time.departure,
            });
        }

        let previous = position
            .checked_sub(1)
            .and_then(|p| times[p]);
        if previous.is_some_and(|previous| previous.departure > stop_time.arrival) {
            return Err(BuildError::NonMonotonicTimes {
                trip: trip_id.to_string(),
                position,
            });
        }

        let next = times.get(position + 1).copied().flatten();
        if next.is_some_and(|next| stop_time.departure > next.arrival) {
            return Err(BuildError::NonMonotonicTimes {
                trip: trip_id.to_string(),
                position,
            });
        }

        times[position] = Some(stop_time);
        Ok(())
    }

    /// Checks that every trip visits every stop and sorts trips by their
    /// departure at the first stop.
    pub fn build(self) -> Result<RouteContainer, BuildError> {
        if self.trips.is_empty() {
            return Err(BuildError::EmptyRoute {
                route: self.id,
                reason: "route has no trips",
            });
        }

        let mut trips = Vec::with_capacity(self.trips.len());
        for (trip_id, times) in self.trips {
            let complete: Option<Vec<StopTime>> = times.iter().copied().collect();
            let Some(complete) = complete else {
                let position = times.iter().position(Option::is_none).unwrap_or_default();
                return Err(BuildError::IncompleteTrip {
                    route: self.id,
                    trip: trip_id,
                    position,
                });
            };
            trips.push((trip_id, complete));
        }

        trips.sort_by_key(|(_, times)| times[0].departure);

        Ok(RouteContainer {
            id: self.id,
            zone: self.zone,
            stop_ids: self.stop_ids,
            trips,
        })
    }
}
