//! Routing results.
//!
//! A [`Connection`] is an ordered chain of [`Leg`]s: vehicle rides and
//! walking transfers. Legs are chained in space (each leg starts where the
//! previous one ended) and in time (no leg departs before the previous one
//! arrived).

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegType {
    /// Ride on a trip of a route
    Route,
    /// Walk between two stops
    WalkTransfer,
}

/// One leg of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leg {
    /// Route id, or a synthetic `transfer_{from}_{to}` id for walks.
    pub route_id: String,
    /// Trip id, `None` for walks.
    pub trip_id: Option<String>,
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub departure_time: DateTime<FixedOffset>,
    pub arrival_time: DateTime<FixedOffset>,
    pub leg_type: LegType,
}

impl Leg {
    pub fn is_route(&self) -> bool {
        self.leg_type == LegType::Route
    }

    pub fn is_walk(&self) -> bool {
        self.leg_type == LegType::WalkTransfer
    }

    /// Duration of the leg in seconds.
    pub fn duration_seconds(&self) -> i64 {
        (self.arrival_time - self.departure_time).num_seconds()
    }
}

/// A complete connection from a source stop to a target stop.
///
/// # Invariants
///
/// - At least one leg
/// - Consecutive legs connect (`to_stop_id` of one = `from_stop_id` of next)
/// - Every leg arrives no earlier than it departs
/// - No leg departs before the previous leg arrives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    legs: Vec<Leg>,
}

impl Connection {
    /// Validates legs given in travel order.
    ///
    /// # Errors
    ///
    /// Returns `Err` if there are no legs, or if the legs do not form a chain
    /// in space and time.
    pub fn new(legs: Vec<Leg>) -> Result<Self, ConnectionError> {
        if legs.is_empty() {
            return Err(ConnectionError::Empty);
        }

        for leg in &legs {
            if leg.arrival_time < leg.departure_time {
                return Err(ConnectionError::ArrivalBeforeDeparture {
                    from: leg.from_stop_id.clone(),
                    to: leg.to_stop_id.clone(),
                });
            }
        }

        for pair in legs.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            if current.to_stop_id != next.from_stop_id {
                return Err(ConnectionError::NotChained {
                    previous_to: current.to_stop_id.clone(),
                    from: next.from_stop_id.clone(),
                });
            }
            if current.arrival_time > next.departure_time {
                return Err(ConnectionError::Overlapping {
                    from: next.from_stop_id.clone(),
                });
            }
        }

        Ok(Self { legs })
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    // Both accessors below index the non-empty legs vector.

    pub fn first_leg(&self) -> &Leg {
        &self.legs[0]
    }

    pub fn last_leg(&self) -> &Leg {
        &self.legs[self.legs.len() - 1]
    }

    pub fn departure_time(&self) -> DateTime<FixedOffset> {
        self.first_leg().departure_time
    }

    pub fn arrival_time(&self) -> DateTime<FixedOffset> {
        self.last_leg().arrival_time
    }

    pub fn from_stop_id(&self) -> &str {
        &self.first_leg().from_stop_id
    }

    pub fn to_stop_id(&self) -> &str {
        &self.last_leg().to_stop_id
    }

    /// Total travel time in seconds.
    pub fn duration_seconds(&self) -> i64 {
        (self.arrival_time() - self.departure_time()).num_seconds()
    }

    /// Number of walking legs.
    pub fn walk_transfers(&self) -> usize {
        self.legs.iter().filter(|leg| leg.is_walk()).count()
    }

    /// Number of vehicle legs.
    pub fn route_legs(&self) -> usize {
        self.legs.iter().filter(|leg| leg.is_route()).count()
    }

    /// Changes between two trips at the same stop without walking.
    pub fn same_stop_transfers(&self) -> usize {
        self.legs
            .windows(2)
            .filter(|pair| pair[0].is_route() && pair[1].is_route())
            .count()
    }

    pub fn total_transfers(&self) -> usize {
        self.walk_transfers() + self.same_stop_transfers()
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::tests::route_leg;
    use super::*;

    prop_compose! {
        /// A chain of route legs with random ride and wait minutes.
        fn arb_chain()(steps in prop::collection::vec((1u32..20, 0u32..10), 1..6)) -> Vec<Leg> {
            let mut legs = Vec::new();
            let mut minute = 0;
            for (i, (ride, wait)) in steps.into_iter().enumerate() {
                let dep = minute + wait;
                let arr = dep + ride;
                let from = format!("S{i}");
                let to = format!("S{}", i + 1);
                legs.push(route_leg(&from, &to, (8 + dep / 60, dep % 60), (8 + arr / 60, arr % 60)));
                minute = arr;
            }
            legs
        }
    }

    proptest! {
        #[test]
        fn chained_legs_are_accepted(legs in arb_chain()) {
            let connection = Connection::new(legs.clone()).unwrap();
            prop_assert_eq!(connection.route_legs(), legs.len());
            prop_assert_eq!(connection.same_stop_transfers(), legs.len() - 1);
            prop_assert!(connection.duration_seconds() >= 0);
            prop_assert_eq!(connection.from_stop_id(), "S0");
        }

        #[test]
        fn rotated_chains_are_rejected(legs in arb_chain(), seed in any::<u64>()) {
            prop_assume!(legs.len() > 1);
            let mut rotated = legs;
            let shift = 1 + (seed as usize) % (rotated.len() - 1);
            rotated.rotate_left(shift);

            prop_assert!(Connection::new(rotated).is_err());
        }
    }
}
