//! Trip masking: which trips of which routes run on a calendar date.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::QueryConfig;

/// Marker stored in stop-time arrays for trips that do not run.
pub const NO_TRIP: i32 = i32::MIN;

/// Active trips of one route on one day, indexed by trip offset (trips are
/// sorted by departure at the first stop).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTripMask(pub Vec<bool>);

impl RouteTripMask {
    pub fn all_active(trips: usize) -> Self {
        Self(vec![true; trips])
    }

    pub fn none_active(trips: usize) -> Self {
        Self(vec![false; trips])
    }

    pub fn active_count(&self) -> usize {
        self.0.iter().filter(|active| **active).count()
    }
}

/// Trip masks of all routes for one service day.
#[derive(Debug, Clone)]
pub struct DayTripMask {
    /// Identical for all dates sharing a service pattern.
    pub service_id: String,
    pub date: NaiveDate,
    pub route_masks: HashMap<String, RouteTripMask>,
}

/// Source of trip masks.
///
/// Implementations are consulted lazily per date; results are cached by
/// service id, so dates reporting the same service id must produce the same
/// masks for the same query restrictions.
pub trait TripMaskProvider: Send + Sync {
    /// Receives the trip ids of every route, ordered by trip offset.
    /// Called once when the router is constructed.
    fn set_trip_ids(&mut self, route_trip_ids: HashMap<String, Vec<String>>);

    fn service_id_for(&self, date: NaiveDate) -> String;

    fn day_trip_mask(&self, date: NaiveDate, config: &QueryConfig) -> DayTripMask;
}

/// Provider that runs every trip on every day.
#[derive(Debug, Default, Clone)]
pub struct NoMaskProvider {
    trip_counts: HashMap<String, usize>,
}

/// Service id reported by [`NoMaskProvider`] for every date.
const NO_MASK_SERVICE_ID: &str = "NoMask";

impl TripMaskProvider for NoMaskProvider {
    fn set_trip_ids(&mut self, route_trip_ids: HashMap<String, Vec<String>>) {
        self.trip_counts = route_trip_ids
            .into_iter()
            .map(|(route_id, trip_ids)| (route_id, trip_ids.len()))
            .collect();
    }

    fn service_id_for(&self, _date: NaiveDate) -> String {
        NO_MASK_SERVICE_ID.to_string()
    }

    fn day_trip_mask(&self, date: NaiveDate, _config: &QueryConfig) -> DayTripMask {
        DayTripMask {
            service_id: NO_MASK_SERVICE_ID.to_string(),
            date,
            route_masks: self
                .trip_counts
                .iter()
                .map(|(route_id, trips)| (route_id.clone(), RouteTripMask::all_active(*trips)))
                .collect(),
        }
    }
}
