//! Routing facade.
//!
//! [`RaptorRouter`] validates stop-id based requests, converts instants onto
//! the internal time line of the reference date, runs the query (several
//! times for range RAPTOR) and turns the labels into connections.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::{QueryConfig, RaptorConfig, TimeType};
use crate::connection::Connection;
use crate::error::{ConfigError, RoutingError};
use crate::network::Network;
use crate::postprocess::LabelPostprocessor;
use crate::query::{DayStopTimes, Query};
use crate::range::{anchor_offsets, pareto_filter, within_window};
use crate::stop_times::StopTimeProvider;
use crate::time::{reference_datetime, to_utc_seconds};

/// Largest allowed spread of the requested times of one query.
const MAX_TIME_SPREAD_HOURS: i64 = 24;

/// Validated request in network indices.
struct PreparedRequest {
    /// Stops with a requested instant, sorted by stop index.
    timed: Vec<(usize, DateTime<FixedOffset>)>,
    /// Stops with a walk handicap, sorted by stop index.
    walks: Vec<(usize, i32)>,
    reference: DateTime<FixedOffset>,
}

/// Public-transit router over an immutable network.
pub struct RaptorRouter {
    network: Arc<Network>,
    stop_time_provider: StopTimeProvider,
    days_to_scan: u32,
    raptor_range: i32,
    range_stride: i32,
}

impl RaptorRouter {
    /// Create a router. The trip mask provider of `config` learns the trip
    /// ids of every route here.
    pub fn new(network: Network, config: RaptorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let RaptorConfig {
            days_to_scan,
            raptor_range,
            range_stride,
            stop_time_cache_size,
            mut trip_mask_provider,
            ..
        } = config;

        let network = Arc::new(network);
        trip_mask_provider.set_trip_ids(network.route_trip_ids());
        let stop_time_provider =
            StopTimeProvider::new(network.clone(), trip_mask_provider, stop_time_cache_size);

        info!(
            stops = network.stops().len(),
            routes = network.routes().len(),
            days_to_scan,
            raptor_range,
            "Router initialised"
        );

        Ok(Self {
            network,
            stop_time_provider,
            days_to_scan,
            raptor_range,
            range_stride,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Builds the stop-time arrays that queries on `date` with `config` scan,
    /// so the first such query finds them cached. Arrays depend on the
    /// accessibility and travel-mode filters of `config`.
    pub fn prepare_stop_times_for_date(&self, date: NaiveDate, config: &QueryConfig) {
        let mut prepared = 0;
        for day_offset in self.day_offsets() {
            let Some(day) = date.checked_add_signed(Duration::days(i64::from(day_offset))) else {
                continue;
            };
            self.stop_time_provider.stop_times_for_date(day, config);
            prepared += 1;
        }
        debug!(date = %date, days = prepared, "Prepared stop times");
    }

    /// Connections leaving the source stops at or after their departure
    /// instants, one per number of rounds that improved the arrival at any
    /// target (arrival plus the target's walk handicap).
    pub fn route_earliest_arrival(
        &self,
        sources: &HashMap<String, DateTime<FixedOffset>>,
        targets: &HashMap<String, i32>,
        config: &QueryConfig,
    ) -> Result<Vec<Connection>, RoutingError> {
        self.route_connections(sources, targets, TimeType::Departure, config)
    }

    /// Connections reaching the target stops at or before their arrival
    /// instants, leaving the sources as late as possible.
    pub fn route_latest_departure(
        &self,
        sources: &HashMap<String, i32>,
        targets: &HashMap<String, DateTime<FixedOffset>>,
        config: &QueryConfig,
    ) -> Result<Vec<Connection>, RoutingError> {
        self.route_connections(targets, sources, TimeType::Arrival, config)
    }

    /// Best connection to (departure) or from (arrival) every reachable stop.
    pub fn route_isolines(
        &self,
        sources: &HashMap<String, DateTime<FixedOffset>>,
        time_type: TimeType,
        config: &QueryConfig,
    ) -> Result<HashMap<String, Connection>, RoutingError> {
        validate_config(config)?;
        let request = self.prepare(sources, &HashMap::new(), time_type)?;
        let reference_date = request.reference.date_naive();
        let days = self.scanned_days(reference_date, config);
        debug!(sources = request.timed.len(), ?time_type, "Routing isolines");

        let sources = internal_times(&request.timed, reference_date, 0);
        let state = Query::new(&self.network, &days, sources, Vec::new(), config, time_type).run();
        let postprocessor = LabelPostprocessor::new(
            &self.network,
            &days,
            time_type,
            reference_date,
            *request.reference.offset(),
        );
        Ok(postprocessor.isolines(&state))
    }

    /// `timed` holds the stops with fixed instants (sources of departure
    /// queries, targets of arrival queries), `walks` the other end.
    fn route_connections(
        &self,
        timed: &HashMap<String, DateTime<FixedOffset>>,
        walks: &HashMap<String, i32>,
        time_type: TimeType,
        config: &QueryConfig,
    ) -> Result<Vec<Connection>, RoutingError> {
        validate_config(config)?;
        if walks.is_empty() {
            return Err(RoutingError::InvalidArgument(format!(
                "{} stops must not be empty",
                walk_role(time_type)
            )));
        }
        let request = self.prepare(timed, walks, time_type)?;
        let reference_date = request.reference.date_naive();
        let days = self.scanned_days(reference_date, config);
        debug!(
            timed = request.timed.len(),
            walks = request.walks.len(),
            ?time_type,
            reference = %request.reference,
            "Routing connections"
        );

        let postprocessor = LabelPostprocessor::new(
            &self.network,
            &days,
            time_type,
            reference_date,
            *request.reference.offset(),
        );
        let run = |offset: i32| {
            let sources = internal_times(&request.timed, reference_date, offset);
            let state = Query::new(
                &self.network,
                &days,
                sources,
                request.walks.clone(),
                config,
                time_type,
            )
            .run();
            postprocessor.pareto_optimal_connections(&state, &request.walks)
        };

        if self.raptor_range <= 0 {
            return Ok(run(0));
        }

        // The anchor at the requested time is kept whole; later anchors only
        // contribute connections inside the window.
        let offsets = anchor_offsets(self.raptor_range, self.range_stride, time_type);
        let sampled = offsets.len();
        let mut connections = run(0);
        for offset in offsets.into_iter().filter(|&offset| offset != 0) {
            connections.extend(
                run(offset)
                    .into_iter()
                    .filter(|connection| within_window(connection, timed, self.raptor_range, time_type)),
            );
        }
        let connections = pareto_filter(connections, time_type);
        debug!(anchors = sampled, connections = connections.len(), "Range query finished");
        Ok(connections)
    }

    fn prepare(
        &self,
        timed: &HashMap<String, DateTime<FixedOffset>>,
        walks: &HashMap<String, i32>,
        time_type: TimeType,
    ) -> Result<PreparedRequest, RoutingError> {
        let timed_role = timed_role(time_type);
        if timed.is_empty() {
            return Err(RoutingError::InvalidArgument(format!(
                "{timed_role} stops must not be empty"
            )));
        }
        let timed_stops = self.known_stops(timed, timed_role)?;

        let walk_stops = if walks.is_empty() {
            Vec::new()
        } else {
            self.known_stops(walks, walk_role(time_type))?
        };
        if let Some((stop_idx, walk)) = walk_stops.iter().find(|(_, walk)| *walk < 0) {
            return Err(RoutingError::InvalidArgument(format!(
                "walk duration to stop {} must not be negative, got {walk}",
                self.network.stops()[*stop_idx].id
            )));
        }

        let timed_indices: HashSet<usize> = timed_stops.iter().map(|(stop_idx, _)| *stop_idx).collect();
        if let Some((stop_idx, _)) = walk_stops.iter().find(|(stop_idx, _)| timed_indices.contains(stop_idx)) {
            return Err(RoutingError::InvalidArgument(format!(
                "stop {} is both a source and a target",
                self.network.stops()[*stop_idx].id
            )));
        }

        let earliest = timed_stops.iter().map(|(_, time)| *time).min();
        let latest = timed_stops.iter().map(|(_, time)| *time).max();
        if let (Some(earliest), Some(latest)) = (earliest, latest)
            && latest - earliest > Duration::hours(MAX_TIME_SPREAD_HOURS)
        {
            return Err(RoutingError::InvalidTime(format!(
                "{timed_role} times must lie within {MAX_TIME_SPREAD_HOURS} hours"
            )));
        }

        let reference = reference_datetime(timed_stops.iter().map(|(_, time)| time), time_type)
            .ok_or_else(|| RoutingError::InvalidStop(format!("no valid {timed_role} stops")))?;

        Ok(PreparedRequest {
            timed: timed_stops,
            walks: walk_stops,
            reference,
        })
    }

    /// Resolves stop ids, dropping unknown ones as long as one remains.
    fn known_stops<T: Copy>(
        &self,
        stops: &HashMap<String, T>,
        role: &str,
    ) -> Result<Vec<(usize, T)>, RoutingError> {
        let mut known: Vec<(usize, T)> = stops
            .iter()
            .filter_map(|(id, value)| match self.network.stop_index(id) {
                Some(stop_idx) => Some((stop_idx, *value)),
                None => {
                    warn!(stop = %id, role, "Dropping unknown stop");
                    None
                }
            })
            .collect();
        if known.is_empty() {
            return Err(RoutingError::InvalidStop(format!("no valid {role} stops")));
        }
        known.sort_by_key(|(stop_idx, _)| *stop_idx);
        Ok(known)
    }

    /// Day offsets around the reference date that queries scan.
    fn day_offsets(&self) -> RangeInclusive<i32> {
        if self.days_to_scan >= 2 {
            let last = i32::try_from(self.days_to_scan).unwrap_or(i32::MAX) - 2;
            -1..=last
        } else {
            0..=0
        }
    }

    fn scanned_days(&self, reference_date: NaiveDate, config: &QueryConfig) -> Vec<DayStopTimes> {
        self.day_offsets()
            .filter_map(|day_offset| {
                let date = reference_date.checked_add_signed(Duration::days(i64::from(day_offset)))?;
                Some(DayStopTimes {
                    day_offset,
                    stop_times: self.stop_time_provider.stop_times_for_date(date, config),
                })
            })
            .collect()
    }

    /// Number of cached date-specific stop-time arrays.
    pub fn cached_stop_time_arrays(&self) -> u64 {
        self.stop_time_provider.entry_count()
    }
}

fn validate_config(config: &QueryConfig) -> Result<(), RoutingError> {
    config
        .validate()
        .map_err(|err| RoutingError::InvalidArgument(err.to_string()))
}

fn timed_role(time_type: TimeType) -> &'static str {
    match time_type {
        TimeType::Departure => "source",
        TimeType::Arrival => "target",
    }
}

fn walk_role(time_type: TimeType) -> &'static str {
    match time_type {
        TimeType::Departure => "target",
        TimeType::Arrival => "source",
    }
}

/// Requested instants as seconds after UTC midnight of `reference_date`,
/// moved by `offset` seconds.
fn internal_times(
    timed: &[(usize, DateTime<FixedOffset>)],
    reference_date: NaiveDate,
    offset: i32,
) -> Vec<(usize, i32)> {
    timed
        .iter()
        .map(|(stop_idx, time)| (*stop_idx, to_utc_seconds(time, reference_date).saturating_add(offset)))
        .collect()
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
