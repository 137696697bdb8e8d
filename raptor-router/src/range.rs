//! Range RAPTOR.
//!
//! A single query anchored at one instant boards the first possible trip,
//! even when leaving a little later would arrive just as early. Range
//! queries repeat the search at anchors spread over a window and keep the
//! connections that are not dominated in (arrival time, route legs),
//! preferring the latest departure among equals.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset};

use crate::config::TimeType;
use crate::connection::Connection;

/// Offsets (seconds) added to the query times of every sampled anchor:
/// `0, stride, 2 * stride, ... <= range`, negated for arrival queries.
pub(crate) fn anchor_offsets(range: i32, stride: i32, time_type: TimeType) -> Vec<i32> {
    if range <= 0 || stride <= 0 {
        return vec![0];
    }
    let step = usize::try_from(stride).unwrap_or(usize::MAX);
    (0..=range)
        .step_by(step)
        .map(|offset| offset * time_type.direction())
        .collect()
}

/// True if the fixed end of `connection` lies inside the window of the
/// requested time at its stop. Connections from stops without a requested
/// time are kept.
pub(crate) fn within_window(
    connection: &Connection,
    requested: &HashMap<String, DateTime<FixedOffset>>,
    range: i32,
    time_type: TimeType,
) -> bool {
    let range = Duration::seconds(i64::from(range.max(0)));
    match time_type {
        TimeType::Departure => requested
            .get(connection.from_stop_id())
            .is_none_or(|&start| {
                let departure = connection.departure_time();
                departure >= start && departure <= start + range
            }),
        TimeType::Arrival => requested
            .get(connection.to_stop_id())
            .is_none_or(|&end| {
                let arrival = connection.arrival_time();
                arrival <= end && arrival >= end - range
            }),
    }
}

/// Keeps connections that improve the time at the open end over every
/// connection with at most as many route legs. Among equivalent connections
/// the one spending the least time is kept. Sorted by route legs.
pub(crate) fn pareto_filter(mut connections: Vec<Connection>, time_type: TimeType) -> Vec<Connection> {
    connections.sort_by(|a, b| {
        a.route_legs()
            .cmp(&b.route_legs())
            .then_with(|| compare_open_end(a, b, time_type))
            .then_with(|| compare_fixed_end(a, b, time_type))
    });

    let mut best: Option<DateTime<FixedOffset>> = None;
    connections
        .into_iter()
        .filter(|connection| {
            let time = open_end(connection, time_type);
            let improves = best.is_none_or(|best| match time_type {
                TimeType::Departure => time < best,
                TimeType::Arrival => time > best,
            });
            if improves {
                best = Some(time);
            }
            improves
        })
        .collect()
}

/// Arrival for departure queries, departure for arrival queries.
fn open_end(connection: &Connection, time_type: TimeType) -> DateTime<FixedOffset> {
    match time_type {
        TimeType::Departure => connection.arrival_time(),
        TimeType::Arrival => connection.departure_time(),
    }
}

/// Best open end first.
fn compare_open_end(a: &Connection, b: &Connection, time_type: TimeType) -> Ordering {
    match time_type {
        TimeType::Departure => a.arrival_time().cmp(&b.arrival_time()),
        TimeType::Arrival => b.departure_time().cmp(&a.departure_time()),
    }
}

/// Latest departure (earliest arrival for arrival queries) first.
fn compare_fixed_end(a: &Connection, b: &Connection, time_type: TimeType) -> Ordering {
    match time_type {
        TimeType::Departure => b.departure_time().cmp(&a.departure_time()),
        TimeType::Arrival => a.arrival_time().cmp(&b.arrival_time()),
    }
}
