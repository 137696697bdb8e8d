//! Router error types.
//!
//! Build errors abort network construction and name the offending entity.
//! Routing errors fail a single query and leave the shared network and
//! stop-time cache untouched.

/// Errors raised while assembling a network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Stop id was added twice
    #[error("stop {0} already exists")]
    DuplicateStop(String),

    /// Stop id is not part of the network
    #[error("stop {0} does not exist")]
    UnknownStop(String),

    /// Route id was added twice
    #[error("route {0} already exists")]
    DuplicateRoute(String),

    /// Route id is not part of the network
    #[error("route {0} does not exist")]
    UnknownRoute(String),

    /// Route has too few stops or no trips
    #[error("route {route}: {reason}")]
    EmptyRoute { route: String, reason: &'static str },

    /// Trip id was added twice to a route
    #[error("trip {trip} already exists on route {route}")]
    DuplicateTrip { route: String, trip: String },

    /// Trip id is not part of the route
    #[error("trip {trip} does not exist on route {route}")]
    UnknownTrip { route: String, trip: String },

    /// Stop time position outside the route's stop sequence
    #[error("position {position} is out of bounds for route {route} with {stops} stops")]
    PositionOutOfBounds {
        route: String,
        position: usize,
        stops: usize,
    },

    /// Stop time references a different stop than the route visits at that position
    #[error("stop {stop} does not match stop {expected} at position {position} of route {route}")]
    StopMismatch {
        route: String,
        position: usize,
        stop: String,
        expected: String,
    },

    /// Stop time was set twice
    #[error("stop time for trip {trip} at position {position} is already set")]
    StopTimeAlreadySet { trip: String, position: usize },

    /// Arrival later than departure at the same stop
    #[error("arrival {arrival} is after departure {departure} for trip {trip} at position {position}")]
    ArrivalAfterDeparture {
        trip: String,
        position: usize,
        arrival: i32,
        departure: i32,
    },

    /// Times are not monotonic along the trip
    #[error("times of trip {trip} are not monotonic around position {position}")]
    NonMonotonicTimes { trip: String, position: usize },

    /// Trip is missing stop times when the network is built
    #[error("trip {trip} on route {route} is missing the stop time at position {position}")]
    IncompleteTrip {
        route: String,
        trip: String,
        position: usize,
    },

    /// Transfer or same-stop duration is negative
    #[error("transfer from {source_stop} to {target_stop} has negative duration {duration}")]
    NegativeDuration {
        source_stop: String,
        target_stop: String,
        duration: i32,
    },
}

/// Errors surfaced to callers of the routing facade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// None of the requested stops exist in the network
    #[error("invalid stop: {0}")]
    InvalidStop(String),

    /// Requested times are unusable (e.g. spread over more than a day)
    #[error("invalid time: {0}")]
    InvalidTime(String),

    /// Degenerate query input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Legs that do not form a valid connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection has no legs")]
    Empty,

    /// A leg does not start where the previous one ended
    #[error("leg from {from} does not continue from {previous_to}")]
    NotChained { previous_to: String, from: String },

    #[error("leg from {from} to {to} arrives before it departs")]
    ArrivalBeforeDeparture { from: String, to: String },

    /// A leg departs before the previous one arrives
    #[error("leg from {from} departs before the previous leg arrives")]
    Overlapping { from: String },
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid configuration: {field} {requirement}, got {value}")]
pub struct ConfigError {
    pub field: &'static str,
    pub requirement: &'static str,
    pub value: i64,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, requirement: &'static str, value: impl Into<i64>) -> Self {
        Self {
            field,
            requirement,
            value: value.into(),
        }
    }
}
