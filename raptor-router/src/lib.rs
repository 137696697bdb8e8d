//! RAPTOR public-transit router.
//!
//! Answers earliest-arrival, latest-departure and isoline queries over a
//! multi-day schedule whose routes may run in different time zones. Results
//! are Pareto-optimal in arrival (departure) time and number of route legs.

pub mod calendar;
pub mod config;
pub mod connection;
pub mod error;
pub mod mask;
pub mod network;
pub mod router;
pub mod schedule;
pub mod service;
pub mod stop_times;
pub mod time;

pub(crate) mod postprocess;
pub(crate) mod query;
pub(crate) mod range;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{QueryConfig, RaptorConfig, TimeType, TravelMode};
pub use connection::{Connection, Leg, LegType};
pub use error::{BuildError, ConfigError, ConnectionError, RoutingError};
pub use network::{Network, NetworkBuilder};
pub use router::RaptorRouter;
