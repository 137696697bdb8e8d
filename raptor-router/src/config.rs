//! Router and query configuration.

use std::collections::BTreeSet;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mask::{NoMaskProvider, TripMaskProvider};

/// Unbounded value for durations and counts measured in seconds.
pub const INFINITY: i32 = i32::MAX;

/// Whether the query fixes departure times (earliest arrival) or arrival
/// times (latest departure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeType {
    Departure,
    Arrival,
}

impl TimeType {
    /// Value of the best-time array for stops that have not been reached.
    pub(crate) fn unreachable(self) -> i32 {
        match self {
            TimeType::Departure => INFINITY,
            TimeType::Arrival => -INFINITY,
        }
    }

    /// +1 when time flows forward through the query, -1 otherwise.
    pub(crate) fn direction(self) -> i32 {
        match self {
            TimeType::Departure => 1,
            TimeType::Arrival => -1,
        }
    }

    /// Returns true if `candidate` is strictly better than `current`.
    pub(crate) fn improves(self, candidate: i32, current: i32) -> bool {
        match self {
            TimeType::Departure => candidate < current,
            TimeType::Arrival => candidate > current,
        }
    }
}

/// Mode of transport operated on a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    Bus,
    Tram,
    Rail,
    Ship,
    Subway,
    AerialLift,
    Funicular,
}

impl TravelMode {
    pub const ALL: [TravelMode; 7] = [
        TravelMode::Bus,
        TravelMode::Tram,
        TravelMode::Rail,
        TravelMode::Ship,
        TravelMode::Subway,
        TravelMode::AerialLift,
        TravelMode::Funicular,
    ];
}

/// Per-query restrictions. All limits are in seconds; defaults are unrestricted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Longest single walking transfer that may be used.
    pub max_walk_duration: i32,

    /// Rest period added on top of every transfer.
    pub min_transfer_duration: i32,

    /// Maximum number of transfers between route legs.
    pub max_transfers: i32,

    /// Maximum total travel duration.
    pub max_travel_duration: i32,

    /// Relax footpaths from the source stops.
    pub allow_source_transfer: bool,

    /// Relax footpaths into the target stops.
    pub allow_target_transfer: bool,

    /// Relax footpaths from the source stops before the first route scan.
    /// When disabled, source footpaths are only tried once route scanning
    /// stops improving.
    pub allow_initial_transfer: bool,

    /// Only use trips that are wheelchair accessible.
    pub wheelchair_accessible: bool,

    /// Only use trips that allow bikes.
    pub bike_accessible: bool,

    /// Travel modes that may be used. Empty means all modes.
    pub allowed_travel_modes: BTreeSet<TravelMode>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_walk_duration: INFINITY,
            min_transfer_duration: 0,
            max_transfers: INFINITY,
            max_travel_duration: INFINITY,
            allow_source_transfer: true,
            allow_target_transfer: true,
            allow_initial_transfer: true,
            wheelchair_accessible: false,
            bike_accessible: false,
            allowed_travel_modes: TravelMode::ALL.into_iter().collect(),
        }
    }
}

impl QueryConfig {
    /// Create a configuration with the given limits (all in seconds).
    pub fn new(
        max_walk_duration: i32,
        min_transfer_duration: i32,
        max_transfers: i32,
        max_travel_duration: i32,
    ) -> Result<Self, ConfigError> {
        Self::default()
            .with_max_walk_duration(max_walk_duration)?
            .with_min_transfer_duration(min_transfer_duration)?
            .with_max_transfers(max_transfers)?
            .with_max_travel_duration(max_travel_duration)
    }

    pub fn with_max_walk_duration(mut self, seconds: i32) -> Result<Self, ConfigError> {
        self.max_walk_duration = seconds;
        self.validate()?;
        Ok(self)
    }

    pub fn with_min_transfer_duration(mut self, seconds: i32) -> Result<Self, ConfigError> {
        self.min_transfer_duration = seconds;
        self.validate()?;
        Ok(self)
    }

    pub fn with_max_transfers(mut self, transfers: i32) -> Result<Self, ConfigError> {
        self.max_transfers = transfers;
        self.validate()?;
        Ok(self)
    }

    pub fn with_max_travel_duration(mut self, seconds: i32) -> Result<Self, ConfigError> {
        self.max_travel_duration = seconds;
        self.validate()?;
        Ok(self)
    }

    /// Check every limit. Deserialized configurations are checked by the
    /// router before a query runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_walk_duration < 0 {
            return Err(ConfigError::new(
                "max_walk_duration",
                "must be greater than or equal to 0",
                self.max_walk_duration,
            ));
        }
        if self.min_transfer_duration < 0 {
            return Err(ConfigError::new(
                "min_transfer_duration",
                "must be greater than or equal to 0",
                self.min_transfer_duration,
            ));
        }
        if self.max_transfers < 0 {
            return Err(ConfigError::new(
                "max_transfers",
                "must be greater than or equal to 0",
                self.max_transfers,
            ));
        }
        if self.max_travel_duration <= 0 {
            return Err(ConfigError::new(
                "max_travel_duration",
                "must be greater than 0",
                self.max_travel_duration,
            ));
        }
        Ok(())
    }

    /// True if only a strict, non-empty subset of travel modes is allowed.
    pub fn needs_travel_mode_filtering(&self) -> bool {
        !self.allowed_travel_modes.is_empty()
            && self.allowed_travel_modes.len() < TravelMode::ALL.len()
    }

    /// Returns true if trips of the given mode may be used.
    pub fn allows_travel_mode(&self, mode: TravelMode) -> bool {
        !self.needs_travel_mode_filtering() || self.allowed_travel_modes.contains(&mode)
    }

    /// Returns the maximum walk as a Duration, `None` when unrestricted.
    pub fn max_walk(&self) -> Option<Duration> {
        bounded(self.max_walk_duration)
    }

    /// Returns the minimum transfer time as a Duration.
    pub fn min_transfer(&self) -> Duration {
        Duration::seconds(i64::from(self.min_transfer_duration))
    }

    /// Returns the maximum travel time as a Duration, `None` when unrestricted.
    pub fn max_travel(&self) -> Option<Duration> {
        bounded(self.max_travel_duration)
    }
}

fn bounded(seconds: i32) -> Option<Duration> {
    (seconds != INFINITY).then(|| Duration::seconds(i64::from(seconds)))
}

/// Router-wide configuration, fixed when the router is constructed.
pub struct RaptorConfig {
    /// Number of service days considered by a query: the previous day,
    /// the reference day and `days_to_scan - 2` following days. A value of
    /// 1 only scans the reference day.
    pub days_to_scan: u32,

    /// Same-stop transfer time for stops without an explicit one (seconds).
    pub default_same_stop_transfer_time: i32,

    /// Width of the range RAPTOR window (seconds). Non-positive disables it.
    pub raptor_range: i32,

    /// Distance between two sampled anchor instants of range RAPTOR (seconds).
    pub range_stride: i32,

    /// Number of date-specific stop-time arrays kept in memory.
    pub stop_time_cache_size: u64,

    /// Decides which trips run on a given date.
    pub trip_mask_provider: Box<dyn TripMaskProvider>,
}

impl Default for RaptorConfig {
    fn default() -> Self {
        Self {
            days_to_scan: 1,
            default_same_stop_transfer_time: 120,
            raptor_range: -1,
            range_stride: 60,
            stop_time_cache_size: 5,
            trip_mask_provider: Box::new(NoMaskProvider::default()),
        }
    }
}

impl RaptorConfig {
    /// Create a configuration with the given settings and no trip masking.
    pub fn new(
        days_to_scan: u32,
        default_same_stop_transfer_time: i32,
        raptor_range: i32,
        stop_time_cache_size: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            days_to_scan,
            default_same_stop_transfer_time,
            raptor_range,
            stop_time_cache_size,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_range_stride(mut self, seconds: i32) -> Result<Self, ConfigError> {
        self.range_stride = seconds;
        self.validate()?;
        Ok(self)
    }

    pub fn with_trip_mask_provider(mut self, provider: impl TripMaskProvider + 'static) -> Self {
        self.trip_mask_provider = Box::new(provider);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.days_to_scan == 0 {
            return Err(ConfigError::new(
                "days_to_scan",
                "must be greater than 0",
                self.days_to_scan,
            ));
        }
        if self.default_same_stop_transfer_time < 0 {
            return Err(ConfigError::new(
                "default_same_stop_transfer_time",
                "must be greater than or equal to 0",
                self.default_same_stop_transfer_time,
            ));
        }
        if self.range_stride <= 0 {
            return Err(ConfigError::new(
                "range_stride",
                "must be greater than 0",
                self.range_stride,
            ));
        }
        if self.stop_time_cache_size == 0 {
            return Err(ConfigError::new(
                "stop_time_cache_size",
                "must be greater than 0",
                0,
            ));
        }
        Ok(())
    }

    /// True if range RAPTOR sampling is enabled.
    pub fn uses_range(&self) -> bool {
        self.raptor_range > 0
    }
}

impl fmt::Debug for RaptorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaptorConfig")
            .field("days_to_scan", &self.days_to_scan)
            .field(
                "default_same_stop_transfer_time",
                &self.default_same_stop_transfer_time,
            )
            .field("raptor_range", &self.raptor_range)
            .field("range_stride", &self.range_stride)
            .field("stop_time_cache_size", &self.stop_time_cache_size)
            .finish_non_exhaustive()
    }
}
