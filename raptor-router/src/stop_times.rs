//! Date-specific stop-time arrays.
//!
//! The static network stores local service-day seconds for every trip. For a
//! concrete date the trip mask blanks out trips that do not run and every
//! remaining time is moved onto the UTC time line of that date. Many dates
//! share a service pattern, so arrays are cached by service id plus a
//! fingerprint of the zone offsets in effect on that date.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use moka::sync::Cache as MokaCache;
use tracing::debug;

use crate::config::QueryConfig;
use crate::mask::{NO_TRIP, TripMaskProvider};
use crate::network::Network;
use crate::time::local_to_utc_offset;

/// Shared date-specific stop-time array.
pub type StopTimes = Arc<Vec<i32>>;

/// Builds and caches stop-time arrays per service day.
pub struct StopTimeProvider {
    network: Arc<Network>,
    mask_provider: Box<dyn TripMaskProvider>,
    cache: MokaCache<String, StopTimes>,
}

impl StopTimeProvider {
    /// Create a provider keeping at most `cache_size` arrays.
    pub fn new(
        network: Arc<Network>,
        mask_provider: Box<dyn TripMaskProvider>,
        cache_size: u64,
    ) -> Self {
        Self {
            network,
            mask_provider,
            cache: MokaCache::builder().max_capacity(cache_size).build(),
        }
    }

    /// Stop times of `date` in UTC seconds relative to UTC midnight of `date`.
    ///
    /// Concurrent callers asking for the same key wait for a single
    /// computation.
    pub fn stop_times_for_date(&self, date: NaiveDate, config: &QueryConfig) -> StopTimes {
        let key = self.cache_key(date, config);
        self.cache
            .get_with(key, || Arc::new(self.create_stop_times(date, config)))
    }

    /// Number of cached arrays (for monitoring).
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    fn cache_key(&self, date: NaiveDate, config: &QueryConfig) -> String {
        let service_id = self.mask_provider.service_id_for(date);

        let offsets: BTreeSet<i32> = self
            .network
            .routes()
            .iter()
            .map(|route| local_to_utc_offset(date, &route.zone))
            .collect();
        let fingerprint = offsets
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let modes = if config.needs_travel_mode_filtering() {
            config
                .allowed_travel_modes
                .iter()
                .map(|mode| format!("{mode:?}"))
                .collect::<Vec<_>>()
                .join(",")
        } else {
            "all".to_string()
        };

        format!(
            "{service_id}|{fingerprint}|{}|{}|{modes}",
            config.wheelchair_accessible, config.bike_accessible
        )
    }

    fn create_stop_times(&self, date: NaiveDate, config: &QueryConfig) -> Vec<i32> {
        let mask = self.mask_provider.day_trip_mask(date, config);
        let original = self.network.stop_times();
        let mut stop_times = vec![NO_TRIP; original.len()];

        let mut active_routes = 0usize;
        for (route_id, route_mask) in &mask.route_masks {
            let Some(route_idx) = self.network.route_index(route_id) else {
                debug!(route = %route_id, "Trip mask references unknown route, skipping");
                continue;
            };
            let route = &self.network.routes()[route_idx];
            let utc_offset = local_to_utc_offset(date, &route.zone);

            let mut earliest = NO_TRIP;
            let mut latest = NO_TRIP;
            for (trip_offset, active) in route_mask.0.iter().enumerate().take(route.number_of_trips) {
                if !active {
                    continue;
                }
                for stop_offset in 0..route.number_of_stops {
                    let idx = route.stop_time_idx(trip_offset, stop_offset);
                    stop_times[idx] = original[idx].saturating_add(utc_offset);
                    stop_times[idx + 1] = original[idx + 1].saturating_add(utc_offset);
                }
                if earliest == NO_TRIP {
                    earliest = stop_times[route.stop_time_idx(trip_offset, 0)];
                }
                latest = stop_times[route.stop_time_idx(trip_offset, route.number_of_stops - 1) + 1];
            }

            stop_times[route.first_stop_time_idx] = earliest;
            stop_times[route.first_stop_time_idx + 1] = latest;

            if earliest == NO_TRIP {
                continue;
            }
            active_routes += 1;
            if stop_times[0] == NO_TRIP || earliest < stop_times[0] {
                stop_times[0] = earliest;
            }
            if stop_times[1] == NO_TRIP || latest > stop_times[1] {
                stop_times[1] = latest;
            }
        }

        debug!(
            date = %date,
            service_id = %mask.service_id,
            active_routes,
            "Created stop times for date"
        );
        stop_times
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::mask::{DayTripMask, NoMaskProvider, RouteTripMask};
    use crate::network::{NetworkBuilder, stop_time_at};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, d).unwrap()
    }

    /// R1 in Zurich (A-B, trips at 08:00 and 09:00), R2 in Tokyo (C-D, one trip at 10:00).
    fn network() -> Arc<Network> {
        let mut builder = NetworkBuilder::new(120);
        for stop in ["A", "B", "C", "D"] {
            builder.add_stop(stop).unwrap();
        }
        builder
            .add_route("R1", chrono_tz::Europe::Zurich, &["A", "B"])
            .unwrap()
            .add_route("R2", chrono_tz::Asia::Tokyo, &["C", "D"])
            .unwrap();
        for (trip, start) in [("R1-0", 8 * 3600), ("R1-1", 9 * 3600)] {
            builder
                .add_trip(trip, "R1")
                .unwrap()
                .add_stop_time("R1", trip, 0, "A", start, start)
                .unwrap()
                .add_stop_time("R1", trip, 1, "B", start + 600, start + 600)
                .unwrap();
        }
        builder
            .add_trip("R2-0", "R2")
            .unwrap()
            .add_stop_time("R2", "R2-0", 0, "C", 10 * 3600, 10 * 3600)
            .unwrap()
            .add_stop_time("R2", "R2-0", 1, "D", 11 * 3600, 11 * 3600)
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    /// Deactivates the second R1 trip on odd days, counting mask requests.
    #[derive(Default)]
    struct OddDayMasker {
        trip_ids: HashMap<String, Vec<String>>,
        requests: Arc<AtomicUsize>,
    }

    impl TripMaskProvider for OddDayMasker {
        fn set_trip_ids(&mut self, route_trip_ids: HashMap<String, Vec<String>>) {
            self.trip_ids = route_trip_ids;
        }

        fn service_id_for(&self, date: NaiveDate) -> String {
            use chrono::Datelike;
            let parity = if date.day() % 2 == 1 { "odd" } else { "even" };
            parity.to_string()
        }

        fn day_trip_mask(&self, date: NaiveDate, _config: &QueryConfig) -> DayTripMask {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let odd = self.service_id_for(date) == "odd";
            let route_masks = self
                .trip_ids
                .iter()
                .map(|(route, trips)| {
                    let mask = trips.iter().map(|trip| !(odd && trip == "R1-1")).collect();
                    (route.clone(), RouteTripMask(mask))
                })
                .collect();
            DayTripMask {
                service_id: self.service_id_for(date),
                date,
                route_masks,
            }
        }
    }

    fn provider_with(network: &Arc<Network>, mut masker: impl TripMaskProvider + 'static) -> StopTimeProvider {
        masker.set_trip_ids(network.route_trip_ids());
        StopTimeProvider::new(network.clone(), Box::new(masker), 5)
    }

    #[test]
    fn converts_local_times_to_utc() {
        let network = network();
        let provider = provider_with(&network, NoMaskProvider::default());
        let stop_times = provider.stop_times_for_date(date(1), &QueryConfig::default());

        let r1 = &network.routes()[network.route_index("R1").unwrap()];
        let first = stop_time_at(&stop_times, r1, 0, 0);
        assert_eq!(first.departure, 7 * 3600);
        assert_eq!(stop_times[r1.first_stop_time_idx], 7 * 3600);
        assert_eq!(stop_times[r1.first_stop_time_idx + 1], 8 * 3600 + 600);

        let r2 = &network.routes()[network.route_index("R2").unwrap()];
        let tokyo = stop_time_at(&stop_times, r2, 0, 0);
        assert_eq!(tokyo.departure, 3600);

        // global window spans both routes
        assert_eq!(stop_times[0], 3600);
        assert_eq!(stop_times[1], 8 * 3600 + 600);
    }

    #[test]
    fn inactive_trips_are_blanked() {
        let network = network();
        let provider = provider_with(&network, OddDayMasker::default());
        let stop_times = provider.stop_times_for_date(date(1), &QueryConfig::default());

        let r1 = &network.routes()[network.route_index("R1").unwrap()];
        let second = stop_time_at(&stop_times, r1, 1, 0);
        assert_eq!(second.arrival, NO_TRIP);
        assert_eq!(second.departure, NO_TRIP);
        // latest time of the route comes from the remaining trip
        assert_eq!(stop_times[r1.first_stop_time_idx + 1], 7 * 3600 + 600);
    }

    #[test]
    fn dates_sharing_a_service_reuse_the_cache() {
        let network = network();
        let masker = OddDayMasker::default();
        let requests = masker.requests.clone();
        let provider = provider_with(&network, masker);
        let config = QueryConfig::default();

        provider.stop_times_for_date(date(1), &config);
        provider.stop_times_for_date(date(3), &config);
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        provider.stop_times_for_date(date(2), &config);
        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert_eq!(provider.entry_count(), 2);

        // accessibility requirements change the key
        let wheelchair = QueryConfig {
            wheelchair_accessible: true,
            ..QueryConfig::default()
        };
        provider.stop_times_for_date(date(1), &wheelchair);
        assert_eq!(requests.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dst_change_invalidates_service_key() {
        let network = network();
        let masker = OddDayMasker::default();
        let requests = masker.requests.clone();
        let provider = provider_with(&network, masker);
        let config = QueryConfig::default();

        // both odd days, but Zurich switches to summer time in between
        let winter = provider.stop_times_for_date(NaiveDate::from_ymd_opt(2021, 3, 27).unwrap(), &config);
        let summer = provider.stop_times_for_date(NaiveDate::from_ymd_opt(2021, 3, 29).unwrap(), &config);
        assert_eq!(requests.load(Ordering::SeqCst), 2);

        let r1 = &network.routes()[network.route_index("R1").unwrap()];
        assert_eq!(stop_time_at(&winter, r1, 0, 0).departure, 7 * 3600);
        assert_eq!(stop_time_at(&summer, r1, 0, 0).departure, 6 * 3600);
    }

    #[test]
    fn routes_missing_from_mask_do_not_run() {
        struct EmptyMasker;
        impl TripMaskProvider for EmptyMasker {
            fn set_trip_ids(&mut self, _route_trip_ids: HashMap<String, Vec<String>>) {}
            fn service_id_for(&self, _date: NaiveDate) -> String {
                "empty".into()
            }
            fn day_trip_mask(&self, date: NaiveDate, _config: &QueryConfig) -> DayTripMask {
                DayTripMask {
                    service_id: "empty".into(),
                    date,
                    route_masks: HashMap::new(),
                }
            }
        }

        let network = network();
        let provider = provider_with(&network, EmptyMasker);
        let stop_times = provider.stop_times_for_date(date(1), &QueryConfig::default());
        assert!(stop_times.iter().all(|time| *time == NO_TRIP));
    }

    #[test]
    fn extreme_times_saturate() {
        let mut builder = NetworkBuilder::new(120);
        builder.add_stop("A").unwrap().add_stop("B").unwrap();
        builder
            .add_route("R1", chrono_tz::America::New_York, &["A", "B"])
            .unwrap()
            .add_trip("R1-0", "R1")
            .unwrap()
            .add_stop_time("R1", "R1-0", 0, "A", i32::MAX - 100, i32::MAX - 100)
            .unwrap()
            .add_stop_time("R1", "R1-0", 1, "B", i32::MAX - 50, i32::MAX - 50)
            .unwrap();
        let network = Arc::new(builder.build().unwrap());
        let provider = provider_with(&network, NoMaskProvider::default());

        let stop_times = provider.stop_times_for_date(date(1), &QueryConfig::default());

        let r1 = &network.routes()[network.route_index("R1").unwrap()];
        assert_eq!(stop_time_at(&stop_times, r1, 0, 0).departure, i32::MAX);
        assert_eq!(stop_time_at(&stop_times, r1, 0, 1).arrival, i32::MAX);
    }
}
