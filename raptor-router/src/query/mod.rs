//! Round-based search for a single request.
//!
//! A [`Query`] owns the labels of one request. Round 0 holds the source
//! stops; every further round scans the routes of the stops improved in the
//! previous round and relaxes footpaths from the stops it improved. After
//! each round, labels that cannot beat the best time already known at a
//! target stop are dropped.

mod relaxer;
mod scanner;
pub(crate) mod state;

use tracing::debug;

use crate::config::{INFINITY, QueryConfig, TimeType};
use crate::network::Network;
use crate::stop_times::StopTimes;
use crate::time::SECONDS_PER_DAY;

use relaxer::FootpathRelaxer;
use scanner::RouteScanner;
use state::{Label, LabelKind, MarkedStops, QueryState};

/// Stop times of one service day scanned by a query.
#[derive(Debug, Clone)]
pub(crate) struct DayStopTimes {
    /// Days after the reference date (-1 is the previous day).
    pub day_offset: i32,
    pub stop_times: StopTimes,
}

impl DayStopTimes {
    /// Seconds added to this day's times to place them on the reference
    /// day's time line.
    pub fn shift(&self) -> i32 {
        self.day_offset.saturating_mul(SECONDS_PER_DAY)
    }
}

pub(crate) struct Query<'a> {
    network: &'a Network,
    days: &'a [DayStopTimes],
    config: &'a QueryConfig,
    time_type: TimeType,
    /// (stop, time) in internal seconds.
    sources: Vec<(usize, i32)>,
    /// (stop, walk handicap in seconds).
    targets: Vec<(usize, i32)>,
    cutoff_time: i32,
    state: QueryState,
}

impl<'a> Query<'a> {
    pub fn new(
        network: &'a Network,
        days: &'a [DayStopTimes],
        sources: Vec<(usize, i32)>,
        targets: Vec<(usize, i32)>,
        config: &'a QueryConfig,
        time_type: TimeType,
    ) -> Self {
        let cutoff_time = cutoff_time(&sources, config, time_type);
        Self {
            network,
            days,
            config,
            time_type,
            sources,
            targets,
            cutoff_time,
            state: QueryState::new(network.stops().len(), time_type),
        }
    }

    /// Runs rounds until no stop improves or the transfer limit is hit.
    pub fn run(mut self) -> QueryState {
        let blocked_targets = (!self.config.allow_target_transfer).then(|| {
            let mut blocked = vec![false; self.network.stops().len()];
            for &(stop_idx, _) in &self.targets {
                blocked[stop_idx] = true;
            }
            blocked
        });
        let relaxer = FootpathRelaxer::new(
            self.network,
            self.config,
            self.time_type,
            blocked_targets.as_deref(),
        );
        let scanner = RouteScanner::new(self.network, self.days, self.config, self.time_type);

        let source_stops: Vec<usize> = self.sources.iter().map(|&(stop_idx, _)| stop_idx).collect();
        let mut marked = self.initialize();

        let relax_sources = self.config.allow_source_transfer;
        let mut deferred_source_transfer = relax_sources && !self.config.allow_initial_transfer;
        if relax_sources && self.config.allow_initial_transfer {
            let relaxed = relaxer.relax(&mut self.state, 0, 0, &source_stops);
            marked.extend(&relaxed);
        }
        marked = self.remove_suboptimal_labels(0, marked);

        let mut round = 1;
        loop {
            if marked.is_empty() {
                if !deferred_source_transfer {
                    break;
                }
                // walk from the sources only after routes from them are exhausted
                deferred_source_transfer = false;
                let round_idx = self.state.add_round();
                let relaxed = relaxer.relax(&mut self.state, 0, round_idx, &source_stops);
                debug!(round, marked = relaxed.len(), "Relaxed deferred source transfers");
                marked = self.remove_suboptimal_labels(round_idx, relaxed);
                round += 1;
                continue;
            }
            if !self.within_transfer_limit(round) {
                break;
            }

            let round_idx = self.state.add_round();
            let mut marked_next = scanner.scan(&mut self.state, round_idx, &marked);
            let relaxed = relaxer.relax(&mut self.state, round_idx, round_idx, marked_next.stops());
            marked_next.extend(&relaxed);

            marked = self.remove_suboptimal_labels(round_idx, marked_next);
            debug!(round, marked = marked.len(), "Finished round");
            round += 1;
        }

        self.state
    }

    fn within_transfer_limit(&self, round: usize) -> bool {
        (round as i64 - 1) <= i64::from(self.config.max_transfers)
    }

    /// Creates the round-0 labels and marks the source stops.
    fn initialize(&mut self) -> MarkedStops {
        let mut marked = MarkedStops::new(self.network.stops().len());
        for &(stop_idx, time) in &self.sources {
            self.state.set_label(
                0,
                Label {
                    source_time: 0,
                    target_time: time,
                    kind: LabelKind::Initial,
                    stop_idx,
                    previous: None,
                },
            );
            self.state.set_best_time(stop_idx, time);
            marked.mark(stop_idx);
        }
        marked
    }

    /// Drops labels of `round` that are worse than the best time at any
    /// target and unmarks their stops.
    fn remove_suboptimal_labels(&mut self, round: usize, marked: MarkedStops) -> MarkedStops {
        let best_time = self.best_time_for_targets();
        if best_time == INFINITY || best_time == -INFINITY {
            return marked;
        }

        let mut clean = MarkedStops::new(self.network.stops().len());
        for &stop_idx in marked.stops() {
            let Some(label) = self.state.label_at(round, stop_idx) else {
                continue;
            };
            if self.time_type.improves(best_time, label.target_time) {
                self.state.clear_label(round, stop_idx);
            } else {
                clean.mark(stop_idx);
            }
        }
        clean
    }

    /// Best time at any target stop including the walk to the final
    /// destination, bounded by the cut-off time.
    fn best_time_for_targets(&self) -> i32 {
        let direction = self.time_type.direction();
        self.targets
            .iter()
            .filter_map(|&(stop_idx, walk)| {
                let time = self.state.actual_best_time(stop_idx);
                (time != self.time_type.unreachable()).then(|| time.saturating_add(direction * walk))
            })
            .fold(self.cutoff_time, |best, time| {
                if self.time_type.improves(time, best) { time } else { best }
            })
    }
}

/// Latest allowed arrival (earliest allowed departure for arrival queries).
fn cutoff_time(sources: &[(usize, i32)], config: &QueryConfig, time_type: TimeType) -> i32 {
    if config.max_travel_duration == INFINITY {
        return time_type.unreachable();
    }
    let times = sources.iter().map(|&(_, time)| time);
    match time_type {
        TimeType::Departure => times
            .min()
            .map_or(INFINITY, |earliest| earliest.saturating_add(config.max_travel_duration)),
        TimeType::Arrival => times
            .max()
            .map_or(-INFINITY, |latest| latest.saturating_sub(config.max_travel_duration)),
    }
}
