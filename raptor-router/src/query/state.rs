//! Per-query labels, best times and marked stops.

use crate::config::TimeType;

/// Index of a label in the query's label arena.
pub(crate) type LabelId = usize;

/// How a stop was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LabelKind {
    /// Source stop of the query, no previous label.
    Initial,
    /// Ride on a trip. `day_idx` indexes the query's scanned service days.
    Route {
        route_idx: usize,
        trip_offset: usize,
        day_idx: usize,
    },
    /// Walk over the transfer with this index.
    Transfer { transfer_idx: usize },
}

/// One step of a connection, stored in query direction: `source_time` is
/// where the step starts and `target_time` where it ends, so for arrival
/// queries `source_time` is the later of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Label {
    pub source_time: i32,
    pub target_time: i32,
    pub kind: LabelKind,
    /// Stop reached by this label.
    pub stop_idx: usize,
    pub previous: Option<LabelId>,
}

impl Label {
    pub fn is_route(&self) -> bool {
        matches!(self.kind, LabelKind::Route { .. })
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self.kind, LabelKind::Transfer { .. })
    }
}

/// Best labels per round and stop plus the global best time per stop.
///
/// Labels are never freed during a query; removing a label from a round
/// only clears the slot, so `previous` links stay valid.
#[derive(Debug)]
pub(crate) struct QueryState {
    time_type: TimeType,
    stop_count: usize,
    labels: Vec<Label>,
    rounds: Vec<Vec<Option<LabelId>>>,
    /// Comparable best times: transfer targets already include the
    /// same-stop transfer time of the target stop.
    best_times: Vec<i32>,
}

impl QueryState {
    /// New state holding the empty round 0.
    pub fn new(stop_count: usize, time_type: TimeType) -> Self {
        Self {
            time_type,
            stop_count,
            labels: Vec::new(),
            rounds: vec![vec![None; stop_count]],
            best_times: vec![time_type.unreachable(); stop_count],
        }
    }

    /// Appends an empty round and returns its index.
    pub fn add_round(&mut self) -> usize {
        self.rounds.push(vec![None; self.stop_count]);
        self.rounds.len() - 1
    }

    #[cfg(test)]
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn label(&self, id: LabelId) -> &Label {
        &self.labels[id]
    }

    pub fn label_id_at(&self, round: usize, stop_idx: usize) -> Option<LabelId> {
        self.rounds[round][stop_idx]
    }

    pub fn label_at(&self, round: usize, stop_idx: usize) -> Option<&Label> {
        self.label_id_at(round, stop_idx).map(|id| &self.labels[id])
    }

    /// Stores `label` as the best label of its stop in `round`.
    pub fn set_label(&mut self, round: usize, label: Label) -> LabelId {
        let id = self.labels.len();
        self.rounds[round][label.stop_idx] = Some(id);
        self.labels.push(label);
        id
    }

    pub fn clear_label(&mut self, round: usize, stop_idx: usize) {
        self.rounds[round][stop_idx] = None;
    }

    pub fn comparable_best_time(&self, stop_idx: usize) -> i32 {
        self.best_times[stop_idx]
    }

    pub fn set_best_time(&mut self, stop_idx: usize, time: i32) {
        self.best_times[stop_idx] = time;
    }

    /// Best real target time of a stop over all rounds. Unlike the
    /// comparable time it is not adjusted for same-stop transfers.
    pub fn actual_best_time(&self, stop_idx: usize) -> i32 {
        self.rounds
            .iter()
            .filter_map(|round| round[stop_idx])
            .map(|id| self.labels[id].target_time)
            .fold(self.time_type.unreachable(), |best, time| {
                if self.time_type.improves(time, best) { time } else { best }
            })
    }

    /// Label slots per round.
    pub fn rounds(&self) -> &[Vec<Option<LabelId>>] {
        &self.rounds
    }
}

/// Set of stops in marking order with constant-time membership checks.
#[derive(Debug, Clone)]
pub(crate) struct MarkedStops {
    flags: Vec<bool>,
    stops: Vec<usize>,
}

impl MarkedStops {
    pub fn new(stop_count: usize) -> Self {
        Self {
            flags: vec![false; stop_count],
            stops: Vec::new(),
        }
    }

    pub fn mark(&mut self, stop_idx: usize) {
        if !self.flags[stop_idx] {
            self.flags[stop_idx] = true;
            self.stops.push(stop_idx);
        }
    }

    pub fn contains(&self, stop_idx: usize) -> bool {
        self.flags[stop_idx]
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn stops(&self) -> &[usize] {
        &self.stops
    }

    pub fn extend(&mut self, other: &MarkedStops) {
        for &stop_idx in &other.stops {
            self.mark(stop_idx);
        }
    }
}
