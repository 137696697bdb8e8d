//! Footpath relaxation.

use tracing::trace;

use super::state::{Label, LabelKind, MarkedStops, QueryState};
use crate::config::{QueryConfig, TimeType};
use crate::network::Network;

/// Expands walking transfers from stops reached by a route or as a source.
pub(crate) struct FootpathRelaxer<'a> {
    network: &'a Network,
    time_type: TimeType,
    min_transfer_duration: i32,
    max_walk_duration: i32,
    /// Stops that must not be reached by walking, if any.
    blocked_targets: Option<&'a [bool]>,
}

impl<'a> FootpathRelaxer<'a> {
    pub fn new(
        network: &'a Network,
        config: &QueryConfig,
        time_type: TimeType,
        blocked_targets: Option<&'a [bool]>,
    ) -> Self {
        Self {
            network,
            time_type,
            min_transfer_duration: config.min_transfer_duration,
            max_walk_duration: config.max_walk_duration,
            blocked_targets,
        }
    }

    /// Relaxes the transfers of `stops`, reading labels of `source_round` and
    /// writing improved labels into `target_round`. Returns the stops reached.
    pub fn relax(
        &self,
        state: &mut QueryState,
        source_round: usize,
        target_round: usize,
        stops: &[usize],
    ) -> MarkedStops {
        let mut marked = MarkedStops::new(self.network.stops().len());
        for &stop_idx in stops {
            self.expand_from_stop(state, stop_idx, source_round, target_round, &mut marked);
        }
        marked
    }

    fn expand_from_stop(
        &self,
        state: &mut QueryState,
        stop_idx: usize,
        source_round: usize,
        target_round: usize,
        marked: &mut MarkedStops,
    ) {
        let transfers = self.network.transfers_of_stop(stop_idx);
        if transfers.is_empty() {
            return;
        }

        let Some(source_id) = state.label_id_at(source_round, stop_idx) else {
            return;
        };
        let source = *state.label(source_id);
        // walking twice in a row is never useful
        if source.is_transfer() {
            return;
        }

        let stops = self.network.stops();
        let first_transfer_idx = stops[stop_idx].transfer_idx;
        let direction = self.time_type.direction();

        for (offset, transfer) in transfers.iter().enumerate() {
            if transfer.duration > self.max_walk_duration {
                continue;
            }
            let target_idx = transfer.target_stop_idx;
            if self.blocked_targets.is_some_and(|blocked| blocked[target_idx]) {
                continue;
            }

            let walk = transfer.duration.saturating_add(self.min_transfer_duration);
            let target_time = source.target_time.saturating_add(direction * walk);
            // route targets exclude the same-stop transfer time, so walking
            // targets are compared without it as well
            let comparable_time =
                target_time.saturating_sub(direction * stops[target_idx].same_stop_transfer_time);

            if !self
                .time_type
                .improves(comparable_time, state.comparable_best_time(target_idx))
            {
                continue;
            }

            trace!(
                from = %stops[stop_idx].id,
                to = %stops[target_idx].id,
                target_time,
                "Stop improved by transfer"
            );
            state.set_best_time(target_idx, comparable_time);
            state.set_label(
                target_round,
                Label {
                    source_time: source.target_time,
                    target_time,
                    kind: LabelKind::Transfer {
                        transfer_idx: first_transfer_idx + offset,
                    },
                    stop_idx: target_idx,
                    previous: Some(source_id),
                },
            );
            marked.mark(target_idx);
        }
    }
}
