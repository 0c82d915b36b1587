//! Post-hoc delivery statistics.
//!
//! Read-only consumer of one experiment's delivery log. Classifies
//! records as heard (recipient present), unheard (no recipient),
//! decrypted, or undecrypted, then aggregates per sender and per
//! broadcast-time hour (`floor(time / 3600)`; 48 buckets for the
//! 48-hour horizon).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::graph::NodeId;
use crate::schedule::BroadcastId;
use crate::sim::{Delivery, Experiment};

/// The parameter triple of the experiment a stats report describes.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ExperimentParams {
    /// Max groups per node.
    pub group_limit: u32,
    /// Max members per group.
    pub group_size_limit: u32,
    /// Broadcast period in seconds.
    pub broadcast_frequency: u64,
}

/// Per-sender aggregates for one experiment.
///
/// Count vectors hold one entry per sender, ascending by sender id;
/// hourly maps key sender id to one count per hour bucket.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    /// Per sender: distinct broadcasts heard by at least one recipient.
    pub heard: Vec<usize>,
    /// Per sender: total heard deliveries (repetitions counted).
    pub heard_repeated: Vec<usize>,
    /// Per sender: broadcasts heard by nobody.
    pub unheard: Vec<usize>,
    /// Per sender: distinct broadcasts decrypted by at least one recipient.
    pub decrypted: Vec<usize>,
    /// Per sender: total decrypted deliveries (repetitions counted).
    pub decrypted_repeated: Vec<usize>,
    /// Per sender: distinct broadcasts heard but decrypted by nobody.
    pub undecrypted: Vec<usize>,
    /// Per sender, per hour: distinct broadcasts decrypted at least once.
    pub hourly_once: BTreeMap<NodeId, Vec<usize>>,
    /// Per sender, per hour: total decrypted deliveries.
    pub hourly_total: BTreeMap<NodeId, Vec<usize>>,
}

/// One experiment's statistics report, serialized as
/// `{ params, statistics }`.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentStats {
    /// Experiment parameters.
    pub params: ExperimentParams,
    /// Aggregated statistics.
    pub statistics: Statistics,
}

impl ExperimentStats {
    /// Aggregate one experiment's delivery log.
    ///
    /// `total_time` fixes the number of hour buckets
    /// (`ceil(total_time / 3600)`), independent of which hours saw
    /// traffic.
    pub fn collect(experiment: &Experiment, deliveries: &[Delivery], total_time: u64) -> Self {
        let hours = total_time.div_ceil(3600).max(1) as usize;

        let mut heard: BTreeMap<NodeId, BTreeSet<BroadcastId>> = BTreeMap::new();
        let mut heard_repeated: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut unheard: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut decrypted: BTreeMap<NodeId, BTreeSet<BroadcastId>> = BTreeMap::new();
        let mut decrypted_repeated: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut hourly_once: BTreeMap<NodeId, Vec<BTreeSet<BroadcastId>>> = BTreeMap::new();
        let mut hourly_total: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();

        for delivery in deliveries {
            let broadcast = delivery.broadcast();
            let sender = broadcast.sender;
            match delivery {
                Delivery::Unheard { .. } => {
                    *unheard.entry(sender).or_default() += 1;
                }
                Delivery::Heard {
                    decrypted: was_decrypted,
                    ..
                } => {
                    heard.entry(sender).or_default().insert(broadcast.id);
                    *heard_repeated.entry(sender).or_default() += 1;
                    if *was_decrypted {
                        decrypted.entry(sender).or_default().insert(broadcast.id);
                        *decrypted_repeated.entry(sender).or_default() += 1;

                        let hour = (broadcast.time / 3600) as usize;
                        if hour < hours {
                            hourly_once
                                .entry(sender)
                                .or_insert_with(|| vec![BTreeSet::new(); hours])[hour]
                                .insert(broadcast.id);
                            hourly_total
                                .entry(sender)
                                .or_insert_with(|| vec![0; hours])[hour] += 1;
                        }
                    }
                }
            }
        }

        // Heard-but-never-decrypted, per sender.
        let undecrypted: BTreeMap<NodeId, usize> = heard
            .iter()
            .map(|(&sender, ids)| {
                let decrypted_ids = decrypted.get(&sender);
                let count = ids
                    .iter()
                    .filter(|id| decrypted_ids.map_or(true, |d| !d.contains(id)))
                    .count();
                (sender, count)
            })
            .collect();

        Self {
            params: ExperimentParams {
                group_limit: experiment.group_limit,
                group_size_limit: experiment.group_size_limit,
                broadcast_frequency: experiment.broadcast_frequency,
            },
            statistics: Statistics {
                heard: heard.values().map(BTreeSet::len).collect(),
                heard_repeated: heard_repeated.into_values().collect(),
                unheard: unheard.into_values().collect(),
                decrypted: decrypted.values().map(BTreeSet::len).collect(),
                decrypted_repeated: decrypted_repeated.into_values().collect(),
                undecrypted: undecrypted.into_values().collect(),
                hourly_once: hourly_once
                    .into_iter()
                    .map(|(sender, sets)| (sender, sets.iter().map(BTreeSet::len).collect()))
                    .collect(),
                hourly_total,
            },
        }
    }
}
