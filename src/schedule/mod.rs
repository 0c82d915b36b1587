//! Broadcast schedule generation.
//!
//! Each node broadcasts periodically at one configured frequency, with a
//! per-node random phase: the first broadcast lands uniformly in
//! `[0, frequency)` and subsequent ones follow every `frequency` seconds
//! while `t <= total_time - frequency`. Schedules are independent per
//! frequency and are pure simulation input.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

/// Broadcast identifier, sequential within one schedule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BroadcastId(u64);

impl BroadcastId {
    /// Create a broadcast id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw index.
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One message-sending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    /// Broadcast identifier.
    pub id: BroadcastId,
    /// Broadcasting node.
    pub sender: NodeId,
    /// Simulated send time in seconds.
    pub time: u64,
    /// The schedule frequency this broadcast belongs to.
    pub frequency: u64,
}

/// All broadcasts for one frequency, indexed by send time.
#[derive(Debug, Clone, Default)]
pub struct BroadcastSchedule {
    broadcasts: Vec<Broadcast>,
    by_time: HashMap<u64, Vec<usize>>,
}

impl BroadcastSchedule {
    /// Generate the schedule for every node of the population.
    ///
    /// `nodes` must be sorted (callers pass [`ContactGraph::nodes`]);
    /// the per-node phase draw consumes the RNG in that order, so a fixed
    /// seed yields a fixed schedule.
    ///
    /// [`ContactGraph::nodes`]: crate::graph::ContactGraph::nodes
    pub fn generate<R: Rng>(
        nodes: impl Iterator<Item = NodeId>,
        frequency: u64,
        total_time: u64,
        rng: &mut R,
    ) -> Self {
        let mut schedule = Self::default();
        for sender in nodes {
            let mut t = rng.gen_range(0..frequency);
            while t + frequency <= total_time {
                schedule.push(sender, t, frequency);
                t += frequency;
            }
        }
        schedule
    }

    /// Append one broadcast with the next sequential id.
    ///
    /// [`generate`](Self::generate) is the normal producer; this is
    /// public so hand-built schedules can drive the simulator directly.
    pub fn push(&mut self, sender: NodeId, time: u64, frequency: u64) {
        let id = BroadcastId(self.broadcasts.len() as u64);
        self.by_time
            .entry(time)
            .or_default()
            .push(self.broadcasts.len());
        self.broadcasts.push(Broadcast {
            id,
            sender,
            time,
            frequency,
        });
    }

    /// Broadcasts scheduled at exactly `t`, in id order.
    pub fn at_time(&self, t: u64) -> impl Iterator<Item = Broadcast> + '_ {
        self.by_time
            .get(&t)
            .into_iter()
            .flatten()
            .map(|&i| self.broadcasts[i])
    }

    /// All broadcasts, in id order.
    pub fn iter(&self) -> impl Iterator<Item = Broadcast> + '_ {
        self.broadcasts.iter().copied()
    }

    /// Total number of broadcasts.
    pub fn len(&self) -> usize {
        self.broadcasts.len()
    }

    /// Whether the schedule is empty.
    pub fn is_empty(&self) -> bool {
        self.broadcasts.is_empty()
    }
}
