//! Experiment sweep orchestration.
//!
//! Group formation runs once per distinct (group_limit, group_size_limit)
//! pair and is shared by every frequency; broadcast schedules are
//! generated once per frequency. Experiments then simulate concurrently
//! on a bounded worker pool, each with its own rotation-cursor state and
//! its own isolated delivery stream. A failed experiment is recorded and
//! skipped; it never corrupts the others' output.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span};

use crate::config::Config;
use crate::error::{Result, SimError};
use crate::graph::ContactGraph;
use crate::group::{baseline_groups, form_groups, GroupSet};
use crate::schedule::BroadcastSchedule;
use crate::sim::{simulate, Experiment};
use crate::store::DeliveryStore;

// Domain-separation salts for seed derivation.
const GROUP_SALT: u64 = 0x6772_6f75;
const SCHEDULE_SALT: u64 = 0x7363_6865;
const SIM_SALT: u64 = 0x7369_6d75;

/// Spread a salted value over the whole seed space (splitmix64 step).
fn derive_seed(base: u64, salt: u64) -> u64 {
    let mut z = base ^ salt.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Outcome of one experiment within a sweep.
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    /// The experiment that ran.
    pub experiment: Experiment,
    /// Deliveries emitted, when the run succeeded.
    pub delivery_count: Option<usize>,
    /// Failure description, when it did not.
    pub error: Option<String>,
}

impl ExperimentOutcome {
    /// Whether this experiment completed and persisted its log.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a completed sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Per-experiment outcomes, ascending by experiment id.
    pub outcomes: Vec<ExperimentOutcome>,
}

impl SweepReport {
    /// Number of experiments that completed.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Number of experiments that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Runs one full sweep: group formation, schedules, then the
/// experiment worker pool.
pub struct SweepRunner {
    config: Config,
    graph: Arc<ContactGraph>,
    store: Arc<dyn DeliveryStore>,
}

impl SweepRunner {
    /// Create a runner over a finished contact graph.
    pub fn new(config: Config, graph: ContactGraph, store: Arc<dyn DeliveryStore>) -> Self {
        Self {
            config,
            graph: Arc::new(graph),
            store,
        }
    }

    /// Run the whole sweep to completion.
    ///
    /// Sequential phase: one [`GroupSet`] per distinct limit pair plus the
    /// baseline set, one [`BroadcastSchedule`] per frequency, all seeded
    /// from the config's master seed. Concurrent phase: at most
    /// `config.workers` simulations in flight, each on a blocking thread
    /// with an experiment-derived seed.
    pub async fn run(&self) -> Result<SweepReport> {
        self.config.validate()?;
        let experiments = self.config.experiments();
        info!(experiments = experiments.len(), "starting sweep");

        let group_sets = self.form_group_sets(&experiments);
        let schedules = self.generate_schedules();

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = JoinSet::new();

        for experiment in experiments {
            let graph = Arc::clone(&self.graph);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let groups = if experiment.baseline {
                Arc::clone(&group_sets[&(0, 0)])
            } else {
                Arc::clone(&group_sets[&(experiment.group_limit, experiment.group_size_limit)])
            };
            let schedule = Arc::clone(&schedules[&experiment.broadcast_frequency]);
            let time_horizon = self.config.total_time;
            let sim_seed = derive_seed(self.config.seed, SIM_SALT ^ experiment.id.index());

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let result = tokio::task::spawn_blocking(move || {
                    let span = info_span!("experiment", id = %experiment.id);
                    let _guard = span.enter();
                    info!(
                        group_limit = experiment.group_limit,
                        group_size_limit = experiment.group_size_limit,
                        broadcast_frequency = experiment.broadcast_frequency,
                        baseline = experiment.baseline,
                        "starting experiment"
                    );
                    let mut rng = StdRng::seed_from_u64(sim_seed);
                    let deliveries = simulate(&graph, &groups, &schedule, time_horizon, &mut rng);
                    store.append_all(experiment.id, &deliveries)?;
                    info!(deliveries = deliveries.len(), "finished experiment");
                    Ok::<usize, SimError>(deliveries.len())
                })
                .await;

                let outcome = match result {
                    Ok(Ok(count)) => ExperimentOutcome {
                        experiment,
                        delivery_count: Some(count),
                        error: None,
                    },
                    Ok(Err(e)) => ExperimentOutcome {
                        experiment,
                        delivery_count: None,
                        error: Some(e.to_string()),
                    },
                    Err(join_err) => ExperimentOutcome {
                        experiment,
                        delivery_count: None,
                        error: Some(format!("simulation task aborted: {join_err}")),
                    },
                };
                if let Some(err) = &outcome.error {
                    error!(experiment = %experiment.id, error = %err, "experiment failed");
                }
                outcome
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    return Err(SimError::Experiment {
                        id: u64::MAX,
                        reason: format!("sweep task panicked: {join_err}"),
                    })
                }
            }
        }
        outcomes.sort_by_key(|o| o.experiment.id);

        let report = SweepReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "sweep finished"
        );
        Ok(report)
    }

    /// One group set per distinct limit pair, plus the baseline set under
    /// the reserved `(0, 0)` key. Sequential and fully seeded.
    fn form_group_sets(
        &self,
        experiments: &[Experiment],
    ) -> BTreeMap<(u32, u32), Arc<GroupSet>> {
        let mut sets: BTreeMap<(u32, u32), Arc<GroupSet>> = BTreeMap::new();
        sets.insert((0, 0), Arc::new(baseline_groups(&self.graph)));

        let mut pairs: Vec<(u32, u32)> = experiments
            .iter()
            .filter(|e| !e.baseline)
            .map(|e| (e.group_limit, e.group_size_limit))
            .collect();
        pairs.sort_unstable();
        pairs.dedup();

        for (group_limit, group_size_limit) in pairs {
            let salt =
                GROUP_SALT ^ ((u64::from(group_limit) << 32) | u64::from(group_size_limit));
            let mut rng = StdRng::seed_from_u64(derive_seed(self.config.seed, salt));
            let set = form_groups(&self.graph, group_limit, group_size_limit, &mut rng);
            info!(
                group_limit,
                group_size_limit,
                groups = set.len(),
                "group formation complete"
            );
            sets.insert((group_limit, group_size_limit), Arc::new(set));
        }
        sets
    }

    /// One broadcast schedule per frequency. Sequential and fully seeded.
    fn generate_schedules(&self) -> BTreeMap<u64, Arc<BroadcastSchedule>> {
        let mut schedules = BTreeMap::new();
        let mut freqs = self.config.broadcast_freqs.clone();
        freqs.sort_unstable();
        freqs.dedup();

        for frequency in freqs {
            let mut rng =
                StdRng::seed_from_u64(derive_seed(self.config.seed, SCHEDULE_SALT ^ frequency));
            let schedule = BroadcastSchedule::generate(
                self.graph.nodes(),
                frequency,
                self.config.total_time,
                &mut rng,
            );
            info!(frequency, broadcasts = schedule.len(), "schedule generated");
            schedules.insert(frequency, Arc::new(schedule));
        }
        schedules
    }
}
