//! Delivery log persistence.
//!
//! Each experiment owns an append-only delivery log, written as an
//! independent stream with no cross-experiment transactional coupling:
//! abandoning one in-progress experiment can never corrupt another's
//! output. [`MemoryStore`] backs tests and in-process sweeps;
//! [`JsonlStore`] writes one JSON Lines file per experiment.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Result, SimError};
use crate::sim::{Delivery, ExperimentId};

/// Append-only, per-experiment delivery log storage.
pub trait DeliveryStore: Send + Sync {
    /// Append a batch of deliveries to one experiment's log.
    fn append_all(&self, experiment: ExperimentId, deliveries: &[Delivery]) -> Result<()>;

    /// Read back one experiment's full log, in append order.
    fn deliveries(&self, experiment: ExperimentId) -> Result<Vec<Delivery>>;
}

/// In-memory delivery store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    logs: Mutex<HashMap<ExperimentId, Vec<Delivery>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Experiments with at least one appended delivery.
    pub fn experiment_ids(&self) -> Vec<ExperimentId> {
        let logs = self.logs.lock().expect("store mutex poisoned");
        let mut ids: Vec<ExperimentId> = logs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl DeliveryStore for MemoryStore {
    fn append_all(&self, experiment: ExperimentId, deliveries: &[Delivery]) -> Result<()> {
        let mut logs = self
            .logs
            .lock()
            .map_err(|_| SimError::Store("memory store mutex poisoned".to_string()))?;
        logs.entry(experiment)
            .or_default()
            .extend_from_slice(deliveries);
        Ok(())
    }

    fn deliveries(&self, experiment: ExperimentId) -> Result<Vec<Delivery>> {
        let logs = self
            .logs
            .lock()
            .map_err(|_| SimError::Store("memory store mutex poisoned".to_string()))?;
        Ok(logs.get(&experiment).cloned().unwrap_or_default())
    }
}

/// JSON Lines delivery store: `deliveries_<experiment>.jsonl` per
/// experiment under one output directory.
///
/// Concurrent writers to distinct experiments never share a file, which
/// is all the isolation the sweep needs.
#[derive(Debug)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of one experiment's log file.
    pub fn log_path(&self, experiment: ExperimentId) -> PathBuf {
        self.dir.join(format!("deliveries_{experiment}.jsonl"))
    }

    /// Read a delivery log from an arbitrary JSONL file.
    pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<Delivery>> {
        let file = File::open(path.as_ref())?;
        let mut deliveries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            deliveries.push(serde_json::from_str(&line)?);
        }
        Ok(deliveries)
    }
}

impl DeliveryStore for JsonlStore {
    fn append_all(&self, experiment: ExperimentId, deliveries: &[Delivery]) -> Result<()> {
        let path = self.log_path(experiment);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        for delivery in deliveries {
            serde_json::to_writer(&mut writer, delivery)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        debug!(experiment = %experiment, count = deliveries.len(), path = %path.display(), "appended deliveries");
        Ok(())
    }

    fn deliveries(&self, experiment: ExperimentId) -> Result<Vec<Delivery>> {
        let path = self.log_path(experiment);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Self::read_log(path)
    }
}
