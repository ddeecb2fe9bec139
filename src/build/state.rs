//! Scheduler State
//!
//! All per-target bookkeeping shared by the producers, behind one lock,
//! plus the table of per-output rebuild locks. Nothing here is a
//! process-wide singleton; the engine owns one of each and hands them
//! out by reference.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::errors::ProduceError;
use crate::rules::IRule;

/// Recorded modification time. Tasks and files that never existed sit
/// at the epoch, which every real mtime exceeds.
pub type Mtime = SystemTime;

pub const EPOCH: Mtime = SystemTime::UNIX_EPOCH;

/// What has happened to an output so far in this run. Absence means
/// "not built". Waiting producers observe a `Failed` outcome and fail
/// identically without redoing work.
#[derive(Debug, Clone)]
pub enum Outcome {
    Built,
    Failed(ProduceError),
}

/// Everything the graph pass learned about one target.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    pub irule: IRule,
    /// Direct dependencies, in order.
    pub ddeps: Vec<String>,
    /// Additional declared outputs (the target itself is not listed).
    pub outputs: Vec<String>,
    pub mtime: Mtime,
}

/// Shared mutable scheduler state. Mutated only under the engine's
/// state lock; critical sections never block on anything.
#[derive(Debug, Default)]
pub struct BuildState {
    /// Realized targets. Insertion is idempotent: `add_target` returns
    /// early for a target already present.
    pub targets: HashMap<String, TargetInfo>,
    pub out_of_date: HashSet<String>,
    pub missing: HashSet<String>,
    /// For each target, the dependency whose newer time made it stale.
    pub changed_ddep: HashMap<String, String>,
    /// Outputs whose recipe has started but not cleanly finished; the
    /// quarantine pass renames whatever is still here.
    pub incomplete: HashSet<String>,
    /// Per-output build outcomes.
    pub outcomes: HashMap<String, Outcome>,
}

impl BuildState {
    pub fn is_stale(&self, target: &str) -> bool {
        self.out_of_date.contains(target) || self.missing.contains(target)
    }

    /// Forget a target's staleness and mark its build successful.
    pub fn mark_fresh(&mut self, name: &str) {
        self.out_of_date.remove(name);
        self.missing.remove(name);
        self.outcomes.insert(name.to_string(), Outcome::Built);
    }
}

/// Lazily-populated map from output path to its rebuild lock. Handles
/// are `Arc`s so producers can hold owned guards across await points.
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
