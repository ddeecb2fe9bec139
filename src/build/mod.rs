//! Build Engine Internals
//!
//! Graph realization, staleness analysis, per-target producers, and the
//! state they share.

pub mod graph;
pub mod producer;
pub mod state;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used for the recursive graph and producer functions.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use graph::add_target;
pub use producer::produce;
pub use state::{BuildState, LockTable, Outcome, TargetInfo};
