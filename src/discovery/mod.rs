//! Category coverage discovery
//!
//! This module contains the discovery walk and its supporting pieces:
//! - Frontier: FIFO queue of category ids with dedup
//! - State: visited set, basis list and change tracking
//! - Retry: backoff policy for transient probe failures
//! - Solver: the probe/classify/enqueue loop

mod frontier;
pub mod retry;
mod solver;
mod state;

pub use frontier::Frontier;
pub use retry::{with_retry, RetryPolicy};
pub use solver::{classify, discover, CoverageSolver, DiscoveryOutcome, SolverSettings, SolverStats};
pub use state::DiscoveryState;
