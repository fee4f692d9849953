//! Output module for discovery results and reports
//!
//! This module handles:
//! - Reading and writing the basis list file
//! - Exporting the reconstructed hierarchy for auditing
//! - Recording and printing discovery statistics

mod basis;
mod hierarchy;
pub mod stats;

pub use basis::{parse_basis, read_basis_file, render_basis, write_basis_file};
pub use hierarchy::{export_hierarchy, hierarchy_entries, HierarchyEntry};
pub use stats::{load_statistics, print_statistics, DiscoveryStatistics};
