//! Category model, hierarchy reconstruction and redundancy pruning
//!
//! # Components
//!
//! - `CategoryNode` / `NodeStatus`: one category page and its classification
//! - `build_tree`: parent/child links inferred from URL paths
//! - `prune`: removal of basis parents whose children are also in the basis

mod hierarchy;
mod node;
mod prune;

pub use hierarchy::{build_tree, CategoryTree};
pub use node::{CategoryNode, NodeStatus};
pub use prune::{prune, prune_basis, prune_with_rule, RedundancyRule};
