/// Category node and status definitions
///
/// This module defines the category page record shared by discovery,
/// hierarchy reconstruction and pruning.
use crate::url::{canonicalize_url, extract_category_id, path_segments};
use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Classification of a category page after it has been probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Known but not yet probed
    Unvisited,

    /// Zero direct items, links to child categories
    Hub,

    /// Item count within the pagination limit; accepted into the basis
    Basis,

    /// Item count above the limit; children must be drilled
    Overflow,

    /// Over the limit with no discoverable children; kept as best effort
    Fallback,

    /// Zero items and no children
    Empty,
}

impl NodeStatus {
    /// Returns true if nodes with this status belong to the basis set
    pub fn in_basis(&self) -> bool {
        matches!(self, Self::Basis | Self::Fallback)
    }

    /// Returns true if the node has been probed and classified
    pub fn is_classified(&self) -> bool {
        !matches!(self, Self::Unvisited)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unvisited => "unvisited",
            Self::Hub => "hub",
            Self::Basis => "basis",
            Self::Overflow => "overflow",
            Self::Fallback => "fallback",
            Self::Empty => "empty",
        }
    }

    /// Parses a status from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unvisited" => Some(Self::Unvisited),
            "hub" => Some(Self::Hub),
            "basis" => Some(Self::Basis),
            "overflow" => Some(Self::Overflow),
            "fallback" => Some(Self::Fallback),
            "empty" => Some(Self::Empty),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Unvisited,
            Self::Hub,
            Self::Basis,
            Self::Overflow,
            Self::Fallback,
            Self::Empty,
        ]
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One category page, identified by the numeric id in its URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: String,

    /// Canonical URL (no query, no trailing slash)
    pub url: String,

    /// Path tokens used to infer ancestry
    pub path_segments: Vec<String>,

    /// Nearest ancestor present in the discovered set
    pub parent_id: Option<String>,

    /// Child category ids, in discovery order
    pub children: Vec<String>,

    /// Last observed item count
    pub item_count: Option<u64>,

    pub status: NodeStatus,
}

impl CategoryNode {
    /// Builds an unvisited node from a raw category URL
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_sweep::category::{CategoryNode, NodeStatus};
    ///
    /// let node = CategoryNode::from_url("https://shop.example.com/c/grocery/dairy/1100/").unwrap();
    /// assert_eq!(node.id, "1100");
    /// assert_eq!(node.url, "https://shop.example.com/c/grocery/dairy/1100");
    /// assert_eq!(node.path_segments, vec!["c", "grocery", "dairy"]);
    /// assert_eq!(node.status, NodeStatus::Unvisited);
    /// ```
    pub fn from_url(url: &str) -> Result<Self, UrlError> {
        let canonical = canonicalize_url(url)?;
        Self::from_canonical(&canonical)
    }

    /// Builds an unvisited node from an already canonical URL
    pub fn from_canonical(url: &Url) -> Result<Self, UrlError> {
        Ok(Self {
            id: extract_category_id(url)?,
            url: url.to_string(),
            path_segments: path_segments(url),
            parent_id: None,
            children: Vec::new(),
            item_count: None,
            status: NodeStatus::Unvisited,
        })
    }

    /// Returns true if this node belongs to the basis set
    pub fn in_basis(&self) -> bool {
        self.status.in_basis()
    }

    /// Returns true if `other`'s path strictly extends this node's path
    pub fn is_path_prefix_of(&self, other: &CategoryNode) -> bool {
        self.path_segments.len() < other.path_segments.len()
            && other.path_segments.starts_with(&self.path_segments)
    }
}
