//! URL handling module for Catalog-Sweep
//!
//! This module provides category URL canonicalization, numeric category id
//! extraction, ancestry path tokens, and store-scoped request URLs.

mod normalize;

use url::Url;

// Re-export main functions
pub use normalize::{canonicalize_url, extract_category_id, path_segments};

/// Builds the request URL for a category page scoped to a store
///
/// The canonical URL carries no query, so the store parameter is the only
/// one present on the result. With no store the URL is returned unchanged.
///
/// # Examples
///
/// ```
/// use catalog_sweep::url::{canonicalize_url, store_scoped_url};
///
/// let url = canonicalize_url("https://shop.example.com/c/dairy/1100").unwrap();
/// let scoped = store_scoped_url(&url, "store", Some("1001"));
/// assert_eq!(scoped.as_str(), "https://shop.example.com/c/dairy/1100?store=1001");
/// ```
pub fn store_scoped_url(url: &Url, store_param: &str, store_id: Option<&str>) -> Url {
    let mut scoped = url.clone();
    if let Some(store) = store_id {
        scoped.query_pairs_mut().append_pair(store_param, store);
    }
    scoped
}
