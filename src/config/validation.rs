use crate::config::types::{Config, DiscoveryConfig, OrchestratorConfig, ProbeConfig, SeedEntry};
use crate::url::{canonicalize_url, extract_category_id};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_discovery_config(&config.discovery)?;
    validate_probe_config(&config.probe)?;
    validate_orchestrator_config(&config.orchestrator)?;
    validate_seeds(&config.seeds)?;
    validate_stores(&config.stores)?;
    Ok(())
}

/// Validates discovery configuration
fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.pagination_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "pagination_limit must be >= 1, got {}",
            config.pagination_limit
        )));
    }

    if config.persist_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "persist_interval must be >= 1, got {}",
            config.persist_interval
        )));
    }

    if config.backoff_initial_ms > config.backoff_max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff_initial_ms ({}) cannot exceed backoff_max_ms ({})",
            config.backoff_initial_ms, config.backoff_max_ms
        )));
    }

    require_non_empty("database_path", &config.database_path)?;
    require_non_empty("basis_path", &config.basis_path)?;
    require_non_empty("hierarchy_path", &config.hierarchy_path)?;

    if let Some(store) = &config.store {
        validate_store_id(store)?;
    }

    Ok(())
}

/// Validates probe configuration
fn validate_probe_config(config: &ProbeConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    require_non_empty("store_param", &config.store_param)?;

    validate_selector("count_selector", &config.count_selector)?;
    validate_selector("child_link_selector", &config.child_link_selector)?;
    validate_selector("item_selector", &config.item_selector)?;
    if let Some(next) = &config.next_page_selector {
        validate_selector("next_page_selector", next)?;
    }

    Ok(())
}

/// Validates orchestrator configuration
fn validate_orchestrator_config(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    if config.concurrency_limit < 1 || config.concurrency_limit > 256 {
        return Err(ConfigError::Validation(format!(
            "concurrency_limit must be between 1 and 256, got {}",
            config.concurrency_limit
        )));
    }

    if config.poll_interval_secs < 1 || config.heartbeat_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "poll_interval_secs and heartbeat_interval_secs must be >= 1".to_string(),
        ));
    }

    if config.stall_rate_threshold < 0.0 {
        return Err(ConfigError::Validation(format!(
            "stall_rate_threshold cannot be negative, got {}",
            config.stall_rate_threshold
        )));
    }

    if config.log_tail_lines < 1 {
        return Err(ConfigError::Validation(
            "log_tail_lines must be >= 1".to_string(),
        ));
    }

    require_non_empty("checkpoint_dir", &config.checkpoint_dir)?;
    require_non_empty("output_dir", &config.output_dir)?;
    require_non_empty("log_dir", &config.log_dir)?;
    require_non_empty("status_path", &config.status_path)?;

    Ok(())
}

/// Validates seed entries: each must canonicalize and carry a category id
fn validate_seeds(seeds: &[SeedEntry]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = canonicalize_url(&seed.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e))
        })?;

        extract_category_id(&url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Seed URL '{}': {}", seed.url, e))
        })?;
    }

    Ok(())
}

/// Validates the store list: ids must be usable as file names and unique
fn validate_stores(stores: &[String]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for store in stores {
        validate_store_id(store)?;
        if !seen.insert(store.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate store id '{}'",
                store
            )));
        }
    }
    Ok(())
}

/// Validates a single store id
pub(crate) fn validate_store_id(store: &str) -> Result<(), ConfigError> {
    if store.is_empty() {
        return Err(ConfigError::Validation(
            "store id cannot be empty".to_string(),
        ));
    }

    if !store
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "store id must contain only alphanumeric characters, '-' or '_', got '{}'",
            store
        )));
    }

    Ok(())
}

fn validate_selector(name: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", name, selector, e)))
}

fn require_non_empty(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_store_id() {
        assert!(validate_store_id("1001").is_ok());
        assert!(validate_store_id("us-east_7").is_ok());

        assert!(validate_store_id("").is_err());
        assert!(validate_store_id("../etc").is_err());
        assert!(validate_store_id("store 1").is_err());
    }

    #[test]
    fn test_duplicate_stores_rejected() {
        let stores = vec!["1001".to_string(), "1002".to_string(), "1001".to_string()];
        assert!(validate_stores(&stores).is_err());
    }

    #[test]
    fn test_validate_selector() {
        assert!(validate_selector("item_selector", ".product-tile a").is_ok());
        assert!(matches!(
            validate_selector("item_selector", "[[[").unwrap_err(),
            ConfigError::InvalidSelector(_)
        ));
    }

    #[test]
    fn test_seed_without_category_id_rejected() {
        let seeds = vec![SeedEntry {
            url: "https://shop.example.com/c/grocery".to_string(),
            name: None,
        }];
        assert!(validate_seeds(&seeds).is_err());

        let seeds = vec![SeedEntry {
            url: "https://shop.example.com/c/grocery/1000".to_string(),
            name: None,
        }];
        assert!(validate_seeds(&seeds).is_ok());
    }
}
