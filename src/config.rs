use serde::{Deserialize, Serialize};

/// State manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Run a full change detection pass before every save
    pub auto_detect_changes: bool,

    /// Start tracking untracked objects reachable from a newly added entry
    pub cascade_graph_on_add: bool,

    /// Allow the first query into an empty manager to skip reverse fixup scans
    pub single_query_mode: bool,

    /// Weak side-table size at which dead detached entries are evicted
    pub detached_sweep_threshold: usize,

    /// Include key values in error messages and log events
    pub sensitive_data_logging: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            auto_detect_changes: true,
            cascade_graph_on_add: true,
            single_query_mode: true,
            detached_sweep_threshold: 64,
            sensitive_data_logging: false,
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_detect_changes(mut self, enabled: bool) -> Self {
        self.auto_detect_changes = enabled;
        self
    }

    pub fn cascade_graph_on_add(mut self, enabled: bool) -> Self {
        self.cascade_graph_on_add = enabled;
        self
    }

    pub fn single_query_mode(mut self, enabled: bool) -> Self {
        self.single_query_mode = enabled;
        self
    }

    pub fn detached_sweep_threshold(mut self, threshold: usize) -> Self {
        self.detached_sweep_threshold = threshold;
        self
    }

    pub fn sensitive_data_logging(mut self, enabled: bool) -> Self {
        self.sensitive_data_logging = enabled;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.detached_sweep_threshold == 0 {
            return Err("detached_sweep_threshold must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = TrackerConfig::new()
            .auto_detect_changes(false)
            .detached_sweep_threshold(8);
        assert!(!config.auto_detect_changes);
        assert!(config.cascade_graph_on_add);
        assert_eq!(config.detached_sweep_threshold, 8);
        assert!(config.validate().is_ok());
        assert!(TrackerConfig::new().detached_sweep_threshold(0).validate().is_err());
    }
}
