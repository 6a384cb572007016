//! Named resource profiles available to flex-up requests.

use std::collections::HashMap;

use flex_model::ResourceProfile;
use parking_lot::RwLock;
use tracing::info;

use crate::config::Config;
use crate::error::SchedulerResult;

/// Registry of profiles by name.
///
/// Profiles registered without executor overhead get the configured one.
pub struct ProfileRegistry {
    profiles: RwLock<HashMap<String, ResourceProfile>>,
    executor_cpus: f64,
    executor_memory: f64,
}

impl ProfileRegistry {
    pub fn new(executor_cpus: f64, executor_memory: f64) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            executor_cpus,
            executor_memory,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.executor_cpus, config.executor_memory_mb)
    }

    /// Validates and registers a profile, replacing one with the same name.
    pub fn register(&self, mut profile: ResourceProfile) -> SchedulerResult<()> {
        if profile.executor_cpus == 0.0 && profile.executor_memory == 0.0 {
            profile.executor_cpus = self.executor_cpus;
            profile.executor_memory = self.executor_memory;
        }
        profile.validate()?;

        info!(
            profile = %profile.name,
            cpus = profile.cpus,
            memory = profile.memory,
            "Profile registered"
        );
        self.profiles.write().insert(profile.name.clone(), profile);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ResourceProfile> {
        self.profiles.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;

    #[test]
    fn test_register_folds_executor_overhead() {
        let registry = ProfileRegistry::new(0.1, 64.0);
        registry.register(ResourceProfile::new("small", 1.0, 1024.0)).unwrap();
        registry
            .register(ResourceProfile::new("custom", 1.0, 1024.0).with_executor(0.5, 128.0))
            .unwrap();

        let small = registry.get("small").unwrap();
        assert_eq!(small.executor_cpus, 0.1);
        assert_eq!(small.aggregate_memory(), 1088.0);
        assert_eq!(registry.get("custom").unwrap().executor_memory, 128.0);
        assert_eq!(registry.names(), vec!["custom", "small"]);
    }

    #[test]
    fn test_register_rejects_invalid() {
        let registry = ProfileRegistry::new(0.0, 0.0);
        let err = registry
            .register(ResourceProfile::new("bad", -2.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Model(_)));
        assert!(!registry.contains("bad"));
    }
}
