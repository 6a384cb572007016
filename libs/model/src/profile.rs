//! Resource profiles: the named bundle of resources a task asks for.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// A named bundle of requested resources.
///
/// `cpus` and `memory` are what the task itself advertises; the executor
/// overhead is added on top when the task is placed. A port value of `0`
/// means "assign any free port".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub name: String,
    pub cpus: f64,
    /// Memory in MB.
    pub memory: f64,
    #[serde(default)]
    pub ports: BTreeMap<String, u64>,
    #[serde(default)]
    pub executor_cpus: f64,
    #[serde(default)]
    pub executor_memory: f64,
}

impl ResourceProfile {
    pub fn new(name: impl Into<String>, cpus: f64, memory: f64) -> Self {
        Self {
            name: name.into(),
            cpus,
            memory,
            ports: BTreeMap::new(),
            executor_cpus: 0.0,
            executor_memory: 0.0,
        }
    }

    /// Adds a named port request. `0` asks for any free port.
    pub fn with_port(mut self, name: impl Into<String>, port: u64) -> Self {
        self.ports.insert(name.into(), port);
        self
    }

    /// Sets the fixed executor overhead.
    pub fn with_executor(mut self, cpus: f64, memory: f64) -> Self {
        self.executor_cpus = cpus;
        self.executor_memory = memory;
        self
    }

    /// CPUs required from an offer: task plus executor.
    pub fn aggregate_cpus(&self) -> f64 {
        self.cpus + self.executor_cpus
    }

    /// Memory required from an offer: task plus executor.
    pub fn aggregate_memory(&self) -> f64 {
        self.memory + self.executor_memory
    }

    /// Requested port values in port-name order.
    pub fn port_values(&self) -> Vec<u64> {
        self.ports.values().copied().collect()
    }

    /// Zero-sized profiles advertise no capacity of their own; hosts running
    /// one take part in elastic sharing.
    pub fn is_zero(&self) -> bool {
        self.cpus == 0.0 && self.memory == 0.0
    }

    /// Checks that every quantity is finite and non-negative.
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |reason: &str| ModelError::InvalidProfile {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        for (field, value) in [
            ("cpus", self.cpus),
            ("memory", self.memory),
            ("executor_cpus", self.executor_cpus),
            ("executor_memory", self.executor_memory),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(&format!("{field} must be a non-negative number")));
            }
        }
        Ok(())
    }

    /// Structured-text form stored in the state blob.
    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_includes_executor() {
        let profile = ResourceProfile::new("medium", 2.0, 2048.0).with_executor(0.2, 256.0);
        assert!((profile.aggregate_cpus() - 2.2).abs() < 1e-9);
        assert_eq!(profile.aggregate_memory(), 2304.0);
    }

    #[test]
    fn test_port_values_in_name_order() {
        let profile = ResourceProfile::new("p", 1.0, 1.0)
            .with_port("web", 0)
            .with_port("admin", 8088);
        assert_eq!(profile.port_values(), vec![8088, 0]);
    }

    #[test]
    fn test_zero_profile() {
        assert!(ResourceProfile::new("zero", 0.0, 0.0).is_zero());
        assert!(!ResourceProfile::new("small", 1.0, 0.0).is_zero());
    }

    #[test]
    fn test_validate_rejects_negative() {
        let err = ResourceProfile::new("bad", -1.0, 10.0).validate().unwrap_err();
        assert!(err.to_string().contains("cpus"));
        assert!(ResourceProfile::new("", 1.0, 1.0).validate().is_err());
        assert!(ResourceProfile::new("nan", f64::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let profile = ResourceProfile::new("large", 4.0, 8192.5)
            .with_port("rpc", 0)
            .with_executor(0.1, 128.0);
        let json = profile.to_json().unwrap();
        assert_eq!(ResourceProfile::from_json(&json).unwrap(), profile);
    }

    #[test]
    fn test_json_roundtrip_is_bit_exact() {
        let profile = ResourceProfile::new("odd", 939473.0010825967, 0.1 + 0.2)
            .with_executor(1e-300, 123456789.12345678);
        let decoded = ResourceProfile::from_json(&profile.to_json().unwrap()).unwrap();
        assert_eq!(decoded.cpus.to_bits(), profile.cpus.to_bits());
        assert_eq!(decoded.memory.to_bits(), profile.memory.to_bits());
        assert_eq!(decoded.executor_cpus.to_bits(), profile.executor_cpus.to_bits());
        assert_eq!(decoded.executor_memory.to_bits(), profile.executor_memory.to_bits());
    }

    #[test]
    fn test_json_defaults() {
        let profile = ResourceProfile::from_json(r#"{"name":"s","cpus":1.0,"memory":512.0}"#).unwrap();
        assert!(profile.ports.is_empty());
        assert_eq!(profile.executor_cpus, 0.0);
    }
}
