//! Configuration for the scheduler.

use std::time::Duration;

use anyhow::{Context, Result};
use flex_model::DEFAULT_ROLE;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Prefix for launched task names.
    pub framework_name: String,

    /// Reservation role whose resources count as role-reserved.
    pub framework_role: String,

    /// Seed for port assignment. Random when unset.
    pub port_seed: Option<u64>,

    /// Task terminator interval in seconds.
    pub terminator_interval_secs: u64,

    /// Reconcile attempts after the initial full request.
    pub reconcile_max_attempts: u32,

    /// Base reconcile delay in milliseconds. Attempt n waits n times this.
    pub reconcile_delay_ms: u64,

    /// Task type used when a flex-up request names none.
    pub default_task_type: String,

    /// Executor overhead folded into registered profiles.
    pub executor_cpus: f64,
    pub executor_memory_mb: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            framework_name: "flex".to_string(),
            framework_role: DEFAULT_ROLE.to_string(),
            port_seed: None,
            terminator_interval_secs: 5,
            reconcile_max_attempts: 10,
            reconcile_delay_ms: 10_000,
            default_task_type: "nm".to_string(),
            executor_cpus: 0.0,
            executor_memory_mb: 0.0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let framework_name = lookup("FLEX_FRAMEWORK_NAME").unwrap_or(defaults.framework_name);
        let framework_role = lookup("FLEX_FRAMEWORK_ROLE").unwrap_or(defaults.framework_role);

        // Malformed seeds are rejected, not ignored
        let port_seed = lookup("FLEX_PORT_SEED")
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("FLEX_PORT_SEED must be an unsigned integer")?;

        let terminator_interval_secs = lookup("FLEX_TERMINATOR_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.terminator_interval_secs);

        let reconcile_max_attempts = lookup("FLEX_RECONCILE_MAX_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.reconcile_max_attempts);
        let reconcile_delay_ms = lookup("FLEX_RECONCILE_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.reconcile_delay_ms);

        let default_task_type =
            lookup("FLEX_DEFAULT_TASK_TYPE").unwrap_or(defaults.default_task_type);

        let executor_cpus = parse_non_negative(&lookup, "FLEX_EXECUTOR_CPUS")?;
        let executor_memory_mb = parse_non_negative(&lookup, "FLEX_EXECUTOR_MEMORY_MB")?;

        Ok(Self {
            framework_name,
            framework_role,
            port_seed,
            terminator_interval_secs,
            reconcile_max_attempts,
            reconcile_delay_ms,
            default_task_type,
            executor_cpus,
            executor_memory_mb,
        })
    }
}

impl Config {
    /// Period between terminator passes. Never zero.
    pub fn terminator_interval(&self) -> Duration {
        Duration::from_secs(self.terminator_interval_secs.max(1))
    }

    pub fn reconcile_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile_delay_ms)
    }
}

fn parse_non_negative<F>(lookup: &F, key: &str) -> Result<f64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(0.0);
    };
    let value: f64 = raw
        .parse()
        .with_context(|| format!("{key} must be a number, got '{raw}'"))?;
    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("{key} must be a non-negative number, got '{raw}'");
    }
    Ok(value)
}
