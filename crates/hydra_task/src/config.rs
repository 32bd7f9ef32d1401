//! # Pool Configuration
//!
//! Deserializable settings for the CPU task pool, loaded from the engine's
//! TOML config at startup.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Hard ceiling on queued task slices.
pub const MAX_QUEUE_CAPACITY: usize = 32_767;

/// Settings for [`TaskPool`](crate::TaskPool).
///
/// ## Example
///
/// ```rust,ignore
/// let config = PoolConfig::from_toml_str(r#"
///     worker_threads = 6
///     worker_priority = 1
/// "#)?;
/// let pool = TaskPool::new(config);
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Worker thread count. `0` means one worker per available core,
    /// minus one core left for the submitting thread.
    pub worker_threads: usize,

    /// Maximum queued task slices. Capped at [`MAX_QUEUE_CAPACITY`].
    pub queue_capacity: usize,

    /// Scheduling priority for worker threads, in the engine range
    /// `[-3, 3]`. `0` keeps the OS default.
    pub worker_priority: i32,

    /// Pin each worker to its own CPU core.
    pub pin_workers: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            queue_capacity: MAX_QUEUE_CAPACITY,
            worker_priority: 0,
            pin_workers: false,
        }
    }
}

impl PoolConfig {
    /// Production preset: auto worker count, slightly boosted priority,
    /// workers pinned to cores.
    #[must_use]
    pub fn production() -> Self {
        Self {
            worker_threads: 0,
            queue_capacity: MAX_QUEUE_CAPACITY,
            worker_priority: 1,
            pin_workers: true,
        }
    }

    /// Parses and validates a config from TOML source.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "queue_capacity must be in [1, {MAX_QUEUE_CAPACITY}], got {}",
                self.queue_capacity
            )));
        }
        if !(-3..=3).contains(&self.worker_priority) {
            return Err(ConfigError::Invalid(format!(
                "worker_priority must be in [-3, 3], got {}",
                self.worker_priority
            )));
        }
        Ok(())
    }

    /// Resolves `worker_threads = 0` to an actual count.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.worker_threads != 0 {
            return self.worker_threads;
        }
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        // Leave one core for the submitting thread.
        cores.saturating_sub(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::default();
        config.validate().unwrap();
        assert_eq!(config.queue_capacity, MAX_QUEUE_CAPACITY);
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_parse_from_toml() {
        let config = PoolConfig::from_toml_str(
            r"
            worker_threads = 6
            queue_capacity = 1024
            worker_priority = 1
            pin_workers = true
            ",
        )
        .unwrap();
        assert_eq!(config.worker_threads, 6);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.worker_priority, 1);
        assert!(config.pin_workers);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(PoolConfig::from_toml_str("queue_capacity = 0").is_err());
        assert!(PoolConfig::from_toml_str("queue_capacity = 40000").is_err());
        assert!(PoolConfig::from_toml_str("worker_priority = 4").is_err());
        assert!(PoolConfig::from_toml_str("unknown_knob = 1").is_err());
    }
}
