//! Failure detection settings for a finger table.

use std::time::Duration;

/// Default silence threshold before a site is declared failed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// A site silent longer than this is considered dead
    pub timeout: Duration,
    /// How often the failure sweep runs (None = every `timeout`)
    pub sweep_interval: Option<Duration>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl TableConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sweep_interval: None,
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Effective sweep cadence.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval.unwrap_or(self.timeout)
    }

    /// Check the settings can actually detect failures on time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if let Some(interval) = self.sweep_interval {
            if interval.is_zero() {
                return Err(ConfigError::ZeroSweepInterval);
            }
            if interval > self.timeout {
                return Err(ConfigError::SweepTooCoarse {
                    interval,
                    timeout: self.timeout,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failure timeout must be greater than zero")]
    ZeroTimeout,
    #[error("Sweep interval must be greater than zero")]
    ZeroSweepInterval,
    #[error("Sweep interval {interval:?} is coarser than the failure timeout {timeout:?}")]
    SweepTooCoarse { interval: Duration, timeout: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sweeps_at_timeout() {
        let config = TableConfig::default();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.sweep_interval(), DEFAULT_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_finer_sweep_interval_is_allowed() {
        let config = TableConfig::from_secs(5).with_sweep_interval(Duration::from_secs(1));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_coarser_sweep_interval_is_rejected() {
        let config = TableConfig::from_secs(5).with_sweep_interval(Duration::from_secs(6));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SweepTooCoarse { .. })
        ));
    }

    #[test]
    fn test_zero_durations_are_rejected() {
        assert_eq!(TableConfig::from_secs(0).validate(), Err(ConfigError::ZeroTimeout));
        assert_eq!(
            TableConfig::from_secs(5)
                .with_sweep_interval(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroSweepInterval)
        );
    }
}
