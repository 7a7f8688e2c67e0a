//! Timeout enforcement for external program invocations
//!
//! Each Tinker invocation gets its own wall-clock budget from
//! `timeout_seconds`; `0` disables the guard. The enforcer only reports
//! expiry. The caller is responsible for killing the child process.

use std::time::{Duration, Instant};

/// Timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Maximum wall-clock time per invocation (0 = unbounded)
    pub invocation_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            invocation_seconds: 3600,
        }
    }
}

impl TimeoutConfig {
    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            invocation_seconds: seconds,
        }
    }

    pub fn unbounded() -> Self {
        Self::from_seconds(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.invocation_seconds > 0
    }

    pub fn limit(&self) -> Option<Duration> {
        self.is_enabled()
            .then(|| Duration::from_secs(self.invocation_seconds))
    }
}

/// Timeout check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStatus {
    Ok,
    Expired,
}

impl TimeoutStatus {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutStatus::Expired)
    }
}

/// Tracks wall-clock time for one invocation
#[derive(Debug)]
pub struct TimeoutEnforcer {
    config: TimeoutConfig,
    start_time: Instant,
}

impl TimeoutEnforcer {
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    pub fn check(&self) -> TimeoutStatus {
        match self.config.limit() {
            Some(limit) if self.elapsed() > limit => TimeoutStatus::Expired,
            _ => TimeoutStatus::Ok,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time left before expiry; None when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.config
            .limit()
            .map(|limit| limit.saturating_sub(self.elapsed()))
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.invocation_seconds, 3600);
        assert!(config.is_enabled());
    }

    #[test]
    fn test_zero_disables() {
        let config = TimeoutConfig::unbounded();
        assert!(!config.is_enabled());
        assert!(config.limit().is_none());

        let enforcer = TimeoutEnforcer::new(config);
        assert_eq!(enforcer.check(), TimeoutStatus::Ok);
        assert!(enforcer.remaining().is_none());
    }

    #[test]
    fn test_not_expired_initially() {
        let enforcer = TimeoutEnforcer::new(TimeoutConfig::from_seconds(60));
        assert_eq!(enforcer.check(), TimeoutStatus::Ok);
        assert!(enforcer.remaining().unwrap() > Duration::from_secs(59));
    }

    #[test]
    fn test_expires() {
        let enforcer = TimeoutEnforcer::new(TimeoutConfig::from_seconds(1));
        sleep(Duration::from_millis(1100));
        assert!(enforcer.check().is_timeout());
        assert_eq!(enforcer.remaining(), Some(Duration::ZERO));
    }
}
