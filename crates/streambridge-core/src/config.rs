//! Lifecycle manager configuration.

use std::time::Duration;
use streambridge_broker::SubscribeOptions;

/// Tuning knobs for the session lifecycle manager and idle sweeper.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Wait applied after a first topic access before returning the (likely
    /// still empty) buffer, giving the new subscription time to start
    /// receiving.
    pub settle_delay: Duration,
    /// Fixed wait between closing a failed binding and creating its
    /// replacement.
    pub recovery_backoff: Duration,
    /// Sessions with a live binding unpolled for longer than this are
    /// evicted.
    pub idle_timeout: Duration,
    /// How often the idle sweeper scans the registry.
    pub sweep_interval: Duration,
    /// Options applied to every broker subscription the manager opens.
    pub subscribe_options: SubscribeOptions,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            recovery_backoff: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            subscribe_options: SubscribeOptions::default(),
        }
    }
}
