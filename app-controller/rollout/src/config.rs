use istio_app_controller_core::workload::DEFAULT_REPLICAS;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Replicas for a new application when the request does not set a
    /// positive count.
    pub default_replicas: i32,

    pub drain: DrainConfig,
}

/// Bounds how long version retirement waits for traffic to move off the
/// retired version before deleting its workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrainConfig {
    /// How often virtual services are re-read while draining.
    pub poll_interval: Duration,

    /// Gives up polling after this long. Retirement proceeds regardless.
    pub timeout: Duration,

    /// Time allowed for sidecars to pick up the final routes.
    pub grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_replicas: DEFAULT_REPLICAS,
            drain: DrainConfig::default(),
        }
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            grace: Duration::from_secs(3),
        }
    }
}
