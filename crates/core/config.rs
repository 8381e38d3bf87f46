//! Configuration for partition runs and the fetch layer.
//!
//! Defaults match the UK street-crime query service: at most 10 000 results
//! per request, 10 requests per second, and a 5 000-7 500 target band.
use serde::de::Error;
use std::time::Duration;

/// What the partitioner does after a non-capacity service failure.
///
/// Splitting on a generic failure assumes failures correlate with oversized
/// requests. That holds often enough to be the default, but it can also mask
/// unrelated failures as capacity problems, so it stays configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    SplitAndRetry,
    Abandon,
}

/// Partition run configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Lower edge of the target band (inclusive)
    #[serde(default = "Config::default_target_min")]
    pub target_min: u64,

    /// Upper edge of the target band (inclusive)
    #[serde(default = "Config::default_target_max")]
    pub target_max: u64,

    /// Deepest recursion level that may still query the service
    #[serde(default = "Config::default_max_depth")]
    pub max_depth: u32,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Query service and rate limit settings
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Query service limits and pacing
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    #[serde(default = "FetchConfig::default_base_url")]
    pub base_url: String,

    /// Service rate ceiling; also the size of the concurrent admission gate
    #[serde(default = "FetchConfig::default_max_calls_per_second")]
    pub max_calls_per_second: usize,

    /// Service result cap; larger successful responses count as over capacity
    #[serde(default = "FetchConfig::default_max_results_per_request")]
    pub max_results_per_request: usize,

    /// Pause before every call in sequential mode
    #[serde(default = "FetchConfig::default_sequential_delay_ms")]
    pub sequential_delay_ms: u64,

    /// Pause before releasing an admission slot in concurrent mode
    #[serde(default = "FetchConfig::default_release_delay_ms")]
    pub release_delay_ms: u64,

    #[serde(default = "FetchConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl FetchConfig {
    fn default_base_url() -> String {
        "https://data.police.uk/api/crimes-street/all-crime".to_string()
    }

    const fn default_max_calls_per_second() -> usize {
        10
    }

    const fn default_max_results_per_request() -> usize {
        10_000
    }

    const fn default_sequential_delay_ms() -> u64 {
        100
    }

    const fn default_release_delay_ms() -> u64 {
        100
    }

    const fn default_request_timeout_secs() -> u64 {
        30
    }

    pub fn sequential_delay(&self) -> Duration {
        Duration::from_millis(self.sequential_delay_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// No pacing at all. Meant for tests against in-process services.
    pub fn unpaced() -> Self {
        Self {
            sequential_delay_ms: 0,
            release_delay_ms: 0,
            ..Self::default()
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            max_calls_per_second: Self::default_max_calls_per_second(),
            max_results_per_request: Self::default_max_results_per_request(),
            sequential_delay_ms: Self::default_sequential_delay_ms(),
            release_delay_ms: Self::default_release_delay_ms(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

impl Config {
    const fn default_target_min() -> u64 {
        5_000
    }

    const fn default_target_max() -> u64 {
        7_500
    }

    const fn default_max_depth() -> u32 {
        15
    }

    pub fn with_target_band(mut self, min: u64, max: u64) -> Self {
        assert!(min <= max, "Target band minimum must not exceed maximum");
        self.target_min = min;
        self.target_max = max;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        if max_depth > 24 {
            log::warn!(
                "Max depth of {} allows up to 4^{} leaf evaluations; \
                pruning and settlement are the only practical bound.",
                max_depth,
                max_depth
            );
        }
        self.max_depth = max_depth;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    /// Whether a count falls inside the target band.
    pub fn in_band(&self, count: u64) -> bool {
        (self.target_min..=self.target_max).contains(&count)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.target_min > self.target_max {
            return Err(format!(
                "Target band is empty: min {} exceeds max {}",
                self.target_min, self.target_max
            ));
        }

        if self.fetch.max_calls_per_second == 0 {
            return Err("Max calls per second must be greater than zero".to_string());
        }

        if self.fetch.max_results_per_request == 0 {
            return Err("Max results per request must be greater than zero".to_string());
        }

        if self.target_max > self.fetch.max_results_per_request as u64 {
            log::warn!(
                "Target max {} exceeds the service result cap {}; in-band areas will be refused",
                self.target_max,
                self.fetch.max_results_per_request
            );
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_min: Self::default_target_min(),
            target_max: Self::default_target_max(),
            max_depth: Self::default_max_depth(),
            failure_policy: FailurePolicy::default(),
            fetch: FetchConfig::default(),
        }
    }
}
