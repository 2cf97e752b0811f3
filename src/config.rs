use std::{collections::HashMap, str::FromStr, time::Duration};

use anyhow::{bail, Context};

use crate::{
    cache::{MAX_EVICTION_TIME_MILLIS, MAX_RECS_PER_NAME_DEFAULT},
    endpoint::{parse_candidates, CollectorCandidate},
    Time,
};

pub const COLLECTOR_HOST_PROPERTY: &str = "collector";
pub const COLLECTOR_PORT_PROPERTY: &str = "port";
pub const MAX_METRIC_ROW_CACHE_SIZE: &str = "maxRowCacheSize";
pub const METRICS_SEND_INTERVAL: &str = "sendInterval";
pub const METRICS_POST_TIMEOUT: &str = "timeout";

pub const DEFAULT_POST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings the sink needs at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub(crate) collector_hosts: String,
    pub(crate) collector_port: u16,
    pub(crate) max_samples_per_name: usize,
    pub(crate) eviction_interval: Time,
    pub(crate) timeout: Duration,
}
impl SinkConfig {
    pub fn new(collector_hosts: impl Into<String>, collector_port: u16) -> Self {
        Self {
            collector_hosts: collector_hosts.into(),
            collector_port,
            max_samples_per_name: MAX_RECS_PER_NAME_DEFAULT,
            eviction_interval: MAX_EVICTION_TIME_MILLIS,
            timeout: DEFAULT_POST_TIMEOUT,
        }
    }

    /// Reads the properties the host has already loaded.
    pub fn from_properties(props: &HashMap<String, String>) -> anyhow::Result<Self> {
        let Some(hosts) = props.get(COLLECTOR_HOST_PROPERTY) else {
            bail!("missing property `{COLLECTOR_HOST_PROPERTY}`");
        };
        let Some(port) = parse_property::<u16>(props, COLLECTOR_PORT_PROPERTY)? else {
            bail!("missing property `{COLLECTOR_PORT_PROPERTY}`");
        };
        let mut config = Self::new(hosts.trim(), port);
        if let Some(size) = parse_property(props, MAX_METRIC_ROW_CACHE_SIZE)? {
            config = config.max_samples_per_name(size);
        }
        if let Some(interval) = parse_property(props, METRICS_SEND_INTERVAL)? {
            config = config.eviction_interval_millis(interval);
        }
        if let Some(timeout) = props.get(METRICS_POST_TIMEOUT) {
            let timeout = parse_timeout(timeout)
                .with_context(|| format!("invalid property `{METRICS_POST_TIMEOUT}`"))?;
            config = config.timeout(timeout);
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets the most samples buffered per metric name.
    ///
    /// Defaults to `10000`.
    pub fn max_samples_per_name(mut self, max_samples_per_name: usize) -> Self {
        self.max_samples_per_name = max_samples_per_name;
        self
    }

    /// Sets how long a metric may go without being flushed.
    ///
    /// Defaults to `59000` milliseconds.
    pub fn eviction_interval_millis(mut self, eviction_interval: Time) -> Self {
        self.eviction_interval = eviction_interval;
        self
    }

    /// Sets the connect and overall timeout of one request to the collector.
    ///
    /// Defaults to 10 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.collector_hosts.trim().is_empty() {
            bail!("`{COLLECTOR_HOST_PROPERTY}` is empty");
        }
        if self.max_samples_per_name == 0 {
            bail!("`{MAX_METRIC_ROW_CACHE_SIZE}` must be at least 1");
        }
        if self.eviction_interval < 0 {
            bail!("`{METRICS_SEND_INTERVAL}` must not be negative");
        }
        if self.timeout.is_zero() {
            bail!("`{METRICS_POST_TIMEOUT}` must be greater than zero");
        }
        Ok(())
    }

    pub fn candidates(&self) -> anyhow::Result<Vec<CollectorCandidate>> {
        parse_candidates(&self.collector_hosts, self.collector_port)
    }
}

fn parse_property<T>(props: &HashMap<String, String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(value) = props.get(key) else {
        return Ok(None);
    };
    let value = value
        .trim()
        .parse()
        .with_context(|| format!("invalid property `{key}` = `{value}`"))?;
    Ok(Some(value))
}

/// Plain integers are seconds; anything else goes through `humantime`.
fn parse_timeout(value: &str) -> anyhow::Result<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    Ok(humantime::parse_duration(value)?)
}
