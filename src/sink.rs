use std::sync::Arc;

use anyhow::{bail, Context};
use log::{debug, error, info, trace, warn};

use crate::{
    cache::MetricCache,
    codec::{TimelineMetric, TimelineMetrics, ValueKind},
    config::SinkConfig,
    endpoint::CollectorEndpoint,
    exporter::{DeliveryOutcome, Exporter, HttpExporter},
    Sample, Time,
};

/// Where a tick of data points came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInfo {
    pub src_component_id: String,
    pub src_task_id: u32,
    pub timestamp: Time,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Long(i64),
    Double(f64),
    Text(String),
}
impl DataValue {
    /// The value as a finite number, if it is one.
    pub fn as_number(&self) -> Option<(f64, ValueKind)> {
        let (value, kind) = match self {
            // Magnitudes past 2^53 round to the nearest double; the collector
            // stores doubles either way.
            Self::Long(v) => (*v as f64, ValueKind::Long),
            Self::Double(v) => (*v, ValueKind::Double),
            Self::Text(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(v) => (v as f64, ValueKind::Long),
                    Err(_) => (s.parse::<f64>().ok()?, ValueKind::Double),
                }
            }
        };
        value.is_finite().then_some((value, kind))
    }
}
impl From<i64> for DataValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}
impl From<f64> for DataValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}
impl From<&str> for DataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}
impl From<String> for DataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub name: String,
    pub value: Option<DataValue>,
}
impl DataPoint {
    pub fn new(name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// Callbacks the host framework drives on its task thread.
pub trait MetricsConsumer {
    fn handle_data_points(&mut self, task: &TaskInfo, points: &[DataPoint]);
    fn cleanup(&mut self);
}

#[derive(Debug)]
pub struct TimelineMetricsSink<E = HttpExporter> {
    cache: Arc<MetricCache>,
    exporter: E,
    hostname: String,
}
impl TimelineMetricsSink<HttpExporter> {
    pub fn prepare(config: &SinkConfig, hostname: &str) -> anyhow::Result<Self> {
        info!("preparing timeline metrics sink");
        let hostname = hostname.trim();
        if hostname.is_empty() {
            bail!("could not identify hostname");
        }
        config.validate().context("invalid sink configuration")?;
        let candidates = config.candidates()?;
        let endpoint = CollectorEndpoint::resolve(&candidates)
            .with_context(|| format!("no usable collector in `{}`", config.collector_hosts))?;
        info!("sending metrics to {}", endpoint.url());
        let exporter = HttpExporter::new(&endpoint, config.timeout);
        let cache = MetricCache::new(config.max_samples_per_name, config.eviction_interval);
        Ok(Self::with_parts(Arc::new(cache), exporter, hostname))
    }
}
impl<E: Exporter> TimelineMetricsSink<E> {
    pub fn with_parts(cache: Arc<MetricCache>, exporter: E, hostname: &str) -> Self {
        Self {
            cache,
            exporter,
            hostname: hostname.to_owned(),
        }
    }

    pub fn cache(&self) -> &Arc<MetricCache> {
        &self.cache
    }
    pub fn exporter(&self) -> &E {
        &self.exporter
    }
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Buffers `points` and sends whatever became due, in at most one request.
    ///
    /// Returns `None` when nothing was due.
    pub fn report(&mut self, task: &TaskInfo, points: &[DataPoint]) -> Option<DeliveryOutcome> {
        let mut metrics = vec![];
        for point in points {
            let Some((value, kind)) = point.value.as_ref().and_then(DataValue::as_number) else {
                trace!("skipping non-numeric data point {}", point.name);
                continue;
            };
            debug!("{} = {}", point.name, value);
            let sample = Sample {
                time: task.timestamp,
                value,
            };
            self.cache
                .put_sample(&point.name, &task.src_component_id, kind, sample);
            if let Some(series) = self.cache.take_ready_series(&point.name) {
                metrics.push(TimelineMetric::from_series(series, &self.hostname));
            }
        }
        if metrics.is_empty() {
            return None;
        }

        let outcome = self.exporter.export(&TimelineMetrics::new(metrics));
        match &outcome {
            DeliveryOutcome::Delivered => {}
            DeliveryOutcome::TransientFailure { url, reason } => {
                warn!("unable to send metrics to collector by address {url}: {reason}")
            }
            DeliveryOutcome::UnexpectedFailure(e) => error!("unexpected error: {e:#}"),
        }
        Some(outcome)
    }
}
impl<E: Exporter> MetricsConsumer for TimelineMetricsSink<E> {
    fn handle_data_points(&mut self, task: &TaskInfo, points: &[DataPoint]) {
        self.report(task, points);
    }

    fn cleanup(&mut self) {
        info!("stopping timeline metrics sink");
        self.cache.clear();
    }
}
