use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{cache::MetricSeries, Time};

/// Runtime kind of a reported value, sent as the metric's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValueKind {
    Long,
    #[default]
    Double,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineMetric {
    #[serde(rename = "metricname")]
    pub metric_name: String,
    #[serde(rename = "appid")]
    pub app_id: String,
    #[serde(rename = "hostname")]
    pub host_name: String,
    #[serde(rename = "starttime")]
    pub start_time: Time,
    #[serde(rename = "type")]
    pub kind: ValueKind,
    pub metrics: BTreeMap<Time, f64>,
}
impl TimelineMetric {
    pub fn from_series(series: MetricSeries, host_name: &str) -> Self {
        let start_time = series.start_time().unwrap_or(series.last_flush_time());
        let (metric_name, app_id, kind, metrics) = series.into_parts();
        Self {
            metric_name,
            app_id,
            host_name: host_name.to_owned(),
            start_time,
            kind,
            metrics,
        }
    }
}

/// Body of one request to the collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineMetrics {
    pub metrics: Vec<TimelineMetric>,
}
impl TimelineMetrics {
    pub fn new(metrics: Vec<TimelineMetric>) -> Self {
        Self { metrics }
    }
}

pub fn encode_metrics(metrics: &TimelineMetrics) -> serde_json::Result<String> {
    serde_json::to_string(metrics)
}
pub fn decode_metrics(body: &str) -> serde_json::Result<TimelineMetrics> {
    serde_json::from_str(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric() -> TimelineMetric {
        TimelineMetric {
            metric_name: "cpu.load".into(),
            app_id: "spout".into(),
            host_name: "worker-1".into(),
            start_time: 10,
            kind: ValueKind::Double,
            metrics: BTreeMap::from([(10, 0.5), (20, 0.75)]),
        }
    }

    #[test]
    fn test_encode_field_names() {
        let body = encode_metrics(&TimelineMetrics::new(vec![metric()])).unwrap();
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let m = &json["metrics"][0];
        assert_eq!(m["metricname"], "cpu.load");
        assert_eq!(m["appid"], "spout");
        assert_eq!(m["hostname"], "worker-1");
        assert_eq!(m["starttime"], 10);
        assert_eq!(m["type"], "Double");
        assert_eq!(m["metrics"]["20"], 0.75);
    }

    #[test]
    fn test_decode_collector_body() {
        let body = r#"{"metrics":[{"metricname":"acks","appid":"bolt","hostname":"h",
            "starttime":5,"type":"Long","metrics":{"5":1.0,"6":3.0}}]}"#;
        let metrics = decode_metrics(body).unwrap();
        assert_eq!(metrics.metrics.len(), 1);
        let m = &metrics.metrics[0];
        assert_eq!(m.kind, ValueKind::Long);
        assert_eq!(m.metrics.get(&6), Some(&3.0));
    }
}
