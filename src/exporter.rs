use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::{
    codec::{encode_metrics, TimelineMetrics},
    endpoint::CollectorEndpoint,
};

/// What became of one send attempt. None of these are retried.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    /// The collector could not be reached.
    TransientFailure { url: String, reason: String },
    UnexpectedFailure(anyhow::Error),
}
impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFailure { .. })
    }
}

pub trait Exporter: core::fmt::Debug {
    fn export(&mut self, metrics: &TimelineMetrics) -> DeliveryOutcome;
}
impl<E: Exporter + ?Sized> Exporter for Box<E> {
    fn export(&mut self, metrics: &TimelineMetrics) -> DeliveryOutcome {
        (**self).export(metrics)
    }
}

#[derive(Debug)]
pub struct HttpExporter {
    client: ureq::Agent,
    url: String,
}
impl HttpExporter {
    pub fn new(endpoint: &CollectorEndpoint, timeout: Duration) -> Self {
        Self::with_url(endpoint.url(), timeout)
    }
    pub fn with_url(url: String, timeout: Duration) -> Self {
        let client = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { client, url }
    }
    pub fn url(&self) -> &str {
        &self.url
    }
}
impl Exporter for HttpExporter {
    /// Blocking I/O
    fn export(&mut self, metrics: &TimelineMetrics) -> DeliveryOutcome {
        let body = match encode_metrics(metrics).context("encode timeline metrics") {
            Ok(body) => body,
            Err(e) => return DeliveryOutcome::UnexpectedFailure(e),
        };
        let resp = self
            .client
            .post(&self.url)
            .set("Content-Type", "application/json")
            .send_string(&body);
        match resp {
            Ok(_) => DeliveryOutcome::Delivered,
            Err(ureq::Error::Transport(e))
                if matches!(
                    e.kind(),
                    ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::Dns
                ) =>
            {
                DeliveryOutcome::TransientFailure {
                    url: self.url.clone(),
                    reason: e.to_string(),
                }
            }
            Err(ureq::Error::Status(code, _)) => DeliveryOutcome::UnexpectedFailure(anyhow!(
                "collector {} answered with status {code}",
                self.url
            )),
            Err(e) => DeliveryOutcome::UnexpectedFailure(
                anyhow::Error::new(e).context(format!("POST {}", self.url)),
            ),
        }
    }
}

/// Keeps every batch in memory instead of sending it.
#[derive(Debug, Default)]
pub struct InMemExporter {
    batches: Vec<TimelineMetrics>,
}
impl InMemExporter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn batches(&self) -> &[TimelineMetrics] {
        &self.batches
    }
    pub fn take_batches(&mut self) -> Vec<TimelineMetrics> {
        std::mem::take(&mut self.batches)
    }
}
impl Exporter for InMemExporter {
    fn export(&mut self, metrics: &TimelineMetrics) -> DeliveryOutcome {
        self.batches.push(metrics.clone());
        DeliveryOutcome::Delivered
    }
}
