pub mod cache;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod exporter;
pub mod sink;

pub type MetricKey = String;
/// Milliseconds.
pub type Time = i64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: Time,
    pub value: f64,
}
