use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
};

use log::trace;

use crate::{codec::ValueKind, MetricKey, Sample, Time};

pub const MAX_RECS_PER_NAME_DEFAULT: usize = 10000;
pub const MAX_EVICTION_TIME_MILLIS: Time = 59000;

/// Per-name buffer of samples that have not been handed out yet.
///
/// Each series sits behind its own lock, so producers reporting different
/// names never contend with each other; the outer map lock is only held to
/// look up or create an entry.
#[derive(Debug)]
pub struct MetricCache {
    series: RwLock<HashMap<MetricKey, Arc<Mutex<MetricSeries>>>>,
    clock: AtomicI64,
    max_samples_per_name: usize,
    eviction_interval: Time,
}
impl MetricCache {
    pub fn new(max_samples_per_name: usize, eviction_interval_millis: Time) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            clock: AtomicI64::new(Time::MIN),
            max_samples_per_name: max_samples_per_name.max(1),
            eviction_interval: eviction_interval_millis,
        }
    }

    /// Latest timestamp seen by any insert.
    pub fn clock(&self) -> Option<Time> {
        let now = self.clock.load(Ordering::Acquire);
        (now != Time::MIN).then_some(now)
    }

    pub fn put_sample(&self, name: &str, app_id: &str, kind: ValueKind, sample: Sample) {
        let now = self
            .clock
            .fetch_max(sample.time, Ordering::AcqRel)
            .max(sample.time);
        // A new series counts its interval from the cache clock, not from a
        // lagging task's own timestamp.
        let series = self.ensure(name, now);
        let mut series = lock(&series);
        series.push(sample, app_id, kind, self.max_samples_per_name);
    }

    /// Takes the buffered samples of `name` if the series is due.
    pub fn take_ready_series(&self, name: &str) -> Option<MetricSeries> {
        let series = read(&self.series).get(name).cloned()?;
        let now = self.clock()?;
        let mut series = lock(&series);
        if !series.is_ready(now, self.eviction_interval, self.max_samples_per_name) {
            return None;
        }
        trace!(
            "flushing {} samples of {} at {}",
            series.len(),
            series.name(),
            now
        );
        Some(series.take(now))
    }

    /// Number of samples currently buffered for `name`.
    pub fn buffered(&self, name: &str) -> usize {
        match read(&self.series).get(name) {
            Some(series) => lock(series).len(),
            None => 0,
        }
    }
    pub fn contains(&self, name: &str) -> bool {
        read(&self.series).contains_key(name)
    }
    pub fn len(&self) -> usize {
        read(&self.series).len()
    }
    pub fn is_empty(&self) -> bool {
        read(&self.series).is_empty()
    }

    /// Drops every series. Buffered samples are lost.
    pub fn clear(&self) {
        write(&self.series).clear();
    }

    fn ensure(&self, name: &str, time: Time) -> Arc<Mutex<MetricSeries>> {
        if let Some(series) = read(&self.series).get(name) {
            return series.clone();
        }
        write(&self.series)
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(MetricSeries::new(name.to_owned(), time))))
            .clone()
    }
}
impl Default for MetricCache {
    fn default() -> Self {
        Self::new(MAX_RECS_PER_NAME_DEFAULT, MAX_EVICTION_TIME_MILLIS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    name: MetricKey,
    app_id: String,
    kind: ValueKind,
    values: BTreeMap<Time, f64>,
    last_flush_time: Time,
}
impl MetricSeries {
    fn new(name: MetricKey, created: Time) -> Self {
        Self {
            name,
            app_id: String::new(),
            kind: ValueKind::default(),
            values: BTreeMap::new(),
            last_flush_time: created,
        }
    }

    fn push(&mut self, sample: Sample, app_id: &str, kind: ValueKind, capacity: usize) {
        if self.values.is_empty() {
            app_id.clone_into(&mut self.app_id);
            self.kind = kind;
        }
        if !self.values.contains_key(&sample.time) && self.values.len() >= capacity {
            self.values.pop_first();
        }
        self.values.insert(sample.time, sample.value);
    }

    fn is_ready(&self, now: Time, eviction_interval: Time, capacity: usize) -> bool {
        if self.values.is_empty() {
            return false;
        }
        self.values.len() >= capacity
            || now.saturating_sub(self.last_flush_time) > eviction_interval
    }

    fn take(&mut self, now: Time) -> Self {
        self.last_flush_time = now;
        Self {
            name: self.name.clone(),
            app_id: self.app_id.clone(),
            kind: self.kind,
            values: std::mem::take(&mut self.values),
            last_flush_time: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn app_id(&self) -> &str {
        &self.app_id
    }
    pub fn kind(&self) -> ValueKind {
        self.kind
    }
    pub fn values(&self) -> &BTreeMap<Time, f64> {
        &self.values
    }
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.values
            .iter()
            .map(|(&time, &value)| Sample { time, value })
    }
    /// Timestamp of the oldest buffered sample.
    pub fn start_time(&self) -> Option<Time> {
        self.values.keys().next().copied()
    }
    pub fn last_flush_time(&self) -> Time {
        self.last_flush_time
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn into_parts(self) -> (MetricKey, String, ValueKind, BTreeMap<Time, f64>) {
        (self.name, self.app_id, self.kind, self.values)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}
fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
