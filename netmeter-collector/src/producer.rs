//! Live measurement producers.
//!
//! A producer is owned by one instrumented object (a connection, a pool) and
//! is updated from hot paths without locks. Every field is an independent
//! atomic: reading a single field never tears, but a snapshot taken while
//! increments are in flight may mix fields from slightly different instants.
//! Aggregation only sums fields across producers, so that skew is harmless.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use netmeter_common::Result;

use crate::key::{PoolKey, SocketAddress};
use crate::labels::{Label, LabelValues, address_label, side};
use crate::measurement::{ConnectionSnapshot, DatagramSnapshot, Measurement, PoolSnapshot};

/// A source of snapshots that can be registered with a supplier.
pub trait MeasurementProducer: Send + Sync {
    type Snapshot: Measurement;

    /// Aggregation key this producer reports under.
    fn key(&self) -> &<Self::Snapshot as Measurement>::Key;

    /// Label values for this producer's data points.
    fn labels(&self) -> LabelValues {
        LabelValues::default()
    }

    /// Take a point-in-time copy of the producer's counters.
    ///
    /// Must not mutate the producer. A failure skips the producer for the
    /// current collection pass only.
    fn snapshot(&self) -> Result<Self::Snapshot>;
}

/// Add to a counter without wrapping past `u64::MAX`.
fn add_counter(counter: &AtomicU64, delta: u64) {
    if delta == 0 {
        return;
    }
    // fetch_update only fails when the closure returns None, which it never does.
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_add(delta))
    });
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Counters tracked per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionCounter {
    BytesReceived,
    BytesSent,
    ErrorCount,
}

/// Gauges tracked per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionGauge {
    Connections,
}

/// Measurements for a network client connection to one remote address.
#[derive(Debug)]
pub struct ConnectionMeasurements {
    remote: SocketAddress,
    local: Option<SocketAddress>,
    name_override: Option<String>,
    local_side: Option<bool>,
    connections: AtomicI64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    error_count: AtomicU64,
}

impl ConnectionMeasurements {
    pub fn new(remote: SocketAddress) -> Self {
        Self {
            remote,
            local: None,
            name_override: None,
            local_side: None,
            connections: AtomicI64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// Record the local address of the connection.
    pub fn with_local(mut self, local: SocketAddress) -> Self {
        self.local = Some(local);
        self
    }

    /// Replace the remote host in label values (e.g., with a server name).
    pub fn with_name_override(mut self, name: impl Into<String>) -> Self {
        self.name_override = Some(name.into());
        self
    }

    /// Tag points with the side of the connection this producer observes.
    pub fn with_side(mut self, local: bool) -> Self {
        self.local_side = Some(local);
        self
    }

    pub fn remote(&self) -> &SocketAddress {
        &self.remote
    }

    #[inline]
    pub fn increment(&self, counter: ConnectionCounter, delta: u64) {
        add_counter(self.counter_cell(counter), delta);
    }

    #[inline]
    pub fn set_gauge(&self, gauge: ConnectionGauge, value: i64) {
        self.gauge_cell(gauge).store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn adjust_gauge(&self, gauge: ConnectionGauge, delta: i64) {
        self.gauge_cell(gauge).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter(&self, counter: ConnectionCounter) -> u64 {
        self.counter_cell(counter).load(Ordering::Relaxed)
    }

    pub fn gauge(&self, gauge: ConnectionGauge) -> i64 {
        self.gauge_cell(gauge).load(Ordering::Relaxed)
    }

    /// Record a connection being opened.
    #[inline]
    pub fn connected(&self) {
        self.adjust_gauge(ConnectionGauge::Connections, 1);
    }

    /// Record a connection being closed.
    #[inline]
    pub fn disconnected(&self) {
        self.adjust_gauge(ConnectionGauge::Connections, -1);
    }

    #[inline]
    pub fn bytes_read(&self, bytes: u64) {
        self.increment(ConnectionCounter::BytesReceived, bytes);
    }

    #[inline]
    pub fn bytes_written(&self, bytes: u64) {
        self.increment(ConnectionCounter::BytesSent, bytes);
    }

    #[inline]
    pub fn exception_occurred(&self) {
        self.increment(ConnectionCounter::ErrorCount, 1);
    }

    fn counter_cell(&self, counter: ConnectionCounter) -> &AtomicU64 {
        match counter {
            ConnectionCounter::BytesReceived => &self.bytes_received,
            ConnectionCounter::BytesSent => &self.bytes_sent,
            ConnectionCounter::ErrorCount => &self.error_count,
        }
    }

    fn gauge_cell(&self, gauge: ConnectionGauge) -> &AtomicI64 {
        match gauge {
            ConnectionGauge::Connections => &self.connections,
        }
    }
}

impl MeasurementProducer for ConnectionMeasurements {
    type Snapshot = ConnectionSnapshot;

    fn key(&self) -> &SocketAddress {
        &self.remote
    }

    fn labels(&self) -> LabelValues {
        LabelValues::new()
            .with(
                Label::Local,
                self.local.as_ref().map(|local| address_label(Some(local), None)),
            )
            .with(
                Label::Remote,
                Some(address_label(
                    Some(&self.remote),
                    self.name_override.as_deref(),
                )),
            )
            .with(Label::Side, self.local_side.map(side))
    }

    fn snapshot(&self) -> Result<ConnectionSnapshot> {
        Ok(ConnectionSnapshot {
            key: self.remote.clone(),
            connections: self.connections.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        })
    }
}

/// Counters tracked per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolCounter {
    Queued,
    Completed,
    QueueDelayMs,
    UsageMs,
}

/// Gauges tracked per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolGauge {
    QueuePending,
    InUse,
    MaxSize,
}

/// Measurements for a worker pool.
#[derive(Debug)]
pub struct PoolMeasurements {
    key: PoolKey,
    queue_pending: AtomicI64,
    in_use: AtomicI64,
    max_size: AtomicI64,
    queued: AtomicU64,
    completed: AtomicU64,
    queue_delay_ms: AtomicU64,
    usage_ms: AtomicU64,
}

impl PoolMeasurements {
    pub fn new(key: PoolKey) -> Self {
        Self {
            key,
            queue_pending: AtomicI64::new(0),
            in_use: AtomicI64::new(0),
            max_size: AtomicI64::new(0),
            queued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            queue_delay_ms: AtomicU64::new(0),
            usage_ms: AtomicU64::new(0),
        }
    }

    /// Set the pool capacity used to compute the in-use ratio.
    pub fn with_max_size(self, max_size: i64) -> Self {
        self.set_gauge(PoolGauge::MaxSize, max_size);
        self
    }

    #[inline]
    pub fn increment(&self, counter: PoolCounter, delta: u64) {
        add_counter(self.counter_cell(counter), delta);
    }

    #[inline]
    pub fn set_gauge(&self, gauge: PoolGauge, value: i64) {
        self.gauge_cell(gauge).store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn adjust_gauge(&self, gauge: PoolGauge, delta: i64) {
        self.gauge_cell(gauge).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter(&self, counter: PoolCounter) -> u64 {
        self.counter_cell(counter).load(Ordering::Relaxed)
    }

    pub fn gauge(&self, gauge: PoolGauge) -> i64 {
        self.gauge_cell(gauge).load(Ordering::Relaxed)
    }

    /// A task was submitted and is waiting in the queue.
    pub fn submitted(&self) {
        self.adjust_gauge(PoolGauge::QueuePending, 1);
        self.increment(PoolCounter::Queued, 1);
    }

    /// A queued task was dropped before it started.
    pub fn rejected(&self) {
        self.adjust_gauge(PoolGauge::QueuePending, -1);
    }

    /// A queued task started running after waiting `queue_delay`.
    pub fn begin(&self, queue_delay: Duration) {
        self.adjust_gauge(PoolGauge::QueuePending, -1);
        self.adjust_gauge(PoolGauge::InUse, 1);
        self.increment(PoolCounter::QueueDelayMs, duration_ms(queue_delay));
    }

    /// A running task finished after `usage`.
    pub fn end(&self, usage: Duration) {
        self.adjust_gauge(PoolGauge::InUse, -1);
        self.increment(PoolCounter::Completed, 1);
        self.increment(PoolCounter::UsageMs, duration_ms(usage));
    }

    fn counter_cell(&self, counter: PoolCounter) -> &AtomicU64 {
        match counter {
            PoolCounter::Queued => &self.queued,
            PoolCounter::Completed => &self.completed,
            PoolCounter::QueueDelayMs => &self.queue_delay_ms,
            PoolCounter::UsageMs => &self.usage_ms,
        }
    }

    fn gauge_cell(&self, gauge: PoolGauge) -> &AtomicI64 {
        match gauge {
            PoolGauge::QueuePending => &self.queue_pending,
            PoolGauge::InUse => &self.in_use,
            PoolGauge::MaxSize => &self.max_size,
        }
    }
}

impl MeasurementProducer for PoolMeasurements {
    type Snapshot = PoolSnapshot;

    fn key(&self) -> &PoolKey {
        &self.key
    }

    fn labels(&self) -> LabelValues {
        LabelValues::new()
            .with(Label::PoolType, Some(self.key.pool_type()))
            .with(Label::PoolName, Some(self.key.name()))
    }

    fn snapshot(&self) -> Result<PoolSnapshot> {
        Ok(PoolSnapshot {
            key: self.key.clone(),
            queue_pending: self.queue_pending.load(Ordering::Relaxed),
            in_use: self.in_use.load(Ordering::Relaxed),
            max_size: self.max_size.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            queue_delay_ms: self.queue_delay_ms.load(Ordering::Relaxed),
            usage_ms: self.usage_ms.load(Ordering::Relaxed),
        })
    }
}

/// Counters tracked per datagram socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramCounter {
    BytesRead,
    BytesWritten,
    PacketsRead,
    PacketsWritten,
}

/// Measurements for a datagram socket bound to one local address.
#[derive(Debug)]
pub struct DatagramMeasurements {
    local: SocketAddress,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    packets_read: AtomicU64,
    packets_written: AtomicU64,
}

impl DatagramMeasurements {
    pub fn new(local: SocketAddress) -> Self {
        Self {
            local,
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            packets_read: AtomicU64::new(0),
            packets_written: AtomicU64::new(0),
        }
    }

    pub fn local(&self) -> &SocketAddress {
        &self.local
    }

    #[inline]
    pub fn increment(&self, counter: DatagramCounter, delta: u64) {
        add_counter(self.counter_cell(counter), delta);
    }

    pub fn counter(&self, counter: DatagramCounter) -> u64 {
        self.counter_cell(counter).load(Ordering::Relaxed)
    }

    /// Record one received packet of `bytes`.
    #[inline]
    pub fn bytes_read(&self, bytes: u64) {
        self.increment(DatagramCounter::BytesRead, bytes);
        self.increment(DatagramCounter::PacketsRead, 1);
    }

    /// Record one sent packet of `bytes`.
    #[inline]
    pub fn bytes_written(&self, bytes: u64) {
        self.increment(DatagramCounter::BytesWritten, bytes);
        self.increment(DatagramCounter::PacketsWritten, 1);
    }

    fn counter_cell(&self, counter: DatagramCounter) -> &AtomicU64 {
        match counter {
            DatagramCounter::BytesRead => &self.bytes_read,
            DatagramCounter::BytesWritten => &self.bytes_written,
            DatagramCounter::PacketsRead => &self.packets_read,
            DatagramCounter::PacketsWritten => &self.packets_written,
        }
    }
}

impl MeasurementProducer for DatagramMeasurements {
    type Snapshot = DatagramSnapshot;

    fn key(&self) -> &SocketAddress {
        &self.local
    }

    fn labels(&self) -> LabelValues {
        LabelValues::new().with(Label::Local, Some(address_label(Some(&self.local), None)))
    }

    fn snapshot(&self) -> Result<DatagramSnapshot> {
        Ok(DatagramSnapshot {
            key: self.local.clone(),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            packets_read: self.packets_read.load(Ordering::Relaxed),
            packets_written: self.packets_written.load(Ordering::Relaxed),
        })
    }
}
