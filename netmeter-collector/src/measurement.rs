//! Immutable snapshots of producer state and the rules for merging them.

use std::fmt;

use netmeter_common::{Error, MetricValue, Result};

use crate::key::{MetricKey, PoolKey, SocketAddress};

/// A point-in-time copy of one producer's counters for one key.
///
/// `absorb` must be associative and commutative so that any reduction order
/// over same-key snapshots yields the same result.
pub trait Measurement: Clone + fmt::Debug + Send + Sync + 'static {
    type Key: MetricKey;

    /// Domain segment of emitted metric names (e.g., "net.client").
    const DOMAIN: &'static str;

    fn key(&self) -> &Self::Key;

    /// Fold another snapshot of the same key into this one.
    ///
    /// Callers must have checked key equality; see [`merge`] for the checked form.
    fn absorb(&mut self, other: &Self);

    /// Field names and values, in emission order.
    fn values(&self) -> Vec<(&'static str, MetricValue)>;
}

/// Merge two snapshots of the same key.
///
/// Merging snapshots of different keys is a programming error and is
/// reported as [`Error::KeyMismatch`].
pub fn merge<M: Measurement>(a: &M, b: &M) -> Result<M> {
    if a.key() != b.key() {
        return Err(Error::KeyMismatch {
            left: a.key().key_id(),
            right: b.key().key_id(),
        });
    }

    let mut merged = a.clone();
    merged.absorb(b);
    Ok(merged)
}

// Counters saturate at u64::MAX; gauges wrap.
fn add_counter(a: u64, b: u64) -> u64 {
    a.saturating_add(b)
}

fn add_gauge(a: i64, b: i64) -> i64 {
    a.wrapping_add(b)
}

/// Snapshot of a network client connection's measurements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub key: SocketAddress,
    /// Open connections (gauge).
    pub connections: i64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub error_count: u64,
}

impl ConnectionSnapshot {
    pub fn new(key: SocketAddress) -> Self {
        Self {
            key,
            connections: 0,
            bytes_received: 0,
            bytes_sent: 0,
            error_count: 0,
        }
    }
}

impl Measurement for ConnectionSnapshot {
    type Key = SocketAddress;

    const DOMAIN: &'static str = "net.client";

    fn key(&self) -> &SocketAddress {
        &self.key
    }

    fn absorb(&mut self, other: &Self) {
        self.connections = add_gauge(self.connections, other.connections);
        self.bytes_received = add_counter(self.bytes_received, other.bytes_received);
        self.bytes_sent = add_counter(self.bytes_sent, other.bytes_sent);
        self.error_count = add_counter(self.error_count, other.error_count);
    }

    fn values(&self) -> Vec<(&'static str, MetricValue)> {
        vec![
            ("connections", MetricValue::Gauge(self.connections)),
            ("bytesReceived", MetricValue::Counter(self.bytes_received)),
            ("bytesSent", MetricValue::Counter(self.bytes_sent)),
            ("errorCount", MetricValue::Counter(self.error_count)),
        ]
    }
}

/// Snapshot of a worker pool's measurements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub key: PoolKey,
    /// Tasks waiting in the queue (gauge).
    pub queue_pending: i64,
    /// Tasks currently running (gauge).
    pub in_use: i64,
    /// Configured pool capacity (gauge). Emitted only through `ratio`.
    pub max_size: i64,
    pub queued: u64,
    pub completed: u64,
    /// Total time spent queued, in milliseconds.
    pub queue_delay_ms: u64,
    /// Total time spent running, in milliseconds.
    pub usage_ms: u64,
}

impl PoolSnapshot {
    pub fn new(key: PoolKey) -> Self {
        Self {
            key,
            queue_pending: 0,
            in_use: 0,
            max_size: 0,
            queued: 0,
            completed: 0,
            queue_delay_ms: 0,
            usage_ms: 0,
        }
    }

    /// Share of the pool's capacity in use; 0 when the capacity is unknown.
    pub fn ratio(&self) -> f64 {
        if self.max_size > 0 {
            self.in_use as f64 / self.max_size as f64
        } else {
            0.0
        }
    }
}

impl Measurement for PoolSnapshot {
    type Key = PoolKey;

    const DOMAIN: &'static str = "pool";

    fn key(&self) -> &PoolKey {
        &self.key
    }

    fn absorb(&mut self, other: &Self) {
        self.queue_pending = add_gauge(self.queue_pending, other.queue_pending);
        self.in_use = add_gauge(self.in_use, other.in_use);
        self.max_size = add_gauge(self.max_size, other.max_size);
        self.queued = add_counter(self.queued, other.queued);
        self.completed = add_counter(self.completed, other.completed);
        self.queue_delay_ms = add_counter(self.queue_delay_ms, other.queue_delay_ms);
        self.usage_ms = add_counter(self.usage_ms, other.usage_ms);
    }

    fn values(&self) -> Vec<(&'static str, MetricValue)> {
        vec![
            ("queuePending", MetricValue::Gauge(self.queue_pending)),
            ("inUse", MetricValue::Gauge(self.in_use)),
            ("ratio", MetricValue::Ratio(self.ratio())),
            ("queued", MetricValue::Counter(self.queued)),
            ("completed", MetricValue::Counter(self.completed)),
            ("queueDelayMs", MetricValue::Counter(self.queue_delay_ms)),
            ("usageMs", MetricValue::Counter(self.usage_ms)),
        ]
    }
}

/// Snapshot of a datagram socket's traffic, keyed by its local address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramSnapshot {
    pub key: SocketAddress,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub packets_read: u64,
    pub packets_written: u64,
}

impl DatagramSnapshot {
    pub fn new(key: SocketAddress) -> Self {
        Self {
            key,
            bytes_read: 0,
            bytes_written: 0,
            packets_read: 0,
            packets_written: 0,
        }
    }
}

impl Measurement for DatagramSnapshot {
    type Key = SocketAddress;

    const DOMAIN: &'static str = "datagram";

    fn key(&self) -> &SocketAddress {
        &self.key
    }

    fn absorb(&mut self, other: &Self) {
        self.bytes_read = add_counter(self.bytes_read, other.bytes_read);
        self.bytes_written = add_counter(self.bytes_written, other.bytes_written);
        self.packets_read = add_counter(self.packets_read, other.packets_read);
        self.packets_written = add_counter(self.packets_written, other.packets_written);
    }

    fn values(&self) -> Vec<(&'static str, MetricValue)> {
        vec![
            ("bytesRead", MetricValue::Counter(self.bytes_read)),
            ("bytesWritten", MetricValue::Counter(self.bytes_written)),
            ("packetsRead", MetricValue::Counter(self.packets_read)),
            ("packetsWritten", MetricValue::Counter(self.packets_written)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(host: &str, port: u16) -> SocketAddress {
        SocketAddress::new(host, port).unwrap()
    }

    fn conn(key: &SocketAddress, connections: i64, received: u64, sent: u64, errors: u64) -> ConnectionSnapshot {
        ConnectionSnapshot {
            key: key.clone(),
            connections,
            bytes_received: received,
            bytes_sent: sent,
            error_count: errors,
        }
    }

    #[test]
    fn test_merge_sums_every_field() {
        let key = addr("10.0.0.1", 443);
        let merged = merge(&conn(&key, 1, 10, 100, 0), &conn(&key, 2, 5, 50, 1)).unwrap();

        assert_eq!(merged, conn(&key, 3, 15, 150, 1));
    }

    #[test]
    fn test_merge_rejects_different_keys() {
        let a = ConnectionSnapshot::new(addr("10.0.0.1", 443));
        let b = ConnectionSnapshot::new(addr("10.0.0.2", 443));

        match merge(&a, &b) {
            Err(Error::KeyMismatch { left, right }) => {
                assert_eq!(left, "10.0.0.1:443");
                assert_eq!(right, "10.0.0.2:443");
            }
            other => panic!("expected key mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_counters_saturate() {
        let key = addr("h", 1);
        let merged = merge(&conn(&key, 0, u64::MAX, 0, 0), &conn(&key, 0, 1, 0, 0)).unwrap();
        assert_eq!(merged.bytes_received, u64::MAX);
    }

    #[test]
    fn test_connection_field_order_and_kinds() {
        let snapshot = conn(&addr("h", 1), 2, 3, 4, 5);
        let names: Vec<_> = snapshot.values().iter().map(|(n, _)| *n).collect();

        assert_eq!(names, vec!["connections", "bytesReceived", "bytesSent", "errorCount"]);
        assert_eq!(snapshot.values()[0].1, MetricValue::Gauge(2));
        assert_eq!(snapshot.values()[2].1, MetricValue::Counter(4));
    }

    #[test]
    fn test_pool_merge() {
        let key = PoolKey::new("worker", "w").unwrap();
        let mut a = PoolSnapshot::new(key.clone());
        a.in_use = 2;
        a.completed = 10;
        let mut b = PoolSnapshot::new(key);
        b.in_use = 1;
        b.completed = 5;
        b.usage_ms = 30;

        let merged = merge(&a, &b).unwrap();
        assert_eq!(merged.in_use, 3);
        assert_eq!(merged.completed, 15);
        assert_eq!(merged.usage_ms, 30);
    }

    #[test]
    fn test_pool_ratio_follows_merged_capacity() {
        let key = PoolKey::new("worker", "w").unwrap();
        let mut a = PoolSnapshot::new(key.clone());
        a.in_use = 3;
        a.max_size = 4;
        let mut b = PoolSnapshot::new(key);
        b.in_use = 1;
        b.max_size = 4;

        assert_eq!(a.ratio(), 0.75);
        let merged = merge(&a, &b).unwrap();
        assert_eq!(merged.ratio(), 0.5);

        let values = merged.values();
        let names: Vec<_> = values.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["queuePending", "inUse", "ratio", "queued", "completed", "queueDelayMs", "usageMs"]
        );
        assert_eq!(values[2].1, MetricValue::Ratio(0.5));
    }

    #[test]
    fn test_pool_ratio_without_capacity_is_zero() {
        let mut snapshot = PoolSnapshot::new(PoolKey::new("worker", "w").unwrap());
        snapshot.in_use = 2;
        assert_eq!(snapshot.ratio(), 0.0);
    }

    #[test]
    fn test_datagram_merge() {
        let key = addr("127.0.0.1", 9192);
        let mut a = DatagramSnapshot::new(key.clone());
        a.bytes_read = 45;
        a.packets_read = 5;
        let mut b = DatagramSnapshot::new(key);
        b.bytes_written = 9;
        b.packets_written = 1;

        let merged = merge(&a, &b).unwrap();
        assert_eq!(merged.bytes_read, 45);
        assert_eq!(merged.packets_read, 5);
        assert_eq!(merged.bytes_written, 9);
        assert_eq!(merged.packets_written, 1);
        assert_eq!(DatagramSnapshot::DOMAIN, "datagram");
    }

    fn arb_snapshot(key: SocketAddress) -> impl Strategy<Value = ConnectionSnapshot> {
        (any::<i64>(), any::<u64>(), any::<u64>(), 0u64..1_000_000).prop_map(
            move |(connections, received, sent, errors)| {
                conn(&key, connections, received, sent, errors)
            },
        )
    }

    proptest! {
        #[test]
        fn prop_merge_is_commutative(
            a in arb_snapshot(addr("10.0.0.1", 443)),
            b in arb_snapshot(addr("10.0.0.1", 443)),
        ) {
            prop_assert_eq!(merge(&a, &b).unwrap(), merge(&b, &a).unwrap());
        }

        #[test]
        fn prop_merge_is_associative(
            a in arb_snapshot(addr("10.0.0.1", 443)),
            b in arb_snapshot(addr("10.0.0.1", 443)),
            c in arb_snapshot(addr("10.0.0.1", 443)),
        ) {
            let left = merge(&merge(&a, &b).unwrap(), &c).unwrap();
            let right = merge(&a, &merge(&b, &c).unwrap()).unwrap();
            prop_assert_eq!(left, right);
        }
    }
}
