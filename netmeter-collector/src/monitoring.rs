//! The monitoring context that owns every supplier.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use netmeter_common::DataPoint;

use crate::config::MonitoringConfig;
use crate::producer::{ConnectionMeasurements, DatagramMeasurements, PoolMeasurements};
use crate::supplier::{MetricSupplier, MetricsSupplier};

/// Owns the suppliers for one monitored process.
///
/// Built once by whatever creates the monitoring subsystem and passed to the
/// components that instrument connections and pools. There is no global
/// instance.
pub struct Monitoring {
    config: MonitoringConfig,
    net_client: Arc<MetricsSupplier<ConnectionMeasurements>>,
    pools: Arc<MetricsSupplier<PoolMeasurements>>,
    datagram: Arc<MetricsSupplier<DatagramMeasurements>>,
    extra: RwLock<Vec<Arc<dyn MetricSupplier>>>,
}

impl Monitoring {
    pub fn new(config: MonitoringConfig) -> Self {
        let labels = config.labels.iter().copied();
        Self {
            net_client: Arc::new(MetricsSupplier::new(&config.prefix, labels.clone())),
            pools: Arc::new(MetricsSupplier::new(&config.prefix, labels.clone())),
            datagram: Arc::new(MetricsSupplier::new(&config.prefix, labels)),
            extra: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Supplier for network client connections.
    pub fn net_client(&self) -> &Arc<MetricsSupplier<ConnectionMeasurements>> {
        &self.net_client
    }

    /// Supplier for worker pools.
    pub fn pools(&self) -> &Arc<MetricsSupplier<PoolMeasurements>> {
        &self.pools
    }

    /// Supplier for datagram sockets.
    pub fn datagram(&self) -> &Arc<MetricsSupplier<DatagramMeasurements>> {
        &self.datagram
    }

    /// Add a supplier whose points are appended to every collection.
    pub fn add_supplier(&self, supplier: Arc<dyn MetricSupplier>) {
        debug!(supplier = %supplier.name(), "Added supplier");
        self.extra.write().push(supplier);
    }

    /// Collect from every supplier. Empty when monitoring is disabled.
    pub fn collect(&self) -> Vec<DataPoint> {
        if !self.config.enabled {
            return Vec::new();
        }

        let mut points = self.net_client.collect();
        points.extend(self.pools.collect());
        points.extend(self.datagram.collect());

        let extra = self.extra.read().clone();
        for supplier in extra {
            points.extend(supplier.collect());
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{PoolKey, SocketAddress};
    use crate::labels::Label;
    use netmeter_common::{MetricValue, Tag};
    use std::time::Duration;

    #[test]
    fn test_collects_connections_and_pools() {
        let monitoring = Monitoring::new(MonitoringConfig::default());

        let conn = Arc::new(ConnectionMeasurements::new(
            SocketAddress::new("10.0.0.1", 443).unwrap(),
        ));
        conn.bytes_written(10);
        let pool = Arc::new(PoolMeasurements::new(
            PoolKey::new("worker", "test-worker").unwrap(),
        ));
        pool.submitted();
        pool.begin(Duration::ZERO);
        pool.end(Duration::from_millis(3));

        monitoring.net_client().register(&conn).unwrap();
        monitoring.pools().register(&pool).unwrap();

        let points = monitoring.collect();
        assert_eq!(points.len(), 4 + 7);

        let completed = points
            .iter()
            .find(|p| p.name == "pool.worker.test-worker.completed")
            .unwrap();
        assert_eq!(completed.value, MetricValue::Counter(1));
        assert_eq!(
            completed.tags,
            vec![
                Tag::new("pool_type", "worker"),
                Tag::new("pool_name", "test-worker")
            ]
        );
    }

    #[test]
    fn test_pool_ratio_and_datagram_points() {
        let monitoring = Monitoring::new(MonitoringConfig {
            labels: vec![Label::Local, Label::PoolName],
            ..Default::default()
        });

        let pool = Arc::new(
            PoolMeasurements::new(PoolKey::new("worker", "test-worker").unwrap())
                .with_max_size(8),
        );
        for _ in 0..2 {
            pool.submitted();
            pool.begin(Duration::ZERO);
        }
        let socket = Arc::new(DatagramMeasurements::new(
            SocketAddress::new("localhost", 9192).unwrap(),
        ));
        for _ in 0..5 {
            socket.bytes_read(9);
        }

        monitoring.pools().register(&pool).unwrap();
        monitoring.datagram().register(&socket).unwrap();

        let points = monitoring.collect();
        assert_eq!(points.len(), 7 + 4);

        let ratio = points
            .iter()
            .find(|p| p.name == "pool.worker.test-worker.ratio")
            .unwrap();
        assert_eq!(ratio.value, MetricValue::Ratio(0.25));
        assert_eq!(ratio.tags, vec![Tag::new("pool_name", "test-worker")]);

        let read = points
            .iter()
            .find(|p| p.name == "datagram.localhost:9192.bytesRead")
            .unwrap();
        assert_eq!(read.value, MetricValue::Counter(45));
        assert_eq!(read.tags, vec![Tag::new("local", "localhost:9192")]);
    }

    #[test]
    fn test_disabled_collects_nothing() {
        let monitoring = Monitoring::new(MonitoringConfig {
            enabled: false,
            ..Default::default()
        });
        let conn = Arc::new(ConnectionMeasurements::new(
            SocketAddress::new("10.0.0.1", 443).unwrap(),
        ));
        monitoring.net_client().register(&conn).unwrap();

        assert!(!monitoring.is_enabled());
        assert!(monitoring.collect().is_empty());
    }

    #[test]
    fn test_prefix_and_label_subset_flow_through() {
        let monitoring = Monitoring::new(MonitoringConfig {
            enabled: true,
            prefix: "svc".to_string(),
            labels: vec![Label::Side],
        });
        let conn = Arc::new(
            ConnectionMeasurements::new(SocketAddress::new("10.0.0.1", 443).unwrap())
                .with_side(true),
        );
        monitoring.net_client().register(&conn).unwrap();

        let points = monitoring.collect();
        assert_eq!(points[0].name, "svc.net.client.10.0.0.1:443.connections");
        assert_eq!(points[0].tags, vec![Tag::new("side", "local")]);
    }

    #[test]
    fn test_extra_supplier_is_appended() {
        let monitoring = Monitoring::new(MonitoringConfig::default());
        let other: Arc<MetricsSupplier<ConnectionMeasurements>> =
            Arc::new(MetricsSupplier::new("other", Vec::<Label>::new()));
        let conn = Arc::new(ConnectionMeasurements::new(
            SocketAddress::new("10.0.0.2", 80).unwrap(),
        ));
        other.register(&conn).unwrap();

        monitoring.add_supplier(other);

        let points = monitoring.collect();
        assert_eq!(points.len(), 4);
        assert!(points[0].name.starts_with("other.net.client.10.0.0.2:80"));
    }
}
