//! Concurrent connection metrics aggregation.
//!
//! Connections, pools and datagram sockets each own a [`MeasurementProducer`]
//! that is updated from hot paths with atomics. Producers register with a
//! [`MetricsSupplier`], which on demand snapshots every live producer, merges
//! snapshots that share a key and emits one [`DataPoint`] per metric field.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │    Producers     │────>│    Suppliers     │────>│     Reporter     │
//! │ (per connection) │     │ (merge by key)   │     │  (batch → sink)  │
//! └──────────────────┘     └──────────────────┘     └──────────────────┘
//! ```
//!
//! Metric names follow `<prefix>.<domain>.<keyId>.<field>`, for example
//! `net.client.10.0.0.1:443.bytesSent`.
//!
//! # Configuration
//!
//! See [`config::NetmeterConfig`] for configuration options.

pub mod config;
pub mod key;
pub mod labels;
pub mod measurement;
pub mod monitoring;
pub mod producer;
pub mod reporter;
pub mod sink;
pub mod supplier;

pub use config::{MonitoringConfig, NetmeterConfig, ReporterConfig};
pub use key::{MetricKey, PoolKey, SocketAddress};
pub use labels::{Label, LabelValues, address_label, side};
pub use measurement::{ConnectionSnapshot, DatagramSnapshot, Measurement, PoolSnapshot, merge};
pub use monitoring::Monitoring;
pub use producer::{
    ConnectionCounter, ConnectionGauge, ConnectionMeasurements, DatagramCounter,
    DatagramMeasurements, MeasurementProducer, PoolCounter, PoolGauge, PoolMeasurements,
};
pub use reporter::{ReportSummary, Reporter};
pub use sink::{DataPointSink, LogSink, MemorySink, WriterSink};
pub use supplier::{CollectorStats, MetricSupplier, MetricsSupplier, Registration};

pub use netmeter_common::{DataPoint, MetricKind, MetricValue, Tag};
