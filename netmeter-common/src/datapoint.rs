use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single data point emitted by a collection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Fully qualified metric name (e.g., "net.client.10.0.0.1:443.bytesSent").
    pub name: String,

    /// Unix epoch milliseconds of the collection pass that produced this point.
    pub timestamp: i64,

    /// The measured value.
    pub value: MetricValue,

    /// Tags attached to the point, in stable label order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl DataPoint {
    /// Create a counter data point.
    pub fn counter(name: impl Into<String>, timestamp: i64, value: u64) -> Self {
        Self {
            name: name.into(),
            timestamp,
            value: MetricValue::Counter(value),
            tags: Vec::new(),
        }
    }

    /// Create a gauge data point.
    pub fn gauge(name: impl Into<String>, timestamp: i64, value: i64) -> Self {
        Self {
            name: name.into(),
            timestamp,
            value: MetricValue::Gauge(value),
            tags: Vec::new(),
        }
    }

    /// Attach tags to this data point.
    pub fn with_tags(mut self, tags: Vec<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// The kind of this point, fixed by the field it was built from.
    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// Typed metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricValue {
    /// Counter (monotonically increasing).
    Counter(u64),

    /// Gauge (can go up or down).
    Gauge(i64),

    /// Fractional gauge, derived from other fields at emission time.
    Ratio(f64),
}

impl MetricValue {
    /// Get the kind of this value.
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) | MetricValue::Ratio(_) => MetricKind::Gauge,
        }
    }

    /// Numeric value as a float, for backends that only carry doubles.
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Counter(v) => *v as f64,
            MetricValue::Gauge(v) => *v as f64,
            MetricValue::Ratio(v) => *v,
        }
    }
}

/// The two kinds of metric the aggregation core produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A label name/value pair attached to a data point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_point_creation() {
        let point = DataPoint::counter("net.client.10.0.0.1:443.bytesSent", 1000, 150)
            .with_tags(vec![Tag::new("remote", "10.0.0.1:443")]);

        assert_eq!(point.name, "net.client.10.0.0.1:443.bytesSent");
        assert_eq!(point.timestamp, 1000);
        assert_eq!(point.value, MetricValue::Counter(150));
        assert_eq!(point.kind(), MetricKind::Counter);
        assert_eq!(point.tags[0].to_string(), "remote=10.0.0.1:443");
    }

    #[test]
    fn test_gauge_may_be_negative() {
        let point = DataPoint::gauge("pool.worker.test.inUse", 0, -2);
        assert_eq!(point.kind(), MetricKind::Gauge);
        assert_eq!(point.value.as_f64(), -2.0);
    }

    #[test]
    fn test_ratio_is_a_gauge() {
        let value = MetricValue::Ratio(0.25);
        assert_eq!(value.kind(), MetricKind::Gauge);
        assert_eq!(value.as_f64(), 0.25);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
    }

    #[test]
    fn test_timestamp_is_positive() {
        assert!(current_timestamp_millis() > 0);
    }
}
