//! Producer registry and collection passes.
//!
//! ```text
//! register/unregister ──> RwLock<Arc<Vec<Weak<P>>>> ──clone Arc──> collect()
//!                          (copy on write)                 │
//!                                                          ├─ snapshot() per producer
//!                                                          ├─ group + absorb by key
//!                                                          └─ one DataPoint per field
//! ```
//!
//! The lock guards only the pointer to the current membership vector.
//! Mutations build a new vector and swap it in; a collection pass clones the
//! `Arc` and iterates its own view without holding any lock, so concurrent
//! register/unregister never disturb an in-flight pass.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use netmeter_common::{DataPoint, Result, Tag, current_timestamp_millis};

use crate::key::MetricKey;
use crate::labels::Label;
use crate::measurement::Measurement;
use crate::producer::MeasurementProducer;

/// Anything that can produce a list of data points on demand.
pub trait MetricSupplier: Send + Sync {
    /// Base name prefixed to every emitted metric.
    fn name(&self) -> &str;

    /// Run one collection pass.
    fn collect(&self) -> Vec<DataPoint>;
}

/// Supplier statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Collection passes run.
    pub passes: u64,
    /// Snapshots successfully read.
    pub producers_read: u64,
    /// Producers whose snapshot failed.
    pub producers_skipped: u64,
    /// Producers dropped by their owner without being unregistered.
    pub producers_dropped: u64,
    /// Data points emitted.
    pub points_emitted: u64,
}

#[derive(Debug, Default)]
struct StatsCells {
    passes: AtomicU64,
    producers_read: AtomicU64,
    producers_skipped: AtomicU64,
    producers_dropped: AtomicU64,
    points_emitted: AtomicU64,
}

/// Build the base metric name from a prefix and a domain.
pub fn base_name(prefix: &str, domain: &str) -> String {
    if prefix.is_empty() {
        domain.to_string()
    } else {
        format!("{}.{}", prefix, domain)
    }
}

fn same_producer<P: ?Sized>(member: &Weak<P>, producer: &Arc<P>) -> bool {
    std::ptr::addr_eq(member.as_ptr(), Arc::as_ptr(producer))
}

/// Registry of live producers that merges their snapshots on collection.
///
/// Holds only weak references: producers are owned by the instrumented
/// objects that created them.
pub struct MetricsSupplier<P: MeasurementProducer + ?Sized> {
    base_name: String,
    labels: BTreeSet<Label>,
    producers: RwLock<Arc<Vec<Weak<P>>>>,
    stats: StatsCells,
}

impl<P: MeasurementProducer + ?Sized> MetricsSupplier<P> {
    /// Create a supplier emitting names under `prefix` and tags for `labels`.
    pub fn new(prefix: &str, labels: impl IntoIterator<Item = Label>) -> Self {
        Self {
            base_name: base_name(prefix, <P::Snapshot as Measurement>::DOMAIN),
            labels: labels.into_iter().collect(),
            producers: RwLock::new(Arc::new(Vec::new())),
            stats: StatsCells::default(),
        }
    }

    /// Add a producer to the membership set.
    ///
    /// Returns `Ok(false)` if the producer is already registered. An invalid
    /// key is reported here rather than at collection time.
    pub fn register(&self, producer: &Arc<P>) -> Result<bool> {
        producer.key().validate()?;

        let mut members = self.producers.write();
        if members.iter().any(|m| same_producer(m, producer)) {
            trace!(key = %producer.key().key_id(), "Producer already registered");
            return Ok(false);
        }

        let mut next: Vec<Weak<P>> = Vec::with_capacity(members.len() + 1);
        next.extend(members.iter().filter(|m| m.strong_count() > 0).cloned());
        next.push(Arc::downgrade(producer));
        *members = Arc::new(next);

        debug!(
            supplier = %self.base_name,
            key = %producer.key().key_id(),
            members = members.len(),
            "Registered producer"
        );
        Ok(true)
    }

    /// Register a producer and return a guard that unregisters it on drop.
    pub fn register_guarded(self: &Arc<Self>, producer: Arc<P>) -> Result<Registration<P>> {
        self.register(&producer)?;
        Ok(Registration {
            supplier: Arc::clone(self),
            producer,
        })
    }

    /// Remove a producer from the membership set.
    ///
    /// Returns `false` if it was not a member. Passes that already captured
    /// the membership view keep reading the producer.
    pub fn unregister(&self, producer: &Arc<P>) -> bool {
        let mut members = self.producers.write();
        if !members.iter().any(|m| same_producer(m, producer)) {
            return false;
        }

        let next: Vec<Weak<P>> = members
            .iter()
            .filter(|m| !same_producer(m, producer) && m.strong_count() > 0)
            .cloned()
            .collect();
        *members = Arc::new(next);

        debug!(
            supplier = %self.base_name,
            key = %producer.key().key_id(),
            members = members.len(),
            "Unregistered producer"
        );
        true
    }

    /// Number of registered producers that are still alive.
    pub fn len(&self) -> usize {
        self.members().iter().filter(|m| m.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            passes: self.stats.passes.load(Ordering::Relaxed),
            producers_read: self.stats.producers_read.load(Ordering::Relaxed),
            producers_skipped: self.stats.producers_skipped.load(Ordering::Relaxed),
            producers_dropped: self.stats.producers_dropped.load(Ordering::Relaxed),
            points_emitted: self.stats.points_emitted.load(Ordering::Relaxed),
        }
    }

    /// Run one collection pass: snapshot every member, merge by key and emit
    /// one point per field of each merged snapshot.
    ///
    /// Points are ordered by key id, then by field. All points share one timestamp.
    pub fn collect(&self) -> Vec<DataPoint> {
        let timestamp = current_timestamp_millis();
        let view = self.members();

        let mut buckets: HashMap<<P::Snapshot as Measurement>::Key, (P::Snapshot, Vec<Tag>)> =
            HashMap::with_capacity(view.len());
        let mut read = 0u64;
        let mut skipped = 0u64;
        let mut dropped = 0u64;

        for member in view.iter() {
            let Some(producer) = member.upgrade() else {
                dropped += 1;
                continue;
            };

            let snapshot = match producer.snapshot() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    skipped += 1;
                    warn!(
                        supplier = %self.base_name,
                        key = %producer.key().key_id(),
                        error = %e,
                        "Skipping producer for this collection pass"
                    );
                    continue;
                }
            };
            read += 1;

            // Tags come from the first producer seen for a key.
            match buckets.entry(snapshot.key().clone()) {
                Entry::Occupied(mut entry) => entry.get_mut().0.absorb(&snapshot),
                Entry::Vacant(entry) => {
                    let tags = producer.labels().tags(&self.labels);
                    entry.insert((snapshot, tags));
                }
            }
        }

        let mut merged: Vec<(String, P::Snapshot, Vec<Tag>)> = buckets
            .into_iter()
            .map(|(key, (snapshot, tags))| (key.key_id(), snapshot, tags))
            .collect();
        merged.sort_by(|a, b| a.0.cmp(&b.0));

        let mut points = Vec::with_capacity(merged.len() * 4);
        for (key_id, snapshot, tags) in merged {
            for (field, value) in snapshot.values() {
                points.push(DataPoint {
                    name: format!("{}.{}.{}", self.base_name, key_id, field),
                    timestamp,
                    value,
                    tags: tags.clone(),
                });
            }
        }

        self.stats.passes.fetch_add(1, Ordering::Relaxed);
        self.stats.producers_read.fetch_add(read, Ordering::Relaxed);
        self.stats.producers_skipped.fetch_add(skipped, Ordering::Relaxed);
        self.stats.producers_dropped.fetch_add(dropped, Ordering::Relaxed);
        self.stats
            .points_emitted
            .fetch_add(points.len() as u64, Ordering::Relaxed);

        trace!(
            supplier = %self.base_name,
            producers = view.len(),
            read,
            skipped,
            points = points.len(),
            "Collection pass complete"
        );

        points
    }

    fn members(&self) -> Arc<Vec<Weak<P>>> {
        self.producers.read().clone()
    }
}

impl<P: MeasurementProducer + ?Sized> MetricSupplier for MetricsSupplier<P> {
    fn name(&self) -> &str {
        &self.base_name
    }

    fn collect(&self) -> Vec<DataPoint> {
        MetricsSupplier::collect(self)
    }
}

/// A registered producer that unregisters itself when dropped.
pub struct Registration<P: MeasurementProducer + ?Sized> {
    supplier: Arc<MetricsSupplier<P>>,
    producer: Arc<P>,
}

impl<P: MeasurementProducer + ?Sized> Registration<P> {
    pub fn producer(&self) -> &Arc<P> {
        &self.producer
    }
}

impl<P: MeasurementProducer + ?Sized> std::ops::Deref for Registration<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.producer
    }
}

impl<P: MeasurementProducer + ?Sized> Drop for Registration<P> {
    fn drop(&mut self) {
        self.supplier.unregister(&self.producer);
    }
}
