//! Destinations for reported data point batches.

use std::io::Write;

use parking_lot::Mutex;
use tracing::info;

use netmeter_common::{DataPoint, Error, Format, Result, encode};

/// Receives batches of data points from the [`crate::Reporter`].
pub trait DataPointSink: Send + Sync {
    fn write_batch(&self, batch: &[DataPoint]) -> Result<()>;
}

/// Emits every point as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DataPointSink for LogSink {
    fn write_batch(&self, batch: &[DataPoint]) -> Result<()> {
        for point in batch {
            let tags: Vec<String> = point.tags.iter().map(ToString::to_string).collect();
            info!(
                name = %point.name,
                kind = %point.kind(),
                value = point.value.as_f64(),
                timestamp = point.timestamp,
                tags = %tags.join(","),
                "data point"
            );
        }
        Ok(())
    }
}

/// Encodes each batch and writes it to an `io::Write`.
///
/// JSON batches are newline terminated so the output is one array per line.
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
    format: Format,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, format: Format) -> Self {
        Self {
            writer: Mutex::new(writer),
            format,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> DataPointSink for WriterSink<W> {
    fn write_batch(&self, batch: &[DataPoint]) -> Result<()> {
        let bytes = encode(&batch, self.format)?;
        let mut writer = self.writer.lock();
        writer.write_all(&bytes)?;
        if self.format == Format::Json {
            writer.write_all(b"\n")?;
        }
        writer.flush().map_err(Error::from)
    }
}

/// Keeps every batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<DataPoint>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<DataPoint>> {
        self.batches.lock().clone()
    }

    /// All points across batches, in arrival order.
    pub fn points(&self) -> Vec<DataPoint> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl DataPointSink for MemorySink {
    fn write_batch(&self, batch: &[DataPoint]) -> Result<()> {
        self.batches.lock().push(batch.to_vec());
        Ok(())
    }
}

impl<S: DataPointSink + ?Sized> DataPointSink for std::sync::Arc<S> {
    fn write_batch(&self, batch: &[DataPoint]) -> Result<()> {
        (**self).write_batch(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmeter_common::decode;

    fn batch() -> Vec<DataPoint> {
        vec![
            DataPoint::gauge("net.client.h:1.connections", 1, 2),
            DataPoint::counter("net.client.h:1.bytesSent", 1, 64),
        ]
    }

    #[test]
    fn test_writer_sink_json_lines() {
        let sink = WriterSink::new(Vec::new(), Format::Json);
        sink.write_batch(&batch()).unwrap();
        sink.write_batch(&batch()[..1]).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Vec<DataPoint> = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, batch());
    }

    #[test]
    fn test_writer_sink_cbor() {
        let sink = WriterSink::new(Vec::new(), Format::Cbor);
        sink.write_batch(&batch()).unwrap();

        let bytes = sink.into_inner();
        let decoded: Vec<DataPoint> = decode(&bytes, Format::Cbor).unwrap();
        assert_eq!(decoded, batch());
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.write_batch(&batch()).unwrap();
        sink.write_batch(&batch()).unwrap();

        assert_eq!(sink.batches().len(), 2);
        assert_eq!(sink.points().len(), 4);
    }

    #[test]
    fn test_log_sink_accepts_any_batch() {
        assert!(LogSink.write_batch(&batch()).is_ok());
        assert!(LogSink.write_batch(&[]).is_ok());
    }
}
