//! Integration tests for netmeter-common library.

use netmeter_common::{
    DataPoint, Format, LogFormat, LoggingConfig, MetricKind, Tag, decode, encode, parse_config,
};

#[test]
fn test_batch_encoding_workflow() {
    let batch = vec![
        DataPoint::gauge("net.client.db:5432.connections", 1_700_000_000_000, 4)
            .with_tags(vec![Tag::new("remote", "db:5432")]),
        DataPoint::counter("net.client.db:5432.bytesSent", 1_700_000_000_000, 2048)
            .with_tags(vec![Tag::new("remote", "db:5432")]),
    ];

    let json = encode(&batch, Format::Json).expect("JSON encode failed");
    let cbor = encode(&batch, Format::Cbor).expect("CBOR encode failed");
    assert!(cbor.len() < json.len(), "CBOR should be smaller than JSON");

    let decoded: Vec<DataPoint> = decode(&cbor, Format::Cbor).expect("CBOR decode failed");
    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded[0].kind(), MetricKind::Gauge);
    assert_eq!(decoded[1].kind(), MetricKind::Counter);
    assert_eq!(decoded[1].tags, vec![Tag::new("remote", "db:5432")]);
}

#[test]
fn test_logging_config_parses_standalone() {
    let config: LoggingConfig = parse_config(r#"{ level: "trace", format: "json" }"#).unwrap();

    assert_eq!(config.level, "trace");
    assert_eq!(config.format, LogFormat::Json);
}
