use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use domain::{CancelSignal, InvalidPolicy, Reading, SensorType, cancel_pair};
use lada_ingest::{
    DecodeError, Decoded, ErrorClass, IngestError, Ingestor, MAX_RECORD_BYTES, ReadingDecoder,
};
use lada_transport::{InMemoryBus, Publisher, TransportError};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

const TWO_READINGS: &str = concat!(
    r#"{"sensor":"speed","value":65,"timestamp":"2022-01-01T00:00:00Z"}"#,
    "\n",
    r#"{"sensor":"fuel","value":42.5,"timestamp":"2022-01-01T00:05:00Z"}"#,
);

fn ingestor(bus: &Arc<InMemoryBus>, policy: InvalidPolicy) -> Ingestor {
    Ingestor::new(bus.clone(), policy)
}

#[tokio::test]
async fn decodes_records_split_across_small_reads() {
    let (mut writer, reader) = tokio::io::duplex(7);
    let feeder = tokio::spawn(async move {
        writer.write_all(TWO_READINGS.as_bytes()).await.unwrap();
    });

    let mut decoder = ReadingDecoder::new(reader);
    let first = decoder.decode_next().await.unwrap();
    let second = decoder.decode_next().await.unwrap();
    feeder.await.unwrap();
    let end = decoder.decode_next().await.unwrap();

    let ts = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(first, Decoded::Reading(Reading::new(SensorType::Speed, 65.0, ts)));
    assert!(matches!(second, Decoded::Reading(r) if r.sensor == SensorType::Fuel));
    assert_eq!(end, Decoded::End);
}

#[tokio::test]
async fn decodes_back_to_back_objects() {
    let input = br#"{"sensor":"speed","value":1,"timestamp":"2022-01-01T00:00:00Z"}{"sensor":"speed","value":2,"timestamp":"2022-01-01T00:00:01Z"}"#;
    let mut decoder = ReadingDecoder::new(&input[..]);
    assert!(matches!(decoder.decode_next().await.unwrap(), Decoded::Reading(_)));
    assert!(matches!(decoder.decode_next().await.unwrap(), Decoded::Reading(_)));
    assert_eq!(decoder.decode_next().await.unwrap(), Decoded::End);
}

#[tokio::test]
async fn publishes_every_valid_reading() {
    let bus = Arc::new(InMemoryBus::new());
    let report = ingestor(&bus, InvalidPolicy::Report)
        .ingest(TWO_READINGS.as_bytes(), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.published, 2);
    assert!(report.invalid.is_empty());
    assert_eq!(bus.published(), 2);
}

#[tokio::test]
async fn unknown_sensor_is_reported_and_not_published() {
    let bus = Arc::new(InMemoryBus::new());
    let input = r#"{"sensor":"bogus","value":1,"timestamp":"2022-01-01T00:00:00Z"}"#;
    let report = ingestor(&bus, InvalidPolicy::Report)
        .ingest(input.as_bytes(), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.published, 0);
    assert_eq!(report.invalid.len(), 1);
    assert_eq!(report.invalid[0].sensor, "bogus");
    assert_eq!(bus.published(), 0);

    let response = report.into_response();
    assert_eq!(response.invalid.len(), 1);
}

#[tokio::test]
async fn skip_policy_drops_invalid_records_and_continues() {
    let bus = Arc::new(InMemoryBus::new());
    let input = concat!(
        r#"{"sensor":"speed","value":-1,"timestamp":"2022-01-01T00:00:00Z"}"#,
        r#"{"sensor":"speed","value":3}"#,
        r#"{"sensor":"speed","value":5,"timestamp":"2022-01-01T00:00:00Z"}"#,
    );
    let report = ingestor(&bus, InvalidPolicy::SkipAndLog)
        .ingest(input.as_bytes(), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(report.published, 1);
    assert!(report.invalid.is_empty());
    assert_eq!(bus.published(), 1);
}

#[tokio::test]
async fn malformed_record_aborts_with_client_error() {
    let bus = Arc::new(InMemoryBus::new());
    let input = r#"{"sensor":"speed","value":"fast"}"#;
    let err = ingestor(&bus, InvalidPolicy::Report)
        .ingest(input.as_bytes(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::Client);
    assert_eq!(bus.published(), 0);
}

#[tokio::test]
async fn malformed_record_stops_publishing_what_follows() {
    let bus = Arc::new(InMemoryBus::new());
    let input = concat!(
        r#"{"sensor":"speed","value":1,"timestamp":"2022-01-01T00:00:00Z"}"#,
        "\n",
        r#"{"sensor":"#,
        "\n",
        r#"{"sensor":"speed","value":2,"timestamp":"2022-01-01T00:00:01Z"}"#,
    );
    let err = ingestor(&bus, InvalidPolicy::Report)
        .ingest(input.as_bytes(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Decode(DecodeError::Malformed(_))));
    assert_eq!(err.class(), ErrorClass::Client);
    assert_eq!(bus.published(), 1);
}

#[tokio::test]
async fn oversized_record_is_rejected() {
    let bus = Arc::new(InMemoryBus::new());
    let mut input = r#"{"sensor":"speed","value":1,"timestamp":""#.to_string();
    input.push_str(&"x".repeat(MAX_RECORD_BYTES + 1));
    input.push_str(r#""}"#);

    let err = ingestor(&bus, InvalidPolicy::Report)
        .ingest(input.as_bytes(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Decode(DecodeError::TooLarge)));
    assert_eq!(err.class(), ErrorClass::Client);
    assert_eq!(bus.published(), 0);
}

#[tokio::test]
async fn cancellation_while_waiting_for_input_unwinds() {
    let bus = Arc::new(InMemoryBus::new());
    let (handle, signal) = cancel_pair();
    let (mut writer, reader) = tokio::io::duplex(64);

    let ingest = {
        let ingestor = ingestor(&bus, InvalidPolicy::Report);
        tokio::spawn(async move { ingestor.ingest(reader, &signal).await })
    };

    writer
        .write_all(br#"{"sensor":"speed","value":1,"timestamp":"2022-01-01T00:00:00Z"}"#)
        .await
        .unwrap();
    writer.write_all(br#"{"sensor":"speed","#).await.unwrap();
    while bus.published() < 1 {
        tokio::task::yield_now().await;
    }
    handle.cancel();

    let err = ingest.await.unwrap().unwrap_err();
    assert!(matches!(err, IngestError::Cancelled));
    assert_eq!(err.class(), ErrorClass::Timeout);
    assert_eq!(bus.published(), 1);
    drop(writer);
}

#[tokio::test]
async fn cancellation_wins_and_publishes_nothing() {
    let bus = Arc::new(InMemoryBus::new());
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let err = ingestor(&bus, InvalidPolicy::Report)
        .ingest(TWO_READINGS.as_bytes(), &signal)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Cancelled));
    assert_eq!(err.class(), ErrorClass::Timeout);
    assert_eq!(bus.published(), 0);
}

struct FailingPublisher;

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, _payload: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Publish("broker unavailable".to_string()))
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[tokio::test]
async fn publish_failure_aborts_with_server_error() {
    let ingestor = Ingestor::new(Arc::new(FailingPublisher), InvalidPolicy::Report);
    let err = ingestor
        .ingest(TWO_READINGS.as_bytes(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Publish(_)));
    assert_eq!(err.class(), ErrorClass::Server);
}
