use async_trait::async_trait;
use chrono::{NaiveDate, Offset, TimeDelta, TimeZone, Utc};
use domain::{CancelSignal, DayWindow, GapFill, InvalidPolicy, Reading, SensorType};
use flate2::read::GzDecoder;
use lada_dump::{Dumper, MemoryBlobSink};
use lada_ingest::Ingestor;
use lada_pipeline::{PersistError, PersistOutcome, Persistor};
use lada_statistics::{BUCKETS_PER_DAY, StatisticsService};
use lada_storage::{InMemoryReadingStore, ReadingStore, ReadingVisitor, StorageError};
use lada_transport::{InMemoryBus, Publisher};
use std::io::{BufRead, BufReader};
use std::sync::Arc;

struct Harness {
    bus: Arc<InMemoryBus>,
    store: Arc<InMemoryReadingStore>,
    ingestor: Ingestor,
    persistor: Persistor,
}

impl Harness {
    fn new() -> Self {
        let bus = Arc::new(InMemoryBus::new());
        let store = Arc::new(InMemoryReadingStore::new());
        Self {
            ingestor: Ingestor::new(bus.clone(), InvalidPolicy::Report),
            persistor: Persistor::new(store.clone()),
            bus,
            store,
        }
    }

    /// 摄入后关闭总线，并把总线中的消息全部落库。
    async fn ingest_and_drain(&self, input: &str) {
        self.ingestor
            .ingest(input.as_bytes(), &CancelSignal::never())
            .await
            .unwrap();
        self.bus.close();
        self.persistor
            .run(self.bus.as_ref(), &CancelSignal::never())
            .await
            .unwrap();
    }
}

fn new_year() -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
}

#[tokio::test]
async fn speed_reading_flows_to_statistics() {
    let harness = Harness::new();
    harness
        .ingest_and_drain(r#"{"sensor":"speed","value":65,"timestamp":"2022-01-01T00:00:00Z"}"#)
        .await;

    assert_eq!(harness.store.len(), 1);
    assert_eq!(
        harness.store.latest_value(SensorType::Speed).await.unwrap(),
        65.0
    );

    let locf = StatisticsService::new(harness.store.clone(), Utc.fix(), GapFill::CarryForward)
        .for_date(new_year(), SensorType::Speed)
        .await
        .unwrap();
    assert_eq!(locf.len(), BUCKETS_PER_DAY);
    assert_eq!(locf[0].timestamp, Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(locf[0].value, 65.0);
    assert!(locf[1..].iter().all(|item| item.value == 65.0));

    let zero = StatisticsService::new(harness.store.clone(), Utc.fix(), GapFill::Zero)
        .for_date(new_year(), SensorType::Speed)
        .await
        .unwrap();
    assert_eq!(zero.len(), BUCKETS_PER_DAY);
    assert_eq!(zero[0].value, 65.0);
    assert!(zero[1..].iter().all(|item| item.value == 0.0));
}

#[tokio::test]
async fn bogus_sensor_never_reaches_the_bus() {
    let harness = Harness::new();
    let report = harness
        .ingestor
        .ingest(
            r#"{"sensor":"bogus","value":1,"timestamp":"2022-01-01T00:00:00Z"}"#.as_bytes(),
            &CancelSignal::never(),
        )
        .await
        .unwrap();

    assert_eq!(report.invalid.len(), 1);
    assert_eq!(harness.bus.published(), 0);

    harness.bus.close();
    harness
        .persistor
        .run(harness.bus.as_ref(), &CancelSignal::never())
        .await
        .unwrap();
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn redelivered_payload_is_persisted_once() {
    let harness = Harness::new();
    let payload =
        br#"{"sensor":"fuel","value":40,"timestamp":"2022-01-01T08:00:00Z"}"#.to_vec();
    harness.bus.publish(payload.clone()).await.unwrap();
    harness.bus.publish(payload.clone()).await.unwrap();
    harness.bus.close();

    harness
        .persistor
        .run(harness.bus.as_ref(), &CancelSignal::never())
        .await
        .unwrap();

    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.bus.acked(), 2);
    assert_eq!(harness.bus.nacked(), 0);

    let outcome = harness.persistor.handle_payload(&payload).await.unwrap();
    assert!(matches!(outcome, PersistOutcome::Duplicate(r) if r.value == 40.0));
}

#[tokio::test]
async fn undecodable_message_is_nacked_and_stops_the_loop() {
    let harness = Harness::new();
    harness.bus.publish(b"not a reading".to_vec()).await.unwrap();
    harness.bus.close();

    let err = harness
        .persistor
        .run(harness.bus.as_ref(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, PersistError::Decode(_)));
    assert_eq!(harness.bus.pending(), 1);
    assert!(harness.store.is_empty());
}

struct UnavailableStore;

#[async_trait]
impl ReadingStore for UnavailableStore {
    async fn save(&self, _reading: &Reading) -> Result<bool, StorageError> {
        Err(StorageError::Lock)
    }

    async fn for_each_on_date(
        &self,
        _window: DayWindow,
        _cancel: &CancelSignal,
        _visitor: &mut dyn ReadingVisitor,
    ) -> Result<usize, StorageError> {
        Err(StorageError::Lock)
    }

    async fn latest_value(&self, _sensor: SensorType) -> Result<f64, StorageError> {
        Err(StorageError::Lock)
    }
}

#[tokio::test]
async fn storage_failure_reaches_the_caller_unchanged() {
    let bus = Arc::new(InMemoryBus::new());
    let persistor = Persistor::new(Arc::new(UnavailableStore));
    bus.publish(
        br#"{"sensor":"speed","value":65,"timestamp":"2022-01-01T00:00:00Z"}"#.to_vec(),
    )
    .await
    .unwrap();
    bus.close();

    let err = persistor
        .run(bus.as_ref(), &CancelSignal::never())
        .await
        .unwrap_err();

    assert!(matches!(err, PersistError::Storage(StorageError::Lock)));
    assert_eq!(bus.pending(), 1);
    assert_eq!(bus.nacked(), 1);
}

#[tokio::test]
async fn invalid_message_on_the_bus_is_not_stored() {
    let harness = Harness::new();
    let err = harness
        .persistor
        .handle_payload(br#"{"sensor":"speed","value":-3,"timestamp":"2022-01-01T00:00:00Z"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::Invalid(_)));
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn ingested_day_exports_in_stored_order() {
    let harness = Harness::new();
    let start = DayWindow::utc(new_year()).start();
    let mut input = String::new();
    let mut expected = Vec::new();
    for i in 0..250i64 {
        let reading = Reading::new(
            SensorType::EngineTemperature,
            80.0 + (i % 20) as f64,
            start + TimeDelta::seconds(i * 30),
        );
        input.push_str(&serde_json::to_string(&reading).unwrap());
        input.push('\n');
        expected.push(reading);
    }
    harness.ingest_and_drain(&input).await;
    assert_eq!(harness.store.len(), 250);

    let blobs = Arc::new(MemoryBlobSink::new());
    let report = Dumper::new(harness.store.clone(), blobs.clone(), new_year(), Utc.fix())
        .dump(&CancelSignal::never())
        .await
        .unwrap();
    assert_eq!(report.rows, 250);

    let bytes = blobs.get("2022-01-01.json.gz").unwrap();
    let decoded: Vec<Reading> = BufReader::new(GzDecoder::new(bytes.as_slice()))
        .lines()
        .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
        .collect();
    assert_eq!(decoded, expected);
}
