use api_contract::{IngestResponse, Location, Statistic, Statistics, Status};
use chrono::{TimeZone, Utc};
use domain::{ReadingPayload, SensorType};
use serde_json::json;

#[test]
fn statistics_use_camel_case() {
    let stats = Statistics {
        speed: 65.0,
        fuel: 40.0,
        engine_temperature: 90.0,
        revolutions: 3000.0,
    };
    let value = serde_json::to_value(stats).expect("encode");
    assert_eq!(
        value,
        json!({
            "speed": 65.0,
            "fuel": 40.0,
            "engineTemperature": 90.0,
            "revolutions": 3000.0
        })
    );
}

#[test]
fn statistic_carries_sensor_tag_and_bucket_start() {
    let stat = Statistic {
        sensor: SensorType::EngineTemperature,
        value: 1.5,
        timestamp: Utc.with_ymd_and_hms(2022, 1, 1, 0, 15, 0).unwrap(),
    };
    let value = serde_json::to_value(stat).expect("encode");
    assert_eq!(value["sensor"], "engine_temperature");
    assert_eq!(value["timestamp"], "2022-01-01T00:15:00Z");
}

#[test]
fn location_and_status_shapes() {
    let location = serde_json::to_value(Location {
        latitude: 51.5,
        longitude: -0.1,
    })
    .expect("encode");
    assert_eq!(location, json!({ "latitude": 51.5, "longitude": -0.1 }));

    let empty = serde_json::to_value(Status::default()).expect("encode");
    assert_eq!(empty, json!({}));
    let status = Status {
        last_ingest_timestamp: Some(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()),
    };
    let value = serde_json::to_value(status).expect("encode");
    assert_eq!(value["lastIngestTimestamp"], "2022-01-01T00:00:00Z");
}

#[test]
fn ingest_response_omits_empty_invalid_list() {
    let empty = serde_json::to_string(&IngestResponse::default()).expect("encode");
    assert_eq!(empty, "{}");

    let response = IngestResponse {
        invalid: vec![ReadingPayload {
            sensor: "bogus".to_string(),
            value: 1.0,
            timestamp: None,
        }],
    };
    let value = serde_json::to_value(response).expect("encode");
    assert_eq!(value, json!({ "invalid": [{ "sensor": "bogus", "value": 1.0 }] }));
}
