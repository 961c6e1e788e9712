//! Integration tests for record (de)serialization

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use watermill::broker::MemoryBroker;
use watermill::codec::{Codecs, JsonCodec, RecordDeserializer, RecordSerializer};
use watermill::error::MillError;
use watermill::process::ProcessOutput;
use watermill::stream::{RawElement, StreamType};
use watermill::WaterMill;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Shipment {
    id: u64,
    carrier: String,
    shipped_at: DateTime<Utc>,
    parcels: Vec<Parcel>,
    note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Parcel {
    weight_grams: u32,
    fragile: bool,
}

fn shipment() -> Shipment {
    Shipment {
        id: 42,
        carrier: "acme".to_string(),
        shipped_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
        parcels: vec![
            Parcel {
                weight_grams: 1200,
                fragile: false,
            },
            Parcel {
                weight_grams: 300,
                fragile: true,
            },
        ],
        note: None,
    }
}

#[test]
fn test_json_codec_round_trip_of_nested_record() {
    let original = shipment();

    let raw = RecordSerializer::serialize(&JsonCodec, &original).unwrap();
    assert_eq!(raw["parcels"][1]["fragile"], json!(true));

    let restored: Shipment = RecordDeserializer::deserialize(&JsonCodec, &raw).unwrap();
    assert_eq!(restored, original);
}

#[tokio::test]
async fn test_records_survive_a_mill_pass() {
    let broker = Arc::new(MemoryBroker::default());
    let raw = RecordSerializer::serialize(&JsonCodec, &shipment()).unwrap();
    broker.push("shipments", raw);
    broker.close("shipments");

    let mut mill = WaterMill::<Shipment, Shipment>::builder(broker.clone())
        .stream("shipments")
        .return_type("copies")
        .process(|roots, _joins, _ctx| Ok(ProcessOutput::many(roots.into_vec())))
        .build()
        .unwrap();
    mill.run().await.unwrap();

    let published = broker.published("copies");
    let restored: Shipment = RecordDeserializer::deserialize(&JsonCodec, &published[0]).unwrap();
    assert_eq!(restored, shipment());
}

#[tokio::test]
async fn test_custom_codecs_per_stream() {
    let broker = Arc::new(MemoryBroker::default());
    broker.push("wrapped", json!({"payload": {"n": 5}}));
    broker.close("wrapped");

    let codecs: Codecs<i64, i64> = Codecs::json()
        .with_deserializer("wrapped", |raw: &RawElement| -> watermill::Result<i64> {
            raw.pointer("/payload/n")
                .and_then(|n| n.as_i64())
                .ok_or_else(|| MillError::Serialization("missing payload".to_string()))
        })
        .with_serializer("tagged", |n: &i64| -> watermill::Result<RawElement> {
            Ok(json!({"value": n, "tag": "squared"}))
        });

    let mut mill = WaterMill::<i64, i64>::builder(broker.clone())
        .stream("wrapped")
        .codecs(codecs)
        .return_type("tagged")
        .process(|roots, _joins, _ctx| {
            let n = roots.into_vec()[0];
            Ok(ProcessOutput::One(n * n))
        })
        .build()
        .unwrap();
    mill.run().await.unwrap();

    assert_eq!(
        broker.published(StreamType::from("tagged")),
        vec![json!({"value": 25, "tag": "squared"})]
    );
}

#[tokio::test]
async fn test_undecodable_root_fails_the_run() {
    let broker = Arc::new(MemoryBroker::default());
    broker.push("shipments", json!({"id": "not a number"}));
    broker.close("shipments");

    let mut mill = WaterMill::<Shipment, Shipment>::builder(broker.clone())
        .stream("shipments")
        .return_type("copies")
        .process(|roots, _joins, _ctx| Ok(ProcessOutput::many(roots.into_vec())))
        .build()
        .unwrap();

    let err = mill.run().await.unwrap_err();
    assert!(matches!(err, MillError::Serialization(_)));
}
