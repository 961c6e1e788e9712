//! Integration tests for out-of-band result completion

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use watermill::broker::MemoryBroker;
use watermill::codec::JsonRecord;
use watermill::mill::SaveData;
use watermill::process::ProcessOutput;
use watermill::stream::{StreamRecord, StreamType};
use watermill::WaterMill;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum Outcome {
    Total { total: i64 },
    Alert { alert: String },
}

impl StreamRecord for Outcome {
    fn stream_type(&self) -> StreamType {
        match self {
            Outcome::Total { .. } => StreamType::from("totals"),
            Outcome::Alert { .. } => StreamType::from("alerts"),
        }
    }
}

type Tasks = Arc<Mutex<Vec<JoinHandle<()>>>>;

async fn join_all(tasks: &Tasks) {
    let handles: Vec<JoinHandle<()>> = tasks.lock().drain(..).collect();
    for handle in handles {
        handle.await.unwrap();
    }
}

fn numbers(values: &[i64]) -> Arc<MemoryBroker> {
    let broker = Arc::new(MemoryBroker::with_poll_timeout(Duration::from_millis(20)));
    broker.extend("numbers", values.iter().map(|v| json!(v)));
    broker.close("numbers");
    broker
}

#[tokio::test]
async fn test_eos_waits_for_every_acknowledgement() {
    let broker = numbers(&[1, 2, 3]);
    let tasks: Tasks = Arc::new(Mutex::new(Vec::new()));
    let spawned = tasks.clone();

    let mut mill = WaterMill::<JsonRecord, Outcome>::builder(broker.clone())
        .stream("numbers")
        .explicit_return_types(["totals"])
        .process(move |roots, _joins, ctx| {
            let value = roots.into_vec().remove(0).0.as_i64().unwrap_or(0);
            let handle = ctx.mill().clone();
            if let Some(data_key) = ctx.data_key().cloned() {
                spawned.lock().push(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    handle
                        .save_results(&data_key, SaveData::One(Outcome::Total { total: value * 10 }))
                        .await
                        .unwrap();
                }));
            }
            Ok(ProcessOutput::NoResult)
        })
        .build()
        .unwrap();

    let stats = mill.run().await.unwrap();
    let handle = mill.handle();

    assert_eq!(stats.invocations, 3);
    assert!(handle.is_eos());
    assert_eq!(handle.pending_keys().len(), 3);
    assert_eq!(broker.eos_count("totals"), 0);

    join_all(&tasks).await;

    assert!(handle.pending_keys().is_empty());
    let mut totals: Vec<i64> = broker
        .published("totals")
        .iter()
        .filter_map(|total| total["total"].as_i64())
        .collect();
    totals.sort_unstable();
    assert_eq!(totals, vec![10, 20, 30]);
    assert_eq!(broker.eos_count("totals"), 1);
    assert_eq!(broker.committed("numbers"), Some(3));
}

#[tokio::test]
async fn test_heterogeneous_batch_routed_per_record() {
    let broker = numbers(&[7]);
    let tasks: Tasks = Arc::new(Mutex::new(Vec::new()));
    let spawned = tasks.clone();

    let mut mill = WaterMill::<JsonRecord, Outcome>::builder(broker.clone())
        .stream("numbers")
        .explicit_return_types(["totals", "alerts"])
        .process(move |_roots, _joins, ctx| {
            let handle = ctx.mill().clone();
            if let Some(data_key) = ctx.data_key().cloned() {
                spawned.lock().push(tokio::spawn(async move {
                    let batch = vec![
                        Outcome::Total { total: 7 },
                        Outcome::Alert {
                            alert: "seven".to_string(),
                        },
                    ];
                    handle.save_results(&data_key, SaveData::Many(batch)).await.unwrap();
                }));
            }
            Ok(ProcessOutput::NoResult)
        })
        .build()
        .unwrap();

    mill.run().await.unwrap();
    join_all(&tasks).await;

    assert_eq!(broker.published("totals"), vec![json!({"total": 7})]);
    assert_eq!(broker.published("alerts"), vec![json!({"alert": "seven"})]);
    assert_eq!(broker.eos_count("totals"), 1);
    assert_eq!(broker.eos_count("alerts"), 1);
}

#[tokio::test]
async fn test_saved_end_of_stream_stops_the_mill() {
    let broker = numbers(&[1, 2, 3]);
    let saved = Arc::new(Mutex::new(false));
    let flag = saved.clone();

    let mut mill = WaterMill::<JsonRecord, Outcome>::builder(broker.clone())
        .stream("numbers")
        .explicit_return_types(["totals"])
        .process(move |roots, _joins, ctx| {
            let value = roots.into_vec().remove(0).0.as_i64().unwrap_or(0);
            if value == 2 {
                let handle = ctx.mill().clone();
                let data_key = ctx.data_key().cloned();
                let flag = flag.clone();
                // Completed before the next pull; the mill stops at the tail of this iteration
                futures::executor::block_on(async move {
                    if let Some(data_key) = data_key {
                        handle.save_results(&data_key, SaveData::EndOfStream).await.unwrap();
                        *flag.lock() = true;
                    }
                });
            }
            Ok(ProcessOutput::NoResult)
        })
        .build()
        .unwrap();

    let stats = mill.run().await.unwrap();

    assert!(*saved.lock());
    assert_eq!(stats.invocations, 2);
    assert_eq!(broker.pending("numbers"), 1);
    // The first key is still outstanding but was narrowed away
    assert!(mill.handle().pending_keys().is_empty());
    assert_eq!(broker.eos_count("totals"), 1);
}

#[tokio::test]
async fn test_root_end_without_outstanding_keys_sends_eos_immediately() {
    let broker = numbers(&[]);

    let mut mill = WaterMill::<JsonRecord, Outcome>::builder(broker.clone())
        .stream("numbers")
        .explicit_return_types(["totals", "alerts"])
        .process(|_roots, _joins, _ctx| Ok(ProcessOutput::NoResult))
        .build()
        .unwrap();

    mill.run().await.unwrap();

    assert_eq!(broker.eos_count("totals"), 1);
    assert_eq!(broker.eos_count("alerts"), 1);
}

#[tokio::test]
async fn test_synchronous_results_discarded_in_acknowledgement_mode() {
    let broker = numbers(&[1]);

    let mut mill = WaterMill::<JsonRecord, Outcome>::builder(broker.clone())
        .stream("numbers")
        .process(|_roots, _joins, _ctx| Ok(ProcessOutput::One(Outcome::Total { total: 1 })))
        .build()
        .unwrap();

    let stats = mill.run().await.unwrap();

    assert!(broker.published_all().is_empty());
    assert_eq!(stats.results_emitted, 0);
}
