//! Daily payment totals per customer
//!
//! Orders are grouped into one-day windows and every order is joined with its
//! payments. Each window produces one total per customer.
//!
//! Run with: cargo run --example daily_totals

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use watermill::broker::MemoryBroker;
use watermill::config::WaterMillConfig;
use watermill::join::JoinTree;
use watermill::process::ProcessOutput;
use watermill::stream::field;
use watermill::telemetry::init_tracing;
use watermill::window::TumblingWindow;
use watermill::WaterMill;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
enum Event {
    Order {
        order_id: u64,
        customer: String,
        created_at: String,
    },
    Payment {
        order_id: u64,
        cents: i64,
    },
}

#[derive(Debug, Serialize)]
struct DailyTotal {
    customer: String,
    orders: usize,
    cents: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WaterMillConfig::load(None)?;
    init_tracing(&config.logging)?;

    let broker = Arc::new(MemoryBroker::new(config.broker.clone()));
    broker.extend(
        "orders",
        vec![
            json!({"order_id": 1, "customer": "ada", "created_at": "2024-05-01T09:00:00Z"}),
            json!({"order_id": 2, "customer": "bob", "created_at": "2024-05-01T11:30:00Z"}),
            json!({"order_id": 3, "customer": "ada", "created_at": "2024-05-01T17:45:00Z"}),
            json!({"order_id": 4, "customer": "ada", "created_at": "2024-05-02T08:15:00Z"}),
        ],
    );
    broker.extend(
        "payments",
        vec![
            json!({"order_id": 1, "cents": 1200}),
            json!({"order_id": 2, "cents": 800}),
            json!({"order_id": 2, "cents": 150}),
            json!({"order_id": 3, "cents": 4000}),
            json!({"order_id": 4, "cents": 999}),
        ],
    );
    broker.close("orders");

    let mut tree = JoinTree::builder("orders")
        .root_window(Arc::new(TumblingWindow::daily("/created_at")));
    tree.join("payments", JoinTree::ROOT, "payments", field("/order_id"), field("/order_id"));

    let mut mill = WaterMill::<Event, DailyTotal>::builder(broker.clone())
        .join_tree(tree.build()?)
        .return_type("daily_totals")
        .settings(config.mill.clone())
        .process(|roots, joins, _ctx| {
            let mut totals: BTreeMap<String, DailyTotal> = BTreeMap::new();
            for order in roots.as_slice() {
                let Event::Order { customer, .. } = order else {
                    continue;
                };
                let cents: i64 = joins
                    .children_of("payments", order)
                    .iter()
                    .map(|payment| match payment {
                        Event::Payment { cents, .. } => *cents,
                        Event::Order { .. } => 0,
                    })
                    .sum();

                let total = totals.entry(customer.clone()).or_insert_with(|| DailyTotal {
                    customer: customer.clone(),
                    orders: 0,
                    cents: 0,
                });
                total.orders += 1;
                total.cents += cents;
            }
            Ok(ProcessOutput::many(totals.into_values()))
        })
        .build()?;

    let stats = mill.run().await?;

    for total in broker.published("daily_totals") {
        println!("{}", total);
    }
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
