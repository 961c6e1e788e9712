//! Stream-join and windowed-processing engine
//!
//! A water mill walks several ordered streams in lockstep. Child streams are
//! joined onto a driving root stream along a declared join tree, root elements
//! are optionally grouped into windows, and a processing callback is invoked
//! once per root element (or window) with its joined children attached. Results
//! and end-of-stream markers are forwarded downstream through a message broker.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use serde_json::json;
//! use watermill::broker::MemoryBroker;
//! use watermill::join::JoinTree;
//! use watermill::process::ProcessOutput;
//! use watermill::stream::field;
//! use watermill::WaterMill;
//!
//! #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
//! struct Event {
//!     order_id: u32,
//!     kind: String,
//! }
//!
//! #[derive(Debug, Serialize)]
//! struct Summary {
//!     order_id: u32,
//!     payments: usize,
//! }
//!
//! #[tokio::main]
//! async fn main() -> watermill::Result<()> {
//!     let broker = Arc::new(MemoryBroker::default());
//!     broker.extend("orders", vec![json!({"order_id": 1, "kind": "order"})]);
//!     broker.extend("payments", vec![
//!         json!({"order_id": 1, "kind": "payment"}),
//!         json!({"order_id": 1, "kind": "payment"}),
//!     ]);
//!     broker.close("orders");
//!     broker.close("payments");
//!
//!     let mut builder = JoinTree::builder("orders");
//!     builder.join("payments", JoinTree::ROOT, "payments", field("/order_id"), field("/order_id"));
//!
//!     let mut mill = WaterMill::<Event, Summary>::builder(broker.clone())
//!         .join_tree(builder.build()?)
//!         .return_type("summaries")
//!         .process(|roots, joins, _ctx| {
//!             let order = roots.into_vec().remove(0);
//!             let payments = joins.children_of("payments", &order).len();
//!             Ok(ProcessOutput::One(Summary { order_id: order.order_id, payments }))
//!         })
//!         .build()?;
//!
//!     mill.run().await?;
//!     assert_eq!(
//!         broker.published("summaries"),
//!         vec![json!({"order_id": 1, "payments": 2})]
//!     );
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod codec;
pub mod compare;
pub mod config;
pub mod context;
pub mod error;
pub mod join;
pub mod mill;
pub mod process;
pub mod stream;
pub mod telemetry;
pub mod window;

pub use broker::{ElementCursor, MemoryBroker, MemoryBrokerConfig, MessageBroker, Pull};
pub use codec::{Codecs, JsonCodec, JsonRecord, RecordDeserializer, RecordSerializer};
pub use compare::{compare_streams, Comparator, StreamsShift};
pub use config::{LogFormat, LoggingConfig, MillSettings, RanAheadPolicy, WaterMillConfig};
pub use context::ProcessContext;
pub use error::{BrokerError, MillError, Result, WindowError};
pub use join::{JoinPair, JoinTree, JoinTreeBuilder, JoinTreeNode, Joins, NodeId};
pub use mill::{MillHandle, MillStats, SaveData, WaterMill, WaterMillBuilder};
pub use process::{ProcessFn, ProcessOutput, Roots, Yield};
pub use stream::{field, key_expr, time_field, DataKey, Key, KeyExpr, RawElement, Record, StreamRecord, StreamType};
pub use window::{FieldWindow, TumblingWindow, WindowAccumulator, WindowFn};
