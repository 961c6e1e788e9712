//! Shared handle on a running mill
//!
//! The handle owns the state that outlives a single loop iteration and may be
//! touched from other tasks: the set of data keys still awaiting an
//! acknowledgement and the persistent end-of-stream flag.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::broker::MessageBroker;
use crate::codec::Serializers;
use crate::error::Result;
use crate::stream::{DataKey, StreamRecord, StreamType};

/// Results completed out of band for one data key
#[derive(Debug, Clone, PartialEq)]
pub enum SaveData<O> {
    /// Nothing to publish, only acknowledge
    Empty,
    /// One result
    One(O),
    /// Several results, possibly bound for different streams
    Many(Vec<O>),
    /// This branch has ended; the mill winds down once it is acknowledged
    EndOfStream,
}

struct Shared<O> {
    mill_id: Uuid,
    input: Arc<dyn MessageBroker>,
    output: Arc<dyn MessageBroker>,
    serializers: Serializers<O>,
    explicit_return_types: Vec<StreamType>,
    pending: Mutex<HashSet<u64>>,
    eos: AtomicBool,
    eos_sent: AtomicBool,
}

/// Cloneable handle on a [`WaterMill`](super::WaterMill)
pub struct MillHandle<O> {
    inner: Arc<Shared<O>>,
}

impl<O> Clone for MillHandle<O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<O> MillHandle<O> {
    pub(crate) fn new(
        mill_id: Uuid,
        input: Arc<dyn MessageBroker>,
        output: Arc<dyn MessageBroker>,
        serializers: Serializers<O>,
        explicit_return_types: Vec<StreamType>,
    ) -> Self {
        Self {
            inner: Arc::new(Shared {
                mill_id,
                input,
                output,
                serializers,
                explicit_return_types,
                pending: Mutex::new(HashSet::new()),
                eos: AtomicBool::new(false),
                eos_sent: AtomicBool::new(false),
            }),
        }
    }

    /// Id of the mill, as recorded in its tracing span
    pub fn mill_id(&self) -> Uuid {
        self.inner.mill_id
    }

    /// Returns true once the mill has seen a permanent end-of-stream
    pub fn is_eos(&self) -> bool {
        self.inner.eos.load(Ordering::SeqCst)
    }

    /// Data keys still awaiting acknowledgement, sorted
    pub fn pending_keys(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = self.inner.pending.lock().iter().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Output streams that receive end-of-stream once every key is acknowledged
    pub fn explicit_return_types(&self) -> &[StreamType] {
        &self.inner.explicit_return_types
    }

    pub(crate) fn mark_eos(&self) {
        self.inner.eos.store(true, Ordering::SeqCst);
    }

    pub(crate) fn track(&self, data_key: &DataKey) {
        self.inner.pending.lock().insert(data_key.key);
    }

    /// Set end-of-stream from the mill's side, publishing it when nothing is outstanding
    ///
    /// The flag is set while the pending set is locked, so a concurrent
    /// [`save_results`](Self::save_results) either sees it or has already
    /// drained the set for this call. Returns true when nothing was outstanding.
    pub(crate) async fn close_input(&self) -> Result<bool> {
        let drained = {
            let pending = self.inner.pending.lock();
            self.mark_eos();
            pending.is_empty()
        };
        if drained {
            self.send_explicit_eos().await?;
        }
        Ok(drained)
    }

    pub(crate) fn serializers(&self) -> &Serializers<O> {
        &self.inner.serializers
    }

    pub(crate) fn output(&self) -> &dyn MessageBroker {
        self.inner.output.as_ref()
    }

    /// Publish end-of-stream on every explicit return stream, at most once
    pub(crate) async fn send_explicit_eos(&self) -> Result<()> {
        if self.inner.explicit_return_types.is_empty() {
            return Ok(());
        }
        if self.inner.eos_sent.swap(true, Ordering::SeqCst) {
            debug!(mill_id = %self.inner.mill_id, "end of stream already published");
            return Ok(());
        }

        for stream in &self.inner.explicit_return_types {
            self.inner.output.send_eos(stream).await?;
        }
        Ok(())
    }
}

impl<O: StreamRecord> MillHandle<O> {
    /// Complete the processing of a data key out of band
    ///
    /// Publishes the results, commits the key and drops it from the pending
    /// set. Once the set is drained after an end-of-stream, end-of-stream is
    /// published on every explicit return stream.
    pub async fn save_results(&self, data_key: &DataKey, data: SaveData<O>) -> Result<()> {
        match data {
            SaveData::Empty => {}
            SaveData::One(item) => self.publish(&item).await?,
            SaveData::Many(items) => {
                for item in &items {
                    self.publish(item).await?;
                }
            }
            SaveData::EndOfStream => {
                self.mark_eos();
                let mut pending = self.inner.pending.lock();
                pending.clear();
                pending.insert(data_key.key);
            }
        }

        self.inner.input.commit(Some(data_key)).await?;

        let finished = {
            let mut pending = self.inner.pending.lock();
            if !pending.remove(&data_key.key) {
                error!(
                    mill_id = %self.inner.mill_id,
                    data_key = %data_key,
                    "failed to remove data key from pending set"
                );
            }
            pending.is_empty() && self.is_eos()
        };

        if finished {
            self.send_explicit_eos().await?;
        }
        Ok(())
    }

    async fn publish(&self, item: &O) -> Result<()> {
        let stream = item.stream_type();
        let raw = self.inner.serializers.serialize(&stream, item)?;
        self.inner.output.send(&stream, raw).await?;
        Ok(())
    }
}

impl<O> fmt::Debug for MillHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MillHandle")
            .field("mill_id", &self.inner.mill_id)
            .field("eos", &self.is_eos())
            .field("pending", &self.inner.pending.lock().len())
            .finish()
    }
}
