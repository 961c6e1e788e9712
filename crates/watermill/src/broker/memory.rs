//! In-memory message broker
//!
//! Streams are plain buffers with monotonically increasing offsets. Cursors
//! consume from the front of a buffer, discarding stale candidates and leaving
//! candidates that are ahead in place. When a buffer is drained but its stream
//! is still open, a cursor waits for new data up to the configured poll timeout.
//!
//! Published elements are appended to the target stream as well, so one mill's
//! output can feed another mill running on the same broker.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

use super::{ElementCursor, MessageBroker, Pull};
use crate::compare::{Comparator, StreamsShift};
use crate::error::{BrokerError, BrokerResult};
use crate::stream::{DataKey, RawElement, StreamType};

/// In-memory broker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryBrokerConfig {
    /// How long a cursor waits on a drained, open stream
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl MemoryBrokerConfig {
    /// Poll timeout as a duration
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for MemoryBrokerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

fn default_poll_timeout_ms() -> u64 {
    100
}

#[derive(Debug, Default)]
struct StreamBuffer {
    elements: VecDeque<(u64, RawElement)>,
    next_offset: u64,
    /// Offset following the last consumed element
    position: u64,
    closed: bool,
}

#[derive(Debug, Default)]
struct BrokerState {
    streams: BTreeMap<StreamType, StreamBuffer>,
    published: Vec<(StreamType, RawElement)>,
    eos_markers: BTreeMap<StreamType, usize>,
    committed: BTreeMap<StreamType, u64>,
    commit_count: usize,
    next_data_key: u64,
    has_yielded: bool,
    shut_down: bool,
}

impl BrokerState {
    fn positions(&self) -> BTreeMap<StreamType, u64> {
        self.streams
            .iter()
            .map(|(stream, buffer)| (stream.clone(), buffer.position))
            .collect()
    }
}

/// Broker keeping every stream in process memory
#[derive(Debug)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    notify: Notify,
    config: MemoryBrokerConfig,
}

impl MemoryBroker {
    /// Create a broker with the given configuration
    pub fn new(config: MemoryBrokerConfig) -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            notify: Notify::new(),
            config,
        }
    }

    /// Create a broker with a custom poll timeout
    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self::new(MemoryBrokerConfig {
            poll_timeout_ms: poll_timeout.as_millis() as u64,
        })
    }

    /// Broker configuration
    pub fn config(&self) -> &MemoryBrokerConfig {
        &self.config
    }

    /// Make a stream known to the broker without adding data
    pub fn declare(&self, stream: impl Into<StreamType>) {
        self.state.lock().streams.entry(stream.into()).or_default();
    }

    /// Append an element to a stream, returning its offset
    pub fn push(&self, stream: impl Into<StreamType>, element: RawElement) -> u64 {
        let offset = {
            let mut state = self.state.lock();
            append(&mut state, stream.into(), element)
        };
        self.notify.notify_waiters();
        offset
    }

    /// Append several elements to a stream
    pub fn extend<I>(&self, stream: impl Into<StreamType>, elements: I)
    where
        I: IntoIterator<Item = RawElement>,
    {
        let stream = stream.into();
        {
            let mut state = self.state.lock();
            for element in elements {
                append(&mut state, stream.clone(), element);
            }
        }
        self.notify.notify_waiters();
    }

    /// Close a stream: once drained, cursors report end-of-stream
    pub fn close(&self, stream: impl Into<StreamType>) {
        self.state.lock().streams.entry(stream.into()).or_default().closed = true;
        self.notify.notify_waiters();
    }

    /// Shut the broker down; every later operation fails with [`BrokerError::Closed`]
    pub fn shutdown(&self) {
        self.state.lock().shut_down = true;
        self.notify.notify_waiters();
    }

    /// Elements published to a stream, in publication order
    pub fn published(&self, stream: impl Into<StreamType>) -> Vec<RawElement> {
        let stream = stream.into();
        self.state
            .lock()
            .published
            .iter()
            .filter(|(target, _)| *target == stream)
            .map(|(_, element)| element.clone())
            .collect()
    }

    /// Every published element with its target stream
    pub fn published_all(&self) -> Vec<(StreamType, RawElement)> {
        self.state.lock().published.clone()
    }

    /// Number of end-of-stream markers published to a stream
    pub fn eos_count(&self, stream: impl Into<StreamType>) -> usize {
        let stream = stream.into();
        self.state.lock().eos_markers.get(&stream).copied().unwrap_or(0)
    }

    /// Committed position of a stream
    pub fn committed(&self, stream: impl Into<StreamType>) -> Option<u64> {
        let stream = stream.into();
        self.state.lock().committed.get(&stream).copied()
    }

    /// Number of commit calls received
    pub fn commit_count(&self) -> usize {
        self.state.lock().commit_count
    }

    /// Number of buffered, not yet consumed elements of a stream
    pub fn pending(&self, stream: impl Into<StreamType>) -> usize {
        let stream = stream.into();
        self.state
            .lock()
            .streams
            .get(&stream)
            .map(|buffer| buffer.elements.len())
            .unwrap_or(0)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(MemoryBrokerConfig::default())
    }
}

fn append(state: &mut BrokerState, stream: StreamType, element: RawElement) -> u64 {
    let buffer = state.streams.entry(stream).or_default();
    let offset = buffer.next_offset;
    buffer.elements.push_back((offset, element));
    buffer.next_offset += 1;
    offset
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    fn get_elements<'a>(
        &'a self,
        stream: &StreamType,
        comparator: Option<Comparator>,
    ) -> Box<dyn ElementCursor + 'a> {
        Box::new(MemoryCursor {
            broker: self,
            stream: stream.clone(),
            comparator,
            yielded: 0,
        })
    }

    async fn get_data_key(&self) -> Option<DataKey> {
        let mut state = self.state.lock();
        if !state.has_yielded {
            return None;
        }
        let key = state.next_data_key;
        state.next_data_key += 1;
        Some(DataKey::new(key, state.positions()))
    }

    async fn commit(&self, data_key: Option<&DataKey>) -> BrokerResult<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(BrokerError::Closed);
        }

        let positions = match data_key {
            Some(data_key) => data_key.positions.clone(),
            None => state.positions(),
        };
        for (stream, position) in positions {
            let committed = state.committed.entry(stream).or_insert(0);
            *committed = (*committed).max(position);
        }
        state.commit_count += 1;
        Ok(())
    }

    async fn send(&self, stream: &StreamType, element: RawElement) -> BrokerResult<()> {
        {
            let mut state = self.state.lock();
            if state.shut_down {
                return Err(BrokerError::Closed);
            }
            state.published.push((stream.clone(), element.clone()));
            append(&mut state, stream.clone(), element);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn send_eos(&self, stream: &StreamType) -> BrokerResult<()> {
        {
            let mut state = self.state.lock();
            if state.shut_down {
                return Err(BrokerError::Closed);
            }
            *state.eos_markers.entry(stream.clone()).or_insert(0) += 1;
            state.streams.entry(stream.clone()).or_default().closed = true;
        }
        debug!(stream = %stream, "end of stream published");
        self.notify.notify_waiters();
        Ok(())
    }

    fn known_streams(&self) -> Option<BTreeSet<StreamType>> {
        Some(self.state.lock().streams.keys().cloned().collect())
    }
}

/// Cursor over one stream of a [`MemoryBroker`]
pub struct MemoryCursor<'a> {
    broker: &'a MemoryBroker,
    stream: StreamType,
    comparator: Option<Comparator>,
    yielded: usize,
}

impl MemoryCursor<'_> {
    /// Examine buffered candidates; `None` means the caller has to wait
    fn try_next(&mut self) -> BrokerResult<Option<Pull>> {
        let mut guard = self.broker.state.lock();
        let state = &mut *guard;
        if state.shut_down {
            return Err(BrokerError::Closed);
        }

        let buffer = state
            .streams
            .get_mut(&self.stream)
            .ok_or_else(|| BrokerError::UnknownStream {
                stream: self.stream.clone(),
            })?;

        loop {
            let shift = match buffer.elements.front() {
                Some((_, candidate)) => self
                    .comparator
                    .as_ref()
                    .map_or(StreamsShift::Equal, |compare| compare(candidate)),
                None => break,
            };

            match shift {
                StreamsShift::Equal => {
                    if let Some((offset, element)) = buffer.elements.pop_front() {
                        buffer.position = offset + 1;
                        state.has_yielded = true;
                        self.yielded += 1;
                        return Ok(Some(Pull::Element(element)));
                    }
                }
                StreamsShift::Greater => {
                    if let Some((offset, _)) = buffer.elements.pop_front() {
                        buffer.position = offset + 1;
                        trace!(stream = %self.stream, offset, "discarded stale element");
                    }
                }
                StreamsShift::Less => {
                    return Ok(Some(if self.yielded == 0 {
                        Pull::RanAhead(self.stream.clone())
                    } else {
                        Pull::Exhausted
                    }));
                }
            }
        }

        if buffer.closed {
            return Ok(Some(Pull::EndOfStream));
        }
        Ok(None)
    }
}

#[async_trait]
impl ElementCursor for MemoryCursor<'_> {
    async fn next(&mut self) -> BrokerResult<Pull> {
        loop {
            // Registered before the buffer check so a concurrent push is not missed
            let notified = self.broker.notify.notified();
            if let Some(pull) = self.try_next()? {
                return Ok(pull);
            }

            if tokio::time::timeout(self.broker.config.poll_timeout(), notified)
                .await
                .is_err()
            {
                return Ok(Pull::Timeout);
            }
        }
    }
}
