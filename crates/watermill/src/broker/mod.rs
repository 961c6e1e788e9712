//! Message broker contract
//!
//! The mill never talks to a transport directly. It pulls raw elements through
//! an [`ElementCursor`] handed out by a [`MessageBroker`], and publishes results,
//! end-of-stream markers and commits back through the same trait.
//!
//! A pull never fails for ordinary stream conditions. A right stream that is
//! ahead of its parent, a poll that timed out and a stream that has ended are
//! all reported as [`Pull`] variants; only transport failures surface as
//! [`BrokerError`](crate::error::BrokerError).

pub mod memory;

pub use memory::{MemoryBroker, MemoryBrokerConfig};

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::compare::Comparator;
use crate::error::BrokerResult;
use crate::stream::{DataKey, RawElement, StreamType};

/// Outcome of a single pull from a stream
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    /// An element aligned with the comparator
    Element(RawElement),
    /// The cursor yielded elements before and the next candidate is ahead
    Exhausted,
    /// The very first candidate is already ahead of the reference
    RanAhead(StreamType),
    /// No data arrived within the broker's poll timeout
    Timeout,
    /// The stream has ended and is drained
    EndOfStream,
}

impl Pull {
    /// Returns true for [`Pull::Element`]
    pub fn is_element(&self) -> bool {
        matches!(self, Pull::Element(_))
    }
}

/// Lazy sequence of elements of one stream
#[async_trait]
pub trait ElementCursor: Send {
    /// Pull the next element
    async fn next(&mut self) -> BrokerResult<Pull>;
}

/// Broker the mill pulls from and publishes to
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Open a cursor over `stream`, filtered by an optional comparator
    ///
    /// Without a comparator every candidate is accepted.
    fn get_elements<'a>(
        &'a self,
        stream: &StreamType,
        comparator: Option<Comparator>,
    ) -> Box<dyn ElementCursor + 'a>;

    /// Handle for the position of the most recently yielded element
    async fn get_data_key(&self) -> Option<DataKey>;

    /// Advance the durable consumption position
    ///
    /// Commits the current position when no data key is given.
    async fn commit(&self, data_key: Option<&DataKey>) -> BrokerResult<()>;

    /// Publish one element
    async fn send(&self, stream: &StreamType, element: RawElement) -> BrokerResult<()>;

    /// Publish an end-of-stream marker
    async fn send_eos(&self, stream: &StreamType) -> BrokerResult<()>;

    /// Streams this broker carries, if it can tell
    fn known_streams(&self) -> Option<BTreeSet<StreamType>> {
        None
    }
}
