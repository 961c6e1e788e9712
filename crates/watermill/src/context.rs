//! Per-invocation context handed to the processing callback

use crate::mill::MillHandle;
use crate::stream::DataKey;

/// Context of one callback invocation
///
/// Carries the data key of the element being processed and a handle on the
/// running mill. Together they allow results to be completed out of band:
/// clone both, hand them to another task and call
/// [`MillHandle::save_results`] once the work is done.
pub struct ProcessContext<O> {
    data_key: Option<DataKey>,
    mill: MillHandle<O>,
}

impl<O> ProcessContext<O> {
    pub(crate) fn new(data_key: Option<DataKey>, mill: MillHandle<O>) -> Self {
        Self { data_key, mill }
    }

    /// Data key of the element being processed
    pub fn data_key(&self) -> Option<&DataKey> {
        self.data_key.as_ref()
    }

    /// Handle on the running mill
    pub fn mill(&self) -> &MillHandle<O> {
        &self.mill
    }
}

impl<O> std::fmt::Debug for ProcessContext<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("data_key", &self.data_key)
            .field("mill", &self.mill)
            .finish()
    }
}
