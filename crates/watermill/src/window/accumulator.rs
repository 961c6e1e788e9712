//! Accumulation state of the current window

use std::hash::Hash;

use crate::join::Joins;
use crate::stream::Key;

/// Root elements and join mappings collected for the current window
///
/// The window key, the root elements and the join mappings only ever change
/// together: [`push`](Self::push) adds to the current window and
/// [`flush`](Self::flush) hands everything out and starts over.
#[derive(Debug, Clone)]
pub struct WindowAccumulator<T> {
    window_key: Option<Key>,
    root_elements: Vec<T>,
    joins: Joins<T>,
}

impl<T> Default for WindowAccumulator<T> {
    fn default() -> Self {
        Self {
            window_key: None,
            root_elements: Vec::new(),
            joins: Joins::default(),
        }
    }
}

impl<T: Eq + Hash> WindowAccumulator<T> {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Key of the current window, if one is established
    pub fn window_key(&self) -> Option<&Key> {
        self.window_key.as_ref()
    }

    /// Establish the key of the current window
    pub fn set_window_key(&mut self, key: Option<Key>) {
        self.window_key = key;
    }

    /// Add a root element and merge its join mappings
    pub fn push(&mut self, root: T, joins: Joins<T>) {
        self.root_elements.push(root);
        self.joins.merge(joins);
    }

    /// Add a root element without join data
    pub fn push_root(&mut self, root: T) {
        self.root_elements.push(root);
    }

    /// Root elements collected so far
    pub fn root_elements(&self) -> &[T] {
        &self.root_elements
    }

    /// Number of collected root elements
    pub fn len(&self) -> usize {
        self.root_elements.len()
    }

    /// Returns true when no root element is collected
    pub fn is_empty(&self) -> bool {
        self.root_elements.is_empty()
    }

    /// Take the collected window and reset all state
    pub fn flush(&mut self) -> (Vec<T>, Joins<T>) {
        self.window_key = None;
        (
            std::mem::take(&mut self.root_elements),
            std::mem::take(&mut self.joins),
        )
    }

    /// Drop all collected state
    pub fn reset(&mut self) {
        self.window_key = None;
        self.root_elements.clear();
        self.joins = Joins::default();
    }
}
