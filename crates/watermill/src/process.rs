//! Processing callback contract
//!
//! The callback receives the root element (or the whole window of root
//! elements), the join mappings of every declared pair and a
//! [`ProcessContext`]. Its return value says what to publish:
//!
//! | output | effect |
//! |--------|--------|
//! | [`ProcessOutput::NoResult`] | nothing is published |
//! | [`ProcessOutput::One`] | one result |
//! | [`ProcessOutput::Many`] | results are drained eagerly until a [`Yield::Stop`] |
//! | [`ProcessOutput::Stop`] | no result, the mill winds down |

use crate::context::ProcessContext;
use crate::join::Joins;

/// Root input of one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Roots<T> {
    /// A single root element (no window configured)
    One(T),
    /// Every root element of a window, in arrival order
    Window(Vec<T>),
}

impl<T> Roots<T> {
    /// Root elements as a slice
    pub fn as_slice(&self) -> &[T] {
        match self {
            Roots::One(root) => std::slice::from_ref(root),
            Roots::Window(roots) => roots,
        }
    }

    /// Consume into a vector of root elements
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Roots::One(root) => vec![root],
            Roots::Window(roots) => roots,
        }
    }

    /// Number of root elements
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns true for an empty window
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Returns true when the invocation covers a window
    pub fn is_window(&self) -> bool {
        matches!(self, Roots::Window(_))
    }
}

/// Item produced by a lazy result sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Yield<O> {
    /// A result
    Item(O),
    /// End of the stream; remaining items are not consumed
    Stop,
}

/// Return value of the processing callback
pub enum ProcessOutput<O> {
    /// Nothing to publish
    NoResult,
    /// A single result
    One(O),
    /// A lazy sequence of results
    Many(Box<dyn Iterator<Item = Yield<O>> + Send>),
    /// Stop: the mill publishes end-of-stream and terminates
    Stop,
}

impl<O: Send + 'static> ProcessOutput<O> {
    /// Wrap a sequence of plain results
    pub fn many<I>(results: I) -> Self
    where
        I: IntoIterator<Item = O>,
        I::IntoIter: Send + 'static,
    {
        ProcessOutput::Many(Box::new(results.into_iter().map(Yield::Item)))
    }

    /// Wrap a sequence of yields, which may contain [`Yield::Stop`]
    pub fn yields<I>(yields: I) -> Self
    where
        I: IntoIterator<Item = Yield<O>>,
        I::IntoIter: Send + 'static,
    {
        ProcessOutput::Many(Box::new(yields.into_iter()))
    }
}

impl<O> From<O> for ProcessOutput<O> {
    fn from(result: O) -> Self {
        ProcessOutput::One(result)
    }
}

impl<O> std::fmt::Debug for ProcessOutput<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessOutput::NoResult => f.write_str("NoResult"),
            ProcessOutput::One(_) => f.write_str("One(..)"),
            ProcessOutput::Many(_) => f.write_str("Many(..)"),
            ProcessOutput::Stop => f.write_str("Stop"),
        }
    }
}

/// Append the results of one invocation to `results`
///
/// Returns true when the output asked the mill to stop.
pub fn collect_results<O>(output: ProcessOutput<O>, results: &mut Vec<O>) -> bool {
    match output {
        ProcessOutput::NoResult => false,
        ProcessOutput::One(result) => {
            results.push(result);
            false
        }
        ProcessOutput::Stop => true,
        ProcessOutput::Many(yields) => {
            for item in yields {
                match item {
                    Yield::Item(result) => results.push(result),
                    Yield::Stop => return true,
                }
            }
            false
        }
    }
}

/// User processing logic
pub trait ProcessFn<T, O>: Send + Sync {
    /// Process one root element or one window
    fn process(
        &self,
        roots: Roots<T>,
        joins: Joins<T>,
        ctx: &ProcessContext<O>,
    ) -> anyhow::Result<ProcessOutput<O>>;
}

impl<T, O, F> ProcessFn<T, O> for F
where
    F: Fn(Roots<T>, Joins<T>, &ProcessContext<O>) -> anyhow::Result<ProcessOutput<O>> + Send + Sync,
{
    fn process(
        &self,
        roots: Roots<T>,
        joins: Joins<T>,
        ctx: &ProcessContext<O>,
    ) -> anyhow::Result<ProcessOutput<O>> {
        self(roots, joins, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_no_result() {
        let mut results: Vec<u32> = Vec::new();
        assert!(!collect_results(ProcessOutput::NoResult, &mut results));
        assert!(results.is_empty());
    }

    #[test]
    fn test_collect_one_and_stop() {
        let mut results = Vec::new();
        assert!(!collect_results(ProcessOutput::from(1u32), &mut results));
        assert!(collect_results(ProcessOutput::Stop, &mut results));
        assert_eq!(results, vec![1]);
    }

    #[test]
    fn test_collect_many_drains_eagerly() {
        let mut results = Vec::new();
        assert!(!collect_results(ProcessOutput::many(vec![1u32, 2, 3]), &mut results));
        assert_eq!(results, vec![1, 2, 3]);
    }

    #[test]
    fn test_collect_many_stops_at_sentinel() {
        let mut results = Vec::new();
        let output = ProcessOutput::yields(vec![Yield::Item(1u32), Yield::Stop, Yield::Item(3)]);
        assert!(collect_results(output, &mut results));
        assert_eq!(results, vec![1]);
    }

    #[test]
    fn test_roots_views() {
        let one = Roots::One(5u32);
        assert_eq!(one.as_slice(), &[5]);
        assert!(!one.is_window());

        let window = Roots::Window(vec![1u32, 2]);
        assert_eq!(window.len(), 2);
        assert_eq!(window.into_vec(), vec![1, 2]);
    }
}
