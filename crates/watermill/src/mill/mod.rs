//! The join engine
//!
//! A [`WaterMill`] drives one root stream. Every root element is joined with
//! its children along the [`JoinTree`], optionally collected into a window, and
//! handed to the processing callback. Results are published to the declared
//! return stream and the input position is committed after every invocation.
//!
//! ```text
//!   pull root ──► join children ──► accumulate window ──► invoke
//!       ▲                                                   │
//!       └──────────── commit ◄──── publish results ◄────────┘
//! ```
//!
//! Without a declared return stream the mill runs in acknowledgement mode:
//! the callback completes each data key through [`MillHandle::save_results`],
//! and end-of-stream reaches the explicit return streams only once every
//! outstanding key has been acknowledged.

pub mod handle;
pub mod stats;

pub use handle::{MillHandle, SaveData};
pub use stats::MillStats;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::broker::{MessageBroker, Pull};
use crate::codec::{Codecs, Deserializers, RecordDeserializer, RecordSerializer};
use crate::compare::{join_comparator, window_comparator};
use crate::config::{MillSettings, RanAheadPolicy};
use crate::context::ProcessContext;
use crate::error::{MillError, Result};
use crate::join::{JoinTree, Joins, NodeId, ParentChildrenMap};
use crate::process::{collect_results, ProcessFn, ProcessOutput, Roots};
use crate::stream::{DataKey, RawElement, Record, StreamType};
use crate::window::{WindowAccumulator, WindowFn};

/// Result of walking the join tree for one parent element
#[derive(Debug, Clone, PartialEq)]
enum JoinOutcome {
    Complete,
    RanAhead(StreamType),
    EndOfStream,
}

/// Stream-join and windowed-processing engine
pub struct WaterMill<T, O> {
    id: Uuid,
    tree: JoinTree,
    process: Box<dyn ProcessFn<T, O>>,
    deserializers: Deserializers<T>,
    return_type: Option<StreamType>,
    settings: MillSettings,
    input: Arc<dyn MessageBroker>,
    handle: MillHandle<O>,
}

impl<T, O> WaterMill<T, O>
where
    T: Record,
    O: Serialize + Send + Sync + 'static,
{
    /// Start building a mill reading from `broker`
    pub fn builder<B>(broker: Arc<B>) -> WaterMillBuilder<T, O>
    where
        B: MessageBroker + 'static,
    {
        WaterMillBuilder::new(broker)
    }
}

impl<T, O> WaterMill<T, O>
where
    T: Record,
    O: Send + Sync + 'static,
{
    /// Mill id, also recorded on the `water_mill` tracing span
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Join tree driven by this mill
    pub fn join_tree(&self) -> &JoinTree {
        &self.tree
    }

    /// Declared return stream, if any
    pub fn return_type(&self) -> Option<&StreamType> {
        self.return_type.as_ref()
    }

    /// Handle for completing results out of band
    pub fn handle(&self) -> MillHandle<O> {
        self.handle.clone()
    }

    /// Run until the root stream ends or processing asks to stop
    pub async fn run(&mut self) -> Result<MillStats> {
        let span = info_span!(
            "water_mill",
            mill_id = %self.id,
            root = %self.tree.root().user_type,
        );
        self.run_loop().instrument(span).await
    }

    async fn run_loop(&mut self) -> Result<MillStats> {
        let root = self.tree.root().user_type.clone();
        let window = self.tree.root().window.clone();
        let mut stats = MillStats::new();
        let mut accumulator: WindowAccumulator<T> = WindowAccumulator::new();
        let mut results: Vec<O> = Vec::new();
        let mut current_key: Option<DataKey> = None;

        info!(
            windowed = window.is_some(),
            pairs = self.tree.pairs().len(),
            return_type = ?self.return_type,
            "water mill started"
        );

        loop {
            let mut eos = false;
            let mut invoked = false;

            let comparator = window
                .as_ref()
                .map(|window| window_comparator(accumulator.window_key().cloned(), window.clone()));
            let pull = self.input.get_elements(&root, comparator).next().await?;

            match pull {
                Pull::Element(raw) => {
                    stats.inc_roots_pulled();
                    current_key = self.input.get_data_key().await;
                    let root_element = self.deserializers.deserialize(&root, &raw)?;

                    let mut joins = Joins::empty();
                    if self.tree.has_pairs() {
                        let mut parent_children = ParentChildrenMap::new();
                        let outcome = self
                            .join_children(JoinTree::ROOT, &raw, &root_element, &mut parent_children)
                            .await?;
                        stats.add_children_joined(parent_children.len() as u64);

                        match outcome {
                            JoinOutcome::Complete => {
                                if current_key.is_some() {
                                    current_key = self.input.get_data_key().await;
                                }
                            }
                            JoinOutcome::RanAhead(stream) => {
                                if window.is_none() {
                                    match self.settings.ran_ahead_policy {
                                        RanAheadPolicy::SkipRoot => {
                                            warn!(stream = %stream, "joined stream ran ahead, skipping root element");
                                            stats.inc_roots_skipped();
                                            continue;
                                        }
                                        RanAheadPolicy::ProcessPartial => {
                                            debug!(stream = %stream, "joined stream ran ahead, processing partial join");
                                        }
                                    }
                                }
                            }
                            JoinOutcome::EndOfStream => {
                                self.handle.mark_eos();
                                if !parent_children.is_empty() {
                                    eos = true;
                                } else if let Some(return_type) = &self.return_type {
                                    debug!("joined stream ended before any child was attached");
                                    self.handle.output().send_eos(return_type).await?;
                                    self.commit(&mut stats).await?;
                                    info!("water mill stopped");
                                    return Ok(stats);
                                } else if !self.handle.explicit_return_types().is_empty()
                                    && self.handle.close_input().await?
                                {
                                    info!("water mill stopped");
                                    return Ok(stats);
                                }
                            }
                        }

                        joins = self.tree.join_data_mapping(&parent_children);
                    }

                    match &window {
                        Some(window) => {
                            let window_key = window.window_key(Some(&raw))?;
                            accumulator.push(root_element, joins);
                            accumulator.set_window_key(Some(window_key));
                            if !eos {
                                continue;
                            }

                            self.look_ahead(&root, window, &mut accumulator, &mut stats).await;
                            eos |= self.flush_window(&mut accumulator, &current_key, &mut results, &mut stats)?;
                        }
                        None => {
                            eos |= self.invoke(
                                Roots::One(root_element),
                                joins,
                                &current_key,
                                &mut results,
                                &mut stats,
                            )?;
                        }
                    }
                    invoked = true;
                }
                Pull::RanAhead(_) | Pull::Exhausted => {
                    if !accumulator.is_empty() {
                        debug!(roots = accumulator.len(), "root stream left the current window");
                        eos |= self.flush_window(&mut accumulator, &current_key, &mut results, &mut stats)?;
                        invoked = true;
                    }
                    accumulator.reset();
                }
                Pull::Timeout => {
                    stats.inc_timeouts();
                    if let Some(window) = &window {
                        let now_key = window.window_key(None)?;
                        let moved_on = accumulator
                            .window_key()
                            .map_or(false, |current| *current != now_key);
                        if moved_on && !accumulator.is_empty() {
                            debug!(roots = accumulator.len(), "window closed by timeout");
                            eos |= self.flush_window(&mut accumulator, &current_key, &mut results, &mut stats)?;
                            accumulator.set_window_key(Some(now_key));
                            invoked = true;
                        }
                    }
                }
                Pull::EndOfStream => {
                    if !accumulator.is_empty() {
                        debug!(roots = accumulator.len(), "flushing final window");
                        self.flush_window(&mut accumulator, &current_key, &mut results, &mut stats)?;
                        self.emit(&mut results, &mut stats).await?;
                    }

                    match &self.return_type {
                        Some(return_type) => {
                            self.handle.mark_eos();
                            self.handle.output().send_eos(return_type).await?;
                            self.commit(&mut stats).await?;
                        }
                        None => {
                            if !self.handle.close_input().await? {
                                debug!(
                                    pending = self.handle.pending_keys().len(),
                                    "root stream ended, waiting for acknowledgements"
                                );
                            }
                        }
                    }
                    info!(?stats, "water mill stopped at end of root stream");
                    return Ok(stats);
                }
            }

            if invoked {
                if let Some(return_type) = &self.return_type {
                    if results.is_empty() && !eos {
                        return Err(MillError::MissingResult {
                            stream: return_type.clone(),
                        });
                    }
                    self.emit(&mut results, &mut stats).await?;
                    self.commit(&mut stats).await?;
                } else {
                    self.emit(&mut results, &mut stats).await?;
                }
            }

            if eos || self.handle.is_eos() {
                match &self.return_type {
                    Some(return_type) => {
                        self.handle.mark_eos();
                        self.handle.output().send_eos(return_type).await?;
                        self.commit(&mut stats).await?;
                    }
                    None => {
                        self.handle.close_input().await?;
                    }
                }
                info!(?stats, "water mill stopped");
                return Ok(stats);
            }
        }
    }

    /// Walk the pairs below `node`, attaching children depth-first
    fn join_children<'a>(
        &'a self,
        node: NodeId,
        left_raw: &'a RawElement,
        left: &'a T,
        parent_children: &'a mut ParentChildrenMap<T>,
    ) -> BoxFuture<'a, Result<JoinOutcome>> {
        async move {
            let mut ended = false;

            for pair in self.tree.tree_pairs(node) {
                let right_stream = &self.tree.node(pair.right).user_type;
                let comparator = join_comparator(pair.left_key(left_raw), pair.right_expression.clone());
                let mut cursor = self.input.get_elements(right_stream, Some(comparator));

                loop {
                    match cursor.next().await? {
                        Pull::Element(raw) => {
                            let child = self.deserializers.deserialize(right_stream, &raw)?;
                            parent_children.attach(node, left, pair.right, child.clone());

                            match self.join_children(pair.right, &raw, &child, parent_children).await? {
                                JoinOutcome::Complete => {}
                                JoinOutcome::EndOfStream => {
                                    ended = true;
                                    break;
                                }
                                ran_ahead @ JoinOutcome::RanAhead(_) => return Ok(ran_ahead),
                            }
                        }
                        Pull::RanAhead(stream) => return Ok(JoinOutcome::RanAhead(stream)),
                        Pull::EndOfStream => {
                            debug!(pair = %pair.name, stream = %right_stream, "joined stream ended");
                            ended = true;
                            break;
                        }
                        Pull::Exhausted | Pull::Timeout => break,
                    }
                }
            }

            Ok(if ended {
                JoinOutcome::EndOfStream
            } else {
                JoinOutcome::Complete
            })
        }
        .boxed()
    }

    /// Collect further root elements of the current window before a final flush
    ///
    /// Failures end the look-ahead and are only logged.
    async fn look_ahead(
        &self,
        root: &StreamType,
        window: &Arc<dyn WindowFn>,
        accumulator: &mut WindowAccumulator<T>,
        stats: &mut MillStats,
    ) {
        loop {
            let comparator = window_comparator(accumulator.window_key().cloned(), window.clone());
            let pull = match self.input.get_elements(root, Some(comparator)).next().await {
                Ok(pull) => pull,
                Err(err) => {
                    warn!(error = %err, "look-ahead pull failed");
                    return;
                }
            };

            let Pull::Element(raw) = pull else {
                return;
            };
            match self.deserializers.deserialize(root, &raw) {
                Ok(element) => {
                    stats.inc_roots_pulled();
                    accumulator.push_root(element);
                }
                Err(err) => {
                    warn!(error = %err, "look-ahead element could not be decoded");
                    return;
                }
            }
        }
    }

    fn flush_window(
        &self,
        accumulator: &mut WindowAccumulator<T>,
        current_key: &Option<DataKey>,
        results: &mut Vec<O>,
        stats: &mut MillStats,
    ) -> Result<bool> {
        let (roots, joins) = accumulator.flush();
        stats.inc_windows_flushed();
        debug!(roots = roots.len(), "window flushed");
        self.invoke(Roots::Window(roots), joins, current_key, results, stats)
    }

    /// Invoke the callback; returns true when it asked to stop
    fn invoke(
        &self,
        roots: Roots<T>,
        joins: Joins<T>,
        current_key: &Option<DataKey>,
        results: &mut Vec<O>,
        stats: &mut MillStats,
    ) -> Result<bool> {
        if self.return_type.is_none() {
            if let Some(data_key) = current_key {
                self.handle.track(data_key);
            }
        }

        let ctx = ProcessContext::new(current_key.clone(), self.handle.clone());
        stats.inc_invocations();
        let output = self
            .process
            .process(roots, joins, &ctx)
            .map_err(MillError::Process)?;
        Ok(collect_results(output, results))
    }

    /// Publish collected results to the return stream
    async fn emit(&self, results: &mut Vec<O>, stats: &mut MillStats) -> Result<()> {
        let Some(return_type) = &self.return_type else {
            if !results.is_empty() {
                warn!(
                    count = results.len(),
                    "results without a declared return stream are discarded"
                );
                results.clear();
            }
            return Ok(());
        };

        let serializer = self.handle.serializers().get(return_type);
        for result in results.drain(..) {
            let raw = serializer.serialize(&result)?;
            self.handle.output().send(return_type, raw).await?;
            stats.add_results_emitted(1);
        }
        Ok(())
    }

    async fn commit(&self, stats: &mut MillStats) -> Result<()> {
        self.input.commit(None).await?;
        stats.inc_commits();
        Ok(())
    }
}

impl<T, O> std::fmt::Debug for WaterMill<T, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaterMill")
            .field("id", &self.id)
            .field("root", &self.tree.root().user_type)
            .field("return_type", &self.return_type)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Builder for [`WaterMill`]
pub struct WaterMillBuilder<T, O> {
    input: Arc<dyn MessageBroker>,
    output: Option<Arc<dyn MessageBroker>>,
    tree: Option<JoinTree>,
    process: Option<Box<dyn ProcessFn<T, O>>>,
    codecs: Codecs<T, O>,
    return_type: Option<StreamType>,
    explicit_return_types: Vec<StreamType>,
    settings: MillSettings,
}

impl<T, O> WaterMillBuilder<T, O>
where
    T: Record,
    O: Serialize + Send + Sync + 'static,
{
    fn new<B>(broker: Arc<B>) -> Self
    where
        B: MessageBroker + 'static,
    {
        Self {
            input: broker,
            output: None,
            tree: None,
            process: None,
            codecs: Codecs::json(),
            return_type: None,
            explicit_return_types: Vec::new(),
            settings: MillSettings::default(),
        }
    }
}

impl<T, O> WaterMillBuilder<T, O>
where
    T: Record,
    O: Send + Sync + 'static,
{
    /// Drive a single root stream without joins
    pub fn stream(mut self, root: impl Into<StreamType>) -> Self {
        self.tree = Some(JoinTree::new(root));
        self
    }

    /// Drive a single root stream, grouping its elements into windows
    pub fn windowed(mut self, root: impl Into<StreamType>, window: Arc<dyn WindowFn>) -> Self {
        self.tree = Some(JoinTree::windowed(root, window));
        self
    }

    /// Drive a join tree
    pub fn join_tree(mut self, tree: JoinTree) -> Self {
        self.tree = Some(tree);
        self
    }

    /// Processing callback
    pub fn process<F>(mut self, f: F) -> Self
    where
        F: Fn(Roots<T>, Joins<T>, &ProcessContext<O>) -> anyhow::Result<ProcessOutput<O>>
            + Send
            + Sync
            + 'static,
    {
        self.process = Some(Box::new(f));
        self
    }

    /// Processing logic implementing [`ProcessFn`]
    pub fn processor(mut self, processor: impl ProcessFn<T, O> + 'static) -> Self {
        self.process = Some(Box::new(processor));
        self
    }

    /// Publish to a different broker than the one consumed from
    pub fn output_broker<B>(mut self, broker: Arc<B>) -> Self
    where
        B: MessageBroker + 'static,
    {
        self.output = Some(broker);
        self
    }

    /// Stream every synchronous result is published to
    pub fn return_type(mut self, stream: impl Into<StreamType>) -> Self {
        self.return_type = Some(stream.into());
        self
    }

    /// Streams receiving end-of-stream in acknowledgement mode
    pub fn explicit_return_types<I, S>(mut self, streams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StreamType>,
    {
        self.explicit_return_types = streams.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the codec registry
    pub fn codecs(mut self, codecs: Codecs<T, O>) -> Self {
        self.codecs = codecs;
        self
    }

    /// Register a serializer for one output stream
    pub fn serializer<S>(mut self, stream: impl Into<StreamType>, serializer: S) -> Self
    where
        S: RecordSerializer<O> + 'static,
    {
        self.codecs = self.codecs.with_serializer(stream, serializer);
        self
    }

    /// Register a deserializer for one input stream
    pub fn deserializer<D>(mut self, stream: impl Into<StreamType>, deserializer: D) -> Self
    where
        D: RecordDeserializer<T> + 'static,
    {
        self.codecs = self.codecs.with_deserializer(stream, deserializer);
        self
    }

    /// Engine settings
    pub fn settings(mut self, settings: MillSettings) -> Self {
        self.settings = settings;
        self
    }

    /// How a root element is treated when a joined stream ran ahead
    pub fn ran_ahead_policy(mut self, policy: RanAheadPolicy) -> Self {
        self.settings.ran_ahead_policy = policy;
        self
    }

    /// Validate and build the mill
    pub fn build(self) -> Result<WaterMill<T, O>> {
        let tree = self
            .tree
            .ok_or_else(|| MillError::configuration("a root stream or join tree is required"))?;
        let process = self
            .process
            .ok_or_else(|| MillError::configuration("a processing callback is required"))?;

        if self.settings.validate_streams {
            if let Some(known) = self.input.known_streams() {
                tree.validate_against(&known)?;
            }
        }

        let id = Uuid::new_v4();
        let output = self.output.unwrap_or_else(|| self.input.clone());
        let (serializers, deserializers) = self.codecs.into_parts();
        let handle = MillHandle::new(
            id,
            self.input.clone(),
            output,
            serializers,
            self.explicit_return_types,
        );

        debug!(mill_id = %id, root = %tree.root().user_type, "water mill built");

        Ok(WaterMill {
            id,
            tree,
            process,
            deserializers,
            return_type: self.return_type,
            settings: self.settings,
            input: self.input,
            handle,
        })
    }
}
