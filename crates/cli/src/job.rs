//! Job descriptions
//!
//! A job names its streams and the files holding them, the root stream, the
//! joins hanging off it and an optional tumbling window:
//!
//! ```yaml
//! root: orders
//! streams:
//!   orders: orders.jsonl
//!   lines: lines.jsonl
//!   shipments: shipments.jsonl
//! joins:
//!   - name: lines
//!     child: lines
//!     left: /order_id
//!     right: /order_id
//!   - name: shipments
//!     parent: lines
//!     child: shipments
//!     left: /line_id
//!     right: /line_id
//! window:
//!   size_ms: 86400000
//!   time: /created_at
//! return_type: summaries
//! ```
//!
//! Relative file paths are resolved against the directory of the job file.

use chrono::Duration;
use figment::providers::{Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use watermill::join::{JoinTree, NodeId};
use watermill::stream::{field, time_field, KeyExpr};
use watermill::window::TumblingWindow;
use watermill::MillError;

use crate::{CliError, CliResult};

/// A join job over JSON-lines files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSpec {
    /// Stream driving the mill
    pub root: String,

    /// Input file of every stream
    pub streams: BTreeMap<String, PathBuf>,

    /// Joins, parents before their children
    #[serde(default)]
    pub joins: Vec<JoinSpec>,

    /// Tumbling window over the root stream
    #[serde(default)]
    pub window: Option<WindowSpec>,

    /// Stream the results are published to
    #[serde(default = "default_return_type")]
    pub return_type: String,

    /// Output file; stdout when absent
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// One join of a child stream onto a parent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinSpec {
    /// Join name, the key of its children in the output
    pub name: String,

    /// Name of the join whose child is the parent; the root when absent
    #[serde(default)]
    pub parent: Option<String>,

    /// Child stream
    pub child: String,

    /// JSON pointer of the key in parent elements
    pub left: String,

    /// JSON pointer of the key in child elements
    pub right: String,

    /// Compare the keys as timestamps
    #[serde(default)]
    pub time: bool,
}

impl JoinSpec {
    fn key_exprs(&self) -> (KeyExpr, KeyExpr) {
        if self.time {
            (time_field(&self.left), time_field(&self.right))
        } else {
            (field(&self.left), field(&self.right))
        }
    }
}

/// Tumbling window over a timestamp field of the root stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowSpec {
    /// Window size in milliseconds
    pub size_ms: i64,

    /// JSON pointer of the element timestamp
    pub time: String,

    /// Window alignment offset in milliseconds
    #[serde(default)]
    pub offset_ms: i64,
}

impl WindowSpec {
    fn build(&self) -> CliResult<TumblingWindow> {
        let window = TumblingWindow::new(Duration::milliseconds(self.size_ms), self.time.as_str())
            .map_err(MillError::from)?;
        Ok(window.with_offset(Duration::milliseconds(self.offset_ms)))
    }
}

fn default_return_type() -> String {
    "output".to_string()
}

impl JobSpec {
    /// Load and validate a job file
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.is_file() {
            return Err(CliError::NotFound(format!("job file {}", path.display())));
        }

        let mut job: Self = Figment::from(Yaml::file(path)).extract()?;
        if let Some(base) = path.parent() {
            job.resolve_paths(base);
        }
        job.validate()?;
        Ok(job)
    }

    /// Make relative stream and output paths relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for file in self.streams.values_mut() {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        if let Some(output) = self.output.as_mut() {
            if output.is_relative() {
                *output = base.join(&*output);
            }
        }
    }

    /// Check that every referenced stream and parent exists
    pub fn validate(&self) -> CliResult<()> {
        if !self.streams.contains_key(&self.root) {
            return Err(CliError::InvalidJob(format!(
                "root stream '{}' has no input file",
                self.root
            )));
        }

        let mut declared: Vec<&str> = Vec::new();
        for join in &self.joins {
            if !self.streams.contains_key(&join.child) {
                return Err(CliError::InvalidJob(format!(
                    "join '{}' reads stream '{}' which has no input file",
                    join.name, join.child
                )));
            }
            if let Some(parent) = &join.parent {
                if !declared.contains(&parent.as_str()) {
                    return Err(CliError::InvalidJob(format!(
                        "join '{}' refers to parent '{}' which is not declared before it",
                        join.name, parent
                    )));
                }
            }
            declared.push(join.name.as_str());
        }

        if self.return_type.is_empty() {
            return Err(CliError::InvalidJob("return_type must not be empty".to_string()));
        }
        Ok(())
    }

    /// Build the join tree, with the window attached to the root
    pub fn join_tree(&self) -> CliResult<JoinTree> {
        let mut builder = JoinTree::builder(self.root.as_str());
        if let Some(window) = &self.window {
            builder = builder.root_window(Arc::new(window.build()?));
        }

        let mut nodes: HashMap<&str, NodeId> = HashMap::new();
        for join in &self.joins {
            let parent = match &join.parent {
                None => JoinTree::ROOT,
                Some(name) => *nodes.get(name.as_str()).ok_or_else(|| {
                    CliError::InvalidJob(format!("unknown parent join '{}'", name))
                })?,
            };
            let (left, right) = join.key_exprs();
            let node = builder.join(join.name.as_str(), parent, join.child.as_str(), left, right);
            nodes.insert(join.name.as_str(), node);
        }

        Ok(builder.build()?)
    }
}
