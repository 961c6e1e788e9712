//! Arena-backed join tree

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use super::mapping::{JoinMapping, Joins, ParentChildrenMap};
use crate::error::{MillError, Result};
use crate::stream::{Key, KeyExpr, RawElement, StreamType};
use crate::window::WindowFn;

/// Index of a node in a [`JoinTree`]
pub type NodeId = usize;

/// A stream participating in a join tree
#[derive(Debug, Clone)]
pub struct JoinTreeNode {
    /// Logical stream this node reads
    pub user_type: StreamType,
    /// Window override; only honoured on the root node
    pub window: Option<Arc<dyn WindowFn>>,
}

impl JoinTreeNode {
    /// Create a node without a window
    pub fn new(user_type: impl Into<StreamType>) -> Self {
        Self {
            user_type: user_type.into(),
            window: None,
        }
    }
}

/// Declared relationship between a parent (left) and a child (right) node
#[derive(Clone)]
pub struct JoinPair {
    /// Binding name under which the children reach the callback
    pub name: String,
    /// Parent node
    pub left: NodeId,
    /// Child node
    pub right: NodeId,
    /// Extracts the comparison key from a parent element
    pub left_expression: KeyExpr,
    /// Extracts the comparison key from a child element
    pub right_expression: KeyExpr,
}

impl JoinPair {
    /// Comparison key of a parent element
    pub fn left_key(&self, left: &RawElement) -> Key {
        (self.left_expression)(left)
    }

    /// Comparison key of a child element
    pub fn right_key(&self, right: &RawElement) -> Key {
        (self.right_expression)(right)
    }
}

impl fmt::Debug for JoinPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPair")
            .field("name", &self.name)
            .field("left", &self.left)
            .field("right", &self.right)
            .finish()
    }
}

/// Immutable join tree
///
/// Node [`JoinTree::ROOT`] is the driving stream. Every other node is reached
/// from the root through exactly one pair.
#[derive(Debug, Clone)]
pub struct JoinTree {
    nodes: Vec<JoinTreeNode>,
    pairs: Vec<JoinPair>,
}

impl JoinTree {
    /// Id of the root node
    pub const ROOT: NodeId = 0;

    /// Tree made of a single stream, without joins
    pub fn new(root: impl Into<StreamType>) -> Self {
        Self {
            nodes: vec![JoinTreeNode::new(root)],
            pairs: Vec::new(),
        }
    }

    /// Single-stream tree grouped by a window function
    pub fn windowed(root: impl Into<StreamType>, window: Arc<dyn WindowFn>) -> Self {
        let mut tree = Self::new(root);
        tree.nodes[Self::ROOT].window = Some(window);
        tree
    }

    /// Start building a tree rooted at `root`
    pub fn builder(root: impl Into<StreamType>) -> JoinTreeBuilder {
        JoinTreeBuilder::new(root)
    }

    /// The root node
    pub fn root(&self) -> &JoinTreeNode {
        &self.nodes[Self::ROOT]
    }

    /// Node by id
    ///
    /// # Panics
    /// Panics if `id` was not issued for this tree.
    pub fn node(&self, id: NodeId) -> &JoinTreeNode {
        &self.nodes[id]
    }

    /// All nodes, root first
    pub fn nodes(&self) -> &[JoinTreeNode] {
        &self.nodes
    }

    /// All pairs, in registration order
    pub fn pairs(&self) -> &[JoinPair] {
        &self.pairs
    }

    /// Returns true when the tree declares at least one join
    pub fn has_pairs(&self) -> bool {
        !self.pairs.is_empty()
    }

    /// Pairs whose parent is `node`, in registration order
    pub fn tree_pairs(&self, node: NodeId) -> impl Iterator<Item = &JoinPair> {
        self.pairs.iter().filter(move |pair| pair.left == node)
    }

    /// Derive the per-pair mappings handed to the callback
    ///
    /// Produces one slot per pair, in registration order, mapping every parent
    /// of the pair's left node to its children from the pair's right node.
    pub fn join_data_mapping<T>(&self, parent_children: &ParentChildrenMap<T>) -> Joins<T>
    where
        T: Clone + Eq + Hash,
    {
        let slots = self
            .pairs
            .iter()
            .map(|pair| {
                let mut mapping = JoinMapping::new();
                for (node, parent, children) in parent_children.iter() {
                    if node != pair.left {
                        continue;
                    }
                    let joined: Vec<T> = children
                        .iter()
                        .filter(|(child_node, _)| *child_node == pair.right)
                        .map(|(_, child)| child.clone())
                        .collect();
                    if !joined.is_empty() {
                        mapping.insert(parent.clone(), joined);
                    }
                }
                (pair.name.clone(), mapping)
            })
            .collect();

        Joins::new(slots)
    }

    /// Every stream read by the tree
    pub fn stream_types(&self) -> BTreeSet<StreamType> {
        self.nodes.iter().map(|node| node.user_type.clone()).collect()
    }

    /// Check that a broker carries every stream of the tree
    pub fn validate_against(&self, known: &BTreeSet<StreamType>) -> Result<()> {
        let missing: Vec<String> = self
            .stream_types()
            .into_iter()
            .filter(|stream| !known.contains(stream))
            .map(|stream| stream.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(MillError::configuration(format!(
                "join tree reads streams unknown to the broker: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Serializable description of the tree, for diagnostics
    pub fn describe(&self) -> JoinTreeDescription {
        JoinTreeDescription {
            root: self.root().user_type.clone(),
            nodes: self
                .nodes
                .iter()
                .enumerate()
                .map(|(id, node)| NodeDescription {
                    id,
                    stream: node.user_type.clone(),
                    windowed: node.window.is_some(),
                })
                .collect(),
            pairs: self
                .pairs
                .iter()
                .map(|pair| PairDescription {
                    name: pair.name.clone(),
                    left: pair.left,
                    right: pair.right,
                })
                .collect(),
        }
    }
}

/// Builder for [`JoinTree`]
///
/// Every call to [`JoinTreeBuilder::join`] adds one child node and the pair
/// linking it to an existing parent, returning the new node's id.
#[derive(Debug)]
pub struct JoinTreeBuilder {
    nodes: Vec<JoinTreeNode>,
    pairs: Vec<JoinPair>,
    errors: Vec<String>,
}

impl JoinTreeBuilder {
    /// Create a builder rooted at `root`
    pub fn new(root: impl Into<StreamType>) -> Self {
        Self {
            nodes: vec![JoinTreeNode::new(root)],
            pairs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Group root elements with a window function
    pub fn root_window(mut self, window: Arc<dyn WindowFn>) -> Self {
        self.nodes[JoinTree::ROOT].window = Some(window);
        self
    }

    /// Join `child` onto the node `parent`
    ///
    /// `left` extracts the key from parent elements, `right` from child
    /// elements; children whose key equals the parent's are attached.
    pub fn join(
        &mut self,
        name: impl Into<String>,
        parent: NodeId,
        child: impl Into<StreamType>,
        left: KeyExpr,
        right: KeyExpr,
    ) -> NodeId {
        let name = name.into();
        if parent >= self.nodes.len() {
            self.errors
                .push(format!("join '{}' refers to unknown parent node {}", name, parent));
        }

        let id = self.nodes.len();
        self.nodes.push(JoinTreeNode::new(child));
        self.pairs.push(JoinPair {
            name,
            left: parent,
            right: id,
            left_expression: left,
            right_expression: right,
        });
        id
    }

    /// Validate and build the tree
    pub fn build(mut self) -> Result<JoinTree> {
        let mut seen = HashSet::new();
        for pair in &self.pairs {
            if pair.name.is_empty() {
                self.errors.push("join names must not be empty".to_string());
            } else if !seen.insert(pair.name.as_str()) {
                self.errors.push(format!("duplicate join name '{}'", pair.name));
            }
        }

        if !self.errors.is_empty() {
            return Err(MillError::configuration(self.errors.join("; ")));
        }

        Ok(JoinTree {
            nodes: self.nodes,
            pairs: self.pairs,
        })
    }
}

/// Serializable view of a join tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTreeDescription {
    /// Root stream
    pub root: StreamType,
    /// Nodes, root first
    pub nodes: Vec<NodeDescription>,
    /// Pairs, in registration order
    pub pairs: Vec<PairDescription>,
}

/// Serializable view of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: NodeId,
    pub stream: StreamType,
    pub windowed: bool,
}

/// Serializable view of a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairDescription {
    pub name: String,
    pub left: NodeId,
    pub right: NodeId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::field;
    use crate::window::FieldWindow;

    fn order_tree() -> JoinTree {
        let mut builder = JoinTree::builder("orders");
        let payments = builder.join(
            "payments",
            JoinTree::ROOT,
            "payments",
            field("/order_id"),
            field("/order_id"),
        );
        builder.join(
            "shipments",
            JoinTree::ROOT,
            "shipments",
            field("/order_id"),
            field("/order_id"),
        );
        builder.join(
            "refunds",
            payments,
            "refunds",
            field("/payment_id"),
            field("/payment_id"),
        );
        builder.build().unwrap()
    }

    #[test]
    fn test_single_stream_tree_has_no_pairs() {
        let tree = JoinTree::new("ticks");
        assert!(!tree.has_pairs());
        assert_eq!(tree.tree_pairs(JoinTree::ROOT).count(), 0);
        assert_eq!(tree.root().user_type, StreamType::from("ticks"));
    }

    #[test]
    fn test_tree_pairs_in_registration_order() {
        let tree = order_tree();
        let names: Vec<&str> = tree
            .tree_pairs(JoinTree::ROOT)
            .map(|pair| pair.name.as_str())
            .collect();
        assert_eq!(names, vec!["payments", "shipments"]);

        let nested: Vec<&str> = tree.tree_pairs(1).map(|pair| pair.name.as_str()).collect();
        assert_eq!(nested, vec!["refunds"]);
        assert_eq!(tree.tree_pairs(2).count(), 0);
    }

    #[test]
    fn test_duplicate_join_names_rejected() {
        let mut builder = JoinTree::builder("orders");
        builder.join("p", JoinTree::ROOT, "payments", field("/id"), field("/id"));
        builder.join("p", JoinTree::ROOT, "shipments", field("/id"), field("/id"));
        assert!(matches!(builder.build(), Err(MillError::Configuration { .. })));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut builder = JoinTree::builder("orders");
        builder.join("p", 7, "payments", field("/id"), field("/id"));
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("unknown parent node 7"));
    }

    #[test]
    fn test_join_data_mapping_per_pair() {
        let tree = order_tree();
        let mut map = ParentChildrenMap::new();
        map.attach(JoinTree::ROOT, &"o1", 1, "p1");
        map.attach(JoinTree::ROOT, &"o1", 1, "p2");
        map.attach(JoinTree::ROOT, &"o1", 2, "s1");
        map.attach(1, &"p1", 3, "r1");

        let joins = tree.join_data_mapping(&map);
        assert_eq!(joins.names().collect::<Vec<_>>(), vec!["payments", "shipments", "refunds"]);
        assert_eq!(joins.children_of("payments", &"o1"), &["p1", "p2"]);
        assert_eq!(joins.children_of("shipments", &"o1"), &["s1"]);
        assert_eq!(joins.children_of("refunds", &"p1"), &["r1"]);
        assert!(joins.children_of("refunds", &"p2").is_empty());
    }

    #[test]
    fn test_validate_against_known_streams() {
        let tree = order_tree();
        let mut known: BTreeSet<StreamType> =
            ["orders", "payments", "shipments"].into_iter().map(StreamType::from).collect();

        let err = tree.validate_against(&known).unwrap_err();
        assert!(err.to_string().contains("refunds"));

        known.insert(StreamType::from("refunds"));
        assert!(tree.validate_against(&known).is_ok());
    }

    #[test]
    fn test_describe() {
        let tree = JoinTree::builder("orders")
            .root_window(Arc::new(FieldWindow::new("/day")))
            .build()
            .unwrap();
        let description = tree.describe();

        assert_eq!(description.root, StreamType::from("orders"));
        assert!(description.nodes[0].windowed);
        assert!(description.pairs.is_empty());

        let description = order_tree().describe();
        assert_eq!(description.pairs[2].left, 1);
        assert_eq!(description.pairs[2].right, 3);
    }
}
