//! Join trees
//!
//! A join tree declares which streams are attached to which, and by which key
//! expressions. It is plain data: the mill walks it depth-first for every root
//! element, pulling matching children of each pair in registration order.
//!
//! ```text
//!            orders (root)
//!            /          \
//!   payments             shipments
//!   (order_id=order_id)  (order_id=order_id)
//!       |
//!   refunds
//!   (payment_id=payment_id)
//! ```
//!
//! The tree is stored as an arena: nodes and pairs live in flat vectors and
//! refer to each other by index. The builder only ever adds a node together
//! with its single incoming pair, so cycles cannot be expressed.
//!
//! # Example
//!
//! ```rust
//! use watermill::join::JoinTree;
//! use watermill::stream::field;
//!
//! let mut builder = JoinTree::builder("orders");
//! let payments = builder.join(
//!     "payments",
//!     JoinTree::ROOT,
//!     "payments",
//!     field("/order_id"),
//!     field("/order_id"),
//! );
//! builder.join("refunds", payments, "refunds", field("/payment_id"), field("/payment_id"));
//! let tree = builder.build().unwrap();
//!
//! assert_eq!(tree.pairs().len(), 2);
//! assert_eq!(tree.tree_pairs(JoinTree::ROOT).count(), 1);
//! ```

pub mod mapping;
pub mod tree;

pub use mapping::{JoinMapping, Joins, ParentChildrenMap};
pub use tree::{
    JoinPair, JoinTree, JoinTreeBuilder, JoinTreeDescription, JoinTreeNode, NodeDescription,
    NodeId, PairDescription,
};
