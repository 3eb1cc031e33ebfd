//! An ordered map implemented with an AVL tree, augmented with subtree sizes
//! and supporting rank-based [`split`](AvlTree::split) and
//! [`join`](AvlTree::join).
//!
//! Mutating operations report how much rebalancing work they did. Every
//! changed node height counts as one action, a single rotation as
//! [`SINGLE_ROTATION_ACTIONS`] and a double rotation as
//! [`DOUBLE_ROTATION_ACTIONS`].
//!
//! ```
//! use ranked_avl::AvlTree;
//!
//! let mut small: AvlTree<i32, &str> = (1..=4).map(|k| (k, "small")).collect();
//! let large: AvlTree<i32, &str> = (9..=29).map(|k| (k, "large")).collect();
//!
//! // Cost is the rank difference plus one.
//! let cost = small.join(7, "connector", large);
//! assert_eq!(cost, 3);
//! assert_eq!(small.len(), 26);
//!
//! let (below, above) = small.split(&10);
//! assert_eq!(below.keys().copied().collect::<Vec<_>>(), [1, 2, 3, 4, 7, 9]);
//! assert_eq!(above.len(), 19);
//! ```
//!
//! Every missing child is the one shared external sentinel (height -1,
//! size 0). Nodes are individually allocated and owned by the tree, so split
//! and join relink subtrees in place: their work is bounded by the ranks
//! involved, not by the number of entries.
//!
//! # Features
//!
//! - `consistency_check`: exposes `AvlTree::check_consistency` outside of
//!   tests.

mod balance;
mod error;
mod iter;
mod node;
mod tree;

pub use balance::{DOUBLE_ROTATION_ACTIONS, SINGLE_ROTATION_ACTIONS};
pub use error::Error;
pub use iter::{Iter, Keys, Values};
pub use tree::AvlTree;
