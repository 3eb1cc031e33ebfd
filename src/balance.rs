//! Rotations, rebalancing and the rank-based join of detached subtrees.
//!
//! Everything here works on node handles and never touches a tree's root
//! reference. A rotation at a node without a parent produces a new subtree
//! root without a parent; the upward walk in [`Handle::retrace`] reports the
//! topmost node it reached so the owning tree can adopt it.

use std::cmp;

use tracing::trace;

use crate::node::{Handle, Side};

/// Actions reported for a single rotation: one rotation plus one promotion.
pub const SINGLE_ROTATION_ACTIONS: usize = 2;

/// Actions reported for a double rotation: two rotations plus up to three
/// promotions.
pub const DOUBLE_ROTATION_ACTIONS: usize = 5;

impl<K, V> Handle<K, V> {
    /// `height(left) - height(right)`; zero for the sentinel.
    #[inline]
    pub(crate) fn balance(self) -> isize {
        if self.is_external() {
            return 0;
        }
        self.left().height() - self.right().height()
    }

    /// Repoints whichever link of `parent` refers to `old` at `new`.
    ///
    /// `new`'s parent link is not touched. Does nothing when `parent` is `None`.
    pub(crate) fn replace_child(parent: Option<Self>, old: Self, new: Self) {
        let Some(parent) = parent else {
            return;
        };

        if parent.left() == old {
            parent.set_child(Side::Left, new);
        } else {
            debug_assert_eq!(parent.right(), old, "`old` is not a child of `parent`");
            parent.set_child(Side::Right, new);
        }
    }

    /// Re-derives the height from the children. Returns whether it changed.
    pub(crate) fn update_height(self) -> bool {
        let height = 1 + cmp::max(self.left().height(), self.right().height());
        let changed = height != self.height();
        self.set_height(height);
        changed
    }

    pub(crate) fn update_size(self) {
        self.set_size(self.left().size() + self.right().size() + 1);
    }

    pub(crate) fn rotate_left(self) -> Self {
        self.rotate(Side::Left)
    }

    pub(crate) fn rotate_right(self) -> Self {
        self.rotate(Side::Right)
    }

    // Rotates towards `side`: the child on the opposite side is promoted and its
    // inner grandchild is re-hung under `self`.
    fn rotate(self, side: Side) -> Self {
        let promoted = self.child(!side);
        debug_assert!(promoted.is_real(), "cannot rotate {side} without a {} child", !side);
        let inner = promoted.child(side);
        let parent = self.parent();

        self.set_child(!side, inner);
        inner.set_parent(Some(self));

        promoted.set_child(side, self);
        promoted.set_parent(parent);
        Self::replace_child(parent, self, promoted);
        self.set_parent(Some(promoted));

        // Lower node first, the upper one depends on it.
        self.update_height();
        self.update_size();
        promoted.update_height();
        promoted.update_size();

        trace!(%side, height = promoted.height(), "rotated");
        promoted
    }

    /// Restores the AVL condition at this node if it is violated.
    ///
    /// Returns [`SINGLE_ROTATION_ACTIONS`] or [`DOUBLE_ROTATION_ACTIONS`]
    /// depending on the rotation performed, or zero.
    pub(crate) fn rebalance(self) -> usize {
        let balance = self.balance();
        if balance > 1 {
            let left = self.left();
            let actions = if left.balance() < 0 {
                trace!(balance, "left-right case");
                left.rotate_left();
                DOUBLE_ROTATION_ACTIONS
            } else {
                trace!(balance, "left-left case");
                SINGLE_ROTATION_ACTIONS
            };
            self.rotate_right();
            actions
        } else if balance < -1 {
            let right = self.right();
            let actions = if right.balance() > 0 {
                trace!(balance, "right-left case");
                right.rotate_right();
                DOUBLE_ROTATION_ACTIONS
            } else {
                trace!(balance, "right-right case");
                SINGLE_ROTATION_ACTIONS
            };
            self.rotate_left();
            actions
        } else {
            0
        }
    }

    /// Walks from this node up to the topmost ancestor, rebalancing and
    /// refreshing height and size at every step.
    ///
    /// Returns the topmost node reached (the new root of the subtree) and the
    /// counted actions: rebalance actions plus one per changed height.
    pub(crate) fn retrace(self) -> (Self, usize) {
        let mut node = self;
        let mut actions = 0;
        loop {
            actions += node.rebalance();
            if node.update_height() {
                actions += 1;
            }
            node.update_size();

            match node.parent() {
                Some(parent) => node = parent,
                None => return (node, actions),
            }
        }
    }

    /// Joins two detached subtrees through `connector`.
    ///
    /// All keys under `left` must be smaller than the connector's key, all keys
    /// under `right` larger. Either side may be the sentinel. `connector` must
    /// be a detached leaf. Returns the root of the joined subtree and the
    /// actions counted while retracing.
    ///
    /// Only the spine of the taller side is walked, so the work is bounded by
    /// the rank difference plus the retrace above the connector.
    pub(crate) fn join(left: Self, connector: Self, right: Self) -> (Self, usize) {
        debug_assert!(left.parent().is_none() && right.parent().is_none());
        debug_assert!(connector.is_leaf());

        // `low` hangs off the `spine` side of the connector.
        let (low, high, spine) = if left.height() <= right.height() {
            (left, right, Side::Left)
        } else {
            (right, left, Side::Right)
        };

        let mut attach = high;
        let mut parent = None;
        let mut depth = 0usize;
        while attach.height() > low.height() {
            parent = Some(attach);
            attach = attach.child(spine);
            depth += 1;
        }
        trace!(%spine, depth, rank = low.height(), "found join point");

        connector.set_child(spine, low);
        connector.set_child(!spine, attach);
        connector.set_parent(parent);
        low.set_parent(Some(connector));
        attach.set_parent(Some(connector));
        connector.update_height();
        connector.update_size();

        match parent {
            None => (connector, 0),
            Some(parent) => {
                parent.set_child(spine, connector);
                connector.retrace()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Builds the complete tree over `keys` laid out as an implicit heap
    // (children of slot `i` are `2i + 1` and `2i + 2`) and returns the handles
    // in heap order. Heights and sizes are derived bottom-up.
    fn heap(keys: &[i32]) -> Vec<Handle<i32, ()>> {
        let handles: Vec<Handle<i32, ()>> = keys.iter().map(|&k| Handle::create(k, ())).collect();
        for i in 1..handles.len() {
            let parent = handles[(i - 1) / 2];
            handles[i].set_parent(Some(parent));
            let side = if i % 2 == 1 { Side::Left } else { Side::Right };
            parent.set_child(side, handles[i]);
        }
        for &h in handles.iter().rev() {
            h.update_height();
            h.update_size();
        }
        handles
    }

    fn free(handles: &[Handle<i32, ()>]) {
        for handle in handles {
            handle.destroy();
        }
    }

    #[test]
    fn rotate_right_then_left() {
        // Keys only matter for shape bookkeeping here, not for order.
        let a = heap(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

        let root = a[0].rotate_right();
        assert_eq!(root, a[1]);
        assert_eq!(a[0].parent(), Some(a[1]));
        assert_eq!(a[1].parent(), None);
        assert_eq!(a[0].left(), a[4]);
        assert_eq!(a[4].parent(), Some(a[0]));
        assert_eq!(a[1].size(), 10);
        assert_eq!(a[0].size(), 10 - 1 - a[3].size());

        let root = root.rotate_left();
        assert_eq!(root, a[0]);
        assert_eq!(a[1].parent(), Some(a[0]));
        assert_eq!(a[0].parent(), None);
        assert_eq!(a[1].right(), a[4]);
        assert_eq!(a[4].parent(), Some(a[1]));
        assert_eq!(a[0].size(), 10);
        assert_eq!(a[0].height(), 3);
        free(&a);
    }

    #[test]
    fn rotation_repoints_parent_link() {
        let a = heap(&[10, 5, 20, 2, 7]);

        // Rotate the left subtree (5) right; 10 must now point at 2.
        let top = a[1].rotate_right();
        assert_eq!(top, a[3]);
        assert_eq!(a[0].left(), a[3]);
        assert_eq!(a[3].parent(), Some(a[0]));
        assert_eq!(a[3].right(), a[1]);
        assert_eq!(a[3].size(), 3);
        // The sentinel stays untouched.
        let external = Handle::<i32, ()>::external();
        assert_eq!(external.height(), -1);
        assert_eq!(external.size(), 0);
        assert_eq!(external.parent(), None);
        free(&a);
    }

    #[test]
    fn rebalance_weights() {
        // Left-left chain: 3 <- 2 <- 1.
        let three = Handle::create(3, ());
        let two = Handle::create(2, ());
        let one = Handle::create(1, ());
        three.set_child(Side::Left, two);
        two.set_parent(Some(three));
        two.set_child(Side::Left, one);
        one.set_parent(Some(two));
        two.update_height();
        two.update_size();
        three.update_height();
        three.update_size();

        assert_eq!(three.rebalance(), SINGLE_ROTATION_ACTIONS);
        assert_eq!(two.parent(), None);
        assert_eq!((two.left(), two.right()), (one, three));
        free(&[one, two, three]);

        // Left-right chain: 3 <- 1 -> 2.
        let three = Handle::create(3, ());
        let one = Handle::create(1, ());
        let two = Handle::create(2, ());
        three.set_child(Side::Left, one);
        one.set_parent(Some(three));
        one.set_child(Side::Right, two);
        two.set_parent(Some(one));
        one.update_height();
        one.update_size();
        three.update_height();
        three.update_size();

        assert_eq!(three.rebalance(), DOUBLE_ROTATION_ACTIONS);
        assert_eq!(two.parent(), None);
        assert_eq!((two.left(), two.right()), (one, three));
        assert_eq!(two.height(), 1);
        assert_eq!(two.size(), 3);
        free(&[one, two, three]);
    }

    #[test]
    fn balanced_node_is_untouched() {
        let a = heap(&[2, 1, 3]);
        assert_eq!(a[0].rebalance(), 0);
        assert_eq!(a[1].retrace(), (a[0], 0));
        assert_eq!(Handle::<i32, ()>::external().balance(), 0);
        free(&a);
    }

    #[test]
    fn join_with_empty_sides() {
        let external = Handle::external();
        let x = Handle::create(5, ());
        let (root, actions) = Handle::join(external, x, external);
        assert_eq!((root, actions), (x, 0));
        assert_eq!(x.height(), 0);
        assert_eq!(x.size(), 1);

        // An empty right side hangs the connector off the right spine.
        let y = Handle::create(6, ());
        let (root, actions) = Handle::join(x, y, external);
        assert_eq!(root, x);
        assert_eq!(actions, 1);
        assert_eq!(x.right(), y);
        assert_eq!(y.parent(), Some(x));
        assert_eq!(x.size(), 2);
        assert_eq!(x.height(), 1);
        free(&[x, y]);
    }

    #[test]
    fn join_descends_taller_spine() {
        // Right side: perfect tree over 10..=16, height 2.
        let right = heap(&[13, 11, 15, 10, 12, 14, 16]);
        let left = Handle::create(1, ());
        let x = Handle::create(5, ());

        let (root, _) = Handle::join(left, x, right[0]);
        assert_eq!(root, right[0]);
        // Connector takes the place of 10, the first node on the left spine
        // whose height does not exceed the left side's rank.
        assert_eq!(right[1].left(), x);
        assert_eq!(x.left(), left);
        assert_eq!(x.right(), right[3]);
        assert_eq!(root.size(), 9);
        assert_eq!(root.height(), 3);
        assert_eq!(root.balance(), 1);
        free(&right);
        free(&[left, x]);
    }
}
