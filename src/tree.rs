use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

use tracing::{debug, trace};

use crate::error::Error;
use crate::iter::{Iter, Keys, Values};
use crate::node::{Handle, Node, Side};

/// An ordered map implemented with an AVL tree.
///
/// Every node carries the size of its subtree, so node counts of split
/// results are available without traversal. Mutating operations report the
/// number of rebalancing actions they performed.
///
/// ```
/// use ranked_avl::AvlTree;
/// let mut tree = AvlTree::new();
/// assert_eq!(tree.insert(43, "a"), Ok(0));
/// assert_eq!(tree.insert(18, "b"), Ok(1));
/// assert_eq!(tree.insert(22, "c"), Ok(6));
/// assert_eq!(tree.root_key(), Some(&22));
/// assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [18, 22, 43]);
/// ```
pub struct AvlTree<K, V> {
    root: Option<Handle<K, V>>,
    num_nodes: usize,
    marker: PhantomData<Box<Node<K, V>>>,
}

// The tree exclusively owns its nodes, like a `Box`.
unsafe impl<K: Send, V: Send> Send for AvlTree<K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for AvlTree<K, V> {}

#[allow(clippy::enum_variant_names)]
enum Direction {
    FromParent,
    FromLeft,
    FromRight,
}

impl<K, V> AvlTree<K, V> {
    /// Creates an empty tree.
    /// No memory is allocated until the first item is inserted.
    pub fn new() -> Self {
        Self {
            root: None,
            num_nodes: 0,
            marker: PhantomData,
        }
    }

    fn from_parts(root: Handle<K, V>, num_nodes: usize) -> Self {
        debug_assert_eq!(root.size(), num_nodes);
        Self {
            root: root.is_real().then_some(root),
            num_nodes,
            marker: PhantomData,
        }
    }

    /// Returns true if the tree contains no elements.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the number of elements in the tree.
    pub fn len(&self) -> usize {
        self.num_nodes
    }

    /// Returns the height of the root, or -1 if the tree is empty.
    pub fn rank(&self) -> isize {
        self.root_handle().height()
    }

    /// Clears the tree, deallocating all nodes.
    pub fn clear(&mut self) {
        self.postorder(|handle| {
            handle.destroy();
        });
        self.root = None;
        self.num_nodes = 0;
    }

    /// Returns the key stored at the root.
    pub fn root_key(&self) -> Option<&K> {
        self.root.map(|root| root.key())
    }

    /// Returns the entry with the smallest key.
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let first = self.root?.min_subtree();
        Some((first.key(), first.value()))
    }

    /// Returns the entry with the largest key.
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let last = self.root?.max_subtree();
        Some((last.key(), last.value()))
    }

    /// Returns the value of the smallest key.
    pub fn min(&self) -> Option<&V> {
        self.first_key_value().map(|(_, v)| v)
    }

    /// Returns the value of the largest key.
    pub fn max(&self) -> Option<&V> {
        self.last_key_value().map(|(_, v)| v)
    }

    /// Gets an iterator over the entries of the tree, sorted by key.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let first = self.root.map(Handle::min_subtree);
        Iter::new(first, self.num_nodes)
    }

    /// Gets an iterator over the keys of the tree, in sorted order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.iter())
    }

    /// Gets an iterator over the values of the tree, in order by key.
    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self.iter())
    }

    #[inline]
    fn root_handle(&self) -> Handle<K, V> {
        self.root.unwrap_or_else(Handle::external)
    }

    // Hands the node structure over to the caller and leaves the tree empty.
    // Returns the detached root, or the sentinel.
    fn take_root(&mut self) -> Handle<K, V> {
        let root = self.root_handle();
        self.root = None;
        self.num_nodes = 0;
        root
    }

    #[cfg(any(test, feature = "consistency_check"))]
    fn preorder<F: FnMut(Handle<K, V>)>(&self, f: F) {
        self.traverse(f, |_| {});
    }

    fn postorder<F: FnMut(Handle<K, V>)>(&self, f: F) {
        self.traverse(|_| {}, f);
    }

    fn traverse<Pre, Post>(&self, mut preorder: Pre, mut postorder: Post)
    where
        Pre: FnMut(Handle<K, V>),
        Post: FnMut(Handle<K, V>),
    {
        let Some(mut handle) = self.root else {
            return;
        };

        let mut dir = Direction::FromParent;
        loop {
            match dir {
                Direction::FromParent => {
                    preorder(handle);
                    if handle.left().is_real() {
                        handle = handle.left();
                    } else {
                        dir = Direction::FromLeft;
                    }
                }
                Direction::FromLeft => {
                    if handle.right().is_real() {
                        handle = handle.right();
                        dir = Direction::FromParent;
                    } else {
                        dir = Direction::FromRight;
                    }
                }
                Direction::FromRight => {
                    // Post order traversal is used for node destruction,
                    // so the handle is not used after the postorder call.
                    match handle.parent() {
                        Some(parent) => {
                            if parent.left() == handle {
                                dir = Direction::FromLeft;
                            } else {
                                dir = Direction::FromRight;
                            }
                            postorder(handle);
                            handle = parent;
                        }
                        None => {
                            postorder(handle);
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl<K: Ord, V> AvlTree<K, V> {
    /// Returns a reference to the value corresponding to the key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find(key).map(|handle| handle.value())
    }

    /// Returns references to the key-value pair corresponding to the key.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        self.find(key).map(|handle| (handle.key(), handle.value()))
    }

    /// Returns a mutable reference to the value corresponding to the key.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.find(key).map(|handle| handle.value_mut())
    }

    /// Returns true if the tree contains the key.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Inserts a key-value pair into the tree.
    ///
    /// Returns the number of rebalancing actions: one per height change plus
    /// [`SINGLE_ROTATION_ACTIONS`](crate::SINGLE_ROTATION_ACTIONS) or
    /// [`DOUBLE_ROTATION_ACTIONS`](crate::DOUBLE_ROTATION_ACTIONS) per rotation.
    /// If the key is already present the tree is not modified and
    /// [`Error::DuplicateKey`] is returned.
    pub fn insert(&mut self, key: K, value: V) -> Result<usize, Error> {
        let pos = self.find_insert_pos(&key)?;
        let new = Handle::create(key, value);

        let mut actions = 0;
        if let Some((parent, side)) = pos {
            parent.set_child(side, new);
            new.set_parent(Some(parent));
            if parent.update_height() {
                actions += 1;
            }
        }

        let (root, retraced) = new.retrace();
        self.root = Some(root);
        actions += retraced;
        self.num_nodes += 1;

        debug!(actions, rank = self.rank(), len = self.num_nodes, "inserted");
        Ok(actions)
    }

    /// Deletes a key from the tree.
    ///
    /// Returns the number of rebalancing actions, counted as for
    /// [`insert`](AvlTree::insert), or [`Error::KeyNotFound`].
    pub fn delete(&mut self, key: &K) -> Result<usize, Error> {
        self.remove_node(key)
            .map(|(_, _, actions)| actions)
            .ok_or(Error::KeyNotFound)
    }

    /// Removes a key from the tree.
    /// Returns the value at the key if the key was previously in the tree.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_node(key).map(|(_, value, _)| value)
    }

    /// Removes a key from the tree, returning the stored key and value.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        self.remove_node(key).map(|(key, value, _)| (key, value))
    }

    /// Splits the tree around `key`.
    ///
    /// The first tree holds every key smaller than `key`, the second every key
    /// larger. The entry for `key` itself is dropped. Nodes are relinked in
    /// place and only the ancestors of `key` are visited.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not present.
    pub fn split(mut self, key: &K) -> (Self, Self) {
        let Some(pivot) = self.find(key) else {
            panic!("`AvlTree::split()` - pivot key is not present");
        };

        // The nodes now belong to the two halves.
        self.take_root();

        let (mut left, mut right, mut parent) = (pivot.left(), pivot.right(), pivot.parent());
        left.set_parent(None);
        right.set_parent(None);

        // Walk up from the pivot. Every ancestor becomes the connector that
        // joins its far subtree onto the side the pivot was on.
        let mut child = pivot;
        let mut joins = 0usize;
        while let Some(ancestor) = parent {
            let (anc_left, anc_right, next) = (ancestor.left(), ancestor.right(), ancestor.parent());
            ancestor.reset();

            if anc_right == child {
                anc_left.set_parent(None);
                left = Handle::join(anc_left, ancestor, left).0;
            } else {
                debug_assert_eq!(anc_left, child);
                anc_right.set_parent(None);
                right = Handle::join(right, ancestor, anc_right).0;
            }

            joins += 1;
            trace!(joins, "recycled ancestor as connector");
            child = ancestor;
            parent = next;
        }
        pivot.destroy();

        let left_len = left.size();
        let right_len = right.size();
        debug!(joins, left_len, right_len, "split");

        (
            Self::from_parts(left, left_len),
            Self::from_parts(right, right_len),
        )
    }

    /// Joins `other` and the connector entry `key`/`value` into this tree.
    ///
    /// Either tree may be empty. Returns the cost of the join:
    /// `|rank(self) - rank(other)| + 1`, or the rank of the non-empty side plus
    /// one when a side is empty. Only the spine of the taller tree is walked.
    ///
    /// # Panics
    ///
    /// Panics unless every key of one tree is smaller than `key` and every key
    /// of the other tree is larger.
    pub fn join(&mut self, key: K, value: V, mut other: Self) -> usize {
        if self.is_empty() || other.is_empty() {
            if self.is_empty() {
                mem::swap(self, &mut other);
            }
            #[allow(clippy::cast_sign_loss)]
            let cost = (self.rank() + 1) as usize;
            if self.insert(key, value).is_err() {
                panic!("`AvlTree::join()` - connector key is already present");
            }
            debug!(cost, rank = self.rank(), "joined onto an empty side");
            return cost;
        }

        let cost = self.rank().abs_diff(other.rank()) + 1;
        let other_is_left = other.orders_below(&key, self);

        let other_len = other.num_nodes;
        let moved = other.take_root();
        let own = self.root_handle();
        let (left, right) = if other_is_left {
            (moved, own)
        } else {
            (own, moved)
        };

        let connector = Handle::create(key, value);
        let (root, actions) = Handle::join(left, connector, right);
        self.root = Some(root);
        self.num_nodes += other_len + 1;

        debug!(cost, actions, rank = self.rank(), len = self.num_nodes, "joined");
        cost
    }

    // Decides whether `self` lies entirely below `key` and `upper` entirely
    // above it (true), or the reverse (false). Both trees must be non-empty.
    fn orders_below(&self, key: &K, upper: &Self) -> bool {
        let (own_min, own_max) = self.bounds();
        let (upper_min, upper_max) = upper.bounds();
        if own_max < key && key < upper_min {
            true
        } else if upper_max < key && key < own_min {
            false
        } else {
            panic!("`AvlTree::join()` - key ranges are not separated by the connector");
        }
    }

    fn bounds(&self) -> (&K, &K) {
        let root = self.root_handle();
        (root.min_subtree().key(), root.max_subtree().key())
    }

    fn find(&self, key: &K) -> Option<Handle<K, V>> {
        let mut current = self.root_handle();
        while current.is_real() {
            current = match key.cmp(current.key()) {
                Ordering::Equal => return Some(current),
                Ordering::Less => current.left(),
                Ordering::Greater => current.right(),
            };
        }
        None
    }

    // Returns the parent and side to attach a new `key` at, `None` for an
    // empty tree.
    fn find_insert_pos(&self, key: &K) -> Result<Option<(Handle<K, V>, Side)>, Error> {
        let mut pos = None;
        let mut current = self.root_handle();
        while current.is_real() {
            let side = match key.cmp(current.key()) {
                Ordering::Equal => return Err(Error::DuplicateKey),
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
            };
            pos = Some((current, side));
            current = current.child(side);
        }
        Ok(pos)
    }

    fn remove_node(&mut self, key: &K) -> Option<(K, V, usize)> {
        let node = self.find(key)?;

        // A binary node trades entries with its successor, which then becomes
        // the node to unlink. The successor has no left child.
        let target = if node.left().is_real() && node.right().is_real() {
            let successor = node.right().min_subtree();
            node.swap_entries(successor);
            successor
        } else {
            node
        };

        let parent = target.parent();
        self.splice_out(target);
        let (key, value) = target.destroy();

        let mut actions = 0;
        if let Some(parent) = parent {
            if parent.update_height() {
                actions += 1;
            }
            let (root, retraced) = parent.retrace();
            self.root = Some(root);
            actions += retraced;
        }
        self.num_nodes -= 1;

        debug!(actions, rank = self.rank(), len = self.num_nodes, "deleted");
        Some((key, value, actions))
    }

    // Unlinks a leaf or unary node, moving its only child (if any) into its place.
    fn splice_out(&mut self, handle: Handle<K, V>) {
        debug_assert!(handle.left().is_external() || handle.right().is_external());
        let child = if handle.left().is_real() {
            handle.left()
        } else {
            handle.right()
        };
        let parent = handle.parent();

        child.set_parent(parent);
        match parent {
            None => self.root = child.is_real().then_some(child),
            Some(_) => Handle::replace_child(parent, handle, child),
        }
    }

    /// Asserts every structural invariant of the tree.
    ///
    /// Checks search order, AVL balance, heights, subtree sizes, parent links,
    /// the node count and the sentinel. Panics on the first violation.
    #[cfg(any(test, feature = "consistency_check"))]
    pub fn check_consistency(&self) {
        // Check sentinel
        let sentinel = Handle::<K, V>::external();
        assert_eq!(sentinel.height(), -1);
        assert_eq!(sentinel.size(), 0);
        assert_eq!(sentinel.parent(), None);

        // Check root link
        if let Some(root) = self.root {
            assert!(root.is_real());
            assert!(root.parent().is_none());
            assert_eq!(root.size(), self.num_nodes);
        } else {
            assert_eq!(self.num_nodes, 0);
        }

        // Check tree nodes
        let mut num_nodes = 0;
        self.preorder(|handle| {
            // Check link for left child node
            let left = handle.left();
            if left.is_real() {
                assert_eq!(left.parent(), Some(handle));
                assert!(left.key() < handle.key());
            }

            // Check link for right child node
            let right = handle.right();
            if right.is_real() {
                assert_eq!(right.parent(), Some(handle));
                assert!(right.key() > handle.key());
            }

            let left_height = left.height();
            let right_height = right.height();

            // Check height and size
            assert_eq!(handle.height(), 1 + left_height.max(right_height));
            assert_eq!(handle.size(), left.size() + right.size() + 1);

            // Check AVL condition (nearly balance)
            assert!(left_height <= right_height + 1);
            assert!(right_height <= left_height + 1);

            num_nodes += 1;
        });

        // Check number of nodes
        assert_eq!(num_nodes, self.num_nodes);

        // Check global search order
        let mut keys = self.keys();
        if let Some(mut prev) = keys.next() {
            for key in keys {
                assert!(prev < key);
                prev = key;
            }
        }
    }
}

impl<K, V> Drop for AvlTree<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: Clone, V: Clone> Clone for AvlTree<K, V> {
    fn clone(&self) -> Self {
        let Some(root) = self.root else {
            return Self::new();
        };

        // Copy node by node, carrying heights and sizes over unchanged.
        let copy = Handle::create(root.key().clone(), root.value().clone());
        let mut stack = vec![(root, copy)];
        while let Some((from, to)) = stack.pop() {
            to.set_height(from.height());
            to.set_size(from.size());
            for side in [Side::Left, Side::Right] {
                let child = from.child(side);
                if child.is_real() {
                    let new = Handle::create(child.key().clone(), child.value().clone());
                    to.set_child(side, new);
                    new.set_parent(Some(to));
                    stack.push((child, new));
                }
            }
        }
        Self::from_parts(copy, self.num_nodes)
    }
}

impl<K, V> Default for AvlTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for AvlTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a AvlTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Keys that are already present keep their first value.
impl<K: Ord, V> Extend<(K, V)> for AvlTree<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            if self.insert(key, value).is_err() {
                // Duplicate key, the stored value stays.
                continue;
            }
        }
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for AvlTree<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}
