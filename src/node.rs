use std::fmt;
use std::marker::PhantomData;
use std::ops::Not;
use std::ptr::{self, NonNull};

/// Link fields shared by every node, including the external sentinel.
///
/// A real node is a heap-allocated [`Node`] whose first field is its `Links`,
/// so a pointer to one is a pointer to the other.
#[repr(C)]
pub(crate) struct Links {
    height: isize,
    size: usize,
    left: NonNull<Links>,
    right: NonNull<Links>,
    parent: Option<NonNull<Links>>,
}

#[repr(C)]
pub(crate) struct Node<K, V> {
    // Only reached through `Handle`'s pointer.
    #[allow(dead_code)]
    links: Links,
    key: K,
    value: V,
}

struct Sentinel(Links);

// The sentinel is never written to.
unsafe impl Sync for Sentinel {}

// Shared by every tree of every key and value type. Its child links are
// never followed.
static EXTERNAL: Sentinel = Sentinel(Links {
    height: -1,
    size: 0,
    left: NonNull::dangling(),
    right: NonNull::dangling(),
    parent: None,
});

/// Pointer to a node of an [`AvlTree`](crate::AvlTree), or to the sentinel.
///
/// A handle is real exactly when it does not point at the sentinel. Real
/// handles stay valid until the node is destroyed, whichever tree owns it.
#[repr(transparent)]
pub(crate) struct Handle<K, V> {
    ptr: NonNull<Links>,
    marker: PhantomData<NonNull<Node<K, V>>>,
}

impl<K, V> Clone for Handle<K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for Handle<K, V> {}

impl<K, V> PartialEq for Handle<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<K, V> Eq for Handle<K, V> {}

impl<K, V> fmt::Debug for Handle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_external() {
            f.write_str("Handle(EXTERNAL)")
        } else {
            write!(f, "Handle({:p})", self.ptr)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

impl Not for Side {
    type Output = Side;

    fn not(self) -> Self::Output {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => f.write_str("left"),
            Side::Right => f.write_str("right"),
        }
    }
}

impl<K, V> Handle<K, V> {
    #[inline]
    fn from_ptr(ptr: NonNull<Links>) -> Self {
        Self {
            ptr,
            marker: PhantomData,
        }
    }

    /// The external node: height -1, size 0.
    #[inline]
    pub(crate) fn external() -> Self {
        Self::from_ptr(EXTERNAL.ptr())
    }

    #[inline]
    pub(crate) fn is_external(self) -> bool {
        self.ptr == EXTERNAL.ptr()
    }

    #[inline]
    pub(crate) fn is_real(self) -> bool {
        !self.is_external()
    }

    /// Allocates a detached leaf.
    pub(crate) fn create(key: K, value: V) -> Self {
        let boxed = Box::new(Node {
            links: Links {
                height: 0,
                size: 1,
                left: EXTERNAL.ptr(),
                right: EXTERNAL.ptr(),
                parent: None,
            },
            key,
            value,
        });
        Self::from_ptr(NonNull::from(Box::leak(boxed)).cast())
    }

    /// Frees the node and hands back its entry.
    ///
    /// The node must already be unlinked from its neighbours; the handle must
    /// not be used afterwards.
    pub(crate) fn destroy(self) -> (K, V) {
        assert!(self.is_real(), "`Handle::destroy()` - cannot destroy the sentinel!");
        let node = unsafe { Box::from_raw(self.ptr.cast::<Node<K, V>>().as_ptr()) };
        let Node { key, value, .. } = *node;
        (key, value)
    }

    #[inline]
    fn links<'a>(self) -> &'a Links {
        unsafe { &*self.ptr.as_ptr() }
    }

    #[inline]
    fn links_mut<'a>(self) -> &'a mut Links {
        debug_assert!(self.is_real(), "the sentinel is never mutated");
        unsafe { &mut *self.ptr.as_ptr() }
    }

    #[inline]
    fn node<'a>(self) -> &'a Node<K, V> {
        debug_assert!(self.is_real(), "external node has no entry");
        unsafe { &*self.ptr.cast::<Node<K, V>>().as_ptr() }
    }

    #[inline]
    pub(crate) fn height(self) -> isize {
        self.links().height
    }

    #[inline]
    pub(crate) fn set_height(self, height: isize) {
        self.links_mut().height = height;
    }

    #[inline]
    pub(crate) fn size(self) -> usize {
        self.links().size
    }

    #[inline]
    pub(crate) fn set_size(self, size: usize) {
        self.links_mut().size = size;
    }

    #[inline]
    pub(crate) fn left(self) -> Self {
        debug_assert!(self.is_real(), "the sentinel has no children to follow");
        Self::from_ptr(self.links().left)
    }

    #[inline]
    pub(crate) fn right(self) -> Self {
        debug_assert!(self.is_real(), "the sentinel has no children to follow");
        Self::from_ptr(self.links().right)
    }

    #[inline]
    pub(crate) fn child(self, side: Side) -> Self {
        match side {
            Side::Left => self.left(),
            Side::Right => self.right(),
        }
    }

    #[inline]
    pub(crate) fn set_child(self, side: Side, child: Self) {
        let links = self.links_mut();
        match side {
            Side::Left => links.left = child.ptr,
            Side::Right => links.right = child.ptr,
        }
    }

    #[inline]
    pub(crate) fn parent(self) -> Option<Self> {
        self.links().parent.map(Self::from_ptr)
    }

    /// Sets the parent link. Does nothing for the sentinel.
    #[inline]
    pub(crate) fn set_parent(self, parent: Option<Self>) {
        if self.is_real() {
            self.links_mut().parent = parent.map(|p| p.ptr);
        }
    }

    pub(crate) fn is_leaf(self) -> bool {
        self.left().is_external() && self.right().is_external()
    }

    /// Turns a node back into a detached leaf, keeping its entry.
    pub(crate) fn reset(self) {
        let links = self.links_mut();
        links.height = 0;
        links.size = 1;
        links.left = EXTERNAL.ptr();
        links.right = EXTERNAL.ptr();
        links.parent = None;
    }

    #[inline]
    pub(crate) fn key<'a>(self) -> &'a K
    where
        V: 'a,
    {
        &self.node().key
    }

    #[inline]
    pub(crate) fn value<'a>(self) -> &'a V
    where
        K: 'a,
    {
        &self.node().value
    }

    #[inline]
    pub(crate) fn value_mut<'a>(self) -> &'a mut V {
        debug_assert!(self.is_real(), "external node has no entry");
        unsafe { &mut (*self.ptr.cast::<Node<K, V>>().as_ptr()).value }
    }

    /// Exchanges the keys and values of two distinct real nodes, leaving
    /// their links in place.
    pub(crate) fn swap_entries(self, other: Self) {
        debug_assert!(self.is_real() && other.is_real() && self != other);
        let a = self.ptr.cast::<Node<K, V>>().as_ptr();
        let b = other.ptr.cast::<Node<K, V>>().as_ptr();
        unsafe {
            ptr::swap(ptr::addr_of_mut!((*a).key), ptr::addr_of_mut!((*b).key));
            ptr::swap(ptr::addr_of_mut!((*a).value), ptr::addr_of_mut!((*b).value));
        }
    }

    pub(crate) fn min_subtree(mut self) -> Self {
        while self.left().is_real() {
            self = self.left();
        }
        self
    }

    pub(crate) fn max_subtree(mut self) -> Self {
        while self.right().is_real() {
            self = self.right();
        }
        self
    }

    /// Returns the in-order successor, or `None` if this holds the largest key
    /// of its tree.
    pub(crate) fn successor(self) -> Option<Self> {
        let right = self.right();
        if right.is_real() {
            return Some(right.min_subtree());
        }

        let mut node = self;
        let mut parent = node.parent();
        while let Some(p) = parent {
            if p.right() != node {
                break;
            }
            node = p;
            parent = p.parent();
        }
        parent
    }
}

impl Sentinel {
    #[inline]
    fn ptr(&'static self) -> NonNull<Links> {
        NonNull::from(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_shape() {
        let external = Handle::<i32, ()>::external();
        assert!(external.is_external());
        assert_eq!(external.height(), -1);
        assert_eq!(external.size(), 0);
        assert_eq!(external.parent(), None);

        // One sentinel for every key and value type.
        let other = Handle::<String, Vec<u8>>::external();
        assert_eq!(other.ptr, external.ptr);
    }

    #[test]
    fn create_and_destroy() {
        let leaf = Handle::create(7, String::from("seven"));
        assert!(leaf.is_real());
        assert!(leaf.is_leaf());
        assert_eq!(leaf.height(), 0);
        assert_eq!(leaf.size(), 1);
        assert_eq!(leaf.parent(), None);
        assert_eq!(leaf.key(), &7);

        leaf.value_mut().push('!');
        assert_eq!(leaf.destroy(), (7, String::from("seven!")));
    }

    #[test]
    fn reset_detaches() {
        let parent = Handle::create(2, ());
        let child = Handle::create(1, ());
        parent.set_child(Side::Left, child);
        parent.set_height(1);
        parent.set_size(2);
        child.set_parent(Some(parent));

        parent.reset();
        child.reset();
        assert!(parent.is_leaf());
        assert_eq!(parent.size(), 1);
        assert_eq!(child.parent(), None);
        assert_eq!(parent.destroy(), (2, ()));
        assert_eq!(child.destroy(), (1, ()));
    }

    #[test]
    fn navigation() {
        //     2
        //    / \
        //   1   3
        let one = Handle::create(1, 'a');
        let two = Handle::create(2, 'b');
        let three = Handle::create(3, 'c');
        two.set_child(Side::Left, one);
        two.set_child(Side::Right, three);
        one.set_parent(Some(two));
        three.set_parent(Some(two));

        assert_eq!(two.min_subtree(), one);
        assert_eq!(two.max_subtree(), three);
        assert_eq!(one.successor(), Some(two));
        assert_eq!(two.successor(), Some(three));
        assert_eq!(three.successor(), None);

        for handle in [one, two, three] {
            handle.destroy();
        }
    }

    #[test]
    fn swap_entries_keeps_links() {
        let parent = Handle::create(1, "one");
        let child = Handle::create(2, "two");
        parent.set_child(Side::Right, child);
        child.set_parent(Some(parent));

        parent.swap_entries(child);
        assert_eq!((parent.key(), parent.value()), (&2, &"two"));
        assert_eq!((child.key(), child.value()), (&1, &"one"));
        assert_eq!(parent.right(), child);
        assert_eq!(child.parent(), Some(parent));

        assert_eq!(child.destroy(), (1, "one"));
        assert_eq!(parent.destroy(), (2, "two"));
    }

    #[test]
    #[should_panic(expected = "`Handle::destroy()` - cannot destroy the sentinel!")]
    fn destroy_sentinel() {
        Handle::<i32, ()>::external().destroy();
    }

    #[test]
    fn side_not() {
        assert_eq!(!Side::Left, Side::Right);
        assert_eq!(!Side::Right, Side::Left);
        assert_eq!(Side::Left.to_string(), "left");
    }
}
