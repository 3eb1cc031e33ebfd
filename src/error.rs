use std::fmt;

/// Error type returned by [`AvlTree::insert`](crate::AvlTree::insert) and
/// [`AvlTree::delete`](crate::AvlTree::delete).
///
/// In both cases the tree is left unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The key is already present in the tree.
    DuplicateKey,
    /// The key is not present in the tree.
    KeyNotFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateKey => write!(f, "key already exists"),
            Error::KeyNotFound => write!(f, "key not found"),
        }
    }
}

impl std::error::Error for Error {}
