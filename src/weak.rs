//! Weak-handle capability.
//!
//! The collections never name `Rc` or `Arc` directly; they only rely on the
//! `WeakHandle` contract below. Identity is the address of the target's
//! allocation, which stays reserved for as long as any weak handle to it
//! exists. A stored handle therefore pins its identity: no new object can
//! take the address of a dead entry that has not been pruned yet.
//!
//! "Collection" here means the last strong reference was dropped. There is no
//! tracing collector, so a target dies on explicit scope exit rather than at an
//! arbitrary pause.

use std::rc::{self, Rc};
use std::sync::{self, Arc};

/// A handle that observes a target without keeping it alive.
pub trait WeakHandle: Clone {
    /// The owning reference the handle was created from.
    type Strong: Clone;

    /// Create a handle observing `target`.
    fn downgrade(target: &Self::Strong) -> Self;

    /// Return the target if it is still alive. Once this returns `None` it
    /// never returns a target again.
    fn dereference(&self) -> Option<Self::Strong>;

    /// Liveness check that does not materialize a strong reference.
    fn is_live(&self) -> bool {
        self.dereference().is_some()
    }

    /// Identity of `target`, comparable with the identity of any other target
    /// of the same handle type.
    fn identity(target: &Self::Strong) -> usize;
}

impl<T: ?Sized> WeakHandle for rc::Weak<T> {
    type Strong = Rc<T>;

    #[inline]
    fn downgrade(target: &Rc<T>) -> Self {
        Rc::downgrade(target)
    }

    #[inline]
    fn dereference(&self) -> Option<Rc<T>> {
        self.upgrade()
    }

    #[inline]
    fn is_live(&self) -> bool {
        self.strong_count() > 0
    }

    #[inline]
    fn identity(target: &Rc<T>) -> usize {
        Rc::as_ptr(target) as *const () as usize
    }
}

impl<T: ?Sized> WeakHandle for sync::Weak<T> {
    type Strong = Arc<T>;

    #[inline]
    fn downgrade(target: &Arc<T>) -> Self {
        Arc::downgrade(target)
    }

    #[inline]
    fn dereference(&self) -> Option<Arc<T>> {
        self.upgrade()
    }

    #[inline]
    fn is_live(&self) -> bool {
        self.strong_count() > 0
    }

    #[inline]
    fn identity(target: &Arc<T>) -> usize {
        Arc::as_ptr(target) as *const () as usize
    }
}
