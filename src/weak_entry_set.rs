//! WeakEntrySet: an insertion-ordered set of weakly held objects.

use crate::finalizer::{FinalizationRegistry, Finalizer};
use crate::handle_table::Cursor;
use crate::ledger::{self, Ledger};
use crate::weak::WeakHandle;
use core::cell::RefCell;
use core::fmt;
use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;

/// A set that holds its members through weak handles `W`.
///
/// Membership is by identity of the target allocation. Holding a member in
/// the set does not keep it alive; once the last strong reference elsewhere
/// is dropped the member disappears from `has` and from iteration
/// immediately, and from `len` once finalizers run or a read prunes it.
///
/// All operations take `&self`. The set may be modified from inside
/// `for_each` callbacks and during iteration; see [`Iter`] for the order
/// guarantees.
pub struct WeakEntrySet<W, F = FinalizationRegistry<W>, S = RandomState> {
    inner: RefCell<Ledger<usize, W, (), F, S>>,
}

impl<W: WeakHandle> WeakEntrySet<W> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_parts(capacity, FinalizationRegistry::new(), RandomState::new())
    }
}

impl<W: WeakHandle, S: BuildHasher> WeakEntrySet<W, FinalizationRegistry<W>, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_parts(0, FinalizationRegistry::new(), hasher)
    }
}

impl<W: WeakHandle, F: Finalizer<W>> WeakEntrySet<W, F> {
    pub fn with_finalizer(finalizer: F) -> Self {
        Self::with_parts(0, finalizer, RandomState::new())
    }
}

impl<W, F, S> WeakEntrySet<W, F, S>
where
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    pub fn with_parts(capacity: usize, finalizer: F, hasher: S) -> Self {
        Self {
            inner: RefCell::new(Ledger::new(capacity, finalizer, hasher)),
        }
    }

    /// Number of entries believed live. Overcounts by the members collected
    /// since the last finalizer run or pruning read; never undercounts.
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `value` unless it is already a member. Re-adding keeps the
    /// original position.
    pub fn add(&self, value: &W::Strong) -> &Self {
        let (swept, attached) = {
            let mut ledger = self.inner.borrow_mut();
            let swept = ledger.sweep_if_due();
            let attached = ledger.attach(W::identity(value), W::downgrade(value), ());
            (swept, attached)
        };
        drop((swept, attached));
        self
    }

    pub fn has(&self, value: &W::Strong) -> bool {
        let probe = self.inner.borrow_mut().probe_key(&W::identity(value));
        probe.is_live()
    }

    /// Remove `value`, cancelling its pending finalizer. Returns whether it
    /// was a member.
    pub fn delete(&self, value: &W::Strong) -> bool {
        let removed = self.inner.borrow_mut().remove_key(&W::identity(value));
        removed.is_some()
    }

    pub fn clear(&self) {
        let removed = self.inner.borrow_mut().clear();
        drop(removed);
    }

    /// Live members in insertion order.
    pub fn iter(&self) -> Iter<'_, W, F, S> {
        Iter {
            set: self,
            cursor: None,
        }
    }

    pub fn values(&self) -> Iter<'_, W, F, S> {
        self.iter()
    }

    pub fn keys(&self) -> Iter<'_, W, F, S> {
        self.iter()
    }

    /// Each live member paired with itself, as a map-shaped view.
    pub fn entries(&self) -> impl Iterator<Item = (W::Strong, W::Strong)> + '_ {
        self.iter().map(|value| (value.clone(), value))
    }

    /// Call `callback` once per live member, in iteration order.
    pub fn for_each<C>(&self, mut callback: C)
    where
        C: FnMut(W::Strong, &Self),
    {
        self.for_each_with(&mut (), |_, value, set| callback(value, set));
    }

    /// Like `for_each`, threading an explicit context through every call.
    pub fn for_each_with<T, C>(&self, this: &mut T, mut callback: C)
    where
        C: FnMut(&mut T, W::Strong, &Self),
    {
        for value in self.iter() {
            callback(this, value, self);
        }
    }

    /// Deliver pending finalizers. Returns the number of entries removed.
    pub fn run_finalizers(&self) -> usize {
        let removed = self.inner.borrow_mut().run_finalizers();
        removed.len()
    }

    /// Remove every dead entry now. Returns the number removed.
    pub fn prune(&self) -> usize {
        let removed = self.inner.borrow_mut().prune();
        removed.len()
    }

    pub fn pending_finalizers(&self) -> usize {
        self.inner.borrow().pending()
    }
}

impl<W, F, S> Default for WeakEntrySet<W, F, S>
where
    W: WeakHandle,
    F: Finalizer<W> + Default,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::with_parts(0, F::default(), S::default())
    }
}

impl<W, F, S> fmt::Debug for WeakEntrySet<W, F, S>
where
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(ledger) => f
                .debug_struct("WeakEntrySet")
                .field("len", &ledger.len())
                .field("pending_finalizers", &ledger.pending())
                .finish(),
            Err(_) => f.write_str("WeakEntrySet { <borrowed> }"),
        }
    }
}

impl<W, F, S> FromIterator<W::Strong> for WeakEntrySet<W, F, S>
where
    W: WeakHandle,
    F: Finalizer<W> + Default,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = W::Strong>>(iter: I) -> Self {
        let set = Self::default();
        for value in iter {
            set.add(&value);
        }
        set
    }
}

impl<W, F, S> Extend<W::Strong> for WeakEntrySet<W, F, S>
where
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = W::Strong>>(&mut self, iter: I) {
        for value in iter {
            self.add(&value);
        }
    }
}

/// Iterator over live members of a [`WeakEntrySet`].
///
/// Each step resumes after the last visited member: members removed in the
/// meantime are not visited, members added in the meantime are. Dead members
/// met on the way are pruned from the set and skipped.
pub struct Iter<'a, W, F, S> {
    set: &'a WeakEntrySet<W, F, S>,
    cursor: Cursor,
}

impl<'a, W, F, S> Iterator for Iter<'a, W, F, S>
where
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    type Item = W::Strong;

    fn next(&mut self) -> Option<Self::Item> {
        ledger::step(&self.set.inner, &mut self.cursor, |_, _, value| value)
    }
}

impl<'a, W, F, S> IntoIterator for &'a WeakEntrySet<W, F, S>
where
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    type Item = W::Strong;
    type IntoIter = Iter<'a, W, F, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
