//! WeakKeyMap: an insertion-ordered map whose keys are held weakly.

use crate::finalizer::{FinalizationRegistry, Finalizer};
use crate::handle_table::Cursor;
use crate::ledger::{self, Attached, Ledger, Probe};
use crate::weak::WeakHandle;
use core::cell::RefCell;
use core::fmt;
use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;

/// A map from weakly held key objects to strongly held values.
///
/// Keys are compared by identity of their allocation. A value lives in the
/// same slot as its key's weak handle, so a key is present exactly when its
/// value is: inserting, deleting, pruning and finalizing always act on both
/// at once. When a key is collected its value is dropped with the slot.
///
/// Reads hand out clones of values; use a cheaply cloneable `V` (for example
/// an `Rc`) when values are large.
pub struct WeakKeyMap<W, V, F = FinalizationRegistry<W>, S = RandomState> {
    inner: RefCell<Ledger<usize, W, V, F, S>>,
}

impl<W: WeakHandle, V> WeakKeyMap<W, V> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_parts(capacity, FinalizationRegistry::new(), RandomState::new())
    }
}

impl<W: WeakHandle, V, S: BuildHasher> WeakKeyMap<W, V, FinalizationRegistry<W>, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_parts(0, FinalizationRegistry::new(), hasher)
    }
}

impl<W: WeakHandle, V, F: Finalizer<W>> WeakKeyMap<W, V, F> {
    pub fn with_finalizer(finalizer: F) -> Self {
        Self::with_parts(0, finalizer, RandomState::new())
    }
}

impl<W, V, F, S> WeakKeyMap<W, V, F, S>
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

    /// Number of entries believed live; same caveat as
    /// [`WeakEntrySet::len`](crate::WeakEntrySet::len).
    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `value` under `key`, replacing any previous value. A key that is
    /// already present keeps its position and its finalizer registration.
    pub fn set(&self, key: &W::Strong, value: V) -> &Self {
        let (swept, replaced) = {
            let mut ledger = self.inner.borrow_mut();
            let swept = ledger.sweep_if_due();
            let replaced = match ledger.attach(W::identity(key), W::downgrade(key), value) {
                Attached::Fresh(_, stale) => (stale, None),
                Attached::Existing(token, _, _, value) => (
                    None,
                    ledger
                        .value_mut(token)
                        .map(|slot| core::mem::replace(slot, value)),
                ),
            };
            (swept, replaced)
        };
        drop((swept, replaced));
        self
    }

    /// The value stored under `key`, if `key` is present and alive.
    pub fn get(&self, key: &W::Strong) -> Option<V>
    where
        V: Clone,
    {
        let (probe, value) = {
            let mut ledger = self.inner.borrow_mut();
            let probe = ledger.probe_key(&W::identity(key));
            let value = match &probe {
                Probe::Live { token, .. } => ledger.value(*token).cloned(),
                _ => None,
            };
            (probe, value)
        };
        drop(probe);
        value
    }

    pub fn has(&self, key: &W::Strong) -> bool {
        let probe = self.inner.borrow_mut().probe_key(&W::identity(key));
        probe.is_live()
    }

    /// Remove `key` and its value, cancelling the pending finalizer. Returns
    /// whether the key was present.
    pub fn delete(&self, key: &W::Strong) -> bool {
        let removed = self.inner.borrow_mut().remove_key(&W::identity(key));
        removed.is_some()
    }

    pub fn clear(&self) {
        let removed = self.inner.borrow_mut().clear();
        drop(removed);
    }

    /// Live `(key, value)` pairs in key insertion order.
    pub fn iter(&self) -> Iter<'_, W, V, F, S>
    where
        V: Clone,
    {
        Iter {
            map: self,
            cursor: None,
        }
    }

    pub fn entries(&self) -> Iter<'_, W, V, F, S>
    where
        V: Clone,
    {
        self.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = W::Strong> + '_ {
        let mut cursor = None;
        core::iter::from_fn(move || ledger::step(&self.inner, &mut cursor, |_, _, key| key))
    }

    pub fn values(&self) -> impl Iterator<Item = V> + '_
    where
        V: Clone,
    {
        let mut cursor = None;
        core::iter::from_fn(move || {
            ledger::step(&self.inner, &mut cursor, |_, value: &V, _| value.clone())
        })
    }

    /// Call `callback(value, key, map)` once per live entry, in iteration
    /// order.
    pub fn for_each<C>(&self, mut callback: C)
    where
        V: Clone,
        C: FnMut(V, W::Strong, &Self),
    {
        self.for_each_with(&mut (), |_, value, key, map| callback(value, key, map));
    }

    /// Like `for_each`, threading an explicit context through every call.
    pub fn for_each_with<T, C>(&self, this: &mut T, mut callback: C)
    where
        V: Clone,
        C: FnMut(&mut T, V, W::Strong, &Self),
    {
        for (key, value) in self.iter() {
            callback(this, value, key, self);
        }
    }

    /// Deliver pending finalizers. Returns the number of entries removed.
    pub fn run_finalizers(&self) -> usize {
        let removed = self.inner.borrow_mut().run_finalizers();
        removed.len()
    }

    /// Remove every entry whose key is dead. Returns the number removed.
    pub fn prune(&self) -> usize {
        let removed = self.inner.borrow_mut().prune();
        removed.len()
    }

    pub fn pending_finalizers(&self) -> usize {
        self.inner.borrow().pending()
    }
}

impl<W, V, F, S> Default for WeakKeyMap<W, V, F, S>
where
    W: WeakHandle,
    F: Finalizer<W> + Default,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::with_parts(0, F::default(), S::default())
    }
}

impl<W, V, F, S> fmt::Debug for WeakKeyMap<W, V, F, S>
where
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(ledger) => f
                .debug_struct("WeakKeyMap")
                .field("len", &ledger.len())
                .field("pending_finalizers", &ledger.pending())
                .finish(),
            Err(_) => f.write_str("WeakKeyMap { <borrowed> }"),
        }
    }
}

impl<W, V, F, S> FromIterator<(W::Strong, V)> for WeakKeyMap<W, V, F, S>
where
    W: WeakHandle,
    F: Finalizer<W> + Default,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (W::Strong, V)>>(iter: I) -> Self {
        let map = Self::default();
        for (key, value) in iter {
            map.set(&key, value);
        }
        map
    }
}

impl<W, V, F, S> Extend<(W::Strong, V)> for WeakKeyMap<W, V, F, S>
where
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (W::Strong, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(&key, value);
        }
    }
}

/// Iterator over live entries of a [`WeakKeyMap`], with the same step
/// semantics as [`weak_entry_set::Iter`](crate::weak_entry_set::Iter).
pub struct Iter<'a, W, V, F, S> {
    map: &'a WeakKeyMap<W, V, F, S>,
    cursor: Cursor,
}

impl<'a, W, V, F, S> Iterator for Iter<'a, W, V, F, S>
where
    W: WeakHandle,
    V: Clone,
    F: Finalizer<W>,
    S: BuildHasher,
{
    type Item = (W::Strong, V);

    fn next(&mut self) -> Option<Self::Item> {
        ledger::step(&self.map.inner, &mut self.cursor, |_, value: &V, key| {
            (key, value.clone())
        })
    }
}

impl<'a, W, V, F, S> IntoIterator for &'a WeakKeyMap<W, V, F, S>
where
    W: WeakHandle,
    V: Clone,
    F: Finalizer<W>,
    S: BuildHasher,
{
    type Item = (W::Strong, V);
    type IntoIter = Iter<'a, W, V, F, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
