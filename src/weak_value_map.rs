//! WeakValueMap: an insertion-ordered map whose values are held weakly.

use crate::finalizer::{FinalizationRegistry, Finalizer};
use crate::handle_table::Cursor;
use crate::ledger::{self, Attached, Ledger, Probe};
use crate::weak::WeakHandle;
use core::borrow::Borrow;
use core::cell::RefCell;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;

/// A map from ordinary keys to weakly held value objects.
///
/// An entry disappears once its value is collected: immediately for `get`,
/// `has` and iteration, and from `len` once finalizers run or a read prunes
/// it. Each entry's finalizer token names its own slot, never the key, so a
/// late delivery for a deleted entry cannot remove a newer entry that reuses
/// the key.
pub struct WeakValueMap<K, W, F = FinalizationRegistry<W>, S = RandomState> {
    inner: RefCell<Ledger<K, W, (), F, S>>,
}

impl<K: Eq + Hash, W: WeakHandle> WeakValueMap<K, W> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_parts(capacity, FinalizationRegistry::new(), RandomState::new())
    }
}

impl<K, W, S> WeakValueMap<K, W, FinalizationRegistry<W>, S>
where
    K: Eq + Hash,
    W: WeakHandle,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_parts(0, FinalizationRegistry::new(), hasher)
    }
}

impl<K: Eq + Hash, W: WeakHandle, F: Finalizer<W>> WeakValueMap<K, W, F> {
    pub fn with_finalizer(finalizer: F) -> Self {
        Self::with_parts(0, finalizer, RandomState::new())
    }
}

impl<K, W, F, S> WeakValueMap<K, W, F, S>
where
    K: Eq + Hash,
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

    /// Point `key` at `value`. An existing key keeps its position; its old
    /// finalizer registration is cancelled before the new one is installed.
    pub fn set(&self, key: K, value: &W::Strong) -> &Self {
        let (swept, unused) = {
            let mut ledger = self.inner.borrow_mut();
            let swept = ledger.sweep_if_due();
            let unused = match ledger.attach(key, W::downgrade(value), ()) {
                Attached::Fresh(_, stale) => (stale, None),
                Attached::Existing(token, key, weak, ()) => {
                    (None, Some((key, ledger.rebind(token, weak))))
                }
            };
            (swept, unused)
        };
        drop((swept, unused));
        self
    }

    /// The value under `key`, if present and not yet collected.
    pub fn get<Q>(&self, key: &Q) -> Option<W::Strong>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let probe = self.inner.borrow_mut().probe_key(key);
        match probe {
            Probe::Live { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let probe = self.inner.borrow_mut().probe_key(key);
        probe.is_live()
    }

    /// Remove `key`, cancelling its pending finalizer. Returns whether an
    /// entry, live or not yet pruned, was removed.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let removed = self.inner.borrow_mut().remove_key(key);
        removed.is_some()
    }

    pub fn clear(&self) {
        let removed = self.inner.borrow_mut().clear();
        drop(removed);
    }

    /// Live `(key, value)` pairs in key insertion order.
    pub fn iter(&self) -> Iter<'_, K, W, F, S>
    where
        K: Clone,
    {
        Iter {
            map: self,
            cursor: None,
        }
    }

    pub fn entries(&self) -> Iter<'_, K, W, F, S>
    where
        K: Clone,
    {
        self.iter()
    }

    /// Keys whose values are still alive.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_
    where
        K: Clone,
    {
        let mut cursor = None;
        core::iter::from_fn(move || {
            ledger::step(&self.inner, &mut cursor, |key: &K, _, _| key.clone())
        })
    }

    pub fn values(&self) -> impl Iterator<Item = W::Strong> + '_ {
        let mut cursor = None;
        core::iter::from_fn(move || ledger::step(&self.inner, &mut cursor, |_, _, value| value))
    }

    /// Call `callback(value, key, map)` once per live entry, in iteration
    /// order.
    pub fn for_each<C>(&self, mut callback: C)
    where
        K: Clone,
        C: FnMut(W::Strong, K, &Self),
    {
        self.for_each_with(&mut (), |_, value, key, map| callback(value, key, map));
    }

    /// Like `for_each`, threading an explicit context through every call.
    pub fn for_each_with<T, C>(&self, this: &mut T, mut callback: C)
    where
        K: Clone,
        C: FnMut(&mut T, W::Strong, K, &Self),
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

    /// Remove every entry whose value is dead. Returns the number removed.
    pub fn prune(&self) -> usize {
        let removed = self.inner.borrow_mut().prune();
        removed.len()
    }

    pub fn pending_finalizers(&self) -> usize {
        self.inner.borrow().pending()
    }
}

impl<K, W, F, S> Default for WeakValueMap<K, W, F, S>
where
    K: Eq + Hash,
    W: WeakHandle,
    F: Finalizer<W> + Default,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::with_parts(0, F::default(), S::default())
    }
}

impl<K, W, F, S> fmt::Debug for WeakValueMap<K, W, F, S>
where
    K: Eq + Hash,
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(ledger) => f
                .debug_struct("WeakValueMap")
                .field("len", &ledger.len())
                .field("pending_finalizers", &ledger.pending())
                .finish(),
            Err(_) => f.write_str("WeakValueMap { <borrowed> }"),
        }
    }
}

impl<K, W, F, S> FromIterator<(K, W::Strong)> for WeakValueMap<K, W, F, S>
where
    K: Eq + Hash,
    W: WeakHandle,
    F: Finalizer<W> + Default,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, W::Strong)>>(iter: I) -> Self {
        let map = Self::default();
        for (key, value) in iter {
            map.set(key, &value);
        }
        map
    }
}

impl<K, W, F, S> Extend<(K, W::Strong)> for WeakValueMap<K, W, F, S>
where
    K: Eq + Hash,
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, W::Strong)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.set(key, &value);
        }
    }
}

/// Iterator over live entries of a [`WeakValueMap`], with the same step
/// semantics as [`weak_entry_set::Iter`](crate::weak_entry_set::Iter).
pub struct Iter<'a, K, W, F, S> {
    map: &'a WeakValueMap<K, W, F, S>,
    cursor: Cursor,
}

impl<'a, K, W, F, S> Iterator for Iter<'a, K, W, F, S>
where
    K: Eq + Hash + Clone,
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    type Item = (K, W::Strong);

    fn next(&mut self) -> Option<Self::Item> {
        ledger::step(&self.map.inner, &mut self.cursor, |key: &K, _, value| {
            (key.clone(), value)
        })
    }
}

impl<'a, K, W, F, S> IntoIterator for &'a WeakValueMap<K, W, F, S>
where
    K: Eq + Hash + Clone,
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    type Item = (K, W::Strong);
    type IntoIter = Iter<'a, K, W, F, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
