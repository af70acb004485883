//! Ledger: weak-entry bookkeeping shared by every collection.
//!
//! A ledger pairs a `HandleTable` with a `Finalizer`. Every slot holds a weak
//! handle plus a payload, and has exactly one pending finalizer registration
//! whose token is the slot's own token. All removal paths go through
//! `remove`, which cancels that registration before the slot is unlinked; the
//! only exception is a delivered token, which the finalizer has already
//! forgotten.
//!
//! Methods that remove entries hand the removed `(K, Slot)` back to the caller
//! instead of dropping them. Collections keep the ledger in a `RefCell` and
//! drop removed user data only after the borrow is released, so destructors
//! of keys and values may re-enter the collection.

use crate::finalizer::Finalizer;
use crate::handle_table::{Cursor, HandleTable, Token};
use crate::weak::WeakHandle;
use core::borrow::Borrow;
use core::cell::RefCell;
use core::hash::{BuildHasher, Hash};
use tracing::{debug, trace};

/// Entry count below which insertions never trigger a finalizer sweep.
const MIN_SWEEP: usize = 32;

pub(crate) struct Slot<W, V> {
    pub(crate) weak: W,
    pub(crate) value: V,
}

/// An entry unlinked from the ledger, waiting to be dropped.
pub(crate) type Removed<K, W, V> = (K, Slot<W, V>);

/// Outcome of a liveness read.
pub(crate) enum Probe<T, K, W, V> {
    Live { token: Token, target: T },
    /// The entry was dead; it has been removed as part of the read.
    Pruned(Removed<K, W, V>),
    Vacant,
}

impl<T, K, W, V> Probe<T, K, W, V> {
    pub(crate) fn is_live(&self) -> bool {
        matches!(self, Probe::Live { .. })
    }
}

/// Outcome of `attach`. A fresh insertion carries the dead entry it
/// replaced, if any; a hit on a live entry returns the unused inputs.
pub(crate) enum Attached<K, W, V> {
    Fresh(Token, Option<Removed<K, W, V>>),
    Existing(Token, K, W, V),
}

pub(crate) struct Ledger<K, W, V, F, S> {
    table: HandleTable<K, Slot<W, V>, S>,
    finalizer: F,
    sweep_at: usize,
}

impl<K, W, V, F, S> Ledger<K, W, V, F, S>
where
    K: Eq + Hash,
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
{
    pub fn new(capacity: usize, finalizer: F, hasher: S) -> Self {
        Self {
            table: HandleTable::with_capacity_and_hasher(capacity, hasher),
            finalizer,
            sweep_at: MIN_SWEEP.max(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn pending(&self) -> usize {
        self.finalizer.pending()
    }

    pub fn value(&self, token: Token) -> Option<&V> {
        self.table.get(token).map(|(_, slot)| &slot.value)
    }

    pub fn value_mut(&mut self, token: Token) -> Option<&mut V> {
        self.table.get_mut(token).map(|slot| &mut slot.value)
    }

    /// Insert `key` with a fresh finalizer registration unless it is already
    /// present and alive. A present but dead entry is removed first, so the
    /// new entry takes the last position.
    pub fn attach(&mut self, key: K, weak: W, value: V) -> Attached<K, W, V> {
        let stale = match self.table.find(&key) {
            Some(token) if self.is_live(token) => {
                return Attached::Existing(token, key, weak, value);
            }
            Some(token) => self.remove(token),
            None => None,
        };
        let (token, created) = self
            .table
            .find_or_insert_with(key, move || Slot { weak, value });
        debug_assert!(created);
        if let Some((_, slot)) = self.table.get(token) {
            self.finalizer.register(&slot.weak, token);
        }
        Attached::Fresh(token, stale)
    }

    fn is_live(&self, token: Token) -> bool {
        self.table
            .get(token)
            .map(|(_, slot)| slot.weak.is_live())
            .unwrap_or(false)
    }

    /// Point an existing slot at a new target, keeping its position. The old
    /// registration is cancelled before the new one is installed.
    pub fn rebind(&mut self, token: Token, weak: W) -> Option<W> {
        let slot = self.table.get_mut(token)?;
        let old = core::mem::replace(&mut slot.weak, weak);
        let cancelled = self.finalizer.unregister(token);
        debug_assert!(cancelled, "live slot without a finalizer registration");
        self.finalizer.register(&slot.weak, token);
        Some(old)
    }

    /// Probe-and-prune: dereference the slot's handle, removing the slot if
    /// its target has been collected.
    pub fn probe(&mut self, token: Token) -> Probe<W::Strong, K, W, V> {
        let target = match self.table.get(token) {
            Some((_, slot)) => slot.weak.dereference(),
            None => return Probe::Vacant,
        };
        match target {
            Some(target) => Probe::Live { token, target },
            None => match self.remove(token) {
                Some(removed) => {
                    trace!(?token, "pruned dead entry on read");
                    Probe::Pruned(removed)
                }
                None => Probe::Vacant,
            },
        }
    }

    pub fn probe_key<Q>(&mut self, q: &Q) -> Probe<W::Strong, K, W, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.table.find(q) {
            Some(token) => self.probe(token),
            None => Probe::Vacant,
        }
    }

    pub fn remove(&mut self, token: Token) -> Option<Removed<K, W, V>> {
        let cancelled = self.finalizer.unregister(token);
        let removed = self.table.remove(token);
        debug_assert_eq!(
            cancelled,
            removed.is_some(),
            "slot and finalizer registration out of step"
        );
        removed
    }

    pub fn remove_key<Q>(&mut self, q: &Q) -> Option<Removed<K, W, V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let token = self.table.find(q)?;
        self.remove(token)
    }

    pub fn clear(&mut self) -> Vec<Removed<K, W, V>> {
        self.finalizer.clear();
        self.table.drain()
    }

    /// Advance `cursor` to the next live entry in insertion order and project
    /// it. Dead entries passed on the way are pruned into `graveyard`.
    pub fn next_live<R, P>(
        &mut self,
        cursor: &mut Cursor,
        graveyard: &mut Vec<Removed<K, W, V>>,
        project: P,
    ) -> Option<R>
    where
        P: FnOnce(&K, &V, W::Strong) -> R,
    {
        loop {
            let (seq, token) = self.table.next_after(*cursor)?;
            *cursor = Some(seq);
            match self.probe(token) {
                Probe::Live { token, target } => {
                    let (key, slot) = self.table.get(token)?;
                    return Some(project(key, &slot.value, target));
                }
                Probe::Pruned(removed) => graveyard.push(removed),
                Probe::Vacant => {}
            }
        }
    }

    /// The collector's turn: remove exactly the slots whose tokens the
    /// finalizer delivers.
    pub fn run_finalizers(&mut self) -> Vec<Removed<K, W, V>> {
        let delivered = self.finalizer.collect();
        let mut removed = Vec::with_capacity(delivered.len());
        for token in delivered {
            let entry = self.table.remove(token);
            debug_assert!(entry.is_some(), "finalizer delivered a token with no slot");
            removed.extend(entry);
        }
        if !removed.is_empty() {
            debug!(
                removed = removed.len(),
                remaining = self.table.len(),
                "finalizers ran"
            );
        }
        removed
    }

    /// Run finalizers when the entry count has grown past the sweep
    /// threshold, then move the threshold to twice the surviving count.
    pub fn sweep_if_due(&mut self) -> Vec<Removed<K, W, V>> {
        if self.table.len() < self.sweep_at {
            return Vec::new();
        }
        let removed = self.run_finalizers();
        self.sweep_at = MIN_SWEEP.max(self.table.len() * 2);
        removed
    }

    /// Remove every dead entry now, without waiting for the finalizer.
    pub fn prune(&mut self) -> Vec<Removed<K, W, V>> {
        let dead: Vec<Token> = self
            .table
            .tokens()
            .filter(|&token| !self.is_live(token))
            .collect();
        let removed: Vec<_> = dead.into_iter().filter_map(|t| self.remove(t)).collect();
        if !removed.is_empty() {
            debug!(removed = removed.len(), "pruned dead entries");
        }
        removed
    }
}

/// One iterator step over a ledger behind a `RefCell`. Pruned entries are
/// dropped after the borrow is released.
pub(crate) fn step<K, W, V, F, S, R, P>(
    cell: &RefCell<Ledger<K, W, V, F, S>>,
    cursor: &mut Cursor,
    project: P,
) -> Option<R>
where
    K: Eq + Hash,
    W: WeakHandle,
    F: Finalizer<W>,
    S: BuildHasher,
    P: FnOnce(&K, &V, W::Strong) -> R,
{
    let mut graveyard = Vec::new();
    let next = cell
        .borrow_mut()
        .next_live(cursor, &mut graveyard, project);
    drop(graveyard);
    next
}
