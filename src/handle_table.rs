//! HandleTable: ordered structural layer with stable generational tokens.
//!
//! Entries live in a `SlotMap`; a `HashTable` indexes them by key and a
//! `BTreeMap` keyed by a monotonically increasing sequence number records
//! insertion order. Each entry stores its precomputed hash, so `K: Hash` is
//! never invoked after insertion.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use core::ops::Bound;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;
use std::collections::BTreeMap;

/// Opaque, generational reference to one slot.
///
/// A token of a removed slot never resolves again, even when the physical
/// slot is reused by a later insertion. Tokens are what finalizers deliver.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Token(DefaultKey);

impl Token {
    pub(crate) fn new(k: DefaultKey) -> Self {
        Token(k)
    }
    pub(crate) fn raw(&self) -> DefaultKey {
        self.0
    }
}

/// Position of an iteration: the sequence number of the last visited entry.
pub(crate) type Cursor = Option<u64>;

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
    seq: u64,
}

pub(crate) struct HandleTable<K, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<K, V>>,
    order: BTreeMap<u64, DefaultKey>,
    // Never rewound, not even by `drain`: an in-flight cursor must still see
    // entries inserted after a clear.
    next_seq: u64,
}

impl<K, V, S> HandleTable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::with_capacity(capacity),
            slots: SlotMap::with_capacity_and_key(capacity),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn find<Q>(&self, q: &Q) -> Option<Token>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.key.borrow() == q)
                    .unwrap_or(false)
            })
            .map(|&k| Token::new(k))
    }

    /// Insert `key` unless an equal key is present. Returns the token of the
    /// entry holding `key` and whether it was created by this call. On a hit
    /// `value` is not constructed and the passed `key` is dropped.
    pub fn find_or_insert_with<F>(&mut self, key: K, value: F) -> (Token, bool)
    where
        F: FnOnce() -> V,
    {
        let hash = self.make_hash(&key);
        match self.index.entry(
            hash,
            |&kk| self.slots.get(kk).map(|e| e.key == key).unwrap_or(false),
            |&kk| self.slots.get(kk).map(|e| e.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(o) => (Token::new(*o.get()), false),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let entry = Entry {
                    key,
                    value: value(),
                    hash,
                    seq,
                };
                let k = self.slots.insert(entry);
                let _ = v.insert(k);
                self.order.insert(seq, k);
                (Token::new(k), true)
            }
        }
    }

    pub fn remove(&mut self, token: Token) -> Option<(K, V)> {
        let k = token.raw();
        let entry = self.slots.remove(k)?;

        // Unlink from index and order.
        let _ = self
            .index
            .find_entry(entry.hash, |&kk| kk == k)
            .map(|o| o.remove());
        self.order.remove(&entry.seq);

        Some((entry.key, entry.value))
    }

    pub fn get(&self, token: Token) -> Option<(&K, &V)> {
        self.slots.get(token.raw()).map(|e| (&e.key, &e.value))
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut V> {
        self.slots.get_mut(token.raw()).map(|e| &mut e.value)
    }

    /// First entry in insertion order strictly after `cursor`.
    pub fn next_after(&self, cursor: Cursor) -> Option<(u64, Token)> {
        let lower = cursor.map_or(Bound::Unbounded, Bound::Excluded);
        self.order
            .range((lower, Bound::Unbounded))
            .next()
            .map(|(&seq, &k)| (seq, Token::new(k)))
    }

    /// Tokens of every entry, in insertion order.
    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.order.values().map(|&k| Token::new(k))
    }

    /// Remove every entry, returning them in insertion order.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.index.clear();
        let order = core::mem::take(&mut self.order);
        order
            .into_values()
            .filter_map(|k| self.slots.remove(k))
            .map(|e| (e.key, e.value))
            .collect()
    }
}
