//! weak-collections: enumerable, insertion-ordered collections that hold
//! their objects weakly.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: sets and maps over weakly held objects that still support `len`,
//!   ordered iteration and deterministic removal, none of which a bare weak
//!   reference offers.
//! - Layers:
//!   - HandleTable<K, V, S>: structural map with generational tokens and
//!     insertion order. Tokens of removed slots never resolve again.
//!   - Ledger<K, W, V, F, S>: pairs each slot with a weak handle and exactly
//!     one finalizer registration keyed by the slot's token; owns the shared
//!     probe-and-prune read used by every lookup and iterator.
//!   - WeakEntrySet, WeakKeyMap, WeakValueMap: public API over a ledger in a
//!     `RefCell`. The set and the key map are keyed by target identity; the
//!     value map is keyed by ordinary keys and holds values weakly.
//!
//! Capabilities
//! - `WeakHandle`: create a handle, dereference it, compare identities.
//!   Implemented for `std::rc::Weak` and `std::sync::Weak`.
//! - `Finalizer`: register/unregister tokens and, on the collector's turn,
//!   hand back the tokens of collected targets. Each collection owns one.
//!
//! Lifecycle
//! - Every entry is ABSENT -> LIVE on insert, and LIVE -> ABSENT on the first
//!   of: explicit `delete`/`clear`, a read that finds the target dead, or
//!   finalizer delivery. Every removal path other than delivery cancels the
//!   registration before the slot is unlinked, and delivery removes only the
//!   slot named by its token. A stale token therefore cannot remove a newer
//!   entry that reuses the same key or object.
//! - Finalizers run when the caller invokes `run_finalizers`, and at the start
//!   of an insertion once the entry count passes a sweep threshold. Until
//!   then `len` may overcount collected targets; reads and iteration never
//!   yield them.
//!
//! Collection model
//! - There is no tracing collector: a target is "collected" when its last
//!   `Rc`/`Arc` is dropped. That happens on explicit scope exit, not at an
//!   arbitrary pause.
//!
//! Constraints
//! - Single-threaded: collections are `!Sync` (interior mutability through
//!   `RefCell`).
//! - Removed keys and values are dropped after the interior borrow ends, so
//!   their destructors, and `for_each` callbacks, may call back into the
//!   collection. `K: Hash/Eq` and `Clone` of yielded keys/values run while
//!   the collection is borrowed and must not re-enter it.
//! - Hashes are computed once per insertion and stored; `K: Hash` is never
//!   called again for a stored key.

mod finalizer;
pub mod handle_table;
mod ledger;
mod weak;
pub mod weak_entry_set;
pub mod weak_key_map;
pub mod weak_value_map;

// Public surface
pub use finalizer::{FinalizationRegistry, Finalizer};
pub use handle_table::Token;
pub use weak::WeakHandle;
pub use weak_entry_set::WeakEntrySet;
pub use weak_key_map::WeakKeyMap;
pub use weak_value_map::WeakValueMap;
