//! Finalization capability.
//!
//! A finalizer remembers `(target, token)` registrations and, on the
//! collector's turn (`collect`), hands back the tokens whose targets have been
//! collected. Each collection owns its own finalizer; tokens are never shared
//! across instances.

use crate::handle_table::Token;
use crate::weak::WeakHandle;
use slotmap::{DefaultKey, SecondaryMap};
use tracing::trace;

/// Registration table for "target collected" notifications.
pub trait Finalizer<W> {
    /// Deliver `token` once the target observed by `target` is collected.
    /// Registering a token that is already registered replaces the target.
    fn register(&mut self, target: &W, token: Token);

    /// Cancel a pending delivery. Returns whether one was pending.
    fn unregister(&mut self, token: Token) -> bool;

    /// Tokens whose targets were collected, each delivered exactly once.
    /// Delivered tokens are no longer registered.
    fn collect(&mut self) -> Vec<Token>;

    /// Cancel every pending delivery.
    fn clear(&mut self);

    /// Number of registrations not yet delivered or cancelled.
    fn pending(&self) -> usize;
}

/// Default finalizer: keeps a weak observer per token and sweeps them on
/// `collect`.
pub struct FinalizationRegistry<W> {
    cells: SecondaryMap<DefaultKey, W>,
}

impl<W> FinalizationRegistry<W> {
    pub fn new() -> Self {
        Self {
            cells: SecondaryMap::new(),
        }
    }
}

impl<W> Default for FinalizationRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> core::fmt::Debug for FinalizationRegistry<W> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FinalizationRegistry")
            .field("pending", &self.cells.len())
            .finish()
    }
}

impl<W: WeakHandle> Finalizer<W> for FinalizationRegistry<W> {
    fn register(&mut self, target: &W, token: Token) {
        let _ = self.cells.insert(token.raw(), target.clone());
    }

    fn unregister(&mut self, token: Token) -> bool {
        self.cells.remove(token.raw()).is_some()
    }

    fn collect(&mut self) -> Vec<Token> {
        let mut ready = Vec::new();
        self.cells.retain(|k, w| {
            if w.is_live() {
                true
            } else {
                ready.push(Token::new(k));
                false
            }
        });
        for token in &ready {
            trace!(?token, "finalizer delivered");
        }
        ready
    }

    fn clear(&mut self) {
        self.cells.clear();
    }

    fn pending(&self) -> usize {
        self.cells.len()
    }
}
