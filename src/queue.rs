//! Bounded, FIFO-ordered active-key queue.
//!
//! Mirrors the teacher's `PendingKeyRegistry`, but ordered (a plain `Vec`-like
//! `ArrayVec` rather than swap-remove) since queue *position* is load-bearing
//! here: head-of-line resolution and the symmetric buffered-release rule
//! both depend on "earlier" / "later" within the queue, not just membership.

use crate::behavior::KeyPos;
use crate::key_state::{KeyState, Phase};
use arrayvec::ArrayVec;

/// Default queue capacity, per `SPEC_FULL.md` §7 ("the reference
/// implementation caps at 8").
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// Ordered sequence of [`KeyState`]. Head (index 0) is the oldest
/// unresolved entry.
#[derive(Debug, Clone)]
pub struct ActiveQueue<const N: usize = DEFAULT_QUEUE_CAPACITY> {
    entries: ArrayVec<KeyState, N>,
}

impl<const N: usize> Default for ActiveQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ActiveQueue<N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            entries: ArrayVec::new_const(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Appends a new entry at the tail. Fails (returning the state back) if
    /// the queue is at capacity.
    pub fn push(&mut self, state: KeyState) -> Result<(), KeyState> {
        self.entries.try_push(state).map_err(|e| e.element())
    }

    pub fn index_of(&self, pos: KeyPos) -> Option<usize> {
        self.entries.iter().position(|s| s.pos() == pos)
    }

    pub fn get(&self, idx: usize) -> Option<&KeyState> {
        self.entries.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut KeyState> {
        self.entries.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyState> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut KeyState> {
        self.entries.iter_mut()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether any entry at an index greater than `idx` is still
    /// unresolved (see `KeyState::is_unresolved`). Used for the symmetric
    /// buffered-release rule (§4.3): a `Hold`'s own release waits only on
    /// successors whose output could still change, not on ones that have
    /// already settled or flushed.
    pub fn has_unresolved_successor(&self, idx: usize) -> bool {
        self.entries.iter().skip(idx + 1).any(KeyState::is_unresolved)
    }

    /// Removes every leading run of `Phase::None` entries from the head,
    /// preserving order of the remainder. Returns how many were popped.
    pub fn drain_resolved_head(&mut self) -> usize {
        let mut popped = 0;
        while matches!(self.entries.first().map(|s| s.phase()), Some(Phase::None)) {
            self.entries.remove(0);
            popped += 1;
        }
        popped
    }

    /// Removes a single entry at `idx` (e.g. a `PLAIN` fast-path entry once
    /// resolved), preserving order.
    pub fn remove(&mut self, idx: usize) -> Option<KeyState> {
        if idx < self.entries.len() {
            Some(self.entries.remove(idx))
        } else {
            None
        }
    }
}
