//! Production [`Clock`] implementation: wraps a host-supplied millisecond
//! counter plus a fixed-capacity scheduled-timeout table, mirroring the
//! teacher's `runtime::clock` split between a production clock and the
//! [`crate::testing::VirtualClock`] test double.
//!
//! Unlike [`crate::testing::VirtualClock`], this type never fires a callback
//! on its own — the core owns no threads or timer interrupts. The host
//! polls [`SystemClock::poll`] from its own event loop (alongside the matrix
//! scan) and feeds whatever comes back into [`crate::Dispatcher::handle_timeout`].

use arrayvec::ArrayVec;

use crate::behavior::KeyPos;
use crate::host::{Clock, TimeoutKind, Token};
use crate::queue::DEFAULT_QUEUE_CAPACITY;

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    token: Token,
    pos: KeyPos,
    kind: TimeoutKind,
    fire_at_ms: u32,
}

/// A due timeout handed back to the host by [`SystemClock::poll`], for it to
/// replay into [`crate::Dispatcher::handle_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTimeout {
    pub pos: KeyPos,
    pub kind: TimeoutKind,
    pub token: Token,
}

/// A [`Clock`] backed by a host-supplied `now_ms` function rather than a
/// virtual clock advanced by tests. `M` bounds how many timeouts can be
/// outstanding at once; size it to the paired [`crate::Dispatcher`]'s queue
/// capacity, since each active entry holds at most one pending timeout.
pub struct SystemClock<F, const M: usize = DEFAULT_QUEUE_CAPACITY>
where
    F: Fn() -> u32,
{
    now_fn: F,
    scheduled: ArrayVec<Scheduled, M>,
}

impl<F, const M: usize> SystemClock<F, M>
where
    F: Fn() -> u32,
{
    /// Wraps `now_fn`, the host's monotonic millisecond counter (e.g. a
    /// hardware timer read).
    pub fn new(now_fn: F) -> Self {
        Self {
            now_fn,
            scheduled: ArrayVec::new(),
        }
    }

    /// Number of timeouts currently outstanding.
    pub fn pending_count(&self) -> usize {
        self.scheduled.len()
    }

    /// Removes and returns every timeout due at or before the current time.
    /// The host calls this from its own poll loop and replays each result
    /// into `Dispatcher::handle_timeout`.
    pub fn poll(&mut self) -> ArrayVec<DueTimeout, M> {
        let now = self.now_ms();
        let mut due = ArrayVec::new();
        let mut remaining: ArrayVec<Scheduled, M> = ArrayVec::new();
        for s in self.scheduled.drain(..) {
            if s.fire_at_ms <= now {
                let _ = due.try_push(DueTimeout {
                    pos: s.pos,
                    kind: s.kind,
                    token: s.token,
                });
            } else {
                let _ = remaining.try_push(s);
            }
        }
        self.scheduled = remaining;
        due
    }
}

impl<F, const M: usize> Clock for SystemClock<F, M>
where
    F: Fn() -> u32,
{
    fn now_ms(&self) -> u32 {
        (self.now_fn)()
    }

    fn schedule(&mut self, delay_ms: u32, token: Token, pos: KeyPos, kind: TimeoutKind) {
        let fire_at_ms = self.now_ms().saturating_add(delay_ms);
        if self.scheduled.is_full() {
            // The dispatcher's own queue capacity bounds how many timeouts
            // should ever be outstanding at once; if `M` was undersized for
            // it anyway, drop the oldest rather than lose this one.
            self.scheduled.remove(0);
        }
        let _ = self.scheduled.try_push(Scheduled {
            token,
            pos,
            kind,
            fire_at_ms,
        });
    }

    fn cancel(&mut self, token: Token) {
        self.scheduled.retain(|s| s.token != token);
    }
}
