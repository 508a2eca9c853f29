//! Per-key state machine: the `Phase` lifecycle and the `KeyState` instance
//! that drives tap/hold/release resolution for one active smart key.

use crate::behavior::{Behavior, KeyPos, Keycode};
use crate::host::Token;

/// Emits a `log::trace!` of a phase transition under `cfg(debug_assertions)`
/// only; compiled out entirely in release builds.
macro_rules! log_transition {
    ($pos:expr, $from:expr, $to:expr) => {
        #[cfg(debug_assertions)]
        log::trace!("key {:?}: {:?} -> {:?}", $pos, $from, $to);
    };
}

/// Lifecycle phase of a [`KeyState`]. See `SPEC_FULL.md` §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Terminal; about to be popped from the queue.
    None,
    /// Physical press received, interpretation pending.
    Touch,
    /// Released within `TAP_TIMEOUT` with no interference; logically tapped.
    Tap,
    /// Tap-then-hold-latent: the same key was re-pressed within
    /// `FOLLOW_TIMEOUT` after a `Tap`.
    Thl,
    /// Promoted to hold; modifier applied / layer engaged.
    Hold,
    /// Hold was released; brief terminal settle window.
    Release,
}

/// One active smart key currently in flight in the queue.
#[derive(Debug, Clone)]
pub struct KeyState {
    pos: KeyPos,
    keycode: Keycode,
    behavior: Behavior,
    phase: Phase,
    tap_count: u8,
    press_time_ms: u32,
    release_time_ms: u32,
    pending_timeout: Option<Token>,
    /// Set when a `Hold`'s physical release arrived but finalization was
    /// buffered behind a younger, still-unresolved queue entry. Holds the
    /// physical release timestamp for when the buffered release flushes.
    release_pending: Option<u32>,
    /// Whether a `Tap` resolution has already been flushed to the host.
    /// A tap resolves (phase -> `Tap`) at physical release, but its
    /// emission is deferred until it reaches the head of the queue
    /// (`SPEC_FULL.md` §4.3) — this tracks which side of that gap it's on.
    emitted: bool,
    promoted: bool,
    saved_layer: u8,
}

impl KeyState {
    /// Creates a new `KeyState` in phase `Touch`, as if just pressed.
    pub fn new(pos: KeyPos, keycode: Keycode, behavior: Behavior, press_time_ms: u32) -> Self {
        Self {
            pos,
            keycode,
            behavior,
            phase: Phase::Touch,
            tap_count: 0,
            press_time_ms,
            release_time_ms: 0,
            pending_timeout: None,
            release_pending: None,
            emitted: false,
            promoted: false,
            saved_layer: 0,
        }
    }

    /// Creates an already-resolved `Hold` entry for a `PLAIN` key so it still
    /// occupies a queue slot (see `SPEC_FULL.md` §4.1).
    pub fn new_resolved_plain(pos: KeyPos, keycode: Keycode, press_time_ms: u32) -> Self {
        Self {
            pos,
            keycode,
            behavior: Behavior::plain(),
            phase: Phase::Hold,
            tap_count: 0,
            press_time_ms,
            release_time_ms: 0,
            pending_timeout: None,
            release_pending: None,
            emitted: true,
            promoted: true,
            saved_layer: 0,
        }
    }

    pub fn pos(&self) -> KeyPos {
        self.pos
    }

    pub fn keycode(&self) -> Keycode {
        self.keycode
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tap_count(&self) -> u8 {
        self.tap_count
    }

    pub fn press_time_ms(&self) -> u32 {
        self.press_time_ms
    }

    pub fn promoted(&self) -> bool {
        self.promoted
    }

    pub fn saved_layer(&self) -> u8 {
        self.saved_layer
    }

    pub fn pending_timeout(&self) -> Option<Token> {
        self.pending_timeout
    }

    pub fn set_pending_timeout(&mut self, token: Option<Token>) {
        self.pending_timeout = token;
    }

    pub fn release_pending(&self) -> Option<u32> {
        self.release_pending
    }

    pub fn emitted(&self) -> bool {
        self.emitted
    }

    pub fn mark_emitted(&mut self) {
        self.emitted = true;
    }

    /// Whether this entry's eventual host-visible output still depends on
    /// context that could change: `Touch`/`Thl` haven't decided tap-vs-hold
    /// yet, and a resolved `Tap` that hasn't flushed still needs to read
    /// live mods/layer at emission time. `Hold`, `Release`, and an already
    /// emitted `Tap` are settled as far as anything else in the queue is
    /// concerned, even though they haven't reached `None` yet.
    pub fn is_unresolved(&self) -> bool {
        matches!(self.phase, Phase::Touch | Phase::Thl) || (self.phase == Phase::Tap && !self.emitted)
    }

    /// `Touch`/`Thl` -> `Hold`. Applies nothing to global state itself; the
    /// caller (dispatcher) is responsible for the mod/layer side effects.
    pub fn transition_to_hold(&mut self, saved_layer: u8) {
        debug_assert!(matches!(self.phase, Phase::Touch | Phase::Thl));
        log_transition!(self.pos, self.phase, Phase::Hold);
        self.phase = Phase::Hold;
        self.promoted = true;
        self.saved_layer = saved_layer;
    }

    /// `Touch`/`Thl` -> `Tap`. Records the release time; the emission
    /// itself is deferred until this entry reaches the head of the queue,
    /// so this also clears `emitted` to mark it pending.
    pub fn transition_to_tap(&mut self, release_time_ms: u32) {
        debug_assert!(matches!(self.phase, Phase::Touch | Phase::Thl));
        log_transition!(self.pos, self.phase, Phase::Tap);
        self.phase = Phase::Tap;
        self.release_time_ms = release_time_ms;
        self.emitted = false;
    }

    /// `Tap` -> `Thl`. A same-key repress within `FOLLOW_TIMEOUT`.
    pub fn transition_to_thl(&mut self, press_time_ms: u32) {
        debug_assert_eq!(self.phase, Phase::Tap);
        log_transition!(self.pos, self.phase, Phase::Thl);
        self.phase = Phase::Thl;
        self.tap_count = self.tap_count.saturating_add(1);
        self.press_time_ms = press_time_ms;
    }

    /// `Hold` -> `Release`. The caller has already performed the
    /// unapply/emit side effects; this only updates bookkeeping.
    pub fn transition_to_release(&mut self, release_time_ms: u32) {
        debug_assert_eq!(self.phase, Phase::Hold);
        log_transition!(self.pos, self.phase, Phase::Release);
        self.phase = Phase::Release;
        self.release_time_ms = release_time_ms;
        self.release_pending = None;
    }

    /// Marks a `Hold`'s physical release as buffered behind a younger
    /// unresolved entry, without changing phase.
    pub fn buffer_release(&mut self, release_time_ms: u32) {
        debug_assert_eq!(self.phase, Phase::Hold);
        self.release_pending = Some(release_time_ms);
    }

    /// Any phase -> `None`. Terminal.
    pub fn transition_to_none(&mut self) {
        log_transition!(self.pos, self.phase, Phase::None);
        self.phase = Phase::None;
    }
}
