//! Host capability traits: the narrow surface the core calls out to, and the
//! deferred-timeout scheduler abstraction that drives its timing decisions.
//!
//! Per the design notes, these are passed as parameters to each dispatcher
//! entry point rather than stored as free-standing globals — this is what
//! makes it trivial to inject a recording test double.

use crate::behavior::{BehaviorTable, KeyPos, Keycode};

/// Opaque handle to a scheduled deferred timeout. Minted by the core's own
/// monotonic counter (see `SPEC_FULL.md` §9); the host never generates one,
/// only holds it until it fires or is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub(crate) u32);

/// Which per-key timer a scheduled callback corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// `TAP_TIMEOUT`: TOUCH/THL promotes to HOLD if it fires.
    Tap,
    /// `SEQ_TIMEOUT`: multi-tap run collapse guard.
    Seq,
    /// `FOLLOW_TIMEOUT`: window after a TAP during which a same-key press
    /// folds into THL.
    Follow,
    /// `REL_TIMEOUT`: settle window after a HOLD's release.
    Release,
}

/// Monotonic time source plus deferred-callback scheduling. The core owns no
/// threads and no timers of its own; every time-driven transition arrives as
/// a callback the host fires by calling back into the dispatcher with the
/// same `Token` it was given.
pub trait Clock {
    /// Current monotonic time in milliseconds.
    fn now_ms(&self) -> u32;

    /// Schedules a callback for `token` to fire after `delay_ms`, for the key
    /// at `pos`, of kind `kind`. The host is only responsible for firing the
    /// callback at (or after) the requested time; staleness is handled by the
    /// core re-validating `token` when the callback arrives.
    fn schedule(&mut self, delay_ms: u32, token: Token, pos: KeyPos, kind: TimeoutKind);

    /// Cancels a previously scheduled token. If the callback has already
    /// fired or is about to, this may be a no-op — the core re-validates on
    /// receipt regardless.
    fn cancel(&mut self, token: Token);
}

/// Output capability: the downstream firmware operations the core drives.
pub trait HostIo {
    /// Injects a synthesized key event as if it came from the matrix.
    fn emulate_key(&mut self, pos: KeyPos, pressed: bool);

    /// Directly registers a keycode with the HID report (no matrix replay).
    fn register_code(&mut self, kc: Keycode);

    /// Directly unregisters a keycode from the HID report.
    fn unregister_code(&mut self, kc: Keycode);

    /// Reads the current effective modifier byte.
    fn get_mods(&self) -> u8;

    /// Writes the modifier byte.
    fn set_mods(&mut self, mods: u8);

    /// Reads the current active layer index.
    fn get_layer(&self) -> u8;

    /// Writes the active layer index.
    fn set_layer(&mut self, layer: u8);
}

/// Full capability set the dispatcher needs from its host: clock, key I/O,
/// and behavior lookup, bundled so call sites can take one type parameter.
pub trait Host: Clock + HostIo + BehaviorTable {}

impl<T: Clock + HostIo + BehaviorTable> Host for T {}
