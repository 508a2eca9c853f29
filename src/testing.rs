//! Deterministic test doubles: a virtual clock and a scripted host, used by
//! the scenario tests in `tests/` and by doc examples. Compiled in only
//! under `cfg(test)` or the `introspection` feature.

use alloc::vec::Vec;

use crate::behavior::{Behavior, BehaviorTable, KeyPos, Keycode};
use crate::dispatcher::{Dispatcher, Record};
use crate::host::{Clock, HostIo, TimeoutKind, Token};
use crate::queue::DEFAULT_QUEUE_CAPACITY;

#[derive(Debug, Clone, Copy)]
struct ScheduledTimeout {
    token: Token,
    pos: KeyPos,
    kind: TimeoutKind,
    fire_at_ms: u32,
    active: bool,
}

/// A [`Clock`] that only advances when told to. Every scheduled timeout is
/// recorded so a test can fire it directly via [`Harness::fire`] instead of
/// sleeping real time.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_ms: u32,
    scheduled: Vec<ScheduledTimeout>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the virtual clock by `ms`. Does not fire anything itself;
    /// tests drive callbacks explicitly through [`Dispatcher::handle_timeout`].
    pub fn advance(&mut self, ms: u32) {
        self.now_ms += ms;
    }

    /// Still-armed tokens, oldest scheduled first.
    pub fn pending_tokens(&self) -> Vec<Token> {
        self.scheduled.iter().filter(|s| s.active).map(|s| s.token).collect()
    }

    /// Tokens armed to fire at or before the current time.
    pub fn due_tokens(&self) -> Vec<Token> {
        self.scheduled
            .iter()
            .filter(|s| s.active && s.fire_at_ms <= self.now_ms)
            .map(|s| s.token)
            .collect()
    }

    fn lookup(&self, token: Token) -> Option<(KeyPos, TimeoutKind)> {
        self.scheduled
            .iter()
            .find(|s| s.active && s.token == token)
            .map(|s| (s.pos, s.kind))
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> u32 {
        self.now_ms
    }

    fn schedule(&mut self, delay_ms: u32, token: Token, pos: KeyPos, kind: TimeoutKind) {
        self.scheduled.push(ScheduledTimeout {
            token,
            pos,
            kind,
            fire_at_ms: self.now_ms.saturating_add(delay_ms),
            active: true,
        });
    }

    fn cancel(&mut self, token: Token) {
        if let Some(s) = self.scheduled.iter_mut().find(|s| s.token == token) {
            s.active = false;
        }
    }
}

/// A scripted [`HostIo`]: tracks mods/layer in memory, and lets a test
/// register certain positions as raw hardware modifiers whose
/// [`emulate_key`](HostIo::emulate_key) calls flip a mod bit exactly as the
/// (out-of-scope) downstream firmware would for a physical modifier key
/// wired outside this crate's behavior table.
#[derive(Debug, Default)]
pub struct SimIo {
    mods: u8,
    layer: u8,
    raw_mod_keys: Vec<(KeyPos, u8)>,
}

impl SimIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pos` as a raw hardware modifier asserting `mod_bit` on
    /// emulated press.
    pub fn with_raw_mod_key(mut self, pos: KeyPos, mod_bit: u8) -> Self {
        self.raw_mod_keys.push((pos, mod_bit));
        self
    }
}

impl HostIo for SimIo {
    fn emulate_key(&mut self, pos: KeyPos, pressed: bool) {
        if let Some((_, bit)) = self.raw_mod_keys.iter().find(|(p, _)| *p == pos) {
            if pressed {
                self.mods |= bit;
            } else {
                self.mods &= !bit;
            }
        }
    }

    fn register_code(&mut self, _kc: Keycode) {}

    fn unregister_code(&mut self, _kc: Keycode) {}

    fn get_mods(&self) -> u8 {
        self.mods
    }

    fn set_mods(&mut self, mods: u8) {
        self.mods = mods;
    }

    fn get_layer(&self) -> u8 {
        self.layer
    }

    fn set_layer(&mut self, layer: u8) {
        self.layer = layer;
    }
}

struct HostView<'a, B> {
    clock: &'a mut VirtualClock,
    io: &'a mut SimIo,
    table: &'a B,
}

impl<'a, B: BehaviorTable> Clock for HostView<'a, B> {
    fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    fn schedule(&mut self, delay_ms: u32, token: Token, pos: KeyPos, kind: TimeoutKind) {
        self.clock.schedule(delay_ms, token, pos, kind);
    }

    fn cancel(&mut self, token: Token) {
        self.clock.cancel(token);
    }
}

impl<'a, B: BehaviorTable> HostIo for HostView<'a, B> {
    fn emulate_key(&mut self, pos: KeyPos, pressed: bool) {
        self.io.emulate_key(pos, pressed);
    }

    fn register_code(&mut self, kc: Keycode) {
        self.io.register_code(kc);
    }

    fn unregister_code(&mut self, kc: Keycode) {
        self.io.unregister_code(kc);
    }

    fn get_mods(&self) -> u8 {
        self.io.get_mods()
    }

    fn set_mods(&mut self, mods: u8) {
        self.io.set_mods(mods);
    }

    fn get_layer(&self) -> u8 {
        self.io.get_layer()
    }

    fn set_layer(&mut self, layer: u8) {
        self.io.set_layer(layer);
    }
}

impl<'a, B: BehaviorTable> BehaviorTable for HostView<'a, B> {
    fn behavior_of(&self, keycode: Keycode) -> Behavior {
        self.table.behavior_of(keycode)
    }
}

/// Bundles a [`Dispatcher`] with a virtual clock and scripted I/O so a test
/// can drive presses, releases, and timeout firings deterministically and
/// inspect what the core would have told the host to do.
pub struct Harness<B: BehaviorTable, const N: usize = DEFAULT_QUEUE_CAPACITY> {
    pub dispatcher: Dispatcher<N>,
    pub clock: VirtualClock,
    pub io: SimIo,
    pub table: B,
}

impl<B: BehaviorTable, const N: usize> Harness<B, N> {
    pub fn new(table: B, global_mod_propagation: bool) -> Self {
        Self {
            dispatcher: Dispatcher::new(global_mod_propagation),
            clock: VirtualClock::new(),
            io: SimIo::new(),
            table,
        }
    }

    pub fn with_io(table: B, io: SimIo, global_mod_propagation: bool) -> Self {
        Self {
            dispatcher: Dispatcher::new(global_mod_propagation),
            clock: VirtualClock::new(),
            io,
            table,
        }
    }

    /// Delivers a physical press. Returns `true` iff the core left the event
    /// for the host to process unmodified.
    pub fn press(&mut self, keycode: Keycode, pos: KeyPos) -> bool {
        let Self { dispatcher, clock, io, table } = self;
        let mut host = HostView { clock, io, table: &*table };
        dispatcher.process(&mut host, keycode, pos, true)
    }

    /// Delivers a physical release.
    pub fn release(&mut self, keycode: Keycode, pos: KeyPos) -> bool {
        let Self { dispatcher, clock, io, table } = self;
        let mut host = HostView { clock, io, table: &*table };
        dispatcher.process(&mut host, keycode, pos, false)
    }

    /// Advances the virtual clock without firing any timeout.
    pub fn advance(&mut self, ms: u32) {
        self.clock.advance(ms);
    }

    /// Fires a previously scheduled timeout, if it is still armed.
    pub fn fire(&mut self, token: Token) {
        if let Some((pos, kind)) = self.clock.lookup(token) {
            let Self { dispatcher, clock, io, table } = self;
            let mut host = HostView { clock, io, table: &*table };
            dispatcher.handle_timeout(&mut host, pos, kind, token);
        }
    }

    /// Fires every timeout currently due at the virtual clock's present time.
    pub fn fire_due(&mut self) {
        for token in self.clock.due_tokens() {
            self.fire(token);
        }
    }

    pub fn pending_tokens(&self) -> Vec<Token> {
        self.clock.pending_tokens()
    }

    pub fn mods(&self) -> u8 {
        self.io.get_mods()
    }

    pub fn layer(&self) -> u8 {
        self.io.get_layer()
    }

    pub fn history(&self) -> &[Record] {
        self.dispatcher.history()
    }

    pub fn set_bypass(&mut self, on: bool) {
        self.dispatcher.set_bypass(on);
    }

    pub fn is_bypass(&self) -> bool {
        self.dispatcher.is_bypass()
    }

    pub fn reset(&mut self) {
        let Self { dispatcher, clock, io, table } = self;
        let mut host = HostView { clock, io, table: &*table };
        dispatcher.reset(&mut host);
    }
}
