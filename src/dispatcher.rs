//! Top-level dispatcher: the entry point the host calls for every physical
//! key event, plus the scheduler-callback entry point for timeouts.

use arrayvec::ArrayVec;

use crate::behavior::{BehaviorKind, KeyPos, Keycode};
use crate::host::{Host, Token, TimeoutKind};
use crate::key_state::{KeyState, Phase};
use crate::queue::{ActiveQueue, DEFAULT_QUEUE_CAPACITY};

/// A single record of an output action the core produced, captured for test
/// assertions. Compiled in only under `cfg(test)` or the `introspection`
/// feature (`SPEC_FULL.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub pos: KeyPos,
    pub keycode: Keycode,
    pub pressed: bool,
    pub mods: u8,
    pub layer: u8,
    pub bypass: bool,
}

/// The tap/hold disambiguation engine. Holds no reference to the host; every
/// entry point takes the host capability as a parameter (`SPEC_FULL.md` §9).
#[derive(Debug)]
pub struct Dispatcher<const N: usize = DEFAULT_QUEUE_CAPACITY> {
    queue: ActiveQueue<N>,
    bypass: bool,
    next_token: u32,
    /// Feature flag from `SPEC_FULL.md` §4.5. See the doc comment on
    /// [`Dispatcher::process`] for why this implementation treats it as
    /// accepted-but-inert.
    global_mod_propagation: bool,
    /// Guards against a host capability (e.g. `emulate_key`) calling back
    /// into `process`/`handle_timeout` synchronously from within a call
    /// already in progress — a programming error, not a state this core is
    /// designed to handle (`SPEC_FULL.md` §7).
    #[cfg(debug_assertions)]
    in_dispatch: bool,
    #[cfg(any(test, feature = "introspection"))]
    history: alloc::vec::Vec<Record>,
}

impl<const N: usize> Dispatcher<N> {
    /// Creates a fresh dispatcher with an empty queue and bypass off.
    pub fn new(global_mod_propagation: bool) -> Self {
        Self {
            queue: ActiveQueue::new(),
            bypass: false,
            next_token: 0,
            global_mod_propagation,
            #[cfg(debug_assertions)]
            in_dispatch: false,
            #[cfg(any(test, feature = "introspection"))]
            history: alloc::vec::Vec::new(),
        }
    }

    #[cfg(debug_assertions)]
    fn enter_dispatch(&mut self) {
        debug_assert!(!self.in_dispatch, "reentrant call into Dispatcher::process/handle_timeout");
        self.in_dispatch = true;
    }

    #[cfg(debug_assertions)]
    fn exit_dispatch(&mut self) {
        self.in_dispatch = false;
    }

    #[cfg(not(debug_assertions))]
    fn enter_dispatch(&mut self) {}

    #[cfg(not(debug_assertions))]
    fn exit_dispatch(&mut self) {}

    /// Whether bypass is currently active.
    pub fn is_bypass(&self) -> bool {
        self.bypass
    }

    /// Sets the bypass flag (`SPEC_FULL.md` §6). While set, `process` always
    /// returns `true` and performs no state change.
    pub fn set_bypass(&mut self, on: bool) {
        self.bypass = on;
    }

    /// Number of entries currently in the active queue.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Whether `global_mod_propagation` was enabled at construction.
    pub fn global_mod_propagation(&self) -> bool {
        self.global_mod_propagation
    }

    /// Test-only record history of every output action produced so far.
    #[cfg(any(test, feature = "introspection"))]
    pub fn history(&self) -> &[Record] {
        &self.history
    }

    /// Test-only: clears all state back to its initial configuration.
    /// Cancels every pending scheduled timeout first.
    pub fn reset(&mut self, host: &mut impl Host) {
        for entry in self.queue.iter() {
            if let Some(token) = entry.pending_timeout() {
                host.cancel(token);
            }
        }
        self.queue.clear();
        self.bypass = false;
        self.next_token = 0;
        host.set_mods(0);
        host.set_layer(0);
        #[cfg(any(test, feature = "introspection"))]
        self.history.clear();
    }

    /// Host-called entry point for a physical matrix event. Returns `true`
    /// iff the downstream firmware should process the event unmodified,
    /// `false` iff the core consumed it.
    ///
    /// `global_mod_propagation` (§4.5) governs whether an already-emitted
    /// tap is retroactively patched when an earlier key's hold-promotion
    /// widens the effective mods after the fact. This implementation always
    /// defers a key's tap emission until it reaches the front of the queue
    /// in resolved order (the "tap rearrangement" rule that makes
    /// `test_stirred_mod_press` and `test_SKSK` pass), reading mods/layer
    /// live at that moment, so there is never a window in which an
    /// already-emitted tap needs correction — the flag is accepted for API
    /// parity with the original's two test layouts but does not change
    /// behavior here. See DESIGN.md.
    pub fn process(&mut self, host: &mut impl Host, keycode: Keycode, pos: KeyPos, pressed: bool) -> bool {
        if self.bypass {
            return true;
        }
        self.enter_dispatch();
        let result = if pressed {
            self.on_press(host, keycode, pos)
        } else {
            self.on_release_physical(host, pos)
        };
        self.exit_dispatch();
        result
    }

    /// Scheduler-callback entry point. The host calls this when a
    /// previously scheduled timeout fires, passing back the same `token`,
    /// `pos`, and `kind` it was given.
    pub fn handle_timeout(&mut self, host: &mut impl Host, pos: KeyPos, kind: TimeoutKind, token: Token) {
        self.enter_dispatch();
        let idx = match self.queue.index_of(pos) {
            Some(i) => i,
            None => {
                self.exit_dispatch();
                return;
            }
        };
        let current = self.queue.get(idx).and_then(|s| s.pending_timeout());
        if current != Some(token) {
            self.exit_dispatch();
            return; // stale callback: the owning state already advanced
        }
        let phase = self.queue.get(idx).map(|s| s.phase());
        match (phase, kind) {
            (Some(Phase::Touch), TimeoutKind::Tap) | (Some(Phase::Thl), TimeoutKind::Tap) => {
                if let Some(s) = self.queue.get_mut(idx) {
                    s.set_pending_timeout(None);
                }
                self.promote_to_hold(host, idx);
            }
            (Some(Phase::Tap), TimeoutKind::Follow) => {
                if let Some(s) = self.queue.get_mut(idx) {
                    s.set_pending_timeout(None);
                    s.transition_to_none();
                }
            }
            (Some(Phase::Release), TimeoutKind::Release) => {
                if let Some(s) = self.queue.get_mut(idx) {
                    s.set_pending_timeout(None);
                    s.transition_to_none();
                }
            }
            _ => {}
        }
        self.cascade(host);
        self.exit_dispatch();
    }

    // ---- press routing --------------------------------------------------

    fn on_press(&mut self, host: &mut impl Host, keycode: Keycode, pos: KeyPos) -> bool {
        if let Some(idx) = self.queue.index_of(pos) {
            match self.queue.get(idx).map(|s| s.phase()) {
                Some(Phase::Tap) => {
                    self.handle_same_key_pressed(host, idx);
                    return false;
                }
                Some(Phase::None) => {
                    // A stranded `None` entry that `drain_resolved_head`
                    // never reached because something ahead of it in the
                    // queue was still active when it resolved. Evict it here
                    // so at most one `KeyState` per `pos` ever exists.
                    self.queue.remove(idx);
                }
                None => {}
                Some(_) => {
                    self.force_finalize(host, idx);
                }
            }
        }

        let behavior = host.behavior_of(keycode);
        let now = host.now_ms();

        if (behavior.kind == BehaviorKind::Plain && self.queue.is_empty()) || self.queue.is_full() {
            return self.emit_plain_fast_path(host, keycode, pos, now);
        }

        self.notify_interference(host, pos);

        let mut state = KeyState::new(pos, keycode, behavior, now);
        // PLAIN keys carry no tap/hold ambiguity, so no TAP_TIMEOUT is armed
        // for them even when queued behind an earlier key: they simply wait
        // for their own physical release, then flush in order (SPEC_FULL.md
        // §4.1, §4.3).
        if behavior.is_smart() {
            let token = self.arm(host, pos, TimeoutKind::Tap, behavior.tap_timeout_ms);
            state.set_pending_timeout(Some(token));
        }
        let _ = self.queue.push(state);
        false
    }

    fn emit_plain_fast_path(&mut self, host: &mut impl Host, keycode: Keycode, pos: KeyPos, now: u32) -> bool {
        host.emulate_key(pos, true);
        self.record(host, pos, keycode, true);
        if !self.queue.is_full() {
            let _ = self.queue.push(KeyState::new_resolved_plain(pos, keycode, now));
        }
        false
    }

    /// Delivers `INTERFERING_KEY_PRESSED` to every other `Touch` entry.
    /// Only `Mte` behavior promotes eagerly; others suppress and wait.
    fn notify_interference(&mut self, host: &mut impl Host, new_pos: KeyPos) {
        let mut to_promote: ArrayVec<usize, N> = ArrayVec::new();
        for (idx, s) in self.queue.iter().enumerate() {
            if s.pos() == new_pos {
                continue;
            }
            if s.phase() == Phase::Touch && s.behavior().kind == BehaviorKind::Mte {
                let _ = to_promote.try_push(idx);
            }
        }
        for idx in to_promote {
            self.promote_to_hold(host, idx);
        }
    }

    fn handle_same_key_pressed(&mut self, host: &mut impl Host, idx: usize) {
        self.cancel_pending(host, idx);
        let now = host.now_ms();
        let (pos, behavior) = match self.queue.get(idx) {
            Some(s) => (s.pos(), s.behavior()),
            None => return,
        };
        if let Some(s) = self.queue.get_mut(idx) {
            s.transition_to_thl(now);
        }
        if behavior.is_smart() {
            let token = self.arm(host, pos, TimeoutKind::Tap, behavior.tap_timeout_ms);
            if let Some(s) = self.queue.get_mut(idx) {
                s.set_pending_timeout(Some(token));
            }
        }
    }

    /// Forces a stale queue entry for `pos` to its terminal transition
    /// synchronously, so a fresh physical press of the same position can be
    /// enqueued cleanly. Physically this should only arise for a repress
    /// landing in the `Release` settle window.
    fn force_finalize(&mut self, host: &mut impl Host, idx: usize) {
        match self.queue.get(idx).map(|s| s.phase()) {
            Some(Phase::Hold) => {
                let now = host.now_ms();
                self.finalize_hold_release(host, idx, now);
                self.cancel_pending(host, idx);
                if let Some(s) = self.queue.get_mut(idx) {
                    s.transition_to_none();
                }
            }
            Some(Phase::Touch) | Some(Phase::Thl) => {
                self.promote_to_hold(host, idx);
                self.force_finalize(host, idx);
            }
            Some(Phase::Release) => {
                self.cancel_pending(host, idx);
                if let Some(s) = self.queue.get_mut(idx) {
                    s.transition_to_none();
                }
            }
            Some(Phase::Tap) | Some(Phase::None) | None => {}
        }
        self.cascade(host);
    }

    // ---- release routing --------------------------------------------------

    fn on_release_physical(&mut self, host: &mut impl Host, pos: KeyPos) -> bool {
        let idx = match self.queue.index_of(pos) {
            Some(i) => i,
            None => return true,
        };
        let now = host.now_ms();
        match self.queue.get(idx).map(|s| s.phase()) {
            Some(Phase::Touch) | Some(Phase::Thl) => {
                self.cancel_pending(host, idx);
                // Resolved, but emission is deferred to `cascade` until this
                // entry reaches the head of the queue (SPEC_FULL.md §4.3).
                if let Some(s) = self.queue.get_mut(idx) {
                    s.transition_to_tap(now);
                }
            }
            Some(Phase::Hold) => {
                let is_smart = self.queue.get(idx).map(|s| s.behavior().is_smart()).unwrap_or(false);
                if is_smart && self.queue.has_unresolved_successor(idx) {
                    if let Some(s) = self.queue.get_mut(idx) {
                        s.buffer_release(now);
                    }
                } else {
                    self.finalize_hold_release(host, idx, now);
                }
            }
            _ => {}
        }
        self.cascade(host);
        false
    }

    // ---- tap / hold emission --------------------------------------------

    /// Performs the host-visible side of a tap resolution: the press+release
    /// pair (or macro register/unregister pair), read against whatever mods
    /// are live *right now*. Does not touch phase; the caller marks the
    /// entry emitted once this returns.
    fn emit_tap_output(&mut self, host: &mut impl Host, idx: usize) {
        let (pos, keycode, behavior) = match self.queue.get(idx) {
            Some(s) => (s.pos(), s.keycode(), s.behavior()),
            None => return,
        };
        match behavior.kind {
            BehaviorKind::MtOnMkey => {
                host.register_code(behavior.macro_kc);
                self.record(host, pos, behavior.macro_kc, true);
                host.unregister_code(behavior.macro_kc);
                self.record(host, pos, behavior.macro_kc, false);
            }
            _ => {
                host.emulate_key(pos, true);
                self.record(host, pos, keycode, true);
                host.emulate_key(pos, false);
                self.record(host, pos, keycode, false);
            }
        }
    }

    /// `Touch`/`Thl` -> `Hold`. Applies the mod/layer side effect and
    /// notifies the neighboring queue entries (`INTERFERING_KEY_RESOLVED` is
    /// implicit: once this entry is `Hold`, any still-`Touch` neighbor simply
    /// reads the now-updated mods/layer live when it eventually resolves).
    fn promote_to_hold(&mut self, host: &mut impl Host, idx: usize) {
        self.cancel_pending(host, idx);
        let behavior = match self.queue.get(idx) {
            Some(s) => s.behavior(),
            None => return,
        };
        let mut saved_layer = 0;
        match behavior.kind {
            BehaviorKind::Mt | BehaviorKind::Mte | BehaviorKind::MtOnMkey => {
                let mods = host.get_mods();
                host.set_mods(mods | behavior.mod_mask);
            }
            BehaviorKind::Lt => {
                saved_layer = host.get_layer();
                host.set_layer(behavior.layer);
            }
            BehaviorKind::Plain => {}
        }
        if let Some(state) = self.queue.get_mut(idx) {
            state.transition_to_hold(saved_layer);
        }
    }

    /// `Hold` -> `Release`, finalizing (not merely buffering) the release:
    /// unapplies the mod/layer and arms `REL_TIMEOUT`. A `Plain` resolved
    /// hold instead re-emits its matching `emulate_key` release, since it
    /// never applied a mod/layer in the first place.
    fn finalize_hold_release(&mut self, host: &mut impl Host, idx: usize, now: u32) {
        let (pos, keycode, behavior, saved_layer) = match self.queue.get(idx) {
            Some(s) => (s.pos(), s.keycode(), s.behavior(), s.saved_layer()),
            None => return,
        };
        match behavior.kind {
            BehaviorKind::Plain => {
                host.emulate_key(pos, false);
                self.record(host, pos, keycode, false);
            }
            BehaviorKind::Mt | BehaviorKind::Mte | BehaviorKind::MtOnMkey => {
                let mods = host.get_mods();
                host.set_mods(mods & !behavior.mod_mask);
            }
            BehaviorKind::Lt => {
                host.set_layer(saved_layer);
            }
        }
        let token = self.arm(host, pos, TimeoutKind::Release, behavior.rel_timeout_ms);
        if let Some(s) = self.queue.get_mut(idx) {
            s.transition_to_release(now);
            s.set_pending_timeout(Some(token));
        }
    }

    // ---- queue cascade -----------------------------------------------------

    /// Drains resolved (`None`) entries from the head; finalizes any `Hold`
    /// with a buffered release once none of its successors are still
    /// unresolved (the symmetric half of `SPEC_FULL.md` §4.3); and flushes
    /// every resolved-but-unemitted `Tap` that has no unresolved entry
    /// ahead of it (the primary ordering rule: host-visible output always
    /// respects queue order). Repeats until a full pass makes no further
    /// progress.
    fn cascade(&mut self, host: &mut impl Host) {
        loop {
            let popped = self.queue.drain_resolved_head();
            let mut changed = popped > 0;

            if self.flush_ready_holds(host) {
                changed = true;
            }

            if self.flush_ready_taps(host) {
                changed = true;
            }

            if !changed {
                break;
            }
        }
    }

    /// Finalizes every `Hold` entry with a buffered release whose
    /// successors have all settled. Not limited to the tail: a buffered
    /// `Hold` can sit ahead of an entry that itself just flushed its own
    /// tap (settled but not yet `None`).
    fn flush_ready_holds(&mut self, host: &mut impl Host) -> bool {
        let mut flushed_any = false;
        for idx in 0..self.queue.len() {
            let ready = match self.queue.get(idx) {
                Some(s) if s.phase() == Phase::Hold => s.release_pending(),
                _ => None,
            };
            if let Some(release_time) = ready {
                if !self.queue.has_unresolved_successor(idx) {
                    self.finalize_hold_release(host, idx, release_time);
                    flushed_any = true;
                }
            }
        }
        flushed_any
    }

    /// Walks the queue from the head, flushing every resolved-but-unemitted
    /// `Tap` it finds, and stops at the first entry still genuinely
    /// ambiguous (`Touch`/`Thl`) since nothing behind that can be known to
    /// be in final order yet. A settled `Hold`/`Release` ahead does not
    /// block — only undecided tap/hold ambiguity does.
    fn flush_ready_taps(&mut self, host: &mut impl Host) -> bool {
        let mut flushed_any = false;
        let mut idx = 0;
        while idx < self.queue.len() {
            let phase = match self.queue.get(idx) {
                Some(s) => s.phase(),
                None => break,
            };
            if matches!(phase, Phase::Touch | Phase::Thl) {
                break;
            }
            if phase == Phase::Tap && !self.queue.get(idx).map(|s| s.emitted()).unwrap_or(true) {
                self.emit_tap_output(host, idx);
                let (pos, follow_timeout) = match self.queue.get(idx) {
                    Some(s) => (s.pos(), s.behavior().follow_timeout_ms),
                    None => break,
                };
                let token = self.arm(host, pos, TimeoutKind::Follow, follow_timeout);
                if let Some(s) = self.queue.get_mut(idx) {
                    s.set_pending_timeout(Some(token));
                    s.mark_emitted();
                }
                flushed_any = true;
            }
            idx += 1;
        }
        flushed_any
    }

    // ---- scheduler helpers --------------------------------------------------

    fn mint_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token = self.next_token.wrapping_add(1);
        token
    }

    fn arm(&mut self, host: &mut impl Host, pos: KeyPos, kind: TimeoutKind, delay_ms: u32) -> Token {
        let token = self.mint_token();
        host.schedule(delay_ms, token, pos, kind);
        token
    }

    fn cancel_pending(&mut self, host: &mut impl Host, idx: usize) {
        let pending = self.queue.get(idx).and_then(|s| s.pending_timeout());
        if let Some(token) = pending {
            host.cancel(token);
        }
        if let Some(entry) = self.queue.get_mut(idx) {
            entry.set_pending_timeout(None);
        }
    }

    #[cfg(any(test, feature = "introspection"))]
    fn record(&mut self, host: &impl Host, pos: KeyPos, keycode: Keycode, pressed: bool) {
        self.history.push(Record {
            pos,
            keycode,
            pressed,
            mods: host.get_mods(),
            layer: host.get_layer(),
            bypass: self.bypass,
        });
    }

    #[cfg(not(any(test, feature = "introspection")))]
    fn record(&mut self, _host: &impl Host, _pos: KeyPos, _keycode: Keycode, _pressed: bool) {}
}
