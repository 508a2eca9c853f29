//! Scenario-level integration tests, exercising the dispatcher the same way
//! a host firmware would: a physical press/release stream plus explicit
//! timeout firings, driven through the virtual-clock test harness.

use tapkey_core::testing::{Harness, SimIo};
use tapkey_core::{Behavior, BehaviorTable, KeyPos, Keycode};

const K1: Keycode = Keycode(1);
const K1_POS: KeyPos = KeyPos::new(0, 0);
const K2: Keycode = Keycode(2);
const K2_POS: KeyPos = KeyPos::new(0, 1);
const SHIFT: Keycode = Keycode(10);
const SHIFT_POS: KeyPos = KeyPos::new(1, 0);
const CTRL: Keycode = Keycode(20);
const CTRL_POS: KeyPos = KeyPos::new(1, 1);
const MT1: Keycode = Keycode(21);
const MT1_POS: KeyPos = KeyPos::new(1, 2);
const LT1: Keycode = Keycode(30);
const LT1_POS: KeyPos = KeyPos::new(2, 0);
const MTE1: Keycode = Keycode(40);
const MTE1_POS: KeyPos = KeyPos::new(2, 1);
const MKEY1: Keycode = Keycode(50);
const MKEY1_POS: KeyPos = KeyPos::new(2, 2);
const MACRO_KC: Keycode = Keycode(99);

const SHIFT_BIT: u8 = 0x02;
const CTRL_BIT: u8 = 0x01;
const MT1_BIT: u8 = 0x04;
const MTE1_BIT: u8 = 0x08;
const MKEY1_BIT: u8 = 0x10;

struct TestLayout;

impl BehaviorTable for TestLayout {
    fn behavior_of(&self, keycode: Keycode) -> Behavior {
        match keycode {
            CTRL => Behavior::mod_tap(CTRL_BIT),
            MT1 => Behavior::mod_tap(MT1_BIT),
            LT1 => Behavior::layer_tap(1),
            MTE1 => Behavior::mod_tap_eager(MTE1_BIT),
            MKEY1 => Behavior::mod_tap_on_macro_key(MKEY1_BIT, MACRO_KC),
            _ => Behavior::plain(),
        }
    }
}

fn harness() -> Harness<TestLayout> {
    Harness::with_io(TestLayout, SimIo::new().with_raw_mod_key(SHIFT_POS, SHIFT_BIT), false)
}

#[test]
fn generic_tap_emits_press_and_release_with_no_mods() {
    let mut h = harness();
    assert!(!h.press(K1, K1_POS));
    assert!(!h.release(K1, K1_POS));

    let history = h.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].keycode, K1);
    assert!(history[0].pressed);
    assert_eq!(history[0].mods, 0);
    assert_eq!(history[1].keycode, K1);
    assert!(!history[1].pressed);
}

#[test]
fn mod_tap_quick_release_resolves_as_tap() {
    let mut h = harness();
    h.press(CTRL, CTRL_POS);
    h.advance(50);
    h.release(CTRL, CTRL_POS);

    assert_eq!(h.mods(), 0, "a tapped MT must never apply its own mod_mask");
    let history = h.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].keycode, CTRL);
    assert!(history[0].pressed);
    assert!(!history[1].pressed);
}

#[test]
fn mod_tap_held_past_timeout_applies_then_unapplies_mod() {
    let mut h = harness();
    h.press(CTRL, CTRL_POS);
    h.advance(201);
    h.fire_due();
    assert_eq!(h.mods(), CTRL_BIT);
    assert!(h.history().is_empty(), "hold promotion never emits a keystroke");

    h.release(CTRL, CTRL_POS);
    assert_eq!(h.mods(), 0);
    assert!(h.history().is_empty());
}

#[test]
fn raw_modifier_key_updates_mods_through_plain_passthrough() {
    let mut h = harness();
    h.press(SHIFT, SHIFT_POS);
    assert_eq!(h.mods(), SHIFT_BIT);
    h.release(SHIFT, SHIFT_POS);
    assert_eq!(h.mods(), 0);
}

#[test]
fn layer_tap_hold_switches_and_restores_the_layer() {
    let mut h = harness();
    h.press(LT1, LT1_POS);
    h.advance(201);
    h.fire_due();
    assert_eq!(h.layer(), 1);

    h.press(K1, K1_POS);
    h.release(K1, K1_POS);
    assert_eq!(h.layer(), 1, "the outer held layer-tap is still engaged");

    h.release(LT1, LT1_POS);
    assert_eq!(h.layer(), 0);
}

#[test]
fn independent_taps_interleave_without_waiting_on_each_other() {
    let mut h = harness();
    h.press(K1, K1_POS);
    h.press(K2, K2_POS);
    h.release(K1, K1_POS);
    h.release(K2, K2_POS);

    let history = h.history();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].keycode, K1);
    assert_eq!(history[1].keycode, K1);
    assert_eq!(history[2].keycode, K2);
    assert_eq!(history[3].keycode, K2);
}

/// Grounded on `test_stirred_mod_press` in the original test suite: a
/// modifier's own physical release can arrive before a younger queued key
/// has resolved, yet the modifier stays effective (and unreported to the
/// host) until that younger key settles.
#[test]
fn stirred_mod_press_buffers_the_outer_hold_release() {
    let mut h = harness();
    h.press(CTRL, CTRL_POS);
    h.advance(201);
    h.fire_due();
    assert_eq!(h.mods(), CTRL_BIT);

    h.press(K1, K1_POS);
    h.release(CTRL, CTRL_POS);
    // The release is buffered: CTRL's mod is still asserted, nothing emitted.
    assert_eq!(h.mods(), CTRL_BIT);
    assert!(h.history().is_empty());

    h.release(K1, K1_POS);
    // K1's tap is recorded under CTRL's still-held mod, and CTRL's buffered
    // release flushes in the same cascade once K1 has itself emitted.
    let history = h.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].mods, CTRL_BIT);
    assert_eq!(h.mods(), 0, "K1 emitted, so CTRL's buffered release flushes right away");

    h.advance(201);
    h.fire_due();
    assert_eq!(h.dispatcher.queue_len(), 0);
}

/// Grounded on `test_stirred_mod_smtd_press`: the younger key behind the
/// buffered hold is itself a smart (mod-tap) key whose own tap reads the
/// outer mod live, the same way a plain key's tap does.
#[test]
fn stirred_mod_smtd_press_reads_live_mods_on_inner_tap() {
    let mut h = harness();
    h.press(CTRL, CTRL_POS);
    h.advance(201);
    h.fire_due();
    assert_eq!(h.mods(), CTRL_BIT);

    h.press(MT1, MT1_POS);
    h.release(CTRL, CTRL_POS);
    assert_eq!(h.mods(), CTRL_BIT);

    h.release(MT1, MT1_POS);
    let history = h.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].keycode, MT1);
    assert_eq!(history[0].mods, CTRL_BIT, "MT1's own tap read CTRL's mod live, before it unapplied");
    assert_eq!(h.mods(), 0, "CTRL's buffered release flushes as soon as MT1 resolves");

    h.advance(201);
    h.fire_due();
    assert_eq!(h.dispatcher.queue_len(), 0);
}

/// MTE promotes to hold the instant another key interferes, rather than
/// waiting for its own `TAP_TIMEOUT`.
#[test]
fn mod_tap_eager_promotes_on_first_interfering_keypress() {
    let mut h = harness();
    h.press(MTE1, MTE1_POS);
    assert_eq!(h.mods(), 0, "not yet promoted from its own press alone");

    h.press(K1, K1_POS);
    assert_eq!(h.mods(), MTE1_BIT, "MTE promotes eagerly the instant another key interferes");

    h.release(K1, K1_POS);
    let history = h.history();
    assert_eq!(history.len(), 2, "K1's tap flushed once MTE1 settled as HOLD ahead of it");
    assert_eq!(history[0].mods, MTE1_BIT, "K1's tap read MTE1's eagerly-applied mod live");

    h.release(MTE1, MTE1_POS);
    assert_eq!(h.mods(), 0);
}

/// A quick tap of an `MT_ON_MKEY` key emits the configured macro keycode
/// through `register_code`/`unregister_code`, not the physical keycode.
#[test]
fn mt_on_mkey_tap_emits_the_macro_keycode() {
    let mut h = harness();
    h.press(MKEY1, MKEY1_POS);
    h.advance(50);
    h.release(MKEY1, MKEY1_POS);

    let history = h.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].keycode, MACRO_KC);
    assert!(history[0].pressed);
    assert_eq!(history[1].keycode, MACRO_KC);
    assert!(!history[1].pressed);
}

/// Held past `TAP_TIMEOUT`, `MT_ON_MKEY` applies its mod exactly like an
/// ordinary mod-tap; only the tap side differs.
#[test]
fn mt_on_mkey_hold_applies_its_mod_like_an_ordinary_mod_tap() {
    let mut h = harness();
    h.press(MKEY1, MKEY1_POS);
    h.advance(201);
    h.fire_due();
    assert_eq!(h.mods(), MKEY1_BIT);
    assert!(h.history().is_empty(), "hold promotion never emits a keystroke");

    h.release(MKEY1, MKEY1_POS);
    assert_eq!(h.mods(), 0);
}

/// A same-key repress within `FOLLOW_TIMEOUT` of a resolved tap folds into
/// `Thl` on the existing queue entry rather than starting a second one, and
/// from there behaves exactly like a fresh press held past `TAP_TIMEOUT`.
#[test]
fn same_key_repress_within_follow_timeout_enters_thl_then_promotes() {
    let mut h = harness();
    h.press(CTRL, CTRL_POS);
    h.release(CTRL, CTRL_POS);
    assert_eq!(h.history().len(), 2);
    assert_eq!(h.mods(), 0);

    h.advance(50);
    h.press(CTRL, CTRL_POS);
    assert_eq!(
        h.dispatcher.queue_len(),
        1,
        "the repress reuses CTRL's existing queue entry instead of pushing a second one"
    );

    h.advance(201);
    h.fire_due();
    assert_eq!(h.mods(), CTRL_BIT, "THL promotes to HOLD exactly like a fresh TOUCH would");

    h.release(CTRL, CTRL_POS);
    assert_eq!(h.mods(), 0);
    assert_eq!(h.history().len(), 2, "no further keystrokes emitted beyond the original tap");
}

#[test]
fn bypass_mode_passes_every_event_through_untouched() {
    let mut h = harness();
    h.set_bypass(true);
    assert!(h.press(K1, K1_POS));
    assert!(h.release(K1, K1_POS));
    assert!(h.history().is_empty());
    assert_eq!(h.dispatcher.queue_len(), 0);
}

#[test]
fn reset_clears_queue_mods_layer_and_bypass() {
    let mut h = harness();
    h.press(CTRL, CTRL_POS);
    h.advance(201);
    h.fire_due();
    h.press(LT1, LT1_POS);
    h.set_bypass(true);

    h.reset();

    assert_eq!(h.dispatcher.queue_len(), 0);
    assert_eq!(h.mods(), 0);
    assert_eq!(h.layer(), 0);
    assert!(!h.is_bypass());
}

#[test]
fn queue_overflow_degrades_to_plain_passthrough() {
    let mut h: Harness<TestLayout, 2> = Harness::new(TestLayout, false);
    h.press(CTRL, CTRL_POS);
    h.press(MT1, MT1_POS);
    // The queue (capacity 2) is now full; a third press degrades to PLAIN.
    let consumed = h.press(K1, K1_POS);
    assert!(!consumed);
    assert_eq!(h.history().last().map(|r| r.keycode), Some(K1));
}
