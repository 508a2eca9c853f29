//! Keycodes, physical key positions, and the per-keycode smart-behavior table.

use core::fmt;

/// 16-bit identifier used by the host keymap. Carries no semantics of its
/// own; meaning is assigned entirely by the [`Behavior`] the host registers
/// for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Keycode(pub u16);

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical identity of a key: its position in the scan matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPos {
    /// Matrix row.
    pub row: u8,
    /// Matrix column.
    pub col: u8,
}

impl KeyPos {
    /// Builds a new key position.
    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }
}

/// Smart-key behavior kind. `Plain` keys carry no tap/hold disambiguation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorKind {
    /// No smart behavior; the key is emitted as-is.
    Plain,
    /// Mod-tap: tap emits the physical key, hold applies a modifier.
    Mt,
    /// Layer-tap: tap emits the physical key, hold switches to another layer.
    Lt,
    /// Mod-tap-eager: like `Mt`, but promotes to hold on the first
    /// interfering keypress rather than waiting for `TAP_TIMEOUT`.
    Mte,
    /// Mod-tap whose tap emits a distinct macro keycode rather than the
    /// physical key's own code.
    MtOnMkey,
}

/// Default timeout values (milliseconds), per §4.2.
pub const DEFAULT_TAP_TIMEOUT_MS: u32 = 200;
pub const DEFAULT_SEQ_TIMEOUT_MS: u32 = 100;
pub const DEFAULT_FOLLOW_TIMEOUT_MS: u32 = 200;
pub const DEFAULT_REL_TIMEOUT_MS: u32 = 50;

/// Immutable per-keycode smart-behavior record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Behavior {
    /// Which disambiguation policy applies.
    pub kind: BehaviorKind,
    /// Modifier bits applied while this key is held (MT/MTE/MT_ON_MKEY).
    pub mod_mask: u8,
    /// Target layer applied while this key is held (LT).
    pub layer: u8,
    /// Macro keycode emitted on tap instead of the physical key (MT_ON_MKEY).
    pub macro_kc: Keycode,
    /// Number of consecutive taps collapsed into a single emission. `1`
    /// disables collapsing.
    pub tap_sequence_len: u8,
    /// Per-keycode override of `TAP_TIMEOUT`.
    pub tap_timeout_ms: u32,
    /// Per-keycode override of `SEQ_TIMEOUT`.
    pub seq_timeout_ms: u32,
    /// Per-keycode override of `FOLLOW_TIMEOUT`.
    pub follow_timeout_ms: u32,
    /// Per-keycode override of `REL_TIMEOUT`.
    pub rel_timeout_ms: u32,
}

impl Behavior {
    /// A `PLAIN` key: no tap/hold behavior at all.
    pub const fn plain() -> Self {
        Self {
            kind: BehaviorKind::Plain,
            mod_mask: 0,
            layer: 0,
            macro_kc: Keycode(0),
            tap_sequence_len: 1,
            tap_timeout_ms: DEFAULT_TAP_TIMEOUT_MS,
            seq_timeout_ms: DEFAULT_SEQ_TIMEOUT_MS,
            follow_timeout_ms: DEFAULT_FOLLOW_TIMEOUT_MS,
            rel_timeout_ms: DEFAULT_REL_TIMEOUT_MS,
        }
    }

    /// A mod-tap: tap emits the physical key, hold applies `mod_mask`.
    pub const fn mod_tap(mod_mask: u8) -> Self {
        Self {
            kind: BehaviorKind::Mt,
            mod_mask,
            ..Self::plain()
        }
    }

    /// A mod-tap-eager: promotes to hold on the first interfering keypress.
    pub const fn mod_tap_eager(mod_mask: u8) -> Self {
        Self {
            kind: BehaviorKind::Mte,
            mod_mask,
            ..Self::plain()
        }
    }

    /// A layer-tap: tap emits the physical key, hold switches to `layer`.
    pub const fn layer_tap(layer: u8) -> Self {
        Self {
            kind: BehaviorKind::Lt,
            layer,
            ..Self::plain()
        }
    }

    /// A mod-tap whose tap emits `macro_kc` instead of the physical key.
    pub const fn mod_tap_on_macro_key(mod_mask: u8, macro_kc: Keycode) -> Self {
        Self {
            kind: BehaviorKind::MtOnMkey,
            mod_mask,
            macro_kc,
            ..Self::plain()
        }
    }

    /// Collapses `len` consecutive taps into a single emission.
    pub const fn with_tap_sequence_len(mut self, len: u8) -> Self {
        self.tap_sequence_len = len;
        self
    }

    /// Overrides `TAP_TIMEOUT` for this keycode.
    pub const fn with_tap_timeout_ms(mut self, ms: u32) -> Self {
        self.tap_timeout_ms = ms;
        self
    }

    /// Overrides `FOLLOW_TIMEOUT` for this keycode.
    pub const fn with_follow_timeout_ms(mut self, ms: u32) -> Self {
        self.follow_timeout_ms = ms;
        self
    }

    /// Overrides `REL_TIMEOUT` for this keycode.
    pub const fn with_rel_timeout_ms(mut self, ms: u32) -> Self {
        self.rel_timeout_ms = ms;
        self
    }

    /// Overrides `SEQ_TIMEOUT` for this keycode.
    pub const fn with_seq_timeout_ms(mut self, ms: u32) -> Self {
        self.seq_timeout_ms = ms;
        self
    }

    /// Whether this behavior carries any tap/hold disambiguation at all.
    pub const fn is_smart(&self) -> bool {
        !matches!(self.kind, BehaviorKind::Plain)
    }
}

/// Capability the host supplies so the core can resolve a keycode to its
/// configured behavior. Implemented by the host's static keymap; the core
/// never stores a full keymap itself.
pub trait BehaviorTable {
    /// Returns the behavior configured for `keycode`. Keys with no smart
    /// configuration must return `Behavior::plain()`.
    fn behavior_of(&self, keycode: Keycode) -> Behavior;
}

/// A small fixed-capacity [`BehaviorTable`] a host can use instead of
/// writing its own, for keymaps that fit in a handful of smart-key entries.
/// Unregistered keycodes resolve to [`Behavior::plain`].
#[derive(Debug, Clone)]
pub struct FixedBehaviorTable<const N: usize> {
    entries: arrayvec::ArrayVec<(Keycode, Behavior), N>,
}

impl<const N: usize> Default for FixedBehaviorTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FixedBehaviorTable<N> {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            entries: arrayvec::ArrayVec::new_const(),
        }
    }

    /// Registers `behavior` for `keycode`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateBehavior`] if `keycode` is already
    /// registered, or [`CoreError::BehaviorTableFull`] if the table is at
    /// capacity.
    pub fn register(&mut self, keycode: Keycode, behavior: Behavior) -> crate::error::CoreResult<()> {
        if self.entries.iter().any(|(kc, _)| *kc == keycode) {
            return Err(crate::error::CoreError::DuplicateBehavior(keycode));
        }
        self.entries
            .try_push((keycode, behavior))
            .map_err(|_| crate::error::CoreError::BehaviorTableFull { capacity: N })
    }
}

impl<const N: usize> BehaviorTable for FixedBehaviorTable<N> {
    fn behavior_of(&self, keycode: Keycode) -> Behavior {
        self.entries
            .iter()
            .find(|(kc, _)| *kc == keycode)
            .map(|(_, behavior)| *behavior)
            .unwrap_or_else(Behavior::plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn unregistered_keycode_resolves_to_plain() {
        let table: FixedBehaviorTable<4> = FixedBehaviorTable::new();
        assert_eq!(table.behavior_of(Keycode(7)), Behavior::plain());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut table: FixedBehaviorTable<4> = FixedBehaviorTable::new();
        table.register(Keycode(1), Behavior::mod_tap(0x01)).unwrap();
        let err = table.register(Keycode(1), Behavior::mod_tap(0x02)).unwrap_err();
        assert_eq!(err, CoreError::DuplicateBehavior(Keycode(1)));
    }

    #[test]
    fn table_at_capacity_rejects_further_registration() {
        let mut table: FixedBehaviorTable<2> = FixedBehaviorTable::new();
        table.register(Keycode(1), Behavior::plain()).unwrap();
        table.register(Keycode(2), Behavior::plain()).unwrap();
        let err = table.register(Keycode(3), Behavior::plain()).unwrap_err();
        assert_eq!(err, CoreError::BehaviorTableFull { capacity: 2 });
    }
}
