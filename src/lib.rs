//! Tap/hold disambiguation engine for smart-key keyboard firmware.
//!
//! This crate is the post-processing stage that sits between a matrix
//! scanner and a HID reporter: it decides, for each smart key, whether a
//! physical press-then-release was a tap or a hold, and drives modifier and
//! layer state accordingly. The matrix scan, debounce, and USB transport are
//! out of scope — they are consumed through the thin [`host`] capability
//! traits.
//!
//! ```no_run
//! use tapkey_core::behavior::{Behavior, BehaviorTable, KeyPos, Keycode};
//! use tapkey_core::dispatcher::Dispatcher;
//!
//! struct Keymap;
//! impl BehaviorTable for Keymap {
//!     fn behavior_of(&self, keycode: Keycode) -> Behavior {
//!         match keycode.0 {
//!             1 => Behavior::mod_tap(0x01),
//!             _ => Behavior::plain(),
//!         }
//!     }
//! }
//!
//! let mut dispatcher: Dispatcher = Dispatcher::new(false);
//! # let _ = dispatcher.queue_len();
//! ```
#![no_std]

extern crate alloc;

pub mod behavior;
pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod key_state;
pub mod queue;

#[cfg(any(test, feature = "introspection"))]
pub mod testing;

pub use behavior::{Behavior, BehaviorKind, BehaviorTable, FixedBehaviorTable, KeyPos, Keycode};
pub use clock::{DueTimeout, SystemClock};
pub use dispatcher::{Dispatcher, Record};
pub use error::{CoreError, CoreResult};
pub use host::{Clock, Host, HostIo, TimeoutKind, Token};
pub use key_state::{KeyState, Phase};

#[cfg(test)]
mod tests {
    use super::*;

    struct AllPlain;
    impl BehaviorTable for AllPlain {
        fn behavior_of(&self, _keycode: Keycode) -> Behavior {
            Behavior::plain()
        }
    }

    #[test]
    fn fresh_dispatcher_has_an_empty_queue() {
        let dispatcher: Dispatcher = Dispatcher::new(false);
        assert_eq!(dispatcher.queue_len(), 0);
        assert!(!dispatcher.is_bypass());
    }
}
