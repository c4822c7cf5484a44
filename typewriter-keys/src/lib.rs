// Copyright 2021 Jacob Alexander
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![no_std]

//! Static mapping between the typewriter's (row, column) scan positions and
//! logical [`KeyId`]s, and its inverse (the data an [`InverseScanTable`]
//! needs to drive the injector).

pub mod scantable;

pub use scantable::InverseScanTable;

/// Reserved bit (top bit of an 8-bit container). On a `KeyId` returned from
/// the forward scan it marks a key-up transition (`KeyEvent`); on a `KeyId`
/// used as a reverse-table lookup key it marks "Shift held while typed".
/// Both uses are mutually exclusive by context, exactly as the original
/// firmware overlays them on the same bit.
pub const SHIFTED: u8 = 0x80;
pub const RELEASED: u8 = 0x80;

/// Logical identifier for one physical key on the typewriter's keyboard.
///
/// Ordering matches the bit position of each key's row-strobe scan so that
/// [`scantable::KEY_POSITIONS`] can be built directly from it; do not
/// reorder without updating the scan table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
#[repr(u8)]
pub enum KeyId {
    None = 0,
    Unknown,

    MarginRelease,
    Cents,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    Key0,
    Dash,
    Mu,
    Backspace,
    PaperUp,

    LeftMargin,
    Tab,
    Q,
    W,
    E,
    R,
    T,
    Y,
    U,
    I,
    O,
    P,
    At,
    Brackets,
    Return,
    PaperDown,

    RightMargin,
    Lock,
    A,
    S,
    D,
    F,
    G,
    H,
    J,
    K,
    L,
    Semicolon,
    Colon,
    Indices,
    MarginReturn,

    TabSet,
    Shift,
    Angles,
    Z,
    X,
    C,
    V,
    B,
    N,
    M,
    Comma,
    FullStop,
    Slash,
    Repeat,

    TabClear,
    Code,
    Space,
    Erase,
    LineSpace,
}

/// One past the highest valid [`KeyId`] discriminant; mirrors `KEY_MAX`.
pub const KEY_MAX: u8 = KeyId::LineSpace as u8 + 1;

/// Error returned when an 8-bit value does not name a valid [`KeyId`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyIdError {
    OutOfRange(u8),
}

impl KeyId {
    /// Strips the [`RELEASED`]/[`SHIFTED`] high bit, returning the bare key.
    pub const fn from_masked(raw: u8) -> Result<Self, KeyIdError> {
        Self::from_u8(raw & !SHIFTED)
    }

    const fn from_u8(raw: u8) -> Result<Self, KeyIdError> {
        // A plain match over `as u8` comparisons; kept branch-heavy but
        // explicit so the table stays auditable against keyboard.h.
        if raw >= KEY_MAX {
            return Err(KeyIdError::OutOfRange(raw));
        }
        // Safety: discriminants are dense 0..KEY_MAX and `raw` was just
        // bounds-checked against KEY_MAX, so every value in range is valid.
        Ok(unsafe { core::mem::transmute::<u8, KeyId>(raw) })
    }

    pub const fn is_valid(self) -> bool {
        !matches!(self, KeyId::None | KeyId::Unknown)
    }
}

impl TryFrom<u8> for KeyId {
    type Error = KeyIdError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_u8(raw)
    }
}

/// A single key-transition record: key id in the low 7 bits, [`RELEASED`]
/// in the top bit. Zero-sized beyond the byte itself so it can be queued
/// cheaply by [`typewriter_queue`](https://docs.rs/typewriter-queue).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-impl", derive(defmt::Format))]
pub struct KeyEvent(u8);

impl KeyEvent {
    pub const NONE: KeyEvent = KeyEvent(KeyId::None as u8);

    pub const fn down(key: KeyId) -> Self {
        KeyEvent(key as u8)
    }

    pub const fn up(key: KeyId) -> Self {
        KeyEvent(key as u8 | RELEASED)
    }

    pub const fn is_down(self) -> bool {
        self.0 & RELEASED == 0
    }

    pub const fn is_none(self) -> bool {
        self.0 == KeyId::None as u8
    }

    /// The key this event refers to, discarding the up/down flag.
    pub fn key(self) -> KeyId {
        // Events are only ever constructed from a valid KeyId, so this
        // cannot fail in practice; fall back to Unknown rather than panic.
        KeyId::from_masked(self.0).unwrap_or(KeyId::Unknown)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl Default for KeyEvent {
    fn default() -> Self {
        KeyEvent::NONE
    }
}
