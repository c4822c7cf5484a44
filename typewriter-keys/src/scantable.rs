// Copyright 2021 Jacob Alexander
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::KeyId;

/// Number of scan rows in the typewriter's matrix.
pub const ROWS: usize = 8;
/// Number of scan columns, split 8 (low byte) + 5 (high byte, bits 1..5 live).
pub const COLS: usize = 13;

/// `KEY_POSITIONS[row][col]` names the key wired to that matrix intersection.
/// `KeyId::Unknown` marks intersections with no key (the matrix has more
/// addressable positions than physical keys).
pub const KEY_POSITIONS: [[KeyId; COLS]; ROWS] = [
    [
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Colon,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::TabClear,
        KeyId::Unknown,
        KeyId::G,
        KeyId::H,
    ],
    [
        KeyId::Unknown,
        KeyId::A,
        KeyId::S,
        KeyId::D,
        KeyId::K,
        KeyId::L,
        KeyId::Semicolon,
        KeyId::MarginReturn,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::TabSet,
        KeyId::F,
        KeyId::J,
    ],
    [
        KeyId::Unknown,
        KeyId::Cents,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Mu,
        KeyId::Unknown,
        KeyId::Dash,
        KeyId::Backspace,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::MarginRelease,
        KeyId::Key5,
        KeyId::Key6,
    ],
    [
        KeyId::Unknown,
        KeyId::Key1,
        KeyId::Key2,
        KeyId::Key3,
        KeyId::Key8,
        KeyId::Key9,
        KeyId::Key0,
        KeyId::PaperUp,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Key4,
        KeyId::Key7,
    ],
    [
        KeyId::Unknown,
        KeyId::Q,
        KeyId::W,
        KeyId::E,
        KeyId::I,
        KeyId::O,
        KeyId::P,
        KeyId::PaperDown,
        KeyId::Unknown,
        KeyId::LeftMargin,
        KeyId::Tab,
        KeyId::R,
        KeyId::U,
    ],
    [
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Brackets,
        KeyId::Unknown,
        KeyId::At,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::RightMargin,
        KeyId::T,
        KeyId::Y,
    ],
    [
        KeyId::Unknown,
        KeyId::Z,
        KeyId::X,
        KeyId::C,
        KeyId::Comma,
        KeyId::FullStop,
        KeyId::Indices,
        KeyId::Return,
        KeyId::Unknown,
        KeyId::Repeat,
        KeyId::Lock,
        KeyId::V,
        KeyId::M,
    ],
    [
        KeyId::Shift,
        KeyId::Angles,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Unknown,
        KeyId::Slash,
        KeyId::LineSpace,
        KeyId::Code,
        KeyId::Space,
        KeyId::Erase,
        KeyId::B,
        KeyId::N,
    ],
];

/// The exact row-strobe byte and two column-tristate bytes that reproduce a
/// given key's intersection. `row == 0` or `row == 0xff` marks a key with
/// no wired position (never produced for a valid, present [`KeyId`]).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyScan {
    pub row: u8,
    pub columns: [u8; 2],
}

impl KeyScan {
    /// Safe (never-asserted) default: no row selected, both column bytes
    /// at their electrically-inactive value.
    const SENTINEL: KeyScan = KeyScan {
        row: 0xff,
        columns: [0xff, 0x3e],
    };
}

/// Inverse of [`KEY_POSITIONS`]: for each [`KeyId`], the row/column bytes
/// that assert it. Built once at startup and read-only thereafter.
pub struct InverseScanTable {
    scans: [KeyScan; crate::KEY_MAX as usize],
}

impl InverseScanTable {
    pub fn new() -> Self {
        let mut scans = [KeyScan::SENTINEL; crate::KEY_MAX as usize];

        for (row, cols) in KEY_POSITIONS.iter().enumerate() {
            for (col, key) in cols.iter().enumerate() {
                if !key.is_valid() {
                    continue;
                }
                let entry = &mut scans[*key as usize];
                entry.row &= !(1 << row);
                if col < 8 {
                    entry.columns[0] &= !(1 << col);
                } else {
                    entry.columns[1] &= !(1 << (col - 7));
                }
            }
        }

        Self { scans }
    }

    /// Returns the scan data for `key`, or `None` if the key has no wired
    /// position (unroutable row mask).
    pub fn get(&self, key: KeyId) -> Option<KeyScan> {
        let scan = self.scans[key as usize];
        if scan.row == 0 || scan.row == 0xff {
            None
        } else {
            Some(scan)
        }
    }
}

impl Default for InverseScanTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_wired_key_has_a_scan() {
        let table = InverseScanTable::new();
        for cols in KEY_POSITIONS.iter() {
            for key in cols.iter() {
                if key.is_valid() {
                    assert!(table.get(*key).is_some(), "{:?} missing a scan", key);
                }
            }
        }
    }

    #[test]
    fn unwired_key_is_none() {
        let table = InverseScanTable::new();
        assert!(table.get(KeyId::None).is_none());
        assert!(table.get(KeyId::Unknown).is_none());
    }

    #[test]
    fn a_key_round_trips_through_position_table() {
        let table = InverseScanTable::new();
        let scan = table.get(KeyId::A).unwrap();
        // row 1, column 1 in KEY_POSITIONS
        assert_eq!(scan.row, !(1u8 << 1));
        assert_eq!(scan.columns[0], !(1u8 << 1));
        assert_eq!(scan.columns[1], 0x3e);
    }

    #[test]
    fn shift_key_is_row_seven_column_zero() {
        let table = InverseScanTable::new();
        let scan = table.get(KeyId::Shift).unwrap();
        assert_eq!(scan.row, !(1u8 << 7));
        assert_eq!(scan.columns[0], !(1u8 << 0));
    }
}
