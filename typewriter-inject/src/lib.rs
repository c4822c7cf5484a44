// Copyright 2021 Jacob Alexander
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![no_std]

//! Drives the typewriter's own keyboard matrix to make it type as though a
//! key were physically pressed.
//!
//! A 256-entry table, indexed by the current row-strobe byte, holds the
//! tristate pattern [`Injector::on_strobe`] should write to the column ports
//! on every strobe edge. Setting a key "down" clears the bits that pull its
//! column low for its row (and the inverse row, since the typewriter strobes
//! both halves of the matrix from the same line); setting it "up" restores
//! the idle (hi-Z) pattern.

use typewriter_keys::scantable::InverseScanTable;
use typewriter_keys::KeyId;
use typewriter_scan::MatrixPort;

/// Scan pulses per injector "tick" (the unit [`Clock`] timing is expressed in).
pub const SCANS_PER_TICK: u8 = 17;
/// Ticks a plain keystroke is held down for.
pub const KEYSTROKE_TICKS: u8 = 10;
/// Ticks the hold-key of a chord is pressed before the second key.
pub const KEYCHORD_BEFORE: u8 = 3;
/// Ticks the hold-key of a chord stays down after the second key releases.
pub const KEYCHORD_AFTER: u8 = 2;
/// Minimum gap enforced between consecutive injected keystrokes, in ms.
pub const KEYSTROKE_GAP_MS: u16 = 30;

/// Forces TRISC bits outside the keyboard's columns high before a key-down
/// write, so the shared UART Tx pin is never dragged low by injection.
const KEYDOWN_COL1_GUARD: u8 = 0x81;
/// Forces TRISC bits outside the keyboard's columns high before a key-up
/// write (complement of the column mask `0x3e`).
const KEYUP_COL1_GUARD: u8 = !0x3e;

/// Timing services the injector needs from its host: the inter-keystroke
/// holdoff and a millisecond delay primitive for pacing busy-waits.
pub trait Clock {
    fn sleep_ms(&mut self, ms: u16);
    fn start_holdoff_ms(&mut self, ms: u16);
    fn holdoff_running(&self) -> bool;
}

/// Error returned when a key cannot be injected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InjectError {
    /// The raw byte passed to a `*_raw` entry point did not name a valid key.
    OutOfRangeKey(u8),
    /// The key has no wired scan position (row mask `0` or `0xff`).
    UnroutableKey(KeyId),
}

/// Drives the injection table from the row-strobe interrupt and offers a
/// cooperative `send_key`/`send_chord` API for the terminal's reverse path.
pub struct Injector {
    table: [u8; 256],
    ticks: u16,
}

impl Injector {
    pub fn new() -> Self {
        let mut table = [0xffu8; 256];
        let mut idx: u16 = 1;
        while idx < 256 {
            table[idx as usize] = 0xbf;
            idx *= 2;
        }
        table[0] = 0xbf;

        Self { table, ticks: 0 }
    }

    /// ISR-context entry: write the table entries for the currently-strobed
    /// row to the column ports.
    pub fn on_strobe(&mut self, port: &mut impl MatrixPort) {
        let strobe = port.sample_strobe();
        let trisd = self.table[strobe as usize];
        let trisc = self.table[!strobe as usize];
        port.inject_columns(trisd, trisc);
    }

    /// Outstanding ticks before the hold/release currently in progress in
    /// [`wait_ticks`](Self::wait_ticks) completes; `0` when idle.
    pub fn ticks_remaining(&self) -> u16 {
        self.ticks
    }

    fn set_key_down(&mut self, row: u8, col0: u8, col1: u8) {
        let col1 = col1 | KEYDOWN_COL1_GUARD;
        self.table[row as usize] &= col0;
        self.table[!row as usize] &= col1;
    }

    fn set_key_up(&mut self, row: u8, col0: u8, col1: u8) {
        let col1 = col1 | KEYUP_COL1_GUARD;
        self.table[row as usize] |= !col0;
        self.table[!row as usize] |= !col1;
    }

    /// Look up `key`'s scan position and mark it down for the fast ISR to
    /// start injecting on the next strobe.
    pub fn press(&mut self, key: KeyId, scans: &InverseScanTable) -> Result<(), InjectError> {
        let scan = scans.get(key).ok_or(InjectError::UnroutableKey(key))?;
        self.set_key_down(scan.row, scan.columns[0], scan.columns[1]);
        Ok(())
    }

    /// Look up `key`'s scan position and mark it up.
    pub fn release(&mut self, key: KeyId, scans: &InverseScanTable) -> Result<(), InjectError> {
        let scan = scans.get(key).ok_or(InjectError::UnroutableKey(key))?;
        self.set_key_up(scan.row, scan.columns[0], scan.columns[1]);
        Ok(())
    }

    /// As [`press`](Self::press), but accepts a raw byte (top bit ignored)
    /// and logs-and-drops out-of-range or unroutable keys rather than
    /// returning early, matching the dropped-injection diagnostics the
    /// terminal's reverse path relies on.
    pub fn press_raw(&mut self, raw: u8, scans: &InverseScanTable) -> Result<(), InjectError> {
        let key = KeyId::from_masked(raw).map_err(|_| InjectError::OutOfRangeKey(raw))?;
        self.press(key, scans)
    }

    fn wait_ticks(&mut self, ticks: u8, clock: &mut impl Clock) {
        self.ticks = ticks as u16;
        while self.ticks > 0 {
            for _ in 0..SCANS_PER_TICK {
                clock.sleep_ms(1);
            }
            self.ticks -= 1;
        }
    }

    fn wait_for_idle_window(&mut self, port: &mut impl MatrixPort, clock: &mut impl Clock) {
        loop {
            while port.sample_strobe() != 0xff {
                clock.sleep_ms(1);
            }
            clock.sleep_ms(4);
            if port.sample_strobe() == 0xff {
                return;
            }
        }
    }

    /// Type a single key, held down for [`KEYSTROKE_TICKS`] scan pulses.
    pub fn send_key(
        &mut self,
        key: KeyId,
        scans: &InverseScanTable,
        port: &mut impl MatrixPort,
        clock: &mut impl Clock,
    ) -> Result<(), InjectError> {
        self.send_chord_inner(None, key, scans, port, clock)
    }

    /// Type `key` while holding `hold` down, e.g. `(Shift, A)` for a capital.
    pub fn send_chord(
        &mut self,
        hold: KeyId,
        key: KeyId,
        scans: &InverseScanTable,
        port: &mut impl MatrixPort,
        clock: &mut impl Clock,
    ) -> Result<(), InjectError> {
        self.send_chord_inner(Some(hold), key, scans, port, clock)
    }

    fn send_chord_inner(
        &mut self,
        hold: Option<KeyId>,
        key: KeyId,
        scans: &InverseScanTable,
        port: &mut impl MatrixPort,
        clock: &mut impl Clock,
    ) -> Result<(), InjectError> {
        while clock.holdoff_running() {
            clock.sleep_ms(1);
        }

        self.wait_for_idle_window(port, clock);

        if let Some(hold_key) = hold {
            match self.press(hold_key, scans) {
                Ok(()) => self.wait_ticks(KEYCHORD_BEFORE, clock),
                Err(err) => {
                    log::warn!("dropped chord hold key: {:?}", err);
                    return Err(err);
                }
            }
        }

        if let Err(err) = self.press(key, scans) {
            log::warn!("dropped injected key: {:?}", err);
            return Err(err);
        }
        self.wait_ticks(KEYSTROKE_TICKS, clock);
        self.release(key, scans).ok();

        if let Some(hold_key) = hold {
            self.wait_ticks(KEYCHORD_AFTER, clock);
            self.release(hold_key, scans).ok();
        }

        clock.start_holdoff_ms(KEYSTROKE_GAP_MS);
        Ok(())
    }
}

impl Default for Injector {
    fn default() -> Self {
        Self::new()
    }
}
