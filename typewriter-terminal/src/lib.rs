// Copyright 2021 Jacob Alexander
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![no_std]

//! Bidirectional translation between the typewriter's key events and ASCII
//! characters, plus the carriage-position model that drives automatic
//! carriage returns.
//!
//! Forward direction (keystroke → character) tracks the Shift/Lock/Code
//! modifier latches and dispatches a small Code-prefixed command set.
//! Reverse direction (character → keystroke) plans and commits injections
//! through [`Injector`], then folds the same carriage-motion bookkeeping
//! back in so both directions agree on carriage position.

use typewriter_inject::{Clock, Injector};
use typewriter_keys::scantable::InverseScanTable;
use typewriter_keys::{KeyEvent, KeyId, KEY_MAX, SHIFTED};
use typewriter_queue::EventQueue;
use typewriter_scan::MatrixPort;

/// X-units per inch; 10/12/15 cpi (and their half-steps) all divide it evenly.
pub const XPI: u16 = 120;
pub const POWERUP_CPI: u16 = 10;
pub const POWERUP_LEFT_MARGIN: u16 = 10;
pub const POWERUP_RIGHT_MARGIN: u16 = 75;
pub const MARGIN_BELL_CHARS: u16 = 8;
/// Holdoff armed after a Return, in milliseconds.
pub const RETURN_DELAY_MS: u16 = 1000;
/// Right-edge clamp for the carriage position, in inches.
const RIGHT_EDGE_INCHES: u16 = 11;

/// Services the terminal needs from the serial line.
pub trait Serial {
    fn tx(&mut self, byte: u8);
    fn try_rx(&mut self) -> Option<u8>;
    fn block_sender(&mut self);
    fn unblock_sender(&mut self);
}

const fn shifted(key: KeyId) -> u8 {
    key as u8 | SHIFTED
}

/// Forward ASCII map: for each received character, the key (optionally
/// shifted) that types it. Expressed symbolically against [`KeyId`] rather
/// than as raw hex, the way [`typewriter_keys::scantable::KEY_POSITIONS`]
/// names its intersections.
#[rustfmt::skip]
const ASCII_TO_KEY: [u8; 128] = [
    KeyId::None as u8, KeyId::None as u8, KeyId::None as u8, KeyId::None as u8,
    KeyId::None as u8, KeyId::None as u8, KeyId::None as u8, KeyId::None as u8,
    KeyId::Backspace as u8, KeyId::Tab as u8, KeyId::Return as u8, KeyId::None as u8,
    KeyId::None as u8, KeyId::Return as u8, KeyId::None as u8, KeyId::None as u8,

    KeyId::None as u8, KeyId::None as u8, KeyId::None as u8, KeyId::None as u8,
    KeyId::None as u8, KeyId::None as u8, KeyId::None as u8, KeyId::None as u8,
    KeyId::None as u8, KeyId::None as u8, KeyId::None as u8, KeyId::None as u8,
    KeyId::None as u8, KeyId::None as u8, KeyId::None as u8, KeyId::None as u8,

    KeyId::Space as u8, shifted(KeyId::Key1), shifted(KeyId::Key2), shifted(KeyId::Mu),
    shifted(KeyId::Key4), shifted(KeyId::Key5), shifted(KeyId::Key6), shifted(KeyId::Key7),
    shifted(KeyId::Key8), shifted(KeyId::Key9), shifted(KeyId::Colon), shifted(KeyId::Semicolon),
    KeyId::Comma as u8, KeyId::Dash as u8, KeyId::FullStop as u8, KeyId::Slash as u8,

    KeyId::Key0 as u8, KeyId::Key1 as u8, KeyId::Key2 as u8, KeyId::Key3 as u8,
    KeyId::Key4 as u8, KeyId::Key5 as u8, KeyId::Key6 as u8, KeyId::Key7 as u8,
    KeyId::Key8 as u8, KeyId::Key9 as u8, KeyId::Colon as u8, KeyId::Semicolon as u8,
    KeyId::Angles as u8, shifted(KeyId::Key0), shifted(KeyId::Angles), shifted(KeyId::Slash),

    KeyId::At as u8, shifted(KeyId::A), shifted(KeyId::B), shifted(KeyId::C),
    shifted(KeyId::D), shifted(KeyId::E), shifted(KeyId::F), shifted(KeyId::G),
    shifted(KeyId::H), shifted(KeyId::I), shifted(KeyId::J), shifted(KeyId::K),
    shifted(KeyId::L), shifted(KeyId::M), shifted(KeyId::N), shifted(KeyId::O),

    shifted(KeyId::P), shifted(KeyId::Q), shifted(KeyId::R), shifted(KeyId::S),
    shifted(KeyId::T), shifted(KeyId::U), shifted(KeyId::V), shifted(KeyId::W),
    shifted(KeyId::X), shifted(KeyId::Y), shifted(KeyId::Z), shifted(KeyId::Brackets),
    shifted(KeyId::At), KeyId::Brackets as u8, shifted(KeyId::Cents), shifted(KeyId::Dash),

    shifted(KeyId::Key7), KeyId::A as u8, KeyId::B as u8, KeyId::C as u8,
    KeyId::D as u8, KeyId::E as u8, KeyId::F as u8, KeyId::G as u8,
    KeyId::H as u8, KeyId::I as u8, KeyId::J as u8, KeyId::K as u8,
    KeyId::L as u8, KeyId::M as u8, KeyId::N as u8, KeyId::O as u8,

    KeyId::P as u8, KeyId::Q as u8, KeyId::R as u8, KeyId::S as u8,
    KeyId::T as u8, KeyId::U as u8, KeyId::V as u8, KeyId::W as u8,
    KeyId::X as u8, KeyId::Y as u8, KeyId::Z as u8, shifted(KeyId::Brackets),
    KeyId::Mu as u8, KeyId::Brackets as u8, KeyId::Cents as u8, KeyId::Erase as u8,
];

/// Size of the reverse (key → character) table: indices run `0..=KEY_MAX`
/// both plain and with the [`SHIFTED`] bit set.
const KEY_TO_ASCII_LEN: usize = (KEY_MAX | SHIFTED) as usize;

/// Tracks modifier latches, the carriage-position model, and the Ctrl
/// composition state; drives both translation directions.
pub struct Terminal {
    key_to_ascii: [u8; KEY_TO_ASCII_LEN],

    shifted: bool,
    locked: bool,
    lock_down: bool,
    code_active: bool,
    code_solo: bool,
    pending_ctrl: bool,
    ctrl_overstrike: bool,

    char_width: u16,
    position: u16,
    left_margin: u16,
    right_margin: u16,
    bell: u16,
    auto_return: bool,

    swallow_lf: bool,
}

impl Terminal {
    /// `ctrl_overstrike` gates the backspace + (Shift, Cents) overstrike
    /// that visually marks a Code-tapped Ctrl character; the control-code
    /// transform itself always applies.
    pub fn new(ctrl_overstrike: bool) -> Self {
        let mut key_to_ascii = [0u8; KEY_TO_ASCII_LEN];
        for (ch, &raw) in ASCII_TO_KEY.iter().enumerate() {
            let base = raw & !SHIFTED;
            if base < KEY_MAX && key_to_ascii[raw as usize] == 0 {
                key_to_ascii[raw as usize] = ch as u8;
            }
        }

        let left_margin = POWERUP_LEFT_MARGIN * XPI / POWERUP_CPI;
        let right_margin = POWERUP_RIGHT_MARGIN * XPI / POWERUP_CPI;
        let char_width = XPI / POWERUP_CPI;

        Self {
            key_to_ascii,
            shifted: false,
            locked: false,
            lock_down: false,
            code_active: false,
            code_solo: false,
            pending_ctrl: false,
            ctrl_overstrike,
            char_width,
            position: left_margin,
            left_margin,
            right_margin,
            bell: right_margin - MARGIN_BELL_CHARS * char_width,
            auto_return: false,
            swallow_lf: false,
        }
    }

    /// Current carriage position, in X-units from the left edge.
    pub fn position(&self) -> u16 {
        self.position
    }

    pub fn auto_return(&self) -> bool {
        self.auto_return
    }

    pub fn char_width(&self) -> u16 {
        self.char_width
    }

    fn pitch_cycled(&mut self) {
        self.char_width = if self.char_width == XPI / POWERUP_CPI {
            XPI / 12
        } else if self.char_width == XPI / 12 {
            XPI / 15
        } else {
            XPI / POWERUP_CPI
        };
        self.bell = self.right_margin - MARGIN_BELL_CHARS * self.char_width;
    }

    fn char_printed(&mut self, can_break: bool, clock: &mut impl Clock) {
        if self.position < RIGHT_EDGE_INCHES * XPI {
            self.position += self.char_width;
        }

        // The typewriter's own auto-return mechanism would have thrown the
        // carriage back at the bell; fold that into the model here so both
        // directions agree on position.
        if can_break && self.auto_return && self.position > self.bell {
            clock.start_holdoff_ms(RETURN_DELAY_MS);
            self.position = self.left_margin;
        }
    }

    fn handle_motion(&mut self, key: KeyId, clock: &mut impl Clock) {
        match key {
            KeyId::Backspace | KeyId::Erase => {
                if self.position > self.left_margin {
                    self.position -= self.char_width;
                }
            }
            KeyId::Return | KeyId::MarginReturn => {
                if self.position > self.left_margin {
                    clock.start_holdoff_ms(RETURN_DELAY_MS);
                }
                self.position = self.left_margin;
            }
            KeyId::MarginRelease
            | KeyId::LeftMargin
            | KeyId::RightMargin
            | KeyId::TabSet
            | KeyId::TabClear
            | KeyId::PaperUp
            | KeyId::PaperDown
            | KeyId::LineSpace => {}
            KeyId::Space | KeyId::Tab | KeyId::Dash => self.char_printed(true, clock),
            _ => self.char_printed(false, clock),
        }
    }

    fn overstrike_ctrl(
        &mut self,
        injector: &mut Injector,
        scans: &InverseScanTable,
        port: &mut impl MatrixPort,
        clock: &mut impl Clock,
    ) {
        if injector.send_key(KeyId::Backspace, scans, port, clock).is_ok() {
            self.handle_motion(KeyId::Backspace, clock);
        }
        if injector
            .send_chord(KeyId::Shift, KeyId::Cents, scans, port, clock)
            .is_ok()
        {
            self.handle_motion(KeyId::Cents, clock);
        }
    }

    /// Forward-direction dispatch for one key transition.
    pub fn on_key_event(
        &mut self,
        event: KeyEvent,
        injector: &mut Injector,
        scans: &InverseScanTable,
        port: &mut impl MatrixPort,
        clock: &mut impl Clock,
        serial: &mut impl Serial,
    ) {
        let key = event.key();
        let is_down = event.is_down();

        if key == KeyId::Shift {
            self.shifted = is_down;
            self.locked = if self.shifted { false } else { self.lock_down };
            return;
        }

        if key == KeyId::Lock {
            if is_down {
                self.lock_down = true;
                if !self.shifted {
                    // Push-push latch: each untouched-by-Shift tap toggles it.
                    self.locked = !self.locked;
                }
            } else {
                self.lock_down = false;
            }
            return;
        }

        if key == KeyId::Code {
            if is_down {
                self.code_active = true;
                self.code_solo = true;
            } else {
                self.code_active = false;
                if self.code_solo {
                    self.code_solo = false;
                    self.pending_ctrl = true;
                }
            }
            return;
        }

        if !is_down {
            return;
        }
        self.code_solo = false;

        if self.code_active {
            match key {
                KeyId::P => self.pitch_cycled(),
                KeyId::R => self.auto_return = !self.auto_return,
                _ => log::trace!("code-shifted {:?} has no command, swallowed", key),
            }
            return;
        }

        if !key.is_valid() {
            log::trace!("unknown key {:?}, no ascii mapping", key);
            return;
        }

        let index = if self.shifted || self.locked {
            key as u8 | SHIFTED
        } else {
            key as u8
        };

        self.handle_motion(key, clock);

        let mut ch = self.key_to_ascii[index as usize];

        if self.pending_ctrl {
            self.pending_ctrl = false;
            if ch.is_ascii_alphabetic() {
                ch = ch.to_ascii_uppercase() - b'A' + 1;
                if self.ctrl_overstrike {
                    self.overstrike_ctrl(injector, scans, port, clock);
                }
            }
        }

        if ch != 0 {
            serial.tx(ch);
        }
    }

    fn inject_ascii(
        &mut self,
        ch: u8,
        injector: &mut Injector,
        scans: &InverseScanTable,
        port: &mut impl MatrixPort,
        clock: &mut impl Clock,
    ) {
        if ch as usize >= ASCII_TO_KEY.len() {
            return;
        }
        let raw = ASCII_TO_KEY[ch as usize];
        if raw == KeyId::None as u8 {
            return;
        }
        let base = match KeyId::from_masked(raw) {
            Ok(key) => key,
            Err(_) => return,
        };

        let result = if raw & SHIFTED != 0 {
            if self.shifted || self.locked {
                injector.send_key(base, scans, port, clock)
            } else {
                injector.send_chord(KeyId::Shift, base, scans, port, clock)
            }
        } else if self.locked {
            // Temporarily break Lock, as the typewriter's own mechanism does.
            injector
                .send_key(KeyId::Shift, scans, port, clock)
                .and_then(|_| injector.send_key(base, scans, port, clock))
                .and_then(|_| injector.send_key(KeyId::Lock, scans, port, clock))
        } else {
            injector.send_key(base, scans, port, clock)
        };

        if let Err(err) = result {
            log::warn!("dropped reverse injection for {:?}: {:?}", base, err);
        }

        self.handle_motion(base, clock);
    }

    /// One cooperative tick: drain every forward event, then attempt at
    /// most one reverse-direction character.
    pub fn process<const LEN: usize>(
        &mut self,
        queue: &mut EventQueue<LEN>,
        injector: &mut Injector,
        scans: &InverseScanTable,
        port: &mut impl MatrixPort,
        clock: &mut impl Clock,
        serial: &mut impl Serial,
    ) {
        loop {
            let event = queue.pop();
            if event.is_none() {
                break;
            }
            self.on_key_event(event, injector, scans, port, clock, serial);
        }

        if self.pending_ctrl || self.code_active || clock.holdoff_running() {
            return;
        }

        if let Some(ch) = serial.try_rx() {
            if !(ch == b'\n' && self.swallow_lf) {
                self.inject_ascii(ch, injector, scans, port, clock);
            }
            self.swallow_lf = ch == b'\r';
        }
    }
}
