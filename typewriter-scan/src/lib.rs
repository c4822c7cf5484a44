// Copyright 2021 Jacob Alexander
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![no_std]

//! Snoops the typewriter's own keyboard matrix scan and turns it into
//! [`KeyEvent`](typewriter_keys::KeyEvent)s.
//!
//! Capture is split across two contexts, same as the firmware this is
//! grounded in: [`Snooper::on_edge`] runs from the row-strobe interrupt and
//! must be cheap (two port reads, one array write); [`Snooper::update`] runs
//! cooperatively once every row has been seen and does the actual
//! state-diffing and event generation.

use typewriter_keys::scantable::{COLS, KEY_POSITIONS, ROWS};
use typewriter_keys::KeyEvent;
use typewriter_queue::EventQueue;

/// Electrical contract for the keyboard matrix port: reading the typewriter's
/// own scan (row strobe + two column bytes) and releasing the column lines
/// to high-impedance when nothing needs to be sampled.
///
/// Combines snoop sampling with injection's tristate writes in the full
/// `typewriter-inject` build, since both directions drive the same port
/// hardware from the same interrupt.
pub trait MatrixPort {
    /// Current row-strobe byte, active-low (exactly one bit clear while a
    /// row is being strobed, all-ones between strobes).
    fn sample_strobe(&mut self) -> u8;
    /// Current column readback, active-low, pre-masked to the keyboard's
    /// pins (`columns[1]` carries only bits 1..5).
    fn sample_columns(&mut self) -> [u8; 2];
    /// Release both column ports to high-impedance; called whenever the
    /// strobe edge was missed or once the current row has been captured.
    fn release_columns(&mut self);
    /// Drive the column tristate registers with injector table entries
    /// (`trisd`, `trisc`), called every strobe edge regardless of whether a
    /// key is currently being injected.
    fn inject_columns(&mut self, trisd: u8, trisc: u8);
}

const GHOST_COL0: u8 = 0xff;
const GHOST_COL1_MASK: u8 = 0x3e;

#[derive(Copy, Clone)]
struct ScanFrame {
    columns: [u8; 2],
}

impl ScanFrame {
    const SENTINEL: ScanFrame = ScanFrame {
        columns: [0xff, 0x3e],
    };
}

/// Captures the typewriter's matrix scan and diffs it into key events.
pub struct Snooper {
    /// Bitmask of rows not yet captured this frame; `0` means every row has
    /// been seen and [`update`](Snooper::update) may run.
    pending: u8,
    frame: [ScanFrame; ROWS],
    keystates: [bool; ROWS * COLS],
}

impl Snooper {
    pub fn new() -> Self {
        Self {
            pending: 0xff,
            frame: [ScanFrame::SENTINEL; ROWS],
            keystates: [false; ROWS * COLS],
        }
    }

    /// Interrupt-context capture of one row-strobe edge. Cheap: always reads
    /// both the strobe and the column ports, at most one array write.
    pub fn on_edge(&mut self, port: &mut impl MatrixPort) {
        let row_pins = port.sample_strobe();
        let columns = port.sample_columns();

        if row_pins == 0xff {
            // Too late, the strobe has already moved on.
            log::trace!("strobe missed, columns sampled but discarded");
            port.release_columns();
            return;
        }

        let row = (!row_pins).trailing_zeros() as usize;
        if row < ROWS && self.pending & !row_pins != 0 {
            self.frame[row] = ScanFrame {
                columns: [!columns[0], !columns[1]],
            };
            self.pending &= row_pins;
        }

        port.release_columns();
    }

    /// Cooperative diff-and-emit pass. No-op until every row has been
    /// captured since the last call.
    pub fn update<const LEN: usize>(&mut self, queue: &mut EventQueue<LEN>) {
        if self.pending != 0 {
            return;
        }

        for row in 0..ROWS {
            self.update_row(row, self.frame[row].columns, queue);
            self.frame[row] = ScanFrame::SENTINEL;
        }

        self.pending = 0xff;
    }

    fn update_row<const LEN: usize>(
        &mut self,
        row: usize,
        columns: [u8; 2],
        queue: &mut EventQueue<LEN>,
    ) {
        if columns[0] == GHOST_COL0 && columns[1] & GHOST_COL1_MASK == GHOST_COL1_MASK {
            log::trace!("row {} ghosted, scan ignored", row);
            return;
        }

        for col in 0..COLS {
            let down = if col < 8 {
                columns[0] & (1 << col) != 0
            } else {
                columns[1] & (1 << (col - 7)) != 0
            };

            let idx = row * COLS + col;
            if down == self.keystates[idx] {
                continue;
            }
            self.keystates[idx] = down;

            let key = KEY_POSITIONS[row][col];
            if !key.is_valid() {
                log::trace!("unwired intersection row {} col {} changed, ignored", row, col);
                continue;
            }
            queue.push(if down {
                KeyEvent::down(key)
            } else {
                KeyEvent::up(key)
            });
        }
    }
}

impl Default for Snooper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use typewriter_keys::KeyId;

    struct FakePort {
        strobes: [u8; 8],
        columns: [[u8; 2]; 8],
        len: usize,
        next: usize,
        released: usize,
    }

    impl FakePort {
        fn new() -> Self {
            Self {
                strobes: [0xff; 8],
                columns: [[0x00, 0x00]; 8],
                len: 0,
                next: 0,
                released: 0,
            }
        }

        fn strobe_row(&mut self, row: usize, columns: [u8; 2]) {
            self.strobes[self.len] = !(1 << row);
            self.columns[self.len] = columns;
            self.len += 1;
        }

        fn exhausted(&self) -> bool {
            self.next >= self.len
        }
    }

    impl MatrixPort for FakePort {
        fn sample_strobe(&mut self) -> u8 {
            if self.exhausted() {
                0xff
            } else {
                self.strobes[self.next]
            }
        }

        fn sample_columns(&mut self) -> [u8; 2] {
            let columns = self.columns[self.next];
            self.next += 1;
            columns
        }

        fn release_columns(&mut self) {
            self.released += 1;
        }

        fn inject_columns(&mut self, _trisd: u8, _trisc: u8) {}
    }

    fn drive_full_frame(snooper: &mut Snooper, port: &mut FakePort) {
        while !port.exhausted() {
            snooper.on_edge(port);
        }
    }

    #[test]
    fn key_down_emits_single_event() {
        let mut snooper = Snooper::new();
        let mut queue: EventQueue<16> = EventQueue::new();
        let mut port = FakePort::new();

        // Row 1, column 1 is 'A'; active-low readback so bit clear = pressed,
        // every other line idle (all-ones).
        for row in 0..8u8 {
            let columns = if row == 1 {
                [!(1u8 << 1), 0xff]
            } else {
                [0xff, 0xff]
            };
            port.strobe_row(row as usize, columns);
        }
        drive_full_frame(&mut snooper, &mut port);
        snooper.update(&mut queue);

        assert_eq!(queue.pop(), KeyEvent::down(KeyId::A));
        assert_eq!(queue.pop(), KeyEvent::NONE);
    }

    #[test]
    fn release_is_down_then_up_transition() {
        let mut snooper = Snooper::new();
        let mut queue: EventQueue<16> = EventQueue::new();
        let mut port = FakePort::new();

        for row in 0..8u8 {
            let columns = if row == 1 {
                [!(1u8 << 1), 0xff]
            } else {
                [0xff, 0xff]
            };
            port.strobe_row(row as usize, columns);
        }
        drive_full_frame(&mut snooper, &mut port);
        snooper.update(&mut queue);
        assert_eq!(queue.pop(), KeyEvent::down(KeyId::A));

        let mut port = FakePort::new();
        for row in 0..8u8 {
            port.strobe_row(row as usize, [0xff, 0xff]);
        }
        drive_full_frame(&mut snooper, &mut port);
        snooper.update(&mut queue);
        assert_eq!(queue.pop(), KeyEvent::up(KeyId::A));
        assert_eq!(queue.pop(), KeyEvent::NONE);
    }

    #[test]
    fn ghosted_row_produces_no_events() {
        let mut snooper = Snooper::new();
        let mut queue: EventQueue<16> = EventQueue::new();
        let mut port = FakePort::new();

        // Active-low columns both fully active (every line reads pressed),
        // the classic diode-ghost signature; must be suppressed entirely.
        for row in 0..8u8 {
            port.strobe_row(row as usize, [0x00, 0x00]);
        }
        drive_full_frame(&mut snooper, &mut port);
        snooper.update(&mut queue);

        assert_eq!(queue.pop(), KeyEvent::NONE);
    }

    #[test]
    fn partial_frame_defers_update() {
        let mut snooper = Snooper::new();
        let mut queue: EventQueue<16> = EventQueue::new();
        let mut port = FakePort::new();

        // Only strobe 3 of the 8 rows; update() must not run yet.
        for row in 0..3u8 {
            port.strobe_row(row as usize, [0xff, 0xff]);
        }
        drive_full_frame(&mut snooper, &mut port);
        snooper.update(&mut queue);

        assert_eq!(queue.pop(), KeyEvent::NONE);
    }

    #[test]
    fn missed_strobe_releases_columns_without_capturing() {
        let mut snooper = Snooper::new();
        let mut port = FakePort::new();
        port.strobes[0] = 0xff;
        port.len = 1;

        snooper.on_edge(&mut port);
        assert_eq!(port.released, 1);
        assert_eq!(snooper.pending, 0xff);
    }
}
