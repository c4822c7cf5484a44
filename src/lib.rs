/* Copyright (C) 2021 by Jacob Alexander */

#![no_std]
#![feature(lang_items)]

//! Owns every piece of state touched by the row-strobe interrupt and by the
//! cooperative main loop, and exposes the three entry points a firmware
//! bring-up wires up: [`Bridge::isr`] from the hardware vector, and
//! [`Bridge::update`] / [`Bridge::process`] from the main loop.

// ----- Crates -----

use typewriter_inject::{Clock, Injector};
use typewriter_keys::scantable::InverseScanTable;
use typewriter_queue::EventQueue;
use typewriter_scan::{MatrixPort, Snooper};
use typewriter_terminal::{Serial, Terminal};

// ----- Modules -----

/// Single owning context for the whole bridge: the only thing a hardware
/// vector trampoline should ever hand a `&mut` to, and the only thing the
/// cooperative main loop should ever hand a `&mut` to. Having exactly one
/// instance is the whole of this crate's concurrency discipline; see the
/// module docs.
pub struct Bridge<const QUEUE_LEN: usize = { typewriter_queue::EVENTQUEUE_LEN }> {
    scans: InverseScanTable,
    queue: EventQueue<QUEUE_LEN>,
    snooper: Snooper,
    injector: Injector,
    terminal: Terminal,
}

impl<const QUEUE_LEN: usize> Bridge<QUEUE_LEN> {
    pub fn new(ctrl_overstrike: bool) -> Self {
        Self {
            scans: InverseScanTable::new(),
            queue: EventQueue::new(),
            snooper: Snooper::new(),
            injector: Injector::new(),
            terminal: Terminal::new(ctrl_overstrike),
        }
    }

    /// Interrupt-context entry point. Must run to completion before the
    /// strobe moves to the next row; writes the injection table to the
    /// column ports first (mirrors the fast ISR's ordering), then snoops
    /// the same strobe for the slower key-event path.
    pub fn isr(&mut self, port: &mut impl MatrixPort) {
        self.injector.on_strobe(port);
        self.snooper.on_edge(port);
    }

    /// Cooperative: recognise a completed scan frame and turn it into
    /// queued key events.
    pub fn update(&mut self) {
        self.snooper.update(&mut self.queue);
    }

    /// Cooperative: drain queued forward events into the terminal, then
    /// attempt at most one reverse-direction character.
    pub fn process(
        &mut self,
        port: &mut impl MatrixPort,
        clock: &mut impl Clock,
        serial: &mut impl Serial,
    ) {
        self.terminal.process(
            &mut self.queue,
            &mut self.injector,
            &self.scans,
            port,
            clock,
            serial,
        );
    }
}

// ----- Embedded Functionality -----

#[cfg(not(feature = "std"))]
use core::panic::PanicInfo;

#[cfg(not(feature = "std"))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {}
}

// ----- Host Functionality -----

#[cfg(not(feature = "std"))]
#[lang = "eh_personality"]
extern "C" fn eh_personality() {}

#[cfg(test)]
mod test {
    use super::*;

    struct FakePort {
        strobes: [u8; 8],
        columns: [[u8; 2]; 8],
        len: usize,
        next: usize,
    }

    impl FakePort {
        fn idle() -> Self {
            Self {
                strobes: [0xff; 8],
                columns: [[0xff, 0xff]; 8],
                len: 0,
                next: 0,
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

        fn reset(&mut self) {
            self.len = 0;
            self.next = 0;
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

        fn release_columns(&mut self) {}

        fn inject_columns(&mut self, _trisd: u8, _trisc: u8) {}
    }

    struct FakeClock {
        holdoff: u16,
    }

    impl FakeClock {
        fn new() -> Self {
            Self { holdoff: 0 }
        }
    }

    impl Clock for FakeClock {
        fn sleep_ms(&mut self, ms: u16) {
            self.holdoff = self.holdoff.saturating_sub(ms);
        }
        fn start_holdoff_ms(&mut self, ms: u16) {
            self.holdoff = ms;
        }
        fn holdoff_running(&self) -> bool {
            self.holdoff > 0
        }
    }

    struct FakeSerial {
        tx: [u8; 32],
        tx_len: usize,
    }

    impl FakeSerial {
        fn new() -> Self {
            Self {
                tx: [0; 32],
                tx_len: 0,
            }
        }

        fn sent(&self) -> &[u8] {
            &self.tx[..self.tx_len]
        }
    }

    impl Serial for FakeSerial {
        fn tx(&mut self, byte: u8) {
            self.tx[self.tx_len] = byte;
            self.tx_len += 1;
        }
        fn try_rx(&mut self) -> Option<u8> {
            None
        }
        fn block_sender(&mut self) {}
        fn unblock_sender(&mut self) {}
    }

    fn drive_full_frame(bridge: &mut Bridge, port: &mut FakePort) {
        while !port.exhausted() {
            bridge.isr(port);
        }
    }

    #[test]
    fn lone_letter_round_trips_through_the_whole_bridge() {
        let mut bridge: Bridge = Bridge::new(true);
        let mut port = FakePort::idle();
        let mut clock = FakeClock::new();
        let mut serial = FakeSerial::new();

        for row in 0..8u8 {
            let columns = if row == 1 {
                [!(1u8 << 1), 0xff]
            } else {
                [0xff, 0xff]
            };
            port.strobe_row(row as usize, columns);
        }
        drive_full_frame(&mut bridge, &mut port);
        bridge.update();

        port.reset();
        for row in 0..8u8 {
            port.strobe_row(row as usize, [0xff, 0xff]);
        }
        drive_full_frame(&mut bridge, &mut port);
        bridge.update();

        bridge.process(&mut port, &mut clock, &mut serial);

        assert_eq!(serial.sent(), b"a");
    }

    #[test]
    fn ghosted_frame_produces_no_output() {
        let mut bridge: Bridge = Bridge::new(true);
        let mut port = FakePort::idle();
        let mut clock = FakeClock::new();
        let mut serial = FakeSerial::new();

        for row in 0..8u8 {
            port.strobe_row(row as usize, [0x00, 0x00]);
        }
        drive_full_frame(&mut bridge, &mut port);
        bridge.update();
        bridge.process(&mut port, &mut clock, &mut serial);

        assert!(serial.sent().is_empty());
    }
}
