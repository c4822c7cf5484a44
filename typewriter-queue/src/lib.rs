// Copyright 2021 Jacob Alexander
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![no_std]

//! A fixed-capacity ring buffer of [`KeyEvent`]s. The sole producer is the
//! cooperative scan-update path; the sole consumer is the terminal's
//! cooperative event drain, so no atomics or locking are required beyond
//! reading/writing the index fields as whole bytes.

use typewriter_keys::KeyEvent;

/// Default queue depth (`EVENTQUEUE_LEN`).
pub const EVENTQUEUE_LEN: usize = 16;

/// Ring buffer of key-transition events.
///
/// `push` always writes and advances; once `LEN` unread events are queued,
/// it silently drops the oldest unread one to make room (design assumption:
/// the cooperative terminal drains within a few scan frames).
pub struct EventQueue<const LEN: usize = EVENTQUEUE_LEN> {
    events: [KeyEvent; LEN],
    read: usize,
    write: usize,
    len: usize,
}

impl<const LEN: usize> EventQueue<LEN> {
    pub const fn new() -> Self {
        Self {
            events: [KeyEvent::NONE; LEN],
            read: 0,
            write: 0,
            len: 0,
        }
    }

    /// Queue a key transition. Overwrites the oldest unread event if the
    /// queue is already full.
    pub fn push(&mut self, event: KeyEvent) {
        if self.len == LEN {
            log::warn!("event queue full, oldest unread event dropped");
            self.read = Self::advance(self.read);
            self.len -= 1;
        }
        self.events[self.write] = event;
        self.write = Self::advance(self.write);
        self.len += 1;
    }

    /// Pop the oldest unread event, or [`KeyEvent::NONE`] if empty.
    pub fn pop(&mut self) -> KeyEvent {
        if self.len == 0 {
            return KeyEvent::NONE;
        }
        let event = self.events[self.read];
        self.read = Self::advance(self.read);
        self.len -= 1;
        event
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    const fn advance(index: usize) -> usize {
        let next = index + 1;
        if next >= LEN {
            0
        } else {
            next
        }
    }
}

impl<const LEN: usize> Default for EventQueue<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use typewriter_keys::KeyId;

    #[test]
    fn empty_queue_pops_none() {
        let mut q: EventQueue<4> = EventQueue::new();
        assert_eq!(q.pop(), KeyEvent::NONE);
    }

    #[test]
    fn fifo_order_preserved() {
        let mut q: EventQueue<4> = EventQueue::new();
        q.push(KeyEvent::down(KeyId::A));
        q.push(KeyEvent::up(KeyId::A));
        assert_eq!(q.pop(), KeyEvent::down(KeyId::A));
        assert_eq!(q.pop(), KeyEvent::up(KeyId::A));
        assert_eq!(q.pop(), KeyEvent::NONE);
    }

    #[test]
    fn full_queue_overwrites_oldest_then_drains_most_recent_in_order() {
        let mut q: EventQueue<16> = EventQueue::new();
        // Push 20 alternating down/up events for two keys; only the last
        // 16 should survive.
        let keys = [KeyId::A, KeyId::B];
        let mut pushed = heapless::Vec::<KeyEvent, 20>::new();
        for i in 0..20u8 {
            let key = keys[(i % 2) as usize];
            let event = if i % 4 < 2 {
                KeyEvent::down(key)
            } else {
                KeyEvent::up(key)
            };
            pushed.push(event).unwrap();
            q.push(event);
        }

        assert_eq!(q.len(), 16);
        for expected in &pushed[4..] {
            assert_eq!(q.pop(), *expected);
        }
        assert_eq!(q.pop(), KeyEvent::NONE);
    }

    #[test]
    fn len_tracks_pending_events() {
        let mut q: EventQueue<4> = EventQueue::new();
        assert!(q.is_empty());
        q.push(KeyEvent::down(KeyId::A));
        q.push(KeyEvent::down(KeyId::B));
        assert_eq!(q.len(), 2);
        q.pop();
        assert_eq!(q.len(), 1);
    }
}
